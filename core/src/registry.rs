//! Lifecycle owner for a collection of endpoint callers.
//!
//! # Design
//! `EndpointRegistry` is an explicit object, created by whoever owns the
//! endpoints, instead of ambient per-process state. It seeds each
//! `ApiCaller` from the result store at load time and persists the whole
//! result map after every committed call through `BatchPersister`, which
//! callers only see as a `ResultSink`.
//!
//! Each caller reaches the persister through its own `EndpointSink`.
//! `remove` detaches that sink before deleting the stored entry, so a call
//! still in flight for a removed endpoint cannot write its result back.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::caller::{ApiCaller, ResultSink};
use crate::config::{EndpointConfig, EndpointSet};
use crate::error::{ConfigError, RegistryError, StoreError};
use crate::result::CallResult;
use crate::store::{ResultStore, StoredResults};
use crate::template::TemplateRenderer;
use crate::transport::Transport;

/// Keeps the latest result of every endpoint and saves them as one blob.
pub struct BatchPersister {
    store: Arc<dyn ResultStore>,
    results: tokio::sync::Mutex<StoredResults>,
}

impl BatchPersister {
    pub fn new(store: Arc<dyn ResultStore>, initial: StoredResults) -> Self {
        Self {
            store,
            results: tokio::sync::Mutex::new(initial),
        }
    }

    /// Drop an endpoint's entry and rewrite the blob.
    pub async fn forget(&self, endpoint_id: &str) -> Result<(), StoreError> {
        let mut results = self.results.lock().await;
        if results.remove(endpoint_id).is_some() {
            self.store.save(&results).await?;
        }
        Ok(())
    }

    pub async fn snapshot(&self) -> StoredResults {
        self.results.lock().await.clone()
    }

    /// Save `result` unless `attached` says the endpoint is gone. The check
    /// runs under the map lock.
    async fn commit(
        &self,
        endpoint_id: &str,
        result: &CallResult,
        attached: impl FnOnce() -> bool,
    ) -> Result<(), StoreError> {
        let mut results = self.results.lock().await;
        if !attached() {
            debug!(endpoint = %endpoint_id, "endpoint removed, result not persisted");
            return Ok(());
        }
        results.insert(endpoint_id.to_string(), result.clone());
        self.store.save(&results).await?;
        debug!(endpoint = %endpoint_id, endpoints = results.len(), "persisted call results");
        Ok(())
    }
}

#[async_trait]
impl ResultSink for BatchPersister {
    async fn record(&self, endpoint_id: &str, result: &CallResult) -> Result<(), StoreError> {
        self.commit(endpoint_id, result, || true).await
    }
}

/// One caller's route into the shared `BatchPersister`.
struct EndpointSink {
    persister: Arc<BatchPersister>,
    detached: AtomicBool,
}

#[async_trait]
impl ResultSink for EndpointSink {
    async fn record(&self, endpoint_id: &str, result: &CallResult) -> Result<(), StoreError> {
        self.persister
            .commit(endpoint_id, result, || !self.detached.load(Ordering::SeqCst))
            .await
    }
}

struct Entry {
    caller: Arc<ApiCaller>,
    sink: Arc<EndpointSink>,
}

pub struct EndpointRegistry {
    entries: RwLock<Vec<Entry>>,
    persister: Arc<BatchPersister>,
    renderer: Arc<dyn TemplateRenderer>,
    transport: Arc<dyn Transport>,
}

impl EndpointRegistry {
    /// Build one caller per endpoint, seeded from `store`.
    ///
    /// Stored results for endpoints no longer configured are not carried
    /// forward.
    pub async fn load(
        endpoints: EndpointSet,
        store: Arc<dyn ResultStore>,
        renderer: Arc<dyn TemplateRenderer>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, RegistryError> {
        let mut stored = store.load().await?;
        stored.retain(|id, _| endpoints.get(id).is_some());

        let persister = Arc::new(BatchPersister::new(store, stored.clone()));
        let registry = Self {
            entries: RwLock::new(Vec::with_capacity(endpoints.len())),
            persister,
            renderer,
            transport,
        };
        for config in endpoints.into_vec() {
            let seed = stored.remove(&config.id);
            let entry = registry.build_entry(config, seed);
            registry.entries.write().push(entry);
        }
        info!(endpoints = registry.len(), "endpoint registry loaded");
        Ok(registry)
    }

    fn build_entry(&self, config: EndpointConfig, seed: Option<CallResult>) -> Entry {
        let sink = Arc::new(EndpointSink {
            persister: Arc::clone(&self.persister),
            detached: AtomicBool::new(false),
        });
        let caller = ApiCaller::builder(config)
            .renderer(Arc::clone(&self.renderer))
            .transport(Arc::clone(&self.transport))
            .sink(sink.clone())
            .seed(seed)
            .build();
        Entry {
            caller: Arc::new(caller),
            sink,
        }
    }

    pub fn get(&self, endpoint_id: &str) -> Option<Arc<ApiCaller>> {
        self.entries
            .read()
            .iter()
            .find(|e| e.caller.endpoint_id() == endpoint_id)
            .map(|e| Arc::clone(&e.caller))
    }

    /// Every caller, in configuration order.
    pub fn callers(&self) -> Vec<Arc<ApiCaller>> {
        self.entries.read().iter().map(|e| Arc::clone(&e.caller)).collect()
    }

    /// Every endpoint configuration, in configuration order.
    pub fn endpoints(&self) -> Vec<Arc<EndpointConfig>> {
        self.entries.read().iter().map(|e| e.caller.config()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Run one endpoint's call and return the result it committed.
    pub async fn execute(&self, endpoint_id: &str) -> Result<CallResult, RegistryError> {
        let caller = self
            .get(endpoint_id)
            .ok_or_else(|| RegistryError::UnknownEndpoint(endpoint_id.to_string()))?;
        caller.execute().await;
        caller
            .last_result()
            .ok_or_else(|| RegistryError::UnknownEndpoint(endpoint_id.to_string()))
    }

    /// Replace an endpoint's configuration, or add it when the id is new.
    ///
    /// Names stay unique across the registry.
    pub fn upsert(&self, config: EndpointConfig) -> Result<Arc<ApiCaller>, RegistryError> {
        config.validate()?;
        let mut entries = self.entries.write();
        if entries
            .iter()
            .any(|e| e.caller.endpoint_id() != config.id && e.caller.endpoint_name() == config.name)
        {
            return Err(ConfigError::DuplicateName(config.name).into());
        }
        if let Some(existing) = entries.iter().find(|e| e.caller.endpoint_id() == config.id) {
            existing.caller.reconfigure(config);
            return Ok(Arc::clone(&existing.caller));
        }
        let entry = self.build_entry(config, None);
        let caller = Arc::clone(&entry.caller);
        entries.push(entry);
        Ok(caller)
    }

    /// Remove an endpoint and its persisted result.
    ///
    /// A call already running for the endpoint still finishes, but its
    /// result is not persisted.
    pub async fn remove(&self, endpoint_id: &str) -> Result<bool, RegistryError> {
        let removed = {
            let mut entries = self.entries.write();
            entries
                .iter()
                .position(|e| e.caller.endpoint_id() == endpoint_id)
                .map(|index| entries.remove(index))
        };
        let Some(entry) = removed else {
            return Ok(false);
        };
        entry.sink.detached.store(true, Ordering::SeqCst);
        self.persister.forget(endpoint_id).await?;
        Ok(true)
    }

    /// The results as they were last persisted.
    pub async fn persisted(&self) -> StoredResults {
        self.persister.snapshot().await
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;
    use tokio::sync::Notify;

    use super::*;
    use crate::error::TransportError;
    use crate::http::{HttpRequest, HttpResponse};
    use crate::store::MemoryStore;
    use crate::template::PassthroughRenderer;
    use crate::transport::TransportPolicy;

    /// Answers every request with a status derived from its URL path.
    #[derive(Default)]
    struct PathStatus(Mutex<Vec<String>>);

    #[async_trait]
    impl Transport for PathStatus {
        async fn send(
            &self,
            request: &HttpRequest,
            _policy: &TransportPolicy,
        ) -> Result<HttpResponse, TransportError> {
            self.0.lock().push(request.url.clone());
            let status = request
                .url
                .rsplit('/')
                .next()
                .and_then(|s| s.parse().ok())
                .unwrap_or(200);
            Ok(HttpResponse {
                status,
                headers: Vec::new(),
                body: format!("status {status}"),
            })
        }
    }

    /// Answers 200 only after the test releases it.
    #[derive(Default)]
    struct Gated {
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl Transport for Gated {
        async fn send(
            &self,
            _request: &HttpRequest,
            _policy: &TransportPolicy,
        ) -> Result<HttpResponse, TransportError> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(HttpResponse {
                status: 200,
                headers: Vec::new(),
                body: "late".to_string(),
            })
        }
    }

    fn set() -> EndpointSet {
        EndpointSet::new(vec![
            EndpointConfig::new("Alpha", "http://svc/200").with_id("alpha"),
            EndpointConfig::new("Beta", "http://svc/404").with_id("beta"),
        ])
        .unwrap()
    }

    async fn registry(store: Arc<MemoryStore>) -> EndpointRegistry {
        EndpointRegistry::load(
            set(),
            store,
            Arc::new(PassthroughRenderer),
            Arc::new(PathStatus::default()),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn load_seeds_callers_and_drops_stale_entries() {
        let mut stored = StoredResults::new();
        stored.insert("alpha".to_string(), CallResult::failure("old"));
        stored.insert("gone".to_string(), CallResult::failure("stale"));
        let store = Arc::new(MemoryStore::with_results(stored));

        let registry = registry(store).await;
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get("alpha").unwrap().body().as_deref(), Some("old"));
        assert!(registry.get("beta").unwrap().last_result().is_none());
        assert!(!registry.persisted().await.contains_key("gone"));
    }

    #[tokio::test]
    async fn every_execute_saves_all_results() {
        let store = Arc::new(MemoryStore::new());
        let registry = registry(store.clone()).await;

        let alpha = registry.execute("alpha").await.unwrap();
        assert_eq!(alpha.status_code, 200);
        assert_eq!(store.save_count(), 1);

        let beta = registry.execute("beta").await.unwrap();
        assert_eq!(beta.status_code, 404);
        assert_eq!(store.save_count(), 2);

        let saved = store.snapshot();
        assert_eq!(saved.len(), 2);
        assert_eq!(saved["alpha"].body, "status 200");
        assert_eq!(saved["beta"].status_code, 404);
    }

    #[tokio::test]
    async fn unknown_endpoint_is_an_error() {
        let registry = registry(Arc::new(MemoryStore::new())).await;
        let err = registry.execute("missing").await.unwrap_err();
        assert!(matches!(err, RegistryError::UnknownEndpoint(id) if id == "missing"));
    }

    #[tokio::test]
    async fn endpoints_keep_configuration_order() {
        let registry = registry(Arc::new(MemoryStore::new())).await;
        let names: Vec<_> = registry.endpoints().iter().map(|e| e.name.clone()).collect();
        assert_eq!(names, vec!["Alpha", "Beta"]);
    }

    #[tokio::test]
    async fn upsert_replaces_or_adds() {
        let registry = registry(Arc::new(MemoryStore::new())).await;

        let updated = EndpointConfig::new("Alpha", "http://svc/500").with_id("alpha");
        registry.upsert(updated).unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.execute("alpha").await.unwrap().status_code, 500);

        let added = EndpointConfig::new("Gamma", "http://svc/201").with_id("gamma");
        registry.upsert(added).unwrap();
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.execute("gamma").await.unwrap().status_code, 201);
    }

    #[tokio::test]
    async fn upsert_rejects_name_clash_and_invalid_config() {
        let registry = registry(Arc::new(MemoryStore::new())).await;
        let clash = EndpointConfig::new("Beta", "http://svc/").with_id("other");
        assert!(matches!(
            registry.upsert(clash),
            Err(RegistryError::Config(ConfigError::DuplicateName(_)))
        ));
        let invalid = EndpointConfig::new("Delta", "").with_id("delta");
        assert!(registry.upsert(invalid).is_err());
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn remove_drops_caller_and_persisted_result() {
        let store = Arc::new(MemoryStore::new());
        let registry = registry(store.clone()).await;
        registry.execute("alpha").await.unwrap();
        registry.execute("beta").await.unwrap();

        assert!(registry.remove("alpha").await.unwrap());
        assert!(registry.get("alpha").is_none());
        assert!(!store.snapshot().contains_key("alpha"));
        assert!(store.snapshot().contains_key("beta"));
        assert!(!registry.remove("alpha").await.unwrap());
    }

    #[tokio::test]
    async fn removal_during_a_call_keeps_the_result_deleted() {
        let store = Arc::new(MemoryStore::new());
        let transport = Arc::new(Gated::default());
        let registry = Arc::new(
            EndpointRegistry::load(set(), store.clone(), Arc::new(PassthroughRenderer), transport.clone())
                .await
                .unwrap(),
        );

        let in_flight = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.execute("alpha").await })
        };
        transport.entered.notified().await;
        assert!(registry.remove("alpha").await.unwrap());
        transport.release.notify_one();

        let finished = in_flight.await.unwrap().unwrap();
        assert_eq!(finished.status_code, 200);
        assert!(!store.snapshot().contains_key("alpha"));
        assert!(!registry.persisted().await.contains_key("alpha"));

        registry
            .upsert(EndpointConfig::new("Alpha", "http://svc/200").with_id("alpha"))
            .unwrap();
        transport.release.notify_one();
        registry.execute("alpha").await.unwrap();
        assert_eq!(store.snapshot()["alpha"].body, "late");
    }
}
