//! rest-caller - trigger configured REST endpoints from the terminal

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rest_caller_core::{
    CallResult, EndpointConfig, EndpointRegistry, EndpointSet, HttpMethod,
    JsonFileStore, UreqTransport, VariableRenderer,
};
use serde_json::json;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rest-caller")]
#[command(about = "Call configured REST endpoints and keep their last result", long_about = None)]
struct Cli {
    /// Endpoints document (`{ "endpoints": [...] }`)
    #[arg(long, env = "REST_CALLER_ENDPOINTS", default_value = "endpoints.json", global = true)]
    endpoints: PathBuf,

    /// File holding the last result of every endpoint
    #[arg(long, env = "REST_CALLER_STORE", default_value = "results.json", global = true)]
    store: PathBuf,

    /// Template variable available as `{{ NAME }}` (repeatable)
    #[arg(long = "var", value_name = "NAME=VALUE", value_parser = parse_var, global = true)]
    vars: Vec<(String, String)>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured endpoints with their last stored status
    List,

    /// Call one endpoint and store the result
    Call {
        #[arg(value_name = "ID")]
        id: String,
    },

    /// Print the stored result of one endpoint without calling it
    Show {
        #[arg(value_name = "ID")]
        id: String,
    },

    /// Print an endpoints document covering every mock-server route
    DemoConfig {
        /// Where the mock server listens
        #[arg(long, default_value = "http://127.0.0.1:3000")]
        base_url: String,
    },
}

fn parse_var(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected NAME=VALUE, got `{raw}`")),
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Commands::DemoConfig { base_url } = &cli.command {
        println!("{}", demo_config(base_url)?.to_json()?);
        return Ok(ExitCode::SUCCESS);
    }

    let registry = open_registry(&cli).await?;
    match &cli.command {
        Commands::List => {
            list(&registry, cli.output)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Call { id } => {
            let result = registry.execute(id).await?;
            print_result(id, &result, cli.output)?;
            Ok(if result.is_failure() { ExitCode::FAILURE } else { ExitCode::SUCCESS })
        }
        Commands::Show { id } => {
            let Some(caller) = registry.get(id) else {
                bail!("no endpoint with id `{id}`");
            };
            match caller.last_result() {
                Some(result) => print_result(id, &result, cli.output)?,
                None => println!("{id}: no result yet"),
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::DemoConfig { .. } => Ok(ExitCode::SUCCESS),
    }
}

async fn open_registry(cli: &Cli) -> Result<EndpointRegistry> {
    let endpoints = EndpointSet::load(&cli.endpoints)
        .with_context(|| format!("loading endpoints from {}", cli.endpoints.display()))?;
    let renderer = Arc::new(VariableRenderer::new());
    for (name, value) in &cli.vars {
        renderer.set(name.as_str(), value.as_str());
    }
    let registry = EndpointRegistry::load(
        endpoints,
        Arc::new(JsonFileStore::new(&cli.store)),
        renderer,
        Arc::new(UreqTransport),
    )
    .await
    .with_context(|| format!("opening result store {}", cli.store.display()))?;
    Ok(registry)
}

fn list(registry: &EndpointRegistry, output: OutputFormat) -> Result<()> {
    let callers = registry.callers();
    match output {
        OutputFormat::Json => {
            let rows: Vec<_> = callers
                .iter()
                .map(|caller| {
                    let config = caller.config();
                    json!({
                        "id": config.id,
                        "name": config.name,
                        "method": config.method,
                        "url": config.url,
                        "status_code": caller.status_code(),
                        "fetched_at": caller.fetched_at(),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        OutputFormat::Text => {
            for caller in callers {
                let config = caller.config();
                let status = caller
                    .status_code()
                    .map_or_else(|| "-".to_string(), |code| code.to_string());
                println!("{:<24} {:>4}  {:<6} {}  ({})", config.id, status, config.method.as_str(), config.url, config.name);
            }
        }
    }
    Ok(())
}

fn print_result(id: &str, result: &CallResult, output: OutputFormat) -> Result<()> {
    match output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(result)?),
        OutputFormat::Text => {
            println!("{id}: status {} at {}", result.status_code, result.fetched_at.to_rfc3339());
            if result.truncated {
                println!("(body truncated)");
            }
            for (name, value) in &result.headers {
                println!("{name}: {value}");
            }
            println!();
            println!("{}", result.body);
        }
    }
    Ok(())
}

/// Endpoints exercising every mock-server route and authentication type.
fn demo_config(base_url: &str) -> Result<EndpointSet> {
    let base = base_url.trim_end_matches('/');
    let url = |path: &str| format!("{base}{path}");
    let endpoints = vec![
        EndpointConfig::new("Sample JSON", url("/json")).with_id("json"),
        EndpointConfig::new("Echo GET", url("/echo?source=rest-caller"))
            .with_id("echo-get")
            .with_headers("X-Test: value\nX-Requested-At: {{ now }}"),
        EndpointConfig::new("Echo POST", url("/echo/devices/1"))
            .with_id("echo-post")
            .with_method(HttpMethod::Post)
            .with_body(r#"{"on": true, "sent_at": "{{ now }}"}"#, "application/json"),
        EndpointConfig::new("Not found", url("/status/404")).with_id("status-404").with_retries(2, 1.0),
        EndpointConfig::new("Flaky", url("/flaky/2")).with_id("flaky").with_retries(3, 1.0),
        EndpointConfig::new("Slow", url("/delay/5"))
            .with_id("slow")
            .with_timeout_seconds(2),
        EndpointConfig::new("Large", url("/large/20000"))
            .with_id("large")
            .with_max_response_bytes(10_240),
        EndpointConfig::new("Basic auth", url("/auth/basic"))
            .with_id("auth-basic")
            .with_basic_auth("testuser", "testpass"),
        EndpointConfig::new("Bearer auth", url("/auth/bearer"))
            .with_id("auth-bearer")
            .with_bearer_token("test-bearer-token-12345"),
        EndpointConfig::new("API key auth", url("/auth/apikey"))
            .with_id("auth-apikey")
            .with_api_key("test-api-key-67890"),
    ];
    Ok(EndpointSet::new(endpoints)?)
}

#[cfg(test)]
mod tests {
    use rest_caller_core::AuthType;

    use super::*;

    #[test]
    fn var_flag_splits_on_first_equals() {
        assert_eq!(parse_var("token=a=b").unwrap(), ("token".to_string(), "a=b".to_string()));
        assert_eq!(parse_var(" empty =").unwrap(), ("empty".to_string(), String::new()));
        assert!(parse_var("novalue").is_err());
        assert!(parse_var("=x").is_err());
    }

    #[test]
    fn demo_config_reloads_as_a_valid_document() {
        let set = demo_config("http://localhost:3000/").unwrap();
        let reparsed = EndpointSet::from_json(&set.to_json().unwrap()).unwrap();
        assert_eq!(reparsed, set);
        assert_eq!(reparsed.get("large").unwrap().url, "http://localhost:3000/large/20000");
        assert_eq!(reparsed.get("auth-basic").unwrap().auth_type, AuthType::Basic);
    }

    #[tokio::test]
    async fn registry_opens_with_missing_store() {
        let dir = tempfile::tempdir().unwrap();
        let endpoints = dir.path().join("endpoints.json");
        std::fs::write(&endpoints, demo_config("http://127.0.0.1:1").unwrap().to_json().unwrap()).unwrap();

        let cli = Cli::parse_from([
            "rest-caller",
            "--endpoints",
            endpoints.to_str().unwrap(),
            "--store",
            dir.path().join("results.json").to_str().unwrap(),
            "--var",
            "token=abc",
            "list",
        ]);
        let registry = open_registry(&cli).await.unwrap();
        assert_eq!(registry.len(), 10);
        assert!(registry.get("flaky").unwrap().last_result().is_none());
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
