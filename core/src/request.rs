//! Turns an endpoint configuration snapshot into a concrete `HttpRequest`.
//!
//! # Design
//! Assembly renders every template exactly once per call, so all attempts in
//! a retry sequence send identical requests. Header precedence is: the parsed
//! header block first, then auth headers, then `Content-Type`. Later entries
//! replace earlier ones with the same (case-insensitive) name.
//!
//! The body is passed through as an opaque payload. `content_type` only
//! labels it; the body is never re-encoded based on the declared type.

use crate::auth::assemble_auth;
use crate::config::EndpointConfig;
use crate::headers::{parse_header_block, set_header};
use crate::http::HttpRequest;
use crate::template::{render_or_literal, TemplateRenderer};

pub fn assemble_request(config: &EndpointConfig, renderer: &dyn TemplateRenderer) -> HttpRequest {
    let url = render_or_literal(renderer, &config.url);
    let mut headers = parse_header_block(&render_or_literal(renderer, &config.headers));
    let body = render_or_literal(renderer, &config.body);

    let auth = assemble_auth(config, renderer);
    for (name, value) in auth.headers {
        set_header(&mut headers, &name, value);
    }

    if !body.is_empty() && !config.content_type.is_empty() {
        set_header(&mut headers, "Content-Type", config.content_type.clone());
    }

    HttpRequest {
        method: config.method,
        url,
        headers,
        body: (!body.is_empty()).then_some(body),
        basic_auth: auth.basic,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpMethod;
    use crate::template::{PassthroughRenderer, VariableRenderer};

    #[test]
    fn get_without_body_has_no_content_type() {
        let config = EndpointConfig::new("A", "http://localhost/x");
        let req = assemble_request(&config, &PassthroughRenderer);
        assert_eq!(req.method, HttpMethod::Get);
        assert_eq!(req.url, "http://localhost/x");
        assert!(req.headers.is_empty());
        assert!(req.body.is_none());
        assert!(req.basic_auth.is_none());
    }

    #[test]
    fn literal_headers_and_api_key_are_both_sent() {
        let config = EndpointConfig::new("A", "http://localhost/")
            .with_headers("X-Test: value")
            .with_api_key("secret");
        let req = assemble_request(&config, &PassthroughRenderer);
        assert_eq!(req.header("X-Test"), Some("value"));
        assert_eq!(req.header("X-API-Key"), Some("secret"));
    }

    #[test]
    fn auth_header_overrides_literal_header() {
        let config = EndpointConfig::new("A", "http://localhost/")
            .with_headers("authorization: Token stale\nAccept: */*")
            .with_bearer_token("fresh");
        let req = assemble_request(&config, &PassthroughRenderer);
        assert_eq!(req.headers.len(), 2);
        assert_eq!(req.header("Authorization"), Some("Bearer fresh"));
    }

    #[test]
    fn body_sets_content_type_and_is_sent_verbatim() {
        let raw = "{ \"a\" : 1,   \"b\": [1,2] }";
        let config = EndpointConfig::new("A", "http://localhost/")
            .with_method(HttpMethod::Post)
            .with_headers("Content-Type: text/plain")
            .with_body(raw, "application/json");
        let req = assemble_request(&config, &PassthroughRenderer);
        assert_eq!(req.header("content-type"), Some("application/json"));
        assert_eq!(req.body.as_deref(), Some(raw));
    }

    #[test]
    fn invalid_json_body_is_still_sent_as_is() {
        let config = EndpointConfig::new("A", "http://localhost/")
            .with_method(HttpMethod::Put)
            .with_body("not json at all", "application/json");
        let req = assemble_request(&config, &PassthroughRenderer);
        assert_eq!(req.body.as_deref(), Some("not json at all"));
    }

    #[test]
    fn empty_content_type_leaves_header_unset() {
        let config = EndpointConfig::new("A", "http://localhost/")
            .with_method(HttpMethod::Post)
            .with_body("payload", "");
        let req = assemble_request(&config, &PassthroughRenderer);
        assert!(req.header("Content-Type").is_none());
    }

    #[test]
    fn url_headers_and_body_are_rendered() {
        let renderer = VariableRenderer::new();
        renderer.set("host", "127.0.0.1:9");
        renderer.set("trace", "t-1");
        renderer.set("name", "lamp");
        let config = EndpointConfig::new("A", "http://{{host}}/devices")
            .with_method(HttpMethod::Post)
            .with_headers("X-Trace: {{ trace }}")
            .with_body("{\"name\":\"{{ name }}\"}", "application/json");
        let req = assemble_request(&config, &renderer);
        assert_eq!(req.url, "http://127.0.0.1:9/devices");
        assert_eq!(req.header("X-Trace"), Some("t-1"));
        assert_eq!(req.body.as_deref(), Some("{\"name\":\"lamp\"}"));
    }

    #[test]
    fn render_failure_keeps_literal_url() {
        let renderer = VariableRenderer::new();
        let config = EndpointConfig::new("A", "http://{{ missing }}/x");
        let req = assemble_request(&config, &renderer);
        assert_eq!(req.url, "http://{{ missing }}/x");
    }

    #[test]
    fn basic_credentials_travel_separately() {
        let config = EndpointConfig::new("A", "http://localhost/").with_basic_auth("u", "p");
        let req = assemble_request(&config, &PassthroughRenderer);
        assert!(req.header("Authorization").is_none());
        assert_eq!(req.basic_auth.as_ref().map(|b| b.username.as_str()), Some("u"));
        assert_eq!(req.wire_headers()[0].1, "Basic dTpw");
    }
}
