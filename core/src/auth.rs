//! Authentication assembly for outgoing requests.

use tracing::{debug, warn};

use crate::config::{AuthType, EndpointConfig};
use crate::http::BasicAuth;
use crate::template::{render_or_literal, TemplateRenderer};

/// What an endpoint's auth settings contribute to a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthParts {
    /// Headers applied after the configured header block.
    pub headers: Vec<(String, String)>,
    /// A credential the transport encodes as HTTP Basic auth.
    pub basic: Option<BasicAuth>,
}

/// Render the credential fields selected by `auth_type` and derive the
/// headers or Basic credential they produce.
///
/// Empty credentials contribute nothing. An incomplete Basic pair is logged
/// and the request proceeds unauthenticated.
pub fn assemble_auth(config: &EndpointConfig, renderer: &dyn TemplateRenderer) -> AuthParts {
    let mut parts = AuthParts::default();
    match config.auth_type {
        AuthType::None => {}
        AuthType::Bearer => {
            let token = render_or_literal(renderer, &config.bearer_token);
            if !token.is_empty() {
                parts
                    .headers
                    .push(("Authorization".to_string(), format!("Bearer {token}")));
            }
        }
        AuthType::ApiKey => {
            let key = render_or_literal(renderer, &config.api_key);
            if !key.is_empty() {
                parts.headers.push(("X-API-Key".to_string(), key));
            }
        }
        AuthType::Basic => {
            let username = render_or_literal(renderer, &config.username);
            let password = render_or_literal(renderer, &config.password);
            if username.is_empty() || password.is_empty() {
                warn!(
                    endpoint = %config.name,
                    "basic auth selected but username or password is missing, sending unauthenticated"
                );
            } else {
                debug!(endpoint = %config.name, %username, "using basic auth");
                parts.basic = Some(BasicAuth { username, password });
            }
        }
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::{PassthroughRenderer, VariableRenderer};

    fn endpoint() -> EndpointConfig {
        EndpointConfig::new("Auth", "http://localhost/")
    }

    #[test]
    fn none_contributes_nothing() {
        let config = endpoint();
        assert_eq!(assemble_auth(&config, &PassthroughRenderer), AuthParts::default());
    }

    #[test]
    fn bearer_adds_authorization_header() {
        let config = endpoint().with_bearer_token("abc");
        let parts = assemble_auth(&config, &PassthroughRenderer);
        assert_eq!(
            parts.headers,
            vec![("Authorization".to_string(), "Bearer abc".to_string())]
        );
        assert!(parts.basic.is_none());
    }

    #[test]
    fn bearer_token_is_rendered() {
        let renderer = VariableRenderer::new();
        renderer.set("token", "rotated-1");
        let config = endpoint().with_bearer_token("{{ token }}");
        let parts = assemble_auth(&config, &renderer);
        assert_eq!(parts.headers[0].1, "Bearer rotated-1");
    }

    #[test]
    fn empty_bearer_token_adds_nothing() {
        let config = endpoint().with_bearer_token("");
        assert!(assemble_auth(&config, &PassthroughRenderer).headers.is_empty());
    }

    #[test]
    fn api_key_adds_x_api_key() {
        let config = endpoint().with_api_key("secret");
        let parts = assemble_auth(&config, &PassthroughRenderer);
        assert_eq!(parts.headers, vec![("X-API-Key".to_string(), "secret".to_string())]);
    }

    #[test]
    fn basic_produces_credential_pair() {
        let config = endpoint().with_basic_auth("testuser", "testpass");
        let parts = assemble_auth(&config, &PassthroughRenderer);
        assert!(parts.headers.is_empty());
        let basic = parts.basic.unwrap();
        assert_eq!(basic.username, "testuser");
        assert_eq!(basic.password, "testpass");
    }

    #[test]
    fn basic_with_missing_password_is_unauthenticated() {
        let config = endpoint().with_basic_auth("testuser", "");
        assert_eq!(assemble_auth(&config, &PassthroughRenderer), AuthParts::default());
    }

    #[test]
    fn credentials_for_other_schemes_are_ignored() {
        let mut config = endpoint().with_api_key("secret");
        config.bearer_token = "unused".to_string();
        let parts = assemble_auth(&config, &PassthroughRenderer);
        assert_eq!(parts.headers.len(), 1);
        assert_eq!(parts.headers[0].0, "X-API-Key");
    }
}
