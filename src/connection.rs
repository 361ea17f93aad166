//! Composes host identity, endpoint resolution, envelope construction, and
//! the web poster into a single "send one payload" operation (§4.5).

use std::sync::{Arc, OnceLock};

use thiserror::Error;

use crate::cancel::CancelToken;
use crate::config::MetricsConfig;
use crate::endpoint;
use crate::envelope::build_envelope;
use crate::host_identity::HostIdentityProvider;
use crate::types::Payload;
use crate::web_poster::{PostError, WebPoster};

#[derive(Error, Debug, Clone)]
#[error("Error sending metrics data to {username}@{url}: {source}")]
pub struct ConnectionError {
    pub username: String,
    pub url: String,
    #[source]
    pub source: PostError,
}

impl ConnectionError {
    /// Delegates to the underlying `PostError`'s kind: the failure category
    /// a `Connection` surfaces is exactly the one its `WebPoster` hit.
    pub fn kind(&self) -> &str {
        self.source.kind()
    }
}

/// A single "send a payload to endpoint/uri-context" operation, with the
/// endpoint and derived POST URL resolved lazily and memoized (§4.5
/// invariant: initialization side effects happen at most once even under
/// concurrent callers).
pub struct Connection {
    config: Arc<MetricsConfig>,
    host_identity: Arc<dyn HostIdentityProvider>,
    web_poster: Arc<dyn WebPoster>,
    endpoint: OnceLock<String>,
    url: OnceLock<String>,
}

impl Connection {
    pub fn new(
        config: Arc<MetricsConfig>,
        host_identity: Arc<dyn HostIdentityProvider>,
        web_poster: Arc<dyn WebPoster>,
    ) -> Self {
        Connection {
            config,
            host_identity,
            web_poster,
            endpoint: OnceLock::new(),
            url: OnceLock::new(),
        }
    }

    /// The resolved collection endpoint: the `EndpointConfig` file's
    /// `endpoint` member, or `config.default_endpoint` if that file is
    /// absent or malformed (§4.2).
    pub fn endpoint(&self) -> &str {
        self.endpoint.get_or_init(|| {
            endpoint::resolve_endpoint(&self.config.endpoint_config_path)
                .unwrap_or_else(|| self.config.default_endpoint.clone())
        })
    }

    /// `endpoint + "/" + uri_context`, computed once.
    pub fn url(&self) -> &str {
        self.url
            .get_or_init(|| format!("{}/{}", self.endpoint(), self.config.uri_context))
    }

    fn envelope_body(&self, payload: &Payload) -> String {
        build_envelope(
            payload,
            &self.host_identity.fingerprint(),
            self.host_identity.machine_id(),
            &self.config.form_param_name,
        )
    }

    fn wrap_error(&self, source: PostError) -> ConnectionError {
        ConnectionError {
            username: self.config.username.clone(),
            url: self.url().to_string(),
            source,
        }
    }

    /// Blocking send. Builds the envelope, POSTs it, and on failure
    /// prefixes the error with `"Error sending metrics data to
    /// <user>@<url>: "` (§4.5).
    pub fn send_sync(&self, payload: &Payload, cancel: &CancelToken) -> Result<(), ConnectionError> {
        let body = self.envelope_body(payload);
        let url = self.url().to_string();
        self.web_poster
            .post_sync(&url, body, &self.config.username, &self.config.password, cancel)
            .map_err(|e| self.wrap_error(e))
    }

    /// Async send; same body construction and error prefixing as
    /// [`Connection::send_sync`].
    pub async fn send_async(
        &self,
        payload: &Payload,
        cancel: &CancelToken,
    ) -> Result<(), ConnectionError> {
        let body = self.envelope_body(payload);
        let url = self.url().to_string();
        self.web_poster
            .post_async(&url, body, &self.config.username, &self.config.password, cancel)
            .await
            .map_err(|e| self.wrap_error(e))
    }
}
