//! Explicit configuration surface.
//!
//! The original design leaned on process-wide mutable globals
//! (`MAX_CACHE_SIZE`, `CACHE_DIRECTORY`) for the handful of knobs tests
//! needed to override. Per the redesign notes in the specification, this
//! implementation collects every tunable into one struct that the embedding
//! application constructs once and hands down to `Connection`, `Sender`, and
//! `PersistentCache` — the "singleton" becomes an application-level
//! convenience (one shared `Arc<MetricsConfig>`), not hidden state.

use std::path::PathBuf;

/// Default endpoint used when no `EndpointConfig` file is present or it
/// fails to parse.
pub const DEFAULT_ENDPOINT: &str = "http://localhost:3000";

/// Default relative path POSTed to under the resolved endpoint.
pub const DEFAULT_URI_CONTEXT: &str = "metrics";

/// Default top-level JSON key the envelope nests the payload under.
pub const DEFAULT_FORM_PARAM_NAME: &str = "data";

/// On-disk cache format version. Bump this — and only this — when the
/// framed-record layout changes incompatibly; a mismatch at startup purges
/// all cached metrics (no migration is attempted).
pub const CURRENT_CACHE_VERSION: u32 = 2;

/// Fraction of `max_cache_size_bytes` at which [`Capacity`](crate::types::Capacity)
/// transitions from `Low` to `High`.
pub const HIGH_CAPACITY_THRESHOLD: f64 = 0.75;

#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Directory the `PersistentCache` keeps its metafile and three record
    /// files under.
    pub cache_directory: PathBuf,
    /// Total on-disk footprint budget for `cache_directory`, in bytes.
    pub max_cache_size_bytes: u64,
    /// Directory the `Sender`'s `QueueFile` is resolved against when a
    /// relative path is given.
    pub storage_directory: PathBuf,
    /// Path to the persisted fingerprint UUID.
    pub fingerprint_path: PathBuf,
    /// Path to the `EndpointConfig` JSON file.
    pub endpoint_config_path: PathBuf,
    /// HTTP Basic auth username sent with every POST.
    pub username: String,
    /// HTTP Basic auth password sent with every POST.
    pub password: String,
    /// Default endpoint base URL, used when `endpoint_config_path` is
    /// missing or malformed.
    pub default_endpoint: String,
    /// Relative path appended to the endpoint to form the POST URL.
    pub uri_context: String,
    /// Top-level JSON key the envelope nests the payload under.
    pub form_param_name: String,
}

impl MetricsConfig {
    /// Build a config rooted at `$XDG_DATA_HOME/eosmetrics` (falling back to
    /// `~/.local/share/eosmetrics` when `XDG_DATA_HOME` is unset, via the
    /// `dirs` crate), and `/var/cache/metrics` for the persistent cache.
    pub fn standard() -> Self {
        let data_home = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("eosmetrics");

        MetricsConfig {
            cache_directory: PathBuf::from("/var/cache/metrics"),
            max_cache_size_bytes: 100_000,
            storage_directory: data_home.join("storage"),
            fingerprint_path: data_home.join("fingerprint"),
            endpoint_config_path: data_home.join("endpoint.json"),
            username: "endlessos".to_string(),
            password: "sosseldne".to_string(),
            default_endpoint: DEFAULT_ENDPOINT.to_string(),
            uri_context: DEFAULT_URI_CONTEXT.to_string(),
            form_param_name: DEFAULT_FORM_PARAM_NAME.to_string(),
        }
    }

    /// Build a config fully rooted under `root` — the constructor tests use
    /// so no path escapes a temp directory.
    pub fn rooted_at(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        MetricsConfig {
            cache_directory: root.join("cache"),
            max_cache_size_bytes: 100_000,
            storage_directory: root.join("storage"),
            fingerprint_path: root.join("fingerprint"),
            endpoint_config_path: root.join("endpoint.json"),
            username: "endlessos".to_string(),
            password: "sosseldne".to_string(),
            default_endpoint: DEFAULT_ENDPOINT.to_string(),
            uri_context: DEFAULT_URI_CONTEXT.to_string(),
            form_param_name: DEFAULT_FORM_PARAM_NAME.to_string(),
        }
    }

    pub fn with_max_cache_size_bytes(mut self, bytes: u64) -> Self {
        self.max_cache_size_bytes = bytes;
        self
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    /// Resolve a possibly-relative queue file path against
    /// `storage_directory`, per §4.6.
    pub fn resolve_storage_path(&self, queue_file: impl Into<PathBuf>) -> PathBuf {
        let queue_file = queue_file.into();
        if queue_file.is_absolute() {
            queue_file
        } else {
            self.storage_directory.join(queue_file)
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        MetricsConfig::standard()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn relative_storage_paths_resolve_under_storage_directory() {
        let config = MetricsConfig::rooted_at("/tmp/example");
        let resolved = config.resolve_storage_path("queue.json");
        assert_eq!(resolved, PathBuf::from("/tmp/example/storage/queue.json"));
    }

    #[test]
    fn absolute_storage_paths_pass_through() {
        let config = MetricsConfig::rooted_at("/tmp/example");
        let resolved = config.resolve_storage_path("/other/queue.json");
        assert_eq!(resolved, PathBuf::from("/other/queue.json"));
    }
}
