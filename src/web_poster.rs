//! Authenticated HTTP POST, sync and async forms (§4.3). Expressed as a
//! capability trait so `Connection` can be built against either the
//! production reqwest-backed poster or an in-memory test double, matching
//! the capability-injection design note in §9.

use async_trait::async_trait;
use thiserror::Error;

use crate::cancel::CancelToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PostErrorKind {
    Cancelled,
    Transport,
    NonOk,
}

#[derive(Error, Debug, Clone)]
#[error("request to {uri} failed: {reason}{}", status.map(|s| format!(" (status {s})")).unwrap_or_default())]
pub struct PostError {
    pub uri: String,
    pub status: Option<u16>,
    pub reason: String,
    kind: PostErrorKind,
}

impl PostError {
    pub fn cancelled(uri: impl Into<String>) -> Self {
        PostError {
            uri: uri.into(),
            status: None,
            reason: "cancelled".to_string(),
            kind: PostErrorKind::Cancelled,
        }
    }

    pub fn transport(uri: impl Into<String>, reason: impl Into<String>) -> Self {
        PostError {
            uri: uri.into(),
            status: None,
            reason: reason.into(),
            kind: PostErrorKind::Transport,
        }
    }

    pub fn non_200(uri: impl Into<String>, status: u16, reason: impl Into<String>) -> Self {
        PostError {
            uri: uri.into(),
            status: Some(status),
            reason: reason.into(),
            kind: PostErrorKind::NonOk,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self.kind {
            PostErrorKind::Cancelled => "Cancelled",
            PostErrorKind::Transport => "Transport",
            PostErrorKind::NonOk => "NonOk",
        }
    }
}

#[async_trait]
pub trait WebPoster: Send + Sync {
    fn post_sync(
        &self,
        uri: &str,
        body: String,
        username: &str,
        password: &str,
        cancel: &CancelToken,
    ) -> Result<(), PostError>;

    async fn post_async(
        &self,
        uri: &str,
        body: String,
        username: &str,
        password: &str,
        cancel: &CancelToken,
    ) -> Result<(), PostError>;
}

/// Production poster backed by `reqwest`. Basic auth is supplied once, up
/// front, on the single request `reqwest` issues — there is no challenge
/// round-trip to re-authenticate against, matching §4.3's "supplied once"
/// contract.
pub struct ReqwestWebPoster {
    blocking: reqwest::blocking::Client,
    async_client: reqwest::Client,
}

impl ReqwestWebPoster {
    pub fn new() -> Self {
        ReqwestWebPoster {
            blocking: reqwest::blocking::Client::new(),
            async_client: reqwest::Client::new(),
        }
    }
}

impl Default for ReqwestWebPoster {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WebPoster for ReqwestWebPoster {
    fn post_sync(
        &self,
        uri: &str,
        body: String,
        username: &str,
        password: &str,
        cancel: &CancelToken,
    ) -> Result<(), PostError> {
        if cancel.is_cancelled() {
            return Err(PostError::cancelled(uri));
        }

        let response = self
            .blocking
            .post(uri)
            .basic_auth(username, Some(password))
            .header("Content-Type", "application/x-www-form-urlencoded")
            .header("Accept", "application/json")
            .body(body)
            .send()
            .map_err(|e| PostError::transport(uri, e.to_string()))?;

        check_status(uri, response.status().as_u16(), response.status().canonical_reason())
    }

    async fn post_async(
        &self,
        uri: &str,
        body: String,
        username: &str,
        password: &str,
        cancel: &CancelToken,
    ) -> Result<(), PostError> {
        if cancel.is_cancelled() {
            return Err(PostError::cancelled(uri));
        }

        let response = self
            .async_client
            .post(uri)
            .basic_auth(username, Some(password))
            .header("Content-Type", "application/x-www-form-urlencoded")
            .header("Accept", "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| PostError::transport(uri, e.to_string()))?;

        check_status(uri, response.status().as_u16(), response.status().canonical_reason())
    }
}

fn check_status(uri: &str, status: u16, reason: Option<&str>) -> Result<(), PostError> {
    if status == 200 {
        Ok(())
    } else {
        Err(PostError::non_200(
            uri,
            status,
            reason.unwrap_or("unknown status").to_string(),
        ))
    }
}

/// In-memory `WebPoster` doubles for exercising `Connection`/`Sender`
/// without a real socket. Exported (not test-only) so both this crate's
/// unit tests and its `tests/` integration suite can script server
/// behavior.
pub mod testing {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Records every call and can be scripted to fail its first N calls
    /// before succeeding, matching the S2/S6 scenarios.
    pub struct StubWebPoster {
        pub calls: Mutex<Vec<String>>,
        fail_count: AtomicUsize,
    }

    impl StubWebPoster {
        pub fn always_ok() -> Self {
            StubWebPoster {
                calls: Mutex::new(Vec::new()),
                fail_count: AtomicUsize::new(0),
            }
        }

        pub fn fail_n_times(n: usize) -> Self {
            StubWebPoster {
                calls: Mutex::new(Vec::new()),
                fail_count: AtomicUsize::new(n),
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl WebPoster for StubWebPoster {
        fn post_sync(
            &self,
            uri: &str,
            body: String,
            _username: &str,
            _password: &str,
            _cancel: &CancelToken,
        ) -> Result<(), PostError> {
            self.calls.lock().unwrap().push(body);
            if self.fail_count.load(Ordering::SeqCst) > 0 {
                self.fail_count.fetch_sub(1, Ordering::SeqCst);
                Err(PostError::non_200(uri, 500, "internal error"))
            } else {
                Ok(())
            }
        }

        async fn post_async(
            &self,
            uri: &str,
            body: String,
            username: &str,
            password: &str,
            cancel: &CancelToken,
        ) -> Result<(), PostError> {
            self.post_sync(uri, body, username, password, cancel)
        }
    }
}
