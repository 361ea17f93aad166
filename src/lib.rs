//! Client-side metrics collection: a persistent, size-bounded cache plus a
//! direct-send-with-queued-fallback shipping pipeline.
//!
//! The pieces compose as `Envelope` (built inside `Connection`) → `Connection`
//! → `WebPoster`, with `Sender` adding queue-backed fallback and replay on
//! top of a `Connection`, and `PersistentCache` available as an independent,
//! lower-level durable staging area for callers that want to batch many
//! events before shipping them.

pub mod cache;
pub mod cancel;
pub mod config;
pub mod connection;
pub mod endpoint;
pub mod envelope;
pub mod host_identity;
pub mod registry;
pub mod sender;
pub mod types;
pub mod web_poster;

pub use cache::record::{AggregateRecord, IndividualRecord, SequenceRecord};
pub use cache::{CacheError, PersistentCache};
pub use cancel::CancelToken;
pub use config::MetricsConfig;
pub use connection::{Connection, ConnectionError};
pub use envelope::build_envelope;
pub use host_identity::{
    FilesystemHostIdentity, FixedHostIdentity, HostIdentityError, HostIdentityProvider,
};
pub use registry::{lookup as lookup_event, LookupResult as EventLookupResult};
pub use sender::{QueueError, SendError, Sender};
pub use types::{Capacity, MetricValue, Payload};
pub use web_poster::{PostError, ReqwestWebPoster, WebPoster};
