//! Exchange with peer backends through the federation gateway.
//!
//! - [`polling`] downloads new batches and advances the per-day cursor
//! - [`import`] validates and inserts the keys of downloaded batches
//! - [`send`] uploads the signed batches the IKS engine produced
//! - [`transport`] is the network seam all three share

pub mod import;
pub mod polling;
pub mod send;
pub mod transport;

pub use import::{ImportJob, ImportResult};
pub use polling::{PollingJob, PollingResult};
pub use send::{SendJob, SendResult};
pub use transport::{HttpTransport, OutboundBatch, PeerTransport, RemoteBatch, TransportError};
