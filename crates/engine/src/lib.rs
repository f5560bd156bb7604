//! dkpublish-engine: publication engines and federation jobs.
//!
//! Every engine and job is one sequential run triggered from outside
//! (see the `dkpublish` binary). Runs of different kinds work on disjoint
//! staging areas and source-table flags, so they may overlap; each instance
//! refuses to be entered while it is already running.
//!
//! # Public API
//!
//! - [`EksEngine`] -- exposure key sets for client apps
//! - [`IksEngine`] -- signed batches for the federation gateway
//! - [`federation`] -- polling, import and send jobs plus the peer transport
//! - [`signing`] -- the signing seam and its Ed25519 implementation
//! - [`verify`] -- archive signature checks

pub mod config;
pub mod eks;
pub mod error;
pub mod federation;
pub mod iks;
pub mod publishing;
pub mod result;
pub mod signing;
pub mod state;
pub mod verify;

pub use config::PipelineConfig;
pub use eks::{EksEngine, EksSigners};
pub use error::EngineError;
pub use iks::IksEngine;
pub use result::{ArtifactSummary, EngineRunResult};
pub use signing::{ContentSigner, ContentVerifier, Ed25519Signer, Ed25519Verifier, SignError};
pub use state::{RunGuard, RunState};
