//! Generative-media client library.
//!
//! Builds request payloads for video and image generation, talks to the
//! backend's REST endpoints, normalizes responses into display objects,
//! and tracks long-running video operations with [`poller::OperationPoller`].

pub mod api;
pub mod backend;
pub mod config;
pub mod messages;
pub mod poller;
pub mod requests;

pub use api::{GenMediaApi, GenMediaError};
pub use backend::{BackendStatusCheck, CheckContext, MediaBackend};
pub use config::GenMediaConfig;
pub use poller::{OperationPoller, StatusCheck};
