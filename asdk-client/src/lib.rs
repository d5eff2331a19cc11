//! # asdk-client
//!
//! Client for the avatar computation service:
//! - Parameter transformation engine (settings → wire JSON)
//! - Job polling state machine
//! - Export selection, streaming download and archive extraction
//! - OAuth token acquisition and the HTTP transport
//! - Session context tying the above together

pub mod auth;
pub mod error;
pub mod jobs;
pub mod params;
pub mod pipeline;
pub mod retrieval;
pub mod session;
pub mod transport;

pub use error::{AsdkError, AsdkResult};
pub use pipeline::PipelineSelection;
pub use session::{AvatarOutcome, Photo, Session, Settings};
pub use transport::AvatarSdkClient;
