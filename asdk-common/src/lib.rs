//! # ASDK Common Library
//!
//! Shared code for the avatar SDK client crates:
//! - Error types
//! - TOML configuration loading and write-back
//! - Progress events and the broadcast EventBus

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
