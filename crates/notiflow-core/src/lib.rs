//! # Notiflow Core
//!
//! Shared building blocks for the step execution core: configuration,
//! the error taxonomy, persisted record types, the wire shapes exchanged
//! with step executors, and the collaborator traits the executor crate is
//! written against.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::NotiflowConfig;
pub use error::{NotiflowError, Result};
