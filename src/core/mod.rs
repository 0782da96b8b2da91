//! Core builder types and utilities

pub mod types;
pub mod error;
pub mod logging;
pub mod config;

pub use types::*;
pub use error::{BuildStage, Error};
pub use config::BuilderConfig;
