//! Core data models for oaift.
//!
//! - `config`: project configuration and its validation
//! - `dataset`: messages, training records and reports
//! - `error`: error taxonomy

mod config;
mod dataset;
mod error;

pub use config::*;
pub use dataset::*;
pub use error::*;
