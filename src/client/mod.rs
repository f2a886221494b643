//! Remote API client module.

mod openai;
mod types;

pub use openai::*;
pub use types::*;
