//! Pipeline module - dataset generation and fine-tune job creation.

mod consolidate;
mod extract;
mod fine_tune;
mod generate;
mod requests;
mod template;

pub use consolidate::*;
pub use extract::*;
pub use fine_tune::*;
pub use generate::*;
pub use requests::*;
pub use template::*;
