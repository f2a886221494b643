//! Pool module - batched execution of remote calls.

mod batch;

pub use batch::*;
