#![forbid(unsafe_code)]

//! The request-processing pipeline: one inbound HTTP request drives a fixed
//! chain of stages ending in at most one outbound call, and exactly one
//! response envelope.

pub mod engine;
pub mod entry;
pub mod environment;
pub mod observe;

pub use crate::engine::{Engine, FunctionRequest, Outcome, ResponseWriter, Terminal};
pub use crate::entry::router;
pub use crate::environment::Environment;
