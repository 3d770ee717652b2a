#![forbid(unsafe_code)]

pub mod action;
pub mod config;
pub mod envelope;
pub mod error;
pub mod expr;
pub mod functions;
pub mod resources;
pub mod template;
pub mod validate;
pub mod value;

pub use crate::action::{
    Action, ActionBuildError, ActionError, ActionFactory, ConfigFactory, InvokeContext,
};
pub use crate::config::{decode_secret, Config, ConfigError, Secret};
pub use crate::envelope::{Envelope, EnvelopeData, Stage, Status};
pub use crate::error::{ValidationError, Violation};
pub use crate::expr::{ExprError, Predicate};
pub use crate::resources::{FsResourceStore, MemResourceStore, ResourceError, ResourceStore};
pub use crate::template::{render, TemplateError};
pub use crate::validate::Validator;
