#![forbid(unsafe_code)]

//! Concrete outbound action variants. Each module exports the action type
//! plus the `ConfigFactory`/`ActionFactory` pair the engine is wired with.

pub mod graphql;
pub mod http;
pub mod slack;
mod transport;

pub use crate::graphql::{GraphqlAction, GraphqlActionFactory, GraphqlConfigFactory};
pub use crate::http::{HttpAction, HttpActionFactory, HttpConfigFactory};
pub use crate::slack::{SlackAction, SlackActionFactory, SlackConfigFactory};
