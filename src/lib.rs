//! # ayaye
//!
//! One app daemon in the Unum event fabric: it consumes the ledger's fact
//! and act streams under its own consumer group, answers `ask` commands
//! addressed to it via a text-generation service, and appends the reply as a
//! new act chained back to the triggering event.
//!
//! ## Architecture
//!
//! - **Queue client**: Redis streams with consumer-group semantics
//!   (at-least-once, ordered per stream, ack after full handling)
//! - **Registry client**: app registration and actor activity against the
//!   fabric REST API
//! - **Generation client**: single request/response LLM call
//! - **Dispatcher**: the eligibility/addressing decision tree
//! - **Worker**: the serial read → dispatch → append → ack loop

pub mod app;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod generation;
pub mod meta;
pub mod queue;
pub mod registry;
pub mod telemetry;
pub mod worker;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::{AyayeError, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::app::AyayeApp;
    pub use crate::config::Config;
    pub use crate::dispatch::{App, Dispatch, Dispatcher, SkipReason};
    pub use crate::error::{AyayeError, Result};
    pub use crate::event::{Event, EventKind, OutboundAct, What};
    pub use crate::generation::{Generator, OpenAiGenerator};
    pub use crate::meta::{AppMeta, DAEMON, WHO};
    pub use crate::queue::{InMemoryQueue, QueueClient, RedisQueue, StreamEntry};
    pub use crate::registry::{AppRecord, PeerRecord, Registry, RestRegistry};
    pub use crate::worker::Worker;
}
