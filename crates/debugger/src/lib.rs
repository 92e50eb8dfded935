//! High level debugging session
//!
//! A [`Session`] drives one debuggee over the wire protocol of the
//! `transport` crate. It tracks the lifecycle in a [`SessionState`], keeps the
//! user's breakpoints and watchpoints in a [`Registry`] that survives
//! restarts of the debuggee, and filters exception reports through an
//! [`ExceptionChannel`].
mod breakable;
mod breakpoints;
mod commands;
mod error;
mod exceptions;
mod internals;
mod pending_requests;
pub mod records;
mod registry;
mod session;
pub(crate) mod state;
mod watchpoints;

pub use breakable::{BreakableLinesCache, CodeObject, LineTableProvider};
pub use breakpoints::Breakpoint;
pub use error::{ConditionError, RegistryError, SessionError};
pub use exceptions::{Delivery, ExceptionChannel};
pub use records::Record;
pub use registry::{
    ConditionEvaluator, HitOutcome, PointKey, Registry, TraceEvent, WatchOutcome,
};
pub use session::{Session, SessionConfig};
pub use state::{Event, SessionState, Transition};
pub use watchpoints::Watchpoint;
