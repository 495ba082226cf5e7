//! HTTP dispatcher for the envelope protocol.
//!
//! Operations are bound by name, every request runs through the same
//! pipeline (CORS, payload, session, invocation) and every outcome leaves
//! as an [`Envelope`](tether_core::Envelope).

pub mod config;
pub mod cors;
pub mod dispatcher;
pub mod error;
pub mod operation;
pub mod report;
mod route;

pub use config::DispatcherConfig;
pub use dispatcher::Dispatcher;
pub use error::DispatchError;
pub use operation::{Operation, OperationFuture};
pub use report::{CrashReport, ErrorReporter, LogReporter};
