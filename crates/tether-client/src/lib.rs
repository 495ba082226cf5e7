//! Outbound side of the envelope protocol: calling peers and checking
//! rights against the permission authority.

pub mod access;
pub mod error;
pub mod invoker;

pub use access::{AccessError, AccessGuard, Clearance, OneOrMany};
pub use error::InvokeError;
pub use invoker::{Invoker, InvokerConfig};
