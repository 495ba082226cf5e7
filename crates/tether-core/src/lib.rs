pub mod action;
pub mod codes;
pub mod envelope;
pub mod errors;
pub mod internal_key;
pub mod registry;
pub mod request;
pub mod session;
pub mod time;

pub use action::{Action, Binding, OperationNameError};
pub use envelope::{Envelope, ErrorBody, Hop, Message, JSON_CONTENT_TYPE};
pub use errors::{EnvelopeError, Fault};
pub use internal_key::InternalKey;
pub use registry::{PeerRegistry, RegistryError};
pub use request::{Environment, Request};
pub use session::{MemorySessionStore, Session, SessionStore, StoreError};
