use tether_core::{EnvelopeError, Fault, RegistryError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InvokeError {
    /// The peer name is not in the registry; never retried.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("http client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("payload: {0}")]
    Payload(#[from] serde_json::Error),

    /// A 200 whose body is not an envelope.
    #[error("malformed response from {peer}: {source}")]
    MalformedResponse {
        peer: String,
        #[source]
        source: EnvelopeError,
    },

    #[error("no internal key configured")]
    NoInternalKey,

    #[error("internal calls need an object payload")]
    InternalPayload,
}

impl From<InvokeError> for Fault {
    fn from(error: InvokeError) -> Self {
        Fault::internal(error)
    }
}
