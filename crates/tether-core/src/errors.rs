use crate::envelope::{Envelope, ErrorBody, Message};

/// Failures building or decoding envelopes.
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("envelope is not a JSON object")]
    NotAnObject,

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

/// What an operation returns instead of an envelope.
#[derive(Debug, thiserror::Error)]
pub enum Fault {
    /// Written back to the caller as-is.
    #[error("response fault: {0}")]
    Response(Envelope),

    #[error("no data supplied")]
    MissingData,

    #[error("no session supplied")]
    MissingSession,

    /// Anything unplanned; becomes a crash envelope.
    #[error(transparent)]
    Internal(Box<dyn std::error::Error + Send + Sync>),
}

impl Fault {
    pub fn code(code: i64) -> Self {
        Fault::Response(Envelope::from_code(code))
    }

    pub fn pair(code: i64, msg: impl Into<Message>) -> Self {
        Fault::Response(Envelope::from_pair(code, msg))
    }

    pub fn internal(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Fault::Internal(source.into())
    }
}

impl From<ErrorBody> for Fault {
    fn from(error: ErrorBody) -> Self {
        Fault::Response(Envelope::failure(error))
    }
}

impl From<Envelope> for Fault {
    fn from(envelope: Envelope) -> Self {
        Fault::Response(envelope)
    }
}

impl From<EnvelopeError> for Fault {
    fn from(error: EnvelopeError) -> Self {
        Fault::Internal(Box::new(error))
    }
}

impl From<serde_json::Error> for Fault {
    fn from(error: serde_json::Error) -> Self {
        Fault::Internal(Box::new(error))
    }
}

impl From<crate::session::StoreError> for Fault {
    fn from(error: crate::session::StoreError) -> Self {
        Fault::Internal(Box::new(error))
    }
}
