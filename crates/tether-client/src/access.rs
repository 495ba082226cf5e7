//! Rights checks against a remote permission authority.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use tether_core::internal_key::FIELD as INTERNAL_FIELD;
use tether_core::{codes, Action, Envelope, ErrorBody, Fault, InternalKey, Request, Session};

use crate::error::InvokeError;
use crate::invoker::Invoker;

pub const DEFAULT_AUTHORITY: &str = "brain";
pub const VERIFY_PATH: &str = "/verify";

/// A single permission name or right, or a list of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl From<&str> for OneOrMany<String> {
    fn from(name: &str) -> Self {
        OneOrMany::One(name.to_string())
    }
}

impl From<String> for OneOrMany<String> {
    fn from(name: String) -> Self {
        OneOrMany::One(name)
    }
}

impl From<Vec<String>> for OneOrMany<String> {
    fn from(names: Vec<String>) -> Self {
        OneOrMany::Many(names)
    }
}

impl From<&[&str]> for OneOrMany<String> {
    fn from(names: &[&str]) -> Self {
        OneOrMany::Many(names.iter().map(|n| n.to_string()).collect())
    }
}

impl From<u8> for OneOrMany<u8> {
    fn from(right: u8) -> Self {
        OneOrMany::One(right)
    }
}

impl From<Vec<u8>> for OneOrMany<u8> {
    fn from(rights: Vec<u8>) -> Self {
        OneOrMany::Many(rights)
    }
}

#[derive(Debug, Serialize)]
struct VerifyBody {
    name: OneOrMany<String>,
    right: OneOrMany<u8>,
}

#[derive(Debug, Error)]
pub enum AccessError {
    /// The authority answered but did not grant the right.
    #[error("insufficient rights")]
    Forbidden,

    /// The authority answered with an error of its own.
    #[error("authority rejected the check: {}", .0.code)]
    Rejected(ErrorBody),

    #[error("internal key missing")]
    MissingInternalKey,

    #[error("internal key invalid")]
    InvalidInternalKey,

    #[error(transparent)]
    Invoke(#[from] InvokeError),
}

impl AccessError {
    pub fn is_forbidden(&self) -> bool {
        match self {
            AccessError::Forbidden => true,
            AccessError::Rejected(error) => error.code == codes::RIGHTS,
            _ => false,
        }
    }
}

impl From<AccessError> for Fault {
    fn from(error: AccessError) -> Self {
        match error {
            AccessError::Forbidden => Fault::code(codes::RIGHTS),
            AccessError::Rejected(error) => Fault::from(error),
            AccessError::MissingInternalKey => {
                Fault::from(ErrorBody::fields(codes::BODY_FIELD, [(INTERNAL_FIELD, "missing")]))
            }
            AccessError::InvalidInternalKey => Fault::code(codes::INTERNAL_KEY),
            AccessError::Invoke(e) => Fault::from(e),
        }
    }
}

/// Outcome of [`AccessGuard::internal_or_verify`].
#[derive(Debug, Clone, PartialEq)]
pub enum Clearance {
    /// A valid internal key was present and has been stripped from the data.
    Internal,
    /// The session holds the requested rights.
    Verified,
    /// No key and no session; the envelope should be returned as-is.
    Unauthorized(Envelope),
}

#[derive(Debug, Clone)]
pub struct AccessGuard {
    invoker: Invoker,
    authority: String,
    path: String,
    key: Option<InternalKey>,
}

impl AccessGuard {
    pub fn new(invoker: Invoker) -> Self {
        Self {
            invoker,
            authority: DEFAULT_AUTHORITY.to_string(),
            path: VERIFY_PATH.to_string(),
            key: None,
        }
    }

    pub fn with_authority(mut self, peer: impl Into<String>, path: impl Into<String>) -> Self {
        self.authority = peer.into();
        self.path = path.into();
        self
    }

    pub fn with_internal_key(mut self, key: InternalKey) -> Self {
        self.key = Some(key);
        self
    }

    pub async fn verify(
        &self,
        session: &Session,
        name: impl Into<OneOrMany<String>>,
        right: impl Into<OneOrMany<u8>>,
    ) -> Result<(), AccessError> {
        let body = serde_json::to_value(VerifyBody {
            name: name.into(),
            right: right.into(),
        })
        .map_err(InvokeError::from)?;

        let envelope = self
            .invoker
            .call(&self.authority, Action::Read, &self.path, Some(&body), Some(&session.token))
            .await?;

        let (data, error, _) = envelope.into_parts();
        if let Some(error) = error {
            return Err(AccessError::Rejected(error));
        }
        if !data.as_ref().is_some_and(truthy) {
            return Err(AccessError::Forbidden);
        }
        Ok(())
    }

    /// [`verify`](Self::verify) with insufficient rights reported as `false`.
    pub async fn verify_return(
        &self,
        session: &Session,
        name: impl Into<OneOrMany<String>>,
        right: impl Into<OneOrMany<u8>>,
    ) -> Result<bool, AccessError> {
        match self.verify(session, name, right).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_forbidden() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Checks the internal key in `body` and returns the body without it.
    pub fn internal(&self, mut body: Value) -> Result<Value, AccessError> {
        let key = body
            .as_object_mut()
            .and_then(|map| map.remove(INTERNAL_FIELD))
            .ok_or(AccessError::MissingInternalKey)?;
        let valid = match (&self.key, key.as_str()) {
            (Some(secret), Some(key)) => secret.verify(key),
            _ => false,
        };
        if !valid {
            return Err(AccessError::InvalidInternalKey);
        }
        Ok(body)
    }

    pub async fn internal_or_verify(
        &self,
        request: &mut Request,
        name: impl Into<OneOrMany<String>>,
        right: impl Into<OneOrMany<u8>>,
    ) -> Result<Clearance, AccessError> {
        let keyed = request
            .data_opt()
            .and_then(Value::as_object)
            .is_some_and(|map| map.contains_key(INTERNAL_FIELD));

        if keyed {
            if let Ok(data) = request.data_mut() {
                *data = self.internal(data.clone())?;
            }
            return Ok(Clearance::Internal);
        }

        let Some(session) = request.session_opt() else {
            return Ok(Clearance::Unauthorized(Envelope::from_pair(
                codes::AUTHORIZATION,
                "Unauthorized",
            )));
        };
        self.verify(session, name, right).await?;
        Ok(Clearance::Verified)
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn truthiness_follows_json_values() {
        assert!(truthy(&json!(true)));
        assert!(truthy(&json!(1)));
        assert!(truthy(&json!({"ok": 1})));
        assert!(!truthy(&json!(false)));
        assert!(!truthy(&json!(0)));
        assert!(!truthy(&json!("")));
        assert!(!truthy(&json!([])));
    }

    #[test]
    fn verify_body_accepts_one_or_many() {
        let one = serde_json::to_value(VerifyBody {
            name: "user".into(),
            right: codes::rights::READ.into(),
        })
        .unwrap();
        assert_eq!(one, json!({"name": "user", "right": 1}));

        let many = serde_json::to_value(VerifyBody {
            name: (&["user", "order"][..]).into(),
            right: vec![codes::rights::READ, codes::rights::UPDATE].into(),
        })
        .unwrap();
        assert_eq!(many, json!({"name": ["user", "order"], "right": [1, 2]}));
    }

    #[test]
    fn access_errors_become_protocol_faults() {
        match Fault::from(AccessError::Forbidden) {
            Fault::Response(env) => assert_eq!(env.error_code(), Some(codes::RIGHTS)),
            other => panic!("unexpected {other:?}"),
        }
        match Fault::from(AccessError::InvalidInternalKey) {
            Fault::Response(env) => assert_eq!(env.error_code(), Some(codes::INTERNAL_KEY)),
            other => panic!("unexpected {other:?}"),
        }
        match Fault::from(AccessError::MissingInternalKey) {
            Fault::Response(env) => {
                let wire: Value = serde_json::from_slice(&env.to_wire().unwrap()).unwrap();
                assert_eq!(wire["error"]["code"], json!(codes::BODY_FIELD));
                assert_eq!(wire["error"]["msg"], json!([["_internal_", "missing"]]));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn remote_rights_error_counts_as_forbidden() {
        assert!(AccessError::Rejected(ErrorBody::from_code(codes::RIGHTS)).is_forbidden());
        assert!(!AccessError::Rejected(ErrorBody::from_code(codes::DB_NO_RECORD)).is_forbidden());
        assert!(!AccessError::InvalidInternalKey.is_forbidden());
    }
}
