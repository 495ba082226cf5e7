use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::codes;
use crate::envelope::ErrorBody;
use crate::errors::Fault;
use crate::session::Session;

/// Transport details of the inbound call, kept for handlers and crash reports.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Environment {
    pub method: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    /// Lower-cased header names; `authorization` is never recorded.
    pub headers: BTreeMap<String, String>,
}

/// Context handed to every bound operation.
#[derive(Debug, Clone)]
pub struct Request {
    pub environment: Environment,
    data: Option<Value>,
    session: Option<Session>,
}

impl Request {
    pub fn new(environment: Environment) -> Self {
        Self {
            environment,
            data: None,
            session: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = (!data.is_null()).then_some(data);
        self
    }

    pub fn with_session(mut self, session: Session) -> Self {
        self.session = Some(session);
        self
    }

    pub fn has_data(&self) -> bool {
        self.data.is_some()
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    pub fn data(&self) -> Result<&Value, Fault> {
        self.data.as_ref().ok_or(Fault::MissingData)
    }

    pub fn data_mut(&mut self) -> Result<&mut Value, Fault> {
        self.data.as_mut().ok_or(Fault::MissingData)
    }

    /// Decodes the payload into `T`; a shape mismatch is a body-field error.
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<T, Fault> {
        let data = self.data()?;
        serde_json::from_value(data.clone())
            .map_err(|e| Fault::from(ErrorBody::from_pair(codes::BODY_FIELD, e.to_string())))
    }

    pub fn session(&self) -> Result<&Session, Fault> {
        self.session.as_ref().ok_or(Fault::MissingSession)
    }

    pub fn data_opt(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    pub fn session_opt(&self) -> Option<&Session> {
        self.session.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct Order {
        sku: String,
        qty: u32,
    }

    #[test]
    fn missing_slots_raise_dedicated_faults() {
        let req = Request::new(Environment::default());
        assert!(matches!(req.data(), Err(Fault::MissingData)));
        assert!(matches!(req.session(), Err(Fault::MissingSession)));
        assert!(matches!(req.data_as::<Order>(), Err(Fault::MissingData)));
    }

    #[test]
    fn data_as_decodes_or_reports_body_field() {
        let req = Request::new(Environment::default()).with_data(json!({"sku": "a-1", "qty": 2}));
        let order: Order = req.data_as().unwrap();
        assert_eq!((order.sku.as_str(), order.qty), ("a-1", 2));

        let req = Request::new(Environment::default()).with_data(json!({"sku": 5}));
        match req.data_as::<Order>() {
            Err(Fault::Response(envelope)) => {
                assert_eq!(envelope.error_code(), Some(codes::BODY_FIELD));
                assert!(!envelope.data_exists());
            }
            other => panic!("expected body field fault, got {other:?}"),
        }
    }
}
