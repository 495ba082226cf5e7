use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::codes;
use crate::errors::{EnvelopeError, Fault};

/// Content type every envelope travels under.
pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Matches `application/json; charset=utf-8`, case-insensitive, with the
/// hyphen in `utf-8` optional.
pub fn is_json_content_type(value: &str) -> bool {
    let lowered = value.trim().to_ascii_lowercase();
    match lowered.strip_prefix("application/json; charset=utf") {
        Some(rest) => rest == "8" || rest == "-8",
        None => false,
    }
}

/// One `[service, method, path]` step an error travelled through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hop(pub String, pub String, pub String);

impl Hop {
    pub fn new(
        service: impl Into<String>,
        method: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self(service.into(), method.into(), path.into())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
    Text(String),
    /// `[field, reason]` pairs from body validation.
    Fields(Vec<(String, String)>),
    Other(Value),
}

impl Message {
    pub fn is_empty(&self) -> bool {
        match self {
            Message::Text(text) => text.is_empty(),
            Message::Fields(fields) => fields.is_empty(),
            Message::Other(value) => value.is_null(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Message::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl From<&str> for Message {
    fn from(value: &str) -> Self {
        Message::Text(value.to_string())
    }
}

impl From<String> for Message {
    fn from(value: String) -> Self {
        Message::Text(value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<Message>,
    /// Provenance list, oldest hop first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub service: Vec<Hop>,
}

impl ErrorBody {
    pub fn from_code(code: i64) -> Self {
        Self { code, msg: None, service: Vec::new() }
    }

    /// Message only, code 0.
    pub fn from_message(msg: impl Into<Message>) -> Self {
        Self { code: 0, msg: Some(msg.into()), service: Vec::new() }
    }

    pub fn from_pair(code: i64, msg: impl Into<Message>) -> Self {
        Self { code, msg: Some(msg.into()), service: Vec::new() }
    }

    pub fn fields<I, F, R>(code: i64, fields: I) -> Self
    where
        I: IntoIterator<Item = (F, R)>,
        F: Into<String>,
        R: Into<String>,
    {
        let pairs = fields.into_iter().map(|(f, r)| (f.into(), r.into())).collect();
        Self::from_pair(code, Message::Fields(pairs))
    }

    pub fn message_text(&self) -> Option<&str> {
        self.msg.as_ref().and_then(Message::as_text)
    }
}

/// Accepts the loose shapes peers have historically sent: a bare code, a
/// bare message, a `[code, message]` pair, or a full `{code, msg}` object.
impl TryFrom<Value> for ErrorBody {
    type Error = EnvelopeError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Number(n) => n
                .as_i64()
                .map(ErrorBody::from_code)
                .ok_or_else(|| EnvelopeError::InvalidArgument(format!("non-integer code {n}"))),
            Value::String(s) => Ok(ErrorBody::from_message(s)),
            Value::Array(items) if items.len() == 2 => {
                let code = items[0].as_i64().ok_or_else(|| {
                    EnvelopeError::InvalidArgument(format!("pair code {}", items[0]))
                })?;
                let msg: Message = serde_json::from_value(items[1].clone())?;
                Ok(ErrorBody::from_pair(code, msg))
            }
            Value::Object(_) => {
                serde_json::from_value(value).map_err(|e| EnvelopeError::InvalidArgument(e.to_string()))
            }
            other => Err(EnvelopeError::InvalidArgument(format!("unsupported error value {other}"))),
        }
    }
}

/// Result of every operation: optional data, error and warning.
///
/// Absent slots are omitted from the wire form, never written as `null`,
/// and a `null` value is treated as absent on the way in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<ErrorBody>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    warning: Option<Value>,
}

fn present(value: Value) -> Option<Value> {
    (!value.is_null()).then_some(value)
}

impl Envelope {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn success(data: impl Into<Value>) -> Self {
        Self { data: present(data.into()), ..Self::default() }
    }

    pub fn failure(error: ErrorBody) -> Self {
        Self { error: Some(error), ..Self::default() }
    }

    pub fn from_code(code: i64) -> Self {
        Self::failure(ErrorBody::from_code(code))
    }

    pub fn from_pair(code: i64, msg: impl Into<Message>) -> Self {
        Self::failure(ErrorBody::from_pair(code, msg))
    }

    pub fn from_struct(error: ErrorBody) -> Self {
        Self::failure(error)
    }

    /// Error-only envelope describing what `fault` carries.
    pub fn from_nested(fault: &Fault) -> Self {
        match fault {
            Fault::Response(inner) => match inner.error() {
                Some(error) => Self::failure(error.clone()),
                None => inner.clone(),
            },
            Fault::MissingData => Self::from_code(codes::NO_DATA),
            Fault::MissingSession => Self::from_code(codes::NO_SESSION),
            Fault::Internal(source) => Self::from_pair(codes::CRASHED, source.to_string()),
        }
    }

    pub fn from_parts(data: Option<Value>, error: Option<ErrorBody>, warning: Option<Value>) -> Self {
        Self {
            data: data.and_then(present),
            error,
            warning: warning.and_then(present),
        }
    }

    pub fn into_parts(self) -> (Option<Value>, Option<ErrorBody>, Option<Value>) {
        (self.data, self.error, self.warning)
    }

    pub fn with_warning(mut self, warning: impl Into<Value>) -> Self {
        self.warning = present(warning.into());
        self
    }

    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    pub fn error(&self) -> Option<&ErrorBody> {
        self.error.as_ref()
    }

    pub fn warning(&self) -> Option<&Value> {
        self.warning.as_ref()
    }

    pub fn data_exists(&self) -> bool {
        self.data.is_some()
    }

    pub fn error_exists(&self) -> bool {
        self.error.is_some()
    }

    pub fn warning_exists(&self) -> bool {
        self.warning.is_some()
    }

    pub fn error_code(&self) -> Option<i64> {
        self.error.as_ref().map(|e| e.code)
    }

    /// Appends a provenance hop. No-op on envelopes without an error.
    pub fn annotate(&mut self, hop: Hop) {
        if let Some(error) = self.error.as_mut() {
            error.service.push(hop);
        }
    }

    pub fn to_wire(&self) -> Result<Vec<u8>, EnvelopeError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_wire(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        let value: Value = serde_json::from_slice(bytes)?;
        if !value.is_object() {
            return Err(EnvelopeError::NotAnObject);
        }
        let envelope: Envelope = serde_json::from_value(value)?;
        Ok(Self::from_parts(envelope.data, envelope.error, envelope.warning))
    }
}

impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&text)
    }
}

impl From<ErrorBody> for Envelope {
    fn from(error: ErrorBody) -> Self {
        Self::failure(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn presence_ignores_truthiness() {
        for value in [json!(0), json!(false), json!([]), json!(""), json!({})] {
            let envelope = Envelope::success(value.clone());
            assert!(envelope.data_exists(), "{value} should count as data");
            assert!(!envelope.error_exists());
            assert!(!envelope.warning_exists());
        }
    }

    #[test]
    fn null_is_absent() {
        let envelope = Envelope::success(Value::Null);
        assert!(!envelope.data_exists());
        assert_eq!(envelope.to_wire().unwrap(), b"{}");
    }

    #[test]
    fn absent_slots_are_omitted_not_null() {
        let envelope = Envelope::from_code(codes::RIGHTS);
        let wire: Value = serde_json::from_slice(&envelope.to_wire().unwrap()).unwrap();
        assert_eq!(wire, json!({"error": {"code": 1000}}));
    }

    #[test]
    fn round_trip_preserves_every_presence_combination() {
        let error = ErrorBody::from_pair(codes::DB_NO_RECORD, "missing");
        for mask in 0..8u8 {
            let envelope = Envelope::from_parts(
                (mask & 1 != 0).then(|| json!(0)),
                (mask & 2 != 0).then(|| error.clone()),
                (mask & 4 != 0).then(|| json!({"note": false})),
            );
            let decoded = Envelope::from_wire(&envelope.to_wire().unwrap()).unwrap();
            assert_eq!(decoded, envelope);
            assert_eq!(decoded.data_exists(), mask & 1 != 0);
            assert_eq!(decoded.error_exists(), mask & 2 != 0);
            assert_eq!(decoded.warning_exists(), mask & 4 != 0);
        }
    }

    #[test]
    fn incoming_null_slots_are_absent() {
        let envelope = Envelope::from_wire(br#"{"data": null, "warning": null}"#).unwrap();
        assert!(!envelope.data_exists());
        assert!(!envelope.warning_exists());
    }

    #[test]
    fn from_wire_rejects_non_objects() {
        assert!(matches!(Envelope::from_wire(b"[1, 2]"), Err(EnvelopeError::NotAnObject)));
        assert!(matches!(Envelope::from_wire(b"{oops"), Err(EnvelopeError::Json(_))));
    }

    #[test]
    fn error_shapes_from_loose_values() {
        assert_eq!(ErrorBody::try_from(json!(1001)).unwrap(), ErrorBody::from_code(1001));
        assert_eq!(ErrorBody::try_from(json!("boom")).unwrap(), ErrorBody::from_message("boom"));
        assert_eq!(
            ErrorBody::try_from(json!([1100, "no record"])).unwrap(),
            ErrorBody::from_pair(1100, "no record")
        );
        let full = ErrorBody::try_from(json!({"code": 1200, "msg": "weak"})).unwrap();
        assert_eq!(full.code, 1200);
        assert_eq!(full.message_text(), Some("weak"));
    }

    #[test]
    fn unsupported_error_values_are_rejected() {
        for value in [json!(true), json!(1.5), json!([1, 2, 3]), json!(null)] {
            assert!(matches!(
                ErrorBody::try_from(value),
                Err(EnvelopeError::InvalidArgument(_))
            ));
        }
    }

    #[test]
    fn field_errors_serialize_as_pairs() {
        let error = ErrorBody::fields(codes::BODY_FIELD, [("_internal_", "missing")]);
        let wire = serde_json::to_value(&error).unwrap();
        assert_eq!(wire, json!({"code": 1001, "msg": [["_internal_", "missing"]]}));
        let back: ErrorBody = serde_json::from_value(wire).unwrap();
        assert_eq!(back, error);
    }

    #[test]
    fn annotate_accumulates_in_order() {
        let mut envelope = Envelope::from_code(codes::RIGHTS);
        envelope.annotate(Hop::new("brain", "GET", "/verify"));
        envelope.annotate(Hop::new("shop", "POST", "/order"));
        let wire: Value = serde_json::from_slice(&envelope.to_wire().unwrap()).unwrap();
        assert_eq!(
            wire["error"]["service"],
            json!([["brain", "GET", "/verify"], ["shop", "POST", "/order"]])
        );

        let mut ok = Envelope::success(1);
        ok.annotate(Hop::new("shop", "GET", "/order"));
        assert!(!ok.error_exists());
    }

    #[test]
    fn nested_fault_keeps_inner_error() {
        let inner = Envelope::from_pair(codes::DB_DUPLICATE, "taken").with_warning("w");
        let outer = Envelope::from_nested(&Fault::Response(inner));
        assert_eq!(outer.error_code(), Some(codes::DB_DUPLICATE));
        assert!(!outer.warning_exists());
        assert_eq!(Envelope::from_nested(&Fault::MissingSession).error_code(), Some(codes::NO_SESSION));
    }

    #[test]
    fn content_type_matching() {
        assert!(is_json_content_type("application/json; charset=utf-8"));
        assert!(is_json_content_type("Application/JSON; Charset=UTF8"));
        assert!(!is_json_content_type("application/json"));
        assert!(!is_json_content_type("text/plain"));
        assert!(!is_json_content_type("application/json; charset=utf-16"));
    }
}
