use serde_json::Value;
use tether_core::{Envelope, Fault, Request};

/// `GET /health`
pub async fn health_read(_req: Request) -> Result<Envelope, Fault> {
    Ok(Envelope::success(true))
}

/// `GET /session`: the principal stored for the caller's token.
pub async fn session_read(req: Request) -> Result<Envelope, Fault> {
    let session = req.session()?;
    Ok(Envelope::success(Value::Object(session.principal.clone())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};
    use tether_core::{Environment, Session};

    #[tokio::test]
    async fn health_is_always_true() {
        let env = health_read(Request::new(Environment::default())).await.unwrap();
        assert_eq!(env.data(), Some(&json!(true)));
    }

    #[tokio::test]
    async fn session_read_needs_a_session() {
        let err = session_read(Request::new(Environment::default())).await.unwrap_err();
        assert!(matches!(err, Fault::MissingSession));

        let mut principal = Map::new();
        principal.insert("user".into(), json!("ada"));
        let session = Session { token: "t".into(), principal, expires_at: u64::MAX };
        let env = session_read(Request::new(Environment::default()).with_session(session))
            .await
            .unwrap();
        assert_eq!(env.data(), Some(&json!({"user": "ada"})));
    }
}
