//! Caller side of the envelope protocol.
//!
//! Connection failures are retried: 3 attempts in total, 1 second apart.
//! After the last one the caller gets a `PEER_UNREACHABLE` envelope, not an
//! error. Nothing else is retried.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};

use tether_core::envelope::is_json_content_type;
use tether_core::internal_key::FIELD as INTERNAL_FIELD;
use tether_core::{codes, Action, Envelope, InternalKey, PeerRegistry, JSON_CONTENT_TYPE};

use crate::error::InvokeError;

pub const ATTEMPTS: u32 = 3;
pub const RETRY_PAUSE: Duration = Duration::from_secs(1);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct InvokerConfig {
    /// Bound on a single attempt.
    pub timeout: Duration,
    /// Used to sign `call_internal` payloads.
    pub internal_key: Option<InternalKey>,
}

impl Default for InvokerConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            internal_key: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Invoker {
    client: Client,
    peers: Arc<PeerRegistry>,
    internal_key: Option<InternalKey>,
}

impl Invoker {
    pub fn new(peers: Arc<PeerRegistry>) -> Result<Self, InvokeError> {
        Self::with_config(peers, InvokerConfig::default())
    }

    pub fn with_config(peers: Arc<PeerRegistry>, config: InvokerConfig) -> Result<Self, InvokeError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(InvokeError::Client)?;
        Ok(Self {
            client,
            peers,
            internal_key: config.internal_key,
        })
    }

    pub fn peers(&self) -> &PeerRegistry {
        &self.peers
    }

    /// Runs `action` on `path` of `peer`. `token` is the caller's session
    /// token, forwarded as `Authorization`.
    pub async fn call(
        &self,
        peer: &str,
        action: Action,
        path: &str,
        payload: Option<&Value>,
        token: Option<&str>,
    ) -> Result<Envelope, InvokeError> {
        let url = format!("{}{}", self.peers.resolve(peer)?, path);
        let wire = payload.map(serde_json::to_string).transpose()?;

        let mut attempt = 0;
        let response = loop {
            attempt += 1;
            let request = self.request(action, &url, wire.as_deref(), token);
            match request.send().await {
                Ok(response) => break response,
                Err(e) if !is_transport(&e) => {
                    warn!(%peer, %url, error = %e, "peer call could not be issued");
                    return Err(InvokeError::Client(e));
                }
                Err(e) if attempt < ATTEMPTS => {
                    warn!(%peer, %url, attempt, error = %e, "peer unreachable, retrying");
                    counter!("tether_peer_retries_total", "peer" => peer.to_string()).increment(1);
                    tokio::time::sleep(RETRY_PAUSE).await;
                }
                Err(e) => {
                    warn!(%peer, %url, attempt, error = %e, "peer unreachable, giving up");
                    counter!("tether_peer_unreachable_total", "peer" => peer.to_string()).increment(1);
                    return Ok(Envelope::from_pair(codes::PEER_UNREACHABLE, format!("{peer}: {url}")));
                }
            }
        };

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = match response.bytes().await {
            Ok(body) => body,
            Err(e) => {
                warn!(%peer, %url, error = %e, "peer response body lost");
                return Ok(Envelope::from_pair(codes::PEER_UNREACHABLE, format!("{peer}: {url}: {e}")));
            }
        };
        debug!(%peer, %url, status = status.as_u16(), "peer answered");

        let decode = |body: &[u8]| {
            Envelope::from_wire(body).map_err(|source| InvokeError::MalformedResponse {
                peer: peer.to_string(),
                source,
            })
        };

        if status == StatusCode::UNAUTHORIZED {
            return decode(&body);
        }
        if status != StatusCode::OK {
            return Ok(Envelope::from_pair(
                codes::PEER_STATUS,
                format!("{}: {}", status.as_u16(), String::from_utf8_lossy(&body)),
            ));
        }
        if !content_type.as_deref().is_some_and(is_json_content_type) {
            return Ok(Envelope::from_pair(
                codes::PEER_CONTENT_TYPE,
                content_type.unwrap_or_default(),
            ));
        }
        decode(&body)
    }

    fn request(&self, action: Action, url: &str, wire: Option<&str>, token: Option<&str>) -> RequestBuilder {
        let builder = match action {
            Action::Create => self.client.post(url),
            Action::Read => self.client.get(url),
            Action::Update => self.client.put(url),
            Action::Delete => self.client.delete(url),
        };

        // Reads carry the payload in `?d=`, everything else in a JSON body.
        let builder = match (action, wire) {
            (Action::Read, Some(json)) => builder.query(&[("d", json)]),
            (Action::Read, None) => builder,
            (_, Some(json)) => builder
                .header(CONTENT_TYPE, JSON_CONTENT_TYPE)
                .body(json.to_string()),
            (_, None) => builder.header(CONTENT_TYPE, JSON_CONTENT_TYPE),
        };

        match token {
            Some(token) => builder.header(AUTHORIZATION, token),
            None => builder,
        }
    }

    /// Like [`call`](Self::call) without a session, stamping a fresh
    /// internal key into the payload.
    pub async fn call_internal(
        &self,
        peer: &str,
        action: Action,
        path: &str,
        payload: Value,
    ) -> Result<Envelope, InvokeError> {
        let key = self.internal_key.as_ref().ok_or(InvokeError::NoInternalKey)?;
        let mut payload = match payload {
            Value::Null => Value::Object(Default::default()),
            Value::Object(map) => Value::Object(map),
            _ => return Err(InvokeError::InternalPayload),
        };
        if let Some(map) = payload.as_object_mut() {
            map.insert(INTERNAL_FIELD.to_string(), Value::String(key.generate()));
        }
        self.call(peer, action, path, Some(&payload), None).await
    }

    pub async fn create(&self, peer: &str, path: &str, payload: Option<&Value>, token: Option<&str>) -> Result<Envelope, InvokeError> {
        self.call(peer, Action::Create, path, payload, token).await
    }

    pub async fn read(&self, peer: &str, path: &str, payload: Option<&Value>, token: Option<&str>) -> Result<Envelope, InvokeError> {
        self.call(peer, Action::Read, path, payload, token).await
    }

    pub async fn update(&self, peer: &str, path: &str, payload: Option<&Value>, token: Option<&str>) -> Result<Envelope, InvokeError> {
        self.call(peer, Action::Update, path, payload, token).await
    }

    pub async fn delete(&self, peer: &str, path: &str, payload: Option<&Value>, token: Option<&str>) -> Result<Envelope, InvokeError> {
        self.call(peer, Action::Delete, path, payload, token).await
    }
}

/// Connection-level failures worth another attempt. A request that cannot
/// be built or a redirect loop will fail the same way every time.
fn is_transport(error: &reqwest::Error) -> bool {
    !(error.is_builder() || error.is_redirect())
}
