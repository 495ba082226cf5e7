//! The per-request pipeline behind every bound operation.

use std::any::Any;
use std::backtrace::Backtrace;
use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use axum::body::Bytes;
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use futures::FutureExt;
use metrics::counter;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use tether_core::envelope::is_json_content_type;
use tether_core::{
    codes, Binding, Envelope, Environment, Fault, Hop, Message, Request, Session, SessionStore,
    StoreError, JSON_CONTENT_TYPE,
};

use crate::cors::Cors;
use crate::operation::Operation;
use crate::report::{CrashReport, ErrorReporter};

/// State shared by every route of one dispatcher.
pub(crate) struct Shared {
    pub service: String,
    pub verbose: bool,
    pub cors: Cors,
    pub sessions: Arc<dyn SessionStore>,
    pub reporter: Option<Arc<dyn ErrorReporter>>,
}

pub(crate) struct Route {
    pub name: String,
    pub binding: Binding,
    pub operation: Arc<dyn Operation>,
    pub shared: Arc<Shared>,
}

/// What the request looked like before the operation took ownership of it.
struct Snapshot {
    environment: Environment,
    data: Option<Value>,
    session: Option<Session>,
}

impl Route {
    pub async fn dispatch(
        &self,
        method: Method,
        uri: Uri,
        headers: HeaderMap,
        query: Option<HashMap<String, String>>,
        body: Bytes,
    ) -> Response {
        let shared = &self.shared;
        let path = uri.path().to_string();
        counter!(
            "tether_requests_total",
            "service" => shared.service.clone(),
            "method" => method.to_string(),
            "path" => path.clone()
        )
        .increment(1);

        let environment = environment(&method, &uri, &headers);
        let envelope = match self.prepare(environment, &method, &headers, query, &body).await {
            Ok(req) => self.invoke(req).await,
            Err(envelope) => envelope,
        };
        let (status, envelope) = self.normalize(envelope, method.as_str(), &path);

        if shared.verbose {
            info!(service = %shared.service, %method, %path, response = %envelope, "RETURNING");
        }

        let mut response = write(status, &envelope);
        shared.cors.echo(&headers, response.headers_mut());
        response
    }

    /// Payload extraction and session resolution. Failures here end the
    /// request before the operation runs.
    async fn prepare(
        &self,
        environment: Environment,
        method: &Method,
        headers: &HeaderMap,
        query: Option<HashMap<String, String>>,
        body: &Bytes,
    ) -> Result<Request, Envelope> {
        let mut req = Request::new(environment);
        if let Some(data) = extract(method, headers, query, body)? {
            req = req.with_data(data);
        }

        let Some(token) = headers.get(header::AUTHORIZATION) else {
            return Ok(req);
        };
        let unauthorized = || Envelope::from_pair(codes::AUTHORIZATION, "Unauthorized");
        let Ok(token) = token.to_str() else {
            return Err(unauthorized());
        };

        match resolve_session(self.shared.sessions.clone(), token.to_string()).await {
            Ok(Some(session)) => Ok(req.with_session(session)),
            Ok(None) => {
                debug!(service = %self.shared.service, "unknown session token");
                Err(unauthorized())
            }
            Err(e) => Err(self.crash(snapshot(&req), format!("session store: {e}"))),
        }
    }

    async fn invoke(&self, req: Request) -> Envelope {
        let before = snapshot(&req);
        if self.shared.verbose {
            let data = before.data.as_ref().map_or_else(|| "None".to_string(), Value::to_string);
            info!(
                service = %self.shared.service,
                method = %before.environment.method,
                path = %before.environment.path,
                operation = %self.name,
                action = %self.binding.action,
                %data,
                "REQUEST"
            );
        }

        let started = std::panic::catch_unwind(AssertUnwindSafe(|| self.operation.call(req)));
        let outcome = match started {
            Ok(future) => AssertUnwindSafe(future).catch_unwind().await,
            Err(panic) => Err(panic),
        };

        match outcome {
            Ok(Ok(envelope)) => envelope,
            Ok(Err(Fault::Response(envelope))) => envelope,
            Ok(Err(Fault::Internal(source))) => self.crash(before, describe(&*source)),
            Ok(Err(fault)) => Envelope::from_nested(&fault),
            Err(panic) => self.crash(before, panic_message(panic.as_ref())),
        }
    }

    fn crash(&self, snapshot: Snapshot, traceback: String) -> Envelope {
        let shared = &self.shared;
        let method = snapshot.environment.method.clone();
        let path = snapshot.environment.path.clone();
        let traceback = format!("{traceback}\n\nbacktrace:\n{}", Backtrace::force_capture());
        error!(service = %shared.service, %method, %path, %traceback, "operation crashed");
        counter!("tether_crashes_total", "service" => shared.service.clone()).increment(1);

        if let Some(reporter) = &shared.reporter {
            let report = CrashReport {
                service: shared.service.clone(),
                method,
                path: path.clone(),
                environment: snapshot.environment,
                data: snapshot.data,
                session: snapshot.session,
                traceback,
            };
            if !reporter.report(&report) {
                warn!(service = %shared.service, %path, "crash report was not delivered");
            }
        }

        Envelope::from_pair(codes::CRASHED, format!("{}:{}", shared.service, path))
    }

    /// Status selection and provenance for the outgoing envelope.
    fn normalize(&self, envelope: Envelope, method: &str, path: &str) -> (StatusCode, Envelope) {
        let (data, error, warning) = envelope.into_parts();
        let Some(mut error) = error else {
            return (StatusCode::OK, Envelope::from_parts(data, None, warning));
        };

        let mut status = StatusCode::OK;
        if error.code == codes::AUTHORIZATION {
            status = StatusCode::UNAUTHORIZED;
            if error.msg.as_ref().is_none_or(Message::is_empty) {
                error.msg = Some(Message::from("Unauthorized"));
            }
        }
        counter!(
            "tether_request_errors_total",
            "service" => self.shared.service.clone(),
            "code" => error.code.to_string()
        )
        .increment(1);

        let mut envelope = Envelope::from_parts(data, Some(error), warning);
        envelope.annotate(Hop::new(self.shared.service.as_str(), method, path));
        (status, envelope)
    }
}

/// Resolves and extends a token on the blocking pool; stores may do
/// synchronous I/O. A session that vanishes before it is extended is unknown.
async fn resolve_session(
    sessions: Arc<dyn SessionStore>,
    token: String,
) -> Result<Option<Session>, StoreError> {
    let resolved = tokio::task::spawn_blocking(move || -> Result<Option<Session>, StoreError> {
        let Some(mut session) = sessions.resolve(&token)? else {
            return Ok(None);
        };
        match sessions.extend(&mut session) {
            Ok(()) => Ok(Some(session)),
            Err(StoreError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    })
    .await;
    resolved.unwrap_or_else(|e| Err(StoreError::Unavailable(e.to_string())))
}

fn snapshot(req: &Request) -> Snapshot {
    Snapshot {
        environment: req.environment.clone(),
        data: req.data_opt().cloned(),
        session: req.session_opt().cloned(),
    }
}

fn environment(method: &Method, uri: &Uri, headers: &HeaderMap) -> Environment {
    let headers: BTreeMap<String, String> = headers
        .iter()
        .filter(|(name, _)| *name != header::AUTHORIZATION)
        .filter_map(|(name, value)| Some((name.as_str().to_string(), value.to_str().ok()?.to_string())))
        .collect();
    Environment {
        method: method.to_string(),
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        headers,
    }
}

fn malformed(raw: &str, err: serde_json::Error) -> Envelope {
    Envelope::from_pair(codes::REQUEST_DATA, format!("{raw}\n{err}"))
}

/// Reads the payload: `?d=` for reads, a JSON body for every other verb.
fn extract(
    method: &Method,
    headers: &HeaderMap,
    query: Option<HashMap<String, String>>,
    body: &Bytes,
) -> Result<Option<Value>, Envelope> {
    if *method == Method::GET {
        return match query.as_ref().and_then(|q| q.get("d")) {
            Some(raw) => serde_json::from_str(raw).map(Some).map_err(|e| malformed(raw, e)),
            None => Ok(None),
        };
    }

    let declared = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(is_json_content_type);
    if !declared {
        return Err(Envelope::from_code(codes::CONTENT_TYPE));
    }

    let text = String::from_utf8_lossy(body);
    if text.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str(&text).map(Some).map_err(|e| malformed(&text, e))
}

fn describe(err: &(dyn std::error::Error + 'static)) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        text.push_str("\ncaused by: ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panicked: {message}")
    } else {
        "panicked".to_string()
    }
}

pub(crate) fn write(status: StatusCode, envelope: &Envelope) -> Response {
    match envelope.to_wire() {
        Ok(body) => (status, [(header::CONTENT_TYPE, JSON_CONTENT_TYPE)], body).into_response(),
        Err(e) => {
            error!(error = %e, "envelope serialization failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
