use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Query};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::IntoResponse;
use axum::routing::{MethodFilter, MethodRouter};
use axum::Router;
use tracing::debug;

use tether_core::{Action, Binding, SessionStore};

use crate::config::DispatcherConfig;
use crate::cors::Cors;
use crate::error::DispatchError;
use crate::operation::Operation;
use crate::report::ErrorReporter;
use crate::route::{Route, Shared};

struct Bound {
    name: String,
    binding: Binding,
    operation: Arc<dyn Operation>,
}

/// Route table for one service, built from operation names.
///
/// `user_profile_update` binds to `PUT /user/profile`; see [`Binding`].
pub struct Dispatcher {
    config: DispatcherConfig,
    sessions: Arc<dyn SessionStore>,
    reporter: Option<Arc<dyn ErrorReporter>>,
    operations: Vec<Bound>,
}

impl Dispatcher {
    pub fn new(config: DispatcherConfig, sessions: Arc<dyn SessionStore>) -> Self {
        Self {
            config,
            sessions,
            reporter: None,
            operations: Vec::new(),
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn operation(mut self, name: &str, operation: impl Operation) -> Result<Self, DispatchError> {
        let binding = Binding::parse(name)?;
        if let Some(existing) = self.operations.iter().find(|b| b.binding == binding) {
            return Err(DispatchError::DuplicateRoute {
                method: binding.action.verb(),
                path: binding.path,
                first: existing.name.clone(),
                second: name.to_string(),
            });
        }
        self.operations.push(Bound {
            name: name.to_string(),
            binding,
            operation: Arc::new(operation),
        });
        Ok(self)
    }

    /// `(verb, path)` for every bound operation, in registration order.
    pub fn routes(&self) -> Vec<(&'static str, &str)> {
        self.operations
            .iter()
            .map(|b| (b.binding.action.verb(), b.binding.path.as_str()))
            .collect()
    }

    pub fn into_router(self) -> Result<Router, DispatchError> {
        let Dispatcher {
            config,
            sessions,
            reporter,
            operations,
        } = self;

        let shared = Arc::new(Shared {
            service: config.service.clone(),
            verbose: config.verbose,
            cors: Cors::new(config.cors.as_deref())?,
            sessions,
            reporter,
        });

        let mut paths: BTreeMap<String, MethodRouter> = BTreeMap::new();
        for bound in operations {
            debug!(
                service = %shared.service,
                operation = %bound.name,
                method = bound.binding.action.verb(),
                path = %bound.binding.path,
                "binding operation"
            );
            let path = bound.binding.path.clone();
            let filter = method_filter(bound.binding.action);
            let route = Arc::new(Route {
                name: bound.name,
                binding: bound.binding,
                operation: bound.operation,
                shared: shared.clone(),
            });
            let handler = move |method: Method,
                                uri: Uri,
                                headers: HeaderMap,
                                query: Option<Query<HashMap<String, String>>>,
                                body: Bytes| async move {
                route
                    .dispatch(method, uri, headers, query.map(|Query(q)| q), body)
                    .await
            };
            let methods = paths.remove(&path).unwrap_or_else(MethodRouter::new);
            paths.insert(path, methods.on(filter, handler));
        }

        let mut router = Router::new();
        for (path, methods) in paths {
            let cors = shared.cors.clone();
            let preflight = move |headers: HeaderMap| async move { cors.preflight(&headers) };
            router = router.route(&path, methods.options(preflight));
        }

        let cors = shared.cors.clone();
        let router = router
            .fallback(move |method: Method, headers: HeaderMap| async move {
                if method == Method::OPTIONS {
                    cors.preflight(&headers)
                } else {
                    StatusCode::NOT_FOUND.into_response()
                }
            })
            .layer(DefaultBodyLimit::max(config.max_body_bytes));

        Ok(router)
    }
}

fn method_filter(action: Action) -> MethodFilter {
    match action {
        Action::Create => MethodFilter::POST,
        Action::Read => MethodFilter::GET,
        Action::Update => MethodFilter::PUT,
        Action::Delete => MethodFilter::DELETE,
    }
}

/// Registers functions under their own names:
///
/// ```ignore
/// let dispatcher = operations!(Dispatcher::new(config, sessions); order_create, order_read)?;
/// ```
#[macro_export]
macro_rules! operations {
    ($dispatcher:expr; $($operation:ident),+ $(,)?) => {
        (|| -> ::std::result::Result<$crate::Dispatcher, $crate::DispatchError> {
            let dispatcher = $dispatcher;
            $(let dispatcher = dispatcher.operation(stringify!($operation), $operation)?;)+
            Ok(dispatcher)
        })()
    };
}
