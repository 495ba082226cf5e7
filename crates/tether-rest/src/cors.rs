use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use regex::Regex;

pub const ALLOW_METHODS: &str = "DELETE, GET, POST, PUT, OPTIONS";
pub const ALLOW_HEADERS: &str = "Authorization,DNT,X-CustomHeader,Keep-Alive,User-Agent,X-Requested-With,If-Modified-Since,Cache-Control,Content-Type";
pub const MAX_AGE: &str = "1728000";

#[derive(Debug, Clone, Default)]
pub struct Cors {
    origins: Option<Regex>,
}

impl Cors {
    /// The pattern must match from the start of the `Origin` header.
    pub fn new(pattern: Option<&str>) -> Result<Self, regex::Error> {
        let origins = pattern
            .map(|p| Regex::new(&format!("^(?:{p})")))
            .transpose()?;
        Ok(Self { origins })
    }

    pub fn echo(&self, request: &HeaderMap, response: &mut HeaderMap) {
        let Some(origins) = &self.origins else {
            return;
        };
        let Some(origin) = request.get(header::ORIGIN) else {
            return;
        };
        let matches = origin.to_str().is_ok_and(|o| origins.is_match(o));
        if matches {
            response.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
            response.insert(header::VARY, HeaderValue::from_static("Origin"));
        }
    }

    /// Answer to `OPTIONS`, whatever the path.
    pub fn preflight(&self, request: &HeaderMap) -> Response {
        let mut response = (
            StatusCode::NO_CONTENT,
            [
                (header::ACCESS_CONTROL_ALLOW_METHODS, ALLOW_METHODS),
                (header::ACCESS_CONTROL_MAX_AGE, MAX_AGE),
                (header::ACCESS_CONTROL_ALLOW_HEADERS, ALLOW_HEADERS),
                (header::CONTENT_TYPE, "text/plain; charset=UTF-8"),
            ],
        )
            .into_response();
        self.echo(request, response.headers_mut());
        response
    }
}
