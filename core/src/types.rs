//! Per-call request payloads and decoded responses.

use std::collections::BTreeMap;
use std::fmt;

use crate::http::Headers;
use crate::route::Route;

/// Everything a caller may attach to one call of route `R`.
///
/// Built fresh for each call and consumed by it.
pub struct RequestPayload<R: Route> {
    pub body: Option<R::RequestBody>,
    pub query: Option<R::Query>,
    /// Path parameters. Values are percent-encoded into their segments, so
    /// pass them unencoded.
    pub params: Option<R::Params>,
    pub headers: Headers,
    /// Ask the transport to include its credentials.
    pub credentials: bool,
}

impl<R: Route> RequestPayload<R> {
    pub fn new() -> Self {
        Self {
            body: None,
            query: None,
            params: None,
            headers: Headers::new(),
            credentials: false,
        }
    }

    pub fn body(mut self, body: R::RequestBody) -> Self {
        self.body = Some(body);
        self
    }

    pub fn query(mut self, query: R::Query) -> Self {
        self.query = Some(query);
        self
    }

    pub fn params(mut self, params: R::Params) -> Self {
        self.params = Some(params);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn credentials(mut self, include: bool) -> Self {
        self.credentials = include;
        self
    }
}

impl<R: Route> Default for RequestPayload<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Route> fmt::Debug for RequestPayload<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestPayload")
            .field("route", &R::PATH)
            .field("body", &self.body.is_some())
            .field("query", &self.query.is_some())
            .field("params", &self.params.is_some())
            .field("headers", &self.headers)
            .field("credentials", &self.credentials)
            .finish()
    }
}

/// A successful (2xx) response with its body decoded into the route's shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Response<T> {
    pub body: T,
    /// Lowercase header names; repeated headers joined with `", "`.
    pub headers: BTreeMap<String, String>,
    pub status: u16,
    pub status_text: String,
    pub redirected: bool,
    /// Final URL after redirects.
    pub url: String,
}
