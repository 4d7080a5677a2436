//! The seam between the proxy and the network.
//!
//! `Transport` executes one `HttpRequest` and reports the `HttpResponse`.
//! Status codes are data here; deciding what a 4xx means is the proxy's job.
//! `UreqTransport` is the default; `from_fn` wraps a closure, which is how
//! tests feed canned responses to a `Proxy`.

use std::time::Duration;

use tracing::trace;
use ureq::typestate::{WithBody, WithoutBody};
use ureq::{Agent, RequestBuilder, ResponseExt};

use crate::error::TransportError;
use crate::http::{Headers, HttpMethod, HttpRequest, HttpResponse};

pub trait Transport: Send + Sync {
    fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// A transport backed by a closure.
pub fn from_fn<F>(f: F) -> FnTransport<F>
where
    F: Fn(HttpRequest) -> Result<HttpResponse, TransportError> + Send + Sync,
{
    FnTransport(f)
}

#[derive(Clone)]
pub struct FnTransport<F>(F);

impl<F> Transport for FnTransport<F>
where
    F: Fn(HttpRequest) -> Result<HttpResponse, TransportError> + Send + Sync,
{
    fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        (self.0)(request)
    }
}

impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        (**self).send(request)
    }
}

/// Blocking transport on a shared `ureq` agent.
///
/// The agent pools connections, which is the only state shared between
/// calls. Credential headers configured here are attached only to requests
/// that ask for credentials, and never replace a header the caller set.
#[derive(Clone)]
pub struct UreqTransport {
    agent: Agent,
    credentials: Headers,
}

impl std::fmt::Debug for UreqTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UreqTransport")
            .field("credentials", &self.credentials.len())
            .finish_non_exhaustive()
    }
}

impl UreqTransport {
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> UreqTransportBuilder {
        UreqTransportBuilder::default()
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Default)]
pub struct UreqTransportBuilder {
    timeout: Option<Duration>,
    max_redirects: Option<u32>,
    credentials: Headers,
}

impl UreqTransportBuilder {
    /// Upper bound for a whole call. Unset means no limit.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Zero disables following redirects.
    pub fn max_redirects(mut self, max: u32) -> Self {
        self.max_redirects = Some(max);
        self
    }

    /// A header sent on requests whose payload sets `credentials`, e.g.
    /// `cookie` or `authorization`.
    pub fn credential(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.credentials.append(name, value);
        self
    }

    pub fn build(self) -> UreqTransport {
        let mut config = Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(self.timeout);
        if let Some(max) = self.max_redirects {
            config = config.max_redirects(max);
        }
        UreqTransport {
            agent: config.build().new_agent(),
            credentials: self.credentials,
        }
    }
}

impl Transport for UreqTransport {
    fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let HttpRequest {
            method,
            url,
            mut headers,
            body,
            credentials,
        } = request;

        if credentials {
            for (name, value) in self.credentials.iter() {
                headers.insert_if_absent(name, value);
            }
        }

        let url = url.as_str();
        let mut response = match method {
            HttpMethod::Get => without_body(self.agent.get(url), &headers, body),
            HttpMethod::Head => without_body(self.agent.head(url), &headers, body),
            HttpMethod::Delete => without_body(self.agent.delete(url), &headers, body),
            HttpMethod::Options => without_body(self.agent.options(url), &headers, body),
            HttpMethod::Post => with_body(self.agent.post(url), &headers, body),
            HttpMethod::Put => with_body(self.agent.put(url), &headers, body),
            HttpMethod::Patch => with_body(self.agent.patch(url), &headers, body),
        }?;

        let status = response.status();
        let final_url = response.get_uri().to_string();
        let response_headers: Headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let text = response.body_mut().read_to_string()?;
        trace!(status = status.as_u16(), bytes = text.len(), "response received");

        Ok(HttpResponse {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers: response_headers,
            body: text,
            redirected: final_url != url,
            url: final_url,
        })
    }
}

fn with_headers<B>(builder: RequestBuilder<B>, headers: &Headers) -> RequestBuilder<B> {
    headers
        .iter()
        .fold(builder, |builder, (name, value)| builder.header(name, value))
}

fn without_body(
    builder: RequestBuilder<WithoutBody>,
    headers: &Headers,
    body: Option<String>,
) -> Result<ureq::http::Response<ureq::Body>, ureq::Error> {
    let builder = with_headers(builder, headers);
    match body {
        Some(body) => builder.force_send_body().send(body.as_bytes()),
        None => builder.call(),
    }
}

fn with_body(
    builder: RequestBuilder<WithBody>,
    headers: &Headers,
    body: Option<String>,
) -> Result<ureq::http::Response<ureq::Body>, ureq::Error> {
    let builder = with_headers(builder, headers);
    match body {
        Some(body) => builder.send(body.as_bytes()),
        None => builder.send_empty(),
    }
}
