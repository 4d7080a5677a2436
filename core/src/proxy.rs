//! Typed request proxy.
//!
//! # Design
//! `Proxy` holds a base URL, a transport and the codec table, and none of
//! them change after construction, so one instance can serve any number of
//! concurrent callers. Every call is split the same way the wire exchange
//! is: `build_request` turns a route and payload into an `HttpRequest`, the
//! transport executes it exactly once, and `parse_response` turns the
//! `HttpResponse` into either a typed `Response` or a `RequestError`.
//!
//! Header precedence: caller headers are applied first, and the body codec's
//! `Content-Type` is only added when the caller did not set one.
//!
//! Query strings carry the query value as plain JSON, percent-encoded as a
//! whole: `?%7B%22page%22%3A2%7D` for `{"page":2}`.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::codec::{Codec, CodecRegistry, JsonCodec, JSON_CONTENT_TYPE};
use crate::date::{naive_iso_date, DatePromoter};
use crate::error::{ProxyError, RequestError};
use crate::http::{HttpRequest, HttpResponse};
use crate::route::{self, verb, Route};
use crate::transport::{Transport, UreqTransport};
use crate::types::{RequestPayload, Response};
use crate::value::Value;

#[derive(Debug, Clone)]
pub struct Proxy<T = UreqTransport> {
    base_url: String,
    transport: T,
    codecs: CodecRegistry,
    body_codec: Arc<dyn Codec>,
    query_codec: JsonCodec,
    promote: DatePromoter,
}

impl Proxy<UreqTransport> {
    /// A proxy on the default transport with the default codecs.
    pub fn new(base_url: &str) -> Self {
        Self::builder(base_url).build()
    }

    pub fn builder(base_url: &str) -> ProxyBuilder<UreqTransport> {
        ProxyBuilder::new(base_url, UreqTransport::new())
    }
}

impl<T: Transport> Proxy<T> {
    pub fn with_transport(base_url: &str, transport: T) -> Self {
        ProxyBuilder::new(base_url, transport).build()
    }

    /// The base URL with trailing slashes removed.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Perform one call of route `R`.
    pub fn request<R: Route>(&self, payload: RequestPayload<R>) -> Result<Response<R::Response>, ProxyError> {
        let request = self.build_request(&payload)?;
        debug!(method = %request.method, url = %request.url, "sending request");
        let response = self.transport.send(request).map_err(ProxyError::Transport)?;
        debug!(status = response.status, redirected = response.redirected, "response received");
        self.parse_response::<R>(response)
    }

    pub fn get<R>(&self, payload: RequestPayload<R>) -> Result<Response<R::Response>, ProxyError>
    where
        R: Route<Method = verb::Get>,
    {
        self.request(payload)
    }

    pub fn post<R>(&self, payload: RequestPayload<R>) -> Result<Response<R::Response>, ProxyError>
    where
        R: Route<Method = verb::Post>,
    {
        self.request(payload)
    }

    pub fn put<R>(&self, payload: RequestPayload<R>) -> Result<Response<R::Response>, ProxyError>
    where
        R: Route<Method = verb::Put>,
    {
        self.request(payload)
    }

    pub fn patch<R>(&self, payload: RequestPayload<R>) -> Result<Response<R::Response>, ProxyError>
    where
        R: Route<Method = verb::Patch>,
    {
        self.request(payload)
    }

    pub fn delete<R>(&self, payload: RequestPayload<R>) -> Result<Response<R::Response>, ProxyError>
    where
        R: Route<Method = verb::Delete>,
    {
        self.request(payload)
    }

    pub fn head<R>(&self, payload: RequestPayload<R>) -> Result<Response<R::Response>, ProxyError>
    where
        R: Route<Method = verb::Head>,
    {
        self.request(payload)
    }

    pub fn options<R>(&self, payload: RequestPayload<R>) -> Result<Response<R::Response>, ProxyError>
    where
        R: Route<Method = verb::Options>,
    {
        self.request(payload)
    }
}

impl<T> Proxy<T> {
    /// Turn a payload for route `R` into the request the transport sends.
    pub fn build_request<R: Route>(&self, payload: &RequestPayload<R>) -> Result<HttpRequest, ProxyError> {
        if !R::PATH.starts_with('/') {
            return Err(invalid_request::<R>("route paths must start with `/`".to_string()));
        }
        let params = match &payload.params {
            Some(params) => {
                serde_json::to_value(params).map_err(|e| invalid_request::<R>(e.to_string()))?
            }
            None => serde_json::Value::Null,
        };
        let path = route::substitute(R::PATH, &params).map_err(invalid_request::<R>)?;
        let mut url = format!("{}{path}", self.base_url);

        if let Some(query) = &payload.query {
            let value = Value::from_serialize(query).map_err(|e| ProxyError::Encode(e.into()))?;
            if let Some(text) = self.query_codec.encode(&value).map_err(ProxyError::Encode)? {
                url.push('?');
                url.push_str(&urlencoding::encode(&text));
            }
        }

        let mut headers = payload.headers.clone();
        let body = match &payload.body {
            Some(body) => {
                let value = Value::from_serialize_with(body, Some(self.promote))
                    .map_err(|e| ProxyError::Encode(e.into()))?;
                let encoded = self.body_codec.encode(&value).map_err(ProxyError::Encode)?;
                if encoded.is_some() {
                    headers.insert_if_absent("content-type", self.body_codec.content_type());
                }
                encoded
            }
            None => None,
        };

        Ok(HttpRequest {
            method: R::method(),
            url,
            headers,
            body,
            credentials: payload.credentials,
        })
    }

    /// Decode a response for route `R`; non-2xx statuses become
    /// `ProxyError::Request`.
    pub fn parse_response<R: Route>(&self, response: HttpResponse) -> Result<Response<R::Response>, ProxyError> {
        let body = self
            .codecs
            .decode(response.headers.get("content-type"), &response.body)
            .map_err(ProxyError::Decode)?;

        if !response.is_success() {
            let err = RequestError::from_body(response.status, body);
            warn!(status = response.status, code = %err.code, url = %response.url, "request failed");
            return Err(err.into());
        }

        let typed = body.into_typed::<R::Response>().map_err(ProxyError::InvalidResponse)?;
        Ok(Response {
            body: typed,
            headers: response.headers.flatten(),
            status: response.status,
            status_text: response.status_text,
            redirected: response.redirected,
            url: response.url,
        })
    }
}

fn invalid_request<R: Route>(reason: String) -> ProxyError {
    ProxyError::InvalidRequest {
        route: format!("{} {}", R::method(), R::PATH),
        reason,
    }
}

pub struct ProxyBuilder<T> {
    base_url: String,
    transport: T,
    codecs: CodecRegistry,
    body_codec: Arc<dyn Codec>,
    promote: DatePromoter,
}

impl<T> ProxyBuilder<T> {
    fn new(base_url: &str, transport: T) -> Self {
        Self {
            base_url: base_url.to_string(),
            transport,
            codecs: CodecRegistry::default(),
            body_codec: Arc::new(JsonCodec::default()),
            promote: naive_iso_date,
        }
    }

    pub fn transport<U: Transport>(self, transport: U) -> ProxyBuilder<U> {
        ProxyBuilder {
            base_url: self.base_url,
            transport,
            codecs: self.codecs,
            body_codec: self.body_codec,
            promote: self.promote,
        }
    }

    /// Codec for request bodies. It is also registered for decoding its own
    /// content type.
    pub fn body_codec(mut self, codec: impl Codec + 'static) -> Self {
        let codec: Arc<dyn Codec> = Arc::new(codec);
        self.codecs.register_shared(codec.content_type(), codec.clone());
        self.body_codec = codec;
        self
    }

    /// Decode bodies of `content_type` with `codec`.
    pub fn codec(mut self, content_type: &str, codec: impl Codec + 'static) -> Self {
        self.codecs.register(content_type, codec);
        self
    }

    /// Replace the predicate that promotes strings to dates. It applies to
    /// decoded JSON responses and to the `DateTime` fields of typed request
    /// bodies before the body codec sees them.
    pub fn date_promoter(mut self, promote: DatePromoter) -> Self {
        self.codecs.register(JSON_CONTENT_TYPE, JsonCodec::with_promoter(promote));
        self.promote = promote;
        self
    }

    pub fn build(self) -> Proxy<T> {
        Proxy {
            base_url: self.base_url.trim_end_matches('/').to_string(),
            transport: self.transport,
            codecs: self.codecs,
            body_codec: self.body_codec,
            query_codec: JsonCodec::default(),
            promote: self.promote,
        }
    }
}
