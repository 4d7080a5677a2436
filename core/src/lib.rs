//! Typed HTTP request proxy.
//!
//! # Overview
//! An API is described as a set of route types, one per (path, method) pair,
//! each fixing its path parameters, query, request body and response body.
//! `Proxy` performs calls against such routes: it fills in the path, encodes
//! query and body, dispatches through a `Transport`, decodes the response by
//! content type and turns non-2xx answers into a `RequestError`.
//!
//! # Design
//! - `Proxy` is immutable after construction; concurrent calls share nothing
//!   but the transport's connection pool.
//! - Requests and responses are plain data (`HttpRequest`, `HttpResponse`),
//!   so building and parsing are testable without a network.
//! - Bodies decode into the dynamic `Value` first, then into the route's
//!   declared response type. `Value` keeps dates and `undefined`, which the
//!   extended JSON codec carries on the wire.
//! - Route DTOs are defined independently from the mock-server crate;
//!   integration tests catch schema drift.

pub mod codec;
pub mod date;
pub mod error;
pub mod extended;
pub mod http;
pub mod proxy;
pub mod route;
pub mod transport;
pub mod types;
pub mod value;

pub use codec::{Codec, CodecRegistry, JsonCodec, JSON_CONTENT_TYPE};
pub use date::{naive_iso_date, no_dates, DatePromoter};
pub use error::{CodecError, ProxyError, RequestError, TransportError};
pub use extended::{ExtendedCodec, EXTENDED_CONTENT_TYPE};
pub use http::{Headers, HttpMethod, HttpRequest, HttpResponse};
pub use proxy::{Proxy, ProxyBuilder};
pub use route::{verb, Route, Verb};
pub use transport::{from_fn, FnTransport, Transport, UreqTransport, UreqTransportBuilder};
pub use types::{RequestPayload, Response};
pub use value::{Map, Value};
