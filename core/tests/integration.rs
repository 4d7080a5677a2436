//! Every proxy operation against the live mock server.
//!
//! # Design
//! Starts the mock server on a random port, then drives the proxy over real
//! HTTP through `UreqTransport`. Route types and DTOs here are declared
//! independently of the server crate, so drift between the two shows up as
//! failures.

use std::net::SocketAddr;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use safe_proxy::{
    route, ExtendedCodec, Proxy, ProxyError, RequestPayload, UreqTransport, Value,
    EXTENDED_CONTENT_TYPE,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
struct HealthRequest {
    name: String,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    date1: DateTime<Utc>,
    date2: DateTime<Utc>,
    message: String,
    non_date1: String,
    non_date2: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct Project {
    created_at: DateTime<Utc>,
    title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct Employee {
    email: String,
    name: String,
    projects: Vec<Project>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct Company {
    employees: Vec<Employee>,
    name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct CompanyQuery {
    company: Company,
}

#[derive(Debug, Serialize)]
struct PostParams {
    #[serde(rename = "postId")]
    post_id: String,
}

#[derive(Debug, Serialize)]
struct CommentParams {
    #[serde(rename = "postId")]
    post_id: String,
    #[serde(rename = "commentId")]
    comment_id: u32,
}

#[derive(Debug, Serialize)]
struct CommentText {
    text: String,
}

#[derive(Debug, Serialize)]
struct CommentPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct Comment {
    id: u32,
    post_id: String,
    text: String,
}

route! {
    Health: Post "/api/v1/health" {
        body: HealthRequest,
        response: HealthResponse,
    }
}

route! {
    HealthDynamic: Post "/api/v1/health" {
        body: HealthRequest,
        response: Value,
    }
}

route! {
    Echo: Post "/api/v1/health/echo" {
        query: CompanyQuery,
        response: CompanyQuery,
    }
}

route! {
    EchoBody: Post "/api/v1/health/echo-body" {
        body: Value,
        response: Value,
    }
}

route! {
    EchoProject: Post "/api/v1/health/echo-body" {
        body: Project,
        response: Project,
    }
}

route! {
    EchoProjectDynamic: Post "/api/v1/health/echo-body" {
        body: Project,
        response: Value,
    }
}

route! {
    ErrorWithCode: Get "/api/v1/health/error/with-code" {
        response: Value,
    }
}

route! {
    ErrorWithoutCode: Get "/api/v1/health/error/without-code" {
        response: Value,
    }
}

route! {
    EchoHeaders: Get "/api/v1/health/headers" {
        response: std::collections::BTreeMap<String, String>,
    }
}

route! {
    Ping: Get "/api/v1/health/ping" {
        response: Value,
    }
}

route! {
    PingHead: Head "/api/v1/health/ping" {
        response: Value,
    }
}

route! {
    PingOptions: Options "/api/v1/health/ping" {
        response: (),
    }
}

route! {
    OldPing: Get "/api/v1/health/old-ping" {
        response: Value,
    }
}

route! {
    CreateComment: Post "/post/:postId/comment" {
        params: PostParams,
        body: CommentText,
        response: Comment,
    }
}

route! {
    GetComment: Get "/post/:postId/comment/:commentId" {
        params: CommentParams,
        response: Comment,
    }
}

route! {
    ReplaceComment: Put "/post/:postId/comment/:commentId" {
        params: CommentParams,
        body: CommentText,
        response: Comment,
    }
}

route! {
    PatchComment: Patch "/post/:postId/comment/:commentId" {
        params: CommentParams,
        body: CommentPatch,
        response: Comment,
    }
}

route! {
    DeleteComment: Delete "/post/:postId/comment/:commentId" {
        params: CommentParams,
        response: (),
    }
}

/// Start the mock server once for the whole test binary.
fn server() -> SocketAddr {
    static ADDR: OnceLock<SocketAddr> = OnceLock::new();
    *ADDR.get_or_init(|| {
        let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = std_listener.local_addr().unwrap();
        std_listener.set_nonblocking(true).unwrap();

        std::thread::spawn(move || {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            rt.block_on(async {
                let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
                mock_server::run(listener).await
            })
            .unwrap();
        });
        addr
    })
}

fn base_url() -> String {
    format!("http://{}", server())
}

fn proxy() -> Proxy {
    Proxy::new(&base_url())
}

fn instant() -> DateTime<Utc> {
    DateTime::from_timestamp_millis(1638525535483).unwrap()
}

fn frank() -> RequestPayload<Health> {
    RequestPayload::new().body(HealthRequest {
        name: "Frank".to_string(),
    })
}

#[test_log::test]
fn success_response_is_typed() {
    let response = proxy().post(frank()).unwrap();

    assert_eq!(
        response.body,
        HealthResponse {
            date1: instant(),
            date2: instant(),
            message: "Hello Frank!".to_string(),
            non_date1: "1638525535483".to_string(),
            non_date2: "December 17, 1995 03:24:00".to_string(),
        }
    );
    assert_eq!(response.headers["content-type"], "application/json");
    assert!(response.headers.contains_key("content-length"));
    assert!(!response.redirected);
    assert_eq!(response.status, 200);
    assert_eq!(response.status_text, "OK");
    assert_eq!(response.url, format!("{}/api/v1/health", base_url()));
}

#[test_log::test]
fn dynamic_response_promotes_only_iso_dates() {
    let response = proxy()
        .post(RequestPayload::<HealthDynamic>::new().body(HealthRequest {
            name: "Frank".to_string(),
        }))
        .unwrap();

    assert_eq!(response.body.get("date1"), Some(&Value::Date(instant())));
    assert_eq!(response.body.get("date2"), Some(&Value::Date(instant())));
    assert_eq!(response.body.get("nonDate1").and_then(Value::as_str), Some("1638525535483"));
    assert_eq!(
        response.body.get("nonDate2").and_then(Value::as_str),
        Some("December 17, 1995 03:24:00")
    );
}

#[test_log::test]
fn error_with_code_raises_request_error() {
    let err = proxy().get(RequestPayload::<ErrorWithCode>::new()).unwrap_err();
    let err = err.as_request_error().expect("typed error");
    assert_eq!(err.code, "SOMETHING_WENT_WRONG");
    assert_eq!(err.status, 400);
    assert_eq!(err.to_string(), "SOMETHING_WENT_WRONG");
}

#[test_log::test]
fn error_without_code_falls_back_to_empty_code() {
    let err = proxy().get(RequestPayload::<ErrorWithoutCode>::new()).unwrap_err();
    let err = err.as_request_error().expect("typed error");
    assert_eq!(err.code, "");
    assert_eq!(err.body, Value::Null);
}

#[test_log::test]
fn query_round_trips_through_server() {
    let query = CompanyQuery {
        company: Company {
            employees: vec![Employee {
                email: "frank@example.com".to_string(),
                name: "Frank".to_string(),
                projects: vec![Project {
                    created_at: instant(),
                    title: "Untitled Project".to_string(),
                }],
            }],
            name: "Frank's Company".to_string(),
        },
    };

    let response = proxy()
        .post(RequestPayload::<Echo>::new().query(query.clone()))
        .unwrap();
    assert_eq!(response.body, query);
}

#[test_log::test]
fn path_parameters_reach_the_server() {
    let proxy = proxy();
    let created = proxy
        .post(
            RequestPayload::<CreateComment>::new()
                .params(PostParams {
                    post_id: "5".to_string(),
                })
                .body(CommentText {
                    text: "First".to_string(),
                }),
        )
        .unwrap();
    assert_eq!(created.status, 201);
    let comment = created.body;
    assert_eq!(comment.post_id, "5");

    let params = || CommentParams {
        post_id: "5".to_string(),
        comment_id: comment.id,
    };

    let fetched = proxy
        .get(RequestPayload::<GetComment>::new().params(params()))
        .unwrap();
    assert!(fetched.url.ends_with(&format!("/post/5/comment/{}", comment.id)));
    assert_eq!(fetched.body, comment);

    let patched = proxy
        .patch(
            RequestPayload::<PatchComment>::new()
                .params(params())
                .body(CommentPatch { text: None }),
        )
        .unwrap();
    assert_eq!(patched.body.text, "First");

    let replaced = proxy
        .put(
            RequestPayload::<ReplaceComment>::new()
                .params(params())
                .body(CommentText {
                    text: "Second".to_string(),
                }),
        )
        .unwrap();
    assert_eq!(replaced.body.text, "Second");

    let deleted = proxy
        .delete(RequestPayload::<DeleteComment>::new().params(params()))
        .unwrap();
    assert_eq!(deleted.status, 204);

    let err = proxy
        .get(RequestPayload::<GetComment>::new().params(params()))
        .unwrap_err();
    let err = err.as_request_error().expect("typed error");
    assert_eq!(err.status, 404);
    assert_eq!(err.code, "COMMENT_NOT_FOUND");
    assert!(err.message.is_some());
}

#[test_log::test]
fn missing_params_never_reach_the_network() {
    let err = proxy().get(RequestPayload::<GetComment>::new()).unwrap_err();
    assert!(matches!(err, ProxyError::InvalidRequest { .. }), "{err}");
}

#[test_log::test]
fn text_responses_pass_through() {
    let response = proxy().get(RequestPayload::<Ping>::new()).unwrap();
    assert_eq!(response.body, Value::String("pong".to_string()));
    assert!(response.headers["content-type"].starts_with("text/plain"));
}

#[test_log::test]
fn head_has_no_body() {
    let response = proxy().head(RequestPayload::<PingHead>::new()).unwrap();
    assert_eq!(response.status, 200);
    assert!(response.body.is_undefined());
}

#[test_log::test]
fn options_reports_allowed_methods() {
    let response = proxy().options(RequestPayload::<PingOptions>::new()).unwrap();
    assert_eq!(response.status, 204);
    assert_eq!(response.headers["allow"], "GET, HEAD, OPTIONS");
}

#[test_log::test]
fn redirects_are_followed_and_reported() {
    let response = proxy().get(RequestPayload::<OldPing>::new()).unwrap();
    assert!(response.redirected);
    assert_eq!(response.url, format!("{}/api/v1/health/ping", base_url()));
    assert_eq!(response.body.as_str(), Some("pong"));
}

#[test_log::test]
fn credentials_are_sent_only_when_asked() {
    let transport = UreqTransport::builder().credential("x-session", "abc").build();
    let proxy = Proxy::with_transport(&base_url(), transport);

    let with = proxy
        .get(RequestPayload::<EchoHeaders>::new().credentials(true))
        .unwrap();
    assert_eq!(with.body.get("x-session").map(String::as_str), Some("abc"));

    let without = proxy.get(RequestPayload::<EchoHeaders>::new()).unwrap();
    assert!(!without.body.contains_key("x-session"));

    let overridden = proxy
        .get(
            RequestPayload::<EchoHeaders>::new()
                .credentials(true)
                .header("X-Session", "mine"),
        )
        .unwrap();
    assert_eq!(overridden.body.get("x-session").map(String::as_str), Some("mine"));
}

#[test_log::test]
fn extended_body_round_trips_dates_and_undefined() {
    let proxy = Proxy::builder(&base_url()).body_codec(ExtendedCodec).build();
    let body: Value = [
        ("createdAt", Value::Date(instant())),
        ("deletedAt", Value::Undefined),
        ("title", Value::from("Untitled Project")),
        ("tags", Value::Array(vec![Value::from("a"), Value::Null])),
    ]
    .into_iter()
    .collect();

    let response = proxy
        .post(RequestPayload::<EchoBody>::new().body(body.clone()))
        .unwrap();
    assert_eq!(response.headers["content-type"], EXTENDED_CONTENT_TYPE);
    assert_eq!(response.body, body);
}

#[test_log::test]
fn typed_body_round_trips_dates_under_extended_codec() {
    let proxy = Proxy::builder(&base_url()).body_codec(ExtendedCodec).build();
    let project = Project {
        created_at: instant(),
        title: "Untitled Project".to_string(),
    };

    let dynamic = proxy
        .post(RequestPayload::<EchoProjectDynamic>::new().body(project.clone()))
        .unwrap();
    assert_eq!(dynamic.headers["content-type"], EXTENDED_CONTENT_TYPE);
    assert_eq!(dynamic.body.get("createdAt"), Some(&Value::Date(instant())));
    assert_eq!(dynamic.body.get("title").and_then(Value::as_str), Some("Untitled Project"));

    let typed = proxy
        .post(RequestPayload::<EchoProject>::new().body(project.clone()))
        .unwrap();
    assert_eq!(typed.body, project);
}

#[test_log::test]
fn explicit_undefined_body_is_sent_under_extended_codec() {
    let proxy = Proxy::builder(&base_url()).body_codec(ExtendedCodec).build();
    let response = proxy
        .post(RequestPayload::<EchoBody>::new().body(Value::Undefined))
        .unwrap();
    assert_eq!(response.headers["content-type"], EXTENDED_CONTENT_TYPE);
    assert!(response.body.is_undefined());
}

#[test_log::test]
fn absent_body_sends_no_content_type() {
    let response = proxy().post(RequestPayload::<EchoBody>::new()).unwrap();
    assert_eq!(response.headers["content-type"], "text/plain");
    assert!(response.body.is_undefined());
}

#[test_log::test]
fn caller_content_type_is_not_replaced() {
    let proxy = Proxy::builder(&base_url()).body_codec(ExtendedCodec).build();
    let response = proxy
        .post(
            RequestPayload::<EchoBody>::new()
                .header("Content-Type", "application/json")
                .body(Value::Date(instant())),
        )
        .unwrap();
    // The extended envelope comes back labelled as plain JSON.
    assert_eq!(response.headers["content-type"], "application/json");
    assert_eq!(
        response.body.get("json").and_then(Value::as_date),
        Some(&instant())
    );
}

#[test_log::test]
fn concurrent_calls_see_only_their_own_results() {
    let proxy = proxy();
    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let proxy = &proxy;
                scope.spawn(move || {
                    let name = format!("caller-{i}");
                    let response = proxy
                        .post(RequestPayload::<Health>::new().body(HealthRequest { name: name.clone() }))
                        .unwrap();
                    assert_eq!(response.body.message, format!("Hello {name}!"));
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
    });
}

#[test_log::test]
fn unreachable_server_is_a_transport_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = Proxy::new(&format!("http://{addr}")).post(frank()).unwrap_err();
    assert!(matches!(err, ProxyError::Transport(_)), "{err}");
}
