//! Route descriptors.
//!
//! # Design
//! Each (path, method) pair of an API is a type implementing `Route`. The
//! associated types fix what a call may send and what it gets back, so a
//! payload for an undeclared route, or a body of the wrong shape, does not
//! compile. Per-verb proxy operations additionally require
//! `Route<Method = verb::X>`, so `proxy.get::<CreatePost>(..)` is rejected
//! when `CreatePost` is a POST route.
//!
//! `()` stands for "not declared": a route without path parameters has
//! `Params = ()`, a route without a request body has `RequestBody = ()`.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::http::HttpMethod;

/// Type-level HTTP verbs.
pub mod verb {
    use crate::http::HttpMethod;

    pub trait Verb {
        const METHOD: HttpMethod;
    }

    macro_rules! verbs {
        ($($name:ident => $method:ident),* $(,)?) => {$(
            #[derive(Debug, Clone, Copy, PartialEq, Eq)]
            pub struct $name;

            impl Verb for $name {
                const METHOD: HttpMethod = HttpMethod::$method;
            }
        )*};
    }

    verbs! {
        Get => Get,
        Post => Post,
        Put => Put,
        Patch => Patch,
        Delete => Delete,
        Head => Head,
        Options => Options,
    }
}

pub use verb::Verb;

/// One (path, method) entry of an API.
pub trait Route {
    /// Path pattern, e.g. `/post/:postId/comment/:commentId`.
    const PATH: &'static str;

    type Method: Verb;
    type Params: Serialize + 'static;
    type Query: Serialize + 'static;
    type RequestBody: Serialize + 'static;
    type Response: DeserializeOwned + 'static;

    fn method() -> HttpMethod {
        <Self::Method as Verb>::METHOD
    }
}

/// Declare a route type.
///
/// ```
/// use safe_proxy::route;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize)]
/// pub struct CommentParams {
///     #[serde(rename = "postId")]
///     post_id: String,
///     #[serde(rename = "commentId")]
///     comment_id: u32,
/// }
///
/// #[derive(Deserialize)]
/// pub struct Comment {
///     text: String,
/// }
///
/// route! {
///     /// A single comment on a post.
///     pub GetComment: Get "/post/:postId/comment/:commentId" {
///         params: CommentParams,
///         response: Comment,
///     }
/// }
/// ```
///
/// `params`, `query` and `body` are optional and default to `()`; when given
/// they must appear in that order, followed by `response`.
#[macro_export]
macro_rules! route {
    (
        $(#[$meta:meta])*
        $vis:vis $name:ident : $verb:ident $path:literal {
            $(params: $params:ty,)?
            $(query: $query:ty,)?
            $(body: $body:ty,)?
            response: $response:ty $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy)]
        $vis struct $name;

        impl $crate::route::Route for $name {
            const PATH: &'static str = $path;
            type Method = $crate::route::verb::$verb;
            type Params = $crate::__declared_or_unit!($($params)?);
            type Query = $crate::__declared_or_unit!($($query)?);
            type RequestBody = $crate::__declared_or_unit!($($body)?);
            type Response = $response;
        }
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __declared_or_unit {
    () => {
        ()
    };
    ($ty:ty) => {
        $ty
    };
}

/// Names of the `:name` tokens in a path pattern, in order of appearance.
pub fn path_params(pattern: &str) -> Vec<&str> {
    tokens(pattern)
        .into_iter()
        .filter_map(|token| match token {
            Token::Param(name) => Some(name),
            Token::Literal(_) => None,
        })
        .collect()
}

/// Fill every `:name` token of `pattern` from `params`.
///
/// `params` is the serialized parameter set: `null` for "no parameters" or an
/// object whose members are strings, numbers or booleans. Every occurrence of
/// a token is replaced. A missing value or an undeclared parameter is an
/// error.
///
/// Values are percent-encoded as path segments, so `"a/b"` becomes `a%2Fb`
/// and stays one segment. Pass raw values: an already-encoded `"a%2Fb"` is
/// encoded again to `a%252Fb`.
pub fn substitute(pattern: &str, params: &serde_json::Value) -> Result<String, String> {
    let empty = serde_json::Map::new();
    let values = match params {
        serde_json::Value::Null => &empty,
        serde_json::Value::Object(map) => map,
        other => return Err(format!("path parameters must be an object, got {other}")),
    };

    let declared = path_params(pattern);
    if let Some(unknown) = values.keys().find(|k| !declared.contains(&k.as_str())) {
        return Err(format!("`{unknown}` is not a parameter of `{pattern}`"));
    }

    let mut path = String::with_capacity(pattern.len());
    for token in tokens(pattern) {
        match token {
            Token::Literal(text) => path.push_str(text),
            Token::Param(name) => {
                let value = values
                    .get(name)
                    .ok_or_else(|| format!("missing path parameter `{name}`"))?;
                let text = match value {
                    serde_json::Value::String(s) => s.clone(),
                    serde_json::Value::Number(n) => n.to_string(),
                    serde_json::Value::Bool(b) => b.to_string(),
                    other => return Err(format!("path parameter `{name}` must be a scalar, got {other}")),
                };
                path.push_str(&urlencoding::encode(&text));
            }
        }
    }
    Ok(path)
}

enum Token<'a> {
    Literal(&'a str),
    Param(&'a str),
}

fn is_param_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Split a pattern into literal runs and `:name` tokens. A `:` not followed
/// by a name character is literal.
fn tokens(pattern: &str) -> Vec<Token<'_>> {
    let mut out = Vec::new();
    let mut literal_start = 0;
    let mut rest = pattern.char_indices().peekable();
    while let Some((i, c)) = rest.next() {
        if c != ':' {
            continue;
        }
        let name_start = i + 1;
        let mut name_end = name_start;
        while let Some(&(j, next)) = rest.peek() {
            if !is_param_char(next) {
                break;
            }
            name_end = j + next.len_utf8();
            rest.next();
        }
        if name_end == name_start {
            continue;
        }
        if literal_start < i {
            out.push(Token::Literal(&pattern[literal_start..i]));
        }
        out.push(Token::Param(&pattern[name_start..name_end]));
        literal_start = name_end;
    }
    if literal_start < pattern.len() {
        out.push(Token::Literal(&pattern[literal_start..]));
    }
    out
}
