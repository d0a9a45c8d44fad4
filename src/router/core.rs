//! Route table and handler dispatch.

use anyhow::Context as _;
use bytes::Bytes;
use http::header::ALLOW;
use http::{HeaderMap, HeaderValue, Method, StatusCode};
use may::coroutine;
use serde::de::DeserializeOwned;
use smallvec::SmallVec;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use super::radix::RadixTree;
use super::writer::ResponseWriter;
use crate::client::panic_message;
use crate::config::RuntimeConfig;
use crate::engine::{CallContext, Routing};
use crate::error::RoutingFailure;
use crate::headers::Headers;
use crate::request::{BodySource, RequestDescriptor};
use crate::sink::ResponseSink;

/// Maximum number of path/query parameters before heap allocation.
pub const MAX_INLINE_PARAMS: usize = 8;

/// Parameter storage; names are shared with the route tree.
pub type ParamVec = SmallVec<[(Arc<str>, String); MAX_INLINE_PARAMS]>;

/// Route handler. Runs on a coroutine and owns the response writer.
pub type HandlerFn = Arc<dyn Fn(RouteRequest, ResponseWriter) + Send + Sync>;

pub(crate) struct RouteEntry {
    pub(crate) pattern: Arc<str>,
    pub(crate) handler: HandlerFn,
}

/// Request as seen by a route handler.
#[derive(Debug)]
pub struct RouteRequest {
    pub ctx: CallContext,
    pub method: Method,
    pub path: String,
    /// Pattern the request matched (`/pets/{id}`)
    pub pattern: Arc<str>,
    pub path_params: ParamVec,
    pub query_params: ParamVec,
    pub headers: Headers,
    pub body: BodySource,
}

impl RouteRequest {
    /// Path parameter by name; the last occurrence wins on duplicates.
    #[must_use]
    pub fn get_path_param(&self, name: &str) -> Option<&str> {
        self.path_params
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }

    /// Query parameter by name; the last occurrence wins on duplicates.
    #[must_use]
    pub fn get_query_param(&self, name: &str) -> Option<&str> {
        self.query_params
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers.first(name)
    }

    /// Drain the request body.
    pub fn take_body(&mut self) -> Bytes {
        std::mem::take(&mut self.body).collect_bytes()
    }

    /// Drain the request body and deserialize it as JSON.
    ///
    /// # Errors
    ///
    /// The body is not valid JSON for `T`.
    pub fn json<T: DeserializeOwned>(&mut self) -> anyhow::Result<T> {
        let body = self.take_body();
        serde_json::from_slice(&body).context("Failed to parse request body as JSON")
    }
}

/// Decode `a=1&b=x%20y` into parameter pairs. Undecodable pairs are kept raw.
pub(crate) fn parse_query(query: Option<&str>) -> ParamVec {
    let mut params = ParamVec::new();
    let Some(query) = query else {
        return params;
    };
    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
        params.push((Arc::from(decode(name)), decode(value)));
    }
    params
}

fn decode(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced,
    }
}

/// Method + path pattern routing engine.
///
/// ```rust,ignore
/// let table = RouteTable::new().get("/pets/{id}", |req, res| {
///     let id = req.get_path_param("id").unwrap_or_default().to_string();
///     res.text(StatusCode::OK, id);
/// });
/// let client = TestClient::new(table);
/// ```
///
/// Unmatched paths get a `404` response (`405` with an `allow` header when the path
/// exists under other methods). A panicking handler fails the call with a `500`
/// [`RoutingFailure`].
#[derive(Default)]
pub struct RouteTable {
    tree: RadixTree,
    runtime: RuntimeConfig,
}

impl RouteTable {
    /// Empty table with coroutine settings from the environment.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tree: RadixTree::default(),
            runtime: RuntimeConfig::from_env(),
        }
    }

    #[must_use]
    pub fn with_runtime(mut self, runtime: RuntimeConfig) -> Self {
        self.runtime = runtime;
        self
    }

    /// Register `handler` for `method` on `pattern`, replacing any previous handler.
    #[must_use]
    pub fn register<F>(mut self, method: Method, pattern: &str, handler: F) -> Self
    where
        F: Fn(RouteRequest, ResponseWriter) + Send + Sync + 'static,
    {
        let entry = Arc::new(RouteEntry {
            pattern: Arc::from(pattern),
            handler: Arc::new(handler),
        });
        if self.tree.insert(method.clone(), pattern, entry).is_some() {
            warn!(method = %method, pattern = %pattern, "Replacing existing route handler");
        } else {
            info!(method = %method, pattern = %pattern, "Route registered");
        }
        self
    }

    #[must_use]
    pub fn get<F>(self, pattern: &str, handler: F) -> Self
    where
        F: Fn(RouteRequest, ResponseWriter) + Send + Sync + 'static,
    {
        self.register(Method::GET, pattern, handler)
    }

    #[must_use]
    pub fn post<F>(self, pattern: &str, handler: F) -> Self
    where
        F: Fn(RouteRequest, ResponseWriter) + Send + Sync + 'static,
    {
        self.register(Method::POST, pattern, handler)
    }

    #[must_use]
    pub fn put<F>(self, pattern: &str, handler: F) -> Self
    where
        F: Fn(RouteRequest, ResponseWriter) + Send + Sync + 'static,
    {
        self.register(Method::PUT, pattern, handler)
    }

    #[must_use]
    pub fn delete<F>(self, pattern: &str, handler: F) -> Self
    where
        F: Fn(RouteRequest, ResponseWriter) + Send + Sync + 'static,
    {
        self.register(Method::DELETE, pattern, handler)
    }

    /// Number of registered method + pattern pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tree.len() == 0
    }

    fn reject(&self, req: &RequestDescriptor, res: Arc<dyn ResponseSink>) {
        let allowed = self.tree.allowed_methods(req.path());
        let writer = ResponseWriter::new(res);
        if allowed.is_empty() {
            warn!(method = %req.method(), path = %req.path(), "No route matched");
            writer.status(StatusCode::NOT_FOUND);
            return;
        }

        warn!(
            method = %req.method(),
            path = %req.path(),
            allowed = ?allowed,
            "Method not allowed"
        );
        let allow = allowed
            .iter()
            .map(Method::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(&allow) {
            headers.insert(ALLOW, value);
        }
        writer.send(
            StatusCode::METHOD_NOT_ALLOWED,
            Headers::from(headers),
            std::iter::empty::<Bytes>(),
        );
    }
}

impl Routing for RouteTable {
    fn route(
        &self,
        ctx: &CallContext,
        mut req: RequestDescriptor,
        res: Arc<dyn ResponseSink>,
    ) -> anyhow::Result<()> {
        let Some((entry, path_params)) = self.tree.lookup(req.method(), req.path()) else {
            self.reject(&req, res);
            return Ok(());
        };

        debug!(
            method = %req.method(),
            path = %req.path(),
            pattern = %entry.pattern,
            "Route matched"
        );

        let route_req = RouteRequest {
            ctx: ctx.clone(),
            method: req.method().clone(),
            path: req.path().to_string(),
            pattern: Arc::clone(&entry.pattern),
            path_params,
            query_params: parse_query(req.query()),
            headers: req.headers().clone(),
            body: req.take_body(),
        };
        let stack_size = self.runtime.stack_size;
        let span = ctx.span().clone();

        // SAFETY: may::coroutine::Builder::spawn() is marked unsafe by the may runtime.
        // The closure owns everything it touches (handler Arc, request, sink) and is
        // 'static + Send; handler panics are caught inside the coroutine.
        #[allow(unsafe_code)]
        let spawned = unsafe {
            coroutine::Builder::new()
                .name(format!("route:{}", entry.pattern))
                .stack_size(stack_size)
                .spawn(move || {
                    // Never enter `span` here: the coroutine can resume on another worker.
                    let started = Instant::now();
                    let writer = ResponseWriter::new(Arc::clone(&res));
                    let handler = &entry.handler;
                    match catch_unwind(AssertUnwindSafe(|| handler(route_req, writer))) {
                        Ok(()) => debug!(
                            parent: &span,
                            pattern = %entry.pattern,
                            execution_time_us = started.elapsed().as_micros() as u64,
                            "Handler execution complete"
                        ),
                        Err(panic) => {
                            let message = panic_message(panic.as_ref());
                            error!(
                                parent: &span,
                                pattern = %entry.pattern,
                                panic_message = %message,
                                "Handler panicked"
                            );
                            res.on_error(anyhow::Error::new(RoutingFailure::internal(
                                format!("Handler panicked: {}", message),
                            )));
                        }
                    }
                })
        };

        spawned
            .map(|_| ())
            .with_context(|| format!("Failed to spawn handler coroutine (stack_size={})", stack_size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_query_decodes_and_keeps_order() {
        let params = parse_query(Some("name=a%20b&tag=x+y&flag&name=c"));
        let pairs: Vec<(&str, &str)> = params
            .iter()
            .map(|(k, v)| (k.as_ref(), v.as_str()))
            .collect();
        assert_eq!(
            pairs,
            vec![("name", "a b"), ("tag", "x y"), ("flag", ""), ("name", "c")]
        );
        assert!(parse_query(None).is_empty());
    }

    #[test]
    fn test_last_query_param_wins() {
        let req = RouteRequest {
            ctx: CallContext::new(
                crate::ids::RequestId::new(),
                tracing::Span::none(),
                &http::Extensions::new(),
            ),
            method: Method::GET,
            path: "/pets".to_string(),
            pattern: Arc::from("/pets"),
            path_params: ParamVec::new(),
            query_params: parse_query(Some("limit=1&limit=5")),
            headers: Headers::new(),
            body: BodySource::empty(),
        };
        assert_eq!(req.get_query_param("limit"), Some("5"));
        assert_eq!(req.get_query_param("offset"), None);
    }

    #[test]
    fn test_register_counts_routes() {
        let table = RouteTable::new()
            .get("/pets", |_req, res| res.status(StatusCode::OK))
            .post("/pets", |_req, res| res.status(StatusCode::CREATED))
            .get("/pets", |_req, res| res.status(StatusCode::NO_CONTENT));
        assert_eq!(table.len(), 2);
        assert!(!table.is_empty());
    }
}
