//! Fluent request builder returned by [`TestClient::path`].
//!
//! ```rust,ignore
//! let response = client
//!     .path("/pets/42")
//!     .query_param("fields", "name,tag")
//!     .header("Accept", "application/json")
//!     .get()?;
//! assert_eq!(response.status(), 200);
//! ```

use http::{Method, Version};
use serde::Serialize;

use crate::client::TestClient;
use crate::error::CallError;
use crate::headers::Headers;
use crate::request::BodySource;
use crate::response::TestResponse;

/// Request under construction; consumed by a terminal verb.
#[derive(Debug)]
#[must_use = "a TestRequest does nothing until a verb such as get() is called"]
pub struct TestRequest<'a> {
    client: &'a TestClient,
    path: String,
    version: Version,
    headers: Vec<(String, String)>,
    query: Vec<(String, String)>,
}

impl<'a> TestRequest<'a> {
    pub(crate) fn new(client: &'a TestClient, path: String) -> Self {
        Self {
            client,
            path,
            version: Version::HTTP_11,
            headers: Vec::new(),
            query: Vec::new(),
        }
    }

    /// Add a header value; repeated names accumulate.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Add a query parameter; name and value are percent-encoded.
    pub fn query_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    pub fn get(self) -> Result<TestResponse, CallError> {
        self.call(Method::GET, None)
    }

    pub fn head(self) -> Result<TestResponse, CallError> {
        self.call(Method::HEAD, None)
    }

    pub fn delete(self) -> Result<TestResponse, CallError> {
        self.call(Method::DELETE, None)
    }

    pub fn options(self) -> Result<TestResponse, CallError> {
        self.call(Method::OPTIONS, None)
    }

    pub fn trace(self) -> Result<TestResponse, CallError> {
        self.call(Method::TRACE, None)
    }

    pub fn post(self, body: impl Into<BodySource>) -> Result<TestResponse, CallError> {
        self.call(Method::POST, Some(body.into()))
    }

    pub fn put(self, body: impl Into<BodySource>) -> Result<TestResponse, CallError> {
        self.call(Method::PUT, Some(body.into()))
    }

    pub fn patch(self, body: impl Into<BodySource>) -> Result<TestResponse, CallError> {
        self.call(Method::PATCH, Some(body.into()))
    }

    /// POST `value` serialized as JSON.
    pub fn post_json<T: Serialize + ?Sized>(self, value: &T) -> Result<TestResponse, CallError> {
        self.json(Method::POST, value)
    }

    /// PUT `value` serialized as JSON.
    pub fn put_json<T: Serialize + ?Sized>(self, value: &T) -> Result<TestResponse, CallError> {
        self.json(Method::PUT, value)
    }

    /// Send `value` as a JSON body, adding `content-type: application/json` unless set.
    pub fn json<T: Serialize + ?Sized>(
        mut self,
        method: Method,
        value: &T,
    ) -> Result<TestResponse, CallError> {
        let body = serde_json::to_vec(value).map_err(|e| CallError::validation("body", e))?;
        if !self
            .headers
            .iter()
            .any(|(name, _)| name.eq_ignore_ascii_case("content-type"))
        {
            self.headers
                .push(("content-type".to_string(), "application/json".to_string()));
        }
        self.call(method, Some(BodySource::from_bytes(body)))
    }

    /// Send with an arbitrary method.
    pub fn call(self, method: Method, body: Option<BodySource>) -> Result<TestResponse, CallError> {
        let headers = Headers::try_from_pairs(self.headers.iter().map(|(k, v)| (k, v)))?;
        let uri = self.uri();
        self.client.call(method, self.version, uri, headers, body)
    }

    /// Request target: path plus encoded query string.
    #[must_use]
    pub fn uri(&self) -> String {
        if self.query.is_empty() {
            return self.path.clone();
        }
        let query = self
            .query
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        let separator = if self.path.contains('?') { '&' } else { '?' };
        format!("{}{}{}", self.path, separator, query)
    }
}
