//! # Request Descriptor
//!
//! [`RequestDescriptor`] is what the routing engine sees instead of a parsed network
//! request: method, protocol version, URI, headers and a lazy body source. It is built
//! once per call, validated at construction and never mutated afterwards (apart from the
//! engine taking the body).
//!
//! There is no socket behind a test call, so the network identity accessors return
//! fixed placeholder values:
//!
//! | Accessor | Value |
//! |----------|-------|
//! | `local_address` | `0.0.0.0` |
//! | `local_port` | `9999` |
//! | `remote_address` | `127.0.0.1` |
//! | `remote_port` | `3333` |
//! | `is_secure` | `false` |

use bytes::{Bytes, BytesMut};
use http::{Method, Uri, Version};
use std::fmt;

use crate::error::CallError;
use crate::headers::Headers;
use crate::ids::RequestId;

/// Placeholder local address reported for in-process requests.
pub const LOCAL_ADDRESS: &str = "0.0.0.0";
/// Placeholder local port reported for in-process requests.
pub const LOCAL_PORT: u16 = 9999;
/// Placeholder peer address reported for in-process requests.
pub const REMOTE_ADDRESS: &str = "127.0.0.1";
/// Placeholder peer port reported for in-process requests.
pub const REMOTE_PORT: u16 = 3333;

/// Lazy sequence of request body chunks.
pub struct BodySource {
    chunks: Box<dyn Iterator<Item = Bytes> + Send>,
}

impl BodySource {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            chunks: Box::new(std::iter::empty()),
        }
    }

    /// Body produced chunk by chunk; the iterator is only driven when the engine reads.
    pub fn from_chunks<I>(chunks: I) -> Self
    where
        I: IntoIterator<Item = Bytes>,
        I::IntoIter: Send + 'static,
    {
        Self {
            chunks: Box::new(chunks.into_iter()),
        }
    }

    /// Single-chunk body. An empty buffer yields an empty source.
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        if bytes.is_empty() {
            Self::empty()
        } else {
            Self::from_chunks(std::iter::once(bytes))
        }
    }

    /// Drain every chunk into one contiguous buffer.
    #[must_use]
    pub fn collect_bytes(self) -> Bytes {
        let mut out = BytesMut::new();
        for chunk in self {
            out.extend_from_slice(&chunk);
        }
        out.freeze()
    }
}

impl Iterator for BodySource {
    type Item = Bytes;

    fn next(&mut self) -> Option<Bytes> {
        self.chunks.next()
    }
}

impl Default for BodySource {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for BodySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BodySource").finish_non_exhaustive()
    }
}

impl From<Bytes> for BodySource {
    fn from(bytes: Bytes) -> Self {
        Self::from_bytes(bytes)
    }
}

impl From<Vec<u8>> for BodySource {
    fn from(bytes: Vec<u8>) -> Self {
        Self::from_bytes(bytes)
    }
}

impl From<String> for BodySource {
    fn from(text: String) -> Self {
        Self::from_bytes(text)
    }
}

impl From<&'static str> for BodySource {
    fn from(text: &'static str) -> Self {
        Self::from_bytes(Bytes::from_static(text.as_bytes()))
    }
}

/// Immutable description of one synthetic request.
#[derive(Debug)]
pub struct RequestDescriptor {
    request_id: RequestId,
    method: Method,
    version: Version,
    uri: Uri,
    headers: Headers,
    body: BodySource,
}

impl RequestDescriptor {
    /// Validate and assemble a descriptor.
    ///
    /// # Arguments
    ///
    /// * `method` - anything convertible to [`Method`] (`Method::GET`, `"PATCH"`)
    /// * `version` - protocol version to report
    /// * `uri` - anything convertible to [`Uri`]; it must carry a path
    /// * `headers` - request headers
    /// * `body` - body source; `None` means an empty body
    ///
    /// # Errors
    ///
    /// [`CallError::Validation`] when the method or URI cannot be parsed, or the URI has
    /// no path component.
    pub fn new<M, U>(
        method: M,
        version: Version,
        uri: U,
        headers: Headers,
        body: Option<BodySource>,
    ) -> Result<Self, CallError>
    where
        M: TryInto<Method>,
        M::Error: fmt::Display,
        U: TryInto<Uri>,
        U::Error: fmt::Display,
    {
        let method = method
            .try_into()
            .map_err(|e| CallError::validation("method", e))?;
        let uri: Uri = uri.try_into().map_err(|e| CallError::validation("uri", e))?;
        match uri.path_and_query() {
            Some(pq) if pq.path().starts_with('/') => {}
            _ => {
                return Err(CallError::validation(
                    "uri",
                    format!("'{}' must contain an absolute path", uri),
                ))
            }
        }

        Ok(Self {
            request_id: RequestId::new(),
            method,
            version,
            uri,
            headers,
            body: body.unwrap_or_default(),
        })
    }

    #[must_use]
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    #[must_use]
    pub fn version(&self) -> Version {
        self.version
    }

    #[must_use]
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    #[must_use]
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    #[must_use]
    pub fn query(&self) -> Option<&str> {
        self.uri.query()
    }

    #[must_use]
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Hand the body to the engine. Later calls observe an empty source.
    pub fn take_body(&mut self) -> BodySource {
        std::mem::take(&mut self.body)
    }

    #[must_use]
    pub fn local_address(&self) -> &'static str {
        LOCAL_ADDRESS
    }

    #[must_use]
    pub fn local_port(&self) -> u16 {
        LOCAL_PORT
    }

    #[must_use]
    pub fn remote_address(&self) -> &'static str {
        REMOTE_ADDRESS
    }

    #[must_use]
    pub fn remote_port(&self) -> u16 {
        REMOTE_PORT
    }

    #[must_use]
    pub fn is_secure(&self) -> bool {
        false
    }
}
