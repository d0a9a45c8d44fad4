//! # Router Module
//!
//! Fixture engine for tests. [`RouteTable`] implements [`Routing`](crate::Routing) so a
//! [`TestClient`](crate::TestClient) has a realistic engine to drive without any
//! generated server code. Handlers answer from coroutines, so callbacks reach the
//! client from another execution context, as they would from a real server. It is not
//! meant to serve traffic; production engines plug in through [`Routing`](crate::Routing).
//!
//! ## Architecture
//!
//! 1. **Registration**: `(method, pattern)` pairs are inserted into a radix tree.
//!    Patterns use `{name}` for path parameters (`/pets/{id}`).
//!
//! 2. **Matching**: each request path is walked segment by segment; static segments are
//!    preferred over parameters. Query parameters are percent-decoded.
//!
//! 3. **Dispatch**: the matched handler runs on its own `may` coroutine with a
//!    [`RouteRequest`] and a [`ResponseWriter`]. The writer announces headers and
//!    streams the body through the sink, honoring its demand.
//!
//! ## Example
//!
//! ```rust,ignore
//! use brrtrouter_testkit::{RouteTable, TestClient};
//! use http::StatusCode;
//!
//! let client = TestClient::new(
//!     RouteTable::new().get("/hello", |_req, res| res.text(StatusCode::OK, "hello")),
//! );
//! let response = client.path("/hello").get()?;
//! assert_eq!(response.wait_for_body(std::time::Duration::from_secs(1))?, "hello");
//! ```

mod core;
mod radix;
mod writer;

pub use core::{HandlerFn, ParamVec, RouteRequest, RouteTable, MAX_INLINE_PARAMS};
pub use writer::{ChunkPublisher, ResponseWriter};
