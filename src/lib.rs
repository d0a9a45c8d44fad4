//! # BRRTRouter Testkit
//!
//! In-process test client for routing engines. A test describes a request, hands it to
//! the engine together with a response sink, and blocks until the engine has announced
//! the response status and headers. No socket, no server loop: the engine's routing and
//! handler code runs exactly as it would behind a real listener.
//!
//! ## Overview
//!
//! ```text
//!  test ──▶ TestClient::call ──▶ Routing::route(ctx, RequestDescriptor, sink)
//!                                        │
//!                                        │ write_status_and_headers
//!                                        │ on_subscribe / on_next*
//!                                        │ on_complete | on_error
//!                                        ▼
//!  test ◀── TestResponse ◀──────── ResponseCollector
//! ```
//!
//! The engine may call the sink from any thread or `may` coroutine, before or after
//! `route` returns. The client waits on the collector's headers-ready signal with a
//! bound (10 minutes by default) and can be interrupted from another thread.
//!
//! ## Modules
//!
//! - **[`client`]** - [`TestClient`], the blocking call
//! - **[`builder`]** - [`TestRequest`], fluent request building
//! - **[`collector`]** - [`ResponseCollector`], the sink state machine
//! - **[`sink`]** - the [`ResponseSink`] / [`Subscription`] streaming contract
//! - **[`engine`]** - the [`Routing`] trait and per-call [`CallContext`]
//! - **[`router`]** - [`RouteTable`], a small radix-tree fixture engine for tests
//! - **[`signal`]** - single-resolution signals with interruptible waits
//! - **[`config`]** / **[`logging`]** - environment-driven settings and tracing setup
//!
//! ## Example
//!
//! ```rust,ignore
//! use brrtrouter_testkit::{RouteTable, TestClient};
//! use http::StatusCode;
//! use std::time::Duration;
//!
//! let table = RouteTable::new().get("/pets/{id}", |req, res| {
//!     let id = req.get_path_param("id").unwrap_or_default().to_string();
//!     res.json(StatusCode::OK, &serde_json::json!({ "id": id }));
//! });
//! let client = TestClient::new(table);
//!
//! let response = client.path("/pets/7").get()?;
//! assert_eq!(response.status(), StatusCode::OK);
//! let pet: serde_json::Value = response.json()?;
//! assert_eq!(pet["id"], "7");
//! ```

pub mod builder;
pub mod client;
pub mod collector;
pub mod config;
pub mod engine;
pub mod error;
pub mod headers;
pub mod ids;
pub mod logging;
pub mod request;
pub mod response;
pub mod router;
pub mod signal;
pub mod sink;

pub use builder::TestRequest;
pub use client::TestClient;
pub use collector::{CompletionOutcome, HeadersOutcome, Phase, ResponseCollector, ResponseHead, Terminal};
pub use config::{ClientConfig, RuntimeConfig};
pub use engine::{CallContext, Routing};
pub use error::{CallError, Failure, RoutingFailure};
pub use headers::Headers;
pub use ids::RequestId;
pub use request::{BodySource, RequestDescriptor};
pub use response::TestResponse;
pub use router::{ResponseWriter, RouteRequest, RouteTable};
pub use signal::{Interrupter, Observer, Signal, WaitOutcome};
pub use sink::{BackpressureStrategy, DataChunk, ResponseSink, Subscription};
