//! Tests for the fluent request builder
//!
//! The engine here echoes what it received (method, target, headers, body) so each
//! test can assert on the request the builder produced.

use brrtrouter_testkit::{
    CallContext, CallError, DataChunk, Headers, RequestDescriptor, ResponseSink, TestClient,
};
use http::{Method, StatusCode, Version};
use serde_json::{json, Value};
use std::sync::Arc;

fn echo(_ctx: &CallContext, mut req: RequestDescriptor, res: Arc<dyn ResponseSink>) -> anyhow::Result<()> {
    let body = req.take_body().collect_bytes();
    let echoed = json!({
        "method": req.method().as_str(),
        "version": format!("{:?}", req.version()),
        "target": req.uri().to_string(),
        "headers": req.headers().to_multimap(),
        "body": String::from_utf8_lossy(&body),
    });
    res.write_status_and_headers(StatusCode::OK, Headers::new());
    res.on_next(DataChunk::from(serde_json::to_vec(&echoed)?));
    res.on_complete();
    Ok(())
}

fn client() -> TestClient {
    TestClient::new(echo)
}

fn echoed(response: brrtrouter_testkit::TestResponse) -> Value {
    response.json().unwrap()
}

#[test]
fn test_get_without_query_keeps_path() {
    let client = client();
    let request = client.path("/pets");
    assert_eq!(request.uri(), "/pets");
    let body = echoed(request.get().unwrap());
    assert_eq!(body["method"], "GET");
    assert_eq!(body["target"], "/pets");
    assert_eq!(body["version"], "HTTP/1.1");
}

#[test]
fn test_query_params_are_encoded_and_appended() {
    let client = client();
    let request = client
        .path("/search?sort=asc")
        .query_param("q", "a b")
        .query_param("tag", "x&y");
    assert_eq!(request.uri(), "/search?sort=asc&q=a%20b&tag=x%26y");
}

#[test]
fn test_repeated_headers_accumulate() {
    let client = client();
    let body = echoed(
        client
            .path("/")
            .header("Accept", "text/plain")
            .header("accept", "application/json")
            .get()
            .unwrap(),
    );
    assert_eq!(body["headers"]["accept"], json!(["text/plain", "application/json"]));
}

#[test]
fn test_invalid_header_is_validation_error() {
    let client = client();
    let err = client.path("/").header("bad header", "x").get().unwrap_err();
    assert!(matches!(err, CallError::Validation { field: "header", .. }));

    let err = client.path("/").header("x-ok", "line\nbreak").get().unwrap_err();
    assert!(matches!(err, CallError::Validation { field: "header", .. }));
}

#[test]
fn test_post_json_sets_content_type() {
    let client = client();
    let body = echoed(client.path("/pets").post_json(&json!({ "name": "Rex" })).unwrap());
    assert_eq!(body["method"], "POST");
    assert_eq!(body["headers"]["content-type"], json!(["application/json"]));
    assert_eq!(body["body"], r#"{"name":"Rex"}"#);
}

#[test]
fn test_explicit_content_type_is_kept() {
    let client = client();
    let body = echoed(
        client
            .path("/pets")
            .header("Content-Type", "application/merge-patch+json")
            .json(Method::PATCH, &json!({ "tag": null }))
            .unwrap(),
    );
    assert_eq!(body["method"], "PATCH");
    assert_eq!(
        body["headers"]["content-type"],
        json!(["application/merge-patch+json"])
    );
}

#[test]
fn test_version_and_custom_method() {
    let client = client();
    let body = echoed(
        client
            .path("/things/1")
            .version(Version::HTTP_2)
            .call(Method::from_bytes(b"PURGE").unwrap(), None)
            .unwrap(),
    );
    assert_eq!(body["method"], "PURGE");
    assert_eq!(body["version"], "HTTP/2.0");
}

#[test]
fn test_body_verbs() {
    let client = client();
    assert_eq!(echoed(client.path("/a").put("put body").unwrap())["body"], "put body");
    assert_eq!(echoed(client.path("/a").patch(b"patch".to_vec()).unwrap())["body"], "patch");
    assert_eq!(echoed(client.path("/a").delete().unwrap())["method"], "DELETE");
    assert_eq!(echoed(client.path("/a").options().unwrap())["method"], "OPTIONS");
}
