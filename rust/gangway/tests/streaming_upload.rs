//! Upstream-streaming request tests: framing decisions, byte accounting,
//! and the call contract.

mod common;

use common::*;

use gangway_types::{
    BridgeError, ByteStream, CallContext, ContentBody, RequestStream, ResponseVariant, WebSession,
};

async fn open_stream(
    port: u16,
) -> (
    std::sync::Arc<dyn gangway_types::RequestStream>,
    std::sync::Arc<gangway::registry::SessionRegistry>,
) {
    let (session, registry) = web_session(port).await;
    let stream = session
        .post_streaming(
            "upload".into(),
            "application/octet-stream".into(),
            None,
            CallContext::default(),
        )
        .await
        .unwrap();
    (stream, registry)
}

#[tokio::test]
async fn expect_size_uses_content_length_and_exact_bytes() {
    let (port, mut requests) =
        spawn_canned_app(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok".to_vec()).await;
    let (stream, _registry) = open_stream(port).await;

    stream.expect_size(10).await.unwrap();
    stream.write(b"hell".to_vec()).await.unwrap();
    stream.write(b"o worl".to_vec()).await.unwrap();
    stream.done().await.unwrap();

    let response = stream.get_response().await.unwrap();
    match response.variant {
        ResponseVariant::Content(content) => match content.body {
            ContentBody::Bytes(bytes) => assert_eq!(bytes, b"ok"),
            other => panic!("expected buffered body, got {other:?}"),
        },
        other => panic!("expected content, got {other:?}"),
    }

    let raw = requests.recv().await.unwrap();
    let text = String::from_utf8_lossy(&raw);
    assert!(text.starts_with("POST /upload HTTP/1.1\r\n"));
    assert!(text.contains("Content-Type: application/octet-stream\r\n"));
    assert!(text.contains("Content-Length: 10\r\n"));
    assert!(!text.contains("Transfer-Encoding"));
    assert!(text.ends_with("\r\n\r\nhello worl"));
}

#[tokio::test]
async fn without_expect_size_the_upload_is_chunked() {
    let (port, mut requests) =
        spawn_canned_app(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok".to_vec()).await;
    let (stream, _registry) = open_stream(port).await;

    stream.write(b"hello".to_vec()).await.unwrap();
    stream.write(b" world".to_vec()).await.unwrap();
    stream.done().await.unwrap();
    stream.get_response().await.unwrap();

    let raw = requests.recv().await.unwrap();
    let text = String::from_utf8_lossy(&raw);
    assert!(text.contains("Transfer-Encoding: chunked\r\n"));
    assert!(!text.contains("Content-Length"));
    assert!(text.ends_with("\r\n\r\n5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n"));
}

#[tokio::test]
async fn done_with_no_writes_sends_an_empty_identity_body() {
    let (port, mut requests) =
        spawn_canned_app(b"HTTP/1.1 204 No Content\r\n\r\n".to_vec()).await;
    let (stream, _registry) = open_stream(port).await;

    stream.done().await.unwrap();
    stream.get_response().await.unwrap();

    let raw = requests.recv().await.unwrap();
    let text = String::from_utf8_lossy(&raw);
    assert!(text.contains("Content-Length: 0\r\n"));
    assert!(!text.contains("Transfer-Encoding"));
    assert!(text.ends_with("\r\n\r\n"));
}

#[tokio::test]
async fn response_can_arrive_before_done() {
    let (port, _requests) = spawn_early_response_app(
        b"HTTP/1.1 200 OK\r\nContent-Length: 7\r\n\r\nstarted".to_vec(),
    )
    .await;
    let (stream, _registry) = open_stream(port).await;

    stream.write(b"part one".to_vec()).await.unwrap();
    let response = stream.get_response().await.unwrap();
    match response.variant {
        ResponseVariant::Content(content) => match content.body {
            ContentBody::Bytes(bytes) => assert_eq!(bytes, b"started"),
            other => panic!("expected buffered body, got {other:?}"),
        },
        other => panic!("expected content, got {other:?}"),
    }

    // The upload continues after the response.
    stream.write(b", part two".to_vec()).await.unwrap();
    stream.done().await.unwrap();
}

#[tokio::test]
async fn contract_violations_fail_the_call() {
    let (port, _requests) =
        spawn_canned_app(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n".to_vec()).await;

    // write after done
    let (stream, _registry) = open_stream(port).await;
    stream.done().await.unwrap();
    assert!(matches!(
        stream.write(b"late".to_vec()).await,
        Err(BridgeError::Contract(_))
    ));

    // done twice
    let (stream, _registry) = open_stream(port).await;
    stream.done().await.unwrap();
    assert!(matches!(stream.done().await, Err(BridgeError::Contract(_))));

    // more bytes than declared
    let (stream, _registry) = open_stream(port).await;
    stream.expect_size(4).await.unwrap();
    assert!(matches!(
        stream.write(b"too many".to_vec()).await,
        Err(BridgeError::Contract(_))
    ));

    // fewer bytes than declared
    let (stream, _registry) = open_stream(port).await;
    stream.expect_size(8).await.unwrap();
    stream.write(b"shor".to_vec()).await.unwrap();
    assert!(matches!(stream.done().await, Err(BridgeError::Contract(_))));

    // getResponse twice
    let (stream, _registry) = open_stream(port).await;
    stream.done().await.unwrap();
    stream.get_response().await.unwrap();
    assert!(matches!(
        stream.get_response().await,
        Err(BridgeError::Contract(_))
    ));
}

#[tokio::test]
async fn put_streaming_uses_put() {
    let (port, mut requests) =
        spawn_canned_app(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n".to_vec()).await;
    let (session, _registry) = web_session(port).await;

    let stream = session
        .put_streaming("file".into(), "text/plain".into(), Some("gzip".into()), CallContext::default())
        .await
        .unwrap();
    stream.write(b"data".to_vec()).await.unwrap();
    stream.done().await.unwrap();
    stream.get_response().await.unwrap();

    let raw = requests.recv().await.unwrap();
    let text = String::from_utf8_lossy(&raw);
    assert!(text.starts_with("PUT /file HTTP/1.1\r\n"));
    assert!(text.contains("Content-Encoding: gzip\r\n"));
}
