//! WebSocket bridging: upgrade, echo, ordering.

mod common;

use common::*;

use gangway_types::{CallContext, WebSession, WebSocketStream};

#[tokio::test]
async fn websocket_echo_round_trip() {
    let port = spawn_ws_echo_app().await;
    let (session, _registry) = web_session(port).await;

    let client = TestWsStream::new();
    let accept = session
        .open_web_socket(
            "sock".into(),
            CallContext::default(),
            vec!["chat".into(), "superchat".into()],
            client.clone(),
        )
        .await
        .unwrap();
    assert_eq!(accept.protocol, ["chat"]);

    accept.server_stream.send_bytes(b"abc".to_vec()).await.unwrap();
    client.wait_for(3).await;
    assert_eq!(client.received(), b"abc");
}

#[tokio::test]
async fn websocket_bytes_stay_in_order() {
    let port = spawn_ws_echo_app().await;
    let (session, _registry) = web_session(port).await;

    let client = TestWsStream::new();
    let accept = session
        .open_web_socket("sock".into(), CallContext::default(), vec![], client.clone())
        .await
        .unwrap();

    let mut expected = Vec::new();
    for i in 0u8..50 {
        let message = vec![i; 64];
        expected.extend_from_slice(&message);
        accept.server_stream.send_bytes(message).await.unwrap();
    }
    client.wait_for(expected.len()).await;
    assert_eq!(client.received(), expected);
}

#[tokio::test]
async fn non_upgrading_app_fails_the_open() {
    let (port, _requests) =
        spawn_canned_app(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n".to_vec()).await;
    let (session, _registry) = web_session(port).await;

    let client = TestWsStream::new();
    assert!(session
        .open_web_socket("sock".into(), CallContext::default(), vec![], client)
        .await
        .is_err());
}

#[tokio::test]
async fn upgrade_request_carries_websocket_headers() {
    let port = spawn_ws_echo_app().await;
    let (session, _registry) = web_session(port).await;

    // The echo app asserts the Upgrade header itself; a successful open is
    // the check that the request was a well-formed upgrade.
    let client = TestWsStream::new();
    let accept = session
        .open_web_socket("sock".into(), CallContext::default(), vec!["chat".into()], client)
        .await
        .unwrap();
    assert_eq!(accept.protocol, ["chat"]);
}
