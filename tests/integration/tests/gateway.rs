//! Gateway connection tests against a loopback server.
//!
//! Each test plays the server side of the protocol by hand and asserts on
//! the frames the client sends back.

use qqbot_core::{DispatchFrame, Intents, MessageEvent};
use qqbot_dispatch::{CommandDescriptor, Context, Flow, Registry};
use qqbot_gateway::{ConnectionState, GatewayConnection, Transport};
use qqbot_integration_tests::*;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

fn echo_registry(tx: mpsc::UnboundedSender<String>) -> Registry {
    let mut registry = Registry::new();
    registry.on_message(move |_ctx: Context, message: MessageEvent| {
        let tx = tx.clone();
        async move {
            let _ = tx.send(message.text().to_string());
            anyhow::Ok(Flow::Continue)
        }
    });
    registry
}

fn connection(
    gateway: &FakeGateway,
    registry: Registry,
    config: qqbot_core::config::GatewayConfig,
) -> (Arc<GatewayConnection>, Arc<FakeApi>) {
    let api = FakeApi::new(gateway.url());
    let engine = engine(registry, api.clone());
    let conn = Arc::new(GatewayConnection::new(
        [0, 1],
        Intents::PUBLIC_GUILD_MESSAGES,
        config,
        api.clone(),
        engine,
    ));
    (conn, api)
}

async fn next_text(rx: &mut mpsc::UnboundedReceiver<String>) -> String {
    tokio::time::timeout(STEP, rx.recv())
        .await
        .expect("handler not called")
        .expect("handler dropped")
}

#[tokio::test]
async fn test_identify_and_dispatch_in_order() {
    let gateway = FakeGateway::bind().await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let (conn, _api) = connection(&gateway, echo_registry(tx), fast_gateway_config());
    let task = conn.clone().start();

    let mut socket = gateway.accept().await;
    socket.hello(45_000).await;
    let identify = socket.recv_op(2).await;
    assert_eq!(identify.payload["token"], "QQBot test-token");
    assert_eq!(identify.payload["intents"], json!(Intents::PUBLIC_GUILD_MESSAGES.bits()));
    assert_eq!(identify.payload["shard"], json!([0, 1]));

    socket.send(&ready_frame(1, "S1")).await;
    socket.send(&message_frame(2, "<@!42> first")).await;
    socket.send(&message_frame(3, "second")).await;

    assert_eq!(next_text(&mut rx).await, "first");
    assert_eq!(next_text(&mut rx).await, "second");
    assert_eq!(conn.state(), ConnectionState::Active);
    assert_eq!(conn.session().session_id.as_deref(), Some("S1"));
    assert_eq!(conn.session().last_seq, Some(3));

    conn.stop();
    task.await.unwrap().unwrap();
    assert_eq!(conn.state(), ConnectionState::Closed);
    let session = conn.session();
    assert!(session.session_id.is_none());
    assert!(session.last_seq.is_none());
    assert_eq!(session.reconnect_count, 0);
}

#[tokio::test]
async fn test_zero_heartbeat_hello_is_ignored() {
    let gateway = FakeGateway::bind().await;
    let (conn, _api) = connection(&gateway, Registry::new(), fast_gateway_config());
    let task = conn.clone().start();

    let mut socket = gateway.accept().await;
    socket.hello(0).await;
    socket.hello(45_000).await;

    // Only the second HELLO gets a handshake
    let handshake = socket.recv().await.unwrap();
    assert_eq!(handshake.op, 2);
    assert_eq!(conn.session().heartbeat_interval, Some(Duration::from_secs(45)));
    socket.send(&ready_frame(1, "S1")).await;

    conn.stop();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_duplicate_sequence_dispatched_once() {
    let gateway = FakeGateway::bind().await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let (conn, _api) = connection(&gateway, echo_registry(tx), fast_gateway_config());
    let task = conn.clone().start();

    let mut socket = gateway.accept().await;
    socket.hello(45_000).await;
    socket.recv_op(2).await;
    socket.send(&ready_frame(1, "S1")).await;

    socket.send(&message_frame(2, "once")).await;
    socket.send(&message_frame(2, "once")).await;
    socket.send(&message_frame(3, "after")).await;

    assert_eq!(next_text(&mut rx).await, "once");
    // Frames are dispatched in order, so the duplicate would have come first
    assert_eq!(next_text(&mut rx).await, "after");

    conn.stop();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_heartbeat_echoes_last_sequence() {
    let gateway = FakeGateway::bind().await;
    let (conn, _api) = connection(&gateway, Registry::new(), fast_gateway_config());
    let task = conn.clone().start();

    let mut socket = gateway.accept().await;
    socket.hello(100).await;
    socket.recv_op(2).await;
    socket.send(&ready_frame(7, "S1")).await;

    // The first heartbeat may predate READY
    let mut heartbeat = socket.recv_op(1).await;
    if heartbeat.payload.is_null() {
        heartbeat = socket.recv_op(1).await;
    }
    assert_eq!(heartbeat.payload, json!(7));
    socket.send(&DispatchFrame::outbound(qqbot_core::OpCode::HeartbeatAck, json!(null))).await;

    conn.stop();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_server_close_resumes_session() {
    let gateway = FakeGateway::bind().await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let (conn, _api) = connection(&gateway, echo_registry(tx), fast_gateway_config());
    let task = conn.clone().start();

    let mut socket = gateway.accept().await;
    socket.hello(45_000).await;
    socket.recv_op(2).await;
    socket.send(&ready_frame(1, "S1")).await;
    socket.send(&message_frame(5, "before")).await;
    assert_eq!(next_text(&mut rx).await, "before");
    socket.close().await;

    let mut socket = gateway.accept().await;
    socket.hello(45_000).await;
    let resume = socket.recv().await.unwrap();
    assert_eq!(resume.op, 6);
    assert_eq!(resume.payload["session_id"], "S1");
    assert_eq!(resume.payload["seq"], 5);

    socket
        .send(&DispatchFrame::dispatch(6, "RESUMED", json!("")))
        .await;
    socket.send(&message_frame(7, "after")).await;
    assert_eq!(next_text(&mut rx).await, "after");
    assert_eq!(conn.session().reconnect_count, 0);

    conn.stop();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_idle_timeout_identifies_afresh() {
    let gateway = FakeGateway::bind().await;
    let config = qqbot_core::config::GatewayConfig {
        idle_timeout_secs: 1,
        ..fast_gateway_config()
    };
    let (conn, _api) = connection(&gateway, Registry::new(), config);
    let task = conn.clone().start();

    let mut socket = gateway.accept().await;
    socket.hello(60_000).await;
    socket.recv_op(2).await;
    socket.send(&ready_frame(1, "S1")).await;

    // Stay silent past the idle threshold
    let mut second = gateway.accept().await;
    second.hello(60_000).await;
    let handshake = second.recv().await.unwrap();
    assert_eq!(handshake.op, 2, "idle timeout must not resume");

    conn.stop();
    task.await.unwrap().unwrap();
    drop(socket);
}

#[tokio::test]
async fn test_invalid_session_reidentifies() {
    let gateway = FakeGateway::bind().await;
    let (conn, _api) = connection(&gateway, Registry::new(), fast_gateway_config());
    let task = conn.clone().start();

    let mut socket = gateway.accept().await;
    socket.hello(45_000).await;
    socket.recv_op(2).await;
    socket.send(&ready_frame(1, "S1")).await;
    socket
        .send(&DispatchFrame::outbound(qqbot_core::OpCode::InvalidSession, json!(false)))
        .await;

    let mut socket = gateway.accept().await;
    socket.hello(45_000).await;
    let handshake = socket.recv().await.unwrap();
    assert_eq!(handshake.op, 2);

    conn.stop();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_force_reset_drops_session() {
    let gateway = FakeGateway::bind().await;
    let (conn, _api) = connection(&gateway, Registry::new(), fast_gateway_config());
    let task = conn.clone().start();

    let mut socket = gateway.accept().await;
    socket.hello(45_000).await;
    socket.recv_op(2).await;
    socket.send(&ready_frame(1, "S1")).await;
    socket.send(&message_frame(2, "x")).await;

    // Wait until READY has been processed
    for _ in 0..100 {
        if conn.state() == ConnectionState::Active {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    conn.force_reset();

    let mut socket = gateway.accept().await;
    socket.hello(45_000).await;
    assert_eq!(socket.recv().await.unwrap().op, 2);

    conn.stop();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_command_reply_goes_through_api() {
    let gateway = FakeGateway::bind().await;
    let mut registry = Registry::new();
    registry.command(CommandDescriptor::literal(["ping"], |ctx: Context, m: MessageEvent| async move {
        ctx.reply(&m, "pong").await?;
        anyhow::Ok(Flow::Stop)
    }));
    let (conn, api) = connection(&gateway, registry, fast_gateway_config());
    let task = conn.clone().start();

    let mut socket = gateway.accept().await;
    socket.hello(45_000).await;
    socket.recv_op(2).await;
    socket.send(&ready_frame(1, "S1")).await;
    socket.send(&message_frame(2, "<@!42> /ping")).await;

    for _ in 0..200 {
        if !api.sent.lock().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(api.sent_texts(), vec!["pong".to_string()]);
    let (channel, message) = api.sent.lock()[0].clone();
    assert_eq!(channel, "c1");
    assert_eq!(message.msg_id.as_deref(), Some("m2"));

    conn.stop();
    task.await.unwrap().unwrap();
}
