use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use wireline::{AppError, MessageDispatcher, NetConfig, RawMessage, SocketHost};

const ECHO: i32 = 1;

fn test_config() -> NetConfig {
    NetConfig {
        ip: "127.0.0.1".to_string(),
        port: 0,
        ..NetConfig::default()
    }
}

async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..500 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within timeout");
}

struct EchoServer {
    host: SocketHost<RawMessage>,
    addr: SocketAddr,
    connects: Arc<AtomicUsize>,
    disconnects: Arc<AtomicUsize>,
}

async fn start_echo_server(config: NetConfig) -> EchoServer {
    let connects = Arc::new(AtomicUsize::new(0));
    let disconnects = Arc::new(AtomicUsize::new(0));
    let connects_hook = connects.clone();
    let disconnects_hook = disconnects.clone();

    let dispatcher = MessageDispatcher::<RawMessage>::new()
        .on_connect(move |_| {
            connects_hook.fetch_add(1, Ordering::SeqCst);
        })
        .on(ECHO, |session, msg| {
            let _ = session.send_msg(&msg);
        })
        .on_disconnect(move |_| {
            disconnects_hook.fetch_add(1, Ordering::SeqCst);
        });

    let host = SocketHost::new(config, Arc::new(dispatcher));
    let addr = host.start_as_server().await.unwrap();
    EchoServer {
        host,
        addr,
        connects,
        disconnects,
    }
}

struct TestClient {
    _host: SocketHost<RawMessage>,
    session: wireline::SessionSender<RawMessage>,
    messages: mpsc::UnboundedReceiver<RawMessage>,
    disconnects: mpsc::UnboundedReceiver<u64>,
}

async fn connect_client(addr: SocketAddr) -> TestClient {
    let (msg_tx, msg_rx) = mpsc::unbounded_channel();
    let (disc_tx, disc_rx) = mpsc::unbounded_channel();
    let dispatcher = MessageDispatcher::<RawMessage>::new()
        .on(ECHO, move |_, msg| {
            let _ = msg_tx.send(msg);
        })
        .on_disconnect(move |session_id| {
            let _ = disc_tx.send(session_id);
        });
    let host = SocketHost::new(test_config(), Arc::new(dispatcher));
    let session = host.start_as_client(&addr.to_string()).await.unwrap();
    TestClient {
        _host: host,
        session,
        messages: msg_rx,
        disconnects: disc_rx,
    }
}

#[tokio::test]
async fn echo_round_trip() {
    let server = start_echo_server(test_config()).await;
    let mut client = connect_client(server.addr).await;

    client
        .session
        .send_msg(&RawMessage::new(ECHO, &b"hello wire"[..]))
        .unwrap();

    let reply = client.messages.recv().await.unwrap();
    assert_eq!(reply.type_tag, ECHO);
    assert_eq!(&reply.payload[..], b"hello wire");
}

#[tokio::test]
async fn burst_of_messages_echoes_in_order() {
    let server = start_echo_server(test_config()).await;
    let mut client = connect_client(server.addr).await;

    for i in 0..50 {
        let payload = format!("msg-{}", i).into_bytes();
        client
            .session
            .send_msg(&RawMessage::new(ECHO, payload))
            .unwrap();
    }

    for i in 0..50 {
        let reply = client.messages.recv().await.unwrap();
        assert_eq!(reply.payload, format!("msg-{}", i).as_bytes());
    }
}

#[tokio::test]
async fn concurrent_clients_decode_independent_streams() {
    let server = start_echo_server(test_config()).await;

    let mut handles = Vec::new();
    for client_id in 0..8 {
        let addr = server.addr;
        handles.push(tokio::spawn(async move {
            let mut client = connect_client(addr).await;
            for i in 0..20 {
                let payload = format!("client-{}-msg-{}", client_id, i).into_bytes();
                client
                    .session
                    .send_msg(&RawMessage::new(ECHO, payload))
                    .unwrap();
            }
            for i in 0..20 {
                let reply = client.messages.recv().await.unwrap();
                assert_eq!(
                    reply.payload,
                    format!("client-{}-msg-{}", client_id, i).as_bytes()
                );
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
    assert_eq!(server.connects.load(Ordering::SeqCst), 8);
}

#[tokio::test]
async fn disconnect_fires_once_and_removes_session() {
    let server = start_echo_server(test_config()).await;
    let client = connect_client(server.addr).await;

    let host = server.host.clone();
    wait_until(move || host.session_count() == 1).await;

    client.session.close();

    let host = server.host.clone();
    wait_until(move || host.session_count() == 0).await;
    let disconnects = server.disconnects.clone();
    wait_until(move || disconnects.load(Ordering::SeqCst) == 1).await;
    // give any duplicate notification a chance to show up
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(server.disconnects.load(Ordering::SeqCst), 1);
    assert_eq!(server.host.session_count(), 0);
}

#[tokio::test]
async fn send_to_all_reaches_every_live_session() {
    let server = start_echo_server(test_config()).await;
    let mut clients = Vec::new();
    for _ in 0..3 {
        clients.push(connect_client(server.addr).await);
    }
    let host = server.host.clone();
    wait_until(move || host.session_count() == 3).await;

    let sent = server
        .host
        .send_to_all(&RawMessage::new(ECHO, &b"broadcast"[..]));
    assert_eq!(sent, 3);

    for client in &mut clients {
        let msg = client.messages.recv().await.unwrap();
        assert_eq!(&msg.payload[..], b"broadcast");
    }
}

#[tokio::test]
async fn send_after_close_returns_session_closed() {
    let server = start_echo_server(test_config()).await;
    let mut client = connect_client(server.addr).await;

    client.session.close();
    client.disconnects.recv().await.unwrap();

    let session = client.session.clone();
    wait_until(move || session.is_closed()).await;
    let err = client
        .session
        .send_msg(&RawMessage::new(ECHO, &b"late"[..]))
        .unwrap_err();
    assert!(matches!(err, AppError::SessionClosed(_)));
}

#[tokio::test]
async fn bind_failure_propagates_to_caller() {
    let server = start_echo_server(test_config()).await;

    let mut config = test_config();
    config.port = server.addr.port();
    let dispatcher = MessageDispatcher::<RawMessage>::new().on(ECHO, |_, _| {});
    let second = SocketHost::new(config, Arc::new(dispatcher));
    let err = second.start_as_server().await.unwrap_err();
    assert!(matches!(err, AppError::IllegalState(_)));
}

#[tokio::test]
async fn connect_failure_propagates_to_caller() {
    let dispatcher = MessageDispatcher::<RawMessage>::new().on(ECHO, |_, _| {});
    let host = SocketHost::new(test_config(), Arc::new(dispatcher));
    // nothing listens on this port
    let err = host.start_as_client("127.0.0.1:1").await.unwrap_err();
    assert!(matches!(err, AppError::Connect(_)));
}

// A peer declaring an absurd frame length must be disconnected, not buffered
// forever.
#[tokio::test]
async fn oversize_declared_length_closes_the_session() {
    let mut config = test_config();
    config.max_frame_size = 256;
    let server = start_echo_server(config).await;

    let mut raw = TcpStream::connect(server.addr).await.unwrap();
    let mut header = Vec::new();
    header.extend_from_slice(&1i32.to_be_bytes());
    header.extend_from_slice(&1_000_000i32.to_be_bytes());
    raw.write_all(&header).await.unwrap();

    let disconnects = server.disconnects.clone();
    wait_until(move || disconnects.load(Ordering::SeqCst) == 1).await;
    assert_eq!(server.host.session_count(), 0);
}

#[tokio::test]
async fn close_stops_accepting_but_keeps_sessions() {
    let server = start_echo_server(test_config()).await;
    let mut client = connect_client(server.addr).await;
    let host = server.host.clone();
    wait_until(move || host.session_count() == 1).await;

    server.host.close();
    tokio::time::sleep(Duration::from_millis(50)).await;

    // existing session still echoes
    client
        .session
        .send_msg(&RawMessage::new(ECHO, &b"still here"[..]))
        .unwrap();
    let reply = client.messages.recv().await.unwrap();
    assert_eq!(&reply.payload[..], b"still here");

    // new connections are refused once the listener is gone
    let dispatcher = MessageDispatcher::<RawMessage>::new().on(ECHO, |_, _| {});
    let late_host = SocketHost::new(test_config(), Arc::new(dispatcher));
    let res = late_host.start_as_client(&server.addr.to_string()).await;
    assert!(res.is_err());
}
