//! End-to-end connection-handler scenarios, driven over a real loopback
//! `TcpStream` against a `Broker` bound to an ephemeral port.

use std::sync::Arc;
use std::time::Duration;

use codec::{ConnectPacket, DisconnectPacket, EncodePacket};
use squatt_broker::config::BrokerConfig;
use squatt_broker::Broker;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

async fn spawn_broker() -> std::net::SocketAddr {
    let config = BrokerConfig::default();
    let broker = Arc::new(Broker::new(&config).unwrap());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn({
        let broker = broker.clone();
        async move { broker.route().await }
    });
    tokio::spawn(async move {
        let _ = broker.serve(listener).await;
    });

    addr
}

async fn read_connack(stream: &mut TcpStream) -> [u8; 4] {
    let mut buf = [0u8; 4];
    timeout(Duration::from_secs(2), stream.read_exact(&mut buf))
        .await
        .expect("timed out waiting for CONNACK")
        .expect("connection closed before CONNACK");
    buf
}

/// A CONNECT whose protocol name is not "MQTT", hand-assembled since the
/// codec's `ConnectPacket::new` cannot express a malformed protocol name.
fn raw_connect_bad_protocol_level() -> Vec<u8> {
    vec![
        0x10, 12, // CONNECT, remaining length 12
        0x00, 0x04, b'M', b'Q', b'T', b'T', // protocol name "MQTT"
        5,    // protocol level 5, not the required 4
        0x02, // connect flags: clean_session
        0x00, 0x3C, // keep alive 60
        0x00, 0x00, // client id, zero length
    ]
}

#[tokio::test]
async fn plain_connect_then_disconnect_closes_cleanly() {
    let addr = spawn_broker().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    let mut buf = Vec::new();
    ConnectPacket::new("scenario-1", 60).encode(&mut buf).unwrap();
    stream.write_all(&buf).await.unwrap();

    let connack = read_connack(&mut stream).await;
    assert_eq!(connack[0] >> 4, 2, "expected a CONNACK packet type");
    assert_eq!(connack[2], 0, "session_present must be false for a fresh client");
    assert_eq!(connack[3], 0, "expected return_code Accepted");

    let mut disconnect = Vec::new();
    DisconnectPacket.encode(&mut disconnect).unwrap();
    stream.write_all(&disconnect).await.unwrap();
    stream.shutdown().await.unwrap();

    let mut trailing = [0u8; 1];
    let n = timeout(Duration::from_secs(2), stream.read(&mut trailing))
        .await
        .expect("timed out waiting for socket close");
    assert_eq!(n.unwrap(), 0, "server must not send anything after DISCONNECT");
}

#[tokio::test]
async fn invalid_protocol_is_rejected_and_torn_down() {
    let addr = spawn_broker().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    stream
        .write_all(&raw_connect_bad_protocol_level())
        .await
        .unwrap();

    let connack = read_connack(&mut stream).await;
    assert_eq!(connack[0] >> 4, 2);
    assert_eq!(connack[3], 1, "expected return_code UnacceptableProtocolVersion");

    let mut trailing = [0u8; 1];
    let n = timeout(Duration::from_secs(2), stream.read(&mut trailing))
        .await
        .expect("timed out waiting for socket close");
    assert_eq!(n.unwrap(), 0, "connection must be torn down after a rejected CONNECT");
}

#[tokio::test]
async fn second_connect_is_a_protocol_violation() {
    let addr = spawn_broker().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    let mut first = Vec::new();
    ConnectPacket::new("scenario-3", 60).encode(&mut first).unwrap();
    stream.write_all(&first).await.unwrap();
    let connack = read_connack(&mut stream).await;
    assert_eq!(connack[3], 0, "first CONNECT must be accepted");

    let mut second = Vec::new();
    ConnectPacket::new("scenario-3-again", 60).encode(&mut second).unwrap();
    stream.write_all(&second).await.unwrap();

    let mut trailing = [0u8; 1];
    let n = timeout(Duration::from_secs(2), stream.read(&mut trailing))
        .await
        .expect("timed out waiting for socket close");
    assert_eq!(
        n.unwrap(),
        0,
        "a second CONNECT must not be answered, only torn down"
    );
}
