use std::net::SocketAddr;
use std::time::Duration;

use burrow::config::Config;
use burrow::signaling::SignalingServer;
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start_server() -> SocketAddr {
    start_server_with(Config::default()).await
}

async fn start_server_with(config: Config) -> SocketAddr {
    let config = Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        ..config
    };
    let server = SignalingServer::bind(&config).await.unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run());
    addr
}

async fn connect(addr: SocketAddr) -> Client {
    let (client, _) = tokio_tungstenite::connect_async(format!("ws://{}", addr))
        .await
        .unwrap();
    client
}

async fn send(client: &mut Client, value: Value) {
    client
        .send(Message::Text(value.to_string().into()))
        .await
        .unwrap();
}

async fn recv(client: &mut Client) -> Value {
    recv_within(client, Duration::from_secs(2)).await
}

async fn recv_within(client: &mut Client, limit: Duration) -> Value {
    loop {
        let msg = timeout(limit, client.next())
            .await
            .expect("timed out waiting for message")
            .expect("connection closed")
            .unwrap();
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

async fn recv_type(client: &mut Client, kind: &str) -> Value {
    loop {
        let msg = recv(client).await;
        if msg["type"] == kind {
            return msg;
        }
    }
}

#[tokio::test]
async fn lobby_handshake_and_relay() {
    let addr = start_server().await;
    let mut a = connect(addr).await;
    let mut b = connect(addr).await;

    send(&mut a, json!({"type": "SET_GAME", "payload": {"game": "chess"}})).await;
    send(&mut b, json!({"type": "SET_GAME", "payload": {"game": "chess"}})).await;

    send(
        &mut a,
        json!({"type": "CREATE_LOBBY", "payload": {"game": "chess", "maxPlayers": 2, "name": "A's room"}}),
    )
    .await;
    let id = recv_type(&mut a, "ID").await;
    assert_eq!(id["payload"]["id"], 1);

    let update = recv_type(&mut a, "LOBBY_UPDATE").await;
    assert_eq!(update["payload"]["players"].as_array().unwrap().len(), 1);
    assert_eq!(update["payload"]["players"][0]["isHost"], true);
    let lobby_id = update["payload"]["id"].clone();

    send(&mut b, json!({"type": "JOIN_LOBBY", "payload": {"id": lobby_id.clone()}})).await;
    let b_id = recv_type(&mut b, "ID").await["payload"]["id"].clone();
    assert_ne!(b_id, json!(1));

    let announced = recv_type(&mut a, "PEER").await;
    assert_eq!(announced["payload"]["id"], b_id);
    let host = recv_type(&mut b, "PEER").await;
    assert_eq!(host["payload"]["id"], 1);

    let listing = recv_type(&mut b, "LOBBY_LIST").await;
    assert_eq!(listing["payload"][0]["playerCount"], 2);

    send(
        &mut b,
        json!({"type": "CANDIDATE", "payload": {"id": 1, "sdp": "candidate:0 1 UDP"}}),
    )
    .await;
    let relayed = recv_type(&mut a, "CANDIDATE").await;
    assert_eq!(relayed["payload"]["id"], b_id);
    assert_eq!(relayed["payload"]["sdp"], "candidate:0 1 UDP");

    send(&mut a, json!({"type": "OFFER", "payload": {"id": b_id, "sdp": "v=0"}})).await;
    let offer = recv_type(&mut b, "OFFER").await;
    assert_eq!(offer["payload"], json!({"id": 1, "sdp": "v=0"}));

    a.close(None).await.unwrap();
    let deleted = recv_type(&mut b, "DELETE_LOBBY").await;
    assert_eq!(deleted["payload"]["id"], lobby_id);
    let listing = recv_type(&mut b, "LOBBY_LIST").await;
    assert_eq!(listing["payload"], json!([]));
}

#[tokio::test]
async fn malformed_frames_get_an_error() {
    let addr = start_server().await;
    let mut a = connect(addr).await;

    send(&mut a, json!({"type": "START_SERVER", "payload": {}})).await;
    let err = recv(&mut a).await;
    assert_eq!(err["type"], "ERROR");
    assert!(err["payload"]["message"].as_str().unwrap().contains("START_SERVER"));

    a.send(Message::Text("{not json".into())).await.unwrap();
    let err = recv(&mut a).await;
    assert_eq!(err["type"], "ERROR");

    // The connection is still usable afterwards.
    send(&mut a, json!({"type": "SET_GAME", "payload": {"game": "go"}})).await;
    let listing = recv(&mut a).await;
    assert_eq!(listing["type"], "LOBBY_LIST");
}

#[tokio::test]
async fn rejected_join_is_silent() {
    let addr = start_server().await;
    let mut a = connect(addr).await;

    send(
        &mut a,
        json!({"type": "CREATE_LOBBY", "payload": {"maxPlayers": 1, "name": "solo"}}),
    )
    .await;
    let lobby_id = recv_type(&mut a, "LOBBY_UPDATE").await["payload"]["id"].clone();

    let mut c = connect(addr).await;
    send(&mut c, json!({"type": "JOIN_LOBBY", "payload": {"id": lobby_id}})).await;
    send(&mut c, json!({"type": "SET_GAME", "payload": {"game": "go"}})).await;

    // A full lobby answers nothing, so the first frame is the listing.
    let next = recv(&mut c).await;
    assert_eq!(next["type"], "LOBBY_LIST");
    assert_eq!(next["payload"], json!([]));
}

#[tokio::test]
async fn silent_host_is_dropped_and_lobby_deleted() {
    let addr = start_server_with(Config {
        ping_interval_secs: 1,
        pong_timeout_secs: 1,
        ..Config::default()
    })
    .await;
    let mut host = connect(addr).await;
    let mut member = connect(addr).await;

    send(
        &mut host,
        json!({"type": "CREATE_LOBBY", "payload": {"maxPlayers": 2, "name": "idle"}}),
    )
    .await;
    let lobby_id = recv_type(&mut host, "LOBBY_UPDATE").await["payload"]["id"].clone();

    send(&mut member, json!({"type": "JOIN_LOBBY", "payload": {"id": lobby_id.clone()}})).await;
    recv_type(&mut member, "ID").await;

    // From here on the host never reads, so its pings go unanswered.
    // The member keeps reading, which answers its own pings.
    let deleted = loop {
        let msg = recv_within(&mut member, Duration::from_secs(6)).await;
        if msg["type"] == "DELETE_LOBBY" {
            break msg;
        }
    };
    assert_eq!(deleted["payload"]["id"], lobby_id);

    let listing = recv_type(&mut member, "LOBBY_LIST").await;
    assert_eq!(listing["payload"], json!([]));

    drop(host);
}
