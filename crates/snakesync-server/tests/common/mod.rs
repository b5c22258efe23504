use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use snakesync_core::gateway::SessionHandle;
use snakesync_core::input::{InputCode, InputEvent};
use snakesync_core::net::messages::{ClientMessage, InputMsg, JoinMsg, ServerMessage, WelcomeMsg};
use snakesync_core::net::protocol::{PROTOCOL_VERSION, decode_server_message, encode_client_message};

use snakesync_server::build_app;
use snakesync_server::config::ServerConfig;

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct TestServer {
    pub addr: SocketAddr,
    _shutdown: tokio::task::JoinHandle<()>,
}

impl TestServer {
    /// Start a test server on an ephemeral port with a fast tick.
    pub async fn new() -> Self {
        Self::from_config(fast_config()).await
    }

    pub async fn from_config(config: ServerConfig) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (app, _state) = build_app(config);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Give the server a moment to start accepting
        tokio::time::sleep(Duration::from_millis(20)).await;

        Self {
            addr,
            _shutdown: handle,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    pub async fn get_json(&self, path: &str) -> (u16, serde_json::Value) {
        let resp = reqwest::get(format!("{}{path}", self.base_url()))
            .await
            .unwrap();
        let status = resp.status().as_u16();
        let body = resp.json().await.unwrap_or(serde_json::Value::Null);
        (status, body)
    }

    /// Poll a session record until its `state` matches, or panic after 3s.
    pub async fn wait_for_state(&self, session: &SessionHandle, state: &str) -> serde_json::Value {
        let path = format!("/api/v1/snakes/{session}");
        let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
        loop {
            let (status, body) = self.get_json(&path).await;
            if status == 200 && body["state"] == state {
                return body;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "record {session} never reached state {state}, last: {body}"
            );
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

/// Default config with a 20 ms tick and a fixed seed.
pub fn fast_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.listen_addr = "127.0.0.1:0".to_string();
    config.engine.tick_period_ms = 20;
    config.engine.seed = Some(11);
    config
}

pub async fn ws_connect(url: &str) -> WsStream {
    let (stream, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    stream
}

pub async fn ws_send_client_msg(stream: &mut WsStream, msg: &ClientMessage) {
    let encoded = encode_client_message(msg).unwrap();
    stream.send(Message::Binary(encoded.into())).await.unwrap();
}

/// Send Join and return the Welcome.
pub async fn ws_join(stream: &mut WsStream, player_id: &str) -> WelcomeMsg {
    let msg = ClientMessage::Join(JoinMsg {
        player_id: player_id.to_string(),
        protocol_version: PROTOCOL_VERSION,
    });
    ws_send_client_msg(stream, &msg).await;
    match ws_read_server_msg(stream).await {
        ServerMessage::Welcome(w) => w,
        other => panic!("Expected Welcome, got: {other:?}"),
    }
}

/// Join and wait for the auto-started session.
pub async fn ws_join_and_start(stream: &mut WsStream, player_id: &str) -> SessionHandle {
    ws_join(stream, player_id).await;
    ws_expect_session_started(stream).await
}

pub async fn ws_expect_session_started(stream: &mut WsStream) -> SessionHandle {
    ws_read_until(stream, |msg| match msg {
        ServerMessage::SessionStarted(m) => Some(m.session_id.clone()),
        _ => None,
    })
    .await
}

pub async fn ws_send_key(stream: &mut WsStream, code: InputCode) {
    let msg = ClientMessage::Input(InputMsg {
        event: InputEvent::Key(code),
    });
    ws_send_client_msg(stream, &msg).await;
}

/// Read raw binary data from a WebSocket stream (5s timeout).
pub async fn ws_read_raw(stream: &mut WsStream) -> Vec<u8> {
    let deadline = Duration::from_secs(5);
    tokio::time::timeout(deadline, async {
        loop {
            match stream.next().await {
                Some(Ok(Message::Binary(data))) => return data.to_vec(),
                Some(Ok(Message::Close(_))) => panic!("WebSocket closed unexpectedly"),
                Some(Err(e)) => panic!("WebSocket error: {e}"),
                None => panic!("WebSocket stream ended"),
                _ => continue,
            }
        }
    })
    .await
    .expect("Timed out waiting for WebSocket message")
}

/// Read the next ServerMessage from a WebSocket stream (5s timeout).
pub async fn ws_read_server_msg(stream: &mut WsStream) -> ServerMessage {
    let data = ws_read_raw(stream).await;
    decode_server_message(&data).unwrap()
}

/// Skip messages until `pick` returns a value.
pub async fn ws_read_until<T>(
    stream: &mut WsStream,
    mut pick: impl FnMut(&ServerMessage) -> Option<T>,
) -> T {
    loop {
        let msg = ws_read_server_msg(stream).await;
        if let Some(v) = pick(&msg) {
            return v;
        }
    }
}

/// Wait until the server closes the socket. Returns the close code if one was sent.
pub async fn ws_expect_close(stream: &mut WsStream) -> Option<u16> {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match stream.next().await {
                Some(Ok(Message::Close(frame))) => return frame.map(|f| u16::from(f.code)),
                Some(Ok(_)) => continue,
                Some(Err(_)) | None => return None,
            }
        }
    })
    .await
    .expect("Timed out waiting for close")
}
