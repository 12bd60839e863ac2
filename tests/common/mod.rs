#![allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    reason = "Do not need additional syntax for setting up tests, and https://github.com/rust-lang/rust-clippy/issues/13981"
)]
#![allow(
    unused,
    reason = "Each test crate uses a different subset of these helpers"
)]

use std::time::Duration;

use guilded_client_sdk::{Endpoints, Token};
use serde_json::{Value, json};

pub const TOKEN: &str = "gapi_test_token";

/// Upper bound on any single wait in a test.
pub const WAIT: Duration = Duration::from_secs(5);

/// Routes library logs to the test output. Filter with `RUST_LOG`.
pub fn init_tracing() {
    _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[must_use]
pub fn token() -> Token {
    Token::from(TOKEN)
}

#[must_use]
pub fn endpoints(rest: &str, gateway: &str) -> Endpoints {
    Endpoints::new(rest, gateway).unwrap()
}

/// Payload of a `ChatMessageCreated` event.
#[must_use]
pub fn chat_message_created(content: &str) -> Value {
    json!({
        "serverId": "wlVr3Ggl",
        "message": {
            "id": "00000000-0000-0000-0000-000000000001",
            "type": "default",
            "serverId": "wlVr3Ggl",
            "channelId": "00000000-0000-0000-0000-0000000000c1",
            "content": content,
            "createdAt": "2021-06-15T20:15:00.706Z",
            "createdBy": "Ann6LewA"
        }
    })
}

#[cfg(feature = "gateway")]
pub use ws::{MockConnection, MockWsServer};

#[cfg(feature = "gateway")]
mod ws {
    use std::net::SocketAddr;

    use futures_util::{SinkExt as _, StreamExt as _};
    use serde_json::{Value, json};
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;
    use tokio::time::timeout;
    use tokio_tungstenite::tungstenite::Message;
    use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
    use tokio_tungstenite::tungstenite::http::{HeaderMap, StatusCode};

    use super::WAIT;

    /// Mock gateway. Every accepted connection is handed to the test as a [`MockConnection`].
    pub struct MockWsServer {
        addr: SocketAddr,
        connections: mpsc::UnboundedReceiver<MockConnection>,
    }

    impl MockWsServer {
        /// Start a mock gateway on a random port.
        pub async fn start() -> Self {
            Self::spawn(None).await
        }

        /// Start a mock gateway that refuses every handshake with `status`.
        pub async fn rejecting(status: StatusCode) -> Self {
            Self::spawn(Some(status)).await
        }

        async fn spawn(reject_with: Option<StatusCode>) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let (connection_tx, connections) = mpsc::unbounded_channel();

            tokio::spawn(async move {
                loop {
                    let Ok((stream, _)) = listener.accept().await else {
                        break;
                    };

                    let mut headers = HeaderMap::new();
                    let callback = |request: &Request, response: Response| {
                        headers = request.headers().clone();
                        match reject_with {
                            Some(status) => {
                                let mut rejection = ErrorResponse::new(None);
                                *rejection.status_mut() = status;
                                Err(rejection)
                            }
                            None => Ok(response),
                        }
                    };
                    let Ok(ws_stream) = tokio_tungstenite::accept_hdr_async(stream, callback).await
                    else {
                        continue;
                    };

                    let (mut write, mut read) = ws_stream.split();
                    let (outgoing, mut outgoing_rx) = mpsc::unbounded_channel::<Message>();
                    let (incoming_tx, incoming) = mpsc::unbounded_channel::<Message>();

                    tokio::spawn(async move {
                        loop {
                            tokio::select! {
                                frame = outgoing_rx.recv() => match frame {
                                    Some(frame) => {
                                        if write.send(frame).await.is_err() {
                                            break;
                                        }
                                    }
                                    // Test dropped the connection: vanish without a close frame
                                    None => break,
                                },
                                frame = read.next() => match frame {
                                    Some(Ok(frame)) => {
                                        _ = incoming_tx.send(frame);
                                    }
                                    _ => break,
                                },
                            }
                        }
                    });

                    if connection_tx
                        .send(MockConnection {
                            headers,
                            outgoing,
                            incoming,
                        })
                        .is_err()
                    {
                        break;
                    }
                }
            });

            Self { addr, connections }
        }

        #[must_use]
        pub fn url(&self) -> String {
            format!("ws://{}/websocket/v1", self.addr)
        }

        /// Wait for the client's next connection.
        pub async fn accept(&mut self) -> MockConnection {
            timeout(WAIT, self.connections.recv())
                .await
                .expect("client did not connect in time")
                .expect("server stopped")
        }
    }

    /// Server side of one client connection. Dropping it drops the transport abruptly.
    pub struct MockConnection {
        headers: HeaderMap,
        outgoing: mpsc::UnboundedSender<Message>,
        incoming: mpsc::UnboundedReceiver<Message>,
    }

    impl MockConnection {
        /// Value of a handshake request header.
        #[must_use]
        pub fn header(&self, name: &str) -> Option<&str> {
            self.headers.get(name).map(|value| value.to_str().unwrap())
        }

        pub fn send_raw(&self, text: &str) {
            _ = self.outgoing.send(Message::Text(text.into()));
        }

        pub fn send(&self, frame: &Value) {
            self.send_raw(&frame.to_string());
        }

        pub fn welcome(&self, heartbeat_interval_ms: u64, last_message_id: Option<&str>) {
            self.send(&json!({
                "op": 1,
                "d": {
                    "heartbeatIntervalMs": heartbeat_interval_ms,
                    "lastMessageId": last_message_id,
                    "botId": "bot-1",
                    "user": { "id": "Ann6LewA", "type": "bot", "name": "Test Bot" }
                }
            }));
        }

        pub fn event(&self, name: &str, data: &Value, message_id: &str) {
            self.send(&json!({ "op": 0, "t": name, "d": data, "s": message_id }));
        }

        pub fn resumed(&self, last_message_id: Option<&str>) {
            self.send(&json!({ "op": 2, "d": { "lastMessageId": last_message_id } }));
        }

        /// Closes the connection with a close frame instead of vanishing.
        pub fn close(&self) {
            _ = self.outgoing.send(Message::Close(None));
        }

        pub fn error(&self, message: &str) {
            self.send(&json!({ "op": 8, "d": { "message": message } }));
        }

        /// Next frame the client sent, if any arrives in time.
        pub async fn recv(&mut self) -> Option<Message> {
            timeout(WAIT, self.incoming.recv()).await.ok().flatten()
        }
    }
}
