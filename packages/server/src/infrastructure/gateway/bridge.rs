//! Gateway backed by a protocol bridge.
//!
//! The bridge hosts the WhatsApp protocol library. Each connection opens
//! `<bridge_url>/sessions/<user_id>`, sends a `connect` frame, then streams
//! events back until either side closes.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use tokio::{
    net::TcpStream,
    sync::{Mutex, mpsc},
    task::AbortHandle,
};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, tungstenite::Message};

use super::EVENT_BUFFER;
use crate::{
    domain::{
        ConnectConfig, Connection, ConnectionHandle, ConnectionId, ConnectionUpdate,
        DisconnectReason, GatewayError, GatewayEvent, Jid, OutboundPayload, WhatsAppGateway,
    },
    infrastructure::dto::bridge::{BridgeCommand, BridgeEvent},
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const BROWSER: &str = "Safari";
const BROWSER_VERSION: &str = "1.0";

pub struct BridgeGateway {
    bridge_url: String,
}

impl BridgeGateway {
    pub fn new(bridge_url: impl Into<String>) -> Self {
        Self {
            bridge_url: bridge_url.into(),
        }
    }

    fn session_url(&self, config: &ConnectConfig) -> String {
        format!(
            "{}/sessions/{}",
            self.bridge_url.trim_end_matches('/'),
            config.user_id
        )
    }
}

#[async_trait]
impl WhatsAppGateway for BridgeGateway {
    async fn connect(&self, config: ConnectConfig) -> Result<ConnectionHandle, GatewayError> {
        let url = self.session_url(&config);
        let (socket, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| GatewayError::Connect(format!("{url}: {e}")))?;
        let (mut sink, stream) = socket.split();

        let connect = BridgeCommand::Connect {
            connection_id: config.connection_id.to_string(),
            user_id: config.user_id.to_string(),
            auth_dir: config.auth_dir.display().to_string(),
            print_qr: config.print_qr,
            pairing_phone: config.pairing_phone.clone(),
            browser: [
                config.browser.clone(),
                BROWSER.to_string(),
                BROWSER_VERSION.to_string(),
            ],
        };
        send_command(&mut sink, &connect)
            .await
            .map_err(|e| GatewayError::Connect(e.to_string()))?;
        tracing::debug!(
            "Bridge connection {} opened for '{}'",
            config.connection_id,
            config.user_id
        );

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let reader = tokio::spawn(read_events(stream, tx, config.connection_id));

        Ok(ConnectionHandle {
            connection: Arc::new(BridgeConnection {
                id: config.connection_id,
                sink: Mutex::new(sink),
                reader: reader.abort_handle(),
                closed: AtomicBool::new(false),
            }),
            events: rx,
        })
    }
}

struct BridgeConnection {
    id: ConnectionId,
    sink: Mutex<SplitSink<WsStream, Message>>,
    reader: AbortHandle,
    closed: AtomicBool,
}

#[async_trait]
impl Connection for BridgeConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    async fn send(&self, to: &Jid, payload: OutboundPayload) -> Result<(), GatewayError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(GatewayError::Closed);
        }
        let command = match payload {
            OutboundPayload::Text { text, quoted_id } => BridgeCommand::SendText {
                to: to.to_string(),
                text,
                quoted_id,
            },
            OutboundPayload::Reaction {
                key_id,
                participant,
                emoji,
            } => BridgeCommand::SendReaction {
                to: to.to_string(),
                key_id,
                participant: participant.map(|p| p.to_string()),
                emoji,
            },
        };
        let mut sink = self.sink.lock().await;
        send_command(&mut sink, &command).await
    }

    async fn close(&self) -> Result<(), GatewayError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let mut sink = self.sink.lock().await;
        if let Err(e) = send_command(&mut sink, &BridgeCommand::Close).await {
            tracing::debug!("Bridge connection {} close frame not sent: {}", self.id, e);
        }
        if let Err(e) = sink.close().await {
            tracing::debug!("Bridge connection {} socket not closed cleanly: {}", self.id, e);
        }
        self.reader.abort();
        Ok(())
    }
}

impl Drop for BridgeConnection {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn send_command(
    sink: &mut SplitSink<WsStream, Message>,
    command: &BridgeCommand,
) -> Result<(), GatewayError> {
    let json = serde_json::to_string(command).map_err(|e| GatewayError::Protocol(e.to_string()))?;
    sink.send(Message::Text(json.into()))
        .await
        .map_err(|e| GatewayError::Send(e.to_string()))
}

/// Forward bridge frames until the socket ends.
///
/// A socket that ends without a `close` update is reported as
/// `ConnectionLost` so the supervisor can apply the reconnect policy.
async fn read_events(
    mut stream: SplitStream<WsStream>,
    tx: mpsc::Sender<GatewayEvent>,
    connection_id: ConnectionId,
) {
    let mut saw_close = false;

    while let Some(frame) = stream.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("Bridge connection {} failed: {}", connection_id, e);
                break;
            }
        };

        match frame {
            Message::Text(text) => {
                let event = match serde_json::from_str::<BridgeEvent>(text.as_str()) {
                    Ok(event) => event,
                    Err(e) => {
                        tracing::warn!("Unparsable bridge frame on {}: {}", connection_id, e);
                        continue;
                    }
                };
                let Some(event) = event.into_gateway_event() else {
                    continue;
                };
                if matches!(
                    event,
                    GatewayEvent::Connection(ConnectionUpdate::Close { .. })
                ) {
                    saw_close = true;
                }
                if tx.send(event).await.is_err() {
                    // receiver dropped: the session no longer listens
                    return;
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    if !saw_close {
        let lost = GatewayEvent::Connection(ConnectionUpdate::Close {
            reason: DisconnectReason::ConnectionLost,
        });
        let _ = tx.send(lost).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ConnectionIdFactory, UserId};
    use tokio::net::TcpListener;

    fn connect_config() -> ConnectConfig {
        ConnectConfig {
            connection_id: ConnectionIdFactory::generate(),
            user_id: UserId::new("alice".to_string()).unwrap(),
            auth_dir: "sessions/alice".into(),
            print_qr: false,
            pairing_phone: None,
            browser: "alice".to_string(),
        }
    }

    /// Accept one socket, check the connect frame, replay `frames`, then wait
    /// for one client command and hang up without a close update.
    async fn spawn_bridge(frames: Vec<&'static str>) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();

            let first = ws.next().await.unwrap().unwrap();
            let connect: serde_json::Value =
                serde_json::from_str(first.to_text().unwrap()).unwrap();
            assert_eq!(connect["type"], "connect");
            assert_eq!(connect["user_id"], "alice");

            for frame in frames {
                ws.send(Message::Text(frame.into())).await.unwrap();
            }

            let command = ws.next().await.unwrap().unwrap();
            command.to_text().unwrap().to_string()
        });
        (format!("ws://{addr}"), handle)
    }

    #[tokio::test]
    async fn test_bridge_events_and_lost_connection() {
        // テスト項目: ブリッジのイベントが順番に届き、close なしの切断は ConnectionLost になる
        // given (前提条件):
        let (url, bridge) = spawn_bridge(vec![
            r#"{"type":"connection-update","connection":"open","user_jid":"1:2@s.whatsapp.net"}"#,
            r#"{"type":"creds-update"}"#,
        ])
        .await;
        let gateway = BridgeGateway::new(url);

        // when (操作):
        let mut handle = gateway.connect(connect_config()).await.unwrap();
        let to = Jid::new("1@s.whatsapp.net".to_string()).unwrap();
        handle
            .connection
            .send(&to, OutboundPayload::text("hello"))
            .await
            .unwrap();

        // then (期待する結果):
        let sent: serde_json::Value = serde_json::from_str(&bridge.await.unwrap()).unwrap();
        assert_eq!(sent["type"], "send-text");
        assert_eq!(sent["text"], "hello");

        assert!(matches!(
            handle.events.recv().await,
            Some(GatewayEvent::Connection(ConnectionUpdate::Open { .. }))
        ));
        assert_eq!(
            handle.events.recv().await,
            Some(GatewayEvent::CredentialsUpdated)
        );
        assert_eq!(
            handle.events.recv().await,
            Some(GatewayEvent::Connection(ConnectionUpdate::Close {
                reason: DisconnectReason::ConnectionLost
            }))
        );
        assert_eq!(handle.events.recv().await, None);
    }

    #[tokio::test]
    async fn test_status_reaction_frame_names_author() {
        // テスト項目: ステータスへのリアクションのフレームに投稿者が含まれる
        // given (前提条件):
        let (url, bridge) = spawn_bridge(vec![]).await;
        let gateway = BridgeGateway::new(url);
        let handle = gateway.connect(connect_config()).await.unwrap();
        let status = Jid::new(Jid::STATUS_BROADCAST.to_string()).unwrap();
        let author = Jid::new("254711111111@s.whatsapp.net".to_string()).unwrap();

        // when (操作):
        handle
            .connection
            .send(
                &status,
                OutboundPayload::Reaction {
                    key_id: "s1".to_string(),
                    participant: Some(author),
                    emoji: "🔥".to_string(),
                },
            )
            .await
            .unwrap();

        // then (期待する結果):
        let sent: serde_json::Value = serde_json::from_str(&bridge.await.unwrap()).unwrap();
        assert_eq!(sent["type"], "send-reaction");
        assert_eq!(sent["to"], "status@broadcast");
        assert_eq!(sent["participant"], "254711111111@s.whatsapp.net");
        assert_eq!(sent["emoji"], "🔥");
    }

    #[tokio::test]
    async fn test_connect_to_unreachable_bridge_fails() {
        // テスト項目: ブリッジに接続できない場合は Connect エラーになる
        // given (前提条件): 空きポートを確保して即座に閉じる
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let gateway = BridgeGateway::new(format!("ws://{addr}"));

        // when (操作):
        let result = gateway.connect(connect_config()).await;

        // then (期待する結果):
        assert!(matches!(result, Err(GatewayError::Connect(_))));
    }

    #[tokio::test]
    async fn test_send_after_close_fails() {
        // テスト項目: close 後の送信は Closed エラーになり、close は二重に呼べる
        let (url, _bridge) = spawn_bridge(vec![]).await;
        let gateway = BridgeGateway::new(url);
        let handle = gateway.connect(connect_config()).await.unwrap();

        handle.connection.close().await.unwrap();
        let to = Jid::new("1@s.whatsapp.net".to_string()).unwrap();
        let result = handle.connection.send(&to, OutboundPayload::text("late")).await;

        assert_eq!(result, Err(GatewayError::Closed));
        assert!(handle.connection.close().await.is_ok());
    }
}
