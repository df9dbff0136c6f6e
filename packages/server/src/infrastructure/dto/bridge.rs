//! Frames exchanged with the protocol bridge.
//!
//! One WebSocket per connection, JSON text frames tagged by `type`.

use serde::{Deserialize, Serialize};

use crate::domain::{
    ConnectionUpdate, DisconnectReason, GatewayEvent, IncomingCall, InboundMessage, Jid,
};

/// Frames sent to the bridge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum BridgeCommand {
    Connect {
        connection_id: String,
        user_id: String,
        auth_dir: String,
        print_qr: bool,
        /// Request a pairing code for this number instead of a QR code
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pairing_phone: Option<String>,
        /// `[name, browser, version]`
        browser: [String; 3],
    },
    SendText {
        to: String,
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        quoted_id: Option<String>,
    },
    SendReaction {
        to: String,
        key_id: String,
        /// Author of the reacted message (`key.participant`)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        participant: Option<String>,
        emoji: String,
    },
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionPhase {
    Connecting,
    Open,
    Close,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeMessage {
    pub id: String,
    pub remote_jid: String,
    #[serde(default)]
    pub participant: Option<String>,
    #[serde(default)]
    pub from_me: bool,
    #[serde(default)]
    pub text: Option<String>,
}

/// Frames received from the bridge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum BridgeEvent {
    ConnectionUpdate {
        connection: ConnectionPhase,
        #[serde(default)]
        status_code: Option<u16>,
        #[serde(default)]
        user_jid: Option<String>,
    },
    Qr {
        code: String,
    },
    PairingCode {
        code: String,
    },
    MessagesUpsert {
        /// `notify` for live messages, `append` for history sync
        kind: String,
        messages: Vec<BridgeMessage>,
    },
    Call {
        from: String,
        status: String,
    },
    CredsUpdate,
    /// Bridge-side failure that does not end the connection
    Error {
        message: String,
    },
}

impl BridgeEvent {
    /// Convert to a domain event. `None` for frames the core ignores.
    ///
    /// Messages with an unparsable JID are dropped individually.
    pub fn into_gateway_event(self) -> Option<GatewayEvent> {
        match self {
            Self::ConnectionUpdate {
                connection,
                status_code,
                user_jid,
            } => {
                let update = match connection {
                    ConnectionPhase::Connecting => ConnectionUpdate::Connecting,
                    ConnectionPhase::Open => ConnectionUpdate::Open {
                        self_jid: user_jid.and_then(|jid| Jid::new(jid).ok()),
                    },
                    ConnectionPhase::Close => ConnectionUpdate::Close {
                        reason: DisconnectReason::from_status_code(status_code),
                    },
                };
                Some(GatewayEvent::Connection(update))
            }
            Self::Qr { code } => Some(GatewayEvent::Qr(code)),
            Self::PairingCode { code } => Some(GatewayEvent::PairingCode(code)),
            Self::MessagesUpsert { kind, messages } => {
                let messages = messages
                    .into_iter()
                    .filter_map(|m| {
                        let remote_jid = match Jid::new(m.remote_jid) {
                            Ok(jid) => jid,
                            Err(e) => {
                                tracing::warn!("Dropping bridge message '{}': {}", m.id, e);
                                return None;
                            }
                        };
                        Some(InboundMessage {
                            id: m.id,
                            remote_jid,
                            participant: m.participant.and_then(|p| Jid::new(p).ok()),
                            from_me: m.from_me,
                            text: m.text,
                        })
                    })
                    .collect();
                Some(GatewayEvent::Messages {
                    notify: kind == "notify",
                    messages,
                })
            }
            Self::Call { from, status } => match Jid::new(from) {
                Ok(from) => Some(GatewayEvent::Call(IncomingCall { from, status })),
                Err(e) => {
                    tracing::warn!("Dropping call event: {}", e);
                    None
                }
            },
            Self::CredsUpdate => Some(GatewayEvent::CredentialsUpdated),
            Self::Error { message } => {
                tracing::warn!("Bridge reported an error: {}", message);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_command_wire_format() {
        // テスト項目: connect コマンドが kebab-case の type でシリアライズされる
        // given (前提条件):
        let command = BridgeCommand::Connect {
            connection_id: "c1".to_string(),
            user_id: "alice".to_string(),
            auth_dir: "sessions/alice".to_string(),
            print_qr: false,
            pairing_phone: None,
            browser: ["alice".to_string(), "Safari".to_string(), "1.0".to_string()],
        };

        // when (操作):
        let json: serde_json::Value = serde_json::to_value(&command).unwrap();

        // then (期待する結果):
        assert_eq!(json["type"], "connect");
        assert_eq!(json["auth_dir"], "sessions/alice");
        assert_eq!(json["browser"][1], "Safari");
        assert!(json.get("pairing_phone").is_none());
    }

    #[test]
    fn test_send_reaction_carries_participant() {
        // テスト項目: ステータスへのリアクションに投稿者の JID が含まれる
        // given (前提条件):
        let command = BridgeCommand::SendReaction {
            to: "status@broadcast".to_string(),
            key_id: "s1".to_string(),
            participant: Some("254711111111@s.whatsapp.net".to_string()),
            emoji: "🔥".to_string(),
        };

        // when (操作):
        let json: serde_json::Value = serde_json::to_value(&command).unwrap();

        // then (期待する結果):
        assert_eq!(json["type"], "send-reaction");
        assert_eq!(json["to"], "status@broadcast");
        assert_eq!(json["participant"], "254711111111@s.whatsapp.net");
        assert_eq!(json["key_id"], "s1");
    }

    #[test]
    fn test_pairing_code_frame_maps_to_event() {
        // テスト項目: pairing-code フレームがペアリングコードのイベントになる
        let frame = r#"{"type":"pairing-code","code":"ABCD-1234"}"#;

        let event: BridgeEvent = serde_json::from_str(frame).unwrap();

        assert_eq!(
            event.into_gateway_event(),
            Some(GatewayEvent::PairingCode("ABCD-1234".to_string()))
        );
    }

    #[test]
    fn test_send_text_omits_missing_quote() {
        // テスト項目: 引用なしのテキスト送信では quoted_id が省略される
        let command = BridgeCommand::SendText {
            to: "1@s.whatsapp.net".to_string(),
            text: "hi".to_string(),
            quoted_id: None,
        };

        let json = serde_json::to_string(&command).unwrap();

        assert_eq!(json, r#"{"type":"send-text","to":"1@s.whatsapp.net","text":"hi"}"#);
    }

    #[test]
    fn test_close_update_maps_status_code() {
        // テスト項目: close 更新のステータスコードが切断理由に変換される
        // given (前提条件):
        let frame = r#"{"type":"connection-update","connection":"close","status_code":401}"#;

        // when (操作):
        let event: BridgeEvent = serde_json::from_str(frame).unwrap();

        // then (期待する結果):
        assert_eq!(
            event.into_gateway_event(),
            Some(GatewayEvent::Connection(ConnectionUpdate::Close {
                reason: DisconnectReason::LoggedOut
            }))
        );
    }

    #[test]
    fn test_open_update_carries_self_jid() {
        // テスト項目: open 更新に自身の JID が含まれる
        let frame = r#"{"type":"connection-update","connection":"open","user_jid":"254700000000:3@s.whatsapp.net"}"#;

        let event: BridgeEvent = serde_json::from_str(frame).unwrap();

        assert_eq!(
            event.into_gateway_event(),
            Some(GatewayEvent::Connection(ConnectionUpdate::Open {
                self_jid: Some(Jid::new("254700000000:3@s.whatsapp.net".to_string()).unwrap())
            }))
        );
    }

    #[test]
    fn test_messages_upsert_drops_invalid_jid() {
        // テスト項目: 不正な JID のメッセージのみが破棄される
        // given (前提条件):
        let frame = r#"{
            "type": "messages-upsert",
            "kind": "notify",
            "messages": [
                {"id": "m1", "remote_jid": "status@broadcast", "participant": "1@s.whatsapp.net"},
                {"id": "m2", "remote_jid": "broken", "text": ".ping"}
            ]
        }"#;

        // when (操作):
        let event: BridgeEvent = serde_json::from_str(frame).unwrap();

        // then (期待する結果):
        match event.into_gateway_event() {
            Some(GatewayEvent::Messages { notify, messages }) => {
                assert!(notify);
                assert_eq!(messages.len(), 1);
                assert_eq!(messages[0].id, "m1");
                assert!(messages[0].remote_jid.is_status_broadcast());
                assert!(!messages[0].from_me);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_error_frame_is_ignored() {
        // テスト項目: error フレームはドメインイベントにならない
        let frame = r#"{"type":"error","message":"rate limited"}"#;

        let event: BridgeEvent = serde_json::from_str(frame).unwrap();

        assert_eq!(event.into_gateway_event(), None);
    }
}
