//! UseCase: 受信イベントへの応答
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - EventDispatcher の各応答（welcome, ping, ステータスへのリアクション, 着信拒否）
//!
//! ### なぜこのテストが必要か
//! - 応答の失敗がセッションを落とさないこと（ログのみ）を保証する
//! - 送信にタイムアウトがかかることを保証する
//!
//! ### どのような状況を想定しているか
//! - 正常系：コマンドへの返信、リアクション
//! - 異常系：送信失敗、送信が返ってこない
//! - エッジケース：自分のメッセージ、private モードでのオーナー以外

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

use crate::domain::{Connection, IncomingCall, InboundMessage, Jid, OutboundPayload, UserId};

use super::error::DispatchError;

pub const DEFAULT_BOT_NAME: &str = "CLOUD AI";
pub const DEFAULT_COMMAND_PREFIX: &str = ".";
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_STATUS_REACT_EMOJIS: [&str; 6] = ["❤️", "🔥", "😍", "💯", "✨", "😎"];
pub const DEFAULT_CALL_REJECT_MESSAGE: &str = "Sorry, I don't accept calls.";

/// Who may run commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BotMode {
    #[default]
    Public,
    /// Only the owner
    Private,
}

/// Behaviour of the bot attached to every session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotSettings {
    pub bot_name: String,
    pub command_prefix: String,
    pub mode: BotMode,
    pub owner: Option<Jid>,
    pub auto_status_react: bool,
    pub status_react_emojis: Vec<String>,
    pub reject_calls: bool,
    pub call_reject_message: String,
    pub send_timeout: Duration,
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            bot_name: DEFAULT_BOT_NAME.to_string(),
            command_prefix: DEFAULT_COMMAND_PREFIX.to_string(),
            mode: BotMode::Public,
            owner: None,
            auto_status_react: true,
            status_react_emojis: DEFAULT_STATUS_REACT_EMOJIS
                .iter()
                .map(|e| e.to_string())
                .collect(),
            reject_calls: false,
            call_reject_message: DEFAULT_CALL_REJECT_MESSAGE.to_string(),
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }
}

/// Reacts to the events of one session.
pub struct EventDispatcher {
    user_id: UserId,
    settings: Arc<BotSettings>,
    next_emoji: AtomicUsize,
}

impl EventDispatcher {
    pub fn new(user_id: UserId, settings: Arc<BotSettings>) -> Self {
        Self {
            user_id,
            settings,
            next_emoji: AtomicUsize::new(0),
        }
    }

    pub fn welcome_text(&self) -> String {
        let name = &self.settings.bot_name;
        let prefix = &self.settings.command_prefix;
        format!(
            "*{name} connected* ✅\n\nYour session is live.\n\n*Prefix:* `{prefix}`\nSend `{prefix}ping` to check the bot."
        )
    }

    /// Send the welcome text to the account itself.
    pub async fn welcome(&self, connection: &dyn Connection, self_jid: &Jid) {
        let target = self_jid.normalize_user();
        match self
            .send(connection, &target, OutboundPayload::text(self.welcome_text()))
            .await
        {
            Ok(()) => tracing::info!("Sent welcome message for '{}'", self.user_id),
            Err(e) => tracing::warn!("Welcome message for '{}' failed: {}", self.user_id, e),
        }
    }

    /// Handle a batch of inbound messages.
    pub async fn on_messages(
        &self,
        connection: &dyn Connection,
        notify: bool,
        messages: &[InboundMessage],
    ) {
        if !notify {
            return;
        }
        let received_at = Instant::now();
        for message in messages {
            if let Err(e) = self.on_message(connection, message, received_at).await {
                tracing::warn!(
                    "'{}' failed to handle message '{}': {}",
                    self.user_id,
                    message.id,
                    e
                );
            }
        }
    }

    pub async fn on_call(&self, connection: &dyn Connection, call: &IncomingCall) {
        if !self.settings.reject_calls || !call.is_offer() {
            return;
        }
        tracing::info!("'{}' rejecting call from {}", self.user_id, call.from);
        let reply = OutboundPayload::text(self.settings.call_reject_message.clone());
        if let Err(e) = self.send(connection, &call.from, reply).await {
            tracing::warn!("'{}' call rejection notice failed: {}", self.user_id, e);
        }
    }

    async fn on_message(
        &self,
        connection: &dyn Connection,
        message: &InboundMessage,
        received_at: Instant,
    ) -> Result<(), DispatchError> {
        if message.from_me {
            return Ok(());
        }

        if message.remote_jid.is_status_broadcast() {
            if !self.settings.auto_status_react {
                return Ok(());
            }
            let Some(emoji) = self.next_status_emoji() else {
                return Ok(());
            };
            let reaction = OutboundPayload::Reaction {
                key_id: message.id.clone(),
                participant: message.participant.clone(),
                emoji: emoji.to_string(),
            };
            return self.send(connection, &message.remote_jid, reaction).await;
        }

        let Some(text) = message.text.as_deref() else {
            return Ok(());
        };
        let command = text.trim().to_lowercase();
        let ping = format!("{}ping", self.settings.command_prefix).to_lowercase();
        if command != ping {
            return Ok(());
        }
        if !self.may_command(message.sender()) {
            tracing::debug!(
                "'{}' ignoring command from {} in private mode",
                self.user_id,
                message.sender()
            );
            return Ok(());
        }

        let latency = received_at.elapsed().as_millis();
        let reply = OutboundPayload::Text {
            text: format!("🏓 pong!\n⏱️ Response Time: *{latency}ms*"),
            quoted_id: Some(message.id.clone()),
        };
        self.send(connection, &message.remote_jid, reply).await?;
        tracing::info!(
            "'{}' replied to {}ping in {}ms",
            self.user_id,
            self.settings.command_prefix,
            received_at.elapsed().as_millis()
        );
        Ok(())
    }

    fn may_command(&self, sender: &Jid) -> bool {
        match (self.settings.mode, &self.settings.owner) {
            (BotMode::Public, _) => true,
            (BotMode::Private, Some(owner)) => owner.user() == sender.user(),
            (BotMode::Private, None) => false,
        }
    }

    /// Emojis rotate round-robin.
    fn next_status_emoji(&self) -> Option<&str> {
        let emojis = &self.settings.status_react_emojis;
        if emojis.is_empty() {
            return None;
        }
        let index = self.next_emoji.fetch_add(1, Ordering::Relaxed) % emojis.len();
        Some(emojis[index].as_str())
    }

    async fn send(
        &self,
        connection: &dyn Connection,
        to: &Jid,
        payload: OutboundPayload,
    ) -> Result<(), DispatchError> {
        let timeout = self.settings.send_timeout;
        match tokio::time::timeout(timeout, connection.send(to, payload)).await {
            Ok(result) => result.map_err(DispatchError::from),
            Err(_) => Err(DispatchError::Timeout(timeout)),
        }
    }
}
