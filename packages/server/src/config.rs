//! Process configuration.
//!
//! Every option can be given as a flag or through the environment (a `.env`
//! file is loaded by the binary before parsing).

use std::{path::PathBuf, sync::Arc, time::Duration};

use clap::{ArgAction, Parser, ValueEnum};
use thiserror::Error;

use crate::{
    domain::{
        Backoff, CredentialError, CredentialFetcher, Jid, PolicyError, ReconnectPolicy, SessionId,
        UserId, ValueObjectError, WhatsAppGateway,
    },
    infrastructure::{
        credential::{FsCredentialStore, HttpCredentialFetcher, InlineCredentialFetcher},
        gateway::{BridgeGateway, ScriptedGateway},
    },
    usecase::{BotMode, BotSettings, DEFAULT_STOP_TIMEOUT, RegistrySettings},
};

/// Errors raised while turning the configuration into components
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid reconnect policy: {0}")]
    Policy(#[from] PolicyError),

    #[error("invalid SESSION_PREFIX: {0}")]
    SessionPrefix(ValueObjectError),

    #[error("invalid DEFAULT_USER_ID: {0}")]
    DefaultUserId(ValueObjectError),

    #[error("invalid OWNER_NUMBER: {0}")]
    OwnerNumber(ValueObjectError),

    #[error("CREDENTIAL_BASE_URL is required when CREDENTIAL_SOURCE=remote")]
    MissingCredentialBaseUrl,

    #[error("invalid credential source: {0}")]
    CredentialSource(#[from] CredentialError),
}

/// Where session id payloads are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CredentialSourceKind {
    /// The payload itself is the base64 encoded bundle
    Inline,
    /// The payload is a key fetched from `CREDENTIAL_BASE_URL`
    Remote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum GatewayKind {
    /// Protocol bridge reached over WebSocket
    Bridge,
    /// In-process gateway that never reaches WhatsApp
    Scripted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Public,
    Private,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackoffKind {
    Fixed,
    Exponential,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "wabot-server")]
#[command(about = "Multi-user WhatsApp bot session host")]
#[command(version)]
pub struct Config {
    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Address to bind to
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Root directory of the per-user credential directories
    #[arg(long, env = "SESSION_DIR", default_value = "sessions")]
    pub session_dir: PathBuf,

    /// Prefix every session id must start with
    #[arg(long, env = "SESSION_PREFIX", default_value = "CLOUD-AI~")]
    pub session_prefix: String,

    /// Session id started for the default user at boot
    #[arg(long, env = "SESSION_ID")]
    pub session_id: Option<String>,

    /// User id used by `POST /set-session` and the boot session
    #[arg(long, env = "DEFAULT_USER_ID", default_value = "default")]
    pub default_user_id: String,

    #[arg(long, env = "CREDENTIAL_SOURCE", value_enum, default_value = "inline")]
    pub credential_source: CredentialSourceKind,

    /// Base URL of the credential store (remote source only)
    #[arg(long, env = "CREDENTIAL_BASE_URL")]
    pub credential_base_url: Option<String>,

    #[arg(long, env = "GATEWAY", value_enum, default_value = "bridge")]
    pub gateway: GatewayKind,

    /// WebSocket URL of the protocol bridge
    #[arg(long, env = "BRIDGE_URL", default_value = "ws://127.0.0.1:8765")]
    pub bridge_url: String,

    /// Command prefix
    #[arg(long, env = "PREFIX", default_value = ".")]
    pub prefix: String,

    #[arg(long, env = "BOT_NAME", default_value = "CLOUD AI")]
    pub bot_name: String,

    /// Phone number of the owner, required for private mode
    #[arg(long, env = "OWNER_NUMBER")]
    pub owner_number: Option<String>,

    #[arg(long, env = "MODE", value_enum, default_value = "public")]
    pub mode: ModeArg,

    /// React to status updates
    #[arg(long, env = "AUTO_STATUS_REACT", default_value_t = true, action = ArgAction::Set)]
    pub auto_status_react: bool,

    /// Comma separated reaction emojis for status updates
    #[arg(long, env = "STATUS_REACT_EMOJIS", value_delimiter = ',')]
    pub status_react_emojis: Vec<String>,

    /// Reject incoming calls
    #[arg(long, env = "REJECT_CALL", default_value_t = false, action = ArgAction::Set)]
    pub reject_call: bool,

    #[arg(long, env = "MAX_RETRIES", default_value_t = 5)]
    pub max_retries: u32,

    /// Base reconnect delay in milliseconds
    #[arg(long, env = "RECONNECT_DELAY_MS", default_value_t = 3000)]
    pub reconnect_delay_ms: u64,

    /// Cap of the exponential backoff in milliseconds
    #[arg(long, env = "RECONNECT_MAX_DELAY_MS", default_value_t = 60000)]
    pub reconnect_max_delay_ms: u64,

    #[arg(long, env = "BACKOFF", value_enum, default_value = "fixed")]
    pub backoff: BackoffKind,

    /// Seconds a connection must stay open before its retry count resets
    #[arg(long, env = "STABLE_WINDOW_SECS", default_value_t = 60)]
    pub stable_window_secs: u64,

    #[arg(long, env = "SEND_TIMEOUT_MS", default_value_t = 15000)]
    pub send_timeout_ms: u64,
}

impl Config {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn default_user_id(&self) -> Result<UserId, ConfigError> {
        UserId::new(self.default_user_id.clone()).map_err(ConfigError::DefaultUserId)
    }

    pub fn policy(&self) -> Result<ReconnectPolicy, ConfigError> {
        let base = Duration::from_millis(self.reconnect_delay_ms);
        let backoff = match self.backoff {
            BackoffKind::Fixed => Backoff::Fixed(base),
            BackoffKind::Exponential => Backoff::Exponential {
                base,
                max: Duration::from_millis(self.reconnect_max_delay_ms),
            },
        };
        Ok(ReconnectPolicy::new(
            self.max_retries,
            backoff,
            Duration::from_secs(self.stable_window_secs),
        )?)
    }

    pub fn bot_settings(&self) -> Result<BotSettings, ConfigError> {
        let owner = self
            .owner_number
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .map(Jid::from_phone)
            .transpose()
            .map_err(ConfigError::OwnerNumber)?;
        let mode = match self.mode {
            ModeArg::Public => BotMode::Public,
            ModeArg::Private => BotMode::Private,
        };
        if mode == BotMode::Private && owner.is_none() {
            tracing::warn!("MODE=private without OWNER_NUMBER: commands will be ignored");
        }

        let defaults = BotSettings::default();
        let emojis: Vec<String> = self
            .status_react_emojis
            .iter()
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty())
            .collect();

        Ok(BotSettings {
            bot_name: self.bot_name.clone(),
            command_prefix: self.prefix.clone(),
            mode,
            owner,
            auto_status_react: self.auto_status_react,
            status_react_emojis: if emojis.is_empty() {
                defaults.status_react_emojis
            } else {
                emojis
            },
            reject_calls: self.reject_call,
            call_reject_message: defaults.call_reject_message,
            send_timeout: Duration::from_millis(self.send_timeout_ms),
        })
    }

    pub fn registry_settings(&self) -> Result<RegistrySettings, ConfigError> {
        SessionId::validate_prefix(&self.session_prefix).map_err(ConfigError::SessionPrefix)?;
        Ok(RegistrySettings {
            session_prefix: self.session_prefix.clone(),
            policy: self.policy()?,
            bot: Arc::new(self.bot_settings()?),
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        })
    }

    pub fn gateway(&self) -> Arc<dyn WhatsAppGateway> {
        match self.gateway {
            GatewayKind::Bridge => Arc::new(BridgeGateway::new(self.bridge_url.clone())),
            GatewayKind::Scripted => {
                tracing::warn!("GATEWAY=scripted: sessions will never reach WhatsApp");
                Arc::new(ScriptedGateway::new())
            }
        }
    }

    pub fn credential_fetcher(&self) -> Result<Arc<dyn CredentialFetcher>, ConfigError> {
        match self.credential_source {
            CredentialSourceKind::Inline => Ok(Arc::new(InlineCredentialFetcher)),
            CredentialSourceKind::Remote => {
                let base_url = self
                    .credential_base_url
                    .as_deref()
                    .ok_or(ConfigError::MissingCredentialBaseUrl)?;
                Ok(Arc::new(HttpCredentialFetcher::new(base_url)?))
            }
        }
    }

    pub fn credential_store(&self) -> FsCredentialStore {
        FsCredentialStore::new(self.session_dir.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        let mut argv = vec!["wabot-server"];
        argv.extend_from_slice(args);
        Config::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_flags_override_defaults() {
        // テスト項目: フラグで既定値を上書きできる
        // when (操作):
        let config = parse(&[
            "--port",
            "8080",
            "--max-retries",
            "2",
            "--backoff",
            "exponential",
            "--auto-status-react",
            "false",
        ]);

        // then (期待する結果):
        assert_eq!(config.bind_addr(), format!("{}:8080", config.host));
        assert!(!config.auto_status_react);
        let policy = config.policy().unwrap();
        assert_eq!(policy.max_retries(), 2);
        assert!(matches!(policy.backoff(), Backoff::Exponential { .. }));
    }

    #[test]
    fn test_zero_reconnect_delay_is_rejected() {
        // テスト項目: 再接続の待ち時間 0 は設定エラーになる
        let config = parse(&["--reconnect-delay-ms", "0"]);

        assert!(matches!(
            config.policy(),
            Err(ConfigError::Policy(PolicyError::ZeroDelay))
        ));
    }

    #[test]
    fn test_empty_session_prefix_is_rejected() {
        // テスト項目: 空の SESSION_PREFIX は設定エラーになる
        let config = parse(&["--session-prefix", ""]);

        assert!(matches!(
            config.registry_settings(),
            Err(ConfigError::SessionPrefix(ValueObjectError::SessionPrefixInvalid(_)))
        ));
        assert!(parse(&[]).registry_settings().is_ok());
    }

    #[test]
    fn test_bot_settings_from_config() {
        // テスト項目: オーナー番号と絵文字リストが BotSettings に反映される
        // given (前提条件):
        let config = parse(&[
            "--mode",
            "private",
            "--owner-number",
            "+254 700 000000",
            "--status-react-emojis",
            "👍, 🎉",
        ]);

        // when (操作):
        let settings = config.bot_settings().unwrap();

        // then (期待する結果):
        assert_eq!(settings.mode, BotMode::Private);
        assert_eq!(
            settings.owner.unwrap().as_str(),
            "254700000000@s.whatsapp.net"
        );
        assert_eq!(settings.status_react_emojis, vec!["👍", "🎉"]);
    }

    #[test]
    fn test_remote_source_requires_base_url() {
        // テスト項目: remote の場合は CREDENTIAL_BASE_URL が必須
        let config = parse(&["--credential-source", "remote"]);

        assert!(matches!(
            config.credential_fetcher(),
            Err(ConfigError::MissingCredentialBaseUrl)
        ));
    }
}
