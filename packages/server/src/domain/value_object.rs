//! Value Objects for domain models.
//!
//! Value Objects are immutable objects that represent values in the domain.
//! They are compared by their value, not by identity.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::ValueObjectError;

/// Maximum length of a [`UserId`].
pub const USER_ID_MAX_LEN: usize = 64;

/// Default prefix of a pre-provisioned session identifier.
pub const DEFAULT_SESSION_PREFIX: &str = "CLOUD-AI~";

/// User identifier value object.
///
/// Keys the session registry and names the per-user credential directory,
/// so only `[A-Za-z0-9._-]` is accepted and `.`/`..` are rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    /// Create a new UserId.
    ///
    /// # Arguments
    ///
    /// * `id` - The user identifier string
    ///
    /// # Returns
    ///
    /// A Result containing the UserId or an error if validation fails
    pub fn new(id: String) -> Result<Self, ValueObjectError> {
        if id.is_empty() {
            return Err(ValueObjectError::UserIdEmpty);
        }
        let len = id.len();
        if len > USER_ID_MAX_LEN {
            return Err(ValueObjectError::UserIdTooLong {
                max: USER_ID_MAX_LEN,
                actual: len,
            });
        }
        let valid_chars = id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !valid_chars || id == "." || id == ".." {
            return Err(ValueObjectError::UserIdInvalidFormat(id));
        }
        Ok(Self(id))
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Convert to owned String.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl TryFrom<String> for UserId {
    type Error = ValueObjectError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<UserId> for String {
    fn from(value: UserId) -> Self {
        value.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Pre-provisioned session identifier value object.
///
/// Shape: `<prefix><payload>`. The prefix carries the delimiter (`~` for the
/// default prefix) and the payload is whatever the credential fetcher needs
/// to locate the bundle. Parsing never touches the network or filesystem.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionId {
    raw: String,
    prefix_len: usize,
}

impl SessionId {
    /// Separator between the prefix's name and the payload.
    pub const DELIMITER: char = '~';

    /// A prefix is a non-empty name followed by [`Self::DELIMITER`].
    pub fn validate_prefix(prefix: &str) -> Result<(), ValueObjectError> {
        match prefix.strip_suffix(Self::DELIMITER) {
            Some(name) if !name.is_empty() => Ok(()),
            _ => Err(ValueObjectError::SessionPrefixInvalid(prefix.to_string())),
        }
    }

    /// Parse a raw session string against the expected prefix.
    pub fn parse(raw: &str, prefix: &str) -> Result<Self, ValueObjectError> {
        Self::validate_prefix(prefix)?;
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ValueObjectError::SessionIdEmpty);
        }
        let Some(payload) = raw.strip_prefix(prefix) else {
            return Err(ValueObjectError::SessionIdMissingPrefix {
                prefix: prefix.to_string(),
            });
        };
        if payload.is_empty() {
            return Err(ValueObjectError::SessionIdEmptyPayload);
        }
        if payload.chars().any(char::is_whitespace) {
            return Err(ValueObjectError::SessionIdInvalidPayload);
        }
        Ok(Self {
            raw: raw.to_string(),
            prefix_len: prefix.len(),
        })
    }

    /// The part after the prefix.
    pub fn payload(&self) -> &str {
        &self.raw[self.prefix_len..]
    }

    /// The complete identifier as supplied.
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

// Session identifiers are credentials: keep them out of logs.
impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionId")
            .field("prefix", &&self.raw[..self.prefix_len])
            .field("payload_len", &self.payload().len())
            .finish()
    }
}

/// WhatsApp address (JID).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Jid(String);

impl Jid {
    /// Address of status broadcasts.
    pub const STATUS_BROADCAST: &'static str = "status@broadcast";

    /// Server part of a personal account.
    pub const USER_SERVER: &'static str = "s.whatsapp.net";

    pub fn new(jid: String) -> Result<Self, ValueObjectError> {
        match jid.split_once('@') {
            Some((user, server)) if !user.is_empty() && !server.is_empty() => Ok(Self(jid)),
            _ => Err(ValueObjectError::JidInvalidFormat(jid)),
        }
    }

    /// Build a personal JID from a phone number, keeping only digits.
    pub fn from_phone(number: &str) -> Result<Self, ValueObjectError> {
        let digits: String = number.chars().filter(char::is_ascii_digit).collect();
        if digits.is_empty() {
            return Err(ValueObjectError::JidInvalidFormat(number.to_string()));
        }
        Ok(Self(format!("{digits}@{}", Self::USER_SERVER)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The user part without the device suffix (`12345:7@...` -> `12345`).
    pub fn user(&self) -> &str {
        let user = self.0.split('@').next().unwrap_or_default();
        user.split(':').next().unwrap_or(user)
    }

    pub fn server(&self) -> &str {
        self.0.split_once('@').map(|(_, s)| s).unwrap_or_default()
    }

    /// Strip the device suffix so the JID addresses the account itself.
    pub fn normalize_user(&self) -> Self {
        Self(format!("{}@{}", self.user(), self.server()))
    }

    pub fn is_status_broadcast(&self) -> bool {
        self.0 == Self::STATUS_BROADCAST
    }
}

impl TryFrom<String> for Jid {
    type Error = ValueObjectError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Jid> for String {
    fn from(value: Jid) -> Self {
        value.0
    }
}

impl fmt::Display for Jid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a single connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(uuid::Uuid);

impl ConnectionId {
    pub fn from_uuid(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Timestamp value object.
///
/// Represents a Unix timestamp in milliseconds (JST).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Create a new Timestamp.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Current time.
    pub fn now() -> Self {
        Self(wabot_shared::time::get_jst_timestamp())
    }

    /// Get the inner i64 value.
    pub fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_id_new_success() {
        // テスト項目: 有効なユーザー ID を作成できる
        // given (前提条件):
        let id = "alice".to_string();

        // when (操作):
        let result = UserId::new(id);

        // then (期待する結果):
        assert!(result.is_ok());
        assert_eq!(result.unwrap().as_str(), "alice");
    }

    #[test]
    fn test_user_id_new_empty_fails() {
        // テスト項目: 空のユーザー ID は作成できない
        let result = UserId::new("".to_string());

        assert_eq!(result.unwrap_err(), ValueObjectError::UserIdEmpty);
    }

    #[test]
    fn test_user_id_new_too_long_fails() {
        // テスト項目: 65 文字以上のユーザー ID は作成できない
        // given (前提条件):
        let id = "a".repeat(65);

        // when (操作):
        let result = UserId::new(id);

        // then (期待する結果):
        assert_eq!(
            result.unwrap_err(),
            ValueObjectError::UserIdTooLong {
                max: 64,
                actual: 65
            }
        );
    }

    #[test]
    fn test_user_id_rejects_path_traversal() {
        // テスト項目: ディレクトリ名として危険な ID は拒否される
        for id in ["..", ".", "a/b", "a\\b", "bob smith"] {
            let result = UserId::new(id.to_string());
            assert!(
                matches!(result, Err(ValueObjectError::UserIdInvalidFormat(_))),
                "{id} should be rejected"
            );
        }
    }

    #[test]
    fn test_session_id_parse_success() {
        // テスト項目: プレフィックス付きのセッション ID をパースできる
        // when (操作):
        let session_id = SessionId::parse("CLOUD-AI~abc123#key", DEFAULT_SESSION_PREFIX).unwrap();

        // then (期待する結果):
        assert_eq!(session_id.payload(), "abc123#key");
        assert_eq!(session_id.as_str(), "CLOUD-AI~abc123#key");
    }

    #[test]
    fn test_session_id_parse_missing_delimiter_fails() {
        // テスト項目: 区切り文字を含まないセッション ID は拒否される
        let result = SessionId::parse("BAD_FORMAT", DEFAULT_SESSION_PREFIX);

        assert_eq!(
            result.unwrap_err(),
            ValueObjectError::SessionIdMissingPrefix {
                prefix: DEFAULT_SESSION_PREFIX.to_string()
            }
        );
    }

    #[test]
    fn test_session_id_parse_empty_payload_fails() {
        // テスト項目: プレフィックスのみのセッション ID は拒否される
        let result = SessionId::parse("CLOUD-AI~", DEFAULT_SESSION_PREFIX);

        assert_eq!(result.unwrap_err(), ValueObjectError::SessionIdEmptyPayload);
    }

    #[test]
    fn test_session_id_prefix_needs_delimiter() {
        // テスト項目: 空のプレフィックスや区切り文字のないプレフィックスは使えない
        assert!(SessionId::validate_prefix(DEFAULT_SESSION_PREFIX).is_ok());
        assert_eq!(
            SessionId::validate_prefix(""),
            Err(ValueObjectError::SessionPrefixInvalid(String::new()))
        );
        assert!(SessionId::validate_prefix("~").is_err());
        assert!(SessionId::validate_prefix("CLOUD-AI").is_err());

        // 空のプレフィックスで BAD_FORMAT が通ってはならない
        assert!(SessionId::parse("BAD_FORMAT", "").is_err());
    }

    #[test]
    fn test_session_id_debug_hides_payload() {
        // テスト項目: Debug 出力に認証情報が含まれない
        let session_id = SessionId::parse("CLOUD-AI~secret", DEFAULT_SESSION_PREFIX).unwrap();

        let rendered = format!("{session_id:?}");

        assert!(!rendered.contains("secret"));
    }

    #[test]
    fn test_jid_normalize_user_strips_device() {
        // テスト項目: デバイス番号付きの JID が正規化される
        // given (前提条件):
        let jid = Jid::new("254700000000:12@s.whatsapp.net".to_string()).unwrap();

        // when (操作):
        let normalized = jid.normalize_user();

        // then (期待する結果):
        assert_eq!(normalized.as_str(), "254700000000@s.whatsapp.net");
        assert_eq!(jid.user(), "254700000000");
    }

    #[test]
    fn test_jid_classification() {
        // テスト項目: ステータス配信と個人の JID を判別できる
        let status = Jid::new(Jid::STATUS_BROADCAST.to_string()).unwrap();
        let user = Jid::from_phone("+254 700 000000").unwrap();

        assert!(status.is_status_broadcast());
        assert_eq!(user.as_str(), "254700000000@s.whatsapp.net");
        assert!(!user.is_status_broadcast());
    }

    #[test]
    fn test_jid_invalid_format_fails() {
        // テスト項目: @ を含まない JID は作成できない
        assert!(Jid::new("nobody".to_string()).is_err());
        assert!(Jid::new("@s.whatsapp.net".to_string()).is_err());
        assert!(Jid::from_phone("abc").is_err());
    }

    #[test]
    fn test_timestamp_ordering() {
        // テスト項目: タイムスタンプは順序付けできる
        let ts1 = Timestamp::new(1000);
        let ts2 = Timestamp::new(2000);

        assert!(ts1 < ts2);
        assert_eq!(ts2.value(), 2000);
    }
}
