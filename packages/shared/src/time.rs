use chrono::{DateTime, FixedOffset, Utc};

fn jst() -> FixedOffset {
    FixedOffset::east_opt(9 * 3600).unwrap() // JST is UTC+9
}

/// Get current Unix timestamp in JST (milliseconds)
pub fn get_jst_timestamp() -> i64 {
    let now_jst: DateTime<FixedOffset> = Utc::now().with_timezone(&jst());
    now_jst.timestamp_millis()
}

/// Render a Unix timestamp (milliseconds) as an RFC 3339 string in JST.
///
/// Out-of-range values fall back to the epoch.
pub fn timestamp_to_jst_rfc3339(timestamp_ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(timestamp_ms)
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
        .with_timezone(&jst())
        .to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_to_jst_rfc3339() {
        // テスト項目: Unix 時刻が JST の RFC 3339 文字列に変換される
        // given (前提条件):
        let timestamp = 1672498800000i64; // 2023-01-01T00:00:00+09:00

        // when (操作):
        let rendered = timestamp_to_jst_rfc3339(timestamp);

        // then (期待する結果):
        assert_eq!(rendered, "2023-01-01T00:00:00+09:00");
    }

    #[test]
    fn test_get_jst_timestamp_is_positive() {
        // テスト項目: 現在時刻のタイムスタンプが正の値になる
        assert!(get_jst_timestamp() > 0);
    }
}
