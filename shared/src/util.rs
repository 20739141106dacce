use rand::Rng;
use rand::distributions::Alphanumeric;

/// Current UTC timestamp in milliseconds
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Random alphanumeric string (used for generated passwords)
pub fn random_alphanumeric(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Render Unix millis as RFC 3339 (UTC, millisecond precision)
pub fn millis_to_rfc3339(millis: i64) -> String {
    chrono::DateTime::from_timestamp_millis(millis)
        .map(|dt| dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_alphanumeric() {
        let s = random_alphanumeric(16);
        assert_eq!(s.len(), 16);
        assert!(s.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(s, random_alphanumeric(16));
    }

    #[test]
    fn test_millis_to_rfc3339() {
        assert_eq!(millis_to_rfc3339(1_704_067_200_000), "2024-01-01T00:00:00.000Z");
    }
}
