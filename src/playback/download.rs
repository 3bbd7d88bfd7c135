use chrono::{DateTime, Utc};
use std::path::Path;

use crate::audio::EncodingFormat;

/// File name for a downloaded asset
///
/// A file name the remote store already knows wins; otherwise one is
/// synthesized from a timestamp and the format's extension.
pub fn download_filename(
    remote_filename: Option<&str>,
    format: &EncodingFormat,
    now: DateTime<Utc>,
) -> String {
    let known = remote_filename
        .and_then(|name| Path::new(name.trim()).file_name())
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty());

    match known {
        Some(name) => name.to_string(),
        None => format!(
            "recording-{}.{}",
            now.format("%Y%m%d-%H%M%S"),
            format.extension
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_remote_name_wins() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 9, 30, 0).unwrap();
        let name = download_filename(Some("session-12.webm"), &EncodingFormat::wav(), now);
        assert_eq!(name, "session-12.webm");
    }

    #[test]
    fn test_remote_name_strips_directories() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 9, 30, 0).unwrap();
        let name = download_filename(Some("../../etc/take.wav"), &EncodingFormat::wav(), now);
        assert_eq!(name, "take.wav");
    }

    #[test]
    fn test_synthesized_name() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 9, 30, 5).unwrap();
        let format = EncodingFormat::new("audio/webm;codecs=opus", "webm");

        assert_eq!(download_filename(None, &format, now), "recording-20250301-093005.webm");
        assert_eq!(download_filename(Some("  "), &format, now), "recording-20250301-093005.webm");
    }
}
