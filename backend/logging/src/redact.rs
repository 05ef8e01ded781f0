//! Log Redaction
//!
//! Images travel as base64 data URLs; strip their payloads before logging.

use regex::Regex;
use std::sync::LazyLock;

static DATA_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"data:([a-zA-Z0-9.+-]+/[a-zA-Z0-9.+-]+);base64,([A-Za-z0-9+/=]+)")
        .expect("data URL pattern is valid")
});

/// Replace every data URL payload with a size marker.
pub fn redact_data_urls(input: &str) -> String {
    DATA_URL_RE
        .replace_all(input, |caps: &regex::Captures| {
            format!("data:{};base64,[REDACTED_IMAGE {} bytes]", &caps[1], caps[2].len() * 3 / 4)
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redaction() {
        let raw = "failed on data:image/jpeg;base64,/9j/4AAQSkZJRgABAQ== while decoding";
        let clean = redact_data_urls(raw);
        assert!(!clean.contains("/9j/4AAQ"));
        assert!(clean.starts_with("failed on data:image/jpeg;base64,[REDACTED_IMAGE"));
        assert!(clean.ends_with("while decoding"));
    }

    #[test]
    fn leaves_plain_text_alone() {
        assert_eq!(redact_data_urls("Total: $42.00"), "Total: $42.00");
    }
}
