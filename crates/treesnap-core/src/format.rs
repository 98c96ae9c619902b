//! Human-readable size strings.

const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// Format a byte count using the largest unit that keeps the value below 1024.
///
/// Scaling uses integer division, so `1536` renders as `1 KB`.
pub fn readable_size(bytes: u64) -> String {
    let mut value = bytes;
    let mut order = 0;
    while value >= 1024 && order < UNITS.len() - 1 {
        order += 1;
        value /= 1024;
    }
    format!("{value} {}", UNITS[order])
}

/// Parse a string produced by [`readable_size`] back into its scaled byte count.
pub fn parse_readable_size(text: &str) -> Option<u64> {
    let (value, unit) = text.trim().split_once(' ')?;
    let value: u64 = value.parse().ok()?;
    let order = UNITS.iter().position(|u| *u == unit)?;
    value.checked_mul(1024u64.checked_pow(order as u32)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_boundaries() {
        assert_eq!(readable_size(0), "0 B");
        assert_eq!(readable_size(1023), "1023 B");
        assert_eq!(readable_size(1024), "1 KB");
        assert_eq!(readable_size(1536), "1 KB");
        assert_eq!(readable_size(1048576), "1 MB");
        assert_eq!(readable_size(5 * 1024 * 1024 * 1024), "5 GB");
    }

    #[test]
    fn test_caps_at_terabytes() {
        let pb = 1024u64.pow(5);
        assert_eq!(readable_size(pb), "1024 TB");
        assert_eq!(readable_size(u64::MAX), "16777215 TB");
    }

    #[test]
    fn test_parse() {
        assert_eq!(parse_readable_size("1 KB"), Some(1024));
        assert_eq!(parse_readable_size("3 MB"), Some(3 * 1024 * 1024));
        assert_eq!(parse_readable_size("12 parsecs"), None);
    }
}
