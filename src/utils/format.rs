use std::time::Duration;

pub const KB: u64 = 1000;
pub const MB: u64 = 1000 * KB;

/// 格式化字节数
///
/// Decimal units, trailing zeros trimmed: `60000000` → `60MB`.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    const UNIT_SIZE: f64 = 1000.0;

    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= UNIT_SIZE && unit_index < UNITS.len() - 1 {
        size /= UNIT_SIZE;
        unit_index += 1;
    }

    let number = format!("{:.2}", size);
    let number = number.trim_end_matches('0').trim_end_matches('.');
    format!("{}{}", number, UNITS[unit_index])
}

/// 格式化持续时间
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0B");
        assert_eq!(format_bytes(999), "999B");
        assert_eq!(format_bytes(1500), "1.5KB");
        assert_eq!(format_bytes(60_000_000), "60MB");
        assert_eq!(format_bytes(100 * MB), "100MB");
        assert_eq!(format_bytes(50 * MB + 1), "50MB");
        assert_eq!(format_bytes(52_428_800), "52.43MB");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(42)), "42s");
        assert_eq!(format_duration(Duration::from_secs(301)), "5m 1s");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1h 2m 5s");
    }
}
