//! # Utility helpers
//!
//! Small formatting helpers used by logging and error messages throughout
//! the driver.

use std::time::Duration;

/// Render a duration the way log lines and error messages want it: whole
/// milliseconds below a second, otherwise seconds with one decimal place.
pub fn format_duration(d: Duration) -> String {
    if d < Duration::from_secs(1) {
        format!("{}ms", d.as_millis())
    } else {
        format!("{:.1}s", d.as_secs_f64())
    }
}

/// Mask all but the first character of a credential so it can appear in
/// debug logs without leaking the value (§9A "redacted credentials").
pub fn redact(value: &str) -> String {
    match value.chars().next() {
        Some(first) => format!("{first}{}", "*".repeat(value.len().saturating_sub(1))),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_sub_second_durations_as_millis() {
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
    }

    #[test]
    fn formats_durations_at_or_over_a_second() {
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.5s");
    }

    #[test]
    fn redacts_all_but_first_character() {
        assert_eq!(redact("hunter2"), "h******");
    }

    #[test]
    fn redacts_empty_string_to_empty() {
        assert_eq!(redact(""), "");
    }
}
