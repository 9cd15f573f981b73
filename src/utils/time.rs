use chrono::{DateTime, Utc};

const DEFAULT_LABEL_SECONDS: u32 = 15;
const MAX_LABEL_MINUTES: u32 = 9;

pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Converts an assignment duration label into seconds.
///
/// Labels are either `M:SS` or a legacy decimal number of minutes. Minutes are
/// capped at 9; an empty label means 15 seconds and an unreadable legacy label
/// means one minute.
pub fn label_to_seconds(label: &str) -> u32 {
    let label = label.trim();
    if label.is_empty() {
        return DEFAULT_LABEL_SECONDS;
    }

    if let Some((minutes, seconds)) = label.split_once(':') {
        let minutes = leading_int(minutes).min(MAX_LABEL_MINUTES);
        let seconds = leading_int(seconds);
        return minutes * 60 + seconds;
    }

    let minutes = match label.parse::<f64>() {
        Ok(m) if m.is_finite() && m != 0.0 => m,
        _ => 1.0,
    };
    let minutes = minutes.min(MAX_LABEL_MINUTES as f64).max(0.0);
    (minutes * 60.0).round() as u32
}

fn leading_int(raw: &str) -> u32 {
    let digits: String = raw
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().unwrap_or(0)
}

pub fn format_countdown(seconds: u32) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}
