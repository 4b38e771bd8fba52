//! Human display formatting for server statistics and TTLs.

/// Format a byte count the way the info panels expect.
pub fn bytes(bytes: u64) -> String {
    if bytes > 1_048_576 {
        format!("{:.2}MB", bytes as f64 / 1_048_576.0)
    } else if bytes > 1024 {
        format!("{:.2}kB", bytes as f64 / 1024.0)
    } else {
        format!("{}bytes", bytes)
    }
}

/// Format a second count as words (uptime, TTL).
///
/// Negative values are the store's no-expiry sentinel.
pub fn seconds(time: i64) -> String {
    if time < 0 {
        return "Doesn't expire".to_string();
    }

    let days = time / 86_400;
    let hours = (time % 86_400) / 3600;
    let minutes = (time % 3600) / 60;
    let secs = time % 60;

    let sections = [
        (days, "day"),
        (hours, "hour"),
        (minutes, "minute"),
        (secs, "second"),
    ];

    let parts: Vec<String> = sections
        .iter()
        .filter(|(value, _)| *value > 0)
        .map(|(value, name)| {
            format!("{} {}{}", value, name, if *value == 1 { "" } else { "s" })
        })
        .collect();

    if parts.is_empty() {
        "0 seconds".to_string()
    } else {
        parts.join(" ")
    }
}

/// Group an integer with thousands separators.
pub fn number(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);

    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }

    out
}

/// Truncate text to `length` characters, appending an ellipsis.
pub fn truncate(text: &str, length: usize) -> String {
    if text.chars().count() <= length {
        return text.to_string();
    }

    let cut: String = text.chars().take(length.saturating_sub(3)).collect();
    format!("{}...", cut)
}
