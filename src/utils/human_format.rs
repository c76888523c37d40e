//! Human-readable formatting for log lines and CLI output

/// Formats a byte count with binary units, e.g. `512B`, `1.50KB`, `12.3MB`
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    const THRESHOLD: f64 = 1024.0;

    if bytes == 0 {
        return "0B".to_string();
    }

    let mut size = bytes as f64;
    let mut unit_index = 0;
    while size >= THRESHOLD && unit_index < UNITS.len() - 1 {
        size /= THRESHOLD;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{size:.0}{}", UNITS[unit_index])
    } else if size >= 10.0 {
        format!("{size:.1}{}", UNITS[unit_index])
    } else {
        format!("{size:.2}{}", UNITS[unit_index])
    }
}

/// Formats a span in milliseconds, e.g. `250ms`, `4.20s`, `3m5s`, `2h1m`
pub fn format_duration(millis: u64) -> String {
    if millis < 1000 {
        return format!("{millis}ms");
    }
    if millis < 60_000 {
        let seconds = millis as f64 / 1000.0;
        return if seconds >= 10.0 {
            format!("{seconds:.1}s")
        } else {
            format!("{seconds:.2}s")
        };
    }

    let total_seconds = millis / 1000;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    match (hours, minutes, seconds) {
        (0, m, 0) => format!("{m}m"),
        (0, m, s) => format!("{m}m{s}s"),
        (h, 0, 0) => format!("{h}h"),
        (h, m, 0) => format!("{h}h{m}m"),
        (h, m, s) => format!("{h}h{m}m{s}s"),
    }
}

/// Formats a percentage with one decimal place
pub fn format_percentage(ratio: f64) -> String {
    format!("{:.1}%", ratio * 100.0)
}

/// Shortens long values (error bodies, data URLs) for messages and logs
pub fn preview(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    let head: String = value.chars().take(max_chars).collect();
    format!("{head}... ({} bytes)", value.len())
}
