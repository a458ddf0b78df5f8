use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};

const SIZE_UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];

/// Human-readable size: `0 Bytes`, `1.5 KB`, `1 MB`. Two decimals at most,
/// trailing zeros dropped, capped at GB.
pub fn format_file_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    // floor(log_1024(bytes)) without float error at exact powers
    let mut unit = 0;
    while unit + 1 < SIZE_UNITS.len() && bytes >= 1024u64.pow(unit as u32 + 1) {
        unit += 1;
    }

    let value = bytes as f64 / 1024f64.powi(unit as i32);
    let rounded = (value * 100.0).round() / 100.0;
    format!("{} {}", rounded, SIZE_UNITS[unit])
}

/// Upload time in the local time zone, `2024-05-01 12:30`.
pub fn format_timestamp(iso: &str) -> String {
    format_timestamp_in(iso, &Local)
}

/// Same as [`format_timestamp`] for an explicit zone. Input without an offset
/// is taken as UTC; anything unparseable is shown as-is.
pub fn format_timestamp_in<Tz>(iso: &str, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    match parse_timestamp(iso) {
        Some(utc) => utc.with_timezone(tz).format("%Y-%m-%d %H:%M").to_string(),
        None => iso.to_string(),
    }
}

/// RFC 3339 first. A timestamp without an offset is taken as UTC, which is
/// what the backend stores, rather than as local time the way a browser's
/// `Date` would read it.
fn parse_timestamp(iso: &str) -> Option<DateTime<Utc>> {
    let iso = iso.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(iso) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(iso, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(iso, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|naive| naive.and_utc())
}
