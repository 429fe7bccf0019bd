use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Surrogate key for models, schema snapshots and entries
pub type Id = i64;

/// Identifier of the authenticated user performing an operation
pub type ActorId = i64;

pub const NAME_MIN_CHARS: usize = 3;
pub const NAME_MAX_CHARS: usize = 255;
pub const SLUG_MAX_CHARS: usize = 255;

/// Build a URL-safe slug from a display name.
/// "Project Alpha!" -> "project-alpha"
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;

    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    if slug.is_empty() {
        slug.push_str("model");
    }
    slug.truncate(SLUG_MAX_CHARS);
    slug.trim_end_matches('-').to_string()
}

/// A slug is lowercase ascii alphanumerics separated by single dashes
pub fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug.len() <= SLUG_MAX_CHARS
        && !slug.starts_with('-')
        && !slug.ends_with('-')
        && !slug.contains("--")
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// Candidate slug for the n-th collision ("alpha", "alpha-2", "alpha-3", ...)
pub fn slug_candidate(base: &str, attempt: u32) -> String {
    if attempt <= 1 {
        return base.to_string();
    }
    let suffix = format!("-{}", attempt);
    let mut head = base.to_string();
    head.truncate(SLUG_MAX_CHARS - suffix.len());
    format!("{}{}", head.trim_end_matches('-'), suffix)
}

/// Parse a timestamp the way clients send them: RFC 3339,
/// `YYYY-MM-DD HH:MM:SS` (UTC) or a bare `YYYY-MM-DD` (midnight UTC)
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
    }
    None
}
