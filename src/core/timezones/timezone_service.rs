use chrono::{DateTime, Utc};
use chrono_tz::Tz;

/// Common abbreviations moderators type instead of IANA names. Checked before
/// the IANA database so that e.g. `EST` means New York rather than the fixed
/// `EST` zone.
const ABBREVIATIONS: &[(&str, &str)] = &[
    ("UTC", "UTC"),
    ("GMT", "UTC"),
    ("Z", "UTC"),
    ("PT", "America/Los_Angeles"),
    ("PST", "America/Los_Angeles"),
    ("PDT", "America/Los_Angeles"),
    ("MT", "America/Denver"),
    ("MST", "America/Denver"),
    ("MDT", "America/Denver"),
    ("CT", "America/Chicago"),
    ("CST", "America/Chicago"),
    ("CDT", "America/Chicago"),
    ("ET", "America/New_York"),
    ("EST", "America/New_York"),
    ("EDT", "America/New_York"),
    ("UK", "Europe/London"),
    ("BST", "Europe/London"),
    ("CET", "Europe/Berlin"),
    ("CEST", "Europe/Berlin"),
    ("EET", "Europe/Athens"),
    ("EEST", "Europe/Athens"),
    ("IST", "Asia/Kolkata"),
    ("JST", "Asia/Tokyo"),
    ("AEST", "Australia/Sydney"),
    ("AEDT", "Australia/Sydney"),
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown timezone: {0}. Use an IANA name like `Europe/London` or an abbreviation like `PT`.")]
pub struct UnknownTimezone(pub String);

/// Resolve an abbreviation or IANA identifier.
pub fn resolve_timezone(raw: &str) -> Result<Tz, UnknownTimezone> {
    let candidate = raw.trim();
    if candidate.is_empty() {
        return Err(UnknownTimezone(raw.to_string()));
    }

    if let Some((_, tz_name)) = ABBREVIATIONS
        .iter()
        .find(|(abbr, _)| abbr.eq_ignore_ascii_case(candidate))
    {
        return tz_name
            .parse::<Tz>()
            .map_err(|_| UnknownTimezone(candidate.to_string()));
    }

    Tz::from_str_insensitive(candidate).map_err(|_| UnknownTimezone(candidate.to_string()))
}

/// Discord renders `<t:…:F>` in each reader's own timezone.
pub fn discord_timestamp(instant: DateTime<Utc>) -> String {
    format!("<t:{}:F>", instant.timestamp())
}
