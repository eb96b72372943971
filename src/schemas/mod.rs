use std::collections::HashMap;

use serde::de::Error as _;
use serde::{Deserialize, Serialize};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

pub(crate) mod attempt;
pub(crate) mod exam;
pub(crate) mod results;

#[derive(Debug, Serialize)]
pub(crate) struct HealthResponse {
    pub(crate) service: String,
    pub(crate) status: String,
    pub(crate) components: HashMap<String, String>,
}

/// RFC 3339, or a naive `YYYY-MM-DDTHH:MM[:SS]` read as UTC.
fn parse_datetime(raw: &str) -> Option<OffsetDateTime> {
    if let Ok(value) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Some(value);
    }

    let naive = raw.as_bytes().get(10) == Some(&b'T');
    let candidate = match raw.len() {
        16 if naive => format!("{raw}:00Z"),
        19 if naive => format!("{raw}Z"),
        _ => return None,
    };
    OffsetDateTime::parse(&candidate, &Rfc3339).ok()
}

pub(crate) fn deserialize_option_datetime<'de, D>(
    deserializer: D,
) -> Result<Option<OffsetDateTime>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(raw) => parse_datetime(&raw)
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("invalid datetime: {raw}"))),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::parse_datetime;
    use time::macros::datetime;

    #[test]
    fn accepts_rfc3339_and_naive_local_inputs() {
        assert_eq!(parse_datetime("2025-05-01T10:00:00+02:00"), Some(datetime!(2025-05-01 10:00:00 +02:00)));
        assert_eq!(parse_datetime("2025-05-01T10:00"), Some(datetime!(2025-05-01 10:00:00 UTC)));
        assert_eq!(parse_datetime("2025-05-01T10:00:30"), Some(datetime!(2025-05-01 10:00:30 UTC)));
        assert_eq!(parse_datetime("tomorrow"), None);
    }
}
