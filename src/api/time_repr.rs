use std::time::SystemTime;
use time::format_description::well_known::Iso8601;
use time::OffsetDateTime;

/// ISO-8601 UTC serialization wrapper for timestamps in JSON responses.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Iso8601Time(OffsetDateTime);

impl From<SystemTime> for Iso8601Time {
    fn from(value: SystemTime) -> Self {
        Self(value.into())
    }
}

impl Iso8601Time {
    /// Parse an ISO-8601 timestamp (e.g. `2016-03-04T17:45:31.1234567Z`).
    pub(crate) fn parse(raw: &str) -> Result<SystemTime, time::error::Parse> {
        OffsetDateTime::parse(raw, &Iso8601::DEFAULT).map(Into::into)
    }
}

impl serde::Serialize for Iso8601Time {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0
            .format(&Iso8601::DEFAULT)
            .map_err(serde::ser::Error::custom)?
            .serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_as_utc_iso8601() {
        let timestamp =
            SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(1_700_000_000);
        let json = serde_json::to_string(&Iso8601Time::from(timestamp)).unwrap();
        assert!(json.starts_with("\"2023-11-14T22:13:20"), "{json}");
        assert!(json.ends_with("Z\""), "{json}");
    }

    #[test]
    fn parses_client_timestamps() {
        let parsed = Iso8601Time::parse("2016-03-04T17:45:31.1234567Z").unwrap();
        let round_trip = serde_json::to_string(&Iso8601Time::from(parsed)).unwrap();
        assert!(round_trip.starts_with("\"2016-03-04T17:45:31"), "{round_trip}");
        assert!(Iso8601Time::parse("not a date").is_err());
    }
}
