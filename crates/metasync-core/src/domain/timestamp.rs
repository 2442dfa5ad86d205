use std::fmt::{Display, Formatter};
use std::time::Duration;

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::format_description::well_known::Rfc3339;
use time::{OffsetDateTime, UtcOffset};

use crate::ValidationError;

/// RFC3339 timestamp guaranteed to be UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UtcDateTime(OffsetDateTime);

impl UtcDateTime {
    pub fn now() -> Self {
        Self(OffsetDateTime::now_utc())
    }

    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let parsed = OffsetDateTime::parse(input, &Rfc3339).map_err(|_| {
            ValidationError::TimestampNotUtc {
                value: input.to_owned(),
            }
        })?;

        Self::from_offset_datetime(parsed).map_err(|_| ValidationError::TimestampNotUtc {
            value: input.to_owned(),
        })
    }

    pub fn from_offset_datetime(value: OffsetDateTime) -> Result<Self, ValidationError> {
        if value.offset() != UtcOffset::UTC {
            return Err(ValidationError::TimestampNotUtc {
                value: value
                    .format(&Rfc3339)
                    .unwrap_or_else(|_| String::from("<unformattable>")),
            });
        }

        Ok(Self(value))
    }

    pub fn into_inner(self) -> OffsetDateTime {
        self.0
    }

    /// Time elapsed since this timestamp; zero when it lies in the future.
    pub fn age(self) -> Duration {
        let elapsed = OffsetDateTime::now_utc() - self.0;
        Duration::try_from(elapsed).unwrap_or(Duration::ZERO)
    }

    pub fn is_in_future(self) -> bool {
        self.0 > OffsetDateTime::now_utc()
    }

    /// Shift the timestamp back by `duration`. Used to age fixtures.
    pub fn saturating_sub(self, duration: Duration) -> Self {
        let shifted = time::Duration::try_from(duration)
            .ok()
            .and_then(|delta| self.0.checked_sub(delta))
            .unwrap_or(self.0);
        Self(shifted)
    }

    pub fn format_rfc3339(self) -> String {
        // Every UTC OffsetDateTime within the year range `time` supports formats.
        self.0
            .format(&Rfc3339)
            .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
    }
}

impl Display for UtcDateTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.format_rfc3339())
    }
}

impl Serialize for UtcDateTime {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.format_rfc3339())
    }
}

impl<'de> Deserialize<'de> for UtcDateTime {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Self::parse(&value).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_utc_timestamp() {
        let parsed = UtcDateTime::parse("2024-01-01T00:00:00Z").expect("must parse");
        assert_eq!(parsed.format_rfc3339(), "2024-01-01T00:00:00Z");
    }

    #[test]
    fn rejects_non_utc_timestamp() {
        let err = UtcDateTime::parse("2024-01-01T01:00:00+01:00").expect_err("must fail");
        assert!(matches!(err, ValidationError::TimestampNotUtc { .. }));
    }

    #[test]
    fn age_grows_with_shift_and_clamps_future() {
        let now = UtcDateTime::now();
        let earlier = now.saturating_sub(Duration::from_secs(3_600));
        assert!(earlier.age() >= Duration::from_secs(3_600));

        let future = UtcDateTime::from_offset_datetime(
            OffsetDateTime::now_utc() + time::Duration::hours(1),
        )
        .expect("utc");
        assert!(future.is_in_future());
        assert_eq!(future.age(), Duration::ZERO);
    }
}
