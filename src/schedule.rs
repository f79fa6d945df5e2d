//! Escrow deadline schedule.
//!
//! Every escrow carries four deadlines that gate its lifecycle:
//!
//! ```text
//!  pay_by_time ─► submit_result_time ─► unlock_time ─► external_dispute_unlock_time
//!   (buyer locks     (seller submits       (seller may      (disputes settle
//!    funds)           result hash)          withdraw)        externally)
//! ```
//!
//! The ordering `pay_by < submit_result < unlock <= external_dispute_unlock`
//! is checked when a schedule is built, so an out-of-order schedule never
//! reaches the payment service.

use crate::config::DeadlineWindows;
use crate::error::{Error, Result};
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// The four time gates of one escrow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawSchedule", into = "RawSchedule")]
pub struct DeadlineSchedule {
    pay_by_time: DateTime<Utc>,
    submit_result_time: DateTime<Utc>,
    unlock_time: DateTime<Utc>,
    external_dispute_unlock_time: DateTime<Utc>,
}

impl DeadlineSchedule {
    /// Build a schedule, enforcing the ordering invariant.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if the deadlines are out of order.
    pub fn new(
        pay_by_time: DateTime<Utc>,
        submit_result_time: DateTime<Utc>,
        unlock_time: DateTime<Utc>,
        external_dispute_unlock_time: DateTime<Utc>,
    ) -> Result<Self> {
        if pay_by_time >= submit_result_time {
            return Err(Error::Validation(format!(
                "payByTime ({pay_by_time}) must be before submitResultTime ({submit_result_time})"
            )));
        }
        if submit_result_time >= unlock_time {
            return Err(Error::Validation(format!(
                "submitResultTime ({submit_result_time}) must be before unlockTime ({unlock_time})"
            )));
        }
        if unlock_time > external_dispute_unlock_time {
            return Err(Error::Validation(format!(
                "unlockTime ({unlock_time}) must not be after externalDisputeUnlockTime ({external_dispute_unlock_time})"
            )));
        }
        Ok(Self {
            pay_by_time,
            submit_result_time,
            unlock_time,
            external_dispute_unlock_time,
        })
    }

    /// Build a schedule from Unix timestamps in seconds.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if a timestamp is out of range or the
    /// deadlines are out of order.
    pub fn from_unix_secs(
        pay_by: i64,
        submit_result: i64,
        unlock: i64,
        external_dispute_unlock: i64,
    ) -> Result<Self> {
        Self::new(
            from_secs(pay_by)?,
            from_secs(submit_result)?,
            from_secs(unlock)?,
            from_secs(external_dispute_unlock)?,
        )
    }

    /// Derive a schedule by offsetting each deadline from `now`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if the windows are out of order.
    pub fn starting_at(now: DateTime<Utc>, windows: &DeadlineWindows) -> Result<Self> {
        let offset = |secs: u64| -> Result<DateTime<Utc>> {
            i64::try_from(secs)
                .ok()
                .and_then(Duration::try_seconds)
                .and_then(|d| now.checked_add_signed(d))
                .ok_or_else(|| Error::Validation(format!("deadline window {secs}s out of range")))
        };
        Self::new(
            offset(windows.pay_by_secs)?,
            offset(windows.submit_result_secs)?,
            offset(windows.unlock_secs)?,
            offset(windows.external_dispute_unlock_secs)?,
        )
    }

    /// Deadline for the buyer to lock funds.
    #[must_use]
    pub fn pay_by_time(&self) -> DateTime<Utc> {
        self.pay_by_time
    }

    /// Deadline for the seller to submit the result hash.
    #[must_use]
    pub fn submit_result_time(&self) -> DateTime<Utc> {
        self.submit_result_time
    }

    /// Time after which the seller may withdraw.
    #[must_use]
    pub fn unlock_time(&self) -> DateTime<Utc> {
        self.unlock_time
    }

    /// Time after which disputes are settled externally.
    #[must_use]
    pub fn external_dispute_unlock_time(&self) -> DateTime<Utc> {
        self.external_dispute_unlock_time
    }

    /// True once the pay-by deadline has passed.
    #[must_use]
    pub fn payment_window_closed(&self, now: DateTime<Utc>) -> bool {
        now >= self.pay_by_time
    }

    /// True once the result submission deadline has passed.
    #[must_use]
    pub fn result_window_closed(&self, now: DateTime<Utc>) -> bool {
        now >= self.submit_result_time
    }
}

fn from_secs(secs: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| Error::Validation(format!("timestamp {secs} out of range")))
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSchedule {
    #[serde(with = "unix_millis")]
    pay_by_time: DateTime<Utc>,
    #[serde(with = "unix_millis")]
    submit_result_time: DateTime<Utc>,
    #[serde(with = "unix_millis")]
    unlock_time: DateTime<Utc>,
    #[serde(with = "unix_millis")]
    external_dispute_unlock_time: DateTime<Utc>,
}

impl TryFrom<RawSchedule> for DeadlineSchedule {
    type Error = Error;

    fn try_from(raw: RawSchedule) -> Result<Self> {
        Self::new(
            raw.pay_by_time,
            raw.submit_result_time,
            raw.unlock_time,
            raw.external_dispute_unlock_time,
        )
    }
}

impl From<DeadlineSchedule> for RawSchedule {
    fn from(s: DeadlineSchedule) -> Self {
        Self {
            pay_by_time: s.pay_by_time,
            submit_result_time: s.submit_result_time,
            unlock_time: s.unlock_time,
            external_dispute_unlock_time: s.external_dispute_unlock_time,
        }
    }
}

/// Serde adapter for the wire time format: Unix milliseconds as a string.
///
/// Deserialization also accepts a bare JSON number.
pub mod unix_millis {
    use chrono::{DateTime, TimeZone, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Millis {
        Text(String),
        Number(i64),
    }

    fn to_datetime<E: de::Error>(raw: Millis) -> Result<DateTime<Utc>, E> {
        let millis = match raw {
            Millis::Number(n) => n,
            Millis::Text(s) => s
                .trim()
                .parse::<i64>()
                .map_err(|_| E::custom(format!("invalid millisecond timestamp: {s}")))?,
        };
        Utc.timestamp_millis_opt(millis)
            .single()
            .ok_or_else(|| E::custom(format!("timestamp out of range: {millis}")))
    }

    /// Serialize a timestamp as a string of Unix milliseconds.
    ///
    /// # Errors
    ///
    /// Propagates serializer errors.
    pub fn serialize<S: Serializer>(time: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.timestamp_millis().to_string())
    }

    /// Deserialize a timestamp from Unix milliseconds (string or number).
    ///
    /// # Errors
    ///
    /// Fails on non-numeric text or out-of-range values.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        to_datetime(Millis::deserialize(deserializer)?)
    }

    /// Same format for optional fields; `null` or a missing field map to `None`.
    pub mod option {
        use super::{to_datetime, Millis};
        use chrono::{DateTime, Utc};
        use serde::{Deserialize, Deserializer, Serializer};

        /// Serialize an optional timestamp.
        ///
        /// # Errors
        ///
        /// Propagates serializer errors.
        pub fn serialize<S: Serializer>(
            time: &Option<DateTime<Utc>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match time {
                Some(t) => super::serialize(t, serializer),
                None => serializer.serialize_none(),
            }
        }

        /// Deserialize an optional timestamp.
        ///
        /// # Errors
        ///
        /// Fails on non-numeric text or out-of-range values.
        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            Option::<Millis>::deserialize(deserializer)?
                .map(to_datetime)
                .transpose()
        }
    }
}
