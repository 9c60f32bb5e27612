// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Log entries handed to the transport by the generator.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Numeric tag identifier negotiated through the [`crate::tags::TagTable`].
pub type TagId = u16;

const NANOS_PER_SEC: u32 = 1_000_000_000;

/// Point in time as signed seconds relative to the Unix epoch plus a
/// nanosecond remainder in `0..1_000_000_000`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp {
    sec: i64,
    nsec: u32,
}

impl Timestamp {
    /// Builds a timestamp, carrying any nanosecond overflow into the seconds.
    #[must_use]
    pub fn new(sec: i64, nsec: u32) -> Self {
        Timestamp {
            sec: sec.saturating_add(i64::from(nsec / NANOS_PER_SEC)),
            nsec: nsec % NANOS_PER_SEC,
        }
    }

    #[must_use]
    pub fn now() -> Self {
        SystemTime::now().into()
    }

    #[must_use]
    pub fn sec(&self) -> i64 {
        self.sec
    }

    #[must_use]
    pub fn nsec(&self) -> u32 {
        self.nsec
    }

    #[must_use]
    pub fn is_before_epoch(&self) -> bool {
        self.sec < 0
    }

    /// Fractional Unix epoch seconds. Timestamps before the epoch clamp to `0`
    /// because HEC rejects negative times.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn epoch_seconds(&self) -> f64 {
        if self.is_before_epoch() {
            return 0.0;
        }
        self.sec as f64 + f64::from(self.nsec) / f64::from(NANOS_PER_SEC)
    }
}

impl From<SystemTime> for Timestamp {
    fn from(time: SystemTime) -> Self {
        match time.duration_since(UNIX_EPOCH) {
            Ok(since) => Timestamp::new(
                i64::try_from(since.as_secs()).unwrap_or(i64::MAX),
                since.subsec_nanos(),
            ),
            Err(err) => {
                // Before the epoch: round the negative offset down to whole seconds.
                let before: Duration = err.duration();
                let secs = i64::try_from(before.as_secs()).unwrap_or(i64::MAX);
                match before.subsec_nanos() {
                    0 => Timestamp::new(-secs, 0),
                    nanos => Timestamp::new((-secs).saturating_sub(1), NANOS_PER_SEC - nanos),
                }
            }
        }
    }
}

/// A single generated log entry. Consumed once by the encoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub ts: Timestamp,
    pub tag: TagId,
    pub data: Vec<u8>,
}

impl Entry {
    #[must_use]
    pub fn new(ts: Timestamp, tag: TagId, data: impl Into<Vec<u8>>) -> Self {
        Entry {
            ts,
            tag,
            data: data.into(),
        }
    }
}
