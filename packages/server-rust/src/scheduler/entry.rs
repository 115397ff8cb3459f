//! Schedule modes, time fields and stored entries.

use std::fmt;
use std::sync::Arc;

use rand::Rng;

/// Hour, minute or second constraint of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeField {
    /// Matches every value.
    Any,
    At(u32),
}

impl TimeField {
    #[must_use]
    pub fn matches(self, value: u32) -> bool {
        match self {
            Self::Any => true,
            Self::At(expected) => expected == value,
        }
    }
}

impl fmt::Display for TimeField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("*"),
            Self::At(v) => write!(f, "{v}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScheduleMode {
    EverySecond,
    EveryMinute,
    EveryHour,
    EveryDay,
    /// Fires whenever the given fields match.
    Custom,
}

impl ScheduleMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EverySecond => "every_second",
            Self::EveryMinute => "every_minute",
            Self::EveryHour => "every_hour",
            Self::EveryDay => "every_day",
            Self::Custom => "custom",
        }
    }
}

impl fmt::Display for ScheduleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    #[error("invalid {field} {value}: expected a value below {bound}")]
    InvalidField {
        field: &'static str,
        value: u32,
        bound: u32,
    },
}

/// Time-of-day constraint of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeSpec {
    pub hour: TimeField,
    pub minute: TimeField,
    pub second: TimeField,
}

impl Default for TimeSpec {
    fn default() -> Self {
        Self::any()
    }
}

impl TimeSpec {
    /// All three fields as wildcards.
    #[must_use]
    pub fn any() -> Self {
        Self {
            hour: TimeField::Any,
            minute: TimeField::Any,
            second: TimeField::Any,
        }
    }

    /// Fixed time of day.
    #[must_use]
    pub fn at(hour: u32, minute: u32, second: u32) -> Self {
        Self {
            hour: TimeField::At(hour),
            minute: TimeField::At(minute),
            second: TimeField::At(second),
        }
    }

    #[must_use]
    pub fn with_hour(mut self, hour: u32) -> Self {
        self.hour = TimeField::At(hour);
        self
    }

    #[must_use]
    pub fn with_minute(mut self, minute: u32) -> Self {
        self.minute = TimeField::At(minute);
        self
    }

    #[must_use]
    pub fn with_second(mut self, second: u32) -> Self {
        self.second = TimeField::At(second);
        self
    }

    /// Rejects concrete fields outside a day.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidField`] for an hour above 23 or a
    /// minute or second above 59.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        for (field, value, bound) in [
            ("hour", self.hour, 24),
            ("minute", self.minute, 60),
            ("second", self.second, 60),
        ] {
            if let TimeField::At(v) = value {
                if v >= bound {
                    return Err(SchedulerError::InvalidField {
                        field,
                        value: v,
                        bound,
                    });
                }
            }
        }
        Ok(())
    }

    /// Resolves the stored fields for `mode`. Hourly and daily jitter is
    /// drawn once here and kept for the entry's lifetime.
    #[must_use]
    pub fn normalize<R: Rng>(self, mode: ScheduleMode, rng: &mut R) -> Self {
        match mode {
            ScheduleMode::EverySecond => Self::any(),
            ScheduleMode::EveryMinute => Self::any().with_second(0),
            ScheduleMode::EveryHour => Self::any()
                .with_minute(0)
                .with_second(rng.random_range(0..=58)),
            ScheduleMode::EveryDay => Self::at(
                rng.random_range(0..=4),
                rng.random_range(1..=58),
                0,
            ),
            ScheduleMode::Custom => self,
        }
    }

    #[must_use]
    pub fn matches(&self, hour: u32, minute: u32, second: u32) -> bool {
        self.second.matches(second) && self.minute.matches(minute) && self.hour.matches(hour)
    }
}

impl fmt::Display for TimeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.hour, self.minute, self.second)
    }
}

/// Callback with its context already bound.
pub(crate) type BoundCallback = Arc<dyn Fn() -> anyhow::Result<()> + Send + Sync>;

/// One live scheduler registration.
pub(crate) struct Entry {
    pub key: String,
    /// Type name of the callback, for logs.
    pub label: &'static str,
    pub mode: ScheduleMode,
    pub time: TimeSpec,
    pub callback: BoundCallback,
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("key", &self.key)
            .field("label", &self.label)
            .field("mode", &self.mode)
            .field("time", &self.time)
            .finish_non_exhaustive()
    }
}
