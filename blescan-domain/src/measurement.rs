use chrono::{DateTime, Utc};
use serde::Serialize;

/// The kind of reading a [`Measurement`] carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MeasurementKind {
    Temperature,
    Battery,
    Movement,
    Other,
}

/// Where a [`Measurement`] was extracted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Origin {
    Advertisement,
    Log,
}

/// An immutable, fully-decoded sensor reading. Movement events carry no
/// numeric value, so `value` is absent for them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Measurement {
    pub kind: MeasurementKind,
    pub value: Option<f64>,
    pub unit: &'static str,
    pub origin: Origin,
    pub timestamp_utc: DateTime<Utc>,
}

impl Measurement {
    #[must_use]
    pub fn new(
        kind: MeasurementKind,
        value: Option<f64>,
        unit: &'static str,
        origin: Origin,
        timestamp_utc: DateTime<Utc>,
    ) -> Self {
        Measurement {
            kind,
            value,
            unit,
            origin,
            timestamp_utc,
        }
    }

    #[must_use]
    pub fn temperature(value: f64, origin: Origin, timestamp_utc: DateTime<Utc>) -> Self {
        Measurement::new(MeasurementKind::Temperature, Some(value), "\u{00b0}C", origin, timestamp_utc)
    }

    #[must_use]
    pub fn battery(value: f64, origin: Origin, timestamp_utc: DateTime<Utc>) -> Self {
        Measurement::new(MeasurementKind::Battery, Some(value), "V", origin, timestamp_utc)
    }

    #[must_use]
    pub fn movement(origin: Origin, timestamp_utc: DateTime<Utc>) -> Self {
        Measurement::new(MeasurementKind::Movement, None, "", origin, timestamp_utc)
    }
}
