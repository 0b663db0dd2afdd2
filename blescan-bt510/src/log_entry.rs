use blescan_domain::{Measurement, Origin};
use chrono::{DateTime, TimeZone, Utc};

use crate::event_code;
use crate::scalars::{decode_battery, decode_temperature};

const ENTRY_LEN: usize = 8;

/// Walks `bytes` in 8-byte strides, decoding each stride whose event-type
/// byte is recognized into a [`Measurement`]. Strides with an unrecognized
/// event type are silently skipped (no measurement emitted, no error).
/// A trailing partial stride shorter than 8 bytes is silently dropped. An
/// empty input yields an empty result.
#[must_use]
pub fn parse_log(bytes: &[u8]) -> Vec<Measurement> {
    bytes
        .chunks_exact(ENTRY_LEN)
        .filter_map(parse_entry)
        .collect()
}

fn parse_entry(entry: &[u8]) -> Option<Measurement> {
    debug_assert_eq!(entry.len(), ENTRY_LEN);

    let epoch_seconds = u32::from_le_bytes([entry[0], entry[1], entry[2], entry[3]]);
    let raw16 = u16::from_le_bytes([entry[4], entry[5]]);
    let event = entry[6];

    let timestamp_utc = epoch_seconds_to_datetime(epoch_seconds);

    match event {
        event_code::TEMPERATURE => Some(Measurement::temperature(
            decode_temperature(raw16),
            Origin::Log,
            timestamp_utc,
        )),
        code if event_code::is_battery(code) => Some(Measurement::battery(
            decode_battery(raw16),
            Origin::Log,
            timestamp_utc,
        )),
        _ => None,
    }
}

fn epoch_seconds_to_datetime(epoch_seconds: u32) -> DateTime<Utc> {
    Utc.timestamp_opt(i64::from(epoch_seconds), 0)
        .single()
        .expect("u32 epoch seconds is always in range for a Utc timestamp")
}
