/// Event type codes that occupy byte 6 of a BT510 log entry. Only the
/// variants with a defined numeric datum are listed here; everything else
/// (including Movement) is a recognized BT510 event with no decodable value
/// and is skipped during log parsing.
pub const TEMPERATURE: u8 = 1;
pub const BATTERY_GOOD: u8 = 12;
pub const BATTERY_BAD: u8 = 13;
pub const BATTERY: u8 = 16;

#[must_use]
pub fn is_battery(code: u8) -> bool {
    matches!(code, BATTERY_GOOD | BATTERY_BAD | BATTERY)
}
