/// Decodes a BT510 raw 16-bit temperature datum. The wire value is a
/// two's-complement signed integer in hundredths of a degree Celsius.
#[must_use]
pub fn decode_temperature(raw: u16) -> f64 {
    f64::from(raw as i16) / 100.0
}

/// Encodes a temperature in degrees Celsius to the BT510 raw wire form, the
/// inverse of [`decode_temperature`] at 0.01 °C granularity. Values outside
/// the representable range of a signed 16-bit hundredths-of-a-degree datum
/// saturate rather than wrap.
#[must_use]
pub fn encode_temperature(celsius: f64) -> u16 {
    let hundredths = (celsius * 100.0).round();
    let clamped = hundredths.clamp(f64::from(i16::MIN), f64::from(i16::MAX));
    (clamped as i16) as u16
}

/// Decodes a BT510 raw 16-bit battery datum: unsigned millivolts, returned
/// as volts.
#[must_use]
pub fn decode_battery(raw: u16) -> f64 {
    f64::from(raw) / 1000.0
}
