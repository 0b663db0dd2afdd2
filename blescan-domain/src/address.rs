use std::fmt;
use std::str::FromStr;

use crate::error::AddressParseError;

/// A 48-bit BLE MAC address, canonically rendered as upper-hex colon form
/// (`AA:BB:CC:DD:EE:FF`). Equality and hashing operate on the raw bytes, not
/// the rendered string, so case and separator choice never affect identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; 6]);

impl Address {
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 6]) -> Self {
        Address(bytes)
    }

    #[must_use]
    pub const fn as_bytes(&self) -> [u8; 6] {
        self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 6 {
            return Err(AddressParseError::WrongSegmentCount {
                found: parts.len(),
                input: s.to_string(),
            });
        }
        let mut bytes = [0u8; 6];
        for (i, part) in parts.iter().enumerate() {
            bytes[i] = u8::from_str_radix(part, 16).map_err(|_| AddressParseError::InvalidByte {
                segment: (*part).to_string(),
                input: s.to_string(),
            })?;
        }
        Ok(Address(bytes))
    }
}

impl serde::Serialize for Address {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for Address {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
