use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::shared::ArenaError;

pub const ADDRESS_SIZE: usize = 20;

/// Fixed-length participant identity (20 bytes, rendered as lowercase hex)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AvatarAddress([u8; ADDRESS_SIZE]);

impl AvatarAddress {
    pub fn from_bytes(bytes: [u8; ADDRESS_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_SIZE] {
        &self.0
    }

    /// Lowercase hex without prefix, the form used inside store keys
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }

    pub fn random() -> Self {
        Self(rand::random())
    }
}

impl FromStr for AvatarAddress {
    type Err = ArenaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);

        if !hex.is_ascii() {
            return Err(ArenaError::InvalidAddress(s.to_string()));
        }
        if hex.len() != ADDRESS_SIZE * 2 {
            return Err(ArenaError::InvalidAddress(format!(
                "expected {} hex characters, got {}",
                ADDRESS_SIZE * 2,
                hex.len()
            )));
        }

        let mut bytes = [0u8; ADDRESS_SIZE];
        for (i, byte) in bytes.iter_mut().enumerate() {
            let pair = &hex[i * 2..i * 2 + 2];
            *byte = u8::from_str_radix(pair, 16)
                .map_err(|_| ArenaError::InvalidAddress(s.to_string()))?;
        }

        Ok(Self(bytes))
    }
}

impl fmt::Display for AvatarAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

impl Serialize for AvatarAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for AvatarAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
