//! Core type definitions shared across the verification engine.

/// 32-byte SHA-256 digest
pub type Hash256 = [u8; 32];

/// Parse a digest from a hex string (with or without a `0x` prefix).
///
/// Returns `None` for anything that is not exactly 32 bytes of hex.
pub fn digest_from_hex(s: &str) -> Option<Hash256> {
    let hex_str = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(hex_str).ok()?;
    bytes.try_into().ok()
}

/// Serde module for serializing `Hash256` as a hex string
pub mod digest_hex {
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 32], D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        super::digest_from_hex(&s)
            .ok_or_else(|| serde::de::Error::custom("expected 32 bytes of hex for digest"))
    }
}

/// Serde module for optional `Hash256` as hex strings
pub mod option_digest_hex {
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(opt: &Option<[u8; 32]>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match opt {
            Some(bytes) => serializer.serialize_some(&hex::encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<[u8; 32]>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt: Option<String> = Option::deserialize(deserializer)?;
        match opt {
            Some(s) => super::digest_from_hex(&s)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom("expected 32 bytes of hex for digest")),
            None => Ok(None),
        }
    }
}
