//! Prefix-tagged decimal encoding for `U256`
//!
//! `U256::from(42)` travels as `"bigint:42"`. Any decoder that sees a string
//! starting with the prefix can restore the integer without a schema.

use alloy_primitives::U256;
use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

pub const BIGINT_PREFIX: &str = "bigint:";

pub fn encode(value: &U256) -> String {
    format!("{BIGINT_PREFIX}{value}")
}

/// `None` unless `raw` is the prefix followed by at least one decimal digit
pub fn decode(raw: &str) -> Option<U256> {
    let digits = raw.strip_prefix(BIGINT_PREFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    U256::from_str_radix(digits, 10).ok()
}

pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&encode(value))
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
    let raw = String::deserialize(deserializer)?;
    decode(&raw).ok_or_else(|| D::Error::custom(format!("expected {BIGINT_PREFIX}<digits>, got {raw:?}")))
}

pub mod option {
    use super::*;

    pub fn serialize<S: Serializer>(value: &Option<U256>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => serializer.serialize_some(&encode(v)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<U256>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|raw| {
                decode(&raw).ok_or_else(|| {
                    D::Error::custom(format!("expected {BIGINT_PREFIX}<digits>, got {raw:?}"))
                })
            })
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_requires_prefix_and_digits() {
        assert_eq!(decode("bigint:0"), Some(U256::ZERO));
        assert_eq!(decode("bigint:"), None);
        assert_eq!(decode("bigint:12a"), None);
        assert_eq!(decode("12"), None);
        assert_eq!(decode("bigint:-1"), None);
    }

    #[test]
    fn test_max_value_survives() {
        let encoded = encode(&U256::MAX);
        assert_eq!(decode(&encoded), Some(U256::MAX));
    }

    #[test]
    fn test_overflow_rejected() {
        // 2^256
        let too_big = "bigint:115792089237316195423570985008687907853269984665640564039457584007913129639936";
        assert_eq!(decode(too_big), None);
    }
}
