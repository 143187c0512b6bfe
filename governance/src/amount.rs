//! Token amounts travel as decimal strings so values past 2^53 survive JSON.

use num_bigint::BigUint;
use serde::de::{self, Visitor};
use serde::{Deserializer, Serializer};
use std::fmt;

pub fn serialize<S: Serializer>(value: &BigUint, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BigUint, D::Error> {
    deserializer.deserialize_any(AmountVisitor)
}

struct AmountVisitor;

impl<'de> Visitor<'de> for AmountVisitor {
    type Value = BigUint;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a non-negative integer or decimal string")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<BigUint, E> {
        Ok(BigUint::from(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<BigUint, E> {
        u64::try_from(v)
            .map(BigUint::from)
            .map_err(|_| E::custom("negative amount"))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<BigUint, E> {
        BigUint::parse_bytes(v.trim().as_bytes(), 10)
            .ok_or_else(|| E::custom(format!("invalid amount: {v}")))
    }
}

/// Per-account amounts keyed by address, each written as a decimal string.
pub mod map {
    use num_bigint::BigUint;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::collections::HashMap;

    #[derive(Deserialize)]
    struct Amount(#[serde(with = "super")] BigUint);

    pub fn serialize<S: Serializer>(
        map: &HashMap<String, BigUint>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_map(map.iter().map(|(k, v)| (k, v.to_string())))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<HashMap<String, BigUint>, D::Error> {
        let raw = HashMap::<String, Amount>::deserialize(deserializer)?;
        Ok(raw.into_iter().map(|(k, Amount(v))| (k, v)).collect())
    }
}

#[cfg(test)]
mod tests {
    use num_bigint::BigUint;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize)]
    struct Wrapper(#[serde(with = "super")] BigUint);

    #[test]
    fn accepts_strings_and_integers() {
        let big: Wrapper = serde_json::from_str("\"123456789012345678901234567890\"").unwrap();
        assert_eq!(big.0.to_string(), "123456789012345678901234567890");
        let small: Wrapper = serde_json::from_str("42").unwrap();
        assert_eq!(small.0, BigUint::from(42u8));
        assert!(serde_json::from_str::<Wrapper>("-1").is_err());
        assert!(serde_json::from_str::<Wrapper>("\"12x\"").is_err());
        assert_eq!(serde_json::to_string(&big).unwrap(), "\"123456789012345678901234567890\"");
    }

    #[derive(Serialize, Deserialize)]
    struct Balances(#[serde(with = "super::map")] std::collections::HashMap<String, BigUint>);

    #[test]
    fn map_values_are_checked_on_decode() {
        let ok: Balances = serde_json::from_str(r#"{"tz1a": "18446744073709551616", "tz1b": 7}"#).unwrap();
        assert_eq!(ok.0["tz1a"], BigUint::from(u64::MAX) + 1u32);
        assert_eq!(ok.0["tz1b"], BigUint::from(7u8));
        assert!(serde_json::from_str::<Balances>(r#"{"tz1a": "lots"}"#).is_err());
        assert!(serde_json::to_string(&ok).unwrap().contains("\"tz1b\":\"7\""));
    }
}
