//! Lenient field decoders for `#[serde(with = "...")]`.
//!
//! Cloud APIs are inconsistent about timestamps (with or without zone,
//! with or without fractional seconds) and frequently quote numbers and
//! booleans. These modules accept every shape observed in practice.

use std::fmt;
use std::marker::PhantomData;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::de::{self, Visitor};

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
];

const ZONED_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%.f%z"];

/// Parse a timestamp in any of the accepted layouts; zone-less values are UTC.
///
/// Accepted: RFC 3339 (`Z` or offset), `YYYY-MM-DDTHH:MM:SS[.fff]`,
/// the same with a space separator, and compact offsets such as `+0800`.
///
/// # Errors
/// Returns a message naming the input when no layout matches.
pub fn parse_cloud_time(input: &str) -> Result<DateTime<Utc>, String> {
    let input = input.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(input) {
        return Ok(at.with_timezone(&Utc));
    }
    for format in ZONED_FORMATS {
        if let Ok(at) = DateTime::parse_from_str(input, format) {
            return Ok(at.with_timezone(&Utc));
        }
    }
    let naive = input.strip_suffix('Z').unwrap_or(input);
    for format in NAIVE_FORMATS {
        if let Ok(at) = NaiveDateTime::parse_from_str(naive, format) {
            return Ok(at.and_utc());
        }
    }
    Err(format!("unrecognized timestamp '{input}'"))
}

/// Timestamps in the layouts of [`parse_cloud_time`]; serialized as RFC 3339.
pub mod cloud_time {
    use super::{DateTime, SecondsFormat, Utc, parse_cloud_time};
    use serde::{Deserialize, Deserializer, Serializer, de};

    /// # Errors
    /// Propagates serializer errors.
    pub fn serialize<S: Serializer>(at: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&at.to_rfc3339_opts(SecondsFormat::AutoSi, true))
    }

    /// # Errors
    /// Fails on non-string input or an unrecognized layout.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_cloud_time(&raw).map_err(de::Error::custom)
    }
}

/// Optional variant of [`cloud_time`]; `null` and `""` decode to `None`.
pub mod option_cloud_time {
    use super::{DateTime, Utc, cloud_time, parse_cloud_time};
    use serde::{Deserialize, Deserializer, Serializer, de};

    /// # Errors
    /// Propagates serializer errors.
    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(
        at: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match at {
            Some(at) => cloud_time::serialize(at, serializer),
            None => serializer.serialize_none(),
        }
    }

    /// # Errors
    /// Fails on an unrecognized layout.
    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            Some(raw) if !raw.trim().is_empty() => {
                parse_cloud_time(&raw).map(Some).map_err(de::Error::custom)
            }
            _ => Ok(None),
        }
    }
}

struct FlexibleInt<T>(PhantomData<T>);

impl<T> Visitor<'_> for FlexibleInt<T>
where
    T: TryFrom<i64> + TryFrom<u64>,
{
    type Value = T;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an integer or a string holding one")
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<T, E> {
        <T as TryFrom<i64>>::try_from(v).map_err(|_| E::custom(format!("{v} is out of range")))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<T, E> {
        <T as TryFrom<u64>>::try_from(v).map_err(|_| E::custom(format!("{v} is out of range")))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<T, E> {
        let v = v.trim();
        if let Ok(i) = v.parse::<i64>() {
            return self.visit_i64(i);
        }
        match v.parse::<u64>() {
            Ok(u) => self.visit_u64(u),
            Err(_) => Err(E::invalid_value(de::Unexpected::Str(v), &self)),
        }
    }
}

/// Integers that may arrive as JSON numbers or numeric strings.
pub mod flexible_int {
    use super::{FlexibleInt, PhantomData};
    use serde::{Deserializer, Serialize, Serializer};

    /// # Errors
    /// Propagates serializer errors.
    pub fn serialize<T: Serialize, S: Serializer>(value: &T, serializer: S) -> Result<S::Ok, S::Error> {
        value.serialize(serializer)
    }

    /// # Errors
    /// Fails on non-numeric strings or values out of range for `T`.
    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        T: TryFrom<i64> + TryFrom<u64>,
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(FlexibleInt(PhantomData))
    }
}

/// Optional variant of [`flexible_int`]; `null` and `""` decode to `None`.
pub mod option_flexible_int {
    use super::{FlexibleInt, PhantomData};
    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serialize, Serializer};
    use std::fmt;

    /// # Errors
    /// Propagates serializer errors.
    #[allow(clippy::ref_option)]
    pub fn serialize<T: Serialize, S: Serializer>(
        value: &Option<T>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        value.serialize(serializer)
    }

    struct OptionalInt<T>(PhantomData<T>);

    impl<'de, T> Visitor<'de> for OptionalInt<T>
    where
        T: TryFrom<i64> + TryFrom<u64>,
    {
        type Value = Option<T>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("an optional integer or numeric string")
        }

        fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_some<D: Deserializer<'de>>(self, d: D) -> Result<Self::Value, D::Error> {
            d.deserialize_any(self)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
            FlexibleInt(PhantomData).visit_i64(v).map(Some)
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
            FlexibleInt(PhantomData).visit_u64(v).map(Some)
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            if v.trim().is_empty() {
                return Ok(None);
            }
            FlexibleInt(PhantomData).visit_str(v).map(Some)
        }
    }

    /// # Errors
    /// Fails on non-numeric strings or values out of range for `T`.
    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
    where
        T: TryFrom<i64> + TryFrom<u64>,
        D: Deserializer<'de>,
    {
        deserializer.deserialize_option(OptionalInt(PhantomData))
    }
}

/// Floats that may arrive as JSON numbers or numeric strings.
pub mod flexible_float {
    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};
    use std::fmt;

    /// # Errors
    /// Propagates serializer errors.
    #[allow(clippy::trivially_copy_pass_by_ref)]
    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(*value)
    }

    struct FlexibleFloat;

    impl Visitor<'_> for FlexibleFloat {
        type Value = f64;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a number or a string holding one")
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<f64, E> {
            Ok(v)
        }

        #[allow(clippy::cast_precision_loss)]
        fn visit_i64<E: de::Error>(self, v: i64) -> Result<f64, E> {
            Ok(v as f64)
        }

        #[allow(clippy::cast_precision_loss)]
        fn visit_u64<E: de::Error>(self, v: u64) -> Result<f64, E> {
            Ok(v as f64)
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<f64, E> {
            v.trim()
                .parse()
                .map_err(|_| E::invalid_value(de::Unexpected::Str(v), &self))
        }
    }

    /// # Errors
    /// Fails on non-numeric strings.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        deserializer.deserialize_any(FlexibleFloat)
    }
}

/// Booleans that may arrive as `true`, `"true"`, `"True"`, `1`, or `"1"`.
pub mod flexible_bool {
    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};
    use std::fmt;

    /// # Errors
    /// Propagates serializer errors.
    #[allow(clippy::trivially_copy_pass_by_ref)]
    pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bool(*value)
    }

    struct FlexibleBool;

    impl Visitor<'_> for FlexibleBool {
        type Value = bool;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a boolean, 0/1, or a string holding one")
        }

        fn visit_bool<E: de::Error>(self, v: bool) -> Result<bool, E> {
            Ok(v)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<bool, E> {
            match v {
                0 => Ok(false),
                1 => Ok(true),
                _ => Err(E::invalid_value(de::Unexpected::Signed(v), &self)),
            }
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<bool, E> {
            match v {
                0 => Ok(false),
                1 => Ok(true),
                _ => Err(E::invalid_value(de::Unexpected::Unsigned(v), &self)),
            }
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<bool, E> {
            match v.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Ok(true),
                "false" | "0" | "no" => Ok(false),
                _ => Err(E::invalid_value(de::Unexpected::Str(v), &self)),
            }
        }
    }

    /// # Errors
    /// Fails on unrecognized strings or integers other than 0 and 1.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        deserializer.deserialize_any(FlexibleBool)
    }
}
