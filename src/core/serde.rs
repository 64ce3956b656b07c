use serde::{Serialize, Deserialize, Serializer, Deserializer};
use std::time::Duration;

/// Serializes Duration as whole milliseconds
pub fn serialize_duration<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    crate::util::duration_to_millis(*duration).serialize(serializer)
}

/// Deserializes Duration from whole milliseconds
pub fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let millis = u64::deserialize(deserializer)?;
    Ok(crate::util::millis_to_duration(millis))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json;

    #[derive(Serialize, Deserialize)]
    struct Test {
        #[serde(serialize_with = "serialize_duration")]
        #[serde(deserialize_with = "deserialize_duration")]
        timeout: Duration,
    }

    #[test]
    fn test_duration_is_written_as_millis() {
        let original = Test {
            timeout: Duration::from_millis(1500),
        };

        let serialized = serde_json::to_string(&original).unwrap();
        assert_eq!(serialized, r#"{"timeout":1500}"#);

        let deserialized: Test = serde_json::from_str(&serialized).unwrap();
        assert_eq!(deserialized.timeout, original.timeout);
    }

    #[test]
    fn test_sub_millisecond_precision_is_dropped() {
        let original = Test {
            timeout: Duration::from_micros(2_750),
        };

        let serialized = serde_json::to_string(&original).unwrap();
        let deserialized: Test = serde_json::from_str(&serialized).unwrap();
        assert_eq!(deserialized.timeout, Duration::from_millis(2));
    }
}
