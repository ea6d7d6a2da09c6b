use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

/// Value of a source-defined extension key on mem, cpu, percpu and network records.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum ExtraValue {
    Integer(i64),
    Float(f64),
    Text(String),
    Boolean(bool),
    Absent,
}

impl From<serde_json::Value> for ExtraValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Absent,
            serde_json::Value::Bool(b) => Self::Boolean(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Integer(i),
                None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Self::Text(s),
            other => Self::Text(other.to_string()),
        }
    }
}

impl<'de> Deserialize<'de> for ExtraValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Self::from)
    }
}

/// Deserializes an integer-typed wire field. Whole floats such as `1000.0` are
/// accepted; anything with a fractional part is rejected instead of truncated.
pub fn integer<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    let n = serde_json::Number::deserialize(deserializer)?;
    number_to_i64(&n).ok_or_else(|| D::Error::custom(format!("expected integer, got {n}")))
}

fn number_to_i64(n: &serde_json::Number) -> Option<i64> {
    if let Some(i) = n.as_i64() {
        return Some(i);
    }
    if let Some(u) = n.as_u64() {
        return i64::try_from(u).ok();
    }
    let f = n.as_f64()?;
    if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;

    use super::*;

    #[derive(Debug, Deserialize)]
    struct Holder {
        #[serde(deserialize_with = "integer")]
        n: i64,
    }

    #[test]
    fn extra_value_maps_every_json_kind() {
        assert_eq!(ExtraValue::from(json!(null)), ExtraValue::Absent);
        assert_eq!(ExtraValue::from(json!(3)), ExtraValue::Integer(3));
        assert_eq!(ExtraValue::from(json!(0.25)), ExtraValue::Float(0.25));
        assert_eq!(ExtraValue::from(json!("eth0")), ExtraValue::Text("eth0".into()));
        assert_eq!(ExtraValue::from(json!(true)), ExtraValue::Boolean(true));
        assert_eq!(
            ExtraValue::from(json!([1, 2])),
            ExtraValue::Text("[1,2]".into())
        );
    }

    #[test]
    fn integer_accepts_whole_floats_only() {
        let ok: Holder = serde_json::from_value(json!({ "n": 1000.0 })).unwrap();
        assert_eq!(ok.n, 1000);

        let ok: Holder = serde_json::from_value(json!({ "n": 42 })).unwrap();
        assert_eq!(ok.n, 42);

        assert!(serde_json::from_value::<Holder>(json!({ "n": 10.5 })).is_err());
        assert!(serde_json::from_value::<Holder>(json!({ "n": "10" })).is_err());
    }
}
