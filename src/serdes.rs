//! Versioned, type-tagged serialization for records persisted or passed between
//! processes.
//!
//! Every record is wrapped in an envelope naming its format version and class:
//!
//! ```json
//! {"__version__": 1, "record": {"__class__": "ReexecutionConfig", "value": {...}}}
//! ```
//!
//! Only the classes listed in [`SerializableRecord`] can be decoded. Envelopes
//! written by a newer format version are rejected rather than guessed at.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config_plugin::ConfigPluginData;
use crate::constants::SERDES_VERSION;
use crate::error::{CoordinatorError, Result};
use crate::execution::config::ReexecutionConfig;
use crate::instance::InstanceRef;

/// Every record class the envelope format can carry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "__class__", content = "value")]
pub enum SerializableRecord {
    ReexecutionConfig(ReexecutionConfig),
    ConfigPluginData(ConfigPluginData),
    InstanceRef(InstanceRef),
}

impl SerializableRecord {
    pub const CLASS_NAMES: [&'static str; 3] =
        ["ReexecutionConfig", "ConfigPluginData", "InstanceRef"];

    pub fn class_name(&self) -> &'static str {
        match self {
            Self::ReexecutionConfig(_) => ReexecutionConfig::CLASS_NAME,
            Self::ConfigPluginData(_) => ConfigPluginData::CLASS_NAME,
            Self::InstanceRef(_) => InstanceRef::CLASS_NAME,
        }
    }
}

/// A record type with a stable class name in the envelope format
pub trait SerdesRecord: Serialize + DeserializeOwned {
    const CLASS_NAME: &'static str;

    fn from_record(record: SerializableRecord) -> Option<Self>;
}

impl SerdesRecord for ReexecutionConfig {
    const CLASS_NAME: &'static str = "ReexecutionConfig";

    fn from_record(record: SerializableRecord) -> Option<Self> {
        match record {
            SerializableRecord::ReexecutionConfig(value) => Some(value),
            _ => None,
        }
    }
}

impl SerdesRecord for ConfigPluginData {
    const CLASS_NAME: &'static str = "ConfigPluginData";

    fn from_record(record: SerializableRecord) -> Option<Self> {
        match record {
            SerializableRecord::ConfigPluginData(value) => Some(value),
            _ => None,
        }
    }
}

impl SerdesRecord for InstanceRef {
    const CLASS_NAME: &'static str = "InstanceRef";

    fn from_record(record: SerializableRecord) -> Option<Self> {
        match record {
            SerializableRecord::InstanceRef(value) => Some(value),
            _ => None,
        }
    }
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "__version__")]
    version: u32,
    record: Value,
}

/// Serialize `value` into an envelope string.
pub fn serialize_value<T: SerdesRecord>(value: &T) -> Result<String> {
    let envelope = json!({
        "__version__": SERDES_VERSION,
        "record": {
            "__class__": T::CLASS_NAME,
            "value": serde_json::to_value(value)?,
        },
    });
    Ok(serde_json::to_string(&envelope)?)
}

/// Decode an envelope into whichever record class it names.
pub fn deserialize_record(json_str: &str) -> Result<SerializableRecord> {
    let envelope: Envelope = serde_json::from_str(json_str)?;

    if envelope.version > SERDES_VERSION {
        return Err(CoordinatorError::Serialization(format!(
            "Record was written by serdes version {}, newer than supported version {SERDES_VERSION}",
            envelope.version
        )));
    }

    let class_name = envelope
        .record
        .get("__class__")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            CoordinatorError::Serialization("Record envelope has no __class__".to_string())
        })?;
    if !SerializableRecord::CLASS_NAMES.contains(&class_name) {
        return Err(CoordinatorError::Serialization(format!(
            "Attempted to deserialize unknown record class {class_name}"
        )));
    }

    Ok(serde_json::from_value(envelope.record)?)
}

/// Decode an envelope that must hold a `T`.
pub fn deserialize_value<T: SerdesRecord>(json_str: &str) -> Result<T> {
    let record = deserialize_record(json_str)?;
    let found = record.class_name();

    T::from_record(record).ok_or_else(|| {
        CoordinatorError::Serialization(format!(
            "Expected a serialized {} but found {found}",
            T::CLASS_NAME
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::plan::StepOutputHandle;

    fn sample_reexecution() -> ReexecutionConfig {
        ReexecutionConfig::new(
            "prev-run",
            vec![
                StepOutputHandle::new("extract", "rows"),
                StepOutputHandle::new("transform", "clean"),
            ],
        )
    }

    #[test]
    fn test_envelope_shape() {
        let json_str = serialize_value(&sample_reexecution()).unwrap();
        let value: Value = serde_json::from_str(&json_str).unwrap();

        assert_eq!(value["__version__"], 1);
        assert_eq!(value["record"]["__class__"], "ReexecutionConfig");
        assert_eq!(value["record"]["value"]["previous_run_id"], "prev-run");
    }

    #[test]
    fn test_class_dispatch() {
        let data = ConfigPluginData::new("m", "p", "base_dir: /x\n");
        let json_str = serialize_value(&data).unwrap();

        assert_eq!(
            deserialize_record(&json_str).unwrap(),
            SerializableRecord::ConfigPluginData(data.clone())
        );
        assert_eq!(deserialize_value::<ConfigPluginData>(&json_str).unwrap(), data);

        let mismatch = deserialize_value::<ReexecutionConfig>(&json_str).unwrap_err();
        assert!(mismatch.to_string().contains("ConfigPluginData"));
    }

    #[test]
    fn test_rejects_unknown_class_and_newer_version() {
        let unknown = r#"{"__version__": 1, "record": {"__class__": "Mystery", "value": {}}}"#;
        assert!(deserialize_record(unknown)
            .unwrap_err()
            .to_string()
            .contains("Mystery"));

        let newer = serialize_value(&sample_reexecution())
            .unwrap()
            .replace("\"__version__\":1", "\"__version__\":2");
        assert!(matches!(
            deserialize_record(&newer),
            Err(CoordinatorError::Serialization(_))
        ));
    }
}
