use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The persisted settings record, `<cache>/.settings.json`.
///
/// Only `version` is interpreted. Any other keys found on disk are carried
/// through unchanged when the record is rewritten.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Tag of the last successfully installed release.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl CacheSettings {
    pub fn with_version(version: impl Into<String>) -> Self {
        Self {
            version: Some(version.into()),
            ..Self::default()
        }
    }

    pub fn installed_version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn set_installed_version(&mut self, version: impl Into<String>) {
        self.version = Some(version.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_settings_serialize_to_empty_object() {
        let json = serde_json::to_string(&CacheSettings::default()).unwrap();
        assert_eq!(json, "{}");
    }

    #[test]
    fn test_version_key() {
        let json = serde_json::to_string(&CacheSettings::with_version("v1.2.3")).unwrap();
        assert_eq!(json, r#"{"version":"v1.2.3"}"#);
    }

    #[test]
    fn test_unknown_keys_survive() {
        let settings: CacheSettings =
            serde_json::from_str(r#"{"version": "0.600", "channel": "stable"}"#).unwrap();
        assert_eq!(settings.installed_version(), Some("0.600"));
        let json = serde_json::to_value(&settings).unwrap();
        assert_eq!(json["channel"], "stable");
    }
}
