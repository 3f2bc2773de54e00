//! Configuration handed to the mapping runtime's module loader.

use serde::{Deserialize, Serialize};

use crate::{core::constants::DEFAULT_VERSION, Result};

/// Key, version and feature modules requested from the mapping runtime.
///
/// Setters are permissive: input of the wrong shape is ignored rather than
/// reported, so a page can throw loosely typed option literals at it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LoadConfig {
    pub api_key: String,
    /// Extra feature modules. May contain duplicates; see
    /// [`LoadConfig::normalized_libraries`].
    pub libraries: Vec<String>,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            libraries: Vec::new(),
            version: DEFAULT_VERSION.to_string(),
            language: None,
            region: None,
        }
    }
}

impl LoadConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    pub fn with_libraries<I, S>(mut self, libraries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set_libraries(libraries);
        self
    }

    pub fn with_version(mut self, version: &str) -> Self {
        self.set_version(version);
        self
    }

    /// Parse a JSON options literal; unknown keys are ignored
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn set_api_key(&mut self, api_key: &str) {
        self.api_key = api_key.to_string();
    }

    /// Replace the library list. Blank names are dropped.
    pub fn set_libraries<I, S>(&mut self, libraries: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.libraries = libraries
            .into_iter()
            .map(Into::into)
            .filter(|name: &String| !name.trim().is_empty())
            .collect();
    }

    pub fn add_library(&mut self, library: &str) {
        if !library.trim().is_empty() {
            self.libraries.push(library.to_string());
        }
    }

    /// Blank versions are ignored, keeping the current channel
    pub fn set_version(&mut self, version: &str) {
        if !version.trim().is_empty() {
            self.version = version.to_string();
        }
    }

    pub fn set_language(&mut self, language: &str) {
        if !language.trim().is_empty() {
            self.language = Some(language.to_string());
        }
    }

    pub fn set_region(&mut self, region: &str) {
        if !region.trim().is_empty() {
            self.region = Some(region.to_string());
        }
    }

    /// Merge a loosely typed options object.
    ///
    /// Recognized keys: `apiKey`, `libraries`, `version`, `language`,
    /// `region`. A key whose value has the wrong JSON type is skipped, and
    /// `libraries` is skipped entirely unless every entry is a string.
    pub fn apply_options(&mut self, options: &serde_json::Value) {
        let Some(options) = options.as_object() else {
            return;
        };

        if let Some(api_key) = options.get("apiKey").and_then(|v| v.as_str()) {
            self.set_api_key(api_key);
        }
        if let Some(libraries) = options.get("libraries").and_then(|v| v.as_array()) {
            let names: Option<Vec<&str>> = libraries.iter().map(|v| v.as_str()).collect();
            if let Some(names) = names {
                self.set_libraries(names);
            }
        }
        if let Some(version) = options.get("version").and_then(|v| v.as_str()) {
            self.set_version(version);
        }
        if let Some(language) = options.get("language").and_then(|v| v.as_str()) {
            self.set_language(language);
        }
        if let Some(region) = options.get("region").and_then(|v| v.as_str()) {
            self.set_region(region);
        }
    }

    pub fn has_credentials(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    /// Libraries with duplicates removed, first occurrence kept
    pub fn normalized_libraries(&self) -> Vec<String> {
        let mut seen = crate::prelude::HashSet::default();
        self.libraries
            .iter()
            .filter(|name| seen.insert(name.as_str()))
            .cloned()
            .collect()
    }

    /// Copy of this configuration as it is handed to the backend
    pub fn normalized(&self) -> LoadConfig {
        LoadConfig {
            libraries: self.normalized_libraries(),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let config = LoadConfig::default();
        assert_eq!(config.api_key, "");
        assert!(config.libraries.is_empty());
        assert_eq!(config.version, DEFAULT_VERSION);
        assert!(!config.has_credentials());
    }

    #[test]
    fn test_libraries_deduplicated_in_order() {
        let config = LoadConfig::new("key").with_libraries(["places", "marker", "places", "geometry"]);
        assert_eq!(config.libraries.len(), 4);
        assert_eq!(config.normalized_libraries(), vec!["places", "marker", "geometry"]);
        assert_eq!(config.normalized().libraries, vec!["places", "marker", "geometry"]);
    }

    #[test]
    fn test_apply_options_ignores_wrong_types() {
        let mut config = LoadConfig::new("original");
        config.apply_options(&json!({
            "apiKey": 42,
            "libraries": ["places", 7],
            "version": "beta",
            "region": null,
        }));

        assert_eq!(config.api_key, "original");
        assert!(config.libraries.is_empty());
        assert_eq!(config.version, "beta");
        assert_eq!(config.region, None);

        config.apply_options(&json!("not an object"));
        assert_eq!(config.version, "beta");
    }

    #[test]
    fn test_blank_inputs_ignored() {
        let mut config = LoadConfig::default();
        config.set_version("  ");
        config.add_library("");
        config.set_libraries(["", "places"]);
        config.set_language("");

        assert_eq!(config.version, DEFAULT_VERSION);
        assert_eq!(config.libraries, vec!["places"]);
        assert_eq!(config.language, None);
    }

    #[test]
    fn test_from_json_literal() {
        let config =
            LoadConfig::from_json_str(r#"{"apiKey": "abc", "libraries": ["places"], "extra": 1}"#)
                .expect("valid literal");
        assert_eq!(config.api_key, "abc");
        assert_eq!(config.libraries, vec!["places"]);
        assert_eq!(config.version, DEFAULT_VERSION);

        assert!(matches!(
            LoadConfig::from_json_str("{"),
            Err(crate::Error::Serialization(_))
        ));
    }
}
