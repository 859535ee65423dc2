use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// The configuration a `setup.py` passed to `setup()`, after setuptools has normalized it.
///
/// The requirement lists and the package metadata are typed; every other public attribute of
/// the distribution object is kept verbatim in [`SetupInformation::extra`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SetupInformation {
    #[serde(default)]
    pub metadata: DistributionMetadata,
    #[serde(default, deserialize_with = "requirement_list")]
    pub setup_requires: Vec<String>,
    #[serde(default, deserialize_with = "requirement_list")]
    pub install_requires: Vec<String>,
    #[serde(default, deserialize_with = "requirement_list")]
    pub tests_require: Vec<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl SetupInformation {
    /// The declared package name, if any.
    pub fn name(&self) -> Option<&str> {
        self.metadata.name.as_deref()
    }
}

/// The `metadata` object of the distribution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DistributionMetadata {
    #[serde(default, deserialize_with = "string_like")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "string_like")]
    pub version: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Old scripts pass `version=1.0`; setuptools doesn't always coerce it.
fn string_like<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringLike {
        String(String),
        Number(serde_json::Number),
    }

    Ok(
        Option::<StringLike>::deserialize(deserializer)?.map(|value| match value {
            StringLike::String(string) => string,
            StringLike::Number(number) => number.to_string(),
        }),
    )
}

/// Requirements are either a list or a single string with one requirement per line.
fn requirement_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Requirements {
        List(Vec<String>),
        Lines(String),
    }

    Ok(match Option::<Requirements>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(Requirements::List(list)) => list,
        Some(Requirements::Lines(lines)) => lines
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(ToString::to_string)
            .collect(),
    })
}
