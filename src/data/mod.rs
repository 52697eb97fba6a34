//! Typed payloads exchanged between facts and analysers.
//!
//! A fact declares a [`Format`] and, once collected, holds a [`FactData`]
//! of the matching shape. Consumers read the payload through the `as_*`
//! accessors, which hand back the empty value of the requested shape
//! instead of failing when the payload is missing or shaped differently.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Shape of a fact's collected data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Format {
    Raw,
    String,
    List,
    MapString,
    MapListString,
    MapNestedString,
    MapBytes,
    Nil,
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Raw => write!(f, "raw"),
            Self::String => write!(f, "string"),
            Self::List => write!(f, "list"),
            Self::MapString => write!(f, "map-string"),
            Self::MapListString => write!(f, "map-list-string"),
            Self::MapNestedString => write!(f, "map-nested-string"),
            Self::MapBytes => write!(f, "map-bytes"),
            Self::Nil => write!(f, "nil"),
        }
    }
}

/// Collected fact payload, one variant per [`Format`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FactData {
    #[default]
    Nil,
    Raw(Vec<u8>),
    String(String),
    List(Vec<String>),
    MapString(BTreeMap<String, String>),
    MapListString(BTreeMap<String, Vec<String>>),
    MapNestedString(BTreeMap<String, BTreeMap<String, String>>),
    MapBytes(BTreeMap<String, Vec<u8>>),
}

impl FactData {
    /// The empty payload for a format.
    pub fn zero(format: Format) -> Self {
        match format {
            Format::Raw => Self::Raw(Vec::new()),
            Format::String => Self::String(String::new()),
            Format::List => Self::List(Vec::new()),
            Format::MapString => Self::MapString(BTreeMap::new()),
            Format::MapListString => Self::MapListString(BTreeMap::new()),
            Format::MapNestedString => Self::MapNestedString(BTreeMap::new()),
            Format::MapBytes => Self::MapBytes(BTreeMap::new()),
            Format::Nil => Self::Nil,
        }
    }

    pub fn format(&self) -> Format {
        match self {
            Self::Nil => Format::Nil,
            Self::Raw(_) => Format::Raw,
            Self::String(_) => Format::String,
            Self::List(_) => Format::List,
            Self::MapString(_) => Format::MapString,
            Self::MapListString(_) => Format::MapListString,
            Self::MapNestedString(_) => Format::MapNestedString,
            Self::MapBytes(_) => Format::MapBytes,
        }
    }

    /// True for `Nil` and for any empty collection or string.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Nil => true,
            Self::Raw(b) => b.is_empty(),
            Self::String(s) => s.is_empty(),
            Self::List(l) => l.is_empty(),
            Self::MapString(m) => m.is_empty(),
            Self::MapListString(m) => m.is_empty(),
            Self::MapNestedString(m) => m.is_empty(),
            Self::MapBytes(m) => m.is_empty(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Raw(b) => b,
            _ => &[],
        }
    }

    /// String payloads as-is; raw bytes decoded lossily.
    pub fn as_string(&self) -> String {
        match self {
            Self::String(s) => s.clone(),
            Self::Raw(b) => String::from_utf8_lossy(b).into_owned(),
            _ => String::new(),
        }
    }

    pub fn as_list(&self) -> Vec<String> {
        match self {
            Self::List(l) => l.clone(),
            _ => Vec::new(),
        }
    }

    pub fn as_map_string(&self) -> BTreeMap<String, String> {
        match self {
            Self::MapString(m) => m.clone(),
            _ => BTreeMap::new(),
        }
    }

    pub fn as_map_list_string(&self) -> BTreeMap<String, Vec<String>> {
        match self {
            Self::MapListString(m) => m.clone(),
            _ => BTreeMap::new(),
        }
    }

    pub fn as_map_nested_string(&self) -> BTreeMap<String, BTreeMap<String, String>> {
        match self {
            Self::MapNestedString(m) => m.clone(),
            _ => BTreeMap::new(),
        }
    }

    pub fn as_map_bytes(&self) -> BTreeMap<String, Vec<u8>> {
        match self {
            Self::MapBytes(m) => m.clone(),
            _ => BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors_return_zero_value_on_shape_mismatch() {
        let data = FactData::String("hello".into());
        assert!(data.as_map_string().is_empty());
        assert!(data.as_list().is_empty());
        assert_eq!(data.as_string(), "hello");
        assert!(FactData::Nil.as_bytes().is_empty());
    }

    #[test]
    fn zero_matches_format() {
        for format in [
            Format::Raw,
            Format::String,
            Format::List,
            Format::MapString,
            Format::MapListString,
            Format::MapNestedString,
            Format::MapBytes,
            Format::Nil,
        ] {
            let zero = FactData::zero(format);
            assert_eq!(zero.format(), format);
            assert!(zero.is_empty());
        }
    }

    #[test]
    fn format_names_round_trip_through_yaml() {
        let format: Format = serde_yaml::from_str("map-nested-string").unwrap();
        assert_eq!(format, Format::MapNestedString);
        assert_eq!(format.to_string(), "map-nested-string");
    }
}
