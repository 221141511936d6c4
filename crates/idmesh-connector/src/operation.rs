//! Operation value types
//!
//! Value types exchanged with directory sessions: unique identifiers,
//! attribute values and sets, and the resolved object handed back to callers.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Unique identifier for an object in a target directory.
///
/// Different deployments identify entries differently: an immutable entry
/// GUID, an entryUUID, or the distinguished name itself. The attribute name
/// travels with the value so callers can reconstruct lookups.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Uid {
    /// The attribute name used as the identifier (e.g., "objectGUID", "dn").
    attribute_name: String,
    /// The identifier value.
    value: String,
}

impl Uid {
    /// Create a new UID with the given attribute name and value.
    pub fn new(attribute_name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            attribute_name: attribute_name.into(),
            value: value.into(),
        }
    }

    /// Create a UID from a distinguished name.
    pub fn from_dn(dn: impl Into<String>) -> Self {
        Self::new("dn", dn)
    }

    /// Get the attribute name.
    pub fn attribute_name(&self) -> &str {
        &self.attribute_name
    }

    /// Get the value.
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl std::fmt::Display for Uid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={}", self.attribute_name, self.value)
    }
}

/// A value for a directory attribute, single or multi-valued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// No value (null).
    Null,
    /// A single string value.
    String(String),
    /// A single integer value.
    Integer(i64),
    /// A single boolean value.
    Boolean(bool),
    /// Binary data (base64 encoded in JSON).
    Binary(Vec<u8>),
    /// Multiple values.
    Array(Vec<AttributeValue>),
}

impl AttributeValue {
    /// Check if this is a null value.
    pub fn is_null(&self) -> bool {
        matches!(self, AttributeValue::Null)
    }

    /// Get as a string if this is a single string value.
    pub fn as_string(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get the first string value, whether single or multi-valued.
    pub fn first_string(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            AttributeValue::Array(arr) => arr.iter().find_map(|v| v.as_string()),
            _ => None,
        }
    }

    /// Get as strings (works for both single and multi-valued).
    pub fn as_strings(&self) -> Vec<&str> {
        match self {
            AttributeValue::String(s) => vec![s.as_str()],
            AttributeValue::Array(arr) => arr.iter().filter_map(|v| v.as_string()).collect(),
            _ => vec![],
        }
    }

    /// Get as an integer if this is an integer value.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            AttributeValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as a boolean if this is a boolean value.
    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            AttributeValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as raw bytes if this is a binary value.
    pub fn as_binary(&self) -> Option<&[u8]> {
        match self {
            AttributeValue::Binary(b) => Some(b),
            _ => None,
        }
    }

    /// Get as an array if this is multi-valued.
    pub fn as_array(&self) -> Option<&Vec<AttributeValue>> {
        match self {
            AttributeValue::Array(arr) => Some(arr),
            _ => None,
        }
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::String(s)
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::String(s.to_string())
    }
}

impl From<i64> for AttributeValue {
    fn from(i: i64) -> Self {
        AttributeValue::Integer(i)
    }
}

impl From<i32> for AttributeValue {
    fn from(i: i32) -> Self {
        AttributeValue::Integer(i64::from(i))
    }
}

impl From<bool> for AttributeValue {
    fn from(b: bool) -> Self {
        AttributeValue::Boolean(b)
    }
}

impl From<Vec<u8>> for AttributeValue {
    fn from(bytes: Vec<u8>) -> Self {
        AttributeValue::Binary(bytes)
    }
}

impl From<Vec<String>> for AttributeValue {
    fn from(values: Vec<String>) -> Self {
        AttributeValue::Array(values.into_iter().map(AttributeValue::String).collect())
    }
}

/// A set of attributes, as returned by a directory read or search.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AttributeSet {
    /// Map of attribute name to attribute value(s).
    #[serde(flatten)]
    attributes: HashMap<String, AttributeValue>,
}

impl AttributeSet {
    /// Create a new empty attribute set.
    pub fn new() -> Self {
        Self {
            attributes: HashMap::new(),
        }
    }

    /// Set an attribute value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<AttributeValue>) {
        self.attributes.insert(name.into(), value.into());
    }

    /// Set an attribute using builder pattern.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.set(name, value);
        self
    }

    /// Get an attribute value by exact name.
    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    /// Get an attribute value by case-insensitive name.
    ///
    /// Directory attribute names are case-insensitive; servers echo whatever
    /// casing they store, so lookups must not depend on it.
    pub fn get_ignore_case(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    /// Get a single-valued string attribute.
    pub fn get_string(&self, name: &str) -> Option<&str> {
        self.get_ignore_case(name).and_then(|v| v.first_string())
    }

    /// Get a multi-valued string attribute.
    pub fn get_strings(&self, name: &str) -> Vec<&str> {
        self.get_ignore_case(name)
            .map(|v| v.as_strings())
            .unwrap_or_default()
    }

    /// Get a binary attribute.
    pub fn get_binary(&self, name: &str) -> Option<&[u8]> {
        self.get_ignore_case(name).and_then(|v| v.as_binary())
    }

    /// Check if an attribute exists (case-insensitive).
    pub fn has(&self, name: &str) -> bool {
        self.get_ignore_case(name).is_some()
    }

    /// Remove an attribute by exact name.
    pub fn remove(&mut self, name: &str) -> Option<AttributeValue> {
        self.attributes.remove(name)
    }

    /// Get all attribute names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.attributes.keys().map(|s| s.as_str())
    }

    /// Get the number of attributes.
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Check if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Iterate over all attributes.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &AttributeValue)> {
        self.attributes.iter()
    }
}

impl FromIterator<(String, AttributeValue)> for AttributeSet {
    fn from_iter<T: IntoIterator<Item = (String, AttributeValue)>>(iter: T) -> Self {
        Self {
            attributes: iter.into_iter().collect(),
        }
    }
}

/// A fully resolved directory object handed back to callers.
///
/// The unique identifier and name are always present, even when the caller
/// did not request the underlying attributes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedObject {
    /// Object class tag ("user", "group", "organizationalUnit", ...).
    pub object_class: String,
    /// Unique identifier in the target directory.
    pub uid: Uid,
    /// The entry's name (usually its distinguished name).
    pub name: String,
    /// Resolved attribute values.
    pub attributes: AttributeSet,
}

impl ResolvedObject {
    /// Create a new resolved object with empty attributes.
    pub fn new(object_class: impl Into<String>, uid: Uid, name: impl Into<String>) -> Self {
        Self {
            object_class: object_class.into(),
            uid,
            name: name.into(),
            attributes: AttributeSet::new(),
        }
    }

    /// Attach an attribute value.
    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<AttributeValue>) {
        self.attributes.set(name, value);
    }

    /// Get a resolved attribute.
    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get_ignore_case(name)
    }
}
