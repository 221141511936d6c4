//! Directory collaborator traits
//!
//! Capability traits the resolution engine consumes. The engine never speaks
//! the directory wire protocol itself; a `DirectorySession` implementation
//! owns connections, timeouts, and retry policy, and a `SchemaMapping`
//! implementation owns attribute visibility and name translation.

use async_trait::async_trait;

use crate::error::ConnectorResult;
use crate::operation::{AttributeSet, AttributeValue};

/// Search scope for directory searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    /// The base entry only.
    Base,
    /// Immediate children of the base entry.
    OneLevel,
    /// The base entry and its whole subtree.
    Subtree,
}

/// Modification applied to a single attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModifyOperation {
    /// Add value(s) to the attribute.
    Add,
    /// Remove value(s) from the attribute.
    Remove,
    /// Replace the attribute's values entirely.
    Replace,
}

/// A single entry returned from a directory search.
#[derive(Debug, Clone)]
pub struct DirectoryEntry {
    /// The entry's distinguished name.
    pub dn: String,
    /// The returned attributes.
    pub attributes: AttributeSet,
}

impl DirectoryEntry {
    /// Create a new directory entry.
    pub fn new(dn: impl Into<String>, attributes: AttributeSet) -> Self {
        Self {
            dn: dn.into(),
            attributes,
        }
    }
}

/// An open session against a directory server.
///
/// Implementations are expected to be cheap to share (`&self` methods) and to
/// enforce their own per-call timeout. Blocking happens per round trip; the
/// engine never parallelizes calls against the same attribute.
#[async_trait]
pub trait DirectorySession: Send + Sync {
    /// Search under a base context with an LDAP filter string.
    async fn search(
        &self,
        base_context: &str,
        filter: &str,
        scope: SearchScope,
    ) -> ConnectorResult<Vec<DirectoryEntry>>;

    /// Read selected attributes of a single entry.
    ///
    /// `address` is either a distinguished name or an identifier-style
    /// address the server understands (e.g. `<GUID=...>` on Active
    /// Directory). Attribute names may carry range qualifiers
    /// (`member;range=0-999`).
    async fn read_attributes(
        &self,
        address: &str,
        attributes: &[String],
    ) -> ConnectorResult<AttributeSet>;

    /// Apply a single attribute modification to an entry.
    async fn modify_attribute(
        &self,
        dn: &str,
        operation: ModifyOperation,
        name: &str,
        value: AttributeValue,
    ) -> ConnectorResult<()>;
}

/// Schema knowledge injected into the engine.
///
/// Owns attribute visibility per object class, default attribute sets, and
/// the construction of typed attribute values from raw entries. Implementors
/// may cache discovered schema; the engine treats this as read-only.
pub trait SchemaMapping: Send + Sync {
    /// Whether an attribute is readable for the given object class.
    fn is_readable(&self, object_class: &str, attribute: &str) -> bool;

    /// The attributes the directory declares as returned-by-default for the
    /// given object class.
    fn default_attribute_names(&self, object_class: &str) -> Vec<String>;

    /// The attribute designated as the unique identifier for the class.
    fn uid_attribute_name(&self, object_class: &str) -> String;

    /// The attribute designated as the entry name for the class.
    fn name_attribute_name(&self, object_class: &str) -> String;

    /// Build a typed attribute value from a raw entry, or `None` when the
    /// entry does not carry the attribute.
    fn build_attribute(
        &self,
        object_class: &str,
        attribute: &str,
        entry: &AttributeSet,
    ) -> Option<AttributeValue>;
}
