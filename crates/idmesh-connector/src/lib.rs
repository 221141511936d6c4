//! # Connector Framework
//!
//! Core abstractions for resolving identity objects out of external
//! directories.
//!
//! This crate defines the value types and collaborator traits shared by the
//! concrete resolution engines:
//!
//! - [`session::DirectorySession`] - abstract search/read/modify capability
//! - [`session::SchemaMapping`] - attribute visibility and name translation
//! - [`operation`] - `Uid`, `AttributeValue`, `AttributeSet`, `ResolvedObject`
//! - [`error`] - error taxonomy with transient/permanent classification
//!
//! Connection establishment, pooling, credentials, and transport security
//! all live behind the `DirectorySession` implementation; nothing in this
//! crate touches the wire.

pub mod error;
pub mod operation;
pub mod session;

/// Prelude module for convenient imports.
///
/// ```
/// use idmesh_connector::prelude::*;
/// ```
pub mod prelude {
    pub use crate::error::{ConnectorError, ConnectorResult};
    pub use crate::operation::{AttributeSet, AttributeValue, ResolvedObject, Uid};
    pub use crate::session::{
        DirectoryEntry, DirectorySession, ModifyOperation, SchemaMapping, SearchScope,
    };
}

// Re-export async_trait for session implementors
pub use async_trait::async_trait;

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[test]
    fn prelude_imports_are_usable() {
        let _uid = Uid::from_dn("cn=test,dc=example,dc=com");
        let _attrs = AttributeSet::new().with("name", "test");
        let _scope = SearchScope::Subtree;
        let _op = ModifyOperation::Replace;
        let _err: ConnectorError = ConnectorError::not_found("x");
    }
}
