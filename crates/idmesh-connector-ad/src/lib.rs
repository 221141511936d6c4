//! # Active Directory Resolution Engine
//!
//! Directory-attribute resolution and identity resolution for Active
//! Directory, built on the [`idmesh_connector`] framework:
//!
//! - [`sid`] / [`guid`] - binary identifier codecs (`objectSID`, `objectGUID`)
//! - [`sddl`] - the change-password flag inside `nTSecurityDescriptor`
//! - [`attributes`] - planning of the attribute list sent to the directory
//! - [`membership`] - ranged member retrieval and primary-group resolution
//! - [`resolve`] - assembly of raw entries into [`ResolvedObject`]s
//! - [`dn`] - DN construction and three-tier identifier resolution
//! - [`password`] - change-password policy round trips
//!
//! All directory traffic goes through a caller-supplied
//! [`DirectorySession`]; this crate never opens connections itself.
//!
//! [`ResolvedObject`]: idmesh_connector::operation::ResolvedObject
//! [`DirectorySession`]: idmesh_connector::session::DirectorySession

pub mod attributes;
pub mod config;
pub mod dn;
pub mod guid;
pub mod membership;
pub mod password;
pub mod resolve;
pub mod sddl;
pub mod sid;

#[cfg(test)]
pub(crate) mod testing;

pub use config::AdConfig;
pub use resolve::ObjectResolver;
pub use sid::SecurityIdentifier;
