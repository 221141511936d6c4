//! Active Directory resolution configuration
//!
//! Settings consumed by the attribute planner, the membership helpers, and
//! the DN builder. Connection parameters live with the `DirectorySession`
//! implementation, not here.

use idmesh_connector::error::{ConnectorError, ConnectorResult};
use serde::{Deserialize, Serialize};

/// Configuration for Active Directory object resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdConfig {
    /// Base contexts searched for entries (e.g. `dc=example,dc=com`).
    pub base_contexts: Vec<String>,

    /// Base contexts searched when resolving groups. Falls back to
    /// `base_contexts` when empty.
    #[serde(default)]
    pub group_base_contexts: Vec<String>,

    /// Container DN for newly built person entries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_people_container: Option<String>,

    /// Container DN for newly built group entries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_group_container: Option<String>,

    /// Multi-valued attribute holding group members.
    #[serde(default = "default_group_member_attribute")]
    pub group_member_attribute: String,

    /// Attribute on account entries naming the groups they belong to.
    #[serde(default = "default_member_of_attribute")]
    pub member_of_attribute: String,

    /// Window size for ranged attribute retrieval.
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Group DNs an account must belong to for membership-scoped searches.
    #[serde(default)]
    pub memberships: Vec<String>,

    /// Combine configured memberships with OR (any group) instead of AND.
    #[serde(default)]
    pub memberships_in_or: bool,
}

fn default_group_member_attribute() -> String {
    "member".to_string()
}

fn default_member_of_attribute() -> String {
    "memberOf".to_string()
}

fn default_page_size() -> u32 {
    1000
}

impl AdConfig {
    /// Create a config for the given base contexts.
    pub fn new(base_contexts: Vec<String>) -> Self {
        Self {
            base_contexts,
            group_base_contexts: Vec::new(),
            default_people_container: None,
            default_group_container: None,
            group_member_attribute: default_group_member_attribute(),
            member_of_attribute: default_member_of_attribute(),
            page_size: default_page_size(),
            memberships: Vec::new(),
            memberships_in_or: false,
        }
    }

    /// Set the default people container.
    pub fn with_people_container(mut self, container: impl Into<String>) -> Self {
        self.default_people_container = Some(container.into());
        self
    }

    /// Set the default group container.
    pub fn with_group_container(mut self, container: impl Into<String>) -> Self {
        self.default_group_container = Some(container.into());
        self
    }

    /// Set the group base contexts.
    pub fn with_group_base_contexts(mut self, contexts: Vec<String>) -> Self {
        self.group_base_contexts = contexts;
        self
    }

    /// Set the configured memberships.
    pub fn with_memberships(mut self, memberships: Vec<String>) -> Self {
        self.memberships = memberships;
        self
    }

    /// The base contexts used for group searches.
    #[must_use]
    pub fn effective_group_base_contexts(&self) -> &[String] {
        if self.group_base_contexts.is_empty() {
            &self.base_contexts
        } else {
            &self.group_base_contexts
        }
    }

    /// The container for a new person entry, falling back to the first base
    /// context.
    #[must_use]
    pub fn people_container(&self) -> Option<&str> {
        self.default_people_container
            .as_deref()
            .or_else(|| self.base_contexts.first().map(String::as_str))
    }

    /// The container for a new group entry, falling back to the first base
    /// context.
    #[must_use]
    pub fn group_container(&self) -> Option<&str> {
        self.default_group_container
            .as_deref()
            .or_else(|| self.base_contexts.first().map(String::as_str))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> ConnectorResult<()> {
        if self.base_contexts.is_empty() {
            return Err(ConnectorError::InvalidConfiguration {
                message: "at least one base context is required".to_string(),
            });
        }
        if self.base_contexts.iter().any(|c| c.trim().is_empty()) {
            return Err(ConnectorError::InvalidConfiguration {
                message: "base contexts must not be blank".to_string(),
            });
        }
        if self.group_member_attribute.trim().is_empty() {
            return Err(ConnectorError::InvalidConfiguration {
                message: "group member attribute must not be blank".to_string(),
            });
        }
        if self.member_of_attribute.trim().is_empty() {
            return Err(ConnectorError::InvalidConfiguration {
                message: "member-of attribute must not be blank".to_string(),
            });
        }
        if self.page_size == 0 {
            return Err(ConnectorError::InvalidConfiguration {
                message: "page size must be positive".to_string(),
            });
        }
        Ok(())
    }
}
