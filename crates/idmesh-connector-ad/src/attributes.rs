//! Attribute planning
//!
//! Translates the caller's requested attributes into the concrete attribute
//! list sent to the directory. Synthetic attributes are swapped for the raw
//! directory attributes they are computed from, range qualifiers are attached
//! to group member lists, and the identifier/name attributes are always
//! included.

use std::collections::HashMap;

use idmesh_connector::session::SchemaMapping;
use tracing::warn;

use crate::config::AdConfig;

/// Raw directory attribute: binary object GUID.
pub const ATTR_OBJECT_GUID: &str = "objectGUID";
/// Raw directory attribute: binary object SID.
pub const ATTR_OBJECT_SID: &str = "objectSID";
/// Raw directory attribute: RID of the account's primary group.
pub const ATTR_PRIMARY_GROUP_ID: &str = "primaryGroupID";
/// Raw directory attribute: account control bit field.
pub const ATTR_USER_ACCOUNT_CONTROL: &str = "userAccountControl";
/// Raw directory attribute: binary security descriptor.
pub const ATTR_SECURITY_DESCRIPTOR: &str = "nTSecurityDescriptor";
/// Raw directory attribute: common name.
pub const ATTR_CN: &str = "cn";
/// Raw directory attribute: the entry's own distinguished name.
pub const ATTR_DISTINGUISHED_NAME: &str = "distinguishedName";

/// Synthetic attribute: group membership as resolved DNs.
pub const ATTR_LDAP_GROUPS: &str = "ldapGroups";
/// Synthetic attribute: change-password policy flag.
pub const ATTR_USER_CANNOT_CHANGE_PASSWORD: &str = "userCannotChangePassword";
/// Synthetic attribute: DN of the account's primary group.
pub const ATTR_PRIMARY_GROUP_DN: &str = "primaryGroupDN";
/// Synthetic attribute: account enabled state.
pub const ATTR_ENABLED: &str = "enabled";
/// Write-only attribute: never readable from the directory.
pub const ATTR_PASSWORD: &str = "password";

/// A set of attribute names with case-insensitive membership.
///
/// Directory attribute names are case-insensitive; the set preserves the
/// spelling of the first insertion.
#[derive(Debug, Clone, Default)]
pub struct AttributeNameSet {
    by_lower: HashMap<String, String>,
}

impl AttributeNameSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a set from an iterator of names.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = Self::new();
        for name in names {
            set.insert(name);
        }
        set
    }

    /// Insert a name. Returns `false` when an equivalent name was present.
    pub fn insert(&mut self, name: impl Into<String>) -> bool {
        let name = name.into();
        let key = name.to_lowercase();
        if self.by_lower.contains_key(&key) {
            return false;
        }
        self.by_lower.insert(key, name);
        true
    }

    /// Remove a name, ignoring case. Returns the stored spelling.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.by_lower.remove(&name.to_lowercase())
    }

    /// Whether an equivalent name is present, ignoring case.
    pub fn contains(&self, name: &str) -> bool {
        self.by_lower.contains_key(&name.to_lowercase())
    }

    /// Number of names in the set.
    pub fn len(&self) -> usize {
        self.by_lower.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.by_lower.is_empty()
    }

    /// The stored names, sorted for deterministic output.
    pub fn into_sorted_vec(self) -> Vec<String> {
        let mut names: Vec<String> = self.by_lower.into_values().collect();
        names.sort_by(|a, b| a.to_lowercase().cmp(&b.to_lowercase()));
        names
    }
}

/// Whether the object class describes an account.
pub fn is_account_class(object_class: &str) -> bool {
    let lower = object_class.to_lowercase();
    lower == "user" || lower == "account" || lower.contains("person")
}

/// Whether the object class describes a group.
pub fn is_group_class(object_class: &str) -> bool {
    object_class.to_lowercase().contains("group")
}

/// Whether the object class describes an organizational container.
pub fn is_organizational_class(object_class: &str) -> bool {
    object_class.to_lowercase().contains("organization")
}

/// An attribute name carrying a bounded range qualifier.
pub fn range_qualified(attribute: &str, start: u32, end: u32) -> String {
    format!("{attribute};range={start}-{end}")
}

/// An attribute name carrying an open-ended range qualifier.
pub fn range_open(attribute: &str, start: u32) -> String {
    format!("{attribute};range={start}-*")
}

/// Whether the attribute name is owned by the engine rather than the
/// directory schema. These never reach the schema's readability check; the
/// planner translates them to raw attributes itself.
fn is_engine_attribute(name: &str) -> bool {
    [
        ATTR_LDAP_GROUPS,
        ATTR_USER_CANNOT_CHANGE_PASSWORD,
        ATTR_PRIMARY_GROUP_DN,
        ATTR_ENABLED,
        ATTR_PASSWORD,
    ]
    .iter()
    .any(|engine| engine.eq_ignore_ascii_case(name))
}

/// Compute the attribute names to request from the directory.
///
/// When `requested` is empty the schema's returned-by-default set for the
/// class is used. Attributes the schema declares unreadable are dropped;
/// engine-owned names bypass that check.
pub fn attributes_to_get(
    requested: &[String],
    object_class: &str,
    schema: &dyn SchemaMapping,
    config: &AdConfig,
) -> Vec<String> {
    let base: Vec<String> = if requested.is_empty() {
        schema.default_attribute_names(object_class)
    } else {
        requested
            .iter()
            .filter(|attr| {
                if is_engine_attribute(attr) {
                    return true;
                }
                let readable = schema.is_readable(object_class, attr);
                if !readable {
                    warn!(attribute = %attr, %object_class, "dropping unreadable attribute");
                }
                readable
            })
            .cloned()
            .collect()
    };

    let mut set = AttributeNameSet::from_names(base);
    set.insert(schema.uid_attribute_name(object_class));
    set.insert(schema.name_attribute_name(object_class));

    if set.remove(ATTR_PASSWORD).is_some() {
        warn!("password attribute is write-only and cannot be read");
    }

    if is_account_class(object_class) {
        set.insert(ATTR_USER_ACCOUNT_CONTROL);
    }

    if is_group_class(object_class) && set.remove(&config.group_member_attribute).is_some() {
        set.insert(range_qualified(
            &config.group_member_attribute,
            0,
            config.page_size - 1,
        ));
    }

    if set.remove(ATTR_USER_CANNOT_CHANGE_PASSWORD).is_some() {
        set.insert(ATTR_SECURITY_DESCRIPTOR);
    }

    if set.remove(ATTR_LDAP_GROUPS).is_some() {
        set.insert(ATTR_OBJECT_SID);
        set.insert(ATTR_PRIMARY_GROUP_ID);
    }

    if set.remove(ATTR_PRIMARY_GROUP_DN).is_some() {
        set.insert(ATTR_OBJECT_SID);
        set.insert(ATTR_PRIMARY_GROUP_ID);
    }

    if set.remove(ATTR_ENABLED).is_some() && is_account_class(object_class) {
        set.insert(ATTR_USER_ACCOUNT_CONTROL);
    }

    set.into_sorted_vec()
}
