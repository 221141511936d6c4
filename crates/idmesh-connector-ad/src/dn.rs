//! Distinguished name construction and resolution.
//!
//! Builds DNs for new entries (container selection, RDN escaping) and
//! resolves the DN behind an identifier with a three-tier fallback: GUID
//! addressing, a filtered search, then treating the identifier itself as an
//! address.

use idmesh_connector::error::{ConnectorError, ConnectorResult};
use idmesh_connector::operation::Uid;
use idmesh_connector::session::{DirectorySession, SearchScope};
use tracing::{debug, instrument, warn};

use crate::attributes::{
    self, ATTR_DISTINGUISHED_NAME, ATTR_OBJECT_GUID,
};
use crate::config::AdConfig;
use crate::guid;

/// Escape a value for embedding in an LDAP search filter (RFC 4515).
pub fn escape_filter_value(value: &str) -> String {
    value
        .replace('\\', "\\5c")
        .replace('*', "\\2a")
        .replace('(', "\\28")
        .replace(')', "\\29")
        .replace('\0', "\\00")
}

/// Escape a DN attribute value per RFC 4514.
///
/// Always escaped: `, + " \ < > ; =` and NUL. A leading or trailing space
/// and a leading `#` are escaped positionally.
pub fn escape_dn_value(value: &str) -> String {
    if value.is_empty() {
        return String::new();
    }

    let chars: Vec<char> = value.chars().collect();
    let last = chars.len() - 1;
    let mut result = String::with_capacity(value.len() * 2);

    for (i, &ch) in chars.iter().enumerate() {
        match ch {
            ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=' => {
                result.push('\\');
                result.push(ch);
            }
            '\0' => result.push_str("\\00"),
            ' ' if i == 0 || i == last => result.push_str("\\20"),
            '#' if i == 0 => result.push_str("\\23"),
            _ => result.push(ch),
        }
    }

    result
}

/// Whether a string is plausibly a distinguished name.
pub fn is_dn(value: &str) -> bool {
    match value.split(',').next() {
        Some(first) => {
            let mut parts = first.splitn(2, '=');
            match (parts.next(), parts.next()) {
                (Some(attr), Some(_)) => !attr.trim().is_empty(),
                _ => false,
            }
        }
        None => false,
    }
}

/// Compose a child DN from an RDN attribute, a value, and a parent DN.
pub fn build_child_dn(rdn_attribute: &str, value: &str, parent_dn: &str) -> String {
    format!("{}={},{}", rdn_attribute, escape_dn_value(value), parent_dn)
}

/// Build the DN for a new entry of the given class.
///
/// The RDN value is the first non-blank common-name value, falling back to
/// `name`. Organizational classes get an `OU=` RDN, everything else `CN=`.
/// Account classes land in the people container; every other class in the
/// group container.
pub fn build_dn(
    object_class: &str,
    cn_values: &[String],
    name: &str,
    config: &AdConfig,
) -> ConnectorResult<String> {
    let container = if attributes::is_account_class(object_class) {
        config.people_container()
    } else {
        config.group_container()
    };
    let container = container.ok_or_else(|| ConnectorError::InvalidConfiguration {
        message: format!("no container configured for class {object_class}"),
    })?;

    let rdn_attribute = if attributes::is_organizational_class(object_class) {
        "OU"
    } else {
        "CN"
    };

    let rdn_value = cn_values
        .iter()
        .map(String::as_str)
        .find(|v| !v.trim().is_empty())
        .unwrap_or(name);

    Ok(build_child_dn(rdn_attribute, rdn_value, container))
}

/// Resolve the distinguished name behind an identifier.
///
/// Tier 1 reads the entry through `<GUID=...>` addressing when the
/// identifier is an objectGUID. Tier 2 searches every base context for the
/// identifier attribute. Tier 3 treats the identifier value itself as an
/// address. An identifier value that already parses as a DN is returned
/// as-is without touching the directory. Exhausting all three tiers is a
/// hard `EntryNotFound`.
#[instrument(skip_all, fields(uid = %uid))]
pub async fn resolve_dn(
    session: &dyn DirectorySession,
    config: &AdConfig,
    uid: &Uid,
) -> ConnectorResult<String> {
    if is_dn(uid.value()) {
        return Ok(uid.value().to_string());
    }

    let dn_attr = [ATTR_DISTINGUISHED_NAME.to_string()];
    let is_guid = uid
        .attribute_name()
        .eq_ignore_ascii_case(ATTR_OBJECT_GUID);

    if is_guid {
        let address = format!("<GUID={}>", uid.value());
        match session.read_attributes(&address, &dn_attr).await {
            Ok(entry) => {
                if let Some(dn) = entry.get_string(ATTR_DISTINGUISHED_NAME) {
                    return Ok(dn.to_string());
                }
            }
            Err(e) => debug!(error = %e, "GUID-addressed read missed, trying search"),
        }
    }

    let filter_value = if is_guid {
        guid::to_filter_escaped(uid.value())?
    } else {
        escape_filter_value(uid.value())
    };
    let filter = format!("({}={})", uid.attribute_name(), filter_value);

    for base in &config.base_contexts {
        match session.search(base, &filter, SearchScope::Subtree).await {
            Ok(entries) => {
                if let Some(entry) = entries.into_iter().next() {
                    return Ok(entry.dn);
                }
            }
            Err(e) => {
                warn!(base_context = %base, error = %e, "identifier search failed, skipping base");
            }
        }
    }

    match session.read_attributes(uid.value(), &dn_attr).await {
        Ok(entry) => {
            if let Some(dn) = entry.get_string(ATTR_DISTINGUISHED_NAME) {
                return Ok(dn.to_string());
            }
        }
        Err(e) => debug!(error = %e, "direct address read missed"),
    }

    Err(ConnectorError::not_found(uid.value()))
}
