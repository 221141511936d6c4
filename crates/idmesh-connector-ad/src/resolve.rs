//! Object assembly.
//!
//! Turns a raw directory entry into a `ResolvedObject`: binary identifiers
//! become canonical text, the security descriptor becomes the
//! change-password flag, range-qualified member pages are completed and
//! folded under their base name, and the synthetic membership and enabled
//! attributes are filled in.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use idmesh_connector::error::{ConnectorError, ConnectorResult};
use idmesh_connector::operation::{AttributeSet, AttributeValue, ResolvedObject, Uid};
use idmesh_connector::session::{DirectoryEntry, DirectorySession, SchemaMapping};
use tracing::{instrument, warn};

use crate::attributes::{
    self, AttributeNameSet, ATTR_DISTINGUISHED_NAME, ATTR_ENABLED, ATTR_LDAP_GROUPS,
    ATTR_OBJECT_GUID, ATTR_OBJECT_SID, ATTR_PRIMARY_GROUP_DN, ATTR_PRIMARY_GROUP_ID,
    ATTR_SECURITY_DESCRIPTOR, ATTR_USER_ACCOUNT_CONTROL, ATTR_USER_CANNOT_CHANGE_PASSWORD,
};
use crate::config::AdConfig;
use crate::membership;
use crate::sid::SecurityIdentifier;
use crate::{guid, sddl};

/// Account-disabled bit of `userAccountControl`.
const UF_ACCOUNT_DISABLE: i64 = 0x2;

/// Assembles resolved objects from raw directory entries.
pub struct ObjectResolver<'a> {
    session: &'a dyn DirectorySession,
    schema: &'a dyn SchemaMapping,
    config: &'a AdConfig,
}

impl<'a> ObjectResolver<'a> {
    pub fn new(
        session: &'a dyn DirectorySession,
        schema: &'a dyn SchemaMapping,
        config: &'a AdConfig,
    ) -> Self {
        Self {
            session,
            schema,
            config,
        }
    }

    /// Assemble a resolved object from a directory entry.
    ///
    /// `requested` is the caller's original attribute request, before
    /// planning; it decides whether the membership synthetics are emitted.
    /// The identifier and name are always populated.
    #[instrument(skip_all, fields(dn = %entry.dn, %object_class))]
    pub async fn resolve(
        &self,
        entry: &DirectoryEntry,
        object_class: &str,
        requested: &[String],
    ) -> ConnectorResult<ResolvedObject> {
        let uid = self.entry_uid(entry, object_class)?;
        let name = self.entry_name(entry, object_class);
        let requested = AttributeNameSet::from_names(requested.iter().cloned());
        let mut object = ResolvedObject::new(object_class, uid, name);

        for (attr_name, value) in entry.attributes.iter() {
            if let Some(base) = range_base(attr_name) {
                self.fold_ranged(&mut object, entry, &base, attr_name, value)
                    .await?;
                continue;
            }

            if attr_name.eq_ignore_ascii_case(ATTR_OBJECT_GUID) {
                match value.as_binary().map(guid::to_canonical_string) {
                    Some(Ok(canonical)) => object.set_attribute(ATTR_OBJECT_GUID, canonical),
                    _ => warn!(attribute = %attr_name, "undecodable objectGUID value, skipping"),
                }
            } else if attr_name.eq_ignore_ascii_case(ATTR_OBJECT_SID) {
                match value.as_binary().map(SecurityIdentifier::parse) {
                    Some(Ok(sid)) => object.set_attribute(ATTR_OBJECT_SID, sid.to_string()),
                    _ => warn!(attribute = %attr_name, "undecodable objectSID value, skipping"),
                }
            } else if attr_name.eq_ignore_ascii_case(ATTR_SECURITY_DESCRIPTOR) {
                match value.as_binary().map(sddl::user_cannot_change_password) {
                    Some(Ok(cannot)) => {
                        object.set_attribute(ATTR_USER_CANNOT_CHANGE_PASSWORD, cannot);
                    }
                    _ => warn!("undecodable security descriptor, omitting password flag"),
                }
            } else if attr_name.eq_ignore_ascii_case(ATTR_USER_ACCOUNT_CONTROL) {
                if let Some(uac) = integer_value(value) {
                    object.set_attribute(ATTR_USER_ACCOUNT_CONTROL, uac);
                    if attributes::is_account_class(object_class) {
                        object.set_attribute(ATTR_ENABLED, uac % 16 != UF_ACCOUNT_DISABLE);
                    }
                } else {
                    warn!("non-numeric userAccountControl value, skipping");
                }
            } else {
                let built = self
                    .schema
                    .build_attribute(object_class, attr_name, &entry.attributes);
                match built {
                    Some(v) => object.set_attribute(attr_name, displayable(&v)),
                    None => object.set_attribute(attr_name, displayable(value)),
                }
            }
        }

        self.attach_membership(&mut object, entry, &requested).await;

        Ok(object)
    }

    /// Read the attributes an in-place update needs to start from.
    ///
    /// A missing entry is a hard error; updates must not proceed against a
    /// guessed state.
    pub async fn entry_for_update(&self, dn: &str) -> ConnectorResult<AttributeSet> {
        let wanted = [
            ATTR_USER_ACCOUNT_CONTROL.to_string(),
            ATTR_SECURITY_DESCRIPTOR.to_string(),
            ATTR_OBJECT_SID.to_string(),
            ATTR_PRIMARY_GROUP_ID.to_string(),
        ];
        self.session.read_attributes(dn, &wanted).await
    }

    fn entry_uid(&self, entry: &DirectoryEntry, object_class: &str) -> ConnectorResult<Uid> {
        let uid_attr = self.schema.uid_attribute_name(object_class);

        let value = if uid_attr.eq_ignore_ascii_case(ATTR_OBJECT_GUID) {
            entry
                .attributes
                .get_binary(&uid_attr)
                .map(guid::to_canonical_string)
                .transpose()?
        } else {
            entry
                .attributes
                .get_string(&uid_attr)
                .map(str::to_string)
        };

        match value {
            Some(value) => Ok(Uid::new(uid_attr, value)),
            None => Err(ConnectorError::operation_failed(format!(
                "entry {} carries no identifier attribute {}",
                entry.dn, uid_attr
            ))),
        }
    }

    fn entry_name(&self, entry: &DirectoryEntry, object_class: &str) -> String {
        let name_attr = self.schema.name_attribute_name(object_class);
        if name_attr.eq_ignore_ascii_case(ATTR_DISTINGUISHED_NAME) {
            return entry.dn.clone();
        }
        entry
            .attributes
            .get_string(&name_attr)
            .map(str::to_string)
            .unwrap_or_else(|| entry.dn.clone())
    }

    /// Complete a range-qualified attribute and store it under its base name.
    async fn fold_ranged(
        &self,
        object: &mut ResolvedObject,
        entry: &DirectoryEntry,
        base: &str,
        returned_name: &str,
        value: &AttributeValue,
    ) -> ConnectorResult<()> {
        let mut values: Vec<String> = value.as_strings().into_iter().map(String::from).collect();

        if !returned_name.ends_with("-*") {
            let resume_from = returned_name
                .rsplit_once('-')
                .and_then(|(_, end)| end.parse::<u32>().ok())
                .map(|end| end + 1)
                .unwrap_or(values.len() as u32);

            match membership::continue_ranged_values(
                self.session,
                &entry.dn,
                base,
                resume_from,
                self.config.page_size,
            )
            .await
            {
                Ok((rest, _stop)) => values.extend(rest),
                Err(e @ ConnectorError::AttributeUnsupported { .. }) => return Err(e),
                Err(e) => {
                    warn!(attribute = %base, error = %e, "range continuation failed, omitting attribute");
                    return Ok(());
                }
            }
        }

        object.set_attribute(base, AttributeValue::from(values));
        Ok(())
    }

    /// Fill in `ldapGroups` and `primaryGroupDN` when requested, resolving
    /// the primary group at most once.
    async fn attach_membership(
        &self,
        object: &mut ResolvedObject,
        entry: &DirectoryEntry,
        requested: &AttributeNameSet,
    ) {
        let want_groups = requested.contains(ATTR_LDAP_GROUPS);
        let want_primary = requested.contains(ATTR_PRIMARY_GROUP_DN);
        if !want_groups && !want_primary {
            return;
        }

        let primary = match membership::primary_group_dn(self.session, self.config, &entry.attributes)
            .await
        {
            Ok(primary) => primary,
            Err(e) => {
                warn!(error = %e, "primary group resolution failed, omitting membership");
                None
            }
        };

        if want_primary {
            if let Some(dn) = &primary {
                object.set_attribute(ATTR_PRIMARY_GROUP_DN, dn.as_str());
            }
        }

        if want_groups {
            match membership::groups_for_entry(self.session, self.config, &entry.dn).await {
                Ok(mut groups) => {
                    groups.extend(primary);
                    object.set_attribute(
                        ATTR_LDAP_GROUPS,
                        AttributeValue::from(membership::sort_dedup_groups(groups)),
                    );
                }
                Err(e) => {
                    warn!(error = %e, "membership search failed, omitting group attribute");
                }
            }
        }
    }
}

/// The base attribute name of a range-qualified name, if qualified.
fn range_base(attribute: &str) -> Option<String> {
    let (base, qualifier) = attribute.split_once(';')?;
    qualifier
        .to_lowercase()
        .starts_with("range=")
        .then(|| base.to_string())
}

/// Extract an integer from a string-typed or integer-typed value.
fn integer_value(value: &AttributeValue) -> Option<i64> {
    value
        .as_integer()
        .or_else(|| value.first_string().and_then(|s| s.parse().ok()))
}

/// A caller-facing rendition of a raw value: unknown binary becomes base64,
/// everything else passes through.
fn displayable(value: &AttributeValue) -> AttributeValue {
    match value {
        AttributeValue::Binary(bytes) => AttributeValue::String(BASE64.encode(bytes)),
        other => other.clone(),
    }
}
