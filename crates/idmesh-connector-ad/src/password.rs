//! Change-password policy round trips.
//!
//! Reads and rewrites the "user cannot change password" flag against a live
//! entry. The descriptor is fetched, edited in place, and written back with
//! a single replace so unrelated ACEs survive untouched.

use idmesh_connector::error::{ConnectorError, ConnectorResult};
use idmesh_connector::operation::AttributeValue;
use idmesh_connector::session::{DirectorySession, ModifyOperation};
use tracing::{info, instrument};

use crate::attributes::ATTR_SECURITY_DESCRIPTOR;
use crate::sddl;

/// Read the "user cannot change password" flag of an entry.
pub async fn user_cannot_change_password(
    session: &dyn DirectorySession,
    dn: &str,
) -> ConnectorResult<bool> {
    let descriptor = read_descriptor(session, dn).await?;
    sddl::user_cannot_change_password(&descriptor)
}

/// Rewrite an entry's security descriptor with the flag set to `cannot`.
#[instrument(skip(session))]
pub async fn set_user_cannot_change_password(
    session: &dyn DirectorySession,
    dn: &str,
    cannot: bool,
) -> ConnectorResult<()> {
    let descriptor = read_descriptor(session, dn).await?;
    let updated = sddl::set_user_cannot_change_password(&descriptor, cannot)?;

    session
        .modify_attribute(
            dn,
            ModifyOperation::Replace,
            ATTR_SECURITY_DESCRIPTOR,
            AttributeValue::Binary(updated),
        )
        .await?;

    info!(cannot, "change-password flag rewritten");
    Ok(())
}

async fn read_descriptor(session: &dyn DirectorySession, dn: &str) -> ConnectorResult<Vec<u8>> {
    let wanted = [ATTR_SECURITY_DESCRIPTOR.to_string()];
    let entry = session.read_attributes(dn, &wanted).await?;
    entry
        .get_binary(ATTR_SECURITY_DESCRIPTOR)
        .map(<[u8]>::to_vec)
        .ok_or_else(|| {
            ConnectorError::attribute_unsupported(
                ATTR_SECURITY_DESCRIPTOR,
                format!("entry {dn} returned no security descriptor"),
            )
        })
}
