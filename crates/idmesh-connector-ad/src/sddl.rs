//! ntSecurityDescriptor flag codec.
//!
//! The descriptor is treated as an opaque blob except for the single policy
//! flag this engine understands: "user cannot change password". On Active
//! Directory that flag is an ACCESS_DENIED_OBJECT ACE in the DACL carrying
//! the User-Change-Password rights GUID for the Everyone or SELF trustee.
//! Toggling the flag flips only the type byte of the matching ACE(s); every
//! other byte of the descriptor is preserved.

use idmesh_connector::error::{ConnectorError, ConnectorResult};

use crate::sid::SecurityIdentifier;

/// ACE type: ACCESS_ALLOWED_OBJECT_ACE.
const ACE_ALLOWED_OBJECT: u8 = 0x05;
/// ACE type: ACCESS_DENIED_OBJECT_ACE.
const ACE_DENIED_OBJECT: u8 = 0x06;

/// Object-ACE flag: the ObjectType GUID field is present.
const ACE_OBJECT_TYPE_PRESENT: u32 = 0x0000_0001;
/// Object-ACE flag: the InheritedObjectType GUID field is present.
const ACE_INHERITED_OBJECT_TYPE_PRESENT: u32 = 0x0000_0002;

/// User-Change-Password rights GUID ab721a53-1e2f-11d0-9819-00aa0040529b,
/// in the on-wire byte order (first three fields little-endian).
const CHANGE_PASSWORD_GUID: [u8; 16] = [
    0x53, 0x1a, 0x72, 0xab, 0x2f, 0x1e, 0xd0, 0x11, //
    0x98, 0x19, 0x00, 0xaa, 0x00, 0x40, 0x52, 0x9b,
];

/// Trustees the change-password ACE applies to: Everyone and SELF.
const CHANGE_PASSWORD_TRUSTEES: [&str; 2] = ["S-1-1-0", "S-1-5-10"];

/// Decode the "user cannot change password" flag from a raw descriptor.
///
/// Returns `true` when a deny ACE for the change-password right is present.
/// A descriptor without a DACL or without a matching ACE reads as `false`.
pub fn user_cannot_change_password(descriptor: &[u8]) -> ConnectorResult<bool> {
    let offsets = change_password_ace_offsets(descriptor)?;
    Ok(offsets
        .iter()
        .any(|&off| descriptor[off] == ACE_DENIED_OBJECT))
}

/// Re-encode the descriptor with the "user cannot change password" flag set
/// to `cannot`, preserving all unrelated descriptor content.
pub fn set_user_cannot_change_password(
    descriptor: &[u8],
    cannot: bool,
) -> ConnectorResult<Vec<u8>> {
    let offsets = change_password_ace_offsets(descriptor)?;
    let mut out = descriptor.to_vec();
    let ace_type = if cannot {
        ACE_DENIED_OBJECT
    } else {
        ACE_ALLOWED_OBJECT
    };
    for off in offsets {
        out[off] = ace_type;
    }
    Ok(out)
}

/// Locate the type-byte offsets of all change-password ACEs in the DACL.
fn change_password_ace_offsets(descriptor: &[u8]) -> ConnectorResult<Vec<usize>> {
    if descriptor.len() < 20 {
        return Err(ConnectorError::malformed(format!(
            "security descriptor too short: {} bytes",
            descriptor.len()
        )));
    }

    let dacl_offset = read_u32(descriptor, 16)? as usize;
    if dacl_offset == 0 {
        // Self-relative descriptor without a DACL.
        return Ok(Vec::new());
    }
    if dacl_offset + 8 > descriptor.len() {
        return Err(ConnectorError::malformed(
            "DACL offset beyond descriptor end",
        ));
    }

    let ace_count = read_u16(descriptor, dacl_offset + 4)? as usize;
    let mut offsets = Vec::new();
    let mut cursor = dacl_offset + 8;

    for _ in 0..ace_count {
        if cursor + 4 > descriptor.len() {
            return Err(ConnectorError::malformed("truncated ACE header"));
        }
        let ace_type = descriptor[cursor];
        let ace_size = read_u16(descriptor, cursor + 2)? as usize;
        if ace_size < 4 || cursor + ace_size > descriptor.len() {
            return Err(ConnectorError::malformed("inconsistent ACE size"));
        }

        if (ace_type == ACE_ALLOWED_OBJECT || ace_type == ACE_DENIED_OBJECT)
            && is_change_password_ace(&descriptor[cursor..cursor + ace_size])?
        {
            offsets.push(cursor);
        }

        cursor += ace_size;
    }

    Ok(offsets)
}

/// Whether an object ACE carries the change-password GUID for a trustee the
/// flag is defined on.
fn is_change_password_ace(ace: &[u8]) -> ConnectorResult<bool> {
    // type(1) flags(1) size(2) mask(4) object-flags(4)
    if ace.len() < 12 {
        return Ok(false);
    }
    let object_flags = read_u32(ace, 8)?;
    if object_flags & ACE_OBJECT_TYPE_PRESENT == 0 {
        return Ok(false);
    }
    if ace.len() < 28 || ace[12..28] != CHANGE_PASSWORD_GUID {
        return Ok(false);
    }

    let mut sid_offset = 28;
    if object_flags & ACE_INHERITED_OBJECT_TYPE_PRESENT != 0 {
        sid_offset += 16;
    }
    if sid_offset + 8 > ace.len() {
        return Err(ConnectorError::malformed("object ACE truncated before SID"));
    }

    let count = ace[sid_offset + 1] as usize;
    let sid_len = 8 + count * 4;
    if sid_offset + sid_len > ace.len() {
        return Err(ConnectorError::malformed("trustee SID truncated"));
    }

    let trustee = SecurityIdentifier::parse(&ace[sid_offset..sid_offset + sid_len])?;
    Ok(CHANGE_PASSWORD_TRUSTEES.contains(&trustee.to_string().as_str()))
}

fn read_u16(bytes: &[u8], offset: usize) -> ConnectorResult<u16> {
    bytes
        .get(offset..offset + 2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .ok_or_else(|| ConnectorError::malformed("descriptor read out of bounds"))
}

fn read_u32(bytes: &[u8], offset: usize) -> ConnectorResult<u32> {
    bytes
        .get(offset..offset + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| ConnectorError::malformed("descriptor read out of bounds"))
}
