//! objectGUID codec.
//!
//! Active Directory returns `objectGUID` as 16 raw bytes with the first
//! three fields little-endian. Two textual forms exist: the hyphenated
//! canonical form used as the external identifier, and the `\xx`-escaped
//! byte form used inside search filters and `<GUID=...>` addressing.

use idmesh_connector::error::{ConnectorError, ConnectorResult};
use uuid::Uuid;

use crate::sid::hex_escape;

/// Decode the raw 16-byte directory value into the canonical hyphenated form.
pub fn to_canonical_string(bytes: &[u8]) -> ConnectorResult<String> {
    let raw: [u8; 16] = bytes.try_into().map_err(|_| {
        ConnectorError::malformed(format!("objectGUID must be 16 bytes, got {}", bytes.len()))
    })?;
    Ok(Uuid::from_bytes_le(raw).to_string())
}

/// Encode a canonical hyphenated GUID back into the raw directory bytes.
pub fn to_bytes(canonical: &str) -> ConnectorResult<[u8; 16]> {
    let uuid = Uuid::parse_str(canonical)
        .map_err(|e| ConnectorError::malformed(format!("invalid GUID '{canonical}': {e}")))?;
    Ok(uuid.to_bytes_le())
}

/// The raw byte form of a canonical GUID, escaped for an LDAP filter.
pub fn to_filter_escaped(canonical: &str) -> ConnectorResult<String> {
    Ok(hex_escape(&to_bytes(canonical)?))
}
