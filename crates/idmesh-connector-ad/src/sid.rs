//! Binary security identifier (SID) codec.
//!
//! Active Directory stores `objectSID` as a packed binary structure:
//! revision byte, sub-authority count byte, a 6-byte big-endian identifier
//! authority, then `count` little-endian 32-bit sub-authorities. Parsing and
//! serialization round-trip byte-exactly.

use idmesh_connector::error::{ConnectorError, ConnectorResult};

/// Minimum size of a packed SID: revision + count + authority.
const SID_HEADER_LEN: usize = 8;

/// A decoded Windows security identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityIdentifier {
    revision: u8,
    identifier_authority: [u8; 6],
    sub_authorities: Vec<u32>,
}

impl SecurityIdentifier {
    /// Parse a SID from its packed binary form.
    ///
    /// Fails with `MalformedIdentifier` when the byte length is inconsistent
    /// with the declared sub-authority count.
    pub fn parse(bytes: &[u8]) -> ConnectorResult<Self> {
        if bytes.len() < SID_HEADER_LEN {
            return Err(ConnectorError::malformed(format!(
                "SID too short: {} bytes",
                bytes.len()
            )));
        }

        let revision = bytes[0];
        let count = bytes[1] as usize;
        let expected = SID_HEADER_LEN + count * 4;
        if bytes.len() != expected {
            return Err(ConnectorError::malformed(format!(
                "SID length {} does not match sub-authority count {} (expected {})",
                bytes.len(),
                count,
                expected
            )));
        }

        let mut identifier_authority = [0u8; 6];
        identifier_authority.copy_from_slice(&bytes[2..8]);

        let sub_authorities = bytes[8..]
            .chunks_exact(4)
            .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();

        Ok(Self {
            revision,
            identifier_authority,
            sub_authorities,
        })
    }

    /// Serialize back to the packed binary form.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(SID_HEADER_LEN + self.sub_authorities.len() * 4);
        out.push(self.revision);
        out.push(self.sub_authorities.len() as u8);
        out.extend_from_slice(&self.identifier_authority);
        for sub in &self.sub_authorities {
            out.extend_from_slice(&sub.to_le_bytes());
        }
        out
    }

    /// Derive the SID of a principal's primary group.
    ///
    /// The primary group lives in the same domain: same revision and
    /// authority, same sub-authority prefix, with the principal's terminal
    /// relative identifier replaced by the group's.
    pub fn derive_group_sid(&self, primary_group_rid: u32) -> SecurityIdentifier {
        let mut sub_authorities: Vec<u32> = self
            .sub_authorities
            .iter()
            .take(self.sub_authorities.len().saturating_sub(1))
            .copied()
            .collect();
        sub_authorities.push(primary_group_rid);

        SecurityIdentifier {
            revision: self.revision,
            identifier_authority: self.identifier_authority,
            sub_authorities,
        }
    }

    /// The terminal sub-authority (relative identifier), if any.
    pub fn relative_id(&self) -> Option<u32> {
        self.sub_authorities.last().copied()
    }

    /// The revision byte.
    pub fn revision(&self) -> u8 {
        self.revision
    }

    /// The 6-byte identifier authority.
    pub fn identifier_authority(&self) -> &[u8; 6] {
        &self.identifier_authority
    }

    /// The ordered sub-authorities.
    pub fn sub_authorities(&self) -> &[u32] {
        &self.sub_authorities
    }

    /// The packed binary form escaped for use inside an LDAP search filter.
    pub fn to_filter_escaped(&self) -> String {
        hex_escape(&self.to_bytes())
    }
}

impl std::fmt::Display for SecurityIdentifier {
    /// Canonical `S-R-A-S1-S2-...` text form.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let authority = u64::from_be_bytes([
            0,
            0,
            self.identifier_authority[0],
            self.identifier_authority[1],
            self.identifier_authority[2],
            self.identifier_authority[3],
            self.identifier_authority[4],
            self.identifier_authority[5],
        ]);
        write!(f, "S-{}-{}", self.revision, authority)?;
        for sub in &self.sub_authorities {
            write!(f, "-{sub}")?;
        }
        Ok(())
    }
}

/// Escape raw bytes for embedding in an LDAP filter value (`\xx` per byte).
pub(crate) fn hex_escape(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for b in bytes {
        out.push('\\');
        out.push_str(&format!("{b:02x}"));
    }
    out
}
