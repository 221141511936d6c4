//! Group membership retrieval.
//!
//! Covers the three ways membership reaches this engine: ranged retrieval of
//! a group's member list, derivation and lookup of an account's primary
//! group, and the reverse search for the groups an entry belongs to.

use idmesh_connector::error::{ConnectorError, ConnectorResult};
use idmesh_connector::operation::AttributeSet;
use idmesh_connector::session::{DirectorySession, SearchScope};
use tracing::{debug, instrument, warn};

use crate::attributes::{range_open, range_qualified, ATTR_OBJECT_SID, ATTR_PRIMARY_GROUP_ID};
use crate::config::AdConfig;
use crate::dn::escape_filter_value;
use crate::sid::SecurityIdentifier;

/// Hard ceiling on range round trips per attribute. A directory that still
/// pages past this is answering nonsense.
const MAX_RANGE_PAGES: u32 = 10_000;

/// Why a ranged retrieval stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeStop {
    /// The server answered the open range with the complete value list.
    OpenRange,
    /// The server sent the terminal `start-*` marker.
    TerminalMarker,
    /// A window came back without the attribute or without values.
    EmptyPage,
}

/// Fetch every value of a multi-valued attribute using range retrieval.
///
/// The first round trip asks for `attribute;range=0-*`. An answer under the
/// plain name or a `start-*` name is authoritative and complete; an answer
/// under a bounded name is a first page whose values are kept. Bounded or
/// empty answers switch to windowed paging in `page_size` steps until the
/// terminal `start-*` marker or an empty window arrives.
#[instrument(skip_all, fields(%dn, %attribute))]
pub async fn fetch_ranged_values(
    session: &dyn DirectorySession,
    dn: &str,
    attribute: &str,
    page_size: u32,
) -> ConnectorResult<(Vec<String>, RangeStop)> {
    ranged_fetch(session, dn, attribute, page_size, None).await
}

/// Continue a ranged retrieval whose first window was already consumed.
///
/// `start` is the index of the first value still missing. Used when a search
/// result arrives with a bounded `attr;range=0-N` page attached.
#[instrument(skip_all, fields(%dn, %attribute, start))]
pub async fn continue_ranged_values(
    session: &dyn DirectorySession,
    dn: &str,
    attribute: &str,
    start: u32,
    page_size: u32,
) -> ConnectorResult<(Vec<String>, RangeStop)> {
    ranged_fetch(session, dn, attribute, page_size, Some(start)).await
}

async fn ranged_fetch(
    session: &dyn DirectorySession,
    dn: &str,
    attribute: &str,
    page_size: u32,
    resume_from: Option<u32>,
) -> ConnectorResult<(Vec<String>, RangeStop)> {
    let mut values = Vec::new();

    let mut start = match resume_from {
        Some(start) => start,
        None => {
            let open = [range_open(attribute, 0)];
            let entry = session.read_attributes(dn, &open).await?;
            match ranged_attribute(&entry, attribute) {
                Some((name, all_values))
                    if name.eq_ignore_ascii_case(attribute) || name.ends_with("-*") =>
                {
                    debug!(total = all_values.len(), "open range answered in full");
                    return Ok((all_values, RangeStop::OpenRange));
                }
                // A bounded answer is only the first page. Keep it and
                // window onward from the end the server honored.
                Some((name, page_values)) => {
                    let next = match range_end(&name) {
                        Some(end) => end + 1,
                        None => page_values.len() as u32,
                    };
                    debug!(count = page_values.len(), next_start = next, "open range answered bounded");
                    values.extend(page_values);
                    next
                }
                None => 0,
            }
        }
    };

    for page in 0..MAX_RANGE_PAGES {
        let request = [range_qualified(attribute, start, start + page_size - 1)];
        let entry = session.read_attributes(dn, &request).await?;

        let Some((returned_name, page_values)) = ranged_attribute(&entry, attribute) else {
            debug!(page, "window returned no values, stopping");
            return Ok((values, RangeStop::EmptyPage));
        };

        let count = page_values.len();
        values.extend(page_values);

        if returned_name.eq_ignore_ascii_case(attribute) || returned_name.ends_with("-*") {
            debug!(total = values.len(), "terminal range marker observed");
            return Ok((values, RangeStop::TerminalMarker));
        }

        // The next window starts after the end the server actually honored.
        start = match range_end(&returned_name) {
            Some(end) => end + 1,
            None => start + page_size,
        };
        debug!(page, count, next_start = start, "window consumed");
    }

    Err(ConnectorError::attribute_unsupported(
        attribute,
        format!("range retrieval did not terminate within {MAX_RANGE_PAGES} windows"),
    ))
}

/// Find the attribute in `entry` carrying values for `attribute`, either
/// under its plain name or under a range-qualified name.
fn ranged_attribute(entry: &AttributeSet, attribute: &str) -> Option<(String, Vec<String>)> {
    let prefix = format!("{};range=", attribute.to_lowercase());
    for name in entry.names() {
        let lower = name.to_lowercase();
        if lower == attribute.to_lowercase() || lower.starts_with(&prefix) {
            let values: Vec<String> = entry
                .get_strings(name)
                .into_iter()
                .map(String::from)
                .collect();
            if values.is_empty() {
                return None;
            }
            return Some((name.to_string(), values));
        }
    }
    None
}

/// The upper bound encoded in a range-qualified name, if bounded.
fn range_end(returned_name: &str) -> Option<u32> {
    returned_name
        .rsplit_once('-')
        .and_then(|(_, end)| end.parse().ok())
}

/// Resolve the DN of an account's primary group.
///
/// The group's SID is derived from the account's `objectSID` and
/// `primaryGroupID`, then looked up by a filtered search over the group base
/// contexts. Entries without the two source attributes resolve to `None`.
#[instrument(skip(session, config, entry))]
pub async fn primary_group_dn(
    session: &dyn DirectorySession,
    config: &AdConfig,
    entry: &AttributeSet,
) -> ConnectorResult<Option<String>> {
    let Some(sid_bytes) = entry.get_binary(ATTR_OBJECT_SID) else {
        return Ok(None);
    };
    let Some(rid_text) = entry.get_string(ATTR_PRIMARY_GROUP_ID) else {
        return Ok(None);
    };

    let rid: u32 = rid_text.parse().map_err(|_| {
        ConnectorError::malformed(format!("primaryGroupID is not numeric: {rid_text}"))
    })?;
    let group_sid = SecurityIdentifier::parse(sid_bytes)?.derive_group_sid(rid);
    let filter = format!(
        "(&(objectClass=group)({}={}))",
        ATTR_OBJECT_SID,
        group_sid.to_filter_escaped()
    );

    for base in config.effective_group_base_contexts() {
        match session.search(base, &filter, SearchScope::Subtree).await {
            Ok(entries) => {
                if let Some(entry) = entries.into_iter().next() {
                    return Ok(Some(entry.dn));
                }
            }
            Err(e) => {
                warn!(base_context = %base, error = %e, "primary group search failed, skipping base");
            }
        }
    }

    warn!(group_sid = %group_sid, "primary group not found in any base context");
    Ok(None)
}

/// The DNs of all groups naming `dn` as a member.
///
/// Searches every group base context; a failing base is logged and skipped.
/// Case-insensitive de-duplication, sorted output.
#[instrument(skip(session, config))]
pub async fn groups_for_entry(
    session: &dyn DirectorySession,
    config: &AdConfig,
    dn: &str,
) -> ConnectorResult<Vec<String>> {
    let filter = format!(
        "({}={})",
        config.group_member_attribute,
        escape_filter_value(dn)
    );

    let mut groups = Vec::new();
    for base in config.effective_group_base_contexts() {
        match session.search(base, &filter, SearchScope::Subtree).await {
            Ok(entries) => groups.extend(entries.into_iter().map(|e| e.dn)),
            Err(e) => {
                warn!(base_context = %base, error = %e, "membership search failed, skipping base");
            }
        }
    }

    Ok(sort_dedup_groups(groups))
}

/// Case-insensitive sort and de-duplication of group DNs.
pub fn sort_dedup_groups(mut groups: Vec<String>) -> Vec<String> {
    groups.sort_by(|a, b| a.to_lowercase().cmp(&b.to_lowercase()));
    groups.dedup_by(|a, b| a.eq_ignore_ascii_case(b));
    groups
}

/// The terminal relative identifier of a group, read from its `objectSID`.
pub async fn group_rid(session: &dyn DirectorySession, dn: &str) -> ConnectorResult<u32> {
    let attrs = [ATTR_OBJECT_SID.to_string()];
    let entry = session.read_attributes(dn, &attrs).await?;
    let sid_bytes = entry
        .get_binary(ATTR_OBJECT_SID)
        .ok_or_else(|| ConnectorError::not_found(dn))?;
    let sid = SecurityIdentifier::parse(sid_bytes)?;
    sid.relative_id()
        .ok_or_else(|| ConnectorError::malformed(format!("SID of {dn} has no sub-authorities")))
}

/// A filter clause restricting search results to the configured memberships,
/// or `None` when no memberships are configured.
///
/// Matches account entries, so the clauses test the account-side membership
/// attribute (`memberOf`) against each configured group DN.
pub fn membership_search_filter(config: &AdConfig) -> Option<String> {
    let clauses: Vec<String> = config
        .memberships
        .iter()
        .map(|dn| {
            format!(
                "({}={})",
                config.member_of_attribute,
                escape_filter_value(dn)
            )
        })
        .collect();

    match clauses.len() {
        0 => None,
        1 => Some(clauses.into_iter().next().unwrap_or_default()),
        _ => {
            let operator = if config.memberships_in_or { "|" } else { "&" };
            Some(format!("({}{})", operator, clauses.concat()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockSession;
    use idmesh_connector::operation::AttributeValue;
    use idmesh_connector::session::DirectoryEntry;

    const GROUP_DN: &str = "cn=Staff,ou=Groups,dc=example,dc=com";

    fn config() -> AdConfig {
        AdConfig::new(vec!["dc=example,dc=com".to_string()])
    }

    fn members(prefix: &str, count: usize) -> Vec<String> {
        (0..count)
            .map(|i| format!("cn={prefix}{i},dc=example,dc=com"))
            .collect()
    }

    fn page(name: &str, values: Vec<String>) -> AttributeSet {
        AttributeSet::new().with(name, AttributeValue::from(values))
    }

    fn account_sid_bytes() -> Vec<u8> {
        let mut bytes = vec![1u8, 5, 0, 0, 0, 0, 0, 5];
        for sub in [21u32, 11, 22, 33, 1104] {
            bytes.extend_from_slice(&sub.to_le_bytes());
        }
        bytes
    }

    fn group_sid_filter(rid: u32) -> String {
        let account = SecurityIdentifier::parse(&account_sid_bytes()).unwrap();
        format!(
            "(&(objectClass=group)(objectSID={}))",
            account.derive_group_sid(rid).to_filter_escaped()
        )
    }

    #[tokio::test]
    async fn open_range_short_circuits() {
        let session = MockSession::new();
        session.queue_read(GROUP_DN, page("member;range=0-*", members("m", 12)));

        let (values, stop) = fetch_ranged_values(&session, GROUP_DN, "member", 1000)
            .await
            .expect("open range");
        assert_eq!(values.len(), 12);
        assert_eq!(stop, RangeStop::OpenRange);
        assert_eq!(session.read_count(), 1, "no windowed requests after open range");
    }

    #[tokio::test]
    async fn plain_attribute_name_also_short_circuits() {
        let session = MockSession::new();
        session.queue_read(GROUP_DN, page("member", members("m", 3)));

        let (values, stop) = fetch_ranged_values(&session, GROUP_DN, "member", 1000)
            .await
            .expect("open range");
        assert_eq!(values.len(), 3);
        assert_eq!(stop, RangeStop::OpenRange);
    }

    #[tokio::test]
    async fn bounded_answer_to_open_range_is_continued() {
        let session = MockSession::new();
        // The server caps the open request at three values; the rest must
        // still be fetched.
        session.queue_read(GROUP_DN, page("member;range=0-2", members("a", 3)));
        session.queue_read(GROUP_DN, page("member;range=3-*", members("b", 2)));

        let (values, stop) = fetch_ranged_values(&session, GROUP_DN, "member", 1000)
            .await
            .expect("bounded open answer");
        assert_eq!(values.len(), 5);
        assert_eq!(stop, RangeStop::TerminalMarker);
        assert_eq!(session.read_count(), 2);

        let log = session.read_log.lock().unwrap();
        assert_eq!(log[1].1, vec!["member;range=3-1002".to_string()]);
    }

    #[tokio::test]
    async fn windows_until_terminal_marker() {
        let session = MockSession::new();
        // Open range refused, then four bounded windows.
        session.queue_read(GROUP_DN, AttributeSet::new());
        session.queue_read(GROUP_DN, page("member;range=0-999", members("a", 1000)));
        session.queue_read(GROUP_DN, page("member;range=1000-1999", members("b", 1000)));
        session.queue_read(GROUP_DN, page("member;range=2000-2999", members("c", 1000)));
        session.queue_read(GROUP_DN, page("member;range=3000-*", members("d", 400)));

        let (values, stop) = fetch_ranged_values(&session, GROUP_DN, "member", 1000)
            .await
            .expect("windowed retrieval");
        assert_eq!(values.len(), 3400);
        assert_eq!(stop, RangeStop::TerminalMarker);
        assert_eq!(session.read_count(), 5);

        let log = session.read_log.lock().unwrap();
        assert_eq!(log[0].1, vec!["member;range=0-*".to_string()]);
        assert_eq!(log[1].1, vec!["member;range=0-999".to_string()]);
        assert_eq!(log[2].1, vec!["member;range=1000-1999".to_string()]);
        assert_eq!(log[4].1, vec!["member;range=3000-3999".to_string()]);
    }

    #[tokio::test]
    async fn continuation_resumes_mid_range() {
        let session = MockSession::new();
        session.queue_read(GROUP_DN, page("member;range=1500-2499", members("b", 1000)));
        session.queue_read(GROUP_DN, page("member;range=2500-*", members("c", 10)));

        let (values, stop) = continue_ranged_values(&session, GROUP_DN, "member", 1500, 1000)
            .await
            .expect("continuation");
        assert_eq!(values.len(), 1010);
        assert_eq!(stop, RangeStop::TerminalMarker);

        let log = session.read_log.lock().unwrap();
        assert_eq!(log[0].1, vec!["member;range=1500-2499".to_string()]);
    }

    #[tokio::test]
    async fn empty_window_stops_retrieval() {
        let session = MockSession::new();
        session.queue_read(GROUP_DN, AttributeSet::new());
        session.queue_read(GROUP_DN, page("member;range=0-999", members("a", 1000)));
        session.queue_read(GROUP_DN, AttributeSet::new());

        let (values, stop) = fetch_ranged_values(&session, GROUP_DN, "member", 1000)
            .await
            .expect("empty window stop");
        assert_eq!(values.len(), 1000);
        assert_eq!(stop, RangeStop::EmptyPage);
    }

    #[tokio::test]
    async fn read_failure_propagates() {
        let session = MockSession::new();
        session.queue_read(GROUP_DN, AttributeSet::new());
        session.queue_read(GROUP_DN, page("member;range=0-999", members("a", 1000)));
        session.queue_read_error(GROUP_DN, ConnectorError::unavailable("server gone"));

        let err = fetch_ranged_values(&session, GROUP_DN, "member", 1000)
            .await
            .expect_err("mid-retrieval failure");
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn primary_group_is_derived_and_searched() {
        let session = MockSession::new();
        session.set_search(
            "dc=example,dc=com",
            group_sid_filter(513),
            vec![DirectoryEntry::new(
                "cn=Domain Users,dc=example,dc=com",
                AttributeSet::new(),
            )],
        );

        let entry = AttributeSet::new()
            .with(ATTR_OBJECT_SID, AttributeValue::Binary(account_sid_bytes()))
            .with(ATTR_PRIMARY_GROUP_ID, "513");

        let dn = primary_group_dn(&session, &config(), &entry)
            .await
            .expect("resolvable");
        assert_eq!(dn.as_deref(), Some("cn=Domain Users,dc=example,dc=com"));
    }

    #[tokio::test]
    async fn missing_source_attributes_resolve_to_none() {
        let session = MockSession::new();
        let entry = AttributeSet::new().with(ATTR_PRIMARY_GROUP_ID, "513");

        let dn = primary_group_dn(&session, &config(), &entry)
            .await
            .expect("no SID means no group");
        assert_eq!(dn, None);
        assert_eq!(session.search_count(), 0);
    }

    #[tokio::test]
    async fn unmatched_group_resolves_to_none() {
        let session = MockSession::new();
        let entry = AttributeSet::new()
            .with(ATTR_OBJECT_SID, AttributeValue::Binary(account_sid_bytes()))
            .with(ATTR_PRIMARY_GROUP_ID, "9999");

        let dn = primary_group_dn(&session, &config(), &entry)
            .await
            .expect("absence is not an error");
        assert_eq!(dn, None);
    }

    #[tokio::test]
    async fn non_numeric_rid_is_malformed() {
        let session = MockSession::new();
        let entry = AttributeSet::new()
            .with(ATTR_OBJECT_SID, AttributeValue::Binary(account_sid_bytes()))
            .with(ATTR_PRIMARY_GROUP_ID, "abc");

        let err = primary_group_dn(&session, &config(), &entry)
            .await
            .expect_err("must fail");
        assert_eq!(err.error_code(), "MALFORMED_IDENTIFIER");
    }

    #[tokio::test]
    async fn groups_are_searched_per_base_context() {
        let config = config().with_group_base_contexts(vec![
            "ou=GroupsA,dc=example,dc=com".to_string(),
            "ou=GroupsB,dc=example,dc=com".to_string(),
        ]);
        let session = MockSession::new();
        let filter = "(member=cn=John,dc=example,dc=com)";
        session.set_search(
            "ou=GroupsA,dc=example,dc=com",
            filter,
            vec![
                DirectoryEntry::new("cn=Staff,ou=GroupsA,dc=example,dc=com", AttributeSet::new()),
                DirectoryEntry::new("cn=staff,ou=groupsa,dc=example,dc=com", AttributeSet::new()),
            ],
        );
        session.set_search(
            "ou=GroupsB,dc=example,dc=com",
            filter,
            vec![DirectoryEntry::new(
                "cn=Admins,ou=GroupsB,dc=example,dc=com",
                AttributeSet::new(),
            )],
        );

        let groups = groups_for_entry(&session, &config, "cn=John,dc=example,dc=com")
            .await
            .expect("searchable");
        // Case-insensitive duplicate collapses, output is sorted.
        assert_eq!(
            groups,
            vec![
                "cn=Admins,ou=GroupsB,dc=example,dc=com".to_string(),
                "cn=Staff,ou=GroupsA,dc=example,dc=com".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn failing_group_base_is_skipped() {
        let config = config().with_group_base_contexts(vec![
            "ou=Broken,dc=example,dc=com".to_string(),
            "ou=Groups,dc=example,dc=com".to_string(),
        ]);
        let session = MockSession::new();
        session.fail_search_base("ou=Broken,dc=example,dc=com");
        session.set_search(
            "ou=Groups,dc=example,dc=com",
            "(member=cn=John,dc=example,dc=com)",
            vec![DirectoryEntry::new(
                "cn=Staff,ou=Groups,dc=example,dc=com",
                AttributeSet::new(),
            )],
        );

        let groups = groups_for_entry(&session, &config, "cn=John,dc=example,dc=com")
            .await
            .expect("partial result");
        assert_eq!(groups, vec!["cn=Staff,ou=Groups,dc=example,dc=com".to_string()]);
    }

    #[tokio::test]
    async fn group_rid_reads_terminal_sub_authority() {
        let session = MockSession::new();
        let group = SecurityIdentifier::parse(&account_sid_bytes())
            .unwrap()
            .derive_group_sid(513);
        session.queue_read(
            GROUP_DN,
            AttributeSet::new().with(ATTR_OBJECT_SID, AttributeValue::Binary(group.to_bytes())),
        );

        let rid = group_rid(&session, GROUP_DN).await.expect("has SID");
        assert_eq!(rid, 513);
    }

    #[test]
    fn membership_filter_combinators() {
        let mut config = config().with_memberships(vec![
            "cn=A,dc=example,dc=com".to_string(),
            "cn=B,dc=example,dc=com".to_string(),
        ]);
        assert_eq!(
            membership_search_filter(&config).as_deref(),
            Some("(&(memberOf=cn=A,dc=example,dc=com)(memberOf=cn=B,dc=example,dc=com))")
        );

        config.memberships_in_or = true;
        assert_eq!(
            membership_search_filter(&config).as_deref(),
            Some("(|(memberOf=cn=A,dc=example,dc=com)(memberOf=cn=B,dc=example,dc=com))")
        );

        config.memberships = vec!["cn=A,dc=example,dc=com".to_string()];
        assert_eq!(
            membership_search_filter(&config).as_deref(),
            Some("(memberOf=cn=A,dc=example,dc=com)")
        );

        config.memberships.clear();
        assert_eq!(membership_search_filter(&config), None);
    }

    #[test]
    fn membership_filter_uses_the_account_side_attribute() {
        let mut config = config().with_memberships(vec!["cn=A,dc=example,dc=com".to_string()]);
        config.group_member_attribute = "uniqueMember".to_string();
        config.member_of_attribute = "isMemberOf".to_string();

        assert_eq!(
            membership_search_filter(&config).as_deref(),
            Some("(isMemberOf=cn=A,dc=example,dc=com)")
        );
    }
}
