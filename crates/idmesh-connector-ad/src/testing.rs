//! In-memory directory doubles for tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use idmesh_connector::async_trait;
use idmesh_connector::error::{ConnectorError, ConnectorResult};
use idmesh_connector::operation::{AttributeSet, AttributeValue};
use idmesh_connector::session::{
    DirectoryEntry, DirectorySession, ModifyOperation, SchemaMapping, SearchScope,
};

/// A scripted `DirectorySession`.
///
/// Reads are queued per address and consumed in order; searches are keyed by
/// `(base, filter)`. Every call is logged so tests can assert which round
/// trips happened.
#[derive(Default)]
pub(crate) struct MockSession {
    reads: Mutex<HashMap<String, VecDeque<ConnectorResult<AttributeSet>>>>,
    searches: Mutex<HashMap<(String, String), Vec<DirectoryEntry>>>,
    failing_bases: Mutex<HashSet<String>>,
    pub read_log: Mutex<Vec<(String, Vec<String>)>>,
    pub search_log: Mutex<Vec<(String, String)>>,
    pub modify_log: Mutex<Vec<(String, ModifyOperation, String, AttributeValue)>>,
}

impl MockSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful read result for an address.
    pub fn queue_read(&self, address: impl Into<String>, attributes: AttributeSet) {
        self.reads
            .lock()
            .unwrap()
            .entry(address.into())
            .or_default()
            .push_back(Ok(attributes));
    }

    /// Queue a read failure for an address.
    pub fn queue_read_error(&self, address: impl Into<String>, error: ConnectorError) {
        self.reads
            .lock()
            .unwrap()
            .entry(address.into())
            .or_default()
            .push_back(Err(error));
    }

    /// Register the entries a search returns.
    pub fn set_search(
        &self,
        base: impl Into<String>,
        filter: impl Into<String>,
        entries: Vec<DirectoryEntry>,
    ) {
        self.searches
            .lock()
            .unwrap()
            .insert((base.into(), filter.into()), entries);
    }

    /// Make every search under a base context fail as unavailable.
    pub fn fail_search_base(&self, base: impl Into<String>) {
        self.failing_bases.lock().unwrap().insert(base.into());
    }

    pub fn read_count(&self) -> usize {
        self.read_log.lock().unwrap().len()
    }

    pub fn search_count(&self) -> usize {
        self.search_log.lock().unwrap().len()
    }
}

#[async_trait]
impl DirectorySession for MockSession {
    async fn search(
        &self,
        base_context: &str,
        filter: &str,
        _scope: SearchScope,
    ) -> ConnectorResult<Vec<DirectoryEntry>> {
        self.search_log
            .lock()
            .unwrap()
            .push((base_context.to_string(), filter.to_string()));

        if self.failing_bases.lock().unwrap().contains(base_context) {
            return Err(ConnectorError::unavailable(format!(
                "base {base_context} unreachable"
            )));
        }

        Ok(self
            .searches
            .lock()
            .unwrap()
            .get(&(base_context.to_string(), filter.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn read_attributes(
        &self,
        address: &str,
        attributes: &[String],
    ) -> ConnectorResult<AttributeSet> {
        self.read_log
            .lock()
            .unwrap()
            .push((address.to_string(), attributes.to_vec()));

        match self.reads.lock().unwrap().get_mut(address) {
            Some(queue) => queue
                .pop_front()
                .unwrap_or_else(|| Err(ConnectorError::not_found(address))),
            None => Err(ConnectorError::not_found(address)),
        }
    }

    async fn modify_attribute(
        &self,
        dn: &str,
        operation: ModifyOperation,
        name: &str,
        value: AttributeValue,
    ) -> ConnectorResult<()> {
        self.modify_log.lock().unwrap().push((
            dn.to_string(),
            operation,
            name.to_string(),
            value,
        ));
        Ok(())
    }
}

/// A `SchemaMapping` with fixed answers: everything readable, `objectGUID`
/// identifiers, `distinguishedName` names, raw pass-through values.
pub(crate) struct MockSchema;

impl SchemaMapping for MockSchema {
    fn is_readable(&self, _object_class: &str, _attribute: &str) -> bool {
        true
    }

    fn default_attribute_names(&self, _object_class: &str) -> Vec<String> {
        vec!["cn".to_string()]
    }

    fn uid_attribute_name(&self, _object_class: &str) -> String {
        "objectGUID".to_string()
    }

    fn name_attribute_name(&self, _object_class: &str) -> String {
        "distinguishedName".to_string()
    }

    fn build_attribute(
        &self,
        _object_class: &str,
        attribute: &str,
        entry: &AttributeSet,
    ) -> Option<AttributeValue> {
        entry.get(attribute).cloned()
    }
}
