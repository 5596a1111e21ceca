//! tracemap store - link record storage for offline use
//!
//! [`MemoryLinkStore`] keeps caller records, callee records and accept
//! observations in memory and answers the engine's [`LinkStore`] queries.
//! It is filled from JSONL dumps (see [`dump`]) or directly.

pub mod dump;

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracemap_core::{
    AcceptApplication, Application, LinkStore, Range, RawLinkRecord, RpcApplicationKey,
    StoreResult,
};
use tracing::debug;

pub use dump::{load_dump, load_from_reader, DumpEntry};

#[derive(Default)]
struct Tables {
    caller: Vec<RawLinkRecord>,
    callee: Vec<RawLinkRecord>,
    accepts: HashMap<RpcApplicationKey, HashSet<AcceptApplication>>,
}

/// Entry counts of a [`MemoryLinkStore`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub caller_records: usize,
    pub callee_records: usize,
    pub accept_keys: usize,
}

/// Link store held in memory
#[derive(Default)]
pub struct MemoryLinkStore {
    tables: RwLock<Tables>,
}

impl MemoryLinkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a JSONL dump file
    pub async fn from_dump(path: impl AsRef<Path>) -> StoreResult<Self> {
        let store = Self::new();
        store.extend(load_dump(path).await?);
        Ok(store)
    }

    pub fn insert_caller(&self, record: RawLinkRecord) {
        self.tables.write().caller.push(record);
    }

    pub fn insert_callee(&self, record: RawLinkRecord) {
        self.tables.write().callee.push(record);
    }

    pub fn insert_accept(&self, host: &str, caller: Application, resolved: Application) {
        self.tables
            .write()
            .accepts
            .entry(RpcApplicationKey::new(host, caller))
            .or_default()
            .insert(AcceptApplication::new(host, resolved));
    }

    pub fn insert(&self, entry: DumpEntry) {
        match entry {
            DumpEntry::Caller(record) => self.insert_caller(record),
            DumpEntry::Callee(record) => self.insert_callee(record),
            DumpEntry::Accept {
                host,
                caller,
                resolved,
            } => self.insert_accept(&host, caller, resolved),
        }
    }

    pub fn extend(&self, entries: impl IntoIterator<Item = DumpEntry>) {
        for entry in entries {
            self.insert(entry);
        }
    }

    pub fn stats(&self) -> StoreStats {
        let tables = self.tables.read();
        StoreStats {
            caller_records: tables.caller.len(),
            callee_records: tables.callee.len(),
            accept_keys: tables.accepts.len(),
        }
    }
}

fn select(
    records: &[RawLinkRecord],
    source: &Application,
    destination: Option<&Application>,
    range: Range,
) -> Vec<RawLinkRecord> {
    records
        .iter()
        .filter(|r| &r.source == source && range.contains(r.timestamp))
        .filter(|r| destination.map_or(true, |d| &r.destination == d))
        .cloned()
        .collect()
}

#[async_trait]
impl LinkStore for MemoryLinkStore {
    async fn fetch_caller_link_records(
        &self,
        source: &Application,
        destination: Option<&Application>,
        range: Range,
    ) -> StoreResult<Vec<RawLinkRecord>> {
        let records = select(&self.tables.read().caller, source, destination, range);
        debug!("caller records for {} over {}: {}", source, range, records.len());
        Ok(records)
    }

    async fn fetch_callee_link_records(
        &self,
        source: &Application,
        destination: &Application,
        range: Range,
    ) -> StoreResult<Vec<RawLinkRecord>> {
        let records = select(&self.tables.read().callee, source, Some(destination), range);
        debug!(
            "callee records for {} -> {} over {}: {}",
            source,
            destination,
            range,
            records.len()
        );
        Ok(records)
    }

    async fn resolve_accept_applications(
        &self,
        host: &str,
        caller: &Application,
    ) -> StoreResult<HashSet<AcceptApplication>> {
        let key = RpcApplicationKey::new(host, caller.clone());
        Ok(self
            .tables
            .read()
            .accepts
            .get(&key)
            .cloned()
            .unwrap_or_default())
    }
}
