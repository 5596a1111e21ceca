//! In-crate fixture store for unit tests

use crate::accept::{AcceptApplication, RpcApplicationKey};
use crate::application::Application;
use crate::link::RawLinkRecord;
use crate::range::Range;
use crate::store::{LinkStore, StoreError, StoreResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

#[derive(Default)]
pub struct FixtureStore {
    pub caller: Vec<RawLinkRecord>,
    pub callee: Vec<RawLinkRecord>,
    pub accepts: HashMap<RpcApplicationKey, HashSet<AcceptApplication>>,
    pub fail_callee: bool,
    pub delay: Option<Duration>,
    pub calls: Mutex<Vec<String>>,
}

impl FixtureStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn caller(mut self, record: RawLinkRecord) -> Self {
        self.caller.push(record);
        self
    }

    pub fn callee(mut self, record: RawLinkRecord) -> Self {
        self.callee.push(record);
        self
    }

    pub fn accept(mut self, host: &str, caller: Application, resolved: &[AcceptApplication]) -> Self {
        self.accepts.insert(
            RpcApplicationKey::new(host, caller),
            resolved.iter().cloned().collect(),
        );
        self
    }

    pub fn count(&self, operation: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.as_str() == operation)
            .count()
    }

    async fn enter(&self, operation: &str) {
        self.calls.lock().push(operation.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
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
        .filter(|r| &r.source == source)
        .filter(|r| destination.map_or(true, |d| &r.destination == d))
        .filter(|r| range.contains(r.timestamp))
        .cloned()
        .collect()
}

#[async_trait]
impl LinkStore for FixtureStore {
    async fn fetch_caller_link_records(
        &self,
        source: &Application,
        destination: Option<&Application>,
        range: Range,
    ) -> StoreResult<Vec<RawLinkRecord>> {
        self.enter("caller").await;
        Ok(select(&self.caller, source, destination, range))
    }

    async fn fetch_callee_link_records(
        &self,
        source: &Application,
        destination: &Application,
        range: Range,
    ) -> StoreResult<Vec<RawLinkRecord>> {
        self.enter("callee").await;
        if self.fail_callee {
            return Err(StoreError::Unavailable("callee table offline".into()));
        }
        Ok(select(&self.callee, source, Some(destination), range))
    }

    async fn resolve_accept_applications(
        &self,
        host: &str,
        caller: &Application,
    ) -> StoreResult<HashSet<AcceptApplication>> {
        self.enter("accept").await;
        let key = RpcApplicationKey::new(host, caller.clone());
        Ok(self.accepts.get(&key).cloned().unwrap_or_default())
    }
}
