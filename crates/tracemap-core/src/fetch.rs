//! Deadline-bounded access to the link store
//!
//! Every store call made during one topology build shares the build's
//! deadline. Failures are wrapped with the operation, application and range
//! so callers can report which part of the map is unavailable.

use crate::accept::AcceptApplication;
use crate::application::Application;
use crate::error::{TopologyError, TopologyResult};
use crate::link::RawLinkRecord;
use crate::range::Range;
use crate::store::{LinkStore, StoreResult};
use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};

/// Store handle scoped to one query
pub struct Fetcher<'a> {
    store: &'a dyn LinkStore,
    range: Range,
    deadline: Instant,
    timeout: Duration,
}

impl<'a> Fetcher<'a> {
    /// Start the clock: the deadline is `timeout` from now
    pub fn new(store: &'a dyn LinkStore, range: Range, timeout: Duration) -> Self {
        Self {
            store,
            range,
            deadline: Instant::now() + timeout,
            timeout,
        }
    }

    pub fn range(&self) -> Range {
        self.range
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn timeout_error(&self) -> TopologyError {
        TopologyError::Timeout {
            timeout_ms: self.timeout.as_millis() as u64,
        }
    }

    pub async fn caller_records(
        &self,
        source: &Application,
        destination: Option<&Application>,
    ) -> TopologyResult<Vec<RawLinkRecord>> {
        let fetch = self
            .store
            .fetch_caller_link_records(source, destination, self.range);
        self.guard("fetch_caller_link_records", source.to_string(), fetch)
            .await
    }

    pub async fn callee_records(
        &self,
        source: &Application,
        destination: &Application,
    ) -> TopologyResult<Vec<RawLinkRecord>> {
        let fetch = self
            .store
            .fetch_callee_link_records(source, destination, self.range);
        self.guard(
            "fetch_callee_link_records",
            format!("{} -> {}", source, destination),
            fetch,
        )
        .await
    }

    pub async fn accept_applications(
        &self,
        host: &str,
        caller: &Application,
    ) -> TopologyResult<HashSet<AcceptApplication>> {
        let fetch = self.store.resolve_accept_applications(host, caller);
        self.guard(
            "resolve_accept_applications",
            format!("{}@{}", host, caller),
            fetch,
        )
        .await
    }

    async fn guard<T>(
        &self,
        operation: &'static str,
        application: String,
        fetch: impl Future<Output = StoreResult<T>>,
    ) -> TopologyResult<T> {
        match timeout_at(self.deadline, fetch).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(source)) => Err(TopologyError::ExternalFetch {
                operation,
                application,
                range: self.range,
                source,
            }),
            Err(_) => Err(self.timeout_error()),
        }
    }
}
