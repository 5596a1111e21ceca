//! Read-side contract of the link record store
//!
//! The engine never writes; it only needs these three queries. Storage
//! backends implement [`LinkStore`].

use crate::accept::AcceptApplication;
use crate::application::Application;
use crate::link::RawLinkRecord;
use crate::range::Range;
use async_trait::async_trait;
use std::collections::HashSet;
use thiserror::Error;

/// Store error type
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed record at line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait LinkStore: Send + Sync {
    /// Records observed by `source`'s agents for outgoing calls, optionally
    /// limited to one destination
    async fn fetch_caller_link_records(
        &self,
        source: &Application,
        destination: Option<&Application>,
        range: Range,
    ) -> StoreResult<Vec<RawLinkRecord>>;

    /// Records observed by `destination`'s agents for calls received from `source`
    async fn fetch_callee_link_records(
        &self,
        source: &Application,
        destination: &Application,
        range: Range,
    ) -> StoreResult<Vec<RawLinkRecord>>;

    /// Applications seen accepting calls from `caller` on `host`
    async fn resolve_accept_applications(
        &self,
        host: &str,
        caller: &Application,
    ) -> StoreResult<HashSet<AcceptApplication>>;
}
