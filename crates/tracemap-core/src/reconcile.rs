//! Link reconciliation - one canonical edge set from two observation sides
//!
//! Calls between instrumented applications may be recorded twice: once by
//! the caller's agent and once by the callee's. For every source/destination
//! pair exactly one side is authoritative, chosen by [`LinkSelection`].
//! Edges that end at a generic RPC client node are then resolved to the
//! concrete applications that accepted the calls.

use crate::accept::{AcceptResolutionCache, RpcApplicationKey};
use crate::application::{Application, ServiceKind, ServiceTypeRegistry};
use crate::error::{TopologyError, TopologyResult};
use crate::fetch::Fetcher;
use crate::link::{DirectedEdge, RawLinkRecord, ResolvedLink};
use futures_util::future::try_join_all;
use std::collections::{BTreeSet, HashSet};
use tracing::debug;

/// Which observation side is authoritative for a pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkSelection {
    /// Source is an end-user entry point. User calls are recorded by the
    /// entry application under its own name with the user service type.
    UserOrigin,
    /// Destination is a backend server; only the receiver attributes
    /// calls that went through an RPC client hop correctly.
    CalleeSide,
    /// Calls into terminals and everything else
    CallerSide,
}

impl LinkSelection {
    pub fn classify(
        registry: &ServiceTypeRegistry,
        source: &Application,
        destination: &Application,
    ) -> Self {
        match (
            registry.kind(source.service_type),
            registry.kind(destination.service_type),
        ) {
            (ServiceKind::User, _) => LinkSelection::UserOrigin,
            (_, ServiceKind::Server) => LinkSelection::CalleeSide,
            _ => LinkSelection::CallerSide,
        }
    }
}

/// Merges caller and callee observations for one query
pub struct LinkRecordReconciler<'a> {
    fetcher: &'a Fetcher<'a>,
    registry: &'a ServiceTypeRegistry,
    cache: AcceptResolutionCache,
}

impl<'a> LinkRecordReconciler<'a> {
    pub fn new(fetcher: &'a Fetcher<'a>, registry: &'a ServiceTypeRegistry) -> Self {
        Self {
            fetcher,
            registry,
            cache: AcceptResolutionCache::new(),
        }
    }

    pub fn cache(&self) -> &AcceptResolutionCache {
        &self.cache
    }

    /// Fetch the authoritative records for one pair
    pub async fn select_link(
        &self,
        source: &Application,
        destination: &Application,
    ) -> TopologyResult<Vec<RawLinkRecord>> {
        let selection = LinkSelection::classify(self.registry, source, destination);
        debug!("select {} -> {} via {:?}", source, destination, selection);
        match selection {
            LinkSelection::UserOrigin => {
                let user = Application::new(destination.name.clone(), source.service_type);
                self.fetcher.caller_records(&user, Some(destination)).await
            }
            LinkSelection::CalleeSide => self.fetcher.callee_records(source, destination).await,
            LinkSelection::CallerSide => {
                self.fetcher
                    .caller_records(source, Some(destination))
                    .await
            }
        }
    }

    /// Reconcile every pair `source -> d` for the destinations seen in
    /// `discovered`, resolving RPC pseudo-nodes along the way
    pub async fn reconcile(
        &mut self,
        source: &Application,
        discovered: &[RawLinkRecord],
    ) -> TopologyResult<Vec<ResolvedLink>> {
        let destinations: BTreeSet<&Application> =
            discovered.iter().map(|r| &r.destination).collect();
        let pending = self.pending_keys(source, discovered);

        let this = &*self;
        let selections = destinations.iter().copied().map(|destination| async move {
            let mut records = this.select_link(source, destination).await?;
            if records.is_empty()
                && LinkSelection::classify(this.registry, source, destination)
                    == LinkSelection::CalleeSide
            {
                // receiver reported nothing; keep what the caller saw
                records = discovered
                    .iter()
                    .filter(|r| &r.destination == destination)
                    .cloned()
                    .collect();
                debug!(
                    "no callee records for {} -> {}, using {} caller records",
                    source,
                    destination,
                    records.len()
                );
            }
            Ok::<_, TopologyError>((destination.clone(), records))
        });
        let lookups = pending
            .iter()
            .map(|key| this.fetcher.accept_applications(&key.host, &key.caller));

        let (selected, resolutions) =
            tokio::try_join!(try_join_all(selections), try_join_all(lookups))?;
        for (key, resolved) in pending.into_iter().zip(resolutions) {
            self.cache.put(key, resolved);
        }

        // pseudo records that only showed up in a per-pair fetch
        let all_records: Vec<RawLinkRecord> = selected
            .iter()
            .flat_map(|(_, records)| records.iter().cloned())
            .collect();
        let remaining = self.pending_keys(source, &all_records);
        if !remaining.is_empty() {
            debug!("second resolution round for {} hosts", remaining.len());
            let this = &*self;
            let resolutions = try_join_all(
                remaining
                    .iter()
                    .map(|key| this.fetcher.accept_applications(&key.host, &key.caller)),
            )
            .await?;
            for (key, resolved) in remaining.into_iter().zip(resolutions) {
                self.cache.put(key, resolved);
            }
        }

        let mut links = Vec::new();
        for (destination, records) in selected {
            for record in records {
                self.resolve_into(source, &destination, record, &mut links);
            }
        }
        Ok(links)
    }

    /// Cache keys still needing a lookup for pseudo-node records
    fn pending_keys(&self, source: &Application, records: &[RawLinkRecord]) -> Vec<RpcApplicationKey> {
        let mut seen = HashSet::new();
        records
            .iter()
            .filter(|r| self.registry.is_rpc_client(r.destination.service_type))
            .filter(|r| !r.calling_host.is_empty())
            .map(|r| RpcApplicationKey::new(r.calling_host.clone(), source.clone()))
            .filter(|key| !self.cache.contains(key))
            .filter(|key| seen.insert(key.clone()))
            .collect()
    }

    fn resolve_into(
        &self,
        source: &Application,
        destination: &Application,
        record: RawLinkRecord,
        out: &mut Vec<ResolvedLink>,
    ) {
        if !self.registry.is_rpc_client(destination.service_type) {
            out.push(ResolvedLink {
                edge: DirectedEdge::new(source.clone(), destination.clone()),
                record,
            });
            return;
        }

        let key = RpcApplicationKey::new(record.calling_host.clone(), source.clone());
        let targets: BTreeSet<Application> = self
            .cache
            .get(&key)
            .into_iter()
            .map(|accept| accept.resolved)
            .collect();

        if targets.is_empty() {
            debug!("{} on {} left unresolved", destination, record.calling_host);
            out.push(ResolvedLink {
                edge: DirectedEdge::new(source.clone(), destination.clone()),
                record,
            });
            return;
        }

        // each target gets the whole observation; the ambiguity is identity, not volume
        for target in targets {
            out.push(ResolvedLink {
                edge: DirectedEdge::new(source.clone(), target),
                record: record.clone(),
            });
        }
    }
}
