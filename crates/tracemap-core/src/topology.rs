//! Topology building - from raw link records to an application map
//!
//! [`TopologyBuilder::build_topology`] is the single entry point of the
//! engine. It discovers the destinations a source application called,
//! reconciles caller and callee observations, resolves RPC pseudo-nodes and
//! folds everything into per-node and per-link time-series histograms.

use crate::application::{Application, ServiceTypeRegistry};
use crate::error::{TopologyError, TopologyResult};
use crate::fetch::Fetcher;
use crate::grouping::{IdentityGrouping, NodeGrouping};
use crate::histogram::{Histogram, HistogramAccumulator, HistogramSchema, TimeSeriesHistogram};
use crate::link::{DirectedEdge, ResolvedLink};
use crate::range::Range;
use crate::reconcile::LinkRecordReconciler;
use crate::store::LinkStore;
use crate::window::{DownSampler, TimeWindow, WindowSampler};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout_at;
use tracing::{debug, info, warn};

/// Default deadline for one topology build
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(30);

/// A node of the application map
#[derive(Debug, Clone, Serialize)]
pub struct Node {
    pub application: Application,

    /// One histogram per window bucket
    pub histogram: TimeSeriesHistogram,

    /// Total over the whole range
    pub summary: Histogram,

    /// Totals per reporting agent
    pub agents: BTreeMap<String, Histogram>,
}

/// A directed link of the application map
#[derive(Debug, Clone, Serialize)]
pub struct Link {
    pub from: Application,
    pub to: Application,
    pub histogram: TimeSeriesHistogram,
    pub summary: Histogram,
}

/// Result of one topology query
#[derive(Debug, Clone, Serialize)]
pub struct TopologyGraph {
    pub source: Application,
    pub range: Range,
    pub slot_size: i64,
    pub window_range: Range,
    pub nodes: Vec<Node>,
    pub links: Vec<Link>,
}

impl TopologyGraph {
    fn assemble(source: Application, window: &TimeWindow, accumulator: HistogramAccumulator) -> Self {
        let (nodes, links) = accumulator.into_parts();

        let mut nodes: Vec<Node> = nodes
            .into_iter()
            .map(|(application, histogram)| Node {
                application,
                summary: histogram.series.summary(),
                histogram: histogram.series,
                agents: histogram.agents,
            })
            .collect();
        nodes.sort_by(|a, b| a.application.cmp(&b.application));

        let mut links: Vec<Link> = links
            .into_iter()
            .map(|(edge, histogram)| Link {
                from: edge.from,
                to: edge.to,
                summary: histogram.summary(),
                histogram,
            })
            .collect();
        links.sort_by(|a, b| (&a.from, &a.to).cmp(&(&b.from, &b.to)));

        Self {
            source,
            range: window.range(),
            slot_size: window.slot_size(),
            window_range: window.window_range(),
            nodes,
            links,
        }
    }

    pub fn node(&self, application: &Application) -> Option<&Node> {
        self.nodes.iter().find(|n| &n.application == application)
    }

    pub fn link(&self, from: &Application, to: &Application) -> Option<&Link> {
        self.links.iter().find(|l| &l.from == from && &l.to == to)
    }
}

/// Builds application maps against a link store
pub struct TopologyBuilder {
    store: Arc<dyn LinkStore>,
    registry: Arc<ServiceTypeRegistry>,
    sampler: Arc<dyn WindowSampler>,
    schema: HistogramSchema,
    timeout: Duration,
}

impl TopologyBuilder {
    pub fn new(store: Arc<dyn LinkStore>) -> Self {
        Self {
            store,
            registry: Arc::new(ServiceTypeRegistry::new()),
            sampler: Arc::new(DownSampler::default()),
            schema: HistogramSchema::default(),
            timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }

    pub fn with_registry(mut self, registry: Arc<ServiceTypeRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_sampler(mut self, sampler: Arc<dyn WindowSampler>) -> Self {
        self.sampler = sampler;
        self
    }

    pub fn with_schema(mut self, schema: HistogramSchema) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn registry(&self) -> &ServiceTypeRegistry {
        &self.registry
    }

    /// Window layout a query over `range` would use
    pub fn time_window(&self, range: Range) -> TopologyResult<TimeWindow> {
        TimeWindow::new(range, self.sampler.as_ref())
    }

    /// Build the map of calls made by `source` during `range`
    ///
    /// Without a grouping policy every application is its own node. No data
    /// is not an error: the graph then holds only the source node.
    pub async fn build_topology(
        &self,
        source: &Application,
        range: Range,
        grouping: Option<&dyn NodeGrouping>,
    ) -> TopologyResult<TopologyGraph> {
        if source.name.trim().is_empty() {
            return Err(TopologyError::InvalidArgument(
                "source application name must not be empty".into(),
            ));
        }
        let window = self.time_window(range)?;
        let grouping = grouping.unwrap_or(&IdentityGrouping);

        let started = std::time::Instant::now();
        let fetcher = Fetcher::new(self.store.as_ref(), range, self.timeout);
        let build = self.assemble(&fetcher, source, window, grouping);
        let graph = match timeout_at(fetcher.deadline(), build).await {
            Ok(result) => result?,
            Err(_) => {
                warn!("topology for {} over {} timed out", source, range);
                return Err(fetcher.timeout_error());
            }
        };

        info!(
            "Built topology for {} over {}: {} nodes, {} links in {}ms",
            source,
            range,
            graph.nodes.len(),
            graph.links.len(),
            started.elapsed().as_millis()
        );
        Ok(graph)
    }

    async fn assemble(
        &self,
        fetcher: &Fetcher<'_>,
        source: &Application,
        window: TimeWindow,
        grouping: &dyn NodeGrouping,
    ) -> TopologyResult<TopologyGraph> {
        let discovered = fetcher.caller_records(source, None).await?;
        debug!("discovered {} caller records for {}", discovered.len(), source);

        let mut reconciler = LinkRecordReconciler::new(fetcher, &self.registry);
        let links = reconciler.reconcile(source, &discovered).await?;

        let source_node = grouping.group(source);
        let mut accumulator = HistogramAccumulator::new(window.clone(), self.schema);
        accumulator.ensure_node(&source_node);
        for link in links {
            let grouped = ResolvedLink {
                edge: DirectedEdge::new(grouping.group(&link.edge.from), grouping.group(&link.edge.to)),
                record: link.record,
            };
            accumulator.accumulate(&grouped);
        }
        if accumulator.clamped() > 0 {
            warn!(
                "{} records outside {} were clamped into edge buckets",
                accumulator.clamped(),
                window.window_range()
            );
        }

        Ok(TopologyGraph::assemble(source_node, &window, accumulator))
    }
}
