//! Response-time histograms bucketed by time window
//!
//! Each observation lands in one latency slot (fast, normal, slow, very
//! slow, or error) of one time bucket. Merging is pointwise addition, so
//! partial accumulators can be combined in any order.

use crate::application::Application;
use crate::error::{TopologyError, TopologyResult};
use crate::link::{DirectedEdge, ResolvedLink};
use crate::window::TimeWindow;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Latency slot of a histogram
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotLabel {
    Fast,
    Normal,
    Slow,
    VerySlow,
    Error,
}

/// Latency thresholds in milliseconds, strictly increasing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistogramSchema {
    fast_ms: u64,
    normal_ms: u64,
    slow_ms: u64,
}

impl HistogramSchema {
    pub fn new(fast_ms: u64, normal_ms: u64, slow_ms: u64) -> TopologyResult<Self> {
        if !(fast_ms < normal_ms && normal_ms < slow_ms) {
            return Err(TopologyError::InvalidArgument(format!(
                "histogram thresholds must increase: {} < {} < {}",
                fast_ms, normal_ms, slow_ms
            )));
        }
        Ok(Self {
            fast_ms,
            normal_ms,
            slow_ms,
        })
    }

    pub fn fast_ms(&self) -> u64 {
        self.fast_ms
    }

    pub fn normal_ms(&self) -> u64 {
        self.normal_ms
    }

    pub fn slow_ms(&self) -> u64 {
        self.slow_ms
    }

    /// Errors always land in the error slot regardless of elapsed time
    pub fn classify(&self, elapsed: u64, is_error: bool) -> SlotLabel {
        if is_error {
            SlotLabel::Error
        } else if elapsed <= self.fast_ms {
            SlotLabel::Fast
        } else if elapsed <= self.normal_ms {
            SlotLabel::Normal
        } else if elapsed <= self.slow_ms {
            SlotLabel::Slow
        } else {
            SlotLabel::VerySlow
        }
    }
}

impl Default for HistogramSchema {
    fn default() -> Self {
        Self {
            fast_ms: 1000,
            normal_ms: 3000,
            slow_ms: 5000,
        }
    }
}

/// Counts per latency slot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Histogram {
    pub fast: u64,
    pub normal: u64,
    pub slow: u64,
    pub very_slow: u64,
    pub error: u64,
}

impl Histogram {
    pub fn add(&mut self, label: SlotLabel, count: u64) {
        match label {
            SlotLabel::Fast => self.fast += count,
            SlotLabel::Normal => self.normal += count,
            SlotLabel::Slow => self.slow += count,
            SlotLabel::VerySlow => self.very_slow += count,
            SlotLabel::Error => self.error += count,
        }
    }

    pub fn get(&self, label: SlotLabel) -> u64 {
        match label {
            SlotLabel::Fast => self.fast,
            SlotLabel::Normal => self.normal,
            SlotLabel::Slow => self.slow,
            SlotLabel::VerySlow => self.very_slow,
            SlotLabel::Error => self.error,
        }
    }

    pub fn merge(&mut self, other: &Histogram) {
        self.fast += other.fast;
        self.normal += other.normal;
        self.slow += other.slow;
        self.very_slow += other.very_slow;
        self.error += other.error;
    }

    pub fn total(&self) -> u64 {
        self.fast + self.normal + self.slow + self.very_slow + self.error
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Histogram of one time bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeHistogram {
    pub timestamp: i64,
    #[serde(flatten)]
    pub histogram: Histogram,
}

/// One histogram per bucket of a [`TimeWindow`], in bucket order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TimeSeriesHistogram {
    slots: Vec<TimeHistogram>,
}

impl TimeSeriesHistogram {
    /// Zero-filled series covering every bucket of `window`
    pub fn new(window: &TimeWindow) -> Self {
        Self {
            slots: window
                .iter()
                .map(|timestamp| TimeHistogram {
                    timestamp,
                    histogram: Histogram::default(),
                })
                .collect(),
        }
    }

    pub fn add(&mut self, index: usize, label: SlotLabel) {
        if let Some(slot) = self.slots.get_mut(index) {
            slot.histogram.add(label, 1);
        }
    }

    /// Pointwise addition. Both series must come from the same window.
    pub fn merge(&mut self, other: &TimeSeriesHistogram) {
        debug_assert_eq!(self.slots.len(), other.slots.len());
        for (mine, theirs) in self.slots.iter_mut().zip(&other.slots) {
            debug_assert_eq!(mine.timestamp, theirs.timestamp);
            mine.histogram.merge(&theirs.histogram);
        }
    }

    pub fn slots(&self) -> &[TimeHistogram] {
        &self.slots
    }

    /// Total over all buckets
    pub fn summary(&self) -> Histogram {
        let mut total = Histogram::default();
        for slot in &self.slots {
            total.merge(&slot.histogram);
        }
        total
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(|slot| slot.histogram.is_empty())
    }
}

/// Node-side aggregate: time series plus per-agent totals
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeHistogram {
    pub series: TimeSeriesHistogram,
    pub agents: BTreeMap<String, Histogram>,
}

impl NodeHistogram {
    pub fn new(window: &TimeWindow) -> Self {
        Self {
            series: TimeSeriesHistogram::new(window),
            agents: BTreeMap::new(),
        }
    }

    pub fn merge(&mut self, other: &NodeHistogram) {
        self.series.merge(&other.series);
        for (agent, histogram) in &other.agents {
            self.agents.entry(agent.clone()).or_default().merge(histogram);
        }
    }
}

/// Folds resolved links into node and link histograms
#[derive(Debug, Clone)]
pub struct HistogramAccumulator {
    window: TimeWindow,
    schema: HistogramSchema,
    nodes: HashMap<Application, NodeHistogram>,
    links: HashMap<DirectedEdge, TimeSeriesHistogram>,
    clamped: u64,
}

impl HistogramAccumulator {
    pub fn new(window: TimeWindow, schema: HistogramSchema) -> Self {
        Self {
            window,
            schema,
            nodes: HashMap::new(),
            links: HashMap::new(),
            clamped: 0,
        }
    }

    pub fn window(&self) -> &TimeWindow {
        &self.window
    }

    /// Make sure `application` appears as a node even without observations
    pub fn ensure_node(&mut self, application: &Application) {
        if !self.nodes.contains_key(application) {
            self.nodes
                .insert(application.clone(), NodeHistogram::new(&self.window));
        }
    }

    pub fn accumulate(&mut self, link: &ResolvedLink) {
        let record = &link.record;
        let index = match self.window.bucket_index(record.timestamp) {
            Ok(index) => index,
            Err(_) => {
                self.clamped += 1;
                debug!(
                    "clamping straggler at {} on {} into window {}",
                    record.timestamp,
                    link.edge,
                    self.window.window_range()
                );
                self.window.clamped_index(record.timestamp)
            }
        };
        let label = self.schema.classify(record.elapsed, record.is_error);

        let window = &self.window;
        self.links
            .entry(link.edge.clone())
            .or_insert_with(|| TimeSeriesHistogram::new(window))
            .add(index, label);

        // A self-loop, or an edge collapsed by grouping, is one call for its node
        let callee = (link.edge.to != link.edge.from).then_some(&link.edge.to);
        for application in std::iter::once(&link.edge.from).chain(callee) {
            let node = self
                .nodes
                .entry(application.clone())
                .or_insert_with(|| NodeHistogram::new(window));
            node.series.add(index, label);
            node.agents
                .entry(record.agent_id.clone())
                .or_default()
                .add(label, 1);
        }
    }

    pub fn accumulate_all<'a>(&mut self, links: impl IntoIterator<Item = &'a ResolvedLink>) {
        for link in links {
            self.accumulate(link);
        }
    }

    /// Combine a partial accumulator built over the same window
    pub fn merge(&mut self, other: HistogramAccumulator) {
        debug_assert_eq!(self.window, other.window);
        for (application, histogram) in other.nodes {
            match self.nodes.get_mut(&application) {
                Some(existing) => existing.merge(&histogram),
                None => {
                    self.nodes.insert(application, histogram);
                }
            }
        }
        for (edge, series) in other.links {
            match self.links.get_mut(&edge) {
                Some(existing) => existing.merge(&series),
                None => {
                    self.links.insert(edge, series);
                }
            }
        }
        self.clamped += other.clamped;
    }

    pub fn node(&self, application: &Application) -> Option<&NodeHistogram> {
        self.nodes.get(application)
    }

    pub fn link(&self, edge: &DirectedEdge) -> Option<&TimeSeriesHistogram> {
        self.links.get(edge)
    }

    /// Observations that fell outside the window and were clamped to an edge bucket
    pub fn clamped(&self) -> u64 {
        self.clamped
    }

    pub fn into_parts(
        self,
    ) -> (
        HashMap<Application, NodeHistogram>,
        HashMap<DirectedEdge, TimeSeriesHistogram>,
    ) {
        (self.nodes, self.links)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ServiceType;
    use crate::link::RawLinkRecord;
    use crate::window::{DownSampler, ONE_MINUTE};

    fn window() -> TimeWindow {
        TimeWindow::from_bounds(0, 10 * ONE_MINUTE, &DownSampler::default()).unwrap()
    }

    fn order() -> Application {
        Application::new("ORDER", ServiceType::TOMCAT)
    }

    fn payment() -> Application {
        Application::new("PAYMENT", ServiceType::TOMCAT)
    }

    fn link(timestamp: i64, elapsed: u64, is_error: bool) -> ResolvedLink {
        let record = RawLinkRecord::new(order(), payment(), timestamp, elapsed)
            .with_agent("order-1")
            .with_error(is_error);
        ResolvedLink {
            edge: DirectedEdge::new(order(), payment()),
            record,
        }
    }

    #[test]
    fn test_schema_rejects_non_increasing() {
        assert!(HistogramSchema::new(1000, 1000, 5000).is_err());
        assert!(HistogramSchema::new(3000, 1000, 5000).is_err());
        assert!(HistogramSchema::new(100, 200, 300).is_ok());
    }

    #[test]
    fn test_classify_thresholds() {
        let schema = HistogramSchema::default();
        assert_eq!(schema.classify(0, false), SlotLabel::Fast);
        assert_eq!(schema.classify(1000, false), SlotLabel::Fast);
        assert_eq!(schema.classify(1001, false), SlotLabel::Normal);
        assert_eq!(schema.classify(3000, false), SlotLabel::Normal);
        assert_eq!(schema.classify(4000, false), SlotLabel::Slow);
        assert_eq!(schema.classify(5001, false), SlotLabel::VerySlow);
        assert_eq!(schema.classify(10, true), SlotLabel::Error);
        assert_eq!(schema.classify(60_000, true), SlotLabel::Error);
    }

    #[test]
    fn test_new_series_is_zero_filled() {
        let w = window();
        let series = TimeSeriesHistogram::new(&w);
        assert_eq!(series.slots().len(), w.bucket_count());
        assert!(series.is_empty());
        assert_eq!(series.slots()[2].timestamp, 2 * ONE_MINUTE);
    }

    #[test]
    fn test_accumulate_self_loop_counts_node_once() {
        let mut acc = HistogramAccumulator::new(window(), HistogramSchema::default());
        let record = RawLinkRecord::new(order(), order(), ONE_MINUTE, 50).with_agent("order-1");
        acc.accumulate(&ResolvedLink {
            edge: DirectedEdge::new(order(), order()),
            record,
        });

        let node = acc.node(&order()).unwrap();
        assert_eq!(node.series.summary().total(), 1);
        assert_eq!(node.agents["order-1"].total(), 1);
    }

    #[test]
    fn test_accumulate_updates_link_and_both_nodes() {
        let mut acc = HistogramAccumulator::new(window(), HistogramSchema::default());
        acc.accumulate(&link(ONE_MINUTE + 5, 50, false));
        acc.accumulate(&link(ONE_MINUTE + 6, 9000, false));
        acc.accumulate(&link(3 * ONE_MINUTE, 50, true));

        let edge = DirectedEdge::new(order(), payment());
        let series = acc.link(&edge).unwrap();
        assert_eq!(series.slots()[1].histogram.fast, 1);
        assert_eq!(series.slots()[1].histogram.very_slow, 1);
        assert_eq!(series.slots()[3].histogram.error, 1);
        assert_eq!(series.summary().total(), 3);

        for app in [order(), payment()] {
            let node = acc.node(&app).unwrap();
            assert_eq!(node.series.summary().total(), 3);
            assert_eq!(node.agents["order-1"].error, 1);
        }
    }

    #[test]
    fn test_stragglers_are_clamped_not_dropped() {
        let mut acc = HistogramAccumulator::new(window(), HistogramSchema::default());
        acc.accumulate(&link(-ONE_MINUTE, 10, false));
        acc.accumulate(&link(60 * ONE_MINUTE, 10, false));

        let series = acc.link(&DirectedEdge::new(order(), payment())).unwrap();
        assert_eq!(series.slots()[0].histogram.fast, 1);
        assert_eq!(series.slots().last().unwrap().histogram.fast, 1);
        assert_eq!(acc.clamped(), 2);
    }

    #[test]
    fn test_merge_is_commutative() {
        let a = link(10, 50, false);
        let b = link(2 * ONE_MINUTE, 2000, false);
        let c = link(5 * ONE_MINUTE, 10, true);

        let mut left = HistogramAccumulator::new(window(), HistogramSchema::default());
        left.accumulate_all([&a, &b]);
        let mut left_tail = HistogramAccumulator::new(window(), HistogramSchema::default());
        left_tail.accumulate(&c);
        left.merge(left_tail);

        let mut right = HistogramAccumulator::new(window(), HistogramSchema::default());
        right.accumulate_all([&c, &b]);
        let mut right_tail = HistogramAccumulator::new(window(), HistogramSchema::default());
        right_tail.accumulate(&a);
        right.merge(right_tail);

        let edge = DirectedEdge::new(order(), payment());
        assert_eq!(left.link(&edge), right.link(&edge));
        assert_eq!(left.node(&order()), right.node(&order()));
        assert_eq!(left.node(&payment()), right.node(&payment()));
    }

    #[test]
    fn test_ensure_node_keeps_existing() {
        let mut acc = HistogramAccumulator::new(window(), HistogramSchema::default());
        acc.accumulate(&link(10, 50, false));
        acc.ensure_node(&order());
        assert_eq!(acc.node(&order()).unwrap().series.summary().fast, 1);

        let lonely = Application::new("LONELY", ServiceType::TOMCAT);
        acc.ensure_node(&lonely);
        assert!(acc.node(&lonely).unwrap().series.is_empty());
    }
}
