//! tracemap core - topology and response-time aggregation over trace link records
//!
//! This crate turns raw caller/callee link records into an application map:
//!
//! - **Window**: bucketing of a query range into fixed slots
//! - **Accept cache**: resolution of RPC pseudo-nodes to concrete applications
//! - **Reconciler**: one authoritative observation side per application pair
//! - **Histograms**: per-node and per-link response-time series
//! - **Topology**: the query entry point, [`TopologyBuilder::build_topology`]

pub mod accept;
pub mod application;
pub mod config;
pub mod error;
pub mod fetch;
pub mod grouping;
pub mod histogram;
pub mod link;
pub mod range;
pub mod reconcile;
pub mod store;
pub mod topology;
pub mod window;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use accept::{AcceptApplication, AcceptResolutionCache, RpcApplicationKey};
pub use application::{Application, ServiceKind, ServiceType, ServiceTypeRegistry};
pub use config::{ConfigError, ConfigLoader, ConfigResult, TracemapConfig};
pub use error::{TopologyError, TopologyResult};
pub use grouping::{IdentityGrouping, NodeGrouping, PatternGrouping};
pub use histogram::{Histogram, HistogramAccumulator, HistogramSchema, TimeSeriesHistogram};
pub use link::{DirectedEdge, RawLinkRecord, ResolvedLink};
pub use range::Range;
pub use reconcile::{LinkRecordReconciler, LinkSelection};
pub use store::{LinkStore, StoreError, StoreResult};
pub use topology::{Link, Node, TopologyBuilder, TopologyGraph};
pub use window::{DownSampler, FixedSampler, TimeWindow, WindowSampler};

/// tracemap version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
