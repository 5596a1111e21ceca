//! Call-linkage records and graph edges

use crate::application::Application;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One observed call between two applications, as stored by the collector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawLinkRecord {
    pub source: Application,
    pub destination: Application,

    /// Host the caller reached (for RPC calls, the remote address)
    #[serde(default)]
    pub calling_host: String,

    /// Agent that reported the observation
    #[serde(default)]
    pub agent_id: String,

    /// Epoch milliseconds
    pub timestamp: i64,

    /// Response time in milliseconds
    pub elapsed: u64,

    #[serde(default)]
    pub is_error: bool,
}

impl RawLinkRecord {
    pub fn new(source: Application, destination: Application, timestamp: i64, elapsed: u64) -> Self {
        Self {
            source,
            destination,
            calling_host: String::new(),
            agent_id: String::new(),
            timestamp,
            elapsed,
            is_error: false,
        }
    }

    pub fn with_calling_host(mut self, host: impl Into<String>) -> Self {
        self.calling_host = host.into();
        self
    }

    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = agent_id.into();
        self
    }

    pub fn with_error(mut self, is_error: bool) -> Self {
        self.is_error = is_error;
        self
    }
}

/// A resolved caller -> callee edge
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DirectedEdge {
    pub from: Application,
    pub to: Application,
}

impl DirectedEdge {
    pub fn new(from: Application, to: Application) -> Self {
        Self { from, to }
    }
}

impl fmt::Display for DirectedEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.from, self.to)
    }
}

/// A record attributed to the edge it counts towards after reconciliation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLink {
    pub edge: DirectedEdge,
    pub record: RawLinkRecord,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ServiceType;

    #[test]
    fn test_record_parses_with_defaults() {
        let json = r#"{
            "source": {"name": "ORDER", "service_type": 1010},
            "destination": {"name": "PAYMENT", "service_type": 1010},
            "timestamp": 1200,
            "elapsed": 50
        }"#;
        let record: RawLinkRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.source, Application::new("ORDER", ServiceType::TOMCAT));
        assert_eq!(record.calling_host, "");
        assert!(!record.is_error);
    }

    #[test]
    fn test_edge_display() {
        let edge = DirectedEdge::new(
            Application::new("ORDER", ServiceType::TOMCAT),
            Application::new("DB", ServiceType::MYSQL),
        );
        assert_eq!(edge.to_string(), "ORDER(1010) -> DB(2100)");
    }
}
