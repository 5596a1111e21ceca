//! Node grouping - folding several applications into one display node

use crate::application::{Application, ServiceType};
use regex::Regex;

/// Maps a concrete application to the node it is displayed as
pub trait NodeGrouping: Send + Sync {
    fn group(&self, application: &Application) -> Application;
}

/// Every application is its own node
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityGrouping;

impl NodeGrouping for IdentityGrouping {
    fn group(&self, application: &Application) -> Application {
        application.clone()
    }
}

/// One name-pattern rule
#[derive(Debug, Clone)]
pub struct GroupingRule {
    pattern: Regex,
    group: String,
    service_type: Option<ServiceType>,
}

impl GroupingRule {
    pub fn new(pattern: &str, group: impl Into<String>) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
            group: group.into(),
            service_type: None,
        })
    }

    /// Only apply to applications of this service type
    pub fn with_service_type(mut self, service_type: ServiceType) -> Self {
        self.service_type = Some(service_type);
        self
    }

    fn matches(&self, application: &Application) -> bool {
        self.service_type
            .map_or(true, |st| st == application.service_type)
            && self.pattern.is_match(&application.name)
    }
}

/// Regex rules, first match wins. Grouped nodes keep their service type.
#[derive(Debug, Clone, Default)]
pub struct PatternGrouping {
    rules: Vec<GroupingRule>,
}

impl PatternGrouping {
    pub fn new(rules: Vec<GroupingRule>) -> Self {
        Self { rules }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl NodeGrouping for PatternGrouping {
    fn group(&self, application: &Application) -> Application {
        match self.rules.iter().find(|rule| rule.matches(application)) {
            Some(rule) => Application::new(rule.group.clone(), application.service_type),
            None => application.clone(),
        }
    }
}
