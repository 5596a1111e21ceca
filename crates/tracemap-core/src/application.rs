//! Application identities and service type classification
//!
//! Every graph node is an [`Application`]: a name plus the [`ServiceType`]
//! code reported by the agent. The [`ServiceTypeRegistry`] classifies codes
//! into a closed [`ServiceKind`], which drives link selection.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Numeric service type code as recorded by agents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceType(pub u16);

impl ServiceType {
    pub const UNKNOWN: ServiceType = ServiceType(1);
    pub const USER: ServiceType = ServiceType(2);
    pub const STAND_ALONE: ServiceType = ServiceType(1000);
    pub const TOMCAT: ServiceType = ServiceType(1010);
    pub const BLOC: ServiceType = ServiceType(1020);
    pub const UNKNOWN_DB: ServiceType = ServiceType(2050);
    pub const MYSQL: ServiceType = ServiceType(2100);
    pub const ARCUS: ServiceType = ServiceType(8100);
    pub const HTTP_CLIENT: ServiceType = ServiceType(9050);
    pub const JDK_HTTPURLCONNECTOR: ServiceType = ServiceType(9055);

    pub fn code(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Behavioural class of a service type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    /// External entry point (end users, browsers)
    User,
    /// Backend application server running an agent
    Server,
    /// Outgoing remote call whose target is not yet identified
    RpcClient,
    /// Databases, caches and other uninstrumented resources
    Terminal,
    Unknown,
}

/// Descriptor for a registered service type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceTypeInfo {
    pub service_type: ServiceType,
    pub name: String,
    pub kind: ServiceKind,
}

/// Registry of known service types
#[derive(Debug, Clone)]
pub struct ServiceTypeRegistry {
    by_code: HashMap<ServiceType, ServiceTypeInfo>,
    by_name: HashMap<String, ServiceType>,
}

impl ServiceTypeRegistry {
    /// Registry preloaded with the built-in service types
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.load_defaults();
        registry
    }

    pub fn empty() -> Self {
        Self {
            by_code: HashMap::new(),
            by_name: HashMap::new(),
        }
    }

    fn load_defaults(&mut self) {
        self.register(ServiceType::UNKNOWN, "UNKNOWN", ServiceKind::Unknown);
        self.register(ServiceType::USER, "USER", ServiceKind::User);
        self.register(ServiceType::STAND_ALONE, "STAND_ALONE", ServiceKind::Server);
        self.register(ServiceType::TOMCAT, "TOMCAT", ServiceKind::Server);
        self.register(ServiceType::BLOC, "BLOC", ServiceKind::Server);
        self.register(ServiceType::UNKNOWN_DB, "UNKNOWN_DB", ServiceKind::Terminal);
        self.register(ServiceType::MYSQL, "MYSQL", ServiceKind::Terminal);
        self.register(ServiceType::ARCUS, "ARCUS", ServiceKind::Terminal);
        self.register(ServiceType::HTTP_CLIENT, "HTTP_CLIENT", ServiceKind::RpcClient);
        self.register(
            ServiceType::JDK_HTTPURLCONNECTOR,
            "JDK_HTTPURLCONNECTOR",
            ServiceKind::RpcClient,
        );
    }

    /// Register (or replace) a service type
    pub fn register(&mut self, service_type: ServiceType, name: &str, kind: ServiceKind) {
        if let Some(previous) = self.by_code.get(&service_type) {
            self.by_name.remove(&previous.name.to_uppercase());
        }
        self.by_name.insert(name.to_uppercase(), service_type);
        self.by_code.insert(
            service_type,
            ServiceTypeInfo {
                service_type,
                name: name.to_string(),
                kind,
            },
        );
    }

    pub fn get(&self, service_type: ServiceType) -> Option<&ServiceTypeInfo> {
        self.by_code.get(&service_type)
    }

    /// Registered service types, ordered by code
    pub fn iter(&self) -> impl Iterator<Item = &ServiceTypeInfo> {
        let mut infos: Vec<&ServiceTypeInfo> = self.by_code.values().collect();
        infos.sort_by_key(|info| info.service_type);
        infos.into_iter()
    }

    /// Look up a service type by name, ignoring case
    pub fn find_by_name(&self, name: &str) -> Option<ServiceType> {
        self.by_name.get(&name.to_uppercase()).copied()
    }

    /// Unregistered codes classify as [`ServiceKind::Unknown`]
    pub fn kind(&self, service_type: ServiceType) -> ServiceKind {
        self.get(service_type)
            .map(|info| info.kind)
            .unwrap_or(ServiceKind::Unknown)
    }

    pub fn is_user_facing(&self, service_type: ServiceType) -> bool {
        self.kind(service_type) == ServiceKind::User
    }

    pub fn is_backend_server(&self, service_type: ServiceType) -> bool {
        self.kind(service_type) == ServiceKind::Server
    }

    pub fn is_rpc_client(&self, service_type: ServiceType) -> bool {
        self.kind(service_type) == ServiceKind::RpcClient
    }

    pub fn is_terminal(&self, service_type: ServiceType) -> bool {
        self.kind(service_type) == ServiceKind::Terminal
    }
}

impl Default for ServiceTypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Identity of a graph node
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Application {
    pub name: String,
    pub service_type: ServiceType,
}

impl Application {
    pub fn new(name: impl Into<String>, service_type: ServiceType) -> Self {
        Self {
            name: name.into(),
            service_type,
        }
    }
}

impl fmt::Display for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.service_type)
    }
}
