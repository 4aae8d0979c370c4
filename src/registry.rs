//! Static service directory and dependency graph
//!
//! Read-only reference data: which services exist, which category they belong
//! to, and which services they depend on. Loaded once at startup, either from
//! the `[[services]]` tables of the config file or from the built-in default
//! fleet, and never mutated afterwards.

use log::info;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Qualitative impact of a service failing
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum ImpactLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl Default for ImpactLevel {
    fn default() -> Self {
        ImpactLevel::Medium
    }
}

/// One service entry as declared in configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceSpec {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub category: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Tags describing the dependency edges, e.g. "database", "cache", "api"
    #[serde(default)]
    pub dependency_types: Vec<String>,
    #[serde(default)]
    pub impact: ImpactLevel,
}

/// A registered service with its resolved display name
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceInfo {
    pub name: String,
    pub display_name: String,
    pub category: String,
    pub depends_on: Vec<String>,
    pub dependency_types: Vec<String>,
    pub impact: ImpactLevel,
}

/// Dependency view of one service, as exposed to the analysis agent
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceDependency {
    pub service: String,
    pub depends_on: Vec<String>,
    pub dependency_types: Vec<String>,
    pub impact_level: ImpactLevel,
}

/// Read-only lookup of the monitored fleet
#[derive(Debug)]
pub struct ServiceDirectory {
    services: HashMap<String, ServiceInfo>,
}

impl Default for ServiceDirectory {
    fn default() -> Self {
        Self::new(&default_fleet())
    }
}

impl ServiceDirectory {
    /// Build a directory from service specs; an empty spec list falls back to
    /// the built-in default fleet.
    pub fn new(specs: &[ServiceSpec]) -> Self {
        let specs = if specs.is_empty() {
            default_fleet()
        } else {
            specs.to_vec()
        };

        let services: HashMap<String, ServiceInfo> = specs
            .into_iter()
            .map(|spec| {
                let display_name = spec
                    .display_name
                    .clone()
                    .unwrap_or_else(|| titleize(&spec.name));
                (
                    spec.name.clone(),
                    ServiceInfo {
                        name: spec.name,
                        display_name,
                        category: spec.category,
                        depends_on: spec.depends_on,
                        dependency_types: spec.dependency_types,
                        impact: spec.impact,
                    },
                )
            })
            .collect();

        info!("Service directory loaded with {} services", services.len());

        Self { services }
    }

    /// Look up one service by name
    pub fn get(&self, name: &str) -> Option<&ServiceInfo> {
        self.services.get(name)
    }

    /// Category of a service, or "unknown" when the service is not registered
    pub fn category_of(&self, name: &str) -> &str {
        self.services
            .get(name)
            .map(|s| s.category.as_str())
            .unwrap_or("unknown")
    }

    /// All services in a given category
    pub fn services_in_category(&self, category: &str) -> Vec<&ServiceInfo> {
        let mut services: Vec<&ServiceInfo> = self
            .services
            .values()
            .filter(|s| s.category == category)
            .collect();
        services.sort_by(|a, b| a.name.cmp(&b.name));
        services
    }

    /// Dependency view of one service, if it declares any dependencies
    pub fn dependency(&self, name: &str) -> Option<ServiceDependency> {
        self.services.get(name).and_then(|info| {
            if info.depends_on.is_empty() {
                None
            } else {
                Some(ServiceDependency {
                    service: info.name.clone(),
                    depends_on: info.depends_on.clone(),
                    dependency_types: info.dependency_types.clone(),
                    impact_level: info.impact,
                })
            }
        })
    }

    /// Dependency views of every service that declares dependencies
    pub fn dependencies(&self) -> HashMap<String, ServiceDependency> {
        self.services
            .keys()
            .filter_map(|name| self.dependency(name).map(|dep| (name.clone(), dep)))
            .collect()
    }

    /// Services whose dependency list includes the given service
    pub fn dependents_of(&self, name: &str) -> Vec<String> {
        let mut dependents: Vec<String> = self
            .services
            .values()
            .filter(|s| s.depends_on.iter().any(|d| d == name))
            .map(|s| s.name.clone())
            .collect();
        dependents.sort();
        dependents
    }

    /// All registered service names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.services.keys().cloned().collect();
        names.sort();
        names
    }

    /// Distinct categories present in the directory, sorted
    pub fn categories(&self) -> Vec<String> {
        let mut categories: Vec<String> = self
            .services
            .values()
            .map(|s| s.category.clone())
            .collect();
        categories.sort();
        categories.dedup();
        categories
    }

    /// Number of registered services
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// True when no services are registered
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

/// "payment_service" -> "Payment Service"
fn titleize(name: &str) -> String {
    name.split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Built-in default fleet used when the config declares no services
fn default_fleet() -> Vec<ServiceSpec> {
    let spec = |name: &str,
                category: &str,
                depends_on: &[&str],
                dependency_types: &[&str],
                impact: ImpactLevel| ServiceSpec {
        name: name.to_string(),
        display_name: None,
        category: category.to_string(),
        depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
        dependency_types: dependency_types.iter().map(|s| s.to_string()).collect(),
        impact,
    };

    vec![
        spec(
            "api_gateway",
            "edge",
            &["auth_service", "order_service", "payment_service"],
            &["api"],
            ImpactLevel::Critical,
        ),
        spec(
            "auth_service",
            "core",
            &["postgres_primary"],
            &["database"],
            ImpactLevel::High,
        ),
        spec(
            "order_service",
            "core",
            &["postgres_primary", "redis_cache", "payment_service"],
            &["database", "cache", "api"],
            ImpactLevel::High,
        ),
        spec(
            "payment_service",
            "core",
            &["postgres_primary", "fraud_screening"],
            &["database", "api"],
            ImpactLevel::High,
        ),
        spec(
            "fraud_screening",
            "ml",
            &["redis_cache"],
            &["cache"],
            ImpactLevel::High,
        ),
        spec(
            "notification_service",
            "messaging",
            &["message_queue"],
            &["messaging"],
            ImpactLevel::Medium,
        ),
        spec(
            "postgres_primary",
            "infrastructure",
            &[],
            &[],
            ImpactLevel::High,
        ),
        spec(
            "redis_cache",
            "infrastructure",
            &[],
            &[],
            ImpactLevel::Medium,
        ),
        spec(
            "message_queue",
            "infrastructure",
            &[],
            &[],
            ImpactLevel::Medium,
        ),
    ]
}
