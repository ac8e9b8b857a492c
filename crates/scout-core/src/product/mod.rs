//! Product variants and the process-wide product registry.
//!
//! A product names the virtualization/orchestration/OS category a target
//! belongs to, and for multi-node deployments the role the target plays
//! within it. Presence is an explicit predicate: a resolved instance whose
//! identifying attributes are still defaults is treated as absent by
//! callers.
//!
//! Variants register into an ordered registry. Resolution iterates in
//! registration order and short-circuits on the first name match, so names
//! must be unique across the registry. Re-registering a name is not
//! guarded; callers must not register the same name twice.

pub mod resolve;

pub use resolve::resolve;

use std::collections::BTreeMap;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use scout_common::{Result, SystemEntry};

/// Sentinel version pair for an unidentified OS release.
pub const UNKNOWN_VERSION: [&str; 2] = ["-1", "-1"];

/// Returns the unknown-version sentinel as owned strings.
pub fn unknown_version() -> [String; 2] {
    [UNKNOWN_VERSION[0].to_string(), UNKNOWN_VERSION[1].to_string()]
}

/// Data carried by the multi-node product variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiNode {
    /// Position of the target in the deployment topology, e.g. "Manager".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    /// Role the parent node of the topology carries.
    pub parent_role: String,

    /// System-entry fields this core does not interpret.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl MultiNode {
    /// Build from a matched system entry; `type` aliases into the role.
    pub fn from_entry(entry: &SystemEntry, parent_role: &str) -> Result<Self> {
        Ok(MultiNode {
            role: entry.effective_role()?,
            parent_role: parent_role.to_string(),
            extra: entry.extra.clone(),
        })
    }

    /// A multi-node product is present iff it carries a non-empty role.
    pub fn is_present(&self) -> bool {
        self.role.as_deref().is_some_and(|r| !r.is_empty())
    }

    /// Whether this target is the parent node of its topology.
    pub fn is_parent(&self) -> bool {
        self.role.as_deref() == Some(self.parent_role.as_str())
    }
}

/// Data carried by the base-OS release variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OsRelease {
    /// Major/minor version pair; defaults to the unknown sentinel.
    pub version: [String; 2],

    /// Release string, e.g. "7.3".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release: Option<String>,
}

impl Default for OsRelease {
    fn default() -> Self {
        OsRelease {
            version: unknown_version(),
            release: None,
        }
    }
}

impl OsRelease {
    /// Build from a matched system entry, reading the optional `version`
    /// pair and `release` string it carries.
    pub fn from_entry(entry: &SystemEntry) -> Self {
        let version = entry
            .extra
            .get("version")
            .and_then(|v| v.as_array())
            .and_then(|parts| {
                let major = parts.first()?.as_str()?;
                let minor = parts.get(1)?.as_str()?;
                Some([major.to_string(), minor.to_string()])
            })
            .unwrap_or_else(unknown_version);

        OsRelease {
            version,
            release: entry.extra_str("release").map(str::to_string),
        }
    }

    /// Present iff the version differs from the unknown sentinel AND a
    /// release is set.
    pub fn is_present(&self) -> bool {
        self.version != unknown_version()
            && self.release.as_deref().is_some_and(|r| !r.is_empty())
    }
}

/// A resolved product instance, tagged by variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "product", rename_all = "snake_case")]
pub enum Product {
    /// Container platform.
    Docker(MultiNode),
    /// Cloud orchestrator.
    Osp(MultiNode),
    /// Virtualization manager.
    Rhev(MultiNode),
    /// Base OS release.
    Rhel(OsRelease),
}

impl Product {
    /// The registry name identifying this variant.
    pub fn name(&self) -> &'static str {
        match self {
            Product::Docker(_) => names::DOCKER,
            Product::Osp(_) => names::OSP,
            Product::Rhev(_) => names::RHEV,
            Product::Rhel(_) => names::RHEL,
        }
    }

    /// The role this target plays, for multi-node variants.
    pub fn role(&self) -> Option<&str> {
        match self {
            Product::Docker(p) | Product::Osp(p) | Product::Rhev(p) => p.role.as_deref(),
            Product::Rhel(_) => None,
        }
    }

    /// Explicit presence predicate; callers treat a product as a
    /// boolean-like flag through this, never through a default instance.
    pub fn is_present(&self) -> bool {
        match self {
            Product::Docker(p) | Product::Osp(p) | Product::Rhev(p) => p.is_present(),
            Product::Rhel(r) => r.is_present(),
        }
    }

    /// Whether this target is the parent node of a multi-node topology.
    pub fn is_parent(&self) -> bool {
        match self {
            Product::Docker(p) | Product::Osp(p) | Product::Rhev(p) => p.is_parent(),
            Product::Rhel(_) => false,
        }
    }
}

/// Registry names of the built-in variants.
pub mod names {
    pub const DOCKER: &str = "docker";
    pub const OSP: &str = "osp";
    pub const RHEV: &str = "rhev";
    pub const RHEL: &str = "rhel";
}

/// Describes one product variant to the registry.
pub struct ProductDescriptor {
    /// Unique match key, compared against the case-folded metadata product.
    pub name: &'static str,

    /// Parent role of the topology, for multi-node variants.
    pub parent_role: Option<&'static str>,

    /// Builds an instance from the matched system entry.
    pub build: fn(&SystemEntry) -> Result<Product>,
}

impl std::fmt::Debug for ProductDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProductDescriptor")
            .field("name", &self.name)
            .field("parent_role", &self.parent_role)
            .finish()
    }
}

/// Ordered, append-only catalog of product variants.
///
/// Populated once before the first `Context` is constructed; read-many
/// thereafter. A parallel name list is kept for fast existence checks in
/// registration order.
#[derive(Debug, Default)]
pub struct ProductRegistry {
    descriptors: Vec<ProductDescriptor>,
    names: Vec<&'static str>,
}

impl ProductRegistry {
    /// An empty registry, for callers assembling their own variant set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in variants in their canonical order.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(ProductDescriptor {
            name: names::DOCKER,
            parent_role: Some("host"),
            build: |entry| Ok(Product::Docker(MultiNode::from_entry(entry, "host")?)),
        });
        registry.register(ProductDescriptor {
            name: names::OSP,
            parent_role: Some("Director"),
            build: |entry| Ok(Product::Osp(MultiNode::from_entry(entry, "Director")?)),
        });
        registry.register(ProductDescriptor {
            name: names::RHEV,
            parent_role: Some("Manager"),
            build: |entry| Ok(Product::Rhev(MultiNode::from_entry(entry, "Manager")?)),
        });
        registry.register(ProductDescriptor {
            name: names::RHEL,
            parent_role: None,
            build: |entry| Ok(Product::Rhel(OsRelease::from_entry(entry))),
        });
        registry
    }

    /// Append a variant. Precondition: `descriptor.name` is not already
    /// registered; duplicates make resolution ambiguous (first wins).
    pub fn register(&mut self, descriptor: ProductDescriptor) {
        self.names.push(descriptor.name);
        self.descriptors.push(descriptor);
    }

    /// Variant names in registration order.
    pub fn names(&self) -> &[&'static str] {
        &self.names
    }

    /// Variant descriptors in registration order.
    pub fn descriptors(&self) -> &[ProductDescriptor] {
        &self.descriptors
    }

    /// Fast existence check against the name list.
    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| *n == name)
    }
}

/// The process-wide registry, frozen on first use.
pub fn registry() -> &'static ProductRegistry {
    static REGISTRY: OnceLock<ProductRegistry> = OnceLock::new();
    REGISTRY.get_or_init(ProductRegistry::builtin)
}
