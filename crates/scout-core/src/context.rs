//! The per-target `Context` handed to parsers.
//!
//! A context binds together a content source, the detected product/role,
//! and provenance fields for one inspected target. It is constructed once
//! per target through [`ContextBuilder`], performs no I/O, and is immutable
//! afterwards. Construction triggers product resolution unless a caller
//! injects a pre-built product for a slot, which bypasses resolution for
//! that variant.

use chrono::{DateTime, Utc};
use tracing::warn;

use scout_common::{DeploymentMetadata, Result};

use crate::product::{self, resolve, unknown_version, Product, ProductRegistry};

/// One slot per registered product variant, in registration order.
#[derive(Debug, Clone)]
struct ProductSlot {
    name: &'static str,
    product: Option<Product>,
}

/// Metadata carrier for one inspected target.
#[derive(Debug, Clone)]
pub struct Context {
    version: [String; 2],
    metadata: DeploymentMetadata,
    content: Option<Vec<String>>,
    path: Option<String>,
    hostname: Option<String>,
    release: Option<String>,
    machine_id: Option<String>,
    target: Option<String>,
    last_client_run: Option<DateTime<Utc>>,
    relative_path: Option<String>,
    slots: Vec<ProductSlot>,
}

impl Context {
    pub fn builder() -> ContextBuilder {
        ContextBuilder::default()
    }

    /// Version pair; the unknown sentinel unless supplied.
    pub fn version(&self) -> &[String; 2] {
        &self.version
    }

    pub fn metadata(&self) -> &DeploymentMetadata {
        &self.metadata
    }

    pub fn content(&self) -> Option<&[String]> {
        self.content.as_deref()
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    pub fn hostname(&self) -> Option<&str> {
        self.hostname.as_deref()
    }

    pub fn release(&self) -> Option<&str> {
        self.release.as_deref()
    }

    pub fn machine_id(&self) -> Option<&str> {
        self.machine_id.as_deref()
    }

    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    pub fn last_client_run(&self) -> Option<DateTime<Utc>> {
        self.last_client_run
    }

    pub fn relative_path(&self) -> Option<&str> {
        self.relative_path.as_deref()
    }

    /// The active product: the first non-absent slot in registration
    /// order, or `None` when every slot is absent.
    pub fn product(&self) -> Option<&Product> {
        self.slots.iter().find_map(|slot| slot.product.as_ref())
    }

    /// The product resolved or injected for one variant name.
    pub fn product_named(&self, name: &str) -> Option<&Product> {
        self.slots
            .iter()
            .find(|slot| slot.name == name)
            .and_then(|slot| slot.product.as_ref())
    }

    /// Iterate the product slots in registration order.
    pub fn products(&self) -> impl Iterator<Item = (&'static str, Option<&Product>)> {
        self.slots.iter().map(|slot| (slot.name, slot.product.as_ref()))
    }

    /// Line-by-line view of the target content, empty when none was given.
    pub fn stream(&self) -> impl Iterator<Item = &str> {
        self.content
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(String::as_str)
    }
}

/// Builder for [`Context`]; unset fields default to absent.
#[derive(Debug, Default)]
pub struct ContextBuilder {
    version: Option<[String; 2]>,
    metadata: DeploymentMetadata,
    content: Option<Vec<String>>,
    path: Option<String>,
    hostname: Option<String>,
    release: Option<String>,
    machine_id: Option<String>,
    target: Option<String>,
    last_client_run: Option<DateTime<Utc>>,
    relative_path: Option<String>,
    overrides: Vec<Product>,
}

impl ContextBuilder {
    pub fn version(mut self, major: impl Into<String>, minor: impl Into<String>) -> Self {
        self.version = Some([major.into(), minor.into()]);
        self
    }

    pub fn metadata(mut self, metadata: DeploymentMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn content(mut self, lines: Vec<String>) -> Self {
        self.content = Some(lines);
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    pub fn release(mut self, release: impl Into<String>) -> Self {
        self.release = Some(release.into());
        self
    }

    pub fn machine_id(mut self, machine_id: impl Into<String>) -> Self {
        self.machine_id = Some(machine_id.into());
        self
    }

    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn last_client_run(mut self, at: DateTime<Utc>) -> Self {
        self.last_client_run = Some(at);
        self
    }

    pub fn relative_path(mut self, relative_path: impl Into<String>) -> Self {
        self.relative_path = Some(relative_path.into());
        self
    }

    /// Inject a pre-built product, bypassing resolution for its slot.
    pub fn product(mut self, product: Product) -> Self {
        self.overrides.push(product);
        self
    }

    /// Build against the process-wide registry.
    pub fn build(self) -> Result<Context> {
        self.build_with(product::registry())
    }

    /// Build against an explicit registry; used by tests assembling their
    /// own variant set.
    pub fn build_with(self, registry: &ProductRegistry) -> Result<Context> {
        let mut slots: Vec<ProductSlot> = registry
            .names()
            .iter()
            .map(|&name| ProductSlot {
                name,
                product: None,
            })
            .collect();

        for product in self.overrides {
            match slots.iter_mut().find(|slot| slot.name == product.name()) {
                Some(slot) => slot.product = Some(product),
                None => warn!(
                    product = product.name(),
                    "ignoring injected product with no registered variant"
                ),
            }
        }

        // Injected products win over resolution for their slot.
        if let Some(resolved) = resolve(registry, &self.metadata, self.hostname.as_deref())? {
            if let Some(slot) = slots
                .iter_mut()
                .find(|slot| slot.name == resolved.name() && slot.product.is_none())
            {
                slot.product = Some(resolved);
            }
        }

        Ok(Context {
            version: self.version.unwrap_or_else(unknown_version),
            metadata: self.metadata,
            content: self.content,
            path: self.path,
            hostname: self.hostname,
            release: self.release,
            machine_id: self.machine_id,
            target: self.target,
            last_client_run: self.last_client_run,
            relative_path: self.relative_path,
            slots,
        })
    }
}
