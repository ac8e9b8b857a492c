//! Product resolution: match deployment metadata to a registered variant.
//!
//! Absence is a normal outcome, never an error: a hostname that matches no
//! system entry, or a product name no variant claims, resolves to `None`.

use tracing::{debug, trace};

use scout_common::{DeploymentMetadata, Result};

use crate::product::{Product, ProductRegistry};

/// Resolve the product a target plays within a deployment.
///
/// Scans `metadata.systems` for an entry whose `system_id` equals
/// `hostname`, then walks the registry in registration order and builds an
/// instance from the first variant whose name equals the case-folded
/// product field. Later variants are never tried once one matches.
pub fn resolve(
    registry: &ProductRegistry,
    metadata: &DeploymentMetadata,
    hostname: Option<&str>,
) -> Result<Option<Product>> {
    let Some(hostname) = hostname else {
        return Ok(None);
    };

    let Some(entry) = metadata.system_for(hostname) else {
        trace!(hostname, "no system entry matches hostname");
        return Ok(None);
    };

    // Empty or absent product matches nothing; variant names are non-empty.
    let Some(key) = metadata.product_key() else {
        return Ok(None);
    };

    for descriptor in registry.descriptors() {
        if descriptor.name == key {
            let product = (descriptor.build)(entry)?;
            debug!(
                product = descriptor.name,
                hostname,
                role = product.role(),
                "resolved product"
            );
            return Ok(Some(product));
        }
    }

    trace!(product = %key, "no registered variant claims product");
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(json: &str) -> DeploymentMetadata {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_resolves_rhev_manager() {
        let md = metadata(
            r#"{"product": "rhev", "systems": [{"system_id": "node1", "type": "Manager"}]}"#,
        );
        let product = resolve(&ProductRegistry::builtin(), &md, Some("node1"))
            .unwrap()
            .unwrap();
        assert_eq!(product.name(), "rhev");
        assert_eq!(product.role(), Some("Manager"));
        assert!(product.is_present());
        assert!(product.is_parent());
    }

    #[test]
    fn test_product_match_is_case_insensitive() {
        let md = metadata(
            r#"{"product": "RHEV", "systems": [{"system_id": "node1", "type": "Manager"}]}"#,
        );
        let product = resolve(&ProductRegistry::builtin(), &md, Some("node1")).unwrap();
        assert_eq!(product.unwrap().name(), "rhev");
    }

    #[test]
    fn test_unmatched_hostname_resolves_to_none() {
        let md = metadata(
            r#"{"product": "rhev", "systems": [{"system_id": "node1", "type": "Manager"}]}"#,
        );
        let registry = ProductRegistry::builtin();
        assert!(resolve(&registry, &md, Some("node9")).unwrap().is_none());
        assert!(resolve(&registry, &md, None).unwrap().is_none());
    }

    #[test]
    fn test_empty_metadata_resolves_to_none() {
        let md = DeploymentMetadata::default();
        let resolved = resolve(&ProductRegistry::builtin(), &md, Some("node1")).unwrap();
        assert!(resolved.is_none());
    }

    #[test]
    fn test_empty_product_matches_nothing() {
        let md = metadata(r#"{"product": "", "systems": [{"system_id": "node1"}]}"#);
        let resolved = resolve(&ProductRegistry::builtin(), &md, Some("node1")).unwrap();
        assert!(resolved.is_none());
    }

    #[test]
    fn test_unknown_product_resolves_to_none() {
        let md = metadata(
            r#"{"product": "xen", "systems": [{"system_id": "node1", "type": "host"}]}"#,
        );
        let resolved = resolve(&ProductRegistry::builtin(), &md, Some("node1")).unwrap();
        assert!(resolved.is_none());
    }

    #[test]
    fn test_unrecognized_entry_fields_are_preserved() {
        let md = metadata(
            r#"{"product": "osp", "systems":
                [{"system_id": "ctl0", "type": "Director", "region": "east"}]}"#,
        );
        let product = resolve(&ProductRegistry::builtin(), &md, Some("ctl0"))
            .unwrap()
            .unwrap();
        match product {
            Product::Osp(ref node) => {
                assert_eq!(node.extra.get("region").unwrap(), "east");
            }
            other => panic!("expected osp, got {other:?}"),
        }
    }

    #[test]
    fn test_conflicting_role_fields_fail_loudly() {
        let md = metadata(
            r#"{"product": "docker", "systems":
                [{"system_id": "node1", "role": "container", "type": "host"}]}"#,
        );
        let err = resolve(&ProductRegistry::builtin(), &md, Some("node1")).unwrap_err();
        assert!(matches!(err, scout_common::Error::RoleConflict { .. }));
    }

    #[test]
    fn test_resolves_rhel_release() {
        let md = metadata(
            r#"{"product": "rhel", "systems":
                [{"system_id": "host1", "version": ["7", "3"], "release": "7.3"}]}"#,
        );
        let product = resolve(&ProductRegistry::builtin(), &md, Some("host1"))
            .unwrap()
            .unwrap();
        assert_eq!(product.name(), "rhel");
        assert!(product.is_present());
    }
}
