//! Deployment metadata supplied by the collection driver.
//!
//! The metadata blob names at most one product and lists the systems that
//! make up the deployment. Product resolution matches a target's hostname
//! against the `system_id` of each entry. Known fields are typed; anything
//! else an entry carries is preserved in an open extension map rather than
//! dropped.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Externally supplied deployment description.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeploymentMetadata {
    /// Product name, matched case-insensitively against the registry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,

    /// System entries, one per node of the deployment.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub systems: Vec<SystemEntry>,
}

impl DeploymentMetadata {
    /// Find the entry whose `system_id` equals `hostname`, first match wins.
    pub fn system_for(&self, hostname: &str) -> Option<&SystemEntry> {
        self.systems.iter().find(|s| s.system_id == hostname)
    }

    /// Case-folded product match key, or `None` when absent or empty.
    pub fn product_key(&self) -> Option<String> {
        self.product
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(str::to_lowercase)
    }
}

/// One system of a multi-node deployment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemEntry {
    /// Identifier matched against the target's hostname.
    pub system_id: String,

    /// Node type; when present it aliases into the product role.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub node_type: Option<String>,

    /// Explicit role, used when no `type` is given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    /// Fields this core does not interpret, preserved verbatim.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl SystemEntry {
    /// The role this entry assigns to its system.
    ///
    /// `type` aliases into the role. An entry carrying both `role` and
    /// `type` with disagreeing values is rejected rather than silently
    /// letting one overwrite the other.
    pub fn effective_role(&self) -> Result<Option<String>> {
        match (self.role.as_deref(), self.node_type.as_deref()) {
            (Some(role), Some(node_type)) if role != node_type => Err(Error::RoleConflict {
                system_id: self.system_id.clone(),
                role: role.to_string(),
                node_type: node_type.to_string(),
            }),
            (_, Some(node_type)) => Ok(Some(node_type.to_string())),
            (Some(role), None) => Ok(Some(role.to_string())),
            (None, None) => Ok(None),
        }
    }

    /// Look up an uninterpreted field as a string, if present.
    pub fn extra_str(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(|v| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DeploymentMetadata {
        serde_json::from_str(
            r#"{
                "product": "RHEV",
                "systems": [
                    {"system_id": "node1", "type": "Manager", "links": ["a", "b"]},
                    {"system_id": "node2", "role": "host"}
                ]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_system_for_matches_hostname() {
        let md = sample();
        assert_eq!(md.system_for("node2").unwrap().system_id, "node2");
        assert!(md.system_for("node3").is_none());
    }

    #[test]
    fn test_product_key_case_folds() {
        let md = sample();
        assert_eq!(md.product_key().as_deref(), Some("rhev"));

        let empty: DeploymentMetadata = serde_json::from_str(r#"{"product": ""}"#).unwrap();
        assert!(empty.product_key().is_none());
        assert!(DeploymentMetadata::default().product_key().is_none());
    }

    #[test]
    fn test_unknown_fields_preserved() {
        let md = sample();
        let entry = md.system_for("node1").unwrap();
        assert!(entry.extra.contains_key("links"));
        assert!(entry.extra_str("links").is_none());
    }

    #[test]
    fn test_effective_role_aliases_type() {
        let md = sample();
        assert_eq!(
            md.system_for("node1").unwrap().effective_role().unwrap(),
            Some("Manager".to_string())
        );
        assert_eq!(
            md.system_for("node2").unwrap().effective_role().unwrap(),
            Some("host".to_string())
        );
    }

    #[test]
    fn test_conflicting_role_fields_rejected() {
        let entry: SystemEntry = serde_json::from_str(
            r#"{"system_id": "node1", "role": "host", "type": "Manager"}"#,
        )
        .unwrap();
        let err = entry.effective_role().unwrap_err();
        assert!(matches!(err, Error::RoleConflict { .. }));
    }

    #[test]
    fn test_agreeing_role_fields_accepted() {
        let entry: SystemEntry = serde_json::from_str(
            r#"{"system_id": "node1", "role": "Manager", "type": "Manager"}"#,
        )
        .unwrap();
        assert_eq!(entry.effective_role().unwrap(), Some("Manager".to_string()));
    }

    #[test]
    fn test_round_trip_keeps_extra_fields() {
        let md = sample();
        let json = serde_json::to_string(&md).unwrap();
        let back: DeploymentMetadata = serde_json::from_str(&json).unwrap();
        assert!(back.system_for("node1").unwrap().extra.contains_key("links"));
    }
}
