// /////////////////////////////////////////////////////////////////////////////
// Elspeth
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Plugin Schema Compatibility
//!
//! Each plugin declares its field contract in two categories:
//!
//! - **guaranteed_fields**: the stable API contract. Downstream plugins
//!   may depend on these.
//! - **audit_fields**: provenance annotations that may change between
//!   plugin versions. The graph build must NOT let anything depend on
//!   them.
//!
//! A consumer's `required_fields` must be a subset of the effective
//! guaranteed fields flowing into it. Violations are configuration errors
//! detected at graph build, never at row time.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::EngineError;
use crate::services::canonical;

/// A plugin's declared field contract.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PluginSchema {
    /// Fields the plugin guarantees on its output. Stable API.
    #[serde(default)]
    pub guaranteed_fields: Vec<String>,
    /// Provenance fields; may change between versions, never load-bearing.
    #[serde(default)]
    pub audit_fields: Vec<String>,
    /// Fields the plugin requires on its input.
    #[serde(default)]
    pub required_fields: Vec<String>,
}

impl PluginSchema {
    /// A schema with no declarations; compatible with anything.
    pub fn permissive() -> Self {
        PluginSchema::default()
    }

    /// Canonical hash of the schema, stored on the node at registration.
    pub fn schema_hash(&self) -> Result<String, EngineError> {
        canonical::canonical_hash(&serde_json::to_value(self)?)
    }
}

/// Validates the field contract along a linear chain of plugins.
///
/// `chain` is ordered source-first. The effective guaranteed set starts
/// from the source's guarantees and is replaced by each producer's
/// guarantees in turn (a transform's output is its own contract). Each
/// consumer's `required_fields` is checked against the effective set
/// flowing into it.
pub fn validate_chain(chain: &[(&str, &PluginSchema)]) -> Result<(), EngineError> {
    let mut effective: Option<BTreeSet<&str>> = None;

    for (name, schema) in chain {
        if let Some(upstream) = &effective {
            let missing: Vec<&str> = schema
                .required_fields
                .iter()
                .map(String::as_str)
                .filter(|f| !upstream.contains(*f))
                .collect();
            if !missing.is_empty() {
                return Err(EngineError::SchemaViolation {
                    node: (*name).to_string(),
                    detail: format!(
                        "required fields not guaranteed upstream: {}",
                        missing.join(", ")
                    ),
                });
            }
        }

        // A producer with no declared guarantees passes the upstream set
        // through unchanged; one with guarantees replaces it.
        if !schema.guaranteed_fields.is_empty() {
            effective = Some(schema.guaranteed_fields.iter().map(String::as_str).collect());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema(guaranteed: &[&str], required: &[&str]) -> PluginSchema {
        PluginSchema {
            guaranteed_fields: guaranteed.iter().map(|s| s.to_string()).collect(),
            audit_fields: Vec::new(),
            required_fields: required.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn satisfied_chain_passes() {
        let source = schema(&["value", "id"], &[]);
        let transform = schema(&["value", "doubled"], &["value"]);
        let sink = schema(&[], &["doubled"]);
        assert!(validate_chain(&[
            ("source", &source),
            ("double", &transform),
            ("sink", &sink)
        ])
        .is_ok());
    }

    #[test]
    fn missing_requirement_is_a_config_error() {
        let source = schema(&["value"], &[]);
        let sink = schema(&[], &["nonexistent"]);
        let err = validate_chain(&[("source", &source), ("sink", &sink)]).unwrap_err();
        assert!(matches!(err, EngineError::SchemaViolation { .. }));
        assert!(err.to_string().contains("nonexistent"));
    }

    #[test]
    fn audit_fields_are_not_load_bearing() {
        // A field only present in audit_fields upstream cannot satisfy a
        // requirement.
        let mut source = schema(&["value"], &[]);
        source.audit_fields = vec!["provenance".to_string()];
        let sink = schema(&[], &["provenance"]);
        assert!(validate_chain(&[("source", &source), ("sink", &sink)]).is_err());
    }

    #[test]
    fn undeclared_producer_passes_upstream_through() {
        let source = schema(&["value"], &[]);
        let passthrough = PluginSchema::permissive();
        let sink = schema(&[], &["value"]);
        assert!(validate_chain(&[
            ("source", &source),
            ("pass", &passthrough),
            ("sink", &sink)
        ])
        .is_ok());
    }

    #[test]
    fn schema_hash_is_stable() {
        let a = schema(&["x"], &["y"]);
        let b = schema(&["x"], &["y"]);
        assert_eq!(a.schema_hash().unwrap(), b.schema_hash().unwrap());
    }
}
