//! Data-driven capability table.
//!
//! Maps an upstream device `kind` string to the capability tags and
//! attribute names a bridged unit of that kind exposes. The built-in set
//! covers the common kinds; deployments can extend or replace rows with a
//! declarative list (e.g. loaded from JSON) instead of compiling new code.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// What a bridged unit can do, looked up by tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityTag {
    OnOff,
    Level,
    ColorTemperature,
    Sensor,
    Button,
    /// Composed parent aggregating its members.
    Aggregate,
    /// Deployment-specific capability.
    Custom(String),
}

/// One row of the table: a device kind and what it exposes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityRow {
    /// Upstream descriptor `kind` this row applies to.
    pub kind: String,
    /// Capability tags of units of this kind.
    pub capabilities: Vec<CapabilityTag>,
    /// Attribute names carried by units of this kind.
    pub attributes: Vec<String>,
}

/// Lookup table from descriptor kind to capabilities.
#[derive(Debug, Clone)]
pub struct CapabilityTable {
    rows: HashMap<String, CapabilityRow>,
}

impl CapabilityTable {
    /// The built-in kinds.
    pub fn builtin() -> Self {
        Self::from_rows(vec![
            CapabilityRow {
                kind: "onoff".to_string(),
                capabilities: vec![CapabilityTag::OnOff],
                attributes: vec!["on".to_string()],
            },
            CapabilityRow {
                kind: "light".to_string(),
                capabilities: vec![CapabilityTag::OnOff, CapabilityTag::Level],
                attributes: vec!["on".to_string(), "brightness".to_string()],
            },
            CapabilityRow {
                kind: "ctlight".to_string(),
                capabilities: vec![
                    CapabilityTag::OnOff,
                    CapabilityTag::Level,
                    CapabilityTag::ColorTemperature,
                ],
                attributes: vec![
                    "on".to_string(),
                    "brightness".to_string(),
                    "colortemp".to_string(),
                ],
            },
            CapabilityRow {
                kind: "sensor".to_string(),
                capabilities: vec![CapabilityTag::Sensor],
                attributes: vec!["value".to_string()],
            },
            CapabilityRow {
                kind: "button".to_string(),
                capabilities: vec![CapabilityTag::Button],
                attributes: vec!["pressed".to_string()],
            },
        ])
    }

    pub fn from_rows(rows: Vec<CapabilityRow>) -> Self {
        Self {
            rows: rows.into_iter().map(|r| (r.kind.clone(), r)).collect(),
        }
    }

    /// Add or replace rows, keeping the rest.
    pub fn extend(&mut self, rows: Vec<CapabilityRow>) {
        for row in rows {
            self.rows.insert(row.kind.clone(), row);
        }
    }

    pub fn row(&self, kind: &str) -> Option<&CapabilityRow> {
        self.rows.get(kind)
    }

    /// Capability tags for a kind; an unknown kind yields a single custom
    /// tag so the unit is still installable, just featureless.
    pub fn capabilities_for(&self, kind: &str) -> Vec<CapabilityTag> {
        match self.rows.get(kind) {
            Some(row) => row.capabilities.clone(),
            None => vec![CapabilityTag::Custom(kind.to_string())],
        }
    }
}

impl Default for CapabilityTable {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_kinds() {
        let table = CapabilityTable::builtin();
        let caps = table.capabilities_for("light");
        assert!(caps.contains(&CapabilityTag::OnOff));
        assert!(caps.contains(&CapabilityTag::Level));
    }

    #[test]
    fn test_unknown_kind_degrades_to_custom() {
        let table = CapabilityTable::builtin();
        assert_eq!(
            table.capabilities_for("fogmachine"),
            vec![CapabilityTag::Custom("fogmachine".to_string())]
        );
    }

    #[test]
    fn test_rows_load_from_json() {
        let rows: Vec<CapabilityRow> = serde_json::from_str(
            r#"[{"kind": "valve", "capabilities": ["on_off"], "attributes": ["on"]}]"#,
        )
        .unwrap();
        let mut table = CapabilityTable::builtin();
        table.extend(rows);
        assert_eq!(table.capabilities_for("valve"), vec![CapabilityTag::OnOff]);
    }
}
