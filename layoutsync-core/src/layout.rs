//! Layout documents and their identifiers.
//!
//! A layout is a user-authored workspace configuration. The `data` payload is
//! opaque to this crate and carried as JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur when parsing a layout identifier
#[derive(Error, Debug)]
pub enum LayoutIdError {
    #[error("Invalid layout ID '{0}': {1}")]
    Invalid(String, uuid::Error),
}

/// Stable identifier of a layout, shared by local and remote copies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayoutId(Uuid);

impl LayoutId {
    /// Generate a new random layout ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for LayoutId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for LayoutId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for LayoutId {
    type Err = LayoutIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|e| LayoutIdError::Invalid(s.to_string(), e))
    }
}

/// A layout document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layout {
    pub id: LayoutId,
    pub name: String,
    pub data: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

impl Layout {
    /// Creates a new layout with a fresh ID.
    pub fn new(name: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            id: LayoutId::new(),
            name: name.into(),
            data,
            updated_at: Utc::now(),
        }
    }
}

/// Input for creating a layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewLayout {
    pub name: String,
    pub data: serde_json::Value,
}

impl NewLayout {
    pub fn new(name: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }
}

/// Partial update of an existing layout. `None` fields are left unchanged.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LayoutUpdate {
    pub id: LayoutId,
    pub name: Option<String>,
    pub data: Option<serde_json::Value>,
}

impl LayoutUpdate {
    /// Applies this update to a layout, bumping its modification time.
    pub fn apply_to(&self, layout: &mut Layout) {
        if let Some(name) = &self.name {
            layout.name = name.clone();
        }
        if let Some(data) = &self.data {
            layout.data = data.clone();
        }
        layout.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_layout_id_parse_display() {
        let id = LayoutId::new();
        let parsed: LayoutId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_layout_id_invalid() {
        let err = "not-a-uuid".parse::<LayoutId>().unwrap_err();
        assert!(err.to_string().contains("not-a-uuid"));
    }

    #[test]
    fn test_layout_id_serializes_as_string() {
        let id = LayoutId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id));
    }

    #[test]
    fn test_update_applies_only_present_fields() {
        let mut layout = Layout::new("Original", json!({"panels": 1}));
        let before = layout.updated_at;

        let update = LayoutUpdate {
            id: layout.id,
            name: Some("Renamed".to_string()),
            data: None,
        };
        update.apply_to(&mut layout);

        assert_eq!(layout.name, "Renamed");
        assert_eq!(layout.data, json!({"panels": 1}));
        assert!(layout.updated_at >= before);
    }
}
