//! Differences: typed pairings of source and target nodes

use serde::{Deserialize, Serialize};

use crate::model::NodeKind;

/// How a paired element moved between the two models.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    pub created: bool,
    pub removed: bool,
    pub name_changed: bool,
    pub property_changed: bool,
}

impl Movement {
    pub fn created() -> Self {
        Movement {
            created: true,
            ..Default::default()
        }
    }

    pub fn removed() -> Self {
        Movement {
            removed: true,
            ..Default::default()
        }
    }

    pub fn renamed() -> Self {
        Movement {
            name_changed: true,
            ..Default::default()
        }
    }

    pub fn changed() -> Self {
        Movement {
            property_changed: true,
            ..Default::default()
        }
    }

    /// A removal and a creation on the same path: the element is being
    /// recreated, which for a table means its rows do not survive.
    pub fn recreated() -> Self {
        Movement {
            created: true,
            removed: true,
            ..Default::default()
        }
    }
}

/// One structural divergence: a source node, a target node, or a pairing
/// of both, with the movement that relates them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Difference {
    pub kind: NodeKind,
    /// Path in the source model, absent for pure creations.
    pub source_path: Option<String>,
    /// Path in the target model, absent for pure removals.
    pub target_path: Option<String>,
    pub movement: Movement,
}

impl Difference {
    pub fn created(kind: NodeKind, target_path: impl Into<String>) -> Self {
        Difference {
            kind,
            source_path: None,
            target_path: Some(target_path.into()),
            movement: Movement::created(),
        }
    }

    pub fn removed(kind: NodeKind, source_path: impl Into<String>) -> Self {
        Difference {
            kind,
            source_path: Some(source_path.into()),
            target_path: None,
            movement: Movement::removed(),
        }
    }

    pub fn paired(
        kind: NodeKind,
        source_path: impl Into<String>,
        target_path: impl Into<String>,
        movement: Movement,
    ) -> Self {
        Difference {
            kind,
            source_path: Some(source_path.into()),
            target_path: Some(target_path.into()),
            movement,
        }
    }
}
