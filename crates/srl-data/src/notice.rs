// SPDX-License-Identifier: MIT OR Apache-2.0
//! Change notices emitted towards the host application.

use srl_core::ScenePath;

/// An observable change produced while applying remote frames or by
/// session lifecycle transitions.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    /// A prim changed. `resynced` asks the host for a full re-read of
    /// the prim rather than a field-level refresh.
    PrimitiveChanged {
        /// The changed prim.
        path: ScenePath,
        /// Whether the prim needs a full resync.
        resynced: bool,
    },
    /// The editing owner recorded in a prim's `customData` changed.
    OwnerChanged {
        /// The affected prim.
        path: ScenePath,
        /// The new owner, `None` when released.
        owner: Option<String>,
    },
    /// The live connection went up (history replay finished) or down.
    LiveConnectionChanged(bool),
    /// A layer's shared history was reset.
    LayerReloaded {
        /// Identifier of the reloaded layer.
        layer: String,
    },
}

impl Notice {
    /// Build a primitive-changed notice, collapsing property paths to
    /// their prim. Returns `None` for paths that cannot name a prim
    /// (the absolute root, the null path).
    #[must_use]
    pub fn primitive_changed(path: &ScenePath, resynced: bool) -> Option<Notice> {
        let prim = if path.is_prim_path() {
            path.clone()
        } else {
            path.prim_path()
        };
        if !prim.is_prim_path() || prim.is_absolute_root() {
            return None;
        }
        Some(Notice::PrimitiveChanged {
            path: prim,
            resynced,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn property_paths_collapse_to_prim() {
        let path = ScenePath::new("/World/Cube.size").unwrap();
        match Notice::primitive_changed(&path, false) {
            Some(Notice::PrimitiveChanged { path, resynced }) => {
                assert_eq!(path.as_str(), "/World/Cube");
                assert!(!resynced);
            }
            other => panic!("expected a primitive notice, got {other:?}"),
        }
    }

    #[test]
    fn root_and_null_paths_are_invalid() {
        assert_eq!(
            Notice::primitive_changed(&ScenePath::absolute_root(), true),
            None
        );
        assert_eq!(Notice::primitive_changed(&ScenePath::default(), true), None);
    }
}
