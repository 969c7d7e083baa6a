// /////////////////////////////////////////////////////////////////////////////
// Elspeth
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Audit Entity Identifiers
//!
//! One typed identifier per audit entity, all built on
//! [`GenericId`](super::generic_id::GenericId). A `TokenId` cannot be passed
//! where a `RowId` is expected; every identifier stores as a ULID string.

use super::generic_id::{GenericId, IdCategory};

macro_rules! declare_id {
    ($(#[$doc:meta])* $marker:ident, $alias:ident, $name:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $marker;

        impl IdCategory for $marker {
            fn category_name() -> &'static str {
                $name
            }
        }

        $(#[$doc])*
        pub type $alias = GenericId<$marker>;
    };
}

declare_id!(
    /// Identifier of a single engine run.
    RunMarker, RunId, "run"
);
declare_id!(
    /// Identifier of a registered graph node.
    NodeMarker, NodeId, "node"
);
declare_id!(
    /// Identifier of a registered graph edge.
    EdgeMarker, EdgeId, "edge"
);
declare_id!(
    /// Identifier of a source row (the unit of identity).
    RowMarker, RowId, "row"
);
declare_id!(
    /// Identifier of a token (the unit of flow).
    TokenMarker, TokenId, "token"
);
declare_id!(
    /// Identifier of a per-(token, node, attempt) node-state.
    StateMarker, StateId, "state"
);
declare_id!(
    /// Identifier of a routing event.
    RoutingEventMarker, RoutingEventId, "routing_event"
);
declare_id!(
    /// Identifier of an aggregation batch.
    BatchMarker, BatchId, "batch"
);
declare_id!(
    /// Identifier of a checkpoint.
    CheckpointMarker, CheckpointId, "checkpoint"
);
declare_id!(
    /// Identifier of a sink artifact.
    ArtifactMarker, ArtifactId, "artifact"
);
declare_id!(
    /// Identifier of a recorded external call.
    CallMarker, CallId, "call"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_are_distinct() {
        assert_eq!(RunId::new().category(), "run");
        assert_eq!(TokenId::new().category(), "token");
        assert_eq!(StateId::new().category(), "state");
    }

    #[test]
    fn serde_round_trip_is_transparent() {
        let id = RowId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id));
        let back: RowId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}
