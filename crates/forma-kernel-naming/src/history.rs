//! Operation history: the identity backbone of persistent naming.
//!
//! Each body carries a record of how its faces came to be: the cap hashes of
//! the sweep that created it, one side-face mapping per profile edge, the
//! profile-edge → sketch-entity table, and `face_hash_to_origin`, which maps
//! every current face hash to the feature/entity that originally produced
//! it. The last map is rewritten through every boolean so faces keep their
//! origin even when their owning body changes hands.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Which sweep produced a body (selects the selector-kind vocabulary).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SweepKind {
    /// Linear sweep.
    Extrude,
    /// Rotational sweep.
    Revolve,
}

/// Structural role of a face within its producing sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FaceRole {
    /// Cap on the far side of the sweep.
    TopCap,
    /// Cap on the profile plane.
    BottomCap,
    /// Lateral face generated by one profile edge.
    Side,
    /// Provenance lost.
    Unknown,
}

/// The origin of one face: which feature produced it and from what.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaceOrigin {
    /// The feature whose sweep produced this face.
    pub source_feature_id: String,
    /// The sketch entity that generated it (side faces).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    /// The face's structural role.
    pub face_type: FaceRole,
    /// The sweep vocabulary of the source feature.
    pub sweep: SweepKind,
}

/// Per-body operation history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationHistory {
    /// The sweep that created this body, if it came from one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sweep: Option<SweepKind>,
    /// Topology hash of the cap on the profile plane.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bottom_cap_hash: Option<u32>,
    /// Topology hash of the far cap.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_cap_hash: Option<u32>,
    /// `(profile edge index, generated face hash)` in profile order.
    #[serde(default)]
    pub side_face_mappings: Vec<(usize, u32)>,
    /// Profile edge index → sketch entity identifier.
    #[serde(default)]
    pub profile_edge_to_entity_id: BTreeMap<usize, String>,
    /// Current face hash → origin. Updated through every boolean.
    #[serde(default)]
    pub face_hash_to_origin: BTreeMap<u32, FaceOrigin>,
    /// Loop identifier of the generating profile.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_loop_id: Option<String>,
}

impl OperationHistory {
    /// The profile edge index recorded for a side-face hash, if any.
    pub fn side_index_for_hash(&self, hash: u32) -> Option<usize> {
        self.side_face_mappings
            .iter()
            .find(|(_, h)| *h == hash)
            .map(|(i, _)| *i)
    }
}

/// One per-face record emitted by the boolean evaluator: which input face
/// (by hash, in its input body) produced which output faces.
#[derive(Debug, Clone, PartialEq)]
pub struct BooleanFaceRecord {
    /// Hash of the source face in its input body.
    pub input_hash: u32,
    /// True if the source face came from the tool body.
    pub from_tool: bool,
    /// Hashes of the faces it produced in the result body.
    pub output_hashes: Vec<u32>,
    /// True if the face was consumed with no output.
    pub deleted: bool,
}

/// Merge two bodies' histories through a boolean.
///
/// The merged body keeps the base's sweep metadata and entry identity. For
/// `face_hash_to_origin`, base records are written first; tool records only
/// fill slots the base left empty.
pub fn merge_through_boolean(
    base: &OperationHistory,
    tool: &OperationHistory,
    records: &[BooleanFaceRecord],
) -> OperationHistory {
    let mut merged = base.clone();
    merged.face_hash_to_origin = BTreeMap::new();

    for record in records.iter().filter(|r| !r.from_tool && !r.deleted) {
        if let Some(origin) = base.face_hash_to_origin.get(&record.input_hash) {
            for &out in &record.output_hashes {
                merged.face_hash_to_origin.insert(out, origin.clone());
            }
        }
    }
    for record in records.iter().filter(|r| r.from_tool && !r.deleted) {
        if let Some(origin) = tool.face_hash_to_origin.get(&record.input_hash) {
            for &out in &record.output_hashes {
                merged
                    .face_hash_to_origin
                    .entry(out)
                    .or_insert_with(|| origin.clone());
            }
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin(feature: &str, role: FaceRole) -> FaceOrigin {
        FaceOrigin {
            source_feature_id: feature.into(),
            entity_id: None,
            face_type: role,
            sweep: SweepKind::Extrude,
        }
    }

    #[test]
    fn test_merge_base_then_tool() {
        let mut base = OperationHistory::default();
        base.face_hash_to_origin
            .insert(11, origin("e1", FaceRole::TopCap));
        let mut tool = OperationHistory::default();
        tool.face_hash_to_origin
            .insert(22, origin("e2", FaceRole::Side));

        let records = vec![
            BooleanFaceRecord {
                input_hash: 11,
                from_tool: false,
                output_hashes: vec![101],
                deleted: false,
            },
            BooleanFaceRecord {
                input_hash: 22,
                from_tool: true,
                output_hashes: vec![202],
                deleted: false,
            },
        ];

        let merged = merge_through_boolean(&base, &tool, &records);
        assert_eq!(
            merged.face_hash_to_origin[&101].source_feature_id,
            "e1"
        );
        assert_eq!(
            merged.face_hash_to_origin[&202].source_feature_id,
            "e2"
        );
    }

    #[test]
    fn test_merge_base_takes_precedence() {
        let mut base = OperationHistory::default();
        base.face_hash_to_origin
            .insert(11, origin("e1", FaceRole::TopCap));
        let mut tool = OperationHistory::default();
        tool.face_hash_to_origin
            .insert(22, origin("e2", FaceRole::Side));

        // Both input faces map to the same output hash
        let records = vec![
            BooleanFaceRecord {
                input_hash: 11,
                from_tool: false,
                output_hashes: vec![300],
                deleted: false,
            },
            BooleanFaceRecord {
                input_hash: 22,
                from_tool: true,
                output_hashes: vec![300],
                deleted: false,
            },
        ];
        let merged = merge_through_boolean(&base, &tool, &records);
        assert_eq!(merged.face_hash_to_origin[&300].source_feature_id, "e1");
    }

    #[test]
    fn test_merge_skips_deleted() {
        let mut base = OperationHistory::default();
        base.face_hash_to_origin
            .insert(11, origin("e1", FaceRole::Side));
        let records = vec![BooleanFaceRecord {
            input_hash: 11,
            from_tool: false,
            output_hashes: vec![400],
            deleted: true,
        }];
        let merged = merge_through_boolean(&base, &OperationHistory::default(), &records);
        assert!(merged.face_hash_to_origin.is_empty());
    }

    #[test]
    fn test_merge_keeps_base_metadata() {
        let mut base = OperationHistory {
            sweep: Some(SweepKind::Extrude),
            bottom_cap_hash: Some(1),
            top_cap_hash: Some(2),
            ..Default::default()
        };
        base.profile_edge_to_entity_id.insert(0, "l1".into());
        let merged = merge_through_boolean(&base, &OperationHistory::default(), &[]);
        assert_eq!(merged.sweep, Some(SweepKind::Extrude));
        assert_eq!(merged.top_cap_hash, Some(2));
        assert_eq!(merged.profile_edge_to_entity_id[&0], "l1");
    }
}
