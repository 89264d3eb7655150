//! Reference index builder.
//!
//! For each tessellated body, emit one persistent reference per face and per
//! edge, positionally matching the mesh's face/edge index spaces. History is
//! consulted first (it is the truth about identity); fingerprints and the
//! normal-direction heuristic only break ties when history has no entry.

use std::collections::BTreeMap;

use forma_kernel_tessellate::SurfaceMesh;
use serde::{Deserialize, Serialize};

use crate::fingerprint::{edge_fingerprints, face_fingerprints};
use crate::history::{FaceRole, OperationHistory, SweepKind};
use crate::stref::{
    kinds, Fingerprint, LocalSelector, PersistentRef, RefType, SelectorValue,
};

/// The reference strings of one body, positionally matching tessellation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BodyReferenceSet {
    /// One stref per face index.
    pub faces: Vec<String>,
    /// One stref per edge index.
    pub edges: Vec<String>,
}

/// The per-rebuild snapshot: body key → reference strings.
/// Not persisted; recomputed on every rebuild.
pub type ReferenceIndex = BTreeMap<String, BodyReferenceSet>;

/// Everything the builder needs for one body.
#[derive(Debug)]
pub struct BodyNamingInputs<'a> {
    /// The body-map key (feature id of the current owner).
    pub body_key: &'a str,
    /// The feature id that created the body (pre-merge owner).
    pub source_feature_id: &'a str,
    /// The body's tessellation.
    pub mesh: &'a SurfaceMesh,
    /// The body's operation history.
    pub history: &'a OperationHistory,
}

fn cap_kind(sweep: SweepKind, role: FaceRole) -> &'static str {
    match (sweep, role) {
        (SweepKind::Extrude, FaceRole::TopCap) => kinds::EXTRUDE_TOP_CAP,
        (SweepKind::Extrude, FaceRole::BottomCap) => kinds::EXTRUDE_BOTTOM_CAP,
        (SweepKind::Extrude, FaceRole::Side) => kinds::EXTRUDE_SIDE,
        (SweepKind::Revolve, FaceRole::TopCap) => kinds::REVOLVE_END_CAP,
        (SweepKind::Revolve, FaceRole::BottomCap) => kinds::REVOLVE_START_CAP,
        (SweepKind::Revolve, FaceRole::Side) => kinds::REVOLVE_SIDE,
        (_, FaceRole::Unknown) => kinds::FACE_UNKNOWN,
    }
}

fn edge_kind(sweep: Option<SweepKind>) -> &'static str {
    match sweep {
        Some(SweepKind::Extrude) => kinds::EXTRUDE_EDGE,
        Some(SweepKind::Revolve) => kinds::REVOLVE_EDGE,
        None => kinds::EDGE_UNKNOWN,
    }
}

/// Build the reference strings for one body.
pub fn build_body_references(inputs: &BodyNamingInputs<'_>) -> BodyReferenceSet {
    let face_fps = face_fingerprints(inputs.mesh);
    let edge_fps = edge_fingerprints(inputs.mesh);
    let history = inputs.history;
    let mut out = BodyReferenceSet::default();

    for (face_index, &hash) in inputs.mesh.face_hashes.iter().enumerate() {
        let fp = &face_fps[face_index];
        let mut origin_feature = inputs.source_feature_id.to_string();
        let mut selector;

        if let Some(origin) = history.face_hash_to_origin.get(&hash) {
            // History origin wins. Its feature id may differ from the body's
            // current owner; that is how faces carry identity across merges.
            origin_feature = origin.source_feature_id.clone();
            selector = LocalSelector::bare(cap_kind(origin.sweep, origin.face_type));
            if origin.face_type == FaceRole::Side {
                if let Some(entity) = &origin.entity_id {
                    selector.data.insert(
                        "segmentId".to_string(),
                        SelectorValue::Text(entity.clone()),
                    );
                } else if let Some(i) = history.side_index_for_hash(hash) {
                    selector.data.insert(
                        "profileEdgeIndex".to_string(),
                        SelectorValue::Index(i as u32),
                    );
                } else {
                    selector.data.insert(
                        "faceIndex".to_string(),
                        SelectorValue::Index(face_index as u32),
                    );
                }
            }
            if origin.face_type == FaceRole::Unknown {
                selector.data.insert(
                    "faceIndex".to_string(),
                    SelectorValue::Index(face_index as u32),
                );
            }
        } else if history.top_cap_hash == Some(hash) {
            let sweep = history.sweep.unwrap_or(SweepKind::Extrude);
            selector = LocalSelector::bare(cap_kind(sweep, FaceRole::TopCap));
        } else if history.bottom_cap_hash == Some(hash) {
            let sweep = history.sweep.unwrap_or(SweepKind::Extrude);
            selector = LocalSelector::bare(cap_kind(sweep, FaceRole::BottomCap));
        } else if let Some(i) = history.side_index_for_hash(hash) {
            let sweep = history.sweep.unwrap_or(SweepKind::Extrude);
            selector = LocalSelector::bare(cap_kind(sweep, FaceRole::Side));
            if let Some(entity) = history.profile_edge_to_entity_id.get(&i) {
                selector.data.insert(
                    "segmentId".to_string(),
                    SelectorValue::Text(entity.clone()),
                );
            } else {
                selector.data.insert(
                    "profileEdgeIndex".to_string(),
                    SelectorValue::Index(i as u32),
                );
            }
        } else if let Some(sweep) = history.sweep {
            // Normal-direction heuristic for sweeps whose hashes drifted.
            let role = if fp.normal.z > 0.9 {
                FaceRole::TopCap
            } else if fp.normal.z < -0.9 {
                FaceRole::BottomCap
            } else {
                FaceRole::Side
            };
            selector = LocalSelector::bare(cap_kind(sweep, role));
            if role == FaceRole::Side {
                selector.data.insert(
                    "faceIndex".to_string(),
                    SelectorValue::Index(face_index as u32),
                );
            }
        } else {
            selector = LocalSelector::bare(kinds::FACE_UNKNOWN);
            selector.data.insert(
                "faceIndex".to_string(),
                SelectorValue::Index(face_index as u32),
            );
        }

        if let Some(loop_id) = &history.profile_loop_id {
            selector
                .data
                .entry("loopId".to_string())
                .or_insert_with(|| SelectorValue::Text(loop_id.clone()));
        }

        let record = PersistentRef {
            expected_type: RefType::Face,
            origin_feature_id: origin_feature,
            local_selector: selector,
            fingerprint: Some(Fingerprint {
                centroid: [fp.centroid.x, fp.centroid.y, fp.centroid.z],
                size: fp.area,
                normal: Some([fp.normal.x, fp.normal.y, fp.normal.z]),
            }),
        };
        // Fingerprints come from finite mesh data; encoding cannot fail.
        out.faces.push(record.encode().unwrap_or_default());
    }

    for (edge_index, _hash) in inputs.mesh.edge_hashes.iter().enumerate() {
        let fp = &edge_fps[edge_index];
        let mut selector = LocalSelector::bare(edge_kind(history.sweep));
        selector.data.insert(
            "edgeIndex".to_string(),
            SelectorValue::Index(edge_index as u32),
        );
        if let Some(loop_id) = &history.profile_loop_id {
            selector
                .data
                .insert("loopId".to_string(), SelectorValue::Text(loop_id.clone()));
        }
        let record = PersistentRef {
            expected_type: RefType::Edge,
            origin_feature_id: inputs.source_feature_id.to_string(),
            local_selector: selector,
            fingerprint: Some(Fingerprint {
                centroid: [fp.midpoint.x, fp.midpoint.y, fp.midpoint.z],
                size: fp.length,
                normal: None,
            }),
        };
        out.edges.push(record.encode().unwrap_or_default());
    }

    out
}
