//! End-to-end rebuild scenarios: seed feature lists through the full
//! engine, checking bodies, meshes, history-backed references, and
//! determinism.

use std::collections::BTreeMap;

use forma_ir::{
    BodyOp, BooleanOpKind, DatumRole, ExtrudeExtent, Feature, FeatureOp, MergeScope,
    SketchConstraint, SketchData, SketchEntity, SketchPlaneRef, SketchPoint, SweepDirection, Vec3,
};
use forma_kernel::{
    resolve, ErrorCode, FeatureStatus, RebuildOptions, RebuildResult, RefInput, Resolution,
    SolidSession,
};
use forma_kernel_naming::{stref::kinds, PersistentRef, SelectorValue};
use forma_kernel_tessellate::{mesh_bounds, mesh_volume};

// =============================================================================
// Document builders
// =============================================================================

fn sketch_data_square(cx: f64, cy: f64, half: f64) -> SketchData {
    let mut data = SketchData::default();
    for (id, x, y) in [
        ("p1", cx - half, cy - half),
        ("p2", cx + half, cy - half),
        ("p3", cx + half, cy + half),
        ("p4", cx - half, cy + half),
    ] {
        data.points_by_id
            .insert(id.to_string(), SketchPoint { x, y });
    }
    for (id, a, b) in [
        ("l1", "p1", "p2"),
        ("l2", "p2", "p3"),
        ("l3", "p3", "p4"),
        ("l4", "p4", "p1"),
    ] {
        data.entities_by_id.insert(
            id.to_string(),
            SketchEntity::Line {
                p1: a.to_string(),
                p2: b.to_string(),
            },
        );
    }
    data
}

fn sketch_feature(id: &str, plane: SketchPlaneRef, data: SketchData) -> Feature {
    Feature {
        id: id.to_string(),
        suppressed: false,
        name: None,
        op: FeatureOp::Sketch { plane, data },
    }
}

fn xy() -> SketchPlaneRef {
    SketchPlaneRef::DatumRole {
        role: DatumRole::Xy,
    }
}

#[allow(clippy::too_many_arguments)]
fn extrude_feature(
    id: &str,
    sketch: &str,
    distance: f64,
    op: BodyOp,
    merge_scope: Option<MergeScope>,
) -> Feature {
    Feature {
        id: id.to_string(),
        suppressed: false,
        name: None,
        op: FeatureOp::Extrude {
            sketch: sketch.to_string(),
            op,
            direction: SweepDirection::Normal,
            extent: ExtrudeExtent::Blind,
            distance,
            merge_scope,
            target_bodies: None,
            result_body_name: None,
            result_body_color: None,
        },
    }
}

fn doc(features: Vec<Feature>) -> (BTreeMap<String, Feature>, Vec<String>) {
    let order: Vec<String> = features.iter().map(|f| f.id.clone()).collect();
    let map = features.into_iter().map(|f| (f.id.clone(), f)).collect();
    (map, order)
}

fn rebuild(features: Vec<Feature>) -> (SolidSession, RebuildResult) {
    let mut session = SolidSession::new();
    session.init(RebuildOptions {
        validate: true,
        ..Default::default()
    });
    let (map, order) = doc(features);
    let result = session.rebuild(&map, &order, None);
    (session, result)
}

fn decoded_face_refs(result: &RebuildResult, body_key: &str) -> Vec<PersistentRef> {
    result.reference_index[body_key]
        .faces
        .iter()
        .map(|s| PersistentRef::decode(s).expect("emitted stref decodes"))
        .collect()
}

// =============================================================================
// S1 — box on the XY plane
// =============================================================================

#[test]
fn s1_box_on_xy_plane() {
    let (_, result) = rebuild(vec![
        sketch_feature("s1", xy(), sketch_data_square(0.0, 0.0, 5.0)),
        extrude_feature("e1", "s1", 10.0, BodyOp::Add, None),
    ]);

    assert!(result.errors.is_empty(), "{:?}", result.errors);
    assert_eq!(result.bodies.len(), 1);
    let body = &result.bodies["e1"];
    assert_eq!(body.face_count, 6);
    assert_eq!(body.edge_count, 12);

    let mesh = &result.meshes["e1"];
    let vol = mesh_volume(mesh);
    assert!((vol - 1000.0).abs() < 1.0, "volume {vol}");
    let (min, max) = mesh_bounds(mesh);
    assert!((min[0] + 5.0).abs() < 1e-6 && (max[0] - 5.0).abs() < 1e-6);
    assert!((min[1] + 5.0).abs() < 1e-6 && (max[1] - 5.0).abs() < 1e-6);
    assert!(min[2].abs() < 1e-6 && (max[2] - 10.0).abs() < 1e-6);

    // Face 5 is the top cap; faces 0..4 are the sides in profile order.
    let refs = decoded_face_refs(&result, "e1");
    assert_eq!(refs.len(), 6);
    assert_eq!(refs[5].local_selector.kind, kinds::EXTRUDE_TOP_CAP);
    assert_eq!(refs[4].local_selector.kind, kinds::EXTRUDE_BOTTOM_CAP);
    for (i, entity) in ["l1", "l2", "l3", "l4"].iter().enumerate() {
        assert_eq!(refs[i].local_selector.kind, kinds::EXTRUDE_SIDE);
        assert_eq!(
            refs[i].local_selector.data["segmentId"],
            SelectorValue::Text(entity.to_string()),
            "side face {i}"
        );
    }
    assert!(result.warnings.is_empty(), "{:?}", result.warnings);
}

// =============================================================================
// S2 — cylinder by revolve
// =============================================================================

#[test]
fn s2_cylinder_by_revolve() {
    // Rectangle on the XZ plane with one edge on the axis line.
    let mut data = SketchData::default();
    for (id, x, y) in [
        ("p1", 0.0, 0.0),
        ("p2", 5.0, 0.0),
        ("p3", 5.0, 10.0),
        ("p4", 0.0, 10.0),
    ] {
        data.points_by_id
            .insert(id.to_string(), SketchPoint { x, y });
    }
    for (id, a, b) in [
        ("axis", "p4", "p1"),
        ("l1", "p1", "p2"),
        ("l2", "p2", "p3"),
        ("l3", "p3", "p4"),
    ] {
        data.entities_by_id.insert(
            id.to_string(),
            SketchEntity::Line {
                p1: a.to_string(),
                p2: b.to_string(),
            },
        );
    }
    let (_, result) = rebuild(vec![
        sketch_feature(
            "s1",
            SketchPlaneRef::DatumRole {
                role: DatumRole::Xz,
            },
            data,
        ),
        Feature {
            id: "r1".to_string(),
            suppressed: false,
            name: None,
            op: FeatureOp::Revolve {
                sketch: "s1".to_string(),
                axis: "axis".to_string(),
                angle: 360.0,
                op: BodyOp::Add,
                merge_scope: None,
                target_bodies: None,
                result_body_name: None,
                result_body_color: None,
            },
        },
    ]);

    assert!(result.errors.is_empty(), "{:?}", result.errors);
    assert_eq!(result.bodies.len(), 1);
    // Full revolution: no caps, one side face per non-axis profile edge.
    assert_eq!(result.bodies["r1"].face_count, 3);
    // Validator found nothing at error severity.
    assert!(result.warnings.is_empty(), "{:?}", result.warnings);

    let mesh = &result.meshes["r1"];
    let vol = mesh_volume(mesh).abs();
    let expect = std::f64::consts::PI * 25.0 * 10.0;
    assert!((vol - expect).abs() < expect * 0.05, "volume {vol}");
}

// =============================================================================
// S3 — cube-cut-cube subtract
// =============================================================================

fn s3_features() -> Vec<Feature> {
    vec![
        sketch_feature("s1", xy(), sketch_data_square(0.0, 0.0, 10.0)),
        extrude_feature("e1", "s1", 20.0, BodyOp::Add, None),
        sketch_feature("s2", xy(), sketch_data_square(0.0, 0.0, 5.0)),
        extrude_feature("e2", "s2", 30.0, BodyOp::Add, Some(MergeScope::New)),
        Feature {
            id: "b1".to_string(),
            suppressed: false,
            name: None,
            op: FeatureOp::Boolean {
                operation: BooleanOpKind::Subtract,
                target: "e1".to_string(),
                tool: "e2".to_string(),
            },
        },
    ]
}

#[test]
fn s3_cube_cut_cube_through_hole() {
    let (session, result) = rebuild(s3_features());
    assert!(result.errors.is_empty(), "{:?}", result.errors);

    // Tool entry consumed; target entry survives under its own key.
    assert_eq!(result.bodies.len(), 1);
    assert!(result.bodies.contains_key("e1"));

    let mesh = &result.meshes["e1"];
    let vol = mesh_volume(mesh);
    // 20·20·20 − 10·10·20 through hole
    assert!((vol - 6000.0).abs() < 20.0, "volume {vol}");

    // Caps carry one inner loop each.
    let topo = &session.model().topology;
    let live_body = (0..topo.body_slots() as u32)
        .map(forma_kernel_topo::BodyId)
        .find(|&b| topo.is_body_live(b))
        .expect("live body");
    let holed = topo
        .body_faces(live_body)
        .iter()
        .filter(|&&f| !topo.face_inner_loops(f).is_empty())
        .count();
    assert_eq!(holed, 2, "both caps carry a hole loop");

    // Outer sides keep E1 selectors; hole walls resolve to E2.
    let refs = decoded_face_refs(&result, "e1");
    let outer_sides = refs
        .iter()
        .filter(|r| {
            r.origin_feature_id == "e1" && r.local_selector.kind == kinds::EXTRUDE_SIDE
        })
        .count();
    let inner_sides = refs
        .iter()
        .filter(|r| {
            r.origin_feature_id == "e2" && r.local_selector.kind == kinds::EXTRUDE_SIDE
        })
        .count();
    assert_eq!(outer_sides, 4, "outer walls keep their E1 identity");
    assert_eq!(inner_sides, 4, "hole walls carry the tool's identity");
}

// =============================================================================
// S4 — tilted cut
// =============================================================================

#[test]
fn s4_tilted_cut() {
    let angle = 20.0f64.to_radians();
    let normal = Vec3::new(angle.sin(), 0.0, angle.cos());
    let x_dir = Vec3::new(angle.cos(), 0.0, -angle.sin());

    let features = vec![
        sketch_feature("s1", xy(), sketch_data_square(0.0, 0.0, 10.0)),
        extrude_feature("e1", "s1", 20.0, BodyOp::Add, None),
        Feature {
            id: "plane1".to_string(),
            suppressed: false,
            name: None,
            op: FeatureOp::Plane {
                role: None,
                normal: Some(normal),
                origin: Some(Vec3::new(0.0, 0.0, -5.0)),
                x_dir: Some(x_dir),
            },
        },
        sketch_feature(
            "s2",
            SketchPlaneRef::PlaneFeatureId {
                target: "plane1".to_string(),
            },
            sketch_data_square(0.0, 0.0, 5.0),
        ),
        extrude_feature("e2", "s2", 30.0, BodyOp::Cut, None),
    ];
    let (_, result) = rebuild(features);
    assert!(result.errors.is_empty(), "{:?}", result.errors);
    assert!(
        result.warnings.is_empty(),
        "validator findings: {:?}",
        result.warnings
    );

    let mesh = &result.meshes["e1"];
    let vol = mesh_volume(mesh);
    assert!(vol < 8000.0, "cut removed material, got {vol}");

    // Deterministic grid estimate of the clipped intersection volume.
    let plane_o = forma_kernel_math::Point3::new(0.0, 0.0, -5.0);
    let n = forma_kernel_math::Vec3::new(normal.x, normal.y, normal.z);
    let fx = forma_kernel_math::Vec3::new(x_dir.x, x_dir.y, x_dir.z);
    let fy = n.cross(&fx);
    let steps = 100usize;
    let cell = 20.0 / steps as f64;
    let mut inside = 0usize;
    for i in 0..steps {
        for j in 0..steps {
            for k in 0..steps {
                let p = forma_kernel_math::Point3::new(
                    -10.0 + (i as f64 + 0.5) * cell,
                    -10.0 + (j as f64 + 0.5) * cell,
                    (k as f64 + 0.5) * cell,
                );
                let d = p - plane_o;
                let (u, v, w) = (d.dot(&fx), d.dot(&fy), d.dot(&n));
                if u.abs() <= 5.0 && v.abs() <= 5.0 && (0.0..=30.0).contains(&w) {
                    inside += 1;
                }
            }
        }
    }
    let clipped = inside as f64 * cell * cell * cell;
    let removed = 8000.0 - vol;
    assert!(
        (removed - clipped).abs() < 0.01 * 8000.0,
        "removed {removed}, grid estimate {clipped}"
    );
}

// =============================================================================
// S5 — idempotent rebuild
// =============================================================================

#[test]
fn s5_idempotent_rebuild() {
    let (map, order) = doc(s3_features());
    let mut session = SolidSession::new();
    let first = session.rebuild(&map, &order, None);
    let second = session.rebuild(&map, &order, None);

    assert_eq!(first.errors, second.errors);
    for (key, mesh) in &first.meshes {
        let other = &second.meshes[key];
        assert_eq!(mesh.positions, other.positions, "positions of {key}");
        assert_eq!(mesh.indices, other.indices, "indices of {key}");
        assert_eq!(mesh.face_hashes, other.face_hashes, "face hashes of {key}");
        assert_eq!(mesh.edge_hashes, other.edge_hashes, "edge hashes of {key}");
    }
    assert_eq!(first.reference_index, second.reference_index);
}

// =============================================================================
// S6 — reference survives merge
// =============================================================================

#[test]
fn s6_reference_survives_merge() {
    let (_, result) = rebuild(vec![
        sketch_feature("s1", xy(), sketch_data_square(0.0, 0.0, 5.0)),
        extrude_feature("e1", "s1", 10.0, BodyOp::Add, None),
        sketch_feature("s2", xy(), sketch_data_square(5.0, 0.0, 5.0)),
        extrude_feature("e2", "s2", 10.0, BodyOp::Add, Some(MergeScope::Auto)),
    ]);

    assert!(result.errors.is_empty(), "{:?}", result.errors);
    // Auto merge preserved E1's entry identity.
    assert_eq!(result.bodies.len(), 1);
    assert!(result.bodies.contains_key("e1"));

    let refs = decoded_face_refs(&result, "e1");
    // E1's top cap region survived the union and still names E1.
    let e1_top = refs
        .iter()
        .filter(|r| {
            r.origin_feature_id == "e1" && r.local_selector.kind == kinds::EXTRUDE_TOP_CAP
        })
        .count();
    assert!(e1_top >= 1, "E1 top cap identity lost: {refs:#?}");
    // E2 contributed its own faces under its own identity.
    assert!(refs.iter().any(|r| r.origin_feature_id == "e2"));
}

// =============================================================================
// Reference roundtrip and engine behaviors
// =============================================================================

#[test]
fn reference_roundtrip_after_boolean() {
    let (_, result) = rebuild(s3_features());
    for (body_key, body_refs) in &result.reference_index {
        for (i, stref) in body_refs.faces.iter().enumerate() {
            let resolution = resolve(&RefInput::Single(stref.clone()), &result.reference_index);
            match resolution {
                Resolution::Found { body_key: k, index } => {
                    assert_eq!(&k, body_key);
                    assert_eq!(index, i, "face {i} of {body_key}");
                }
                other => panic!("face {i} of {body_key}: {other:?}"),
            }
        }
        for (i, stref) in body_refs.edges.iter().enumerate() {
            let resolution = resolve(&RefInput::Single(stref.clone()), &result.reference_index);
            match resolution {
                Resolution::Found { body_key: k, index } => {
                    assert_eq!(&k, body_key);
                    assert_eq!(index, i, "edge {i} of {body_key}");
                }
                other => panic!("edge {i} of {body_key}: {other:?}"),
            }
        }
    }
}

#[test]
fn suppressed_features_are_skipped() {
    let mut features = vec![
        sketch_feature("s1", xy(), sketch_data_square(0.0, 0.0, 5.0)),
        extrude_feature("e1", "s1", 10.0, BodyOp::Add, None),
    ];
    features[1].suppressed = true;
    let (_, result) = rebuild(features);
    assert_eq!(result.feature_status["e1"], FeatureStatus::Suppressed);
    assert!(result.bodies.is_empty());
}

#[test]
fn rebuild_gate_marks_later_features() {
    let features = vec![
        sketch_feature("s1", xy(), sketch_data_square(0.0, 0.0, 5.0)),
        extrude_feature("e1", "s1", 10.0, BodyOp::Add, None),
        sketch_feature("s2", xy(), sketch_data_square(0.0, 0.0, 2.0)),
        extrude_feature("e2", "s2", 30.0, BodyOp::Cut, None),
    ];
    let (map, order) = doc(features);
    let mut session = SolidSession::new();
    let result = session.rebuild(&map, &order, Some("e1"));
    assert_eq!(result.feature_status["e1"], FeatureStatus::Computed);
    assert_eq!(result.feature_status["s2"], FeatureStatus::Gated);
    assert_eq!(result.feature_status["e2"], FeatureStatus::Gated);
    // The gate leaves the first body uncut.
    let vol = mesh_volume(&result.meshes["e1"]);
    assert!((vol - 1000.0).abs() < 1.0);
}

#[test]
fn cut_through_body() {
    let (_, result) = rebuild(vec![
        sketch_feature("s1", xy(), sketch_data_square(0.0, 0.0, 10.0)),
        extrude_feature("e1", "s1", 20.0, BodyOp::Add, None),
        sketch_feature("s2", xy(), sketch_data_square(0.0, 0.0, 5.0)),
        extrude_feature("e2", "s2", 30.0, BodyOp::Cut, None),
    ]);
    assert!(result.errors.is_empty(), "{:?}", result.errors);
    assert_eq!(result.bodies.len(), 1);
    let vol = mesh_volume(&result.meshes["e1"]);
    assert!((vol - 6000.0).abs() < 20.0, "volume {vol}");
}

#[test]
fn cut_missing_everything_fails() {
    let (_, result) = rebuild(vec![
        sketch_feature("s1", xy(), sketch_data_square(0.0, 0.0, 10.0)),
        extrude_feature("e1", "s1", 20.0, BodyOp::Add, None),
        sketch_feature("s2", xy(), sketch_data_square(100.0, 100.0, 5.0)),
        extrude_feature("e2", "s2", 30.0, BodyOp::Cut, None),
    ]);
    let cut_error = result
        .errors
        .iter()
        .find(|e| e.feature_id == "e2")
        .expect("cut error recorded");
    assert_eq!(cut_error.code, ErrorCode::CutFailed);
    assert_eq!(result.feature_status["e2"], FeatureStatus::Error);
    // Earlier features keep their results (partial success).
    assert_eq!(result.bodies.len(), 1);
}

#[test]
fn missing_sketch_cascades() {
    let (_, result) = rebuild(vec![extrude_feature(
        "e1",
        "nope",
        10.0,
        BodyOp::Add,
        None,
    )]);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].code, ErrorCode::SketchNotFound);
}

#[test]
fn under_constrained_sketch_still_builds() {
    // S1's sketch has no constraints: under-constrained but fully usable.
    let (_, result) = rebuild(vec![
        sketch_feature("s1", xy(), sketch_data_square(0.0, 0.0, 5.0)),
        extrude_feature("e1", "s1", 10.0, BodyOp::Add, None),
    ]);
    let solve = &result.sketch_solve_results["s1"];
    assert!(solve.dof.remaining_dof > 0);
    assert_eq!(result.bodies.len(), 1);
}

#[test]
fn solved_sketch_feeds_profile() {
    // Anchor one corner and pin the square's size with distance
    // constraints; the solved positions drive the extrude.
    let mut data = sketch_data_square(0.0, 0.0, 5.0);
    data.constraints_by_id.insert(
        "c1".to_string(),
        SketchConstraint::Fixed {
            point: "p1".to_string(),
        },
    );
    let (_, result) = rebuild(vec![
        sketch_feature("s1", xy(), data),
        extrude_feature("e1", "s1", 10.0, BodyOp::Add, None),
    ]);
    assert!(result.errors.is_empty(), "{:?}", result.errors);
    let vol = mesh_volume(&result.meshes["e1"]);
    assert!((vol - 1000.0).abs() < 1.0);
}

#[test]
fn cancellation_aborts_rebuild() {
    let features = vec![
        sketch_feature("s1", xy(), sketch_data_square(0.0, 0.0, 5.0)),
        extrude_feature("e1", "s1", 10.0, BodyOp::Add, None),
    ];
    let (map, order) = doc(features);
    let mut session = SolidSession::new();
    session.cancellation_token().cancel();
    let result = session.rebuild(&map, &order, None);
    assert!(result
        .errors
        .iter()
        .any(|e| e.code == ErrorCode::Cancelled));
    assert!(result.bodies.is_empty());
}
