//! Revolve: build a B-rep body by sweeping a profile about an axis line.
//!
//! Each non-construction profile edge generates one surface-of-revolution
//! side face. Edges lying on the axis are construction edges: they generate
//! no side face and never appear in the profile-edge → entity table, but
//! they still bound the caps. Caps exist only for partial sweeps.
//!
//! Twin pairing is explicit: generatrix half-edges pair with cap half-edges
//! (partial) or with each other as the seam (full revolution); endpoint
//! arcs pair between consecutive side faces; on-axis endpoints produce no
//! arc at all, shrinking the loop the way a cone apex does.

use std::collections::HashMap;
use std::f64::consts::TAU;

use forma_kernel_geom::{Plane, SolidModel, Spun, Surface};
use forma_kernel_math::{Dir3, NumericContext, Point3, Transform};
use forma_kernel_naming::{FaceOrigin, FaceRole, OperationHistory, SweepKind};
use forma_kernel_topo::{hash, FaceId, HalfEdgeId, VertexId};

use crate::extrude::SweepOutput;
use crate::profile::{Profile, ProfileEdgeKind};
use crate::SketchError;

/// The revolution axis in 3D.
#[derive(Debug, Clone)]
pub struct RevolveAxis {
    /// A point on the axis.
    pub origin: Point3,
    /// Axis direction.
    pub direction: Dir3,
}

impl RevolveAxis {
    /// Distance from a point to the axis line.
    pub fn distance(&self, p: &Point3) -> f64 {
        let d = p - self.origin;
        let along = d.dot(self.direction.as_ref());
        (d - along * self.direction.as_ref()).norm()
    }
}

struct SideBuild {
    /// Index of the generating edge within the profile loop.
    edge_index: usize,
    face: FaceId,
    gen0: HalfEdgeId,
    gen1: HalfEdgeId,
    arc_t: Option<HalfEdgeId>,
    arc_s: Option<HalfEdgeId>,
}

/// Revolve a profile's outer loop about an axis by `angle` radians.
pub fn revolve(
    model: &mut SolidModel,
    profile: &Profile,
    axis: &RevolveAxis,
    angle: f64,
    feature_id: &str,
    ctx: &NumericContext,
) -> Result<SweepOutput, SketchError> {
    if angle.abs() < 1e3 * ctx.angle {
        return Err(SketchError::ZeroSweep);
    }
    let sweep = angle.clamp(-TAU, TAU);
    let full = sweep.abs() >= TAU - 1e3 * ctx.angle;

    let edges = &profile.outer.edges;
    for edge in edges {
        if !matches!(edge.kind, ProfileEdgeKind::Line { .. }) {
            return Err(SketchError::ArcNotSupported);
        }
    }

    // Edge endpoints in 3D, with on-axis classification.
    let pts: Vec<(Point3, Point3)> = edges
        .iter()
        .map(|e| (profile.to_3d(e.start()), profile.to_3d(e.end())))
        .collect();
    let on_axis: Vec<(bool, bool)> = pts
        .iter()
        .map(|(s, t)| {
            (
                axis.distance(s) < ctx.length,
                axis.distance(t) < ctx.length,
            )
        })
        .collect();

    let rotate_full = Transform::rotation_about_line(&axis.origin, &axis.direction, sweep);

    // Dedup vertices by snapped position; full-sweep and on-axis points
    // collapse onto their angle-0 twins automatically.
    let mut vertex_cache: HashMap<[i64; 3], VertexId> = HashMap::new();
    let quantize = |p: &Point3| -> [i64; 3] {
        [
            ctx.bucket(p.x, 1.0),
            ctx.bucket(p.y, 1.0),
            ctx.bucket(p.z, 1.0),
        ]
    };

    let mut sides: Vec<SideBuild> = Vec::new();

    for (i, edge) in edges.iter().enumerate() {
        let (s3, t3) = pts[i];
        let (s_axis, t_axis) = on_axis[i];
        if s_axis && t_axis {
            continue; // construction edge on the axis
        }

        let s_rot = rotate_full.apply_point(&s3);
        let t_rot = rotate_full.apply_point(&t3);

        let topo = &mut model.topology;
        let vs0 = *vertex_cache
            .entry(quantize(&s3))
            .or_insert_with(|| topo.add_vertex(s3));
        let vt0 = *vertex_cache
            .entry(quantize(&t3))
            .or_insert_with(|| topo.add_vertex(t3));
        let vs1 = *vertex_cache
            .entry(quantize(&s_rot))
            .or_insert_with(|| topo.add_vertex(s_rot));
        let vt1 = *vertex_cache
            .entry(quantize(&t_rot))
            .or_insert_with(|| topo.add_vertex(t_rot));

        let gen0 = topo.add_half_edge(vs0);
        let arc_t = if t_axis {
            None
        } else {
            Some(topo.add_half_edge(vt0))
        };
        let gen1 = topo.add_half_edge(vt1);
        let arc_s = if s_axis {
            None
        } else {
            Some(topo.add_half_edge(vs1))
        };

        let mut loop_hes = vec![gen0];
        loop_hes.extend(arc_t);
        loop_hes.push(gen1);
        loop_hes.extend(arc_s);
        let l = topo.add_loop(&loop_hes);

        let spun = Spun {
            axis_origin: axis.origin,
            axis: axis.direction,
            start: s3,
            end: t3,
            sweep,
        };
        // Outward side of the face: the profile's in-plane outward normal
        // of this edge (outer loop is CCW), rotated to the sweep midpoint.
        let edge2 = (edge.end() - edge.start()).normalize();
        let outward2 = forma_kernel_math::Vec2::new(edge2.y, -edge2.x);
        let outward3 = outward2.x * profile.plane.x_dir.as_ref()
            + outward2.y * profile.plane.y_dir.as_ref();
        let mid_rot =
            Transform::rotation_about_line(&axis.origin, &axis.direction, sweep / 2.0);
        let outward_mid = mid_rot.apply_vec(&outward3);
        let reversed = spun.normal(0.5, sweep / 2.0).dot(&outward_mid) < 0.0;

        let surface = model.geometry.add_surface(Surface::Spun(spun));
        let face = model.topology.add_face(l, surface, reversed);

        sides.push(SideBuild {
            edge_index: i,
            face,
            gen0,
            gen1,
            arc_t,
            arc_s,
        });
    }

    if sides.is_empty() {
        return Err(SketchError::OpenProfile);
    }

    // Pair endpoint arcs between consecutive side faces: the arc traced by
    // edge i's end point is the reverse of the arc traced by the next
    // side's start point.
    let n_sides = sides.len();
    for k in 0..n_sides {
        let next = (k + 1) % n_sides;
        if let (Some(arc_t), Some(arc_s)) = (sides[k].arc_t, sides[next].arc_s) {
            if model.topology.half_edge_twin(arc_t).is_null() {
                model.topology.add_edge(arc_t, arc_s);
            }
        }
    }

    let mut all_faces: Vec<FaceId> = sides.iter().map(|s| s.face).collect();

    if full {
        // Seam: each face's two generatrices coincide.
        for side in &sides {
            if model.topology.half_edge_twin(side.gen0).is_null() {
                model.topology.add_edge(side.gen0, side.gen1);
            }
        }
    } else {
        let (start_cap, end_cap) =
            build_caps(model, profile, axis, sweep, &pts, &on_axis, &sides)?;
        all_faces.push(start_cap);
        all_faces.push(end_cap);
    }

    let shell = model.topology.add_shell(all_faces.clone(), true);
    let body = model.topology.add_body(vec![shell]);

    let history = capture_history(model, feature_id, profile, &sides, full, &all_faces, ctx);
    Ok(SweepOutput { body, history })
}

/// Build the start/end caps of a partial sweep and pair their half-edges
/// with the side-face generatrices (and with each other along construction
/// edges, which the rotation leaves in place).
#[allow(clippy::too_many_arguments)]
fn build_caps(
    model: &mut SolidModel,
    profile: &Profile,
    axis: &RevolveAxis,
    sweep: f64,
    pts: &[(Point3, Point3)],
    on_axis: &[(bool, bool)],
    sides: &[SideBuild],
) -> Result<(FaceId, FaceId), SketchError> {
    let n = pts.len();
    let rotate = Transform::rotation_about_line(&axis.origin, &axis.direction, sweep);

    // Rotation side sign: does sweeping move material toward +normal?
    let probe = pts
        .iter()
        .zip(on_axis)
        .find(|(_, (s_ax, _))| !s_ax)
        .map(|((s, _), _)| *s)
        .ok_or(SketchError::OpenProfile)?;
    let tangent = axis.direction.as_ref().cross(&(probe - axis.origin));
    let s_sign = tangent.dot(profile.plane.normal.as_ref()) * sweep.signum();

    let topo = &mut model.topology;

    // Vertices already exist in the arena; look them up through the sides'
    // half-edges where possible, else re-create coincident ones is wrong —
    // so rebuild the cache from side-face origins.
    let mut start_hes: Vec<HalfEdgeId> = Vec::with_capacity(n);
    let mut end_hes: Vec<HalfEdgeId> = Vec::with_capacity(n);

    // Map from edge index to its side build for vertex lookup.
    let side_of: HashMap<usize, &SideBuild> =
        sides.iter().map(|s| (s.edge_index, s)).collect();

    // Cap vertex per profile point: reuse side-face vertices when the edge
    // has a side face; construction edges share endpoints with neighbors.
    let mut v0_of_edge_start: Vec<VertexId> = vec![VertexId::NULL; n];
    let mut v1_of_edge_start: Vec<VertexId> = vec![VertexId::NULL; n];
    for side in sides {
        let i = side.edge_index;
        v0_of_edge_start[i] = topo.half_edge_origin(side.gen0);
        // gen1 starts at t@angle; its dest is s@angle
        v1_of_edge_start[i] = topo.half_edge_dest(side.gen1);
    }
    // Fill construction-edge start vertices from the previous edge's end.
    for i in 0..n {
        if !v0_of_edge_start[i].is_null() {
            continue;
        }
        let prev = (i + n - 1) % n;
        if let Some(side) = side_of.get(&prev) {
            v0_of_edge_start[i] = topo.half_edge_origin(
                side.arc_t.unwrap_or(side.gen1),
            );
            v1_of_edge_start[i] = topo.half_edge_origin(side.gen1);
        } else {
            // Isolated construction chain: create the vertex.
            let p = pts[i].0;
            let v = topo.add_vertex(p);
            v0_of_edge_start[i] = v;
            v1_of_edge_start[i] = v;
        }
    }

    // Start cap: reversed traversal (each half-edge runs end → start at
    // angle 0) so side generatrices twin correctly.
    for i in (0..n).rev() {
        let next = (i + 1) % n;
        start_hes.push(topo.add_half_edge(v0_of_edge_start[next]));
    }
    let start_loop = topo.add_loop(&start_hes);

    // End cap: forward traversal at the sweep angle.
    for &v in &v1_of_edge_start {
        end_hes.push(topo.add_half_edge(v));
    }
    let end_loop = topo.add_loop(&end_hes);

    // Twin pairing: start cap he k corresponds to edge index n-1-k.
    for (k, &he) in start_hes.iter().enumerate() {
        let i = n - 1 - k;
        if let Some(side) = side_of.get(&i) {
            topo.add_edge(side.gen0, he);
        }
    }
    for (i, &he) in end_hes.iter().enumerate() {
        if let Some(side) = side_of.get(&i) {
            topo.add_edge(side.gen1, he);
        }
    }
    // Construction edges: the start and end cap run over the same (unmoved)
    // axis vertices in opposite directions; pair them with each other.
    for (k, &she) in start_hes.iter().enumerate() {
        let i = n - 1 - k;
        if side_of.contains_key(&i) {
            continue;
        }
        let ehe = end_hes[i];
        if topo.half_edge_twin(she).is_null() && topo.half_edge_twin(ehe).is_null() {
            topo.add_edge(she, ehe);
        }
    }

    let normal = *profile.plane.normal.as_ref();
    let x_dir = *profile.plane.x_dir.as_ref();
    let start_surface = model
        .geometry
        .add_surface(Surface::Plane(Plane::new(profile.plane.origin, normal, x_dir)));
    let rot_origin = rotate.apply_point(&profile.plane.origin);
    let rot_normal = rotate.apply_vec(&normal);
    let rot_x = rotate.apply_vec(&x_dir);
    let end_surface = model
        .geometry
        .add_surface(Surface::Plane(Plane::new(rot_origin, rot_normal, rot_x)));

    // Effective outward: start cap faces against the rotation, end cap
    // along it. The reversed flag reconciles that with the stored normal.
    let start_cap = model
        .topology
        .add_face(start_loop, start_surface, s_sign > 0.0);
    let end_cap = model.topology.add_face(end_loop, end_surface, s_sign < 0.0);

    Ok((start_cap, end_cap))
}

fn capture_history(
    model: &SolidModel,
    feature_id: &str,
    profile: &Profile,
    sides: &[SideBuild],
    full: bool,
    all_faces: &[FaceId],
    ctx: &NumericContext,
) -> OperationHistory {
    let topo = &model.topology;
    let mut history = OperationHistory {
        sweep: Some(SweepKind::Revolve),
        profile_loop_id: Some(profile.outer.loop_id.clone()),
        ..Default::default()
    };

    if !full {
        // Caps are the last two faces pushed.
        let start_cap = all_faces[all_faces.len() - 2];
        let end_cap = all_faces[all_faces.len() - 1];
        let start_hash = hash::face_topology_hash(topo, start_cap, ctx);
        let end_hash = hash::face_topology_hash(topo, end_cap, ctx);
        history.bottom_cap_hash = Some(start_hash);
        history.top_cap_hash = Some(end_hash);
        history.face_hash_to_origin.insert(
            start_hash,
            FaceOrigin {
                source_feature_id: feature_id.to_string(),
                entity_id: None,
                face_type: FaceRole::BottomCap,
                sweep: SweepKind::Revolve,
            },
        );
        history.face_hash_to_origin.insert(
            end_hash,
            FaceOrigin {
                source_feature_id: feature_id.to_string(),
                entity_id: None,
                face_type: FaceRole::TopCap,
                sweep: SweepKind::Revolve,
            },
        );
    }

    for side in sides {
        let face_hash = hash::face_topology_hash(topo, side.face, ctx);
        let entity_id = profile.outer.edges[side.edge_index].entity_id.clone();
        history
            .side_face_mappings
            .push((side.edge_index, face_hash));
        history
            .profile_edge_to_entity_id
            .insert(side.edge_index, entity_id.clone());
        history.face_hash_to_origin.insert(
            face_hash,
            FaceOrigin {
                source_feature_id: feature_id.to_string(),
                entity_id: Some(entity_id),
                face_type: FaceRole::Side,
                sweep: SweepKind::Revolve,
            },
        );
    }

    history
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::build_profiles;
    use forma_ir::{SketchData, SketchEntity, SketchPoint};
    use forma_kernel_math::Vec3;
    use forma_kernel_tessellate::{mesh_volume, tessellate_body, TessellationParams};

    /// Rectangle on the XZ plane with its left edge on the Z axis:
    /// plane coords (u, v) map to world (u·x̂ + v·ẑ).
    fn axis_rectangle(radius: f64, height: f64) -> Profile {
        let mut data = SketchData::default();
        for (id, x, y) in [
            ("p1", 0.0, 0.0),
            ("p2", radius, 0.0),
            ("p3", radius, height),
            ("p4", 0.0, height),
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
        build_profiles(&data, &data.points_by_id.clone(), &Plane::xz())
            .unwrap()
            .remove(0)
    }

    fn z_axis() -> RevolveAxis {
        RevolveAxis {
            origin: Point3::origin(),
            direction: Dir3::new_normalize(Vec3::z()),
        }
    }

    #[test]
    fn test_full_revolution_cylinder() {
        let mut model = SolidModel::new();
        let out = revolve(
            &mut model,
            &axis_rectangle(5.0, 10.0),
            &z_axis(),
            TAU,
            "r1",
            &NumericContext::DEFAULT,
        )
        .unwrap();
        // 3 side faces (axis edge is construction), no caps
        let faces = model.topology.body_faces(out.body);
        assert_eq!(faces.len(), 3);

        // Closed: every half-edge paired
        for face in &faces {
            let l = model.topology.face_outer_loop(*face);
            for he in model.topology.loop_half_edges(l) {
                assert!(
                    !model.topology.half_edge_twin(he).is_null(),
                    "unpaired half-edge"
                );
            }
        }

        let mesh = tessellate_body(
            &model,
            out.body,
            &TessellationParams::default(),
            &NumericContext::DEFAULT,
        );
        let vol = mesh_volume(&mesh).abs();
        let expect = std::f64::consts::PI * 25.0 * 10.0;
        assert!(
            (vol - expect).abs() < expect * 0.05,
            "volume {vol} vs {expect}"
        );
    }

    #[test]
    fn test_partial_revolution_has_caps() {
        let mut model = SolidModel::new();
        let out = revolve(
            &mut model,
            &axis_rectangle(5.0, 10.0),
            &z_axis(),
            std::f64::consts::FRAC_PI_2,
            "r1",
            &NumericContext::DEFAULT,
        )
        .unwrap();
        // 3 side faces + 2 caps
        let faces = model.topology.body_faces(out.body);
        assert_eq!(faces.len(), 5);
        for face in &faces {
            let l = model.topology.face_outer_loop(*face);
            for he in model.topology.loop_half_edges(l) {
                assert!(
                    !model.topology.half_edge_twin(he).is_null(),
                    "unpaired half-edge"
                );
            }
        }
        let mesh = tessellate_body(
            &model,
            out.body,
            &TessellationParams::default(),
            &NumericContext::DEFAULT,
        );
        let vol = mesh_volume(&mesh).abs();
        let expect = std::f64::consts::PI * 25.0 * 10.0 / 4.0;
        assert!(
            (vol - expect).abs() < expect * 0.05,
            "volume {vol} vs {expect}"
        );
    }

    #[test]
    fn test_revolve_history() {
        let mut model = SolidModel::new();
        let out = revolve(
            &mut model,
            &axis_rectangle(5.0, 10.0),
            &z_axis(),
            TAU,
            "r1",
            &NumericContext::DEFAULT,
        )
        .unwrap();
        let h = &out.history;
        assert_eq!(h.sweep, Some(SweepKind::Revolve));
        // Full revolution: no caps recorded
        assert!(h.bottom_cap_hash.is_none());
        assert_eq!(h.side_face_mappings.len(), 3);
        // The axis entity is absent from the edge table
        assert!(!h
            .profile_edge_to_entity_id
            .values()
            .any(|e| e == "axis"));
    }

    #[test]
    fn test_zero_sweep_rejected() {
        let mut model = SolidModel::new();
        let result = revolve(
            &mut model,
            &axis_rectangle(5.0, 10.0),
            &z_axis(),
            0.0,
            "r1",
            &NumericContext::DEFAULT,
        );
        assert!(matches!(result, Err(SketchError::ZeroSweep)));
    }

    #[test]
    fn test_arc_profile_rejected() {
        let mut data = SketchData::default();
        for (id, x, y) in [("p1", 1.0, 0.0), ("p2", 2.0, 0.0), ("c", 1.5, 0.0)] {
            data.points_by_id
                .insert(id.to_string(), SketchPoint { x, y });
        }
        data.entities_by_id.insert(
            "a1".to_string(),
            SketchEntity::Arc {
                p1: "p1".to_string(),
                p2: "p2".to_string(),
                center: "c".to_string(),
                ccw: true,
            },
        );
        data.entities_by_id.insert(
            "l1".to_string(),
            SketchEntity::Line {
                p1: "p2".to_string(),
                p2: "p1".to_string(),
            },
        );
        let profile = build_profiles(&data, &data.points_by_id.clone(), &Plane::xz())
            .unwrap()
            .remove(0);
        let mut model = SolidModel::new();
        let result = revolve(
            &mut model,
            &profile,
            &z_axis(),
            TAU,
            "r1",
            &NumericContext::DEFAULT,
        );
        assert!(matches!(result, Err(SketchError::ArcNotSupported)));
    }
}
