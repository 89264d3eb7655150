//! Extrude: build a B-rep body by sweeping a profile along its plane normal.
//!
//! The body has one bottom cap (outward normal opposite the sweep), one top
//! cap (outward normal along the sweep), and one side face per profile edge
//! — planar quads for lines, cylindrical patches for arcs and circles.
//! Hole loops contribute inner cap loops and inward-facing side walls.
//!
//! Twin pairing is fully explicit: each side face's bottom/top half-edges
//! pair with the matching cap half-edges, and adjacent side faces pair
//! their shared vertical half-edges, so no position keying is needed.

use std::f64::consts::TAU;

use forma_ir::SweepDirection;
use forma_kernel_geom::{Arc3, Circle3, Curve, Cylinder, Plane, SolidModel, Surface};
use forma_kernel_math::{Dir3, NumericContext, Vec3};
use forma_kernel_naming::{FaceOrigin, FaceRole, OperationHistory, SweepKind};
use forma_kernel_topo::{hash, BodyId, FaceId, HalfEdgeId, VertexId};

use crate::profile::{Profile, ProfileEdgeKind, ProfileLoop};
use crate::SketchError;

/// A constructed sweep body plus its freshly captured operation history.
#[derive(Debug)]
pub struct SweepOutput {
    /// The new body.
    pub body: BodyId,
    /// Operation history seeded from this sweep.
    pub history: OperationHistory,
}

/// Per-loop construction scaffolding: vertices and side-face half-edges.
struct LoopBuild {
    bottom_verts: Vec<VertexId>,
    top_verts: Vec<VertexId>,
    bottom_hes: Vec<HalfEdgeId>,
    top_hes: Vec<HalfEdgeId>,
    right_hes: Vec<HalfEdgeId>,
    left_hes: Vec<HalfEdgeId>,
    side_faces: Vec<FaceId>,
    edges: Vec<crate::profile::ProfileEdge>,
}

/// Extrude a profile by `distance` along its plane normal (or against it).
pub fn extrude(
    model: &mut SolidModel,
    profile: &Profile,
    distance: f64,
    direction: SweepDirection,
    feature_id: &str,
    ctx: &NumericContext,
) -> Result<SweepOutput, SketchError> {
    if distance.abs() < ctx.length {
        return Err(SketchError::ZeroExtrusion);
    }
    let sign = match direction {
        SweepDirection::Normal => 1.0,
        SweepDirection::Reversed => -1.0,
    };
    let up = sign * *profile.plane.normal.as_ref();
    let sweep = up * distance.abs();

    // Normalize loop orientation against the sweep direction: outer CCW,
    // holes CW, both as seen looking down the sweep vector.
    let mut outer = profile.outer.clone();
    let mut holes = profile.holes.clone();
    if sign < 0.0 {
        outer.reverse();
        for h in &mut holes {
            h.reverse();
        }
    }

    let mut all_faces: Vec<FaceId> = Vec::new();
    let mut builds: Vec<LoopBuild> = Vec::new();

    let outer_build = build_loop_sides(model, profile, &outer, &sweep, &up, sign, false, ctx)?;
    builds.push(outer_build);
    for hole in &holes {
        let b = build_loop_sides(model, profile, hole, &sweep, &up, sign, true, ctx)?;
        builds.push(b);
    }
    for b in &builds {
        all_faces.extend(b.side_faces.iter().copied());
    }

    // Bottom cap on the profile plane, outward against the sweep.
    let bottom_plane = Plane::new(profile.plane.origin, -up, *profile.plane.x_dir.as_ref());
    let bottom_surface = model.geometry.add_surface(Surface::Plane(bottom_plane));
    // Top cap offset by the sweep, outward along it.
    let top_plane = Plane::new(
        profile.plane.origin + sweep,
        up,
        *profile.plane.x_dir.as_ref(),
    );
    let top_surface = model.geometry.add_surface(Surface::Plane(top_plane));

    let bottom_cap = build_cap(model, &builds, bottom_surface, CapSide::Bottom);
    let top_cap = build_cap(model, &builds, top_surface, CapSide::Top);
    all_faces.push(bottom_cap);
    all_faces.push(top_cap);

    // Remaining twins: vertical half-edges between adjacent side faces.
    for b in &builds {
        let n = b.side_faces.len();
        for i in 0..n {
            let right = b.right_hes[i];
            let left = b.left_hes[(i + 1) % n];
            if model.topology.half_edge_twin(right).is_null() {
                model.topology.add_edge(right, left);
            }
        }
    }
    attach_boundary_curves(model, &builds, &sweep, sign);

    let shell = model.topology.add_shell(all_faces, true);
    let body = model.topology.add_body(vec![shell]);

    let history = capture_history(model, feature_id, &builds, bottom_cap, top_cap, &outer, ctx);
    Ok(SweepOutput { body, history })
}

/// Build the side faces for one loop, creating vertices and half-edges.
///
/// `sign` tracks whether the sweep runs along (+1) or against (-1) the
/// sketch-plane normal: arc angles are measured in the plane frame, while
/// cylinder patches parameterize about the sweep axis, and the two frames
/// disagree by exactly that sign.
#[allow(clippy::too_many_arguments)]
fn build_loop_sides(
    model: &mut SolidModel,
    profile: &Profile,
    loop_: &ProfileLoop,
    sweep: &Vec3,
    up: &Vec3,
    sign: f64,
    is_hole: bool,
    ctx: &NumericContext,
) -> Result<LoopBuild, SketchError> {
    let topo = &mut model.topology;
    let n = loop_.edges.len();

    let mut bottom_verts = Vec::with_capacity(n);
    let mut top_verts = Vec::with_capacity(n);
    for edge in &loop_.edges {
        let start2 = edge.start();
        let bottom = profile.to_3d(start2);
        let top = bottom + sweep;
        bottom_verts.push(topo.add_vertex(bottom));
        top_verts.push(topo.add_vertex(top));
    }

    let mut build = LoopBuild {
        bottom_verts,
        top_verts,
        bottom_hes: Vec::with_capacity(n),
        top_hes: Vec::with_capacity(n),
        right_hes: Vec::with_capacity(n),
        left_hes: Vec::with_capacity(n),
        side_faces: Vec::with_capacity(n),
        edges: loop_.edges.clone(),
    };

    for (i, edge) in loop_.edges.iter().enumerate() {
        let next = (i + 1) % n;
        let b_i = build.bottom_verts[i];
        let b_next = build.bottom_verts[next];
        let t_i = build.top_verts[i];
        let t_next = build.top_verts[next];

        let (surface, reversed) = match &edge.kind {
            ProfileEdgeKind::Line { start, end } => {
                if (end - start).norm() < ctx.length {
                    return Err(SketchError::DegenerateEdge(edge.entity_id.clone()));
                }
                let p0 = profile.to_3d(*start);
                let dir = profile.to_3d(*end) - p0;
                let plane = Plane::from_axes(p0, dir, *sweep);
                (Surface::Plane(plane), false)
            }
            ProfileEdgeKind::Arc {
                start,
                end: _,
                center,
                ccw,
            } => {
                let c3 = profile.to_3d(*center);
                let radius = (start - center).norm();
                if radius < ctx.length {
                    return Err(SketchError::DegenerateEdge(edge.entity_id.clone()));
                }
                let ref_dir = profile.to_3d(*start) - c3;
                let span = sign * arc_span(edge);
                let cyl = Cylinder::new(c3, *up, ref_dir, radius, 0.0, span, 0.0, sweep.norm());
                let ccw_in_sweep_frame = if sign > 0.0 { *ccw } else { !*ccw };
                (Surface::Cylinder(cyl), !ccw_in_sweep_frame)
            }
            ProfileEdgeKind::Circle { center, radius } => {
                let c3 = profile.to_3d(*center);
                let cyl = Cylinder::new(
                    c3,
                    *up,
                    *profile.plane.x_dir.as_ref(),
                    *radius,
                    0.0,
                    TAU,
                    0.0,
                    sweep.norm(),
                );
                (Surface::Cylinder(cyl), is_hole)
            }
        };
        let surface_idx = model.geometry.add_surface(surface);

        // Side face winding: bottom edge, right vertical, top edge reversed,
        // left vertical.
        let h_bot = topo.add_half_edge(b_i);
        let h_right = topo.add_half_edge(b_next);
        let h_top = topo.add_half_edge(t_next);
        let h_left = topo.add_half_edge(t_i);
        let loop_id = topo.add_loop(&[h_bot, h_right, h_top, h_left]);
        let face = topo.add_face(loop_id, surface_idx, reversed);

        build.bottom_hes.push(h_bot);
        build.right_hes.push(h_right);
        build.top_hes.push(h_top);
        build.left_hes.push(h_left);
        build.side_faces.push(face);
    }

    Ok(build)
}

fn arc_span(edge: &crate::profile::ProfileEdge) -> f64 {
    if let ProfileEdgeKind::Arc {
        start,
        end,
        center,
        ccw,
    } = &edge.kind
    {
        let a0 = (start.y - center.y).atan2(start.x - center.x);
        let a1 = (end.y - center.y).atan2(end.x - center.x);
        let mut span = a1 - a0;
        if *ccw {
            if span <= 0.0 {
                span += TAU;
            }
        } else if span >= 0.0 {
            span -= TAU;
        }
        span
    } else {
        0.0
    }
}

enum CapSide {
    Bottom,
    Top,
}

/// Build a cap face over every loop of the sweep. The bottom cap reverses
/// loop traversal (its outward normal opposes the sweep); the top cap keeps
/// it. Each cap half-edge twins with the matching side-face half-edge.
fn build_cap(
    model: &mut SolidModel,
    builds: &[LoopBuild],
    surface: u32,
    side: CapSide,
) -> FaceId {
    let topo = &mut model.topology;
    let mut cap_loops = Vec::with_capacity(builds.len());

    for build in builds {
        let n = build.side_faces.len();
        let mut hes = Vec::with_capacity(n);
        match side {
            CapSide::Top => {
                // Forward traversal over top vertices: t_i → t_{i+1}
                for i in 0..n {
                    hes.push(topo.add_half_edge(build.top_verts[i]));
                }
            }
            CapSide::Bottom => {
                // Reversed traversal over bottom vertices: b_{i+1} → b_i,
                // walked backwards so the cycle is continuous.
                for i in (0..n).rev() {
                    hes.push(topo.add_half_edge(build.bottom_verts[(i + 1) % n]));
                }
            }
        }
        let l = topo.add_loop(&hes);
        cap_loops.push(l);

        // Twin with side faces
        match side {
            CapSide::Top => {
                for (i, &he) in hes.iter().enumerate() {
                    topo.add_edge(build.top_hes[i], he);
                }
            }
            CapSide::Bottom => {
                for (k, &he) in hes.iter().enumerate() {
                    let i = n - 1 - k;
                    topo.add_edge(build.bottom_hes[i], he);
                }
            }
        }
    }

    let face = topo.add_face(cap_loops[0], surface, false);
    for &l in &cap_loops[1..] {
        topo.add_inner_loop(face, l);
    }
    face
}

/// Attach arc/circle curve descriptors to the bottom and top edges of
/// curved side faces so edge and cap tessellation follow the true boundary.
/// The circle frame is the side-face cylinder's own axis system, so cap
/// sampling and side-face grids land on the same points.
fn attach_boundary_curves(model: &mut SolidModel, builds: &[LoopBuild], sweep: &Vec3, sign: f64) {
    for build in builds {
        for (i, edge) in build.edges.iter().enumerate() {
            let radius = match &edge.kind {
                ProfileEdgeKind::Arc { start, center, .. } => (start - center).norm(),
                ProfileEdgeKind::Circle { radius, .. } => *radius,
                ProfileEdgeKind::Line { .. } => continue,
            };
            let bottom_edge = model.topology.half_edge_edge(build.bottom_hes[i]);
            let top_edge = model.topology.half_edge_edge(build.top_hes[i]);
            if bottom_edge.is_null() || top_edge.is_null() {
                continue;
            }
            let (c3, xd, yd) = match model.face_surface(build.side_faces[i]) {
                Surface::Cylinder(cyl) => {
                    let xd = *cyl.ref_dir.as_ref();
                    let yd = cyl.axis.as_ref().cross(&xd);
                    (cyl.center, xd, yd)
                }
                _ => continue,
            };
            let bottom_circle = Circle3 {
                center: c3,
                radius,
                x_dir: Dir3::new_normalize(xd),
                y_dir: Dir3::new_normalize(yd),
            };
            let top_circle = Circle3 {
                center: c3 + sweep,
                radius,
                x_dir: Dir3::new_normalize(xd),
                y_dir: Dir3::new_normalize(yd),
            };
            let (bottom_curve, top_curve) = match &edge.kind {
                ProfileEdgeKind::Circle { .. } => {
                    (Curve::Circle(bottom_circle), Curve::Circle(top_circle))
                }
                ProfileEdgeKind::Arc { .. } => {
                    // Measured in the cylinder's own (sweep-axis) frame.
                    let span = sign * arc_span(edge);
                    (
                        Curve::Arc(Arc3 {
                            circle: bottom_circle,
                            start_angle: 0.0,
                            end_angle: span,
                            ccw: span > 0.0,
                        }),
                        Curve::Arc(Arc3 {
                            circle: top_circle,
                            start_angle: 0.0,
                            end_angle: span,
                            ccw: span > 0.0,
                        }),
                    )
                }
                ProfileEdgeKind::Line { .. } => continue,
            };
            let bc = model.geometry.add_curve(bottom_curve);
            let tc = model.geometry.add_curve(top_curve);
            model.topology.set_edge_curve(bottom_edge, bc);
            model.topology.set_edge_curve(top_edge, tc);
        }
    }
}

/// Capture operation history: cap hashes, side mappings in profile-edge
/// order, the edge→entity table, and the initial origin map.
fn capture_history(
    model: &SolidModel,
    feature_id: &str,
    builds: &[LoopBuild],
    bottom_cap: FaceId,
    top_cap: FaceId,
    outer: &ProfileLoop,
    ctx: &NumericContext,
) -> OperationHistory {
    let topo = &model.topology;
    let mut history = OperationHistory {
        sweep: Some(SweepKind::Extrude),
        bottom_cap_hash: Some(hash::face_topology_hash(topo, bottom_cap, ctx)),
        top_cap_hash: Some(hash::face_topology_hash(topo, top_cap, ctx)),
        profile_loop_id: Some(outer.loop_id.clone()),
        ..Default::default()
    };

    history.face_hash_to_origin.insert(
        history.bottom_cap_hash.unwrap(),
        FaceOrigin {
            source_feature_id: feature_id.to_string(),
            entity_id: None,
            face_type: FaceRole::BottomCap,
            sweep: SweepKind::Extrude,
        },
    );
    history.face_hash_to_origin.insert(
        history.top_cap_hash.unwrap(),
        FaceOrigin {
            source_feature_id: feature_id.to_string(),
            entity_id: None,
            face_type: FaceRole::TopCap,
            sweep: SweepKind::Extrude,
        },
    );

    let mut profile_edge_index = 0usize;
    for build in builds {
        for (i, face) in build.side_faces.iter().enumerate() {
            let face_hash = hash::face_topology_hash(topo, *face, ctx);
            history
                .side_face_mappings
                .push((profile_edge_index, face_hash));
            history
                .profile_edge_to_entity_id
                .insert(profile_edge_index, build.edges[i].entity_id.clone());
            history.face_hash_to_origin.insert(
                face_hash,
                FaceOrigin {
                    source_feature_id: feature_id.to_string(),
                    entity_id: Some(build.edges[i].entity_id.clone()),
                    face_type: FaceRole::Side,
                    sweep: SweepKind::Extrude,
                },
            );
            profile_edge_index += 1;
        }
    }

    history
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::build_profiles;
    use forma_ir::{SketchData, SketchEntity, SketchPoint};
    use forma_kernel_tessellate::{mesh_bounds, mesh_volume, tessellate_body, TessellationParams};

    fn square_profile(half: f64) -> Profile {
        let mut data = SketchData::default();
        for (id, x, y) in [
            ("p1", -half, -half),
            ("p2", half, -half),
            ("p3", half, half),
            ("p4", -half, half),
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
        build_profiles(&data, &data.points_by_id.clone(), &Plane::xy())
            .unwrap()
            .remove(0)
    }

    #[test]
    fn test_extrude_square_counts() {
        let mut model = SolidModel::new();
        let out = extrude(
            &mut model,
            &square_profile(5.0),
            10.0,
            SweepDirection::Normal,
            "e1",
            &NumericContext::DEFAULT,
        )
        .unwrap();
        let faces = model.topology.body_faces(out.body);
        assert_eq!(faces.len(), 6);
        let edges = model.topology.body_edges(out.body);
        assert_eq!(edges.len(), 12);
    }

    #[test]
    fn test_extrude_all_half_edges_paired() {
        let mut model = SolidModel::new();
        let out = extrude(
            &mut model,
            &square_profile(5.0),
            10.0,
            SweepDirection::Normal,
            "e1",
            &NumericContext::DEFAULT,
        )
        .unwrap();
        for face in model.topology.body_faces(out.body) {
            let mut loops = vec![model.topology.face_outer_loop(face)];
            loops.extend(model.topology.face_inner_loops(face).iter().copied());
            for l in loops {
                for he in model.topology.loop_half_edges(l) {
                    let twin = model.topology.half_edge_twin(he);
                    assert!(!twin.is_null(), "unpaired half-edge on face {face:?}");
                    assert_eq!(model.topology.half_edge_twin(twin), he);
                }
            }
        }
    }

    #[test]
    fn test_extrude_volume_and_bounds() {
        let mut model = SolidModel::new();
        let out = extrude(
            &mut model,
            &square_profile(5.0),
            10.0,
            SweepDirection::Normal,
            "e1",
            &NumericContext::DEFAULT,
        )
        .unwrap();
        let mesh = tessellate_body(
            &model,
            out.body,
            &TessellationParams::default(),
            &NumericContext::DEFAULT,
        );
        let vol = mesh_volume(&mesh);
        assert!((vol - 1000.0).abs() < 1.0, "volume {vol}");
        let (min, max) = mesh_bounds(&mesh);
        assert!((min[0] + 5.0).abs() < 1e-6 && (max[0] - 5.0).abs() < 1e-6);
        assert!((min[2]).abs() < 1e-6 && (max[2] - 10.0).abs() < 1e-6);
    }

    #[test]
    fn test_extrude_reversed_direction() {
        let mut model = SolidModel::new();
        let out = extrude(
            &mut model,
            &square_profile(5.0),
            10.0,
            SweepDirection::Reversed,
            "e1",
            &NumericContext::DEFAULT,
        )
        .unwrap();
        let mesh = tessellate_body(
            &model,
            out.body,
            &TessellationParams::default(),
            &NumericContext::DEFAULT,
        );
        let vol = mesh_volume(&mesh);
        assert!((vol - 1000.0).abs() < 1.0, "volume {vol}");
        let (min, max) = mesh_bounds(&mesh);
        assert!((min[2] + 10.0).abs() < 1e-6 && max[2].abs() < 1e-6);
    }

    #[test]
    fn test_extrude_history_capture() {
        let mut model = SolidModel::new();
        let out = extrude(
            &mut model,
            &square_profile(5.0),
            10.0,
            SweepDirection::Normal,
            "e1",
            &NumericContext::DEFAULT,
        )
        .unwrap();
        let h = &out.history;
        assert!(h.bottom_cap_hash.is_some());
        assert!(h.top_cap_hash.is_some());
        assert_eq!(h.side_face_mappings.len(), 4);
        assert_eq!(h.profile_edge_to_entity_id.len(), 4);
        // 6 faces total in the origin map
        assert_eq!(h.face_hash_to_origin.len(), 6);
        assert_eq!(h.profile_edge_to_entity_id[&0], "l1");
        let side_hash = h.side_face_mappings[0].1;
        let origin = &h.face_hash_to_origin[&side_hash];
        assert_eq!(origin.entity_id.as_deref(), Some("l1"));
        assert_eq!(origin.face_type, FaceRole::Side);
    }

    #[test]
    fn test_extrude_zero_distance() {
        let mut model = SolidModel::new();
        let result = extrude(
            &mut model,
            &square_profile(5.0),
            0.0,
            SweepDirection::Normal,
            "e1",
            &NumericContext::DEFAULT,
        );
        assert!(matches!(result, Err(SketchError::ZeroExtrusion)));
    }

    #[test]
    fn test_extrude_circle_profile() {
        let mut data = SketchData::default();
        data.points_by_id
            .insert("c".to_string(), SketchPoint { x: 0.0, y: 0.0 });
        data.entities_by_id.insert(
            "circ1".to_string(),
            SketchEntity::Circle {
                center: "c".to_string(),
                radius: 5.0,
            },
        );
        let profile = build_profiles(&data, &data.points_by_id.clone(), &Plane::xy())
            .unwrap()
            .remove(0);
        let mut model = SolidModel::new();
        let out = extrude(
            &mut model,
            &profile,
            10.0,
            SweepDirection::Normal,
            "e1",
            &NumericContext::DEFAULT,
        )
        .unwrap();
        // One cylindrical side face + 2 caps
        let faces = model.topology.body_faces(out.body);
        assert_eq!(faces.len(), 3);
        let mesh = tessellate_body(
            &model,
            out.body,
            &TessellationParams::default(),
            &NumericContext::DEFAULT,
        );
        let vol = mesh_volume(&mesh);
        let expect = std::f64::consts::PI * 25.0 * 10.0;
        assert!(
            (vol - expect).abs() < expect * 0.02,
            "volume {vol} vs {expect}"
        );
    }
}
