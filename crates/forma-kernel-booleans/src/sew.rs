//! Stitching: turn selected pieces into a fresh body and match twins.
//!
//! Vertices are deduplicated with the same bucket tolerance the imprint
//! stage snapped to, so pieces cut from different operands meet exactly.
//! Tool pieces marked for flip reverse both their loop order and their
//! stored plane normal — one representation change, not two cancelling
//! ones. Twin matching walks every half-edge and pairs the two uses of
//! each vertex pair; any other count is a non-manifold warning.

use std::collections::HashMap;

use forma_kernel_geom::{Plane, SolidModel, Surface};
use forma_kernel_math::{NumericContext, Point2, Point3, Vec3};
use forma_kernel_topo::{BodyId, FaceId, VertexId};

/// One piece ready for stitching, in its source face's frame.
#[derive(Debug, Clone)]
pub struct StitchInput {
    /// Frame origin.
    pub origin: Point3,
    /// Frame x axis.
    pub fx: Vec3,
    /// Frame y axis.
    pub fy: Vec3,
    /// Outer boundary, CCW in the frame.
    pub outer: Vec<Point2>,
    /// Holes, CW in the frame.
    pub holes: Vec<Vec<Point2>>,
    /// Reverse orientation (subtract keeps tool faces inside out).
    pub flip: bool,
    /// Input topology hash of the source face.
    pub source_hash: u32,
    /// True when the source face came from the tool body.
    pub from_tool: bool,
}

/// A stitched body with per-face provenance.
#[derive(Debug)]
pub struct StitchResult {
    /// The new body.
    pub body: BodyId,
    /// `(face, source hash, from tool)` per created face.
    pub new_faces: Vec<(FaceId, u32, bool)>,
    /// Non-manifold warnings.
    pub warnings: Vec<String>,
}

/// Stitch pieces into a fresh body in the arena.
pub fn stitch(
    model: &mut SolidModel,
    inputs: &[StitchInput],
    ctx: &NumericContext,
) -> StitchResult {
    let bucket = (1e3 * ctx.length).max(1e-6);
    let mut vertex_cache: HashMap<(i64, i64, i64), VertexId> = HashMap::new();
    let mut warnings = Vec::new();

    let mut faces = Vec::new();
    let mut new_faces = Vec::new();

    for input in inputs {
        let outward_raw = input.fx.cross(&input.fy);
        let outward = if input.flip { -outward_raw } else { outward_raw };
        let to_3d =
            |p: &Point2| -> Point3 { input.origin + p.x * input.fx + p.y * input.fy };

        let mut outer: Vec<Point2> = input.outer.clone();
        let mut holes: Vec<Vec<Point2>> = input.holes.clone();
        if input.flip {
            outer.reverse();
            for h in &mut holes {
                h.reverse();
            }
        }

        let outer_verts = loop_vertices(model, &mut vertex_cache, bucket, &outer, &to_3d);
        if outer_verts.len() < 3 {
            continue;
        }

        let surface = model
            .geometry
            .add_surface(Surface::Plane(Plane::new(input.origin, outward, input.fx)));

        let topo = &mut model.topology;
        let hes: Vec<_> = outer_verts
            .iter()
            .map(|&v| topo.add_half_edge(v))
            .collect();
        let outer_loop = topo.add_loop(&hes);
        let face = topo.add_face(outer_loop, surface, false);

        for hole in &holes {
            let hole_verts = loop_vertices(model, &mut vertex_cache, bucket, hole, &to_3d);
            if hole_verts.len() < 3 {
                continue;
            }
            let topo = &mut model.topology;
            let hes: Vec<_> = hole_verts
                .iter()
                .map(|&v| topo.add_half_edge(v))
                .collect();
            let l = topo.add_loop(&hes);
            topo.add_inner_loop(face, l);
        }

        faces.push(face);
        new_faces.push((face, input.source_hash, input.from_tool));
    }

    match_twins(model, &faces, &mut warnings);

    let shell = model.topology.add_shell(faces, true);
    let body = model.topology.add_body(vec![shell]);

    StitchResult {
        body,
        new_faces,
        warnings,
    }
}

/// Create (or reuse) vertices for one loop, dropping bucket-collapsed
/// duplicates of consecutive points.
fn loop_vertices<F>(
    model: &mut SolidModel,
    cache: &mut HashMap<(i64, i64, i64), VertexId>,
    bucket: f64,
    pts: &[Point2],
    to_3d: &F,
) -> Vec<VertexId>
where
    F: Fn(&Point2) -> Point3,
{
    let key = |p: &Point3| -> (i64, i64, i64) {
        (
            (p.x / bucket).round() as i64,
            (p.y / bucket).round() as i64,
            (p.z / bucket).round() as i64,
        )
    };
    let mut out: Vec<VertexId> = Vec::with_capacity(pts.len());
    for p2 in pts {
        let p3 = to_3d(p2);
        let v = *cache
            .entry(key(&p3))
            .or_insert_with(|| model.topology.add_vertex(p3));
        if out.last() == Some(&v) {
            continue;
        }
        out.push(v);
    }
    while out.len() > 1 && out.first() == out.last() {
        out.pop();
    }
    out
}

/// Pair every half-edge with its opposite use of the same vertex pair.
fn match_twins(model: &mut SolidModel, faces: &[FaceId], warnings: &mut Vec<String>) {
    let topo = &model.topology;
    let mut by_pair: HashMap<(VertexId, VertexId), Vec<forma_kernel_topo::HalfEdgeId>> =
        HashMap::new();
    for &face in faces {
        let mut loops = vec![topo.face_outer_loop(face)];
        loops.extend(topo.face_inner_loops(face).iter().copied());
        for l in loops {
            for he in topo.loop_half_edges(l) {
                let a = topo.half_edge_origin(he);
                let b = topo.half_edge_dest(he);
                let k = (a.min(b), a.max(b));
                by_pair.entry(k).or_default().push(he);
            }
        }
    }

    let mut non_manifold = 0usize;
    let topo = &mut model.topology;
    for (_pair, hes) in by_pair {
        if hes.len() == 2 {
            topo.add_edge(hes[0], hes[1]);
        } else {
            non_manifold += 1;
            // Best effort: close what we can, leave the rest open.
            for chunk in hes.chunks(2) {
                if chunk.len() == 2 {
                    topo.add_edge(chunk[0], chunk[1]);
                } else {
                    topo.add_edge(chunk[0], forma_kernel_topo::HalfEdgeId::NULL);
                }
            }
        }
    }
    if non_manifold > 0 {
        warnings.push(format!(
            "NON_MANIFOLD_OUTPUT: {non_manifold} edges without exactly two half-edges"
        ));
    }
}
