#![warn(missing_docs)]

//! Triangle mesh generation for forma bodies.
//!
//! Converts B-rep bodies to render meshes by:
//! 1. Walking each live face of the body in shell order
//! 2. Triangulating planar faces via ear-clipping (with hole bridging)
//! 3. Sampling cylindrical and revolved faces on a parameter grid
//!
//! The output carries a `face_map` entry per triangle and an `edge_map`
//! entry per boundary segment so the renderer can hit-test back to topology,
//! plus the per-face and per-edge topology hashes that operation history and
//! the reference index key on. Face and edge index spaces match
//! `Topology::body_faces` / `Topology::body_edges` order.

use forma_kernel_geom::{Curve, SolidModel, Surface};
use forma_kernel_math::{NumericContext, Point2, Point3, Vec3};
use forma_kernel_topo::{hash, BodyId, FaceId, Topology};
use serde::{Deserialize, Serialize};

/// A transferable triangle mesh with topology maps.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurfaceMesh {
    /// Vertex positions, 3 floats per vertex.
    pub positions: Vec<f32>,
    /// Vertex normals, 3 floats per vertex.
    pub normals: Vec<f32>,
    /// Triangle indices, 3 per triangle.
    pub indices: Vec<u32>,
    /// Face index per triangle.
    pub face_map: Vec<u32>,
    /// Edge line segments, 6 floats per segment.
    pub edges: Vec<f32>,
    /// Edge index per segment.
    pub edge_map: Vec<u32>,
    /// Topology hash per face index.
    pub face_hashes: Vec<u32>,
    /// Topology hash per edge index.
    pub edge_hashes: Vec<u32>,
}

impl SurfaceMesh {
    /// Create an empty mesh.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of triangles.
    pub fn num_triangles(&self) -> usize {
        self.indices.len() / 3
    }

    /// Number of vertices.
    pub fn num_vertices(&self) -> usize {
        self.positions.len() / 3
    }

    /// Number of edge segments.
    pub fn num_edge_segments(&self) -> usize {
        self.edges.len() / 6
    }
}

/// Tessellation quality parameters.
#[derive(Debug, Clone, Copy)]
pub struct TessellationParams {
    /// Segment count for full circles; arcs get a proportional share.
    pub segments: u32,
}

impl Default for TessellationParams {
    fn default() -> Self {
        Self { segments: 32 }
    }
}

/// Tessellate one body of the model.
pub fn tessellate_body(
    model: &SolidModel,
    body: BodyId,
    params: &TessellationParams,
    ctx: &NumericContext,
) -> SurfaceMesh {
    let mut mesh = SurfaceMesh::new();
    let topo = &model.topology;

    for (face_index, &face) in topo.body_faces(body).iter().enumerate() {
        mesh.face_hashes
            .push(hash::face_topology_hash(topo, face, ctx));
        match model.face_surface(face) {
            Surface::Plane(_) => {
                tessellate_planar_face(model, face, face_index as u32, params, &mut mesh);
            }
            Surface::Cylinder(cyl) => {
                let reversed = topo.face_reversed(face);
                let n = angular_steps(params.segments, cyl.sweep);
                grid_face(
                    face_index as u32,
                    n,
                    1,
                    |i, j| {
                        let u = cyl.start_angle + cyl.sweep * i as f64 / n as f64;
                        let v = cyl.v_min + (cyl.v_max - cyl.v_min) * j as f64;
                        let p = cyl.evaluate(u, v);
                        let mut normal = cyl.normal(u);
                        if reversed {
                            normal = -normal;
                        }
                        (p, normal)
                    },
                    reversed,
                    &mut mesh,
                );
            }
            Surface::Spun(spun) => {
                let reversed = topo.face_reversed(face);
                let n = angular_steps(params.segments, spun.sweep);
                grid_face(
                    face_index as u32,
                    n,
                    1,
                    |i, j| {
                        let ang = spun.sweep * i as f64 / n as f64;
                        let t = j as f64;
                        let p = spun.evaluate(t, ang);
                        let mut normal = spun.normal(t, ang);
                        if reversed {
                            normal = -normal;
                        }
                        (p, normal)
                    },
                    reversed,
                    &mut mesh,
                );
            }
        }
    }

    for (edge_index, &edge) in topo.body_edges(body).iter().enumerate() {
        mesh.edge_hashes
            .push(hash::edge_topology_hash(topo, edge, ctx));
        emit_edge_segments(model, topo, edge, edge_index as u32, params, &mut mesh);
    }

    mesh
}

fn angular_steps(segments: u32, sweep: f64) -> usize {
    let frac = (sweep.abs() / std::f64::consts::TAU).min(1.0);
    ((segments as f64 * frac).ceil() as usize).max(2)
}

// =============================================================================
// Planar faces
// =============================================================================

fn tessellate_planar_face(
    model: &SolidModel,
    face: FaceId,
    face_index: u32,
    params: &TessellationParams,
    mesh: &mut SurfaceMesh,
) {
    let topo = &model.topology;
    let plane = match model.face_plane(face) {
        Some(p) => p.clone(),
        None => return,
    };
    let reversed = topo.face_reversed(face);

    // Sample loops into the plane frame (curved boundary edges expand into
    // polylines). The outer loop is forced CCW and holes CW; the reversed
    // flag then decides the final triangle winding.
    let mut outer = loop_polygon(model, topo.face_outer_loop(face), &plane, params);
    if outer.len() < 3 {
        return;
    }
    if signed_area(&outer) < 0.0 {
        outer.reverse();
    }

    let mut holes: Vec<Vec<Point2>> = Vec::new();
    for &inner in topo.face_inner_loops(face) {
        let mut pts = loop_polygon(model, inner, &plane, params);
        if pts.len() < 3 {
            continue;
        }
        if signed_area(&pts) > 0.0 {
            pts.reverse();
        }
        holes.push(pts);
    }

    let merged = bridge_holes(&outer, &holes);
    let tris = ear_clip(&merged);

    let base = mesh.num_vertices() as u32;
    let normal = if reversed {
        -*plane.normal.as_ref()
    } else {
        *plane.normal.as_ref()
    };
    for uv in &merged {
        let p = plane.evaluate(*uv);
        push_vertex(mesh, &p, &normal);
    }
    for tri in tris.chunks(3) {
        // CCW in the plane frame faces along the surface normal; flip for
        // reversed faces so winding matches the outward normal.
        if reversed {
            mesh.indices
                .extend([base + tri[0], base + tri[2], base + tri[1]]);
        } else {
            mesh.indices
                .extend([base + tri[0], base + tri[1], base + tri[2]]);
        }
        mesh.face_map.push(face_index);
    }
}

/// Sample a loop's boundary as a 2D polygon in the plane frame. Straight
/// edges contribute their start vertex; arc/circle edges expand into
/// polylines at the same angular resolution as the adjacent curved face
/// grids, keeping the mesh watertight along shared boundaries.
fn loop_polygon(
    model: &SolidModel,
    l: forma_kernel_topo::LoopId,
    plane: &forma_kernel_geom::Plane,
    params: &TessellationParams,
) -> Vec<Point2> {
    let topo = &model.topology;
    let mut pts = Vec::new();
    for he in topo.loop_half_edges(l) {
        let origin = topo.vertex_point(topo.half_edge_origin(he));
        let edge = topo.half_edge_edge(he);
        let curve_idx = if edge.is_null() {
            forma_kernel_topo::NULL_GEOM
        } else {
            topo.edge_curve(edge)
        };
        if curve_idx == forma_kernel_topo::NULL_GEOM {
            pts.push(plane.project(&origin));
            continue;
        }
        match &model.geometry.curves[curve_idx as usize] {
            Curve::Line { .. } => pts.push(plane.project(&origin)),
            Curve::Arc(arc) => {
                let n = angular_steps(params.segments, arc.span());
                // Traverse in the half-edge's direction.
                let forward = (arc.evaluate(0.0) - origin).norm()
                    <= (arc.evaluate(1.0) - origin).norm();
                for k in 0..n {
                    let t = k as f64 / n as f64;
                    let t = if forward { t } else { 1.0 - t };
                    pts.push(plane.project(&arc.evaluate(t)));
                }
            }
            Curve::Circle(circle) => {
                let n = params.segments.max(3) as usize;
                // Start at the vertex's own angle so samples line up with
                // the side-face grid sharing this boundary.
                let rel = origin - circle.center;
                let a0 = rel
                    .dot(circle.y_dir.as_ref())
                    .atan2(rel.dot(circle.x_dir.as_ref()));
                for k in 0..n {
                    let a = a0 + std::f64::consts::TAU * k as f64 / n as f64;
                    pts.push(plane.project(&circle.evaluate(a)));
                }
            }
        }
    }
    pts
}

fn push_vertex(mesh: &mut SurfaceMesh, p: &Point3, n: &Vec3) {
    mesh.positions
        .extend([p.x as f32, p.y as f32, p.z as f32]);
    mesh.normals.extend([n.x as f32, n.y as f32, n.z as f32]);
}

/// Twice the signed area of a 2D polygon (positive = CCW).
fn signed_area(pts: &[Point2]) -> f64 {
    let mut a = 0.0;
    for i in 0..pts.len() {
        let j = (i + 1) % pts.len();
        a += pts[i].x * pts[j].y - pts[j].x * pts[i].y;
    }
    a
}

/// Merge hole loops into the outer loop with bridge edges, producing a
/// single (weakly simple) polygon ready for ear-clipping.
///
/// Bridges are chosen brute-force: the closest hole/outer vertex pair whose
/// connecting segment crosses no polygon edge. Quadratic, but profile and
/// boolean faces are small.
fn bridge_holes(outer: &[Point2], holes: &[Vec<Point2>]) -> Vec<Point2> {
    let mut poly: Vec<Point2> = outer.to_vec();
    let mut remaining: Vec<Vec<Point2>> = holes.to_vec();

    // Attach holes rightmost-first so earlier bridges don't occlude later ones.
    remaining.sort_by(|a, b| {
        let ax = a.iter().map(|p| p.x).fold(f64::NEG_INFINITY, f64::max);
        let bx = b.iter().map(|p| p.x).fold(f64::NEG_INFINITY, f64::max);
        bx.partial_cmp(&ax).unwrap_or(std::cmp::Ordering::Equal)
    });

    for hole in remaining {
        let mut best: Option<(usize, usize, f64)> = None;
        for (hi, hp) in hole.iter().enumerate() {
            for (pi, pp) in poly.iter().enumerate() {
                let d2 = (hp - pp).norm_squared();
                if let Some((_, _, best_d2)) = best {
                    if d2 >= best_d2 {
                        continue;
                    }
                }
                if bridge_is_clear(hp, pp, &poly, &hole) {
                    best = Some((hi, pi, d2));
                }
            }
        }
        let (hi, pi, _) = match best {
            Some(b) => b,
            // No clear bridge found; degenerate input. Drop the hole rather
            // than emit a self-intersecting polygon.
            None => continue,
        };
        // Splice: outer[..=pi], hole[hi..], hole[..=hi], outer[pi..]
        let mut next: Vec<Point2> = Vec::with_capacity(poly.len() + hole.len() + 2);
        next.extend_from_slice(&poly[..=pi]);
        for k in 0..=hole.len() {
            next.push(hole[(hi + k) % hole.len()]);
        }
        next.extend_from_slice(&poly[pi..]);
        poly = next;
    }
    poly
}

fn bridge_is_clear(a: &Point2, b: &Point2, poly: &[Point2], hole: &[Point2]) -> bool {
    let check = |ring: &[Point2]| -> bool {
        for i in 0..ring.len() {
            let c = ring[i];
            let d = ring[(i + 1) % ring.len()];
            if segments_cross_strict(*a, *b, c, d) {
                return false;
            }
        }
        true
    };
    check(poly) && check(hole)
}

/// Proper crossing test that ignores shared endpoints.
fn segments_cross_strict(a: Point2, b: Point2, c: Point2, d: Point2) -> bool {
    const EPS: f64 = 1e-12;
    if (a - c).norm_squared() < EPS
        || (a - d).norm_squared() < EPS
        || (b - c).norm_squared() < EPS
        || (b - d).norm_squared() < EPS
    {
        return false;
    }
    let cross = |o: Point2, p: Point2, q: Point2| (p.x - o.x) * (q.y - o.y) - (p.y - o.y) * (q.x - o.x);
    let d1 = cross(a, b, c);
    let d2 = cross(a, b, d);
    let d3 = cross(c, d, a);
    let d4 = cross(c, d, b);
    (d1 * d2 < -EPS) && (d3 * d4 < -EPS)
}

/// Ear-clip a CCW (weakly simple) polygon. Returns local triangle indices.
fn ear_clip(pts: &[Point2]) -> Vec<u32> {
    let n = pts.len();
    if n < 3 {
        return Vec::new();
    }
    let mut indices: Vec<u32> = (0..n as u32).collect();
    let mut tris = Vec::with_capacity((n - 2) * 3);
    let mut guard = 0usize;
    let max_iters = n * n + 16;

    while indices.len() > 3 && guard < max_iters {
        guard += 1;
        let m = indices.len();
        let mut clipped = false;
        for i in 0..m {
            let i0 = indices[(i + m - 1) % m];
            let i1 = indices[i];
            let i2 = indices[(i + 1) % m];
            let a = pts[i0 as usize];
            let b = pts[i1 as usize];
            let c = pts[i2 as usize];
            let cross = (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x);
            if cross <= 1e-14 {
                continue; // reflex or degenerate corner
            }
            let mut ear = true;
            for &j in &indices {
                if j == i0 || j == i1 || j == i2 {
                    continue;
                }
                if point_in_triangle(pts[j as usize], a, b, c) {
                    ear = false;
                    break;
                }
            }
            if ear {
                tris.extend([i0, i1, i2]);
                indices.remove(i);
                clipped = true;
                break;
            }
        }
        if !clipped {
            // Numerically stuck; fan the rest rather than loop forever.
            break;
        }
    }
    if indices.len() >= 3 {
        for i in 1..indices.len() - 1 {
            tris.extend([indices[0], indices[i], indices[i + 1]]);
        }
    }
    tris
}

fn point_in_triangle(p: Point2, a: Point2, b: Point2, c: Point2) -> bool {
    let sign = |p1: Point2, p2: Point2, p3: Point2| {
        (p1.x - p3.x) * (p2.y - p3.y) - (p2.x - p3.x) * (p1.y - p3.y)
    };
    let d1 = sign(p, a, b);
    let d2 = sign(p, b, c);
    let d3 = sign(p, c, a);
    let has_neg = d1 < -1e-14 || d2 < -1e-14 || d3 < -1e-14;
    let has_pos = d1 > 1e-14 || d2 > 1e-14 || d3 > 1e-14;
    !(has_neg && has_pos)
}

// =============================================================================
// Curved faces
// =============================================================================

/// Emit an (n+1)×(m+1) sample grid as triangles for one face.
///
/// Winding is derived from geometry: the first quad's facet normal is
/// compared against the sampled normal, so negative sweeps (which flip the
/// parameter-space handedness) still triangulate outward. The `reversed`
/// argument only breaks ties for degenerate first quads.
fn grid_face<F>(
    face_index: u32,
    n: usize,
    m: usize,
    sample: F,
    reversed: bool,
    mesh: &mut SurfaceMesh,
) where
    F: Fn(usize, usize) -> (Point3, Vec3),
{
    let base = mesh.num_vertices() as u32;
    for j in 0..=m {
        for i in 0..=n {
            let (p, normal) = sample(i, j);
            push_vertex(mesh, &p, &normal);
        }
    }
    let stride = (n + 1) as u32;

    // Probe quads until one has usable area, then lock the flip decision.
    let mut flip = reversed;
    'probe: for j in 0..m {
        for i in 0..n {
            let at = |idx: u32| -> Vec3 {
                let k = (base + idx) as usize * 3;
                Vec3::new(
                    mesh.positions[k] as f64,
                    mesh.positions[k + 1] as f64,
                    mesh.positions[k + 2] as f64,
                )
            };
            let v00 = (j * (n + 1) + i) as u32;
            let p00 = at(v00);
            let p10 = at(v00 + 1);
            let p01 = at(v00 + stride);
            let facet = (p10 - p00).cross(&(p01 - p00));
            if facet.norm() > 1e-12 {
                let k = (base + v00) as usize * 3;
                let sampled = Vec3::new(
                    mesh.normals[k] as f64,
                    mesh.normals[k + 1] as f64,
                    mesh.normals[k + 2] as f64,
                );
                flip = facet.dot(&sampled) < 0.0;
                break 'probe;
            }
        }
    }

    for j in 0..m as u32 {
        for i in 0..n as u32 {
            let v00 = base + j * stride + i;
            let v10 = v00 + 1;
            let v01 = v00 + stride;
            let v11 = v01 + 1;
            if flip {
                mesh.indices.extend([v00, v11, v10]);
                mesh.indices.extend([v00, v01, v11]);
            } else {
                mesh.indices.extend([v00, v10, v11]);
                mesh.indices.extend([v00, v11, v01]);
            }
            mesh.face_map.push(face_index);
            mesh.face_map.push(face_index);
        }
    }
}

// =============================================================================
// Edges
// =============================================================================

fn emit_edge_segments(
    model: &SolidModel,
    topo: &Topology,
    edge: forma_kernel_topo::EdgeId,
    edge_index: u32,
    params: &TessellationParams,
    mesh: &mut SurfaceMesh,
) {
    let curve_idx = topo.edge_curve(edge);
    let mut push_seg = |a: Point3, b: Point3| {
        mesh.edges.extend([
            a.x as f32, a.y as f32, a.z as f32, b.x as f32, b.y as f32, b.z as f32,
        ]);
        mesh.edge_map.push(edge_index);
    };

    if curve_idx == forma_kernel_topo::NULL_GEOM {
        let (a, b) = topo.edge_endpoints(edge);
        push_seg(a, b);
        return;
    }
    match &model.geometry.curves[curve_idx as usize] {
        Curve::Line { start, end } => push_seg(*start, *end),
        Curve::Arc(arc) => {
            let n = angular_steps(params.segments, arc.span());
            let mut prev = arc.evaluate(0.0);
            for i in 1..=n {
                let p = arc.evaluate(i as f64 / n as f64);
                push_seg(prev, p);
                prev = p;
            }
        }
        Curve::Circle(circle) => {
            let n = params.segments.max(3) as usize;
            let mut prev = circle.evaluate(0.0);
            for i in 1..=n {
                let p = circle.evaluate(std::f64::consts::TAU * i as f64 / n as f64);
                push_seg(prev, p);
                prev = p;
            }
        }
    }
}

// =============================================================================
// Mesh measurements (shared by tests and the validator gate)
// =============================================================================

/// Signed-tetrahedron volume of a closed mesh.
pub fn mesh_volume(mesh: &SurfaceMesh) -> f64 {
    let verts = &mesh.positions;
    let mut vol = 0.0;
    for tri in mesh.indices.chunks(3) {
        let (i0, i1, i2) = (
            tri[0] as usize * 3,
            tri[1] as usize * 3,
            tri[2] as usize * 3,
        );
        let v0 = [verts[i0] as f64, verts[i0 + 1] as f64, verts[i0 + 2] as f64];
        let v1 = [verts[i1] as f64, verts[i1 + 1] as f64, verts[i1 + 2] as f64];
        let v2 = [verts[i2] as f64, verts[i2 + 1] as f64, verts[i2 + 2] as f64];
        vol += v0[0] * (v1[1] * v2[2] - v2[1] * v1[2]) - v1[0] * (v0[1] * v2[2] - v2[1] * v0[2])
            + v2[0] * (v0[1] * v1[2] - v1[1] * v0[2]);
    }
    vol / 6.0
}

/// Total triangle area of a mesh.
pub fn mesh_area(mesh: &SurfaceMesh) -> f64 {
    let verts = &mesh.positions;
    let mut area = 0.0;
    for tri in mesh.indices.chunks(3) {
        let (i0, i1, i2) = (
            tri[0] as usize * 3,
            tri[1] as usize * 3,
            tri[2] as usize * 3,
        );
        let v0 = Vec3::new(verts[i0] as f64, verts[i0 + 1] as f64, verts[i0 + 2] as f64);
        let v1 = Vec3::new(verts[i1] as f64, verts[i1 + 1] as f64, verts[i1 + 2] as f64);
        let v2 = Vec3::new(verts[i2] as f64, verts[i2 + 1] as f64, verts[i2 + 2] as f64);
        area += (v1 - v0).cross(&(v2 - v0)).norm() / 2.0;
    }
    area
}

/// Axis-aligned bounds of a mesh as `(min, max)`.
pub fn mesh_bounds(mesh: &SurfaceMesh) -> ([f64; 3], [f64; 3]) {
    let mut min = [f64::MAX; 3];
    let mut max = [f64::MIN; 3];
    for chunk in mesh.positions.chunks(3) {
        for i in 0..3 {
            min[i] = min[i].min(chunk[i] as f64);
            max[i] = max[i].max(chunk[i] as f64);
        }
    }
    (min, max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use forma_kernel_geom::{Plane, Surface};
    use forma_kernel_math::Vec3;

    /// Build a unit-ish box the way extrude does: 6 planar faces.
    fn make_box(model: &mut SolidModel, sx: f64, sy: f64, sz: f64) -> BodyId {
        let topo = &mut model.topology;
        let geom = &mut model.geometry;

        let corners = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(sx, 0.0, 0.0),
            Point3::new(sx, sy, 0.0),
            Point3::new(0.0, sy, 0.0),
            Point3::new(0.0, 0.0, sz),
            Point3::new(sx, 0.0, sz),
            Point3::new(sx, sy, sz),
            Point3::new(0.0, sy, sz),
        ];
        let v: Vec<_> = corners.iter().map(|&p| topo.add_vertex(p)).collect();

        // (vertices CCW from outside, plane normal, plane x_dir)
        let defs: [([usize; 4], Vec3, Vec3); 6] = [
            ([0, 3, 2, 1], -Vec3::z(), Vec3::y()),
            ([4, 5, 6, 7], Vec3::z(), Vec3::x()),
            ([0, 1, 5, 4], -Vec3::y(), Vec3::x()),
            ([2, 3, 7, 6], Vec3::y(), -Vec3::x()),
            ([0, 4, 7, 3], -Vec3::x(), Vec3::z()),
            ([1, 2, 6, 5], Vec3::x(), Vec3::y()),
        ];

        let mut faces = Vec::new();
        let mut he_map = std::collections::HashMap::new();
        for (verts, normal, x_dir) in defs.iter() {
            let s = geom.add_surface(Surface::Plane(Plane::new(
                corners[verts[0]],
                *normal,
                *x_dir,
            )));
            let hes: Vec<_> = verts.iter().map(|&i| topo.add_half_edge(v[i])).collect();
            for (j, &he) in hes.iter().enumerate() {
                he_map.insert((verts[j], verts[(j + 1) % 4]), he);
            }
            let l = topo.add_loop(&hes);
            faces.push(topo.add_face(l, s, false));
        }
        let mut paired = std::collections::HashSet::new();
        for (&(a, b), &he) in &he_map {
            if paired.contains(&(b, a)) {
                continue;
            }
            if let Some(&twin) = he_map.get(&(b, a)) {
                topo.add_edge(he, twin);
                paired.insert((a, b));
            }
        }
        let shell = topo.add_shell(faces, true);
        topo.add_body(vec![shell])
    }

    #[test]
    fn test_box_mesh_counts() {
        let mut model = SolidModel::new();
        let body = make_box(&mut model, 10.0, 10.0, 10.0);
        let mesh = tessellate_body(
            &model,
            body,
            &TessellationParams::default(),
            &NumericContext::DEFAULT,
        );
        assert_eq!(mesh.num_triangles(), 12);
        assert_eq!(mesh.face_hashes.len(), 6);
        assert_eq!(mesh.edge_hashes.len(), 12);
        assert_eq!(mesh.num_edge_segments(), 12);
        assert_eq!(mesh.face_map.len(), mesh.num_triangles());
    }

    #[test]
    fn test_box_volume_and_area() {
        let mut model = SolidModel::new();
        let body = make_box(&mut model, 10.0, 20.0, 30.0);
        let mesh = tessellate_body(
            &model,
            body,
            &TessellationParams::default(),
            &NumericContext::DEFAULT,
        );
        assert!((mesh_volume(&mesh).abs() - 6000.0).abs() < 1.0);
        let expect_area = 2.0 * (10.0 * 20.0 + 20.0 * 30.0 + 10.0 * 30.0);
        assert!((mesh_area(&mesh) - expect_area).abs() < 1.0);
    }

    #[test]
    fn test_box_winding_outward() {
        // Signed volume must be positive when triangles wind outward.
        let mut model = SolidModel::new();
        let body = make_box(&mut model, 5.0, 5.0, 5.0);
        let mesh = tessellate_body(
            &model,
            body,
            &TessellationParams::default(),
            &NumericContext::DEFAULT,
        );
        assert!(
            mesh_volume(&mesh) > 0.0,
            "expected positive signed volume, got {}",
            mesh_volume(&mesh)
        );
    }

    #[test]
    fn test_face_map_coverage() {
        let mut model = SolidModel::new();
        let body = make_box(&mut model, 10.0, 10.0, 10.0);
        let mesh = tessellate_body(
            &model,
            body,
            &TessellationParams::default(),
            &NumericContext::DEFAULT,
        );
        // Every face index 0..6 appears exactly twice (2 triangles per quad)
        for fi in 0..6u32 {
            let count = mesh.face_map.iter().filter(|&&f| f == fi).count();
            assert_eq!(count, 2, "face {fi} triangle count");
        }
    }

    #[test]
    fn test_ear_clip_square_with_hole() {
        let outer: Vec<Point2> = vec![
            Point2::new(0.0, 0.0),
            Point2::new(10.0, 0.0),
            Point2::new(10.0, 10.0),
            Point2::new(0.0, 10.0),
        ];
        // CW hole
        let hole: Vec<Point2> = vec![
            Point2::new(4.0, 4.0),
            Point2::new(4.0, 6.0),
            Point2::new(6.0, 6.0),
            Point2::new(6.0, 4.0),
        ];
        let merged = bridge_holes(&outer, &[hole]);
        let tris = ear_clip(&merged);
        assert!(!tris.is_empty());
        // Area of triangulation = outer area - hole area
        let mut area = 0.0;
        for tri in tris.chunks(3) {
            let a = merged[tri[0] as usize];
            let b = merged[tri[1] as usize];
            let c = merged[tri[2] as usize];
            area += ((b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)) / 2.0;
        }
        assert!((area - 96.0).abs() < 1e-9, "got area {area}");
    }

    #[test]
    fn test_grid_face_cylinder() {
        let mut model = SolidModel::new();
        let cyl = forma_kernel_geom::Cylinder::new(
            Point3::origin(),
            Vec3::z(),
            Vec3::x(),
            5.0,
            0.0,
            std::f64::consts::TAU,
            0.0,
            10.0,
        );
        let s = model.geometry.add_surface(Surface::Cylinder(cyl));
        let v = model.topology.add_vertex(Point3::new(5.0, 0.0, 0.0));
        let h = model.topology.add_half_edge(v);
        let l = model.topology.add_loop(&[h]);
        let f = model.topology.add_face(l, s, false);
        let shell = model.topology.add_shell(vec![f], false);
        let body = model.topology.add_body(vec![shell]);

        let mesh = tessellate_body(
            &model,
            body,
            &TessellationParams::default(),
            &NumericContext::DEFAULT,
        );
        assert!(mesh.num_triangles() >= 32);
        // All positions lie on the cylinder
        for chunk in mesh.positions.chunks(3) {
            let r = ((chunk[0] as f64).powi(2) + (chunk[1] as f64).powi(2)).sqrt();
            assert!((r - 5.0).abs() < 1e-4);
        }
    }
}
