//! Face projection and face-face intersection.
//!
//! Every operand face is projected into its own outward-aligned 2D frame.
//! Pairs of faces with overlapping boxes then contribute intersection
//! segments to each other: coplanar overlaps contribute the other face's
//! clipped boundary, transverse pairs contribute the plane/plane line
//! clipped to both polygons.

use forma_kernel_geom::SolidModel;
use forma_kernel_math::{Matrix3, NumericContext, Point2, Point3, Vec3};
use forma_kernel_topo::{hash, BodyId, FaceId};

use crate::api::BooleanError;
use crate::bbox::{face_aabb, Aabb3};

/// A face projected into its outward-aligned plane frame.
#[derive(Debug, Clone)]
pub struct FacePoly {
    /// The source face.
    pub face: FaceId,
    /// Frame origin.
    pub origin: Point3,
    /// Frame x axis.
    pub fx: Vec3,
    /// Frame y axis.
    pub fy: Vec3,
    /// Outward normal (`fx × fy`).
    pub outward: Vec3,
    /// Outer boundary, CCW in frame coordinates.
    pub outer: Vec<Point2>,
    /// Holes, CW in frame coordinates.
    pub holes: Vec<Vec<Point2>>,
    /// Bounding box of the face.
    pub aabb: Aabb3,
    /// Input topology hash (for provenance records).
    pub hash: u32,
}

impl FacePoly {
    /// Map frame coordinates to 3D.
    pub fn to_3d(&self, p: Point2) -> Point3 {
        self.origin + p.x * self.fx + p.y * self.fy
    }

    /// Project a 3D point into frame coordinates.
    pub fn project(&self, p: &Point3) -> Point2 {
        let d = p - self.origin;
        Point2::new(d.dot(&self.fx), d.dot(&self.fy))
    }

    /// Project a 3D direction into frame coordinates.
    pub fn project_vec(&self, v: &Vec3) -> Point2 {
        Point2::new(v.dot(&self.fx), v.dot(&self.fy))
    }

    /// Signed distance from a point to the face plane (along outward).
    pub fn signed_distance(&self, p: &Point3) -> f64 {
        (p - self.origin).dot(&self.outward)
    }

    /// Point-in-face test in frame coordinates, holes excluded.
    pub fn contains(&self, p: Point2) -> bool {
        if !point_in_polygon(p, &self.outer) {
            return false;
        }
        !self.holes.iter().any(|h| point_in_polygon(p, h))
    }
}

/// One accumulated 2D segment on a face.
#[derive(Debug, Clone, Copy)]
pub struct Seg2 {
    /// Start point in the face frame.
    pub a: Point2,
    /// End point in the face frame.
    pub b: Point2,
    /// True when the segment came from a face-face intersection rather
    /// than the face's own boundary.
    pub from_intersection: bool,
}

/// Twice the signed polygon area (positive = CCW).
pub fn signed_area(pts: &[Point2]) -> f64 {
    let mut a = 0.0;
    for i in 0..pts.len() {
        let j = (i + 1) % pts.len();
        a += pts[i].x * pts[j].y - pts[j].x * pts[i].y;
    }
    a
}

/// Even-odd point-in-polygon.
pub fn point_in_polygon(p: Point2, poly: &[Point2]) -> bool {
    let mut inside = false;
    let n = poly.len();
    for i in 0..n {
        let a = poly[i];
        let b = poly[(i + 1) % n];
        if ((a.y > p.y) != (b.y > p.y)) && (p.x < (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x)
        {
            inside = !inside;
        }
    }
    inside
}

/// Project every live face of a body. Fails on any non-planar face.
pub fn face_polygons(
    model: &SolidModel,
    body: BodyId,
    ctx: &NumericContext,
) -> Result<Vec<FacePoly>, BooleanError> {
    let topo = &model.topology;
    let mut out = Vec::new();
    for face in topo.body_faces(body) {
        let plane = model.face_plane(face).ok_or(BooleanError::NonPlanarInput)?;
        let reversed = topo.face_reversed(face);
        // Outward-aligned frame: swapping the axes flips the implied normal.
        let (fx, fy) = if reversed {
            (*plane.y_dir.as_ref(), *plane.x_dir.as_ref())
        } else {
            (*plane.x_dir.as_ref(), *plane.y_dir.as_ref())
        };
        let outward = fx.cross(&fy);
        let origin = plane.origin;

        let project = |p: &Point3| -> Point2 {
            let d = p - origin;
            Point2::new(d.dot(&fx), d.dot(&fy))
        };

        let mut outer: Vec<Point2> = topo
            .loop_points(topo.face_outer_loop(face))
            .iter()
            .map(project)
            .collect();
        if outer.len() < 3 {
            continue;
        }
        if signed_area(&outer) < 0.0 {
            outer.reverse();
        }
        let mut holes = Vec::new();
        for &inner in topo.face_inner_loops(face) {
            let mut pts: Vec<Point2> = topo.loop_points(inner).iter().map(project).collect();
            if pts.len() < 3 {
                continue;
            }
            if signed_area(&pts) > 0.0 {
                pts.reverse();
            }
            holes.push(pts);
        }

        out.push(FacePoly {
            face,
            origin,
            fx,
            fy,
            outward,
            outer,
            holes,
            aabb: face_aabb(topo, face),
            hash: hash::face_topology_hash(topo, face, ctx),
        });
    }
    Ok(out)
}

/// Intersection segments a face pair contributes to each other.
/// Returns `(segments on a, segments on b)` in each face's own frame.
pub fn intersect_faces(
    fa: &FacePoly,
    fb: &FacePoly,
    ctx: &NumericContext,
) -> (Vec<Seg2>, Vec<Seg2>) {
    let cross = fa.outward.cross(&fb.outward);
    let coplanar = cross.norm() < 1e-9 && fa.signed_distance(&fb.origin).abs() < ctx.length;

    if coplanar {
        let on_a = clip_boundary_onto(fb, fa, ctx);
        let on_b = clip_boundary_onto(fa, fb, ctx);
        return (on_a, on_b);
    }
    if cross.norm() < 1e-9 {
        // Parallel, distinct planes: no intersection.
        return (Vec::new(), Vec::new());
    }

    // Plane/plane intersection line: a point satisfying both plane
    // equations plus a gauge constraint along the line direction.
    let d1 = fa.origin.coords.dot(&fa.outward);
    let d2 = fb.origin.coords.dot(&fb.outward);
    let m = Matrix3::from_rows(&[
        fa.outward.transpose(),
        fb.outward.transpose(),
        cross.transpose(),
    ]);
    let rhs = Vec3::new(d1, d2, 0.0);
    let p0 = match m.try_inverse() {
        Some(inv) => Point3::from(inv * rhs),
        None => return (Vec::new(), Vec::new()),
    };
    let dir = cross.normalize();

    let spans_a = clip_line_to_face(fa, &p0, &dir, ctx);
    let spans_b = clip_line_to_face(fb, &p0, &dir, ctx);
    let spans = intersect_spans(&spans_a, &spans_b);

    let mut on_a = Vec::new();
    let mut on_b = Vec::new();
    for (t0, t1) in spans {
        if t1 - t0 < ctx.length {
            continue;
        }
        let p = p0 + t0 * dir;
        let q = p0 + t1 * dir;
        on_a.push(Seg2 {
            a: fa.project(&p),
            b: fa.project(&q),
            from_intersection: true,
        });
        on_b.push(Seg2 {
            a: fb.project(&p),
            b: fb.project(&q),
            from_intersection: true,
        });
    }
    (on_a, on_b)
}

/// Clip `src`'s boundary segments onto coplanar face `dst`.
fn clip_boundary_onto(src: &FacePoly, dst: &FacePoly, ctx: &NumericContext) -> Vec<Seg2> {
    let mut out = Vec::new();
    let mut rings: Vec<&[Point2]> = vec![&src.outer];
    for h in &src.holes {
        rings.push(h);
    }
    for ring in rings {
        for i in 0..ring.len() {
            let p3 = src.to_3d(ring[i]);
            let q3 = src.to_3d(ring[(i + 1) % ring.len()]);
            let dir = q3 - p3;
            let len = dir.norm();
            if len < ctx.length {
                continue;
            }
            let dirn = dir / len;
            let spans = clip_line_to_face(dst, &p3, &dirn, ctx);
            for (t0, t1) in spans {
                let (t0, t1) = (t0.max(0.0), t1.min(len));
                if t1 - t0 < ctx.length {
                    continue;
                }
                out.push(Seg2 {
                    a: dst.project(&(p3 + t0 * dirn)),
                    b: dst.project(&(p3 + t1 * dirn)),
                    from_intersection: true,
                });
            }
        }
    }
    out
}

/// Parameter spans where a 3D line lies inside a face's polygon (holes
/// excluded). The line must lie in the face plane.
fn clip_line_to_face(
    fp: &FacePoly,
    p0: &Point3,
    dir: &Vec3,
    ctx: &NumericContext,
) -> Vec<(f64, f64)> {
    let o2 = fp.project(p0);
    let d2 = fp.project_vec(dir);
    let d2n = (d2.x * d2.x + d2.y * d2.y).sqrt();
    if d2n < 1e-12 {
        return Vec::new();
    }

    // Crossing parameters with every boundary edge.
    let mut ts: Vec<f64> = Vec::new();
    let mut rings: Vec<&[Point2]> = vec![&fp.outer];
    for h in &fp.holes {
        rings.push(h);
    }
    let big = 1e7;
    ts.push(-big);
    ts.push(big);
    for ring in rings {
        for i in 0..ring.len() {
            let a = ring[i];
            let b = ring[(i + 1) % ring.len()];
            // Solve o2 + t*d2 == a + s*(b-a)
            let ex = b.x - a.x;
            let ey = b.y - a.y;
            let det = d2.x * ey - d2.y * ex;
            if det.abs() < 1e-14 {
                continue;
            }
            let rx = a.x - o2.x;
            let ry = a.y - o2.y;
            let t = (rx * ey - ry * ex) / det;
            let s = (rx * d2.y - ry * d2.x) / -det;
            if (-1e-9..=1.0 + 1e-9).contains(&s) {
                ts.push(t);
            }
        }
    }
    ts.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    ts.dedup_by(|a, b| (*a - *b).abs() < ctx.length / 2.0);

    let mut spans = Vec::new();
    for w in ts.windows(2) {
        let (t0, t1) = (w[0], w[1]);
        if t1 - t0 < ctx.length {
            continue;
        }
        let mid = Point2::new(o2.x + d2.x * (t0 + t1) / 2.0, o2.y + d2.y * (t0 + t1) / 2.0);
        if fp.contains(mid) {
            spans.push((t0, t1));
        }
    }
    merge_spans(spans, ctx)
}

fn merge_spans(mut spans: Vec<(f64, f64)>, ctx: &NumericContext) -> Vec<(f64, f64)> {
    spans.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
    let mut out: Vec<(f64, f64)> = Vec::new();
    for (t0, t1) in spans {
        if let Some(last) = out.last_mut() {
            if t0 <= last.1 + ctx.length {
                last.1 = last.1.max(t1);
                continue;
            }
        }
        out.push((t0, t1));
    }
    out
}

/// Pairwise intersection of two sorted span lists.
fn intersect_spans(a: &[(f64, f64)], b: &[(f64, f64)]) -> Vec<(f64, f64)> {
    let mut out = Vec::new();
    for &(a0, a1) in a {
        for &(b0, b1) in b {
            let lo = a0.max(b0);
            let hi = a1.min(b1);
            if hi > lo {
                out.push((lo, hi));
            }
        }
    }
    out
}
