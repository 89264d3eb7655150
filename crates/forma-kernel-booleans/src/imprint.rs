//! Imprinting: cut a face along intersection segments via a planar
//! subdivision (DCEL) and extract the resulting pieces.
//!
//! The face's own boundary plus the accumulated intersection segments are
//! split at mutual crossings, endpoints are deduplicated into buckets of
//! `max(10³·tol, 1e-6)`, and the doubly connected edge list is walked to
//! extract bounded CCW faces. Pieces leaking past the source face's box by
//! more than `10·tol` are rejected (they come from neighboring faces'
//! segments), as are cycles that revisit a vertex. A containment forest
//! turns nested pieces into holes of their parents.

use std::collections::{HashMap, HashSet};

use forma_kernel_math::{NumericContext, Point2};

use crate::ssi::{point_in_polygon, signed_area, FacePoly, Seg2};

/// One region of an imprinted face.
#[derive(Debug, Clone)]
pub struct Piece {
    /// Outer boundary, CCW.
    pub outer: Vec<Point2>,
    /// Holes, CW.
    pub holes: Vec<Vec<Point2>>,
    /// Area-weighted centroid of the region (holes subtracted).
    pub centroid: Point2,
    /// Region area (holes subtracted).
    pub area: f64,
}

/// Result of imprinting one face.
#[derive(Debug)]
pub struct ImprintResult {
    /// Extracted regions.
    pub pieces: Vec<Piece>,
    /// True when extraction failed and the whole face was kept instead.
    pub fallback: bool,
}

/// Imprint a face with intersection segments.
pub fn imprint_face(fp: &FacePoly, extra: &[Seg2], ctx: &NumericContext) -> ImprintResult {
    if extra.is_empty() {
        return ImprintResult {
            pieces: vec![whole_face_piece(fp)],
            fallback: false,
        };
    }

    let bucket = (1e3 * ctx.length).max(1e-6);

    // Gather all segments: face boundary plus imprints.
    let mut segs: Vec<(Point2, Point2)> = Vec::new();
    let mut rings: Vec<&[Point2]> = vec![&fp.outer];
    for h in &fp.holes {
        rings.push(h);
    }
    for ring in rings {
        for i in 0..ring.len() {
            segs.push((ring[i], ring[(i + 1) % ring.len()]));
        }
    }
    for s in extra {
        segs.push((s.a, s.b));
    }

    // Split every segment at its crossings with every other.
    let split = split_segments(&segs, bucket);

    // Node bucketing.
    let mut nodes: Vec<Point2> = Vec::new();
    let mut node_of: HashMap<(i64, i64), usize> = HashMap::new();
    let key = |p: Point2| -> (i64, i64) {
        ((p.x / bucket).round() as i64, (p.y / bucket).round() as i64)
    };
    let mut node_for = |p: Point2, nodes: &mut Vec<Point2>| -> usize {
        let k = key(p);
        *node_of.entry(k).or_insert_with(|| {
            nodes.push(p);
            nodes.len() - 1
        })
    };

    let mut edge_set: HashSet<(usize, usize)> = HashSet::new();
    let mut edges: Vec<(usize, usize)> = Vec::new();
    for (a, b) in split {
        let na = node_for(a, &mut nodes);
        let nb = node_for(b, &mut nodes);
        if na == nb {
            continue;
        }
        let k = (na.min(nb), na.max(nb));
        if edge_set.insert(k) {
            edges.push(k);
        }
    }

    let pieces = extract_pieces(fp, &nodes, &edges, ctx);
    if pieces.is_empty() {
        // Subdivision walk found nothing usable; keep the whole face and
        // let classification handle it coarsely.
        return ImprintResult {
            pieces: vec![whole_face_piece(fp)],
            fallback: true,
        };
    }
    ImprintResult {
        pieces,
        fallback: false,
    }
}

fn whole_face_piece(fp: &FacePoly) -> Piece {
    let (centroid, area) = ring_centroid(&fp.outer, &fp.holes);
    Piece {
        outer: fp.outer.clone(),
        holes: fp.holes.clone(),
        centroid,
        area,
    }
}

/// Split all segments at pairwise crossings (including T-junctions).
fn split_segments(segs: &[(Point2, Point2)], bucket: f64) -> Vec<(Point2, Point2)> {
    let mut out = Vec::new();
    for (i, &(a, b)) in segs.iter().enumerate() {
        let d = b - a;
        let len2 = d.norm_squared();
        if len2 < bucket * bucket * 1e-4 {
            continue;
        }
        let mut ts = vec![0.0f64, 1.0];
        for (j, &(c, e)) in segs.iter().enumerate() {
            if i == j {
                continue;
            }
            let f = e - c;
            let det = d.x * f.y - d.y * f.x;
            if det.abs() > 1e-14 {
                let rx = c.x - a.x;
                let ry = c.y - a.y;
                let t = (rx * f.y - ry * f.x) / det;
                let s = (rx * d.y - ry * d.x) / -det;
                if (-1e-9..=1.0 + 1e-9).contains(&t) && (-1e-9..=1.0 + 1e-9).contains(&s) {
                    ts.push(t.clamp(0.0, 1.0));
                }
            } else {
                // Collinear overlap: project the other segment's endpoints.
                let cross = rxry_cross(a, b, c);
                if cross.abs() < bucket {
                    for p in [c, e] {
                        let t = (p - a).dot(&d) / len2;
                        if (0.0..=1.0).contains(&t) {
                            ts.push(t);
                        }
                    }
                }
            }
        }
        ts.sort_by(|x, y| x.partial_cmp(y).unwrap_or(std::cmp::Ordering::Equal));
        ts.dedup_by(|x, y| (*x - *y).abs() * len2.sqrt() < bucket * 0.5);
        for w in ts.windows(2) {
            let p = a + d * w[0];
            let q = a + d * w[1];
            if (q - p).norm() >= bucket * 0.5 {
                out.push((p, q));
            }
        }
    }
    out
}

fn rxry_cross(a: Point2, b: Point2, c: Point2) -> f64 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

/// Walk the planar subdivision and extract bounded CCW faces as pieces.
fn extract_pieces(
    fp: &FacePoly,
    nodes: &[Point2],
    edges: &[(usize, usize)],
    ctx: &NumericContext,
) -> Vec<Piece> {
    // Outgoing directed edges per node, sorted CCW by angle.
    let mut outgoing: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    // Directed edge list: (from, to)
    let mut directed: Vec<(usize, usize)> = Vec::new();
    for &(a, b) in edges {
        directed.push((a, b));
        directed.push((b, a));
    }
    for (idx, &(a, _)) in directed.iter().enumerate() {
        outgoing[a].push(idx);
    }
    let angle_of = |idx: usize| -> f64 {
        let (a, b) = directed[idx];
        let d = nodes[b] - nodes[a];
        d.y.atan2(d.x)
    };
    for list in &mut outgoing {
        list.sort_by(|&x, &y| {
            angle_of(x)
                .partial_cmp(&angle_of(y))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
    }
    // Index of each directed edge within its origin's sorted fan.
    let mut fan_pos: HashMap<usize, usize> = HashMap::new();
    for list in &outgoing {
        for (pos, &e) in list.iter().enumerate() {
            fan_pos.insert(e, pos);
        }
    }
    let reverse_of = |idx: usize| -> usize {
        // Directed edges were pushed in pairs.
        if idx % 2 == 0 {
            idx + 1
        } else {
            idx - 1
        }
    };

    // Face AABB with leak margin.
    let (face_min, face_max) = poly_bounds(&fp.outer);
    let margin = 10.0 * ctx.length;

    let mut visited = vec![false; directed.len()];
    let mut raw: Vec<Vec<usize>> = Vec::new();

    for start in 0..directed.len() {
        if visited[start] {
            continue;
        }
        let mut cycle_nodes = Vec::new();
        let mut current = start;
        let limit = directed.len() + 1;
        let mut steps = 0;
        loop {
            visited[current] = true;
            let (from, to) = directed[current];
            cycle_nodes.push(from);
            // Next edge: the fan entry clockwise-adjacent to the reverse of
            // the current edge, which traces faces with interior on the left.
            let rev = reverse_of(current);
            let fan = &outgoing[to];
            let pos = fan_pos[&rev];
            let next = fan[(pos + fan.len() - 1) % fan.len()];
            current = next;
            steps += 1;
            if current == start || steps > limit {
                break;
            }
        }
        if steps > limit {
            continue;
        }
        raw.push(cycle_nodes);
    }

    // Keep CCW, vertex-unique, in-bounds cycles.
    let mut candidates: Vec<Vec<Point2>> = Vec::new();
    let mut seen_keys: HashSet<Vec<usize>> = HashSet::new();
    for cycle in raw {
        if cycle.len() < 3 {
            continue;
        }
        let unique: HashSet<usize> = cycle.iter().copied().collect();
        if unique.len() != cycle.len() {
            continue;
        }
        let pts: Vec<Point2> = cycle.iter().map(|&n| nodes[n]).collect();
        if signed_area(&pts) <= ctx.area.max(1e-12) {
            continue;
        }
        let (pmin, pmax) = poly_bounds(&pts);
        if pmin.x < face_min.x - margin
            || pmin.y < face_min.y - margin
            || pmax.x > face_max.x + margin
            || pmax.y > face_max.y + margin
        {
            continue;
        }
        // Dedup by sorted node set.
        let mut key: Vec<usize> = cycle.clone();
        key.sort_unstable();
        if !seen_keys.insert(key) {
            continue;
        }
        candidates.push(pts);
    }

    // Drop pieces living inside an original hole.
    candidates.retain(|pts| {
        let (c, _) = ring_centroid(pts, &[]);
        !fp.holes.iter().any(|h| point_in_polygon(c, h))
    });

    // Containment forest: big pieces first; a piece directly contained in
    // an earlier one becomes that piece's hole (and stays a region itself).
    candidates.sort_by(|a, b| {
        signed_area(b)
            .partial_cmp(&signed_area(a))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let mut pieces: Vec<Piece> = Vec::new();
    for pts in &candidates {
        // Probe with an interior point: adjacent pieces share boundary
        // vertices, and boundary points make the containment test flaky.
        let probe = interior_point(pts, &[]);
        let parent = pieces
            .iter_mut()
            .filter(|p| point_in_polygon(probe, &p.outer))
            .min_by(|a, b| {
                a.area
                    .partial_cmp(&b.area)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        if let Some(parent) = parent {
            let mut hole = pts.clone();
            hole.reverse();
            parent.holes.push(hole);
        }
        let (centroid, area) = ring_centroid(pts, &[]);
        pieces.push(Piece {
            outer: pts.clone(),
            holes: Vec::new(),
            centroid,
            area,
        });
    }
    // Recompute centroids/areas of pieces that received holes.
    for p in &mut pieces {
        if !p.holes.is_empty() {
            let (c, a) = ring_centroid(&p.outer, &p.holes);
            p.centroid = c;
            p.area = a;
        }
    }

    pieces
}

fn poly_bounds(pts: &[Point2]) -> (Point2, Point2) {
    let mut min = Point2::new(f64::INFINITY, f64::INFINITY);
    let mut max = Point2::new(f64::NEG_INFINITY, f64::NEG_INFINITY);
    for p in pts {
        min.x = min.x.min(p.x);
        min.y = min.y.min(p.y);
        max.x = max.x.max(p.x);
        max.y = max.y.max(p.y);
    }
    (min, max)
}

/// Area-weighted centroid and area of a ring (outer minus holes).
pub fn ring_centroid(outer: &[Point2], holes: &[Vec<Point2>]) -> (Point2, f64) {
    fn poly_centroid(pts: &[Point2]) -> (Point2, f64) {
        let mut a2 = 0.0;
        let mut cx = 0.0;
        let mut cy = 0.0;
        for i in 0..pts.len() {
            let j = (i + 1) % pts.len();
            let cross = pts[i].x * pts[j].y - pts[j].x * pts[i].y;
            a2 += cross;
            cx += (pts[i].x + pts[j].x) * cross;
            cy += (pts[i].y + pts[j].y) * cross;
        }
        if a2.abs() < 1e-14 {
            let n = pts.len().max(1) as f64;
            let mut sx = 0.0;
            let mut sy = 0.0;
            for p in pts {
                sx += p.x;
                sy += p.y;
            }
            return (Point2::new(sx / n, sy / n), 0.0);
        }
        (
            Point2::new(cx / (3.0 * a2), cy / (3.0 * a2)),
            a2 / 2.0,
        )
    }

    let (c_outer, a_outer) = poly_centroid(outer);
    let mut area = a_outer.abs();
    let mut cx = c_outer.x * a_outer.abs();
    let mut cy = c_outer.y * a_outer.abs();
    for h in holes {
        let (c, a) = poly_centroid(h);
        area -= a.abs();
        cx -= c.x * a.abs();
        cy -= c.y * a.abs();
    }
    if area.abs() < 1e-14 {
        return (c_outer, 0.0);
    }
    (Point2::new(cx / area, cy / area), area)
}

/// A representative interior point of a ring, for classification: the
/// centroid when it lies inside, otherwise a point nudged inward from a
/// boundary edge midpoint.
pub fn interior_point(outer: &[Point2], holes: &[Vec<Point2>]) -> Point2 {
    let (centroid, _) = ring_centroid(outer, holes);
    let inside = |p: Point2| -> bool {
        point_in_polygon(p, outer) && !holes.iter().any(|h| point_in_polygon(p, h))
    };
    if inside(centroid) {
        return centroid;
    }
    let (min, max) = poly_bounds(outer);
    let diag = ((max.x - min.x).powi(2) + (max.y - min.y).powi(2)).sqrt();
    for &scale in &[1e-3, 1e-2, 5e-2] {
        let delta = diag * scale;
        for i in 0..outer.len() {
            let a = outer[i];
            let b = outer[(i + 1) % outer.len()];
            let mid = Point2::new((a.x + b.x) / 2.0, (a.y + b.y) / 2.0);
            let d = b - a;
            let len = d.norm();
            if len < 1e-12 {
                continue;
            }
            // Interior is to the left of a CCW boundary.
            let inward = Point2::new(mid.x - d.y / len * delta, mid.y + d.x / len * delta);
            if inside(inward) {
                return inward;
            }
        }
    }
    centroid
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bbox::Aabb3;
    use forma_kernel_math::{Point3, Vec3};

    fn square_face(size: f64) -> FacePoly {
        let outer = vec![
            Point2::new(0.0, 0.0),
            Point2::new(size, 0.0),
            Point2::new(size, size),
            Point2::new(0.0, size),
        ];
        let mut aabb = Aabb3::empty();
        for p in &outer {
            aabb.include_point(&Point3::new(p.x, p.y, 0.0));
        }
        FacePoly {
            face: forma_kernel_topo::FaceId(0),
            origin: Point3::origin(),
            fx: Vec3::x(),
            fy: Vec3::y(),
            outward: Vec3::z(),
            outer,
            holes: Vec::new(),
            aabb,
            hash: 0,
        }
    }

    fn seg(ax: f64, ay: f64, bx: f64, by: f64) -> Seg2 {
        Seg2 {
            a: Point2::new(ax, ay),
            b: Point2::new(bx, by),
            from_intersection: true,
        }
    }

    #[test]
    fn test_no_segments_whole_face() {
        let fp = square_face(10.0);
        let r = imprint_face(&fp, &[], &NumericContext::DEFAULT);
        assert_eq!(r.pieces.len(), 1);
        assert!((r.pieces[0].area - 100.0).abs() < 1e-9);
        assert!(!r.fallback);
    }

    #[test]
    fn test_single_cut_two_pieces() {
        let fp = square_face(10.0);
        let r = imprint_face(&fp, &[seg(0.0, 4.0, 10.0, 4.0)], &NumericContext::DEFAULT);
        assert_eq!(r.pieces.len(), 2, "{:?}", r.pieces);
        let mut areas: Vec<f64> = r.pieces.iter().map(|p| p.area).collect();
        areas.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert!((areas[0] - 40.0).abs() < 1e-6);
        assert!((areas[1] - 60.0).abs() < 1e-6);
    }

    #[test]
    fn test_cross_cut_four_pieces() {
        let fp = square_face(10.0);
        let r = imprint_face(
            &fp,
            &[seg(0.0, 5.0, 10.0, 5.0), seg(5.0, 0.0, 5.0, 10.0)],
            &NumericContext::DEFAULT,
        );
        assert_eq!(r.pieces.len(), 4);
        for p in &r.pieces {
            assert!((p.area - 25.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_island_becomes_hole_and_region() {
        // Closed inner square detached from the boundary
        let fp = square_face(10.0);
        let r = imprint_face(
            &fp,
            &[
                seg(4.0, 4.0, 6.0, 4.0),
                seg(6.0, 4.0, 6.0, 6.0),
                seg(6.0, 6.0, 4.0, 6.0),
                seg(4.0, 6.0, 4.0, 4.0),
            ],
            &NumericContext::DEFAULT,
        );
        // Ring (with hole) + inner square
        assert_eq!(r.pieces.len(), 2, "{:?}", r.pieces);
        let ring = r
            .pieces
            .iter()
            .find(|p| !p.holes.is_empty())
            .expect("ring with hole");
        assert!((ring.area - 96.0).abs() < 1e-6);
        let inner = r.pieces.iter().find(|p| p.holes.is_empty()).unwrap();
        assert!((inner.area - 4.0).abs() < 1e-6);
    }

    #[test]
    fn test_leaking_segments_rejected() {
        // Segments forming a region far outside the face get discarded.
        let fp = square_face(10.0);
        let r = imprint_face(
            &fp,
            &[
                seg(100.0, 100.0, 110.0, 100.0),
                seg(110.0, 100.0, 110.0, 110.0),
                seg(110.0, 110.0, 100.0, 110.0),
                seg(100.0, 110.0, 100.0, 100.0),
            ],
            &NumericContext::DEFAULT,
        );
        // Only the face itself survives
        assert_eq!(r.pieces.len(), 1);
        assert!((r.pieces[0].area - 100.0).abs() < 1e-6);
    }

    #[test]
    fn test_interior_point_of_ring() {
        let outer = vec![
            Point2::new(0.0, 0.0),
            Point2::new(10.0, 0.0),
            Point2::new(10.0, 10.0),
            Point2::new(0.0, 10.0),
        ];
        let hole = vec![
            Point2::new(4.0, 4.0),
            Point2::new(4.0, 6.0),
            Point2::new(6.0, 6.0),
            Point2::new(6.0, 4.0),
        ];
        let p = interior_point(&outer, &[hole.clone()]);
        assert!(point_in_polygon(p, &outer));
        assert!(!point_in_polygon(p, &hole));
    }

    #[test]
    fn test_partial_segment_t_junction() {
        // A cut that ends mid-face still splits via the T junction rule
        // only when it separates regions; a dangling stub must not create
        // bogus pieces.
        let fp = square_face(10.0);
        let r = imprint_face(&fp, &[seg(0.0, 5.0, 5.0, 5.0)], &NumericContext::DEFAULT);
        // Dangling stub: face stays one region (the walk returns along the
        // stub's other side).
        let total: f64 = r.pieces.iter().map(|p| p.area).sum();
        assert!((total - 100.0).abs() < 1.0, "total {total}");
    }
}
