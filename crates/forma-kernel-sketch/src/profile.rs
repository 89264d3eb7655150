//! Closed-profile extraction from solved sketches.
//!
//! Builds an adjacency graph over shared endpoint identifiers (merged
//! through coincident constraints), traces closed cycles with bounded
//! depth, treats circle entities as self-closed loops, orients outer loops
//! CCW and holes CW, and assigns each loop a rotation-invariant identifier.

use std::collections::{BTreeMap, HashSet};
use std::f64::consts::TAU;

use forma_ir::{SketchConstraint, SketchData, SketchEntity, SketchPoint};
use forma_kernel_geom::Plane;
use forma_kernel_math::{Point2, Point3};
use forma_kernel_topo::hash::fnv1a64;

use crate::SketchError;

/// Geometry of one profile edge in sketch-plane coordinates.
#[derive(Debug, Clone)]
pub enum ProfileEdgeKind {
    /// Straight segment.
    Line {
        /// Start point.
        start: Point2,
        /// End point.
        end: Point2,
    },
    /// Circular arc.
    Arc {
        /// Start point.
        start: Point2,
        /// End point.
        end: Point2,
        /// Arc center.
        center: Point2,
        /// True if the arc runs counter-clockwise from start to end.
        ccw: bool,
    },
    /// Full circle (self-closed).
    Circle {
        /// Circle center.
        center: Point2,
        /// Radius.
        radius: f64,
    },
}

/// One edge of a profile loop, tied to the sketch entity that produced it.
#[derive(Debug, Clone)]
pub struct ProfileEdge {
    /// The generating sketch entity's identifier.
    pub entity_id: String,
    /// Edge geometry in plane coordinates.
    pub kind: ProfileEdgeKind,
}

impl ProfileEdge {
    /// Start point of this edge.
    pub fn start(&self) -> Point2 {
        match &self.kind {
            ProfileEdgeKind::Line { start, .. } | ProfileEdgeKind::Arc { start, .. } => *start,
            ProfileEdgeKind::Circle { center, radius } => {
                Point2::new(center.x + radius, center.y)
            }
        }
    }

    /// End point of this edge (equals start for circles).
    pub fn end(&self) -> Point2 {
        match &self.kind {
            ProfileEdgeKind::Line { end, .. } | ProfileEdgeKind::Arc { end, .. } => *end,
            ProfileEdgeKind::Circle { center, radius } => {
                Point2::new(center.x + radius, center.y)
            }
        }
    }

    /// Reverse traversal direction in place.
    pub fn reverse(&mut self) {
        match &mut self.kind {
            ProfileEdgeKind::Line { start, end } => std::mem::swap(start, end),
            ProfileEdgeKind::Arc {
                start, end, ccw, ..
            } => {
                std::mem::swap(start, end);
                *ccw = !*ccw;
            }
            ProfileEdgeKind::Circle { .. } => {}
        }
    }

    /// Sample this edge as a polyline, end point excluded.
    pub fn sample(&self, per_circle: usize) -> Vec<Point2> {
        match &self.kind {
            ProfileEdgeKind::Line { start, .. } => vec![*start],
            ProfileEdgeKind::Arc {
                start,
                end,
                center,
                ccw,
            } => {
                let r = (start - center).norm();
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
                let n = ((per_circle as f64 * span.abs() / TAU).ceil() as usize).max(2);
                (0..n)
                    .map(|i| {
                        let a = a0 + span * i as f64 / n as f64;
                        Point2::new(center.x + r * a.cos(), center.y + r * a.sin())
                    })
                    .collect()
            }
            ProfileEdgeKind::Circle { center, radius } => (0..per_circle.max(3))
                .map(|i| {
                    let a = TAU * i as f64 / per_circle.max(3) as f64;
                    Point2::new(center.x + radius * a.cos(), center.y + radius * a.sin())
                })
                .collect(),
        }
    }
}

/// A closed, oriented cycle of profile edges.
#[derive(Debug, Clone)]
pub struct ProfileLoop {
    /// Edges in traversal order.
    pub edges: Vec<ProfileEdge>,
    /// Rotation-invariant loop identifier (`loop:<base36>`).
    pub loop_id: String,
}

impl ProfileLoop {
    /// Polyline approximation of the loop boundary.
    pub fn polygon(&self) -> Vec<Point2> {
        let mut pts = Vec::new();
        for edge in &self.edges {
            pts.extend(edge.sample(32));
        }
        pts
    }

    /// Twice the signed area of the loop's polygon (positive = CCW).
    pub fn signed_area(&self) -> f64 {
        signed_area(&self.polygon())
    }

    /// Reverse traversal direction of the whole loop.
    pub fn reverse(&mut self) {
        self.edges.reverse();
        for e in &mut self.edges {
            e.reverse();
        }
    }
}

/// A closed profile on a plane: one CCW outer loop plus CW hole loops.
#[derive(Debug, Clone)]
pub struct Profile {
    /// The sketch plane the profile lives on.
    pub plane: Plane,
    /// Outer boundary, oriented CCW in plane coordinates.
    pub outer: ProfileLoop,
    /// Holes, oriented CW.
    pub holes: Vec<ProfileLoop>,
}

impl Profile {
    /// Map a plane-coordinate point to 3D.
    pub fn to_3d(&self, p: Point2) -> Point3 {
        self.plane.evaluate(p)
    }
}

/// Compute the stable identifier of an ordered cyclic entity-id list:
/// rotate so the lexicographically smallest id comes first, join, hash.
pub fn compute_loop_id(entity_ids: &[String]) -> String {
    if entity_ids.is_empty() {
        return "loop:unknown".to_string();
    }
    let start = entity_ids
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| a.cmp(b))
        .map(|(i, _)| i)
        .unwrap_or(0);
    let mut joined = String::new();
    for i in 0..entity_ids.len() {
        if i > 0 {
            joined.push('|');
        }
        joined.push_str(&entity_ids[(start + i) % entity_ids.len()]);
    }
    format!("loop:{}", to_base36(fnv1a64(joined.as_bytes())))
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

fn signed_area(pts: &[Point2]) -> f64 {
    let mut a = 0.0;
    for i in 0..pts.len() {
        let j = (i + 1) % pts.len();
        a += pts[i].x * pts[j].y - pts[j].x * pts[i].y;
    }
    a
}

fn point_in_polygon(p: Point2, poly: &[Point2]) -> bool {
    let mut inside = false;
    let n = poly.len();
    for i in 0..n {
        let a = poly[i];
        let b = poly[(i + 1) % n];
        if ((a.y > p.y) != (b.y > p.y))
            && (p.x < (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x)
        {
            inside = !inside;
        }
    }
    inside
}

/// Extract closed profiles from a solved sketch on a plane.
///
/// Returns profiles largest-first. Fails with [`SketchError::OpenProfile`]
/// when no closed cycle exists.
pub fn build_profiles(
    data: &SketchData,
    solved_points: &BTreeMap<String, SketchPoint>,
    plane: &Plane,
) -> Result<Vec<Profile>, SketchError> {
    let pos = |id: &str| -> Result<Point2, SketchError> {
        let p = solved_points
            .get(id)
            .or_else(|| data.points_by_id.get(id))
            .ok_or_else(|| SketchError::UnknownPoint(id.to_string()))?;
        Ok(Point2::new(p.x, p.y))
    };

    // Merge endpoint identifiers through coincident constraints so touching
    // chains trace as one cycle.
    let canon = coincident_classes(data);
    let canon_of = |id: &str| -> String {
        canon.get(id).cloned().unwrap_or_else(|| id.to_string())
    };

    let mut loops: Vec<ProfileLoop> = Vec::new();
    let mut used: HashSet<&str> = HashSet::new();

    // Circles are self-closed loops.
    for (id, entity) in &data.entities_by_id {
        if let SketchEntity::Circle { center, radius } = entity {
            used.insert(id.as_str());
            let edges = vec![ProfileEdge {
                entity_id: id.clone(),
                kind: ProfileEdgeKind::Circle {
                    center: pos(center)?,
                    radius: *radius,
                },
            }];
            let loop_id = compute_loop_id(&[id.clone()]);
            loops.push(ProfileLoop { edges, loop_id });
        }
    }

    // Adjacency over canonical endpoint ids for lines and arcs.
    let mut adjacency: BTreeMap<String, Vec<&String>> = BTreeMap::new();
    for (id, entity) in &data.entities_by_id {
        let (p1, p2) = match entity {
            SketchEntity::Line { p1, p2 } => (p1, p2),
            SketchEntity::Arc { p1, p2, .. } => (p1, p2),
            SketchEntity::Circle { .. } => continue,
        };
        adjacency.entry(canon_of(p1)).or_default().push(id);
        adjacency.entry(canon_of(p2)).or_default().push(id);
    }

    let endpoints = |id: &str| -> (&String, &String) {
        match &data.entities_by_id[id] {
            SketchEntity::Line { p1, p2 } => (p1, p2),
            SketchEntity::Arc { p1, p2, .. } => (p1, p2),
            SketchEntity::Circle { .. } => unreachable!("circles filtered above"),
        }
    };

    // Trace cycles. Entity ids iterate in BTreeMap order, so the walk is
    // deterministic: smallest unused id starts a chain in its natural
    // direction. Depth is bounded by the entity count.
    let entity_count = data.entities_by_id.len();
    for start_id in data.entities_by_id.keys() {
        if used.contains(start_id.as_str()) {
            continue;
        }
        let (sp1, sp2) = endpoints(start_id);
        let start_key = canon_of(sp1);
        let mut chain: Vec<(String, bool)> = vec![(start_id.clone(), false)];
        let mut cursor = canon_of(sp2);
        let mut chain_used: HashSet<String> = HashSet::new();
        chain_used.insert(start_id.clone());
        let mut closed = cursor == start_key;

        for _ in 0..entity_count {
            if closed {
                break;
            }
            // Next unused entity incident to the cursor point.
            let next = adjacency.get(&cursor).and_then(|list| {
                list.iter()
                    .find(|e| !used.contains(e.as_str()) && !chain_used.contains(e.as_str()))
                    .copied()
            });
            let next = match next {
                Some(n) => n,
                None => break,
            };
            let (np1, np2) = endpoints(next);
            let reversed = canon_of(np2) == cursor;
            cursor = if reversed { canon_of(np1) } else { canon_of(np2) };
            chain.push((next.clone(), reversed));
            chain_used.insert(next.clone());
            closed = cursor == start_key;
        }

        if !closed || chain.len() < 2 {
            continue;
        }

        let mut edges = Vec::with_capacity(chain.len());
        for (id, reversed) in &chain {
            used.insert(id_ref(data, id));
            let (p1, p2) = endpoints(id);
            let (a, b) = if *reversed { (p2, p1) } else { (p1, p2) };
            let kind = match &data.entities_by_id[id] {
                SketchEntity::Line { .. } => ProfileEdgeKind::Line {
                    start: pos(a)?,
                    end: pos(b)?,
                },
                SketchEntity::Arc { center, ccw, .. } => ProfileEdgeKind::Arc {
                    start: pos(a)?,
                    end: pos(b)?,
                    center: pos(center)?,
                    ccw: if *reversed { !ccw } else { *ccw },
                },
                SketchEntity::Circle { .. } => unreachable!(),
            };
            edges.push(ProfileEdge {
                entity_id: id.clone(),
                kind,
            });
        }
        let ids: Vec<String> = chain.iter().map(|(id, _)| id.clone()).collect();
        let loop_id = compute_loop_id(&ids);
        loops.push(ProfileLoop { edges, loop_id });
    }

    if loops.is_empty() {
        return Err(SketchError::OpenProfile);
    }

    // Orient all loops CCW first; containment then decides holes.
    for l in &mut loops {
        if l.signed_area() < 0.0 {
            l.reverse();
        }
    }
    loops.sort_by(|a, b| {
        b.signed_area()
            .abs()
            .partial_cmp(&a.signed_area().abs())
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut profiles: Vec<Profile> = Vec::new();
    for l in loops {
        let probe = l.polygon()[0];
        let container = profiles
            .iter_mut()
            .find(|p| point_in_polygon(probe, &p.outer.polygon()));
        match container {
            Some(profile) => {
                let mut hole = l;
                hole.reverse(); // holes run CW
                profile.holes.push(hole);
            }
            None => profiles.push(Profile {
                plane: plane.clone(),
                outer: l,
                holes: Vec::new(),
            }),
        }
    }

    Ok(profiles)
}

/// Look up the stored `&str` key for an owned id (keeps `used` borrowing
/// from the sketch data rather than cloning).
fn id_ref<'a>(data: &'a SketchData, id: &str) -> &'a str {
    data.entities_by_id
        .get_key_value(id)
        .map(|(k, _)| k.as_str())
        .unwrap_or("")
}

/// Union endpoint ids connected by coincident constraints; every member
/// maps to the smallest id of its class.
fn coincident_classes(data: &SketchData) -> BTreeMap<String, String> {
    let mut parent: BTreeMap<String, String> = BTreeMap::new();

    fn find(parent: &mut BTreeMap<String, String>, id: &str) -> String {
        let p = match parent.get(id) {
            Some(p) if p != id => p.clone(),
            _ => return id.to_string(),
        };
        let root = find(parent, &p);
        parent.insert(id.to_string(), root.clone());
        root
    }

    for constraint in data.constraints_by_id.values() {
        if let SketchConstraint::Coincident { a, b } = constraint {
            let ra = find(&mut parent, a);
            let rb = find(&mut parent, b);
            if ra != rb {
                let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
                parent.insert(hi, lo);
            }
        }
    }

    let ids: Vec<String> = data.points_by_id.keys().cloned().collect();
    ids.into_iter()
        .map(|id| {
            let root = find(&mut parent, &id);
            (id, root)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use forma_ir::SketchPoint;

    fn square_sketch() -> SketchData {
        let mut data = SketchData::default();
        let pts = [
            ("p1", -5.0, -5.0),
            ("p2", 5.0, -5.0),
            ("p3", 5.0, 5.0),
            ("p4", -5.0, 5.0),
        ];
        for (id, x, y) in pts {
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

    fn solved(data: &SketchData) -> BTreeMap<String, SketchPoint> {
        data.points_by_id.clone()
    }

    #[test]
    fn test_square_profile() {
        let data = square_sketch();
        let profiles = build_profiles(&data, &solved(&data), &Plane::xy()).unwrap();
        assert_eq!(profiles.len(), 1);
        let p = &profiles[0];
        assert_eq!(p.outer.edges.len(), 4);
        assert!(p.holes.is_empty());
        assert!(p.outer.signed_area() > 0.0, "outer loop must be CCW");
        assert_eq!(p.outer.edges[0].entity_id, "l1");
    }

    #[test]
    fn test_loop_id_rotation_invariant() {
        let a = compute_loop_id(&["l1".into(), "l2".into(), "l3".into(), "l4".into()]);
        let b = compute_loop_id(&["l3".into(), "l4".into(), "l1".into(), "l2".into()]);
        assert_eq!(a, b);
        let c = compute_loop_id(&["l1".into(), "l3".into(), "l2".into(), "l4".into()]);
        assert_ne!(a, c);
    }

    #[test]
    fn test_circle_self_closed() {
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
        let profiles = build_profiles(&data, &solved(&data), &Plane::xy()).unwrap();
        assert_eq!(profiles.len(), 1);
        assert!(matches!(
            profiles[0].outer.edges[0].kind,
            ProfileEdgeKind::Circle { .. }
        ));
    }

    #[test]
    fn test_open_chain_rejected() {
        let mut data = square_sketch();
        data.entities_by_id.remove("l4");
        let result = build_profiles(&data, &solved(&data), &Plane::xy());
        assert!(matches!(result, Err(SketchError::OpenProfile)));
    }

    #[test]
    fn test_hole_containment() {
        let mut data = square_sketch();
        data.points_by_id
            .insert("c".to_string(), SketchPoint { x: 0.0, y: 0.0 });
        data.entities_by_id.insert(
            "circ1".to_string(),
            SketchEntity::Circle {
                center: "c".to_string(),
                radius: 2.0,
            },
        );
        let profiles = build_profiles(&data, &solved(&data), &Plane::xy()).unwrap();
        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[0].holes.len(), 1);
        assert!(profiles[0].holes[0].signed_area() < 0.0, "holes run CW");
    }

    #[test]
    fn test_two_disjoint_squares() {
        let mut data = square_sketch();
        for (id, x, y) in [
            ("q1", 20.0, 20.0),
            ("q2", 25.0, 20.0),
            ("q3", 25.0, 25.0),
            ("q4", 20.0, 25.0),
        ] {
            data.points_by_id
                .insert(id.to_string(), SketchPoint { x, y });
        }
        for (id, a, b) in [
            ("m1", "q1", "q2"),
            ("m2", "q2", "q3"),
            ("m3", "q3", "q4"),
            ("m4", "q4", "q1"),
        ] {
            data.entities_by_id.insert(
                id.to_string(),
                SketchEntity::Line {
                    p1: a.to_string(),
                    p2: b.to_string(),
                },
            );
        }
        let profiles = build_profiles(&data, &solved(&data), &Plane::xy()).unwrap();
        assert_eq!(profiles.len(), 2);
        // Largest first
        assert!(profiles[0].outer.signed_area() >= profiles[1].outer.signed_area());
    }

    #[test]
    fn test_coincident_bridges_chains() {
        // Square whose corner is split into two coincident points
        let mut data = square_sketch();
        data.points_by_id
            .insert("p1b".to_string(), SketchPoint { x: -5.0, y: -5.0 });
        data.entities_by_id.insert(
            "l4".to_string(),
            SketchEntity::Line {
                p1: "p4".to_string(),
                p2: "p1b".to_string(),
            },
        );
        data.constraints_by_id.insert(
            "cc".to_string(),
            SketchConstraint::Coincident {
                a: "p1".to_string(),
                b: "p1b".to_string(),
            },
        );
        let profiles = build_profiles(&data, &solved(&data), &Plane::xy()).unwrap();
        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[0].outer.edges.len(), 4);
    }
}
