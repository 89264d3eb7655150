//! Axis-aligned bounding boxes and the broadphase face-pair filter.
//!
//! Planar faces are bounded exactly by their loop vertices, so boxes come
//! straight from the topology. The solid-level gate decides the disjoint
//! shortcuts; the face-level filter prunes intersection candidates.

use forma_kernel_math::{NumericContext, Point3};
use forma_kernel_topo::{BodyId, FaceId, Topology};

/// Axis-aligned bounding box in 3D.
#[derive(Debug, Clone, Copy)]
pub struct Aabb3 {
    /// Minimum corner.
    pub min: Point3,
    /// Maximum corner.
    pub max: Point3,
}

impl Aabb3 {
    /// An inverted box suitable for expansion.
    pub fn empty() -> Self {
        Self {
            min: Point3::new(f64::INFINITY, f64::INFINITY, f64::INFINITY),
            max: Point3::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
        }
    }

    /// Expand to include a point.
    pub fn include_point(&mut self, p: &Point3) {
        self.min.x = self.min.x.min(p.x);
        self.min.y = self.min.y.min(p.y);
        self.min.z = self.min.z.min(p.z);
        self.max.x = self.max.x.max(p.x);
        self.max.y = self.max.y.max(p.y);
        self.max.z = self.max.z.max(p.z);
    }

    /// Expand to include another box.
    pub fn include(&mut self, other: &Aabb3) {
        self.include_point(&other.min);
        self.include_point(&other.max);
    }

    /// Overlap test with symmetric padding (touching counts).
    pub fn overlaps(&self, other: &Aabb3, pad: f64) -> bool {
        self.min.x <= other.max.x + pad
            && self.max.x >= other.min.x - pad
            && self.min.y <= other.max.y + pad
            && self.max.y >= other.min.y - pad
            && self.min.z <= other.max.z + pad
            && self.max.z >= other.min.z - pad
    }

    /// Intersection of two boxes (may be inverted when disjoint).
    pub fn intersection(&self, other: &Aabb3) -> Aabb3 {
        Aabb3 {
            min: Point3::new(
                self.min.x.max(other.min.x),
                self.min.y.max(other.min.y),
                self.min.z.max(other.min.z),
            ),
            max: Point3::new(
                self.max.x.min(other.max.x),
                self.max.y.min(other.max.y),
                self.max.z.min(other.max.z),
            ),
        }
    }

    /// How far a box pokes out of this one, as the largest per-axis excess.
    pub fn excess(&self, inner: &Aabb3) -> f64 {
        let mut e = 0.0f64;
        e = e.max(self.min.x - inner.min.x).max(inner.max.x - self.max.x);
        e = e.max(self.min.y - inner.min.y).max(inner.max.y - self.max.y);
        e = e.max(self.min.z - inner.min.z).max(inner.max.z - self.max.z);
        e
    }
}

/// Bounding box of one face from its loop vertices (exact for planar faces).
pub fn face_aabb(topo: &Topology, face: FaceId) -> Aabb3 {
    let mut aabb = Aabb3::empty();
    let mut include_loop = |l| {
        for p in topo.loop_points(l) {
            aabb.include_point(&p);
        }
    };
    include_loop(topo.face_outer_loop(face));
    for &inner in topo.face_inner_loops(face) {
        include_loop(inner);
    }
    aabb
}

/// Bounding box of a body's live faces.
pub fn body_aabb(topo: &Topology, body: BodyId) -> Aabb3 {
    let mut aabb = Aabb3::empty();
    for face in topo.body_faces(body) {
        aabb.include(&face_aabb(topo, face));
    }
    aabb
}

/// Face pairs of the two bodies whose padded boxes overlap.
pub fn candidate_face_pairs(
    topo: &Topology,
    a: BodyId,
    b: BodyId,
    ctx: &NumericContext,
) -> Vec<(FaceId, FaceId)> {
    let pad = ctx.length;
    let b_faces: Vec<(FaceId, Aabb3)> = topo
        .body_faces(b)
        .into_iter()
        .map(|f| (f, face_aabb(topo, f)))
        .collect();

    let mut pairs = Vec::new();
    for fa in topo.body_faces(a) {
        let box_a = face_aabb(topo, fa);
        for (fb, box_b) in &b_faces {
            if box_a.overlaps(box_b, pad) {
                pairs.push((fa, *fb));
            }
        }
    }
    pairs
}
