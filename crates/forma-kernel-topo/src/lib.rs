#![warn(missing_docs)]

//! Half-edge B-rep topology arena for the forma core.
//!
//! The arena owns every vertex, half-edge, edge, loop, face, shell, and body
//! of a rebuild session. Entities are addressed by dense `u32` handles that
//! index parallel column vectors; `NULL` marks absence. Deletion is logical
//! (a flags bit) and indices never shift, so handles stay valid for the
//! lifetime of the arena and the whole structure is bulk-copyable.
//!
//! Setters here are cheap and trusting: a caller that links a loop breaking
//! the next/prev cycle has a bug that the validator reports after the fact.
//! Higher layers only construct valid configurations.

pub mod hash;

use forma_kernel_math::Point3;

/// Live bit in an entity's flags column.
const LIVE: u8 = 1;

macro_rules! define_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);

        impl $name {
            /// Sentinel denoting absence.
            pub const NULL: Self = Self(u32::MAX);

            /// True if this handle is the null sentinel.
            pub fn is_null(self) -> bool {
                self.0 == u32::MAX
            }

            /// The handle as a table index. Must not be called on `NULL`.
            pub fn index(self) -> usize {
                debug_assert!(!self.is_null());
                self.0 as usize
            }
        }
    };
}

define_id!(
    /// Handle to a vertex.
    VertexId
);
define_id!(
    /// Handle to an edge (the unoriented pairing of two half-edges).
    EdgeId
);
define_id!(
    /// Handle to a half-edge (one directed use of an edge by a loop).
    HalfEdgeId
);
define_id!(
    /// Handle to a loop (a closed cycle of half-edges bounding a face).
    LoopId
);
define_id!(
    /// Handle to a face.
    FaceId
);
define_id!(
    /// Handle to a shell (a connected set of faces).
    ShellId
);
define_id!(
    /// Handle to a body.
    BodyId
);

/// Sentinel for "no geometry reference" in surface/curve index columns.
pub const NULL_GEOM: u32 = u32::MAX;

/// Vertex table: position column plus flags.
#[derive(Debug, Clone, Default)]
struct VertexTable {
    point: Vec<Point3>,
    flags: Vec<u8>,
}

/// Half-edge table. Columns mirror the standard half-edge record:
/// origin vertex, twin, next, prev, parent edge, owning loop.
#[derive(Debug, Clone, Default)]
struct HalfEdgeTable {
    origin: Vec<VertexId>,
    twin: Vec<HalfEdgeId>,
    next: Vec<HalfEdgeId>,
    prev: Vec<HalfEdgeId>,
    edge: Vec<EdgeId>,
    owner: Vec<LoopId>,
    flags: Vec<u8>,
}

/// Edge table: one representative half-edge plus an optional curve index.
#[derive(Debug, Clone, Default)]
struct EdgeTable {
    half_edge: Vec<HalfEdgeId>,
    curve: Vec<u32>,
    flags: Vec<u8>,
}

/// Loop table: entry half-edge and owning face.
#[derive(Debug, Clone, Default)]
struct LoopTable {
    first: Vec<HalfEdgeId>,
    face: Vec<FaceId>,
    flags: Vec<u8>,
}

/// Face table: outer loop, hole loops, surface index, orientation, shell.
#[derive(Debug, Clone, Default)]
struct FaceTable {
    outer_loop: Vec<LoopId>,
    inner_loops: Vec<Vec<LoopId>>,
    surface: Vec<u32>,
    reversed: Vec<bool>,
    shell: Vec<ShellId>,
    flags: Vec<u8>,
}

/// Shell table: face list, owning body, closed flag.
#[derive(Debug, Clone, Default)]
struct ShellTable {
    faces: Vec<Vec<FaceId>>,
    body: Vec<BodyId>,
    closed: Vec<bool>,
    flags: Vec<u8>,
}

/// Body table: shell list.
#[derive(Debug, Clone, Default)]
struct BodyTable {
    shells: Vec<Vec<ShellId>>,
    flags: Vec<u8>,
}

/// The topology arena.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    vertices: VertexTable,
    half_edges: HalfEdgeTable,
    edges: EdgeTable,
    loops: LoopTable,
    faces: FaceTable,
    shells: ShellTable,
    bodies: BodyTable,
}

impl Topology {
    /// Create an empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all entities, keeping allocated capacity.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    // =========================================================================
    // Construction
    // =========================================================================

    /// Add a vertex at the given position.
    pub fn add_vertex(&mut self, point: Point3) -> VertexId {
        let id = VertexId(self.vertices.point.len() as u32);
        self.vertices.point.push(point);
        self.vertices.flags.push(LIVE);
        id
    }

    /// Add a half-edge starting at `origin`. Twin/next/prev/edge/loop are
    /// null until linked.
    pub fn add_half_edge(&mut self, origin: VertexId) -> HalfEdgeId {
        let id = HalfEdgeId(self.half_edges.origin.len() as u32);
        self.half_edges.origin.push(origin);
        self.half_edges.twin.push(HalfEdgeId::NULL);
        self.half_edges.next.push(HalfEdgeId::NULL);
        self.half_edges.prev.push(HalfEdgeId::NULL);
        self.half_edges.edge.push(EdgeId::NULL);
        self.half_edges.owner.push(LoopId::NULL);
        self.half_edges.flags.push(LIVE);
        id
    }

    /// Connect the given half-edges into a closed loop, in order, and return
    /// the new loop. Sets next/prev links and each half-edge's owner.
    pub fn add_loop(&mut self, hes: &[HalfEdgeId]) -> LoopId {
        let id = LoopId(self.loops.first.len() as u32);
        self.loops
            .first
            .push(hes.first().copied().unwrap_or(HalfEdgeId::NULL));
        self.loops.face.push(FaceId::NULL);
        self.loops.flags.push(LIVE);

        let n = hes.len();
        for (i, &he) in hes.iter().enumerate() {
            let next = hes[(i + 1) % n];
            let prev = hes[(i + n - 1) % n];
            self.half_edges.next[he.index()] = next;
            self.half_edges.prev[he.index()] = prev;
            self.half_edges.owner[he.index()] = id;
        }
        id
    }

    /// Add a face bounded by `outer` on surface `surface`. `reversed` flips
    /// the face's outward normal relative to the surface normal.
    pub fn add_face(&mut self, outer: LoopId, surface: u32, reversed: bool) -> FaceId {
        let id = FaceId(self.faces.outer_loop.len() as u32);
        self.faces.outer_loop.push(outer);
        self.faces.inner_loops.push(Vec::new());
        self.faces.surface.push(surface);
        self.faces.reversed.push(reversed);
        self.faces.shell.push(ShellId::NULL);
        self.faces.flags.push(LIVE);
        self.loops.face[outer.index()] = id;
        id
    }

    /// Attach a hole loop to an existing face.
    pub fn add_inner_loop(&mut self, face: FaceId, inner: LoopId) {
        self.faces.inner_loops[face.index()].push(inner);
        self.loops.face[inner.index()] = face;
    }

    /// Pair two half-edges as twins and create their shared edge. Either
    /// argument may be on a different loop; both must be unpaired.
    pub fn add_edge(&mut self, h1: HalfEdgeId, h2: HalfEdgeId) -> EdgeId {
        let id = EdgeId(self.edges.half_edge.len() as u32);
        self.edges.half_edge.push(h1);
        self.edges.curve.push(NULL_GEOM);
        self.edges.flags.push(LIVE);
        self.half_edges.twin[h1.index()] = h2;
        self.half_edges.edge[h1.index()] = id;
        if !h2.is_null() {
            self.half_edges.twin[h2.index()] = h1;
            self.half_edges.edge[h2.index()] = id;
        }
        id
    }

    /// Attach a curve descriptor index to an edge.
    pub fn set_edge_curve(&mut self, edge: EdgeId, curve: u32) {
        self.edges.curve[edge.index()] = curve;
    }

    /// Add a shell owning the given faces.
    pub fn add_shell(&mut self, faces: Vec<FaceId>, closed: bool) -> ShellId {
        let id = ShellId(self.shells.faces.len() as u32);
        for &f in &faces {
            self.faces.shell[f.index()] = id;
        }
        self.shells.faces.push(faces);
        self.shells.body.push(BodyId::NULL);
        self.shells.closed.push(closed);
        self.shells.flags.push(LIVE);
        id
    }

    /// Add a body owning the given shells.
    pub fn add_body(&mut self, shells: Vec<ShellId>) -> BodyId {
        let id = BodyId(self.bodies.shells.len() as u32);
        for &s in &shells {
            self.shells.body[s.index()] = id;
        }
        self.bodies.shells.push(shells);
        self.bodies.flags.push(LIVE);
        id
    }

    /// Mark a shell closed (every edge must then have two half-edges).
    pub fn mark_shell_closed(&mut self, shell: ShellId, closed: bool) {
        self.shells.closed[shell.index()] = closed;
    }

    // =========================================================================
    // Logical deletion
    // =========================================================================

    /// Logically delete a face and its loops and half-edges. Edges whose
    /// half-edges are both dead die with them; vertices are left alone
    /// (they may be shared with other faces of the shell).
    pub fn delete_face(&mut self, face: FaceId) {
        let mut loops = vec![self.faces.outer_loop[face.index()]];
        loops.extend(self.faces.inner_loops[face.index()].iter().copied());
        for l in loops {
            if l.is_null() {
                continue;
            }
            for he in self.loop_half_edges(l).collect::<Vec<_>>() {
                self.half_edges.flags[he.index()] &= !LIVE;
                let e = self.half_edges.edge[he.index()];
                if !e.is_null() {
                    let twin = self.half_edges.twin[he.index()];
                    let twin_dead =
                        twin.is_null() || self.half_edges.flags[twin.index()] & LIVE == 0;
                    if twin_dead {
                        self.edges.flags[e.index()] &= !LIVE;
                    }
                }
            }
            self.loops.flags[l.index()] &= !LIVE;
        }
        self.faces.flags[face.index()] &= !LIVE;
    }

    /// Logically delete a body and everything it owns, vertices included.
    /// Bodies never share vertices, so the cascade is safe.
    pub fn delete_body(&mut self, body: BodyId) {
        let shells = self.bodies.shells[body.index()].clone();
        for shell in shells {
            let faces = self.shells.faces[shell.index()].clone();
            for face in faces {
                if self.is_face_live(face) {
                    for v in self.face_vertices(face) {
                        self.vertices.flags[v.index()] &= !LIVE;
                    }
                    self.delete_face(face);
                }
            }
            self.shells.flags[shell.index()] &= !LIVE;
        }
        self.bodies.flags[body.index()] &= !LIVE;
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Position of a vertex.
    pub fn vertex_point(&self, v: VertexId) -> Point3 {
        self.vertices.point[v.index()]
    }

    /// Overwrite a vertex position.
    pub fn set_vertex_point(&mut self, v: VertexId, p: Point3) {
        self.vertices.point[v.index()] = p;
    }

    /// Start vertex of a half-edge.
    pub fn half_edge_origin(&self, h: HalfEdgeId) -> VertexId {
        self.half_edges.origin[h.index()]
    }

    /// End vertex of a half-edge (= origin of its successor).
    pub fn half_edge_dest(&self, h: HalfEdgeId) -> VertexId {
        let next = self.half_edges.next[h.index()];
        if next.is_null() {
            VertexId::NULL
        } else {
            self.half_edges.origin[next.index()]
        }
    }

    /// Twin of a half-edge (`NULL` for boundary half-edges).
    pub fn half_edge_twin(&self, h: HalfEdgeId) -> HalfEdgeId {
        self.half_edges.twin[h.index()]
    }

    /// Successor of a half-edge in its loop.
    pub fn half_edge_next(&self, h: HalfEdgeId) -> HalfEdgeId {
        self.half_edges.next[h.index()]
    }

    /// Predecessor of a half-edge in its loop.
    pub fn half_edge_prev(&self, h: HalfEdgeId) -> HalfEdgeId {
        self.half_edges.prev[h.index()]
    }

    /// Parent edge of a half-edge.
    pub fn half_edge_edge(&self, h: HalfEdgeId) -> EdgeId {
        self.half_edges.edge[h.index()]
    }

    /// Owning loop of a half-edge.
    pub fn half_edge_loop(&self, h: HalfEdgeId) -> LoopId {
        self.half_edges.owner[h.index()]
    }

    /// Representative half-edge of an edge.
    pub fn edge_half_edge(&self, e: EdgeId) -> HalfEdgeId {
        self.edges.half_edge[e.index()]
    }

    /// Curve descriptor index of an edge (`NULL_GEOM` for straight edges
    /// whose geometry is implied by their endpoints).
    pub fn edge_curve(&self, e: EdgeId) -> u32 {
        self.edges.curve[e.index()]
    }

    /// Both endpoint positions of an edge.
    pub fn edge_endpoints(&self, e: EdgeId) -> (Point3, Point3) {
        let h = self.edges.half_edge[e.index()];
        let a = self.vertex_point(self.half_edge_origin(h));
        let b = self.vertex_point(self.half_edge_dest(h));
        (a, b)
    }

    /// Entry half-edge of a loop.
    pub fn loop_first(&self, l: LoopId) -> HalfEdgeId {
        self.loops.first[l.index()]
    }

    /// Owning face of a loop.
    pub fn loop_face(&self, l: LoopId) -> FaceId {
        self.loops.face[l.index()]
    }

    /// Iterate the half-edges of a loop in order, starting at its entry.
    /// Bails out after the table size to survive corrupted next-links.
    pub fn loop_half_edges(&self, l: LoopId) -> LoopIter<'_> {
        LoopIter {
            topo: self,
            start: self.loops.first[l.index()],
            current: self.loops.first[l.index()],
            remaining: self.half_edges.origin.len() + 1,
            started: false,
        }
    }

    /// Positions of a loop's vertices in traversal order.
    pub fn loop_points(&self, l: LoopId) -> Vec<Point3> {
        self.loop_half_edges(l)
            .map(|h| self.vertex_point(self.half_edge_origin(h)))
            .collect()
    }

    /// Outer loop of a face.
    pub fn face_outer_loop(&self, f: FaceId) -> LoopId {
        self.faces.outer_loop[f.index()]
    }

    /// Hole loops of a face.
    pub fn face_inner_loops(&self, f: FaceId) -> &[LoopId] {
        &self.faces.inner_loops[f.index()]
    }

    /// Surface descriptor index of a face.
    pub fn face_surface(&self, f: FaceId) -> u32 {
        self.faces.surface[f.index()]
    }

    /// Whether the face's outward normal opposes its surface normal.
    pub fn face_reversed(&self, f: FaceId) -> bool {
        self.faces.reversed[f.index()]
    }

    /// Owning shell of a face.
    pub fn face_shell(&self, f: FaceId) -> ShellId {
        self.faces.shell[f.index()]
    }

    /// All distinct vertices used by a face's loops.
    pub fn face_vertices(&self, f: FaceId) -> Vec<VertexId> {
        let mut out = Vec::new();
        let mut push_loop = |l: LoopId, out: &mut Vec<VertexId>| {
            for h in self.loop_half_edges(l) {
                let v = self.half_edge_origin(h);
                if !out.contains(&v) {
                    out.push(v);
                }
            }
        };
        push_loop(self.faces.outer_loop[f.index()], &mut out);
        for &l in &self.faces.inner_loops[f.index()] {
            push_loop(l, &mut out);
        }
        out
    }

    /// Faces of a shell (live and dead; filter with [`Topology::is_face_live`]).
    pub fn shell_faces(&self, s: ShellId) -> &[FaceId] {
        &self.shells.faces[s.index()]
    }

    /// Owning body of a shell.
    pub fn shell_body(&self, s: ShellId) -> BodyId {
        self.shells.body[s.index()]
    }

    /// Whether a shell is marked closed.
    pub fn shell_closed(&self, s: ShellId) -> bool {
        self.shells.closed[s.index()]
    }

    /// Shells of a body.
    pub fn body_shells(&self, b: BodyId) -> &[ShellId] {
        &self.bodies.shells[b.index()]
    }

    /// Live faces of a body, in shell order. This order is the face-index
    /// space used by tessellation and the reference index.
    pub fn body_faces(&self, b: BodyId) -> Vec<FaceId> {
        let mut out = Vec::new();
        for &s in &self.bodies.shells[b.index()] {
            for &f in &self.shells.faces[s.index()] {
                if self.is_face_live(f) {
                    out.push(f);
                }
            }
        }
        out
    }

    /// Live edges of a body, in face order, each edge once.
    pub fn body_edges(&self, b: BodyId) -> Vec<EdgeId> {
        let mut out = Vec::new();
        for f in self.body_faces(b) {
            let mut loops = vec![self.face_outer_loop(f)];
            loops.extend(self.face_inner_loops(f).iter().copied());
            for l in loops {
                for h in self.loop_half_edges(l) {
                    let e = self.half_edge_edge(h);
                    if !e.is_null() && self.is_edge_live(e) && !out.contains(&e) {
                        out.push(e);
                    }
                }
            }
        }
        out
    }

    // =========================================================================
    // Liveness and counts
    // =========================================================================

    /// True if the vertex slot is live.
    pub fn is_vertex_live(&self, v: VertexId) -> bool {
        !v.is_null() && self.vertices.flags[v.index()] & LIVE != 0
    }
    /// True if the half-edge slot is live.
    pub fn is_half_edge_live(&self, h: HalfEdgeId) -> bool {
        !h.is_null() && self.half_edges.flags[h.index()] & LIVE != 0
    }
    /// True if the edge slot is live.
    pub fn is_edge_live(&self, e: EdgeId) -> bool {
        !e.is_null() && self.edges.flags[e.index()] & LIVE != 0
    }
    /// True if the loop slot is live.
    pub fn is_loop_live(&self, l: LoopId) -> bool {
        !l.is_null() && self.loops.flags[l.index()] & LIVE != 0
    }
    /// True if the face slot is live.
    pub fn is_face_live(&self, f: FaceId) -> bool {
        !f.is_null() && self.faces.flags[f.index()] & LIVE != 0
    }
    /// True if the shell slot is live.
    pub fn is_shell_live(&self, s: ShellId) -> bool {
        !s.is_null() && self.shells.flags[s.index()] & LIVE != 0
    }
    /// True if the body slot is live.
    pub fn is_body_live(&self, b: BodyId) -> bool {
        !b.is_null() && self.bodies.flags[b.index()] & LIVE != 0
    }

    /// Total vertex slots (live + dead).
    pub fn vertex_slots(&self) -> usize {
        self.vertices.point.len()
    }
    /// Total half-edge slots.
    pub fn half_edge_slots(&self) -> usize {
        self.half_edges.origin.len()
    }
    /// Total edge slots.
    pub fn edge_slots(&self) -> usize {
        self.edges.half_edge.len()
    }
    /// Total loop slots.
    pub fn loop_slots(&self) -> usize {
        self.loops.first.len()
    }
    /// Total face slots.
    pub fn face_slots(&self) -> usize {
        self.faces.outer_loop.len()
    }
    /// Total shell slots.
    pub fn shell_slots(&self) -> usize {
        self.shells.faces.len()
    }
    /// Total body slots.
    pub fn body_slots(&self) -> usize {
        self.bodies.shells.len()
    }

    /// Number of live bodies.
    pub fn live_body_count(&self) -> usize {
        self.bodies.flags.iter().filter(|f| **f & LIVE != 0).count()
    }
}

/// Iterator over a loop's half-edges.
pub struct LoopIter<'a> {
    topo: &'a Topology,
    start: HalfEdgeId,
    current: HalfEdgeId,
    remaining: usize,
    started: bool,
}

impl<'a> Iterator for LoopIter<'a> {
    type Item = HalfEdgeId;

    fn next(&mut self) -> Option<HalfEdgeId> {
        if self.current.is_null() || self.remaining == 0 {
            return None;
        }
        if self.started && self.current == self.start {
            return None;
        }
        self.started = true;
        self.remaining -= 1;
        let he = self.current;
        self.current = self.topo.half_edges.next[he.index()];
        Some(he)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad(topo: &mut Topology) -> (FaceId, Vec<HalfEdgeId>) {
        let v0 = topo.add_vertex(Point3::new(0.0, 0.0, 0.0));
        let v1 = topo.add_vertex(Point3::new(1.0, 0.0, 0.0));
        let v2 = topo.add_vertex(Point3::new(1.0, 1.0, 0.0));
        let v3 = topo.add_vertex(Point3::new(0.0, 1.0, 0.0));
        let hes: Vec<_> = [v0, v1, v2, v3]
            .iter()
            .map(|&v| topo.add_half_edge(v))
            .collect();
        let l = topo.add_loop(&hes);
        let f = topo.add_face(l, 0, false);
        (f, hes)
    }

    #[test]
    fn test_loop_cycle() {
        let mut topo = Topology::new();
        let (f, hes) = quad(&mut topo);
        let l = topo.face_outer_loop(f);
        let collected: Vec<_> = topo.loop_half_edges(l).collect();
        assert_eq!(collected, hes);
        // prev(next(h)) == h all the way around
        for &h in &hes {
            assert_eq!(topo.half_edge_prev(topo.half_edge_next(h)), h);
        }
        // Vertex continuity
        for &h in &hes {
            assert_eq!(
                topo.half_edge_dest(h),
                topo.half_edge_origin(topo.half_edge_next(h))
            );
        }
    }

    #[test]
    fn test_twin_pairing() {
        let mut topo = Topology::new();
        let v0 = topo.add_vertex(Point3::origin());
        let v1 = topo.add_vertex(Point3::new(1.0, 0.0, 0.0));
        let h1 = topo.add_half_edge(v0);
        let h2 = topo.add_half_edge(v1);
        let e = topo.add_edge(h1, h2);
        assert_eq!(topo.half_edge_twin(topo.half_edge_twin(h1)), h1);
        assert_eq!(topo.half_edge_edge(h1), e);
        assert_eq!(topo.half_edge_edge(h2), e);
    }

    #[test]
    fn test_containment_links() {
        let mut topo = Topology::new();
        let (f, _) = quad(&mut topo);
        let shell = topo.add_shell(vec![f], true);
        let body = topo.add_body(vec![shell]);
        assert_eq!(topo.face_shell(f), shell);
        assert_eq!(topo.shell_body(shell), body);
        assert_eq!(topo.loop_face(topo.face_outer_loop(f)), f);
        assert_eq!(topo.body_faces(body), vec![f]);
    }

    #[test]
    fn test_logical_deletion() {
        let mut topo = Topology::new();
        let (f, hes) = quad(&mut topo);
        let shell = topo.add_shell(vec![f], true);
        let body = topo.add_body(vec![shell]);
        let slots = topo.face_slots();

        topo.delete_body(body);

        assert!(!topo.is_face_live(f));
        assert!(!topo.is_body_live(body));
        assert!(!topo.is_half_edge_live(hes[0]));
        // Indices never shift
        assert_eq!(topo.face_slots(), slots);
        assert!(topo.body_faces(body).is_empty());
    }

    #[test]
    fn test_inner_loop_attachment() {
        let mut topo = Topology::new();
        let (f, _) = quad(&mut topo);
        let v = topo.add_vertex(Point3::new(0.5, 0.5, 0.0));
        let h = topo.add_half_edge(v);
        let hole = topo.add_loop(&[h]);
        topo.add_inner_loop(f, hole);
        assert_eq!(topo.face_inner_loops(f), &[hole]);
        assert_eq!(topo.loop_face(hole), f);
    }
}
