#![warn(missing_docs)]

//! Surface and curve descriptors for the forma B-rep core.
//!
//! Geometry kinds are closed tagged enums: every pipeline stage dispatches
//! on the variant, and the set only grows when the kernel itself grows. Faces
//! reference surfaces and edges reference curves by index into the
//! [`GeometryStore`] owned by the same [`SolidModel`] as the topology arena.

use forma_kernel_math::{Dir3, Point2, Point3, Vec3};
use forma_kernel_topo::{BodyId, FaceId, Topology};

// =============================================================================
// Plane
// =============================================================================

/// An infinite plane with an in-plane coordinate frame.
///
/// `y_dir` is always `normal × x_dir`, so `(x_dir, y_dir, normal)` is a
/// right-handed orthonormal frame and `P(u, v) = origin + u·x_dir + v·y_dir`.
#[derive(Debug, Clone)]
pub struct Plane {
    /// Origin point on the plane.
    pub origin: Point3,
    /// Unit normal.
    pub normal: Dir3,
    /// Unit vector along the u direction.
    pub x_dir: Dir3,
    /// Unit vector along the v direction (`normal × x_dir`).
    pub y_dir: Dir3,
}

impl Plane {
    /// Create a plane from origin, normal, and an x direction.
    /// The x direction is re-orthogonalized against the normal.
    pub fn new(origin: Point3, normal: Vec3, x_dir: Vec3) -> Self {
        let n = Dir3::new_normalize(normal);
        let x_raw = x_dir - x_dir.dot(n.as_ref()) * n.as_ref();
        let x = Dir3::new_normalize(x_raw);
        let y = Dir3::new_normalize(n.as_ref().cross(x.as_ref()));
        Self {
            origin,
            normal: n,
            x_dir: x,
            y_dir: y,
        }
    }

    /// Create a plane from two in-plane axes; the normal is `x × y`.
    pub fn from_axes(origin: Point3, x_dir: Vec3, y_dir: Vec3) -> Self {
        let n = x_dir.cross(&y_dir);
        Self::new(origin, n, x_dir)
    }

    /// Create a plane from origin and normal with an arbitrary x direction.
    pub fn from_normal(origin: Point3, normal: Vec3) -> Self {
        let n = normal.normalize();
        let arbitrary = if n.x.abs() < 0.9 { Vec3::x() } else { Vec3::y() };
        let x = arbitrary.cross(&n);
        Self::new(origin, normal, x)
    }

    /// XY datum plane at the origin.
    pub fn xy() -> Self {
        Self::new(Point3::origin(), Vec3::z(), Vec3::x())
    }

    /// XZ datum plane at the origin (normal -Y, so +x_dir stays +X).
    pub fn xz() -> Self {
        Self::new(Point3::origin(), -Vec3::y(), Vec3::x())
    }

    /// YZ datum plane at the origin.
    pub fn yz() -> Self {
        Self::new(Point3::origin(), Vec3::x(), Vec3::y())
    }

    /// Evaluate plane coordinates to a 3D point.
    pub fn evaluate(&self, uv: Point2) -> Point3 {
        self.origin + uv.x * self.x_dir.as_ref() + uv.y * self.y_dir.as_ref()
    }

    /// Project a 3D point into this plane's (u, v) coordinates.
    pub fn project(&self, p: &Point3) -> Point2 {
        let d = p - self.origin;
        Point2::new(d.dot(self.x_dir.as_ref()), d.dot(self.y_dir.as_ref()))
    }

    /// Signed distance from a point to this plane.
    pub fn signed_distance(&self, p: &Point3) -> f64 {
        (p - self.origin).dot(self.normal.as_ref())
    }

    /// Signed distance from the world origin to this plane along the normal.
    pub fn origin_distance(&self) -> f64 {
        self.origin.coords.dot(self.normal.as_ref())
    }
}

// =============================================================================
// Cylinder (side surface of an extruded arc or circle)
// =============================================================================

/// A bounded cylindrical patch:
/// `P(u, v) = center + r·(cos u·ref_dir + sin u·y) + v·axis`,
/// with `u ∈ [start_angle, start_angle + sweep]` and `v ∈ [v_min, v_max]`.
///
/// Side faces of extruded arc and circle profile edges live on these.
#[derive(Debug, Clone)]
pub struct Cylinder {
    /// A point on the axis at v = 0.
    pub center: Point3,
    /// Unit axis direction.
    pub axis: Dir3,
    /// Reference direction for u = 0, perpendicular to the axis.
    pub ref_dir: Dir3,
    /// Radius.
    pub radius: f64,
    /// Angular start of the patch in radians.
    pub start_angle: f64,
    /// Signed angular span of the patch in radians (full circle: 2π).
    pub sweep: f64,
    /// Lower bound of the height domain.
    pub v_min: f64,
    /// Upper bound of the height domain.
    pub v_max: f64,
}

impl Cylinder {
    /// Create a cylindrical patch around an arbitrary axis.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        center: Point3,
        axis: Vec3,
        ref_dir: Vec3,
        radius: f64,
        start_angle: f64,
        sweep: f64,
        v_min: f64,
        v_max: f64,
    ) -> Self {
        let a = Dir3::new_normalize(axis);
        let r_raw = ref_dir - ref_dir.dot(a.as_ref()) * a.as_ref();
        Self {
            center,
            axis: a,
            ref_dir: Dir3::new_normalize(r_raw),
            radius,
            start_angle,
            sweep,
            v_min,
            v_max,
        }
    }

    fn y_dir(&self) -> Vec3 {
        self.axis.as_ref().cross(self.ref_dir.as_ref())
    }

    /// Evaluate at angular parameter `u` (radians) and height `v`.
    pub fn evaluate(&self, u: f64, v: f64) -> Point3 {
        let (sin_u, cos_u) = u.sin_cos();
        self.center
            + self.radius * (cos_u * self.ref_dir.as_ref() + sin_u * self.y_dir())
            + v * self.axis.as_ref()
    }

    /// Outward surface normal at angular parameter `u`.
    pub fn normal(&self, u: f64) -> Vec3 {
        let (sin_u, cos_u) = u.sin_cos();
        cos_u * self.ref_dir.as_ref() + sin_u * self.y_dir()
    }
}

// =============================================================================
// Spun (side surface of a revolved line edge)
// =============================================================================

/// A surface of revolution: a straight generatrix from `start` to `end`
/// swept about an axis by `sweep` radians. Covers the cylinder, cone, and
/// flat-disc side faces produced by revolving a line profile edge.
#[derive(Debug, Clone)]
pub struct Spun {
    /// A point on the revolution axis.
    pub axis_origin: Point3,
    /// Unit axis direction.
    pub axis: Dir3,
    /// Generatrix start (at angle 0).
    pub start: Point3,
    /// Generatrix end (at angle 0).
    pub end: Point3,
    /// Sweep angle in radians, positive CCW about the axis.
    pub sweep: f64,
}

impl Spun {
    fn rotate(&self, p: Point3, ang: f64) -> Point3 {
        let d = p - self.axis_origin;
        let a = self.axis.as_ref();
        let along = d.dot(a) * a;
        let radial = d - along;
        let ortho = a.cross(&radial);
        let (s, c) = ang.sin_cos();
        self.axis_origin + along + c * radial + s * ortho
    }

    /// Evaluate at generatrix parameter `t ∈ [0, 1]` and angle `ang ∈ [0, sweep]`.
    pub fn evaluate(&self, t: f64, ang: f64) -> Point3 {
        let p = self.start + t * (self.end - self.start);
        self.rotate(p, ang)
    }

    /// Surface normal at `(t, ang)` from the cross of the partials. The
    /// caller applies the face's reversed flag; a degenerate partial (point
    /// on the axis) falls back to the radial direction.
    pub fn normal(&self, t: f64, ang: f64) -> Vec3 {
        let eps = 1e-6;
        let p = self.evaluate(t, ang);
        let dt = self.evaluate((t + eps).min(1.0), ang) - self.evaluate((t - eps).max(0.0), ang);
        let da = self.evaluate(t, ang + eps) - self.evaluate(t, ang - eps);
        let n = da.cross(&dt);
        if n.norm() > 1e-12 {
            n.normalize()
        } else {
            let d = p - self.axis_origin;
            let a = self.axis.as_ref();
            let radial = d - d.dot(a) * a;
            if radial.norm() > 1e-12 {
                radial.normalize()
            } else {
                *a
            }
        }
    }
}

// =============================================================================
// Surface / Curve enums
// =============================================================================

/// The kind of a surface, for match-free dispatch checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceKind {
    /// Infinite plane.
    Plane,
    /// Cylindrical surface.
    Cylinder,
    /// Surface of revolution with a straight generatrix.
    Spun,
}

/// A surface descriptor referenced by faces.
#[derive(Debug, Clone)]
pub enum Surface {
    /// Planar surface.
    Plane(Plane),
    /// Cylindrical surface (extruded arc/circle side faces).
    Cylinder(Cylinder),
    /// Revolved surface (revolve side faces).
    Spun(Spun),
}

impl Surface {
    /// The kind tag of this surface.
    pub fn kind(&self) -> SurfaceKind {
        match self {
            Surface::Plane(_) => SurfaceKind::Plane,
            Surface::Cylinder(_) => SurfaceKind::Cylinder,
            Surface::Spun(_) => SurfaceKind::Spun,
        }
    }

    /// The plane, if this surface is planar.
    pub fn as_plane(&self) -> Option<&Plane> {
        match self {
            Surface::Plane(p) => Some(p),
            _ => None,
        }
    }
}

/// A circle in 3D, the curve under circular edges.
#[derive(Debug, Clone)]
pub struct Circle3 {
    /// Center of the circle.
    pub center: Point3,
    /// Radius.
    pub radius: f64,
    /// In-plane direction at angle 0.
    pub x_dir: Dir3,
    /// In-plane direction at angle π/2.
    pub y_dir: Dir3,
}

impl Circle3 {
    /// Evaluate at angle `t` radians.
    pub fn evaluate(&self, t: f64) -> Point3 {
        let (s, c) = t.sin_cos();
        self.center + self.radius * (c * self.x_dir.as_ref() + s * self.y_dir.as_ref())
    }
}

/// A circular arc in 3D.
#[derive(Debug, Clone)]
pub struct Arc3 {
    /// The supporting circle.
    pub circle: Circle3,
    /// Start angle in radians.
    pub start_angle: f64,
    /// End angle in radians.
    pub end_angle: f64,
    /// True if the arc runs counter-clockwise from start to end.
    pub ccw: bool,
}

impl Arc3 {
    /// Signed angular span from start to end respecting the CCW flag.
    pub fn span(&self) -> f64 {
        let mut d = self.end_angle - self.start_angle;
        if self.ccw {
            if d <= 0.0 {
                d += std::f64::consts::TAU;
            }
        } else if d >= 0.0 {
            d -= std::f64::consts::TAU;
        }
        d
    }

    /// Evaluate at fraction `t ∈ [0, 1]` of the arc.
    pub fn evaluate(&self, t: f64) -> Point3 {
        self.circle.evaluate(self.start_angle + t * self.span())
    }
}

/// A curve descriptor referenced by edges.
#[derive(Debug, Clone)]
pub enum Curve {
    /// Straight segment between two points.
    Line {
        /// Start point.
        start: Point3,
        /// End point.
        end: Point3,
    },
    /// Circular arc.
    Arc(Arc3),
    /// Full circle.
    Circle(Circle3),
}

// =============================================================================
// Geometry store and solid model
// =============================================================================

/// Storage for the surfaces and curves of one arena.
#[derive(Debug, Clone, Default)]
pub struct GeometryStore {
    /// Surfaces, indexed by face surface references.
    pub surfaces: Vec<Surface>,
    /// Curves, indexed by edge curve references.
    pub curves: Vec<Curve>,
}

impl GeometryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a surface and return its index.
    pub fn add_surface(&mut self, surface: Surface) -> u32 {
        let idx = self.surfaces.len() as u32;
        self.surfaces.push(surface);
        idx
    }

    /// Add a curve and return its index.
    pub fn add_curve(&mut self, curve: Curve) -> u32 {
        let idx = self.curves.len() as u32;
        self.curves.push(curve);
        idx
    }
}

/// Topology arena plus its geometry: the full model of one rebuild session.
#[derive(Debug, Clone, Default)]
pub struct SolidModel {
    /// The topological structure.
    pub topology: Topology,
    /// The geometric data.
    pub geometry: GeometryStore,
}

impl SolidModel {
    /// Create an empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all topology and geometry.
    pub fn clear(&mut self) {
        self.topology.clear();
        self.geometry = GeometryStore::new();
    }

    /// The surface descriptor of a face.
    pub fn face_surface(&self, face: FaceId) -> &Surface {
        &self.geometry.surfaces[self.topology.face_surface(face) as usize]
    }

    /// The plane of a face, if planar.
    pub fn face_plane(&self, face: FaceId) -> Option<&Plane> {
        self.face_surface(face).as_plane()
    }

    /// Outward normal of a planar face, honoring the reversed flag.
    pub fn face_normal(&self, face: FaceId) -> Option<Vec3> {
        self.face_plane(face).map(|p| {
            let n = *p.normal.as_ref();
            if self.topology.face_reversed(face) {
                -n
            } else {
                n
            }
        })
    }

    /// True if every live face of the body is planar.
    pub fn body_is_planar(&self, body: BodyId) -> bool {
        self.topology
            .body_faces(body)
            .iter()
            .all(|&f| matches!(self.face_surface(f), Surface::Plane(_)))
    }
}
