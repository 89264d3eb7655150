#![warn(missing_docs)]

//! Math types for the forma B-rep core.
//!
//! Thin wrappers around nalgebra providing domain-specific types for 3D CAD
//! geometry (points, vectors, directions, transforms) plus the numeric
//! context that centralizes every tolerance used by the kernel.

use nalgebra::{Matrix4, Unit, Vector2, Vector3, Vector4};

/// A point in 3D space.
pub type Point3 = nalgebra::Point3<f64>;

/// A vector in 3D space.
pub type Vec3 = Vector3<f64>;

/// A unit (normalized) direction vector in 3D space.
pub type Dir3 = Unit<Vector3<f64>>;

/// A point in 2D parameter space.
pub type Point2 = nalgebra::Point2<f64>;

/// A vector in 2D space.
pub type Vec2 = Vector2<f64>;

/// A 3x3 matrix.
pub type Matrix3 = nalgebra::Matrix3<f64>;

/// A 4x4 affine transformation matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct Transform {
    /// The underlying 4x4 matrix.
    pub matrix: Matrix4<f64>,
}

impl Transform {
    /// Identity transform.
    pub fn identity() -> Self {
        Self {
            matrix: Matrix4::identity(),
        }
    }

    /// Translation by `(dx, dy, dz)`.
    pub fn translation(dx: f64, dy: f64, dz: f64) -> Self {
        let mut m = Matrix4::identity();
        m[(0, 3)] = dx;
        m[(1, 3)] = dy;
        m[(2, 3)] = dz;
        Self { matrix: m }
    }

    /// Rotation about an arbitrary axis through the origin by `angle` radians.
    ///
    /// Uses Rodrigues' rotation formula.
    pub fn rotation_about_axis(axis: &Dir3, angle: f64) -> Self {
        let (s, c) = angle.sin_cos();
        let t = 1.0 - c;
        let (x, y, z) = (axis.as_ref().x, axis.as_ref().y, axis.as_ref().z);
        let mut m = Matrix4::identity();
        m[(0, 0)] = t * x * x + c;
        m[(0, 1)] = t * x * y - s * z;
        m[(0, 2)] = t * x * z + s * y;
        m[(1, 0)] = t * x * y + s * z;
        m[(1, 1)] = t * y * y + c;
        m[(1, 2)] = t * y * z - s * x;
        m[(2, 0)] = t * x * z - s * y;
        m[(2, 1)] = t * y * z + s * x;
        m[(2, 2)] = t * z * z + c;
        Self { matrix: m }
    }

    /// Rotation about an axis through an arbitrary point.
    pub fn rotation_about_line(origin: &Point3, axis: &Dir3, angle: f64) -> Self {
        let to_origin = Transform::translation(-origin.x, -origin.y, -origin.z);
        let rot = Transform::rotation_about_axis(axis, angle);
        let back = Transform::translation(origin.x, origin.y, origin.z);
        back.then(&rot).then(&to_origin)
    }

    /// Compose: apply `other` first, then `self` (`self * other`).
    pub fn then(&self, other: &Transform) -> Self {
        Self {
            matrix: self.matrix * other.matrix,
        }
    }

    /// Transform a point.
    pub fn apply_point(&self, p: &Point3) -> Point3 {
        let v = self.matrix * Vector4::new(p.x, p.y, p.z, 1.0);
        Point3::new(v.x, v.y, v.z)
    }

    /// Transform a direction vector (ignores translation).
    pub fn apply_vec(&self, v: &Vec3) -> Vec3 {
        let r = self.matrix * Vector4::new(v.x, v.y, v.z, 0.0);
        Vec3::new(r.x, r.y, r.z)
    }

    /// Inverse of this transform, if it exists.
    pub fn inverse(&self) -> Option<Self> {
        self.matrix.try_inverse().map(|matrix| Self { matrix })
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

/// Central tolerance context for geometric predicates.
///
/// Every predicate in the kernel reads `length` as its baseline and derives
/// scaled tolerances (`10·tol`, `1000·tol`, `tol²`) through the helpers here.
/// Hard-coded epsilons outside this struct's defaults are a bug.
#[derive(Debug, Clone, Copy)]
pub struct NumericContext {
    /// Linear distance tolerance in model units (mm).
    pub length: f64,
    /// Angular tolerance in radians.
    pub angle: f64,
    /// Area tolerance in model units squared.
    pub area: f64,
}

impl NumericContext {
    /// Default CAD tolerances.
    pub const DEFAULT: Self = Self {
        length: 1e-6,
        angle: 1e-9,
        area: 1e-12,
    };

    /// Check if a scalar is effectively zero under the length tolerance.
    pub fn is_zero(&self, x: f64) -> bool {
        x.abs() < self.length
    }

    /// Check if a scalar is effectively zero under a scaled tolerance.
    pub fn is_zero_scaled(&self, x: f64, multiplier: f64) -> bool {
        x.abs() < self.length * multiplier
    }

    /// Snap a value to the nearest multiple of `length * multiplier`.
    ///
    /// Used for hash bucketing and vertex dedup keys; the multiplier makes
    /// the bucket size explicit at the call site.
    pub fn snap(&self, x: f64, multiplier: f64) -> f64 {
        let step = self.length * multiplier;
        (x / step).round() * step
    }

    /// Quantize a value into an integer bucket of width `length * multiplier`.
    pub fn bucket(&self, x: f64, multiplier: f64) -> i64 {
        (x / (self.length * multiplier)).round() as i64
    }

    /// Check if two points are coincident within the length tolerance.
    pub fn points_equal(&self, a: &Point3, b: &Point3) -> bool {
        (a - b).norm() < self.length
    }

    /// Check if two unit vectors are parallel (same or opposite direction).
    ///
    /// The cross-product norm is the sine of the angle between the vectors;
    /// the `1e3` factor widens the angular tolerance for computed normals.
    pub fn parallel(&self, a: &Vec3, b: &Vec3) -> bool {
        a.cross(b).norm() < 1e3 * self.angle
    }

    /// Check if two unit vectors point the same way within tolerance.
    pub fn same_direction(&self, a: &Vec3, b: &Vec3) -> bool {
        self.parallel(a, b) && a.dot(b) > 0.0
    }
}

impl Default for NumericContext {
    fn default() -> Self {
        Self::DEFAULT
    }
}
