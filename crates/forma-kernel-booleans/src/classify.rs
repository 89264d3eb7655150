//! Piece classification against the opposite body.
//!
//! Coplanarity is decided first: a piece lying in the plane of one of the
//! other body's faces (and inside its polygon) is `OnSame` or `OnOpposite`
//! by normal orientation. Everything else ray-casts an offset test point
//! through the other body's faces and counts crossings.

use forma_kernel_math::{NumericContext, Point3, Vec3};

use crate::imprint::{interior_point, Piece};
use crate::ssi::FacePoly;

/// Where a piece sits relative to the other body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PieceClass {
    /// Strictly inside the other body.
    Inside,
    /// Strictly outside the other body.
    Outside,
    /// Coplanar with an other-body face, normals aligned.
    OnSame,
    /// Coplanar with an other-body face, normals opposed.
    OnOpposite,
}

/// Fixed oblique ray direction: never parallel to an axis-aligned face.
fn ray_direction() -> Vec3 {
    Vec3::new(0.5633, 0.2725, 0.7817).normalize()
}

/// Count-crossings point-in-body test.
pub fn point_inside(faces: &[FacePoly], p: &Point3, ctx: &NumericContext) -> bool {
    let dir = ray_direction();
    let mut crossings = 0usize;
    for f in faces {
        let denom = dir.dot(&f.outward);
        if denom.abs() < 1e-12 {
            continue;
        }
        let t = -f.signed_distance(p) / denom;
        if t <= ctx.length {
            continue;
        }
        let hit = p + dir * t;
        if f.contains(f.project(&hit)) {
            crossings += 1;
        }
    }
    crossings % 2 == 1
}

/// Classify one piece of `fp` against the other body's faces.
pub fn classify_piece(
    piece: &Piece,
    fp: &FacePoly,
    other: &[FacePoly],
    ctx: &NumericContext,
) -> PieceClass {
    let p2 = interior_point(&piece.outer, &piece.holes);
    let p3 = fp.to_3d(p2);

    for of in other {
        if of.outward.cross(&fp.outward).norm() > 1e-9 {
            continue;
        }
        if of.signed_distance(&p3).abs() > ctx.length {
            continue;
        }
        if of.contains(of.project(&p3)) {
            return if of.outward.dot(&fp.outward) > 0.0 {
                PieceClass::OnSame
            } else {
                PieceClass::OnOpposite
            };
        }
    }

    // Offset off the surface before casting so the ray never starts on a
    // face of the other body.
    let test = p3 + fp.outward * (10.0 * ctx.length);
    if point_inside(other, &test, ctx) {
        PieceClass::Inside
    } else {
        PieceClass::Outside
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bbox::Aabb3;
    use forma_kernel_math::Point2;

    /// Six faces of an axis-aligned cube [0,s]^3.
    fn cube_faces(s: f64) -> Vec<FacePoly> {
        let defs: [(Point3, Vec3, Vec3); 6] = [
            (Point3::new(0.0, 0.0, 0.0), Vec3::y(), Vec3::x()), // z=0, out -Z
            (Point3::new(0.0, 0.0, s), Vec3::x(), Vec3::y()),   // z=s, out +Z
            (Point3::new(0.0, 0.0, 0.0), Vec3::x(), Vec3::z()), // y=0, out -Y
            (Point3::new(0.0, s, 0.0), Vec3::z(), Vec3::x()),   // y=s, out +Y
            (Point3::new(0.0, 0.0, 0.0), Vec3::z(), Vec3::y()), // x=0, out -X
            (Point3::new(s, 0.0, 0.0), Vec3::y(), Vec3::z()),   // x=s, out +X
        ];
        defs.iter()
            .map(|(origin, fx, fy)| {
                let outer = vec![
                    Point2::new(0.0, 0.0),
                    Point2::new(s, 0.0),
                    Point2::new(s, s),
                    Point2::new(0.0, s),
                ];
                let mut aabb = Aabb3::empty();
                for p in &outer {
                    aabb.include_point(&(origin + p.x * fx + p.y * fy));
                }
                FacePoly {
                    face: forma_kernel_topo::FaceId(0),
                    origin: *origin,
                    fx: *fx,
                    fy: *fy,
                    outward: fx.cross(fy),
                    outer,
                    holes: Vec::new(),
                    aabb,
                    hash: 0,
                }
            })
            .collect()
    }

    #[test]
    fn test_point_inside_cube() {
        let faces = cube_faces(10.0);
        let ctx = NumericContext::DEFAULT;
        assert!(point_inside(&faces, &Point3::new(5.0, 5.0, 5.0), &ctx));
        assert!(!point_inside(&faces, &Point3::new(15.0, 5.0, 5.0), &ctx));
        assert!(!point_inside(&faces, &Point3::new(-1.0, 5.0, 5.0), &ctx));
        assert!(point_inside(&faces, &Point3::new(9.99, 9.99, 9.99), &ctx));
    }

    #[test]
    fn test_classify_inside_outside() {
        let cube = cube_faces(10.0);
        let ctx = NumericContext::DEFAULT;
        // A small horizontal square at z=5 inside the cube
        let piece = Piece {
            outer: vec![
                Point2::new(2.0, 2.0),
                Point2::new(4.0, 2.0),
                Point2::new(4.0, 4.0),
                Point2::new(2.0, 4.0),
            ],
            holes: Vec::new(),
            centroid: Point2::new(3.0, 3.0),
            area: 4.0,
        };
        let fp_inside = FacePoly {
            face: forma_kernel_topo::FaceId(0),
            origin: Point3::new(0.0, 0.0, 5.0),
            fx: Vec3::x(),
            fy: Vec3::y(),
            outward: Vec3::z(),
            outer: piece.outer.clone(),
            holes: Vec::new(),
            aabb: Aabb3::empty(),
            hash: 0,
        };
        assert_eq!(
            classify_piece(&piece, &fp_inside, &cube, &ctx),
            PieceClass::Inside
        );
        let fp_outside = FacePoly {
            origin: Point3::new(0.0, 0.0, 50.0),
            ..fp_inside.clone()
        };
        assert_eq!(
            classify_piece(&piece, &fp_outside, &cube, &ctx),
            PieceClass::Outside
        );
    }

    #[test]
    fn test_classify_coplanar() {
        let cube = cube_faces(10.0);
        let ctx = NumericContext::DEFAULT;
        let piece = Piece {
            outer: vec![
                Point2::new(2.0, 2.0),
                Point2::new(4.0, 2.0),
                Point2::new(4.0, 4.0),
                Point2::new(2.0, 4.0),
            ],
            holes: Vec::new(),
            centroid: Point2::new(3.0, 3.0),
            area: 4.0,
        };
        // On the cube's top plane with the same outward normal
        let fp_same = FacePoly {
            face: forma_kernel_topo::FaceId(0),
            origin: Point3::new(0.0, 0.0, 10.0),
            fx: Vec3::x(),
            fy: Vec3::y(),
            outward: Vec3::z(),
            outer: piece.outer.clone(),
            holes: Vec::new(),
            aabb: Aabb3::empty(),
            hash: 0,
        };
        assert_eq!(
            classify_piece(&piece, &fp_same, &cube, &ctx),
            PieceClass::OnSame
        );
        // Same plane, opposite outward
        let fp_opp = FacePoly {
            fx: Vec3::y(),
            fy: Vec3::x(),
            outward: -Vec3::z(),
            ..fp_same.clone()
        };
        assert_eq!(
            classify_piece(&piece, &fp_opp, &cube, &ctx),
            PieceClass::OnOpposite
        );
    }
}
