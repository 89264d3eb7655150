//! Sketch constraint solving.
//!
//! The contract is small: given points, entities, and constraints, produce
//! solved point positions and a degrees-of-freedom report. The rebuild
//! engine treats the solver as a black box behind [`SketchSolver`].
//!
//! The built-in [`ProjectionSolver`] runs Gauss–Seidel constraint
//! projection: every iteration applies each constraint as a local projection
//! of the involved free points, repeating until the largest correction falls
//! under a fraction of the length tolerance. Deterministic by construction:
//! constraints apply in identifier order.

use std::collections::{BTreeMap, HashSet};

use forma_ir::{SketchConstraint, SketchData, SketchEntity, SketchPoint};
use forma_kernel_math::{NumericContext, Point2, Vec2};
use serde::{Deserialize, Serialize};

/// Outcome class of a solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolveStatus {
    /// Converged and fully constrained (or over-determined but consistent).
    Success,
    /// Iteration limit hit before corrections settled.
    NotConverged,
    /// Converged with remaining degrees of freedom.
    UnderConstrained,
    /// Constraint count exceeds the sketch's degrees of freedom and the
    /// system did not settle.
    OverConstrained,
}

/// Degrees-of-freedom report.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DofReport {
    /// 2 per sketch point.
    pub total_dof: u32,
    /// Sum of the canonical DOF cost of each constraint.
    pub constrained_dof: u32,
    /// `max(0, total - constrained)`.
    pub remaining_dof: u32,
    /// True when no degrees of freedom remain.
    pub is_fully_constrained: bool,
    /// True when constraints exceed the available degrees of freedom.
    pub is_over_constrained: bool,
}

/// Result of one solve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolveResult {
    /// Outcome class.
    pub status: SolveStatus,
    /// Solved point positions by id.
    pub solved_points: BTreeMap<String, SketchPoint>,
    /// Degrees-of-freedom report.
    pub dof: DofReport,
}

/// The solver contract consumed by the rebuild engine.
pub trait SketchSolver {
    /// Solve a sketch's constraint system.
    fn solve(&self, data: &SketchData, ctx: &NumericContext) -> SolveResult;
}

/// The built-in Gauss–Seidel projection solver.
#[derive(Debug, Clone)]
pub struct ProjectionSolver {
    /// Iteration budget.
    pub max_iterations: usize,
}

impl Default for ProjectionSolver {
    fn default() -> Self {
        Self {
            max_iterations: 250,
        }
    }
}

fn constraint_dof_cost(c: &SketchConstraint) -> u32 {
    match c {
        SketchConstraint::Coincident { .. } => 2,
        SketchConstraint::Fixed { .. } => 2,
        SketchConstraint::Symmetric { .. } => 2,
        SketchConstraint::Horizontal { .. }
        | SketchConstraint::Vertical { .. }
        | SketchConstraint::Distance { .. }
        | SketchConstraint::Angle { .. }
        | SketchConstraint::Parallel { .. }
        | SketchConstraint::Perpendicular { .. }
        | SketchConstraint::EqualLength { .. }
        | SketchConstraint::Tangent { .. }
        | SketchConstraint::PointOnLine { .. }
        | SketchConstraint::PointOnArc { .. } => 1,
    }
}

impl SketchSolver for ProjectionSolver {
    fn solve(&self, data: &SketchData, ctx: &NumericContext) -> SolveResult {
        let mut points: BTreeMap<String, Point2> = data
            .points_by_id
            .iter()
            .map(|(id, p)| (id.clone(), Point2::new(p.x, p.y)))
            .collect();

        let pinned: HashSet<&str> = data
            .constraints_by_id
            .values()
            .filter_map(|c| match c {
                SketchConstraint::Fixed { point } => Some(point.as_str()),
                _ => None,
            })
            .collect();

        let settle = ctx.length * 0.1;
        let mut converged = data.constraints_by_id.is_empty();
        for _ in 0..self.max_iterations {
            let mut max_correction = 0.0f64;
            for constraint in data.constraints_by_id.values() {
                let correction = apply_constraint(constraint, data, &mut points, &pinned);
                max_correction = max_correction.max(correction);
            }
            if max_correction < settle {
                converged = true;
                break;
            }
        }

        let total_dof = 2 * data.points_by_id.len() as u32;
        let constrained_dof: u32 = data
            .constraints_by_id
            .values()
            .map(constraint_dof_cost)
            .sum();
        let remaining_dof = total_dof.saturating_sub(constrained_dof);
        let over = constrained_dof > total_dof;
        let dof = DofReport {
            total_dof,
            constrained_dof,
            remaining_dof,
            is_fully_constrained: remaining_dof == 0 && !over,
            is_over_constrained: over,
        };

        let status = if !converged {
            if over {
                SolveStatus::OverConstrained
            } else {
                SolveStatus::NotConverged
            }
        } else if remaining_dof > 0 {
            SolveStatus::UnderConstrained
        } else {
            SolveStatus::Success
        };

        SolveResult {
            status,
            solved_points: points
                .into_iter()
                .map(|(id, p)| (id, SketchPoint { x: p.x, y: p.y }))
                .collect(),
            dof,
        }
    }
}

/// Apply one constraint as a projection; returns the largest point movement.
fn apply_constraint(
    constraint: &SketchConstraint,
    data: &SketchData,
    points: &mut BTreeMap<String, Point2>,
    pinned: &HashSet<&str>,
) -> f64 {
    match constraint {
        SketchConstraint::Fixed { point } => {
            // Pinning re-applies the document position each pass.
            if let (Some(original), Some(p)) =
                (data.points_by_id.get(point), points.get_mut(point))
            {
                let target = Point2::new(original.x, original.y);
                let moved = (target - *p).norm();
                *p = target;
                moved
            } else {
                0.0
            }
        }
        SketchConstraint::Coincident { a, b } => move_pair_to(points, pinned, a, b, |pa, pb| {
            let mid = Point2::from((pa.coords + pb.coords) / 2.0);
            (mid, mid)
        }),
        SketchConstraint::Horizontal { a, b } => move_pair_to(points, pinned, a, b, |pa, pb| {
            let y = (pa.y + pb.y) / 2.0;
            (Point2::new(pa.x, y), Point2::new(pb.x, y))
        }),
        SketchConstraint::Vertical { a, b } => move_pair_to(points, pinned, a, b, |pa, pb| {
            let x = (pa.x + pb.x) / 2.0;
            (Point2::new(x, pa.y), Point2::new(x, pb.y))
        }),
        SketchConstraint::Distance { a, b, value } => {
            move_pair_to(points, pinned, a, b, |pa, pb| {
                let d = pb - pa;
                let len = d.norm();
                if len < 1e-12 {
                    return (pa, pb);
                }
                let err = (len - value) / 2.0;
                let dir = d / len;
                (pa + dir * err, pb - dir * err)
            })
        }
        SketchConstraint::Parallel { a, b } => {
            align_line(points, pinned, data, a, b, |target_dir, _| target_dir)
        }
        SketchConstraint::Perpendicular { a, b } => {
            align_line(points, pinned, data, a, b, |target_dir, _| {
                Vec2::new(-target_dir.y, target_dir.x)
            })
        }
        SketchConstraint::Angle { a, b, value } => {
            let angle = value.to_radians();
            align_line(points, pinned, data, a, b, move |target_dir, _| {
                let (s, c) = angle.sin_cos();
                Vec2::new(
                    c * target_dir.x - s * target_dir.y,
                    s * target_dir.x + c * target_dir.y,
                )
            })
        }
        SketchConstraint::EqualLength { a, b } => equalize_lengths(points, pinned, data, a, b),
        SketchConstraint::Tangent { a, b } => project_tangent(points, pinned, data, a, b),
        SketchConstraint::Symmetric { a, b, about } => {
            project_symmetric(points, pinned, data, a, b, about)
        }
        SketchConstraint::PointOnLine { point, line } => {
            project_point_on_line(points, pinned, data, point, line)
        }
        SketchConstraint::PointOnArc { point, arc } => {
            project_point_on_arc(points, pinned, data, point, arc)
        }
    }
}

/// Move two points toward target positions, respecting pins: a pinned point
/// transfers its share of the correction to the free one.
fn move_pair_to<F>(
    points: &mut BTreeMap<String, Point2>,
    pinned: &HashSet<&str>,
    a: &str,
    b: &str,
    target: F,
) -> f64
where
    F: FnOnce(Point2, Point2) -> (Point2, Point2),
{
    let (pa, pb) = match (points.get(a), points.get(b)) {
        (Some(&pa), Some(&pb)) => (pa, pb),
        _ => return 0.0,
    };
    let (ta, tb) = target(pa, pb);
    let a_pinned = pinned.contains(a);
    let b_pinned = pinned.contains(b);

    // A pinned point keeps its place; the free partner absorbs the whole
    // correction by translating the pairwise solution.
    let (na, nb) = if a_pinned && b_pinned {
        (pa, pb)
    } else if a_pinned {
        (pa, tb + (pa - ta))
    } else if b_pinned {
        (ta + (pb - tb), pb)
    } else {
        (ta, tb)
    };

    let moved = (na - pa).norm().max((nb - pb).norm());
    points.insert(a.to_string(), na);
    points.insert(b.to_string(), nb);
    moved
}

fn line_endpoints<'a>(
    data: &'a SketchData,
    entity: &str,
) -> Option<(&'a String, &'a String)> {
    match data.entities_by_id.get(entity) {
        Some(SketchEntity::Line { p1, p2 }) => Some((p1, p2)),
        _ => None,
    }
}

/// Rotate line `b` about its midpoint toward a direction derived from line
/// `a`'s direction (mod π, so opposite directions also satisfy).
fn align_line<F>(
    points: &mut BTreeMap<String, Point2>,
    pinned: &HashSet<&str>,
    data: &SketchData,
    a: &str,
    b: &str,
    derive: F,
) -> f64
where
    F: Fn(Vec2, Vec2) -> Vec2,
{
    let (a1, a2) = match line_endpoints(data, a) {
        Some(e) => e,
        None => return 0.0,
    };
    let (b1, b2) = match line_endpoints(data, b) {
        Some(e) => e,
        None => return 0.0,
    };
    let (pa1, pa2, pb1, pb2) = match (
        points.get(a1.as_str()),
        points.get(a2.as_str()),
        points.get(b1.as_str()),
        points.get(b2.as_str()),
    ) {
        (Some(&w), Some(&x), Some(&y), Some(&z)) => (w, x, y, z),
        _ => return 0.0,
    };
    let dir_a = pa2 - pa1;
    let dir_b = pb2 - pb1;
    let len_a = dir_a.norm();
    let len_b = dir_b.norm();
    if len_a < 1e-12 || len_b < 1e-12 {
        return 0.0;
    }
    let mut want = derive(dir_a / len_a, dir_b / len_b);
    // mod π: keep b's rough heading
    if want.dot(&dir_b) < 0.0 {
        want = -want;
    }
    let mid = Point2::from((pb1.coords + pb2.coords) / 2.0);
    let half = want * (len_b / 2.0);
    let (tb1, tb2) = (mid - half, mid + half);

    let mut moved = 0.0f64;
    if !pinned.contains(b1.as_str()) {
        moved = moved.max((tb1 - pb1).norm());
        points.insert(b1.clone(), tb1);
    }
    if !pinned.contains(b2.as_str()) {
        moved = moved.max((tb2 - pb2).norm());
        points.insert(b2.clone(), tb2);
    }
    moved
}

fn entity_length(points: &BTreeMap<String, Point2>, data: &SketchData, entity: &str) -> Option<f64> {
    let (p1, p2) = line_endpoints(data, entity)?;
    Some((points.get(p2.as_str())? - points.get(p1.as_str())?).norm())
}

fn scale_line_to(
    points: &mut BTreeMap<String, Point2>,
    pinned: &HashSet<&str>,
    data: &SketchData,
    entity: &str,
    target_len: f64,
) -> f64 {
    let (id1, id2) = match line_endpoints(data, entity) {
        Some(e) => (e.0.clone(), e.1.clone()),
        None => return 0.0,
    };
    let (p1, p2) = match (points.get(id1.as_str()), points.get(id2.as_str())) {
        (Some(&a), Some(&b)) => (a, b),
        _ => return 0.0,
    };
    let d = p2 - p1;
    let len = d.norm();
    if len < 1e-12 {
        return 0.0;
    }
    let dir = d / len;
    let mid = Point2::from((p1.coords + p2.coords) / 2.0);
    let (t1, t2) = (mid - dir * (target_len / 2.0), mid + dir * (target_len / 2.0));
    let mut moved = 0.0f64;
    if !pinned.contains(id1.as_str()) {
        moved = moved.max((t1 - p1).norm());
        points.insert(id1, t1);
    }
    if !pinned.contains(id2.as_str()) {
        moved = moved.max((t2 - p2).norm());
        points.insert(id2, t2);
    }
    moved
}

fn equalize_lengths(
    points: &mut BTreeMap<String, Point2>,
    pinned: &HashSet<&str>,
    data: &SketchData,
    a: &str,
    b: &str,
) -> f64 {
    let (la, lb) = match (entity_length(points, data, a), entity_length(points, data, b)) {
        (Some(la), Some(lb)) => (la, lb),
        _ => return 0.0,
    };
    let mean = (la + lb) / 2.0;
    let m1 = scale_line_to(points, pinned, data, a, mean);
    let m2 = scale_line_to(points, pinned, data, b, mean);
    m1.max(m2)
}

fn circle_center_radius(
    points: &BTreeMap<String, Point2>,
    data: &SketchData,
    entity: &str,
) -> Option<(String, Point2, f64)> {
    match data.entities_by_id.get(entity)? {
        SketchEntity::Circle { center, radius } => {
            Some((center.clone(), *points.get(center.as_str())?, *radius))
        }
        SketchEntity::Arc { p1, center, .. } => {
            let c = *points.get(center.as_str())?;
            let r = (points.get(p1.as_str())? - c).norm();
            Some((center.clone(), c, r))
        }
        SketchEntity::Line { .. } => None,
    }
}

/// Shift a line so its distance to a circle's center equals the radius.
fn project_tangent(
    points: &mut BTreeMap<String, Point2>,
    pinned: &HashSet<&str>,
    data: &SketchData,
    line: &str,
    circle: &str,
) -> f64 {
    let (_, center, radius) = match circle_center_radius(points, data, circle) {
        Some(c) => c,
        None => return 0.0,
    };
    let (id1, id2) = match line_endpoints(data, line) {
        Some(e) => (e.0.clone(), e.1.clone()),
        None => return 0.0,
    };
    let (p1, p2) = match (points.get(id1.as_str()), points.get(id2.as_str())) {
        (Some(&a), Some(&b)) => (a, b),
        _ => return 0.0,
    };
    let d = p2 - p1;
    let len = d.norm();
    if len < 1e-12 {
        return 0.0;
    }
    let normal = Vec2::new(-d.y, d.x) / len;
    let dist = (center - p1).dot(&normal);
    let err = dist.abs() - radius;
    let shift = normal * err * dist.signum();
    let mut moved = 0.0f64;
    if !pinned.contains(id1.as_str()) {
        moved = moved.max(shift.norm());
        points.insert(id1, p1 + shift);
    }
    if !pinned.contains(id2.as_str()) {
        moved = moved.max(shift.norm());
        points.insert(id2, p2 + shift);
    }
    moved
}

fn project_symmetric(
    points: &mut BTreeMap<String, Point2>,
    pinned: &HashSet<&str>,
    data: &SketchData,
    a: &str,
    b: &str,
    about: &str,
) -> f64 {
    let (l1, l2) = match line_endpoints(data, about) {
        Some(e) => e,
        None => return 0.0,
    };
    let (q1, q2) = match (points.get(l1.as_str()), points.get(l2.as_str())) {
        (Some(&x), Some(&y)) => (x, y),
        _ => return 0.0,
    };
    let axis = q2 - q1;
    let len = axis.norm();
    if len < 1e-12 {
        return 0.0;
    }
    let dir = axis / len;
    let mirror = |p: Point2| -> Point2 {
        let rel = p - q1;
        let along = rel.dot(&dir);
        let perp = rel - dir * along;
        q1 + dir * along - perp
    };
    move_pair_to(points, pinned, a, b, |pa, pb| {
        // Meet halfway between each point and the mirror of the other.
        let ta = Point2::from((pa.coords + mirror(pb).coords) / 2.0);
        let tb = Point2::from((pb.coords + mirror(pa).coords) / 2.0);
        (ta, tb)
    })
}

fn project_point_on_line(
    points: &mut BTreeMap<String, Point2>,
    pinned: &HashSet<&str>,
    data: &SketchData,
    point: &str,
    line: &str,
) -> f64 {
    if pinned.contains(point) {
        return 0.0;
    }
    let (l1, l2) = match line_endpoints(data, line) {
        Some(e) => e,
        None => return 0.0,
    };
    let (q1, q2, p) = match (
        points.get(l1.as_str()),
        points.get(l2.as_str()),
        points.get(point),
    ) {
        (Some(&a), Some(&b), Some(&p)) => (a, b, p),
        _ => return 0.0,
    };
    let d = q2 - q1;
    let len2 = d.norm_squared();
    if len2 < 1e-24 {
        return 0.0;
    }
    let t = (p - q1).dot(&d) / len2;
    let target = q1 + d * t;
    let moved = (target - p).norm();
    points.insert(point.to_string(), target);
    moved
}

fn project_point_on_arc(
    points: &mut BTreeMap<String, Point2>,
    pinned: &HashSet<&str>,
    data: &SketchData,
    point: &str,
    arc: &str,
) -> f64 {
    if pinned.contains(point) {
        return 0.0;
    }
    let (_, center, radius) = match circle_center_radius(points, data, arc) {
        Some(c) => c,
        None => return 0.0,
    };
    let p = match points.get(point) {
        Some(&p) => p,
        None => return 0.0,
    };
    let d = p - center;
    let len = d.norm();
    if len < 1e-12 {
        return 0.0;
    }
    let target = center + d * (radius / len);
    let moved = (target - p).norm();
    points.insert(point.to_string(), target);
    moved
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data_with(
        points: &[(&str, f64, f64)],
        entities: &[(&str, SketchEntity)],
        constraints: &[(&str, SketchConstraint)],
    ) -> SketchData {
        SketchData {
            points_by_id: points
                .iter()
                .map(|(id, x, y)| (id.to_string(), SketchPoint { x: *x, y: *y }))
                .collect(),
            entities_by_id: entities
                .iter()
                .map(|(id, e)| (id.to_string(), e.clone()))
                .collect(),
            constraints_by_id: constraints
                .iter()
                .map(|(id, c)| (id.to_string(), c.clone()))
                .collect(),
        }
    }

    #[test]
    fn test_unconstrained_passthrough() {
        let data = data_with(&[("p1", 1.0, 2.0), ("p2", 3.0, 4.0)], &[], &[]);
        let result = ProjectionSolver::default().solve(&data, &NumericContext::DEFAULT);
        assert_eq!(result.status, SolveStatus::UnderConstrained);
        assert_eq!(result.solved_points["p1"].x, 1.0);
        assert_eq!(result.dof.total_dof, 4);
        assert_eq!(result.dof.remaining_dof, 4);
    }

    #[test]
    fn test_coincident_merges_points() {
        let data = data_with(
            &[("p1", 0.0, 0.0), ("p2", 2.0, 2.0)],
            &[],
            &[(
                "c1",
                SketchConstraint::Coincident {
                    a: "p1".into(),
                    b: "p2".into(),
                },
            )],
        );
        let result = ProjectionSolver::default().solve(&data, &NumericContext::DEFAULT);
        let p1 = &result.solved_points["p1"];
        let p2 = &result.solved_points["p2"];
        assert!((p1.x - p2.x).abs() < 1e-6);
        assert!((p1.y - p2.y).abs() < 1e-6);
    }

    #[test]
    fn test_distance_with_fixed_anchor() {
        let data = data_with(
            &[("p1", 0.0, 0.0), ("p2", 3.0, 0.0)],
            &[],
            &[
                ("c1", SketchConstraint::Fixed { point: "p1".into() }),
                (
                    "c2",
                    SketchConstraint::Distance {
                        a: "p1".into(),
                        b: "p2".into(),
                        value: 10.0,
                    },
                ),
            ],
        );
        let result = ProjectionSolver::default().solve(&data, &NumericContext::DEFAULT);
        let p1 = &result.solved_points["p1"];
        let p2 = &result.solved_points["p2"];
        assert!((p1.x).abs() < 1e-6 && (p1.y).abs() < 1e-6, "anchor moved");
        let d = ((p2.x - p1.x).powi(2) + (p2.y - p1.y).powi(2)).sqrt();
        assert!((d - 10.0).abs() < 1e-4, "distance {d}");
    }

    #[test]
    fn test_horizontal_levels_points() {
        let data = data_with(
            &[("p1", 0.0, 1.0), ("p2", 5.0, 3.0)],
            &[],
            &[(
                "c1",
                SketchConstraint::Horizontal {
                    a: "p1".into(),
                    b: "p2".into(),
                },
            )],
        );
        let result = ProjectionSolver::default().solve(&data, &NumericContext::DEFAULT);
        assert!(
            (result.solved_points["p1"].y - result.solved_points["p2"].y).abs() < 1e-6
        );
    }

    #[test]
    fn test_point_on_line_projection() {
        let data = data_with(
            &[("a", 0.0, 0.0), ("b", 10.0, 0.0), ("p", 5.0, 3.0)],
            &[(
                "l1",
                SketchEntity::Line {
                    p1: "a".into(),
                    p2: "b".into(),
                },
            )],
            &[
                ("c0", SketchConstraint::Fixed { point: "a".into() }),
                ("c1", SketchConstraint::Fixed { point: "b".into() }),
                (
                    "c2",
                    SketchConstraint::PointOnLine {
                        point: "p".into(),
                        line: "l1".into(),
                    },
                ),
            ],
        );
        let result = ProjectionSolver::default().solve(&data, &NumericContext::DEFAULT);
        assert!(result.solved_points["p"].y.abs() < 1e-6);
        assert!((result.solved_points["p"].x - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_over_constrained_detection() {
        // 1 point = 2 DOF, two fixed constraints = 4 DOF cost; consistent,
        // so it converges, but the report flags over-constraint.
        let data = data_with(
            &[("p1", 0.0, 0.0)],
            &[],
            &[
                ("c1", SketchConstraint::Fixed { point: "p1".into() }),
                ("c2", SketchConstraint::Fixed { point: "p1".into() }),
            ],
        );
        let result = ProjectionSolver::default().solve(&data, &NumericContext::DEFAULT);
        assert!(result.dof.is_over_constrained);
    }

    #[test]
    fn test_deterministic_solve() {
        let data = data_with(
            &[("p1", 0.0, 0.3), ("p2", 4.9, 0.0), ("p3", 5.1, 5.2)],
            &[],
            &[
                (
                    "c1",
                    SketchConstraint::Horizontal {
                        a: "p1".into(),
                        b: "p2".into(),
                    },
                ),
                (
                    "c2",
                    SketchConstraint::Vertical {
                        a: "p2".into(),
                        b: "p3".into(),
                    },
                ),
            ],
        );
        let solver = ProjectionSolver::default();
        let r1 = solver.solve(&data, &NumericContext::DEFAULT);
        let r2 = solver.solve(&data, &NumericContext::DEFAULT);
        assert_eq!(r1, r2);
    }
}
