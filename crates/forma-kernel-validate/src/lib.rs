#![warn(missing_docs)]

//! Topology validation for forma bodies.
//!
//! Structural, manifold, degeneracy, and consistency checks over one body,
//! collected into a severity-counted report. Used as a gate after booleans
//! and optionally after a full rebuild. The low-level arena trusts its
//! callers; this is where broken configurations surface.

use forma_kernel_geom::SolidModel;
use forma_kernel_math::NumericContext;
use forma_kernel_topo::{BodyId, FaceId, LoopId, Topology};
use serde::{Deserialize, Serialize};

/// Issue severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Violates a hard invariant.
    Error,
    /// Suspicious but usable.
    Warning,
    /// Informational.
    Info,
}

/// Issue category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IssueCategory {
    /// Null, out-of-range, or dead references.
    Structural,
    /// Broken next/prev cycles.
    LoopCycle,
    /// Broken twin pairing.
    TwinPairing,
    /// Edges with the wrong number of half-edges.
    Manifold,
    /// Open boundary edges.
    Boundary,
    /// Zero-length or short edges.
    Degenerate,
    /// Faces with extreme isoperimetric ratio.
    Sliver,
    /// Vertices closer than tolerance.
    DuplicateVertex,
    /// Parent/child containment mismatches.
    Consistency,
}

/// One reported issue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Severity of the issue.
    pub severity: Severity,
    /// Category of the issue.
    pub category: IssueCategory,
    /// Human-readable description.
    pub message: String,
}

/// Validation outcome for one body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    /// Number of error-severity issues.
    pub error_count: usize,
    /// Number of warning-severity issues.
    pub warning_count: usize,
    /// Number of info-severity issues.
    pub info_count: usize,
    /// All issues in detection order.
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    fn push(&mut self, severity: Severity, category: IssueCategory, message: String) {
        match severity {
            Severity::Error => self.error_count += 1,
            Severity::Warning => self.warning_count += 1,
            Severity::Info => self.info_count += 1,
        }
        self.issues.push(ValidationIssue {
            severity,
            category,
            message,
        });
    }

    /// True when no error-severity issue was found.
    pub fn is_clean(&self) -> bool {
        self.error_count == 0
    }
}

/// Which checks to run.
#[derive(Debug, Clone, Copy)]
pub struct ValidationOptions {
    /// Enforce two half-edges per edge on closed shells.
    pub check_manifold: bool,
    /// O(n²) duplicate-vertex scan.
    pub check_duplicate_vertices: bool,
    /// Isoperimetric ratio (4πA/P²) below which a face is a sliver.
    pub sliver_threshold: f64,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            check_manifold: true,
            check_duplicate_vertices: false,
            sliver_threshold: 1e-4,
        }
    }
}

/// Validate one body of the model.
pub fn validate_body(
    model: &SolidModel,
    body: BodyId,
    options: &ValidationOptions,
    ctx: &NumericContext,
) -> ValidationReport {
    let mut report = ValidationReport::default();
    let topo = &model.topology;

    if !topo.is_body_live(body) {
        report.push(
            Severity::Error,
            IssueCategory::Structural,
            format!("body {body:?} is not live"),
        );
        return report;
    }

    for &shell in topo.body_shells(body) {
        check_shell(model, body, shell, options, ctx, &mut report);
    }

    if options.check_duplicate_vertices {
        check_duplicate_vertices(topo, body, ctx, &mut report);
    }

    report
}

fn check_shell(
    model: &SolidModel,
    body: BodyId,
    shell: forma_kernel_topo::ShellId,
    options: &ValidationOptions,
    ctx: &NumericContext,
    report: &mut ValidationReport,
) {
    let topo = &model.topology;
    if !topo.is_shell_live(shell) {
        report.push(
            Severity::Error,
            IssueCategory::Structural,
            format!("shell {shell:?} of body {body:?} is not live"),
        );
        return;
    }
    if topo.shell_body(shell) != body {
        report.push(
            Severity::Error,
            IssueCategory::Consistency,
            format!("shell {shell:?} does not point back to body {body:?}"),
        );
    }

    // Count half-edges per edge across the shell.
    let mut edge_uses: std::collections::HashMap<forma_kernel_topo::EdgeId, usize> =
        std::collections::HashMap::new();

    for &face in topo.shell_faces(shell) {
        if !topo.is_face_live(face) {
            continue;
        }
        check_face(model, shell, face, options, ctx, report, &mut edge_uses);
    }

    let closed = topo.shell_closed(shell);
    for (edge, uses) in edge_uses {
        if uses == 2 {
            continue;
        }
        if uses == 1 {
            if closed {
                report.push(
                    Severity::Error,
                    IssueCategory::Boundary,
                    format!("closed shell {shell:?} has boundary edge {edge:?}"),
                );
            } else {
                report.push(
                    Severity::Info,
                    IssueCategory::Boundary,
                    format!("open shell {shell:?} has boundary edge {edge:?}"),
                );
            }
        } else if options.check_manifold {
            report.push(
                Severity::Error,
                IssueCategory::Manifold,
                format!("edge {edge:?} has {uses} half-edges in shell {shell:?}"),
            );
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn check_face(
    model: &SolidModel,
    shell: forma_kernel_topo::ShellId,
    face: FaceId,
    options: &ValidationOptions,
    ctx: &NumericContext,
    report: &mut ValidationReport,
    edge_uses: &mut std::collections::HashMap<forma_kernel_topo::EdgeId, usize>,
) {
    let topo = &model.topology;

    if topo.face_shell(face) != shell {
        report.push(
            Severity::Error,
            IssueCategory::Consistency,
            format!("face {face:?} does not point back to shell {shell:?}"),
        );
    }
    if topo.face_surface(face) as usize >= model.geometry.surfaces.len() {
        report.push(
            Severity::Error,
            IssueCategory::Structural,
            format!("face {face:?} references out-of-range surface"),
        );
    }

    let mut loops = vec![topo.face_outer_loop(face)];
    loops.extend(topo.face_inner_loops(face).iter().copied());
    let mut perimeter = 0.0f64;

    for l in loops {
        if l.is_null() || !topo.is_loop_live(l) {
            report.push(
                Severity::Error,
                IssueCategory::Structural,
                format!("face {face:?} references dead loop {l:?}"),
            );
            continue;
        }
        if topo.loop_face(l) != face {
            report.push(
                Severity::Error,
                IssueCategory::Consistency,
                format!("loop {l:?} does not point back to face {face:?}"),
            );
        }
        perimeter += check_loop(topo, l, ctx, report, edge_uses);
    }

    // Sliver detection via the isoperimetric ratio of the outer loop.
    if perimeter > 0.0 {
        if let Some(area) = planar_face_area(model, face) {
            let ratio = 4.0 * std::f64::consts::PI * area / (perimeter * perimeter);
            if ratio < options.sliver_threshold && area > 0.0 {
                report.push(
                    Severity::Warning,
                    IssueCategory::Sliver,
                    format!("face {face:?} is a sliver (isoperimetric ratio {ratio:.2e})"),
                );
            }
        }
    }
}

/// Walk one loop; returns its perimeter contribution.
fn check_loop(
    topo: &Topology,
    l: LoopId,
    ctx: &NumericContext,
    report: &mut ValidationReport,
    edge_uses: &mut std::collections::HashMap<forma_kernel_topo::EdgeId, usize>,
) -> f64 {
    let mut perimeter = 0.0;
    let mut count = 0usize;
    let limit = topo.half_edge_slots() + 1;

    for he in topo.loop_half_edges(l) {
        count += 1;
        if count > limit {
            report.push(
                Severity::Error,
                IssueCategory::LoopCycle,
                format!("loop {l:?} does not close"),
            );
            break;
        }
        if !topo.is_half_edge_live(he) {
            report.push(
                Severity::Error,
                IssueCategory::Structural,
                format!("loop {l:?} uses dead half-edge {he:?}"),
            );
            continue;
        }
        let next = topo.half_edge_next(he);
        if next.is_null() {
            report.push(
                Severity::Error,
                IssueCategory::LoopCycle,
                format!("half-edge {he:?} has no successor"),
            );
            continue;
        }
        if topo.half_edge_prev(next) != he {
            report.push(
                Severity::Error,
                IssueCategory::LoopCycle,
                format!("prev(next({he:?})) mismatch"),
            );
        }
        // Vertex continuity
        let dest = topo.half_edge_dest(he);
        if topo.half_edge_origin(next) != dest {
            report.push(
                Severity::Error,
                IssueCategory::LoopCycle,
                format!("half-edge {he:?} end does not meet its successor"),
            );
        }

        // Twin invariants
        let twin = topo.half_edge_twin(he);
        if !twin.is_null() {
            if topo.half_edge_twin(twin) != he {
                report.push(
                    Severity::Error,
                    IssueCategory::TwinPairing,
                    format!("twin(twin({he:?})) mismatch"),
                );
            }
            if topo.half_edge_edge(twin) != topo.half_edge_edge(he) {
                report.push(
                    Severity::Error,
                    IssueCategory::TwinPairing,
                    format!("half-edge {he:?} and twin disagree on their edge"),
                );
            }
            let origin = topo.half_edge_origin(he);
            if topo.half_edge_origin(twin) != dest || topo.half_edge_dest(twin) != origin {
                // Zero-length edges collapse both ends to one vertex and
                // are reported as degenerate instead.
                if origin != dest {
                    report.push(
                        Severity::Error,
                        IssueCategory::TwinPairing,
                        format!("half-edge {he:?} and twin do not run opposite"),
                    );
                }
            }
        }

        // Edge accounting and degeneracy
        let edge = topo.half_edge_edge(he);
        if !edge.is_null() {
            *edge_uses.entry(edge).or_insert(0) += 1;
            let origin = topo.half_edge_origin(he);
            // Closed curve edges (circles) legitimately start and end at
            // the same vertex; measure chord length only for open curves.
            if origin == dest && forma_kernel_topo::NULL_GEOM == topo.edge_curve(edge) {
                report.push(
                    Severity::Warning,
                    IssueCategory::Degenerate,
                    format!("edge {edge:?} has zero length"),
                );
            } else if origin != dest {
                let len = (topo.vertex_point(dest) - topo.vertex_point(origin)).norm();
                perimeter += len;
                if len < ctx.length {
                    report.push(
                        Severity::Warning,
                        IssueCategory::Degenerate,
                        format!("edge {edge:?} is shorter than tolerance"),
                    );
                } else if len < 10.0 * ctx.length {
                    report.push(
                        Severity::Info,
                        IssueCategory::Degenerate,
                        format!("edge {edge:?} is short"),
                    );
                }
            }
        }
    }
    perimeter
}

/// Area of a planar face (outer loop minus holes); `None` for curved faces.
fn planar_face_area(model: &SolidModel, face: FaceId) -> Option<f64> {
    let plane = model.face_plane(face)?;
    let topo = &model.topology;
    let poly_area = |l: LoopId| -> f64 {
        let pts: Vec<_> = topo
            .loop_points(l)
            .iter()
            .map(|p| plane.project(p))
            .collect();
        let mut a = 0.0;
        for i in 0..pts.len() {
            let j = (i + 1) % pts.len();
            a += pts[i].x * pts[j].y - pts[j].x * pts[i].y;
        }
        a / 2.0
    };
    let mut area = poly_area(topo.face_outer_loop(face)).abs();
    for &inner in topo.face_inner_loops(face) {
        area -= poly_area(inner).abs();
    }
    Some(area)
}

fn check_duplicate_vertices(
    topo: &Topology,
    body: BodyId,
    ctx: &NumericContext,
    report: &mut ValidationReport,
) {
    let mut verts = Vec::new();
    for face in topo.body_faces(body) {
        for v in topo.face_vertices(face) {
            if !verts.contains(&v) {
                verts.push(v);
            }
        }
    }
    for i in 0..verts.len() {
        for j in (i + 1)..verts.len() {
            let d = (topo.vertex_point(verts[i]) - topo.vertex_point(verts[j])).norm();
            if d < ctx.length {
                report.push(
                    Severity::Warning,
                    IssueCategory::DuplicateVertex,
                    format!("vertices {:?} and {:?} coincide", verts[i], verts[j]),
                );
            }
        }
    }
}
