#![warn(missing_docs)]

//! Sketch-based operations for the forma core.
//!
//! Takes a sketch document (points, entities, constraints keyed by stable
//! string identifiers) through constraint solving, closed-profile
//! extraction, and extrude/revolve body construction. Sweeps populate the
//! operation history that persistent naming builds on.

mod extrude;
mod profile;
mod revolve;
mod solve;

pub use extrude::{extrude, SweepOutput};
pub use profile::{
    build_profiles, compute_loop_id, Profile, ProfileEdge, ProfileEdgeKind, ProfileLoop,
};
pub use revolve::{revolve, RevolveAxis};
pub use solve::{DofReport, ProjectionSolver, SketchSolver, SolveResult, SolveStatus};

use thiserror::Error;

/// Errors from sketch-based operations.
#[derive(Debug, Clone, Error)]
pub enum SketchError {
    /// No closed cycle was found where a closed profile is required.
    #[error("no closed profile loop in sketch")]
    OpenProfile,

    /// A referenced point identifier does not exist in the sketch.
    #[error("unknown point id: {0}")]
    UnknownPoint(String),

    /// A referenced entity identifier does not exist in the sketch.
    #[error("unknown entity id: {0}")]
    UnknownEntity(String),

    /// Extrusion sweep has zero magnitude.
    #[error("extrusion distance is zero")]
    ZeroExtrusion,

    /// The named axis entity does not exist in the sketch.
    #[error("revolve axis entity not found: {0}")]
    AxisMissing(String),

    /// The named axis entity is not a line.
    #[error("revolve axis entity is not a line: {0}")]
    AxisNotALine(String),

    /// Revolution sweep angle is zero.
    #[error("revolve sweep angle is zero")]
    ZeroSweep,

    /// Arc profile edges are not supported by revolve.
    #[error("arc segments not supported for revolve operation")]
    ArcNotSupported,

    /// A profile edge is degenerate (zero length).
    #[error("degenerate profile edge: {0}")]
    DegenerateEdge(String),
}
