//! Public API types for planar boolean evaluation.

use forma_kernel_naming::BooleanFaceRecord;
use forma_kernel_topo::BodyId;
use thiserror::Error;

/// Boolean operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BooleanOp {
    /// Keep material of either body.
    Union,
    /// Remove the tool from the target.
    Subtract,
    /// Keep only shared material.
    Intersect,
}

/// Errors from the boolean evaluator.
#[derive(Debug, Clone, Error)]
pub enum BooleanError {
    /// An operand has a non-planar face; this evaluator only handles
    /// planar-faced bodies.
    #[error("boolean operand has non-planar faces")]
    NonPlanarInput,
    /// The operation produced no material.
    #[error("boolean result is empty")]
    EmptyResult,
}

/// A successful boolean evaluation.
#[derive(Debug)]
pub struct BooleanOutput {
    /// The result body (a fresh body, or the target itself on shortcut
    /// paths that leave it untouched).
    pub body: BodyId,
    /// Non-fatal conditions: non-manifold output, imprint fallbacks,
    /// disjoint-operand unions.
    pub warnings: Vec<String>,
    /// Per-input-face provenance used to merge operation histories.
    pub face_records: Vec<BooleanFaceRecord>,
}
