#![warn(missing_docs)]

//! Planar boundary-evaluation booleans for the forma core.
//!
//! Union, subtract, and intersect of planar-faced bodies via a full
//! boundary-evaluation pipeline, with no external geometry kernel:
//!
//! 1. **Gates** — degenerate operands and disjoint boxes short-circuit
//! 2. **Project** — every face into its outward-aligned 2D frame
//! 3. **Intersect** — coplanar boundary clips and transverse plane lines
//! 4. **Imprint** — planar subdivision per face, pieces with holes
//! 5. **Classify** — coplanarity first, then offset ray casting
//! 6. **Select / dedup / clamp / regularize** — the operation's keep rule
//! 7. **Stitch** — fresh body, explicit twin matching, provenance records
//!
//! Bodies with non-planar faces are rejected with
//! [`BooleanError::NonPlanarInput`]; a production system would dispatch to
//! a general kernel at that point.

mod api;
pub mod bbox;
pub mod classify;
pub mod imprint;
mod pipeline;
pub mod sew;
pub mod ssi;

pub use api::{BooleanError, BooleanOp, BooleanOutput};

use forma_kernel_geom::SolidModel;
use forma_kernel_math::NumericContext;
use forma_kernel_topo::BodyId;

/// Evaluate a boolean between two bodies of the arena.
///
/// On success the returned body is freshly stitched (or, on shortcut
/// paths, the untouched target), and `face_records` carry enough
/// provenance to merge the operands' operation histories.
pub fn evaluate(
    model: &mut SolidModel,
    target: BodyId,
    tool: BodyId,
    op: BooleanOp,
    ctx: &NumericContext,
) -> Result<BooleanOutput, BooleanError> {
    pipeline::evaluate_boolean(model, target, tool, op, ctx)
}
