#![warn(missing_docs)]

//! Feature-history rebuild engine for the forma parametric core.
//!
//! A [`SolidSession`] owns one topology arena and interprets an ordered
//! feature list into B-rep bodies, render meshes, and a persistent
//! reference index. A single rebuild is strictly single-threaded with
//! respect to the arena; independent rebuilds live in independent
//! sessions. Failures are collected per feature and the rebuild continues
//! — downstream features referencing a failed body fail themselves, which
//! is the intended cascade.
//!
//! # Example
//!
//! ```no_run
//! use forma_kernel::{RebuildOptions, SolidSession};
//! use std::collections::BTreeMap;
//!
//! let mut session = SolidSession::new();
//! session.init(RebuildOptions::default());
//! let features: BTreeMap<String, forma_ir::Feature> = BTreeMap::new();
//! let order: Vec<String> = Vec::new();
//! let result = session.rebuild(&features, &order, None);
//! assert!(result.errors.is_empty());
//! session.dispose();
//! ```

mod rebuild;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use forma_ir::Feature;
use forma_kernel_geom::SolidModel;
use forma_kernel_math::NumericContext;
use forma_kernel_naming::{OperationHistory, ReferenceIndex};
use forma_kernel_sketch::{ProjectionSolver, SketchSolver, SolveResult};
use forma_kernel_tessellate::{SurfaceMesh, TessellationParams};
use forma_kernel_topo::BodyId;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub use forma_kernel_naming::{resolve, resolve_many, RefInput, Resolution};

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct RebuildOptions {
    /// Tessellate surviving bodies after the feature pass.
    pub compute_meshes: bool,
    /// Run the topology validator on surviving bodies and surface
    /// error-severity findings as rebuild warnings.
    pub validate: bool,
    /// Tessellation quality.
    pub tessellation: TessellationParams,
    /// Tolerances used by every geometric predicate of the rebuild.
    pub tolerances: NumericContext,
}

impl Default for RebuildOptions {
    fn default() -> Self {
        Self {
            compute_meshes: true,
            validate: false,
            tessellation: TessellationParams::default(),
            tolerances: NumericContext::DEFAULT,
        }
    }
}

/// Cooperative cancellation flag, checked between features.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// Request cancellation of the running rebuild.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// True once cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    fn reset(&self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

/// Per-feature outcome of a rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureStatus {
    /// Interpreted successfully.
    Computed,
    /// Skipped: suppressed in the document.
    Suppressed,
    /// Skipped: past the rebuild gate.
    Gated,
    /// Failed; see the error list.
    Error,
}

/// Stable error codes of the rebuild engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Wrapper for unexpected per-feature failures.
    BuildError,
    /// No closed profile loop in the referenced sketch.
    OpenProfile,
    /// Revolve axis entity missing from the sketch.
    AxisMissing,
    /// Revolve axis entity is not a line.
    AxisNotALine,
    /// Sweep magnitude is zero.
    ZeroSweep,
    /// Referenced sketch missing or not yet computed.
    SketchNotFound,
    /// Boolean operand has non-planar faces.
    NonPlanarInput,
    /// Boolean result is empty.
    EmptyResult,
    /// A cut removed no material from any body.
    CutFailed,
    /// Boolean could not run (missing operands or pipeline failure).
    BooleanFailed,
    /// Rebuild aborted by the cancellation token.
    Cancelled,
}

/// One recorded failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureError {
    /// The feature that failed.
    pub feature_id: String,
    /// Stable error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

/// Serializable summary of one surviving body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BodySummary {
    /// Display name, if assigned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Display color, if assigned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Feature that originally created the body.
    pub source_feature_id: String,
    /// Live face count.
    pub face_count: usize,
    /// Live edge count.
    pub edge_count: usize,
}

/// Everything a rebuild produces.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RebuildResult {
    /// Surviving bodies by body-map key, in creation order.
    pub bodies: IndexMap<String, BodySummary>,
    /// Meshes by body-map key (when mesh computation is enabled).
    pub meshes: BTreeMap<String, SurfaceMesh>,
    /// Persistent references by body-map key, positionally matching the
    /// meshes. Recomputed every rebuild, never persisted.
    pub reference_index: ReferenceIndex,
    /// Per-feature status in input order.
    pub feature_status: BTreeMap<String, FeatureStatus>,
    /// Collected failures.
    pub errors: Vec<FeatureError>,
    /// Non-fatal findings (boolean warnings, validator findings).
    pub warnings: Vec<String>,
    /// Solver reports per sketch feature.
    pub sketch_solve_results: BTreeMap<String, SolveResult>,
}

/// A body-map entry: the current body plus its naming history.
#[derive(Debug)]
pub(crate) struct BodyEntry {
    pub body: BodyId,
    pub name: Option<String>,
    pub color: Option<String>,
    pub source_feature_id: String,
    pub history: OperationHistory,
}

/// One rebuild session: owns the arena and per-session caches.
pub struct SolidSession {
    pub(crate) options: RebuildOptions,
    pub(crate) model: SolidModel,
    pub(crate) solver: Box<dyn SketchSolver + Send + Sync>,
    cancel: CancellationToken,
    pub(crate) last_reference_index: ReferenceIndex,
    initialized: bool,
}

impl Default for SolidSession {
    fn default() -> Self {
        Self::new()
    }
}

impl SolidSession {
    /// Create a session with default options.
    pub fn new() -> Self {
        Self {
            options: RebuildOptions::default(),
            model: SolidModel::new(),
            solver: Box::new(ProjectionSolver::default()),
            cancel: CancellationToken::default(),
            last_reference_index: ReferenceIndex::new(),
            initialized: false,
        }
    }

    /// Initialize the session. Idempotent: only the first call applies.
    pub fn init(&mut self, options: RebuildOptions) {
        if self.initialized {
            return;
        }
        self.options = options;
        self.initialized = true;
    }

    /// Replace the sketch solver backend.
    pub fn set_solver(&mut self, solver: Box<dyn SketchSolver + Send + Sync>) {
        self.solver = solver;
    }

    /// The cancellation token for this session's rebuilds.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Rebuild the document: interpret `feature_order` against
    /// `features_by_id`, stopping feature interpretation after
    /// `rebuild_gate` when given.
    pub fn rebuild(
        &mut self,
        features_by_id: &BTreeMap<String, Feature>,
        feature_order: &[String],
        rebuild_gate: Option<&str>,
    ) -> RebuildResult {
        self.init(RebuildOptions::default());
        let result = rebuild::run(self, features_by_id, feature_order, rebuild_gate);
        self.cancel.reset();
        self.last_reference_index = result.reference_index.clone();
        result
    }

    /// Resolve a persistent reference against the most recent rebuild's
    /// reference index.
    pub fn resolve_reference(&self, input: &RefInput) -> Resolution {
        resolve(input, &self.last_reference_index)
    }

    /// Release the arena and all session caches.
    pub fn dispose(&mut self) {
        self.model.clear();
        self.last_reference_index.clear();
        self.initialized = false;
    }

    /// Read access to the session's model (for inspection and tests).
    pub fn model(&self) -> &SolidModel {
        &self.model
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
