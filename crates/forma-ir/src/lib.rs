#![warn(missing_docs)]

//! Feature document schema for the forma parametric core.
//!
//! The rebuild engine reads features from an external ordered map keyed by
//! opaque string identifiers. This crate defines the wire shape of those
//! features: purely declarative data, no geometry, no evaluation state.
//! Wire names are camelCase; `type`/`kind` tags discriminate the enums.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// 3D vector with f64 components (conventionally millimeters).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    /// X component.
    pub x: f64,
    /// Y component.
    pub y: f64,
    /// Z component.
    pub z: f64,
}

impl Vec3 {
    /// Create a new Vec3.
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Role of a datum plane.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum DatumRole {
    /// World XY plane.
    Xy,
    /// World XZ plane.
    Xz,
    /// World YZ plane.
    Yz,
}

/// Reference from a sketch to the plane it is drawn on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SketchPlaneRef {
    /// A plane feature, by feature id.
    PlaneFeatureId {
        /// The plane feature's id.
        #[serde(rename = "ref")]
        target: String,
    },
    /// A face of an existing body: `face:<featureId>:<faceIndex>`.
    FaceRef {
        /// The face reference string.
        #[serde(rename = "ref")]
        target: String,
    },
    /// A world datum plane by role.
    DatumRole {
        /// The datum role.
        #[serde(rename = "ref")]
        role: DatumRole,
    },
}

// =============================================================================
// Sketch data
// =============================================================================

/// A sketch point in plane coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SketchPoint {
    /// U coordinate on the sketch plane.
    pub x: f64,
    /// V coordinate on the sketch plane.
    pub y: f64,
}

/// A sketch entity, referencing points by identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SketchEntity {
    /// Line between two points.
    Line {
        /// Start point id.
        p1: String,
        /// End point id.
        p2: String,
    },
    /// Circular arc between two points around a center.
    Arc {
        /// Start point id.
        p1: String,
        /// End point id.
        p2: String,
        /// Center point id.
        center: String,
        /// True if the arc runs counter-clockwise from p1 to p2.
        ccw: bool,
    },
    /// Full circle around a center point.
    Circle {
        /// Center point id.
        center: String,
        /// Radius.
        radius: f64,
    },
}

/// A sketch constraint, referencing points and entities by identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SketchConstraint {
    /// Two points coincide.
    Coincident {
        /// First point id.
        a: String,
        /// Second point id.
        b: String,
    },
    /// Two points share a v coordinate.
    Horizontal {
        /// First point id.
        a: String,
        /// Second point id.
        b: String,
    },
    /// Two points share a u coordinate.
    Vertical {
        /// First point id.
        a: String,
        /// Second point id.
        b: String,
    },
    /// A point is pinned at its current position.
    Fixed {
        /// The pinned point id.
        point: String,
    },
    /// Two points are a given distance apart.
    Distance {
        /// First point id.
        a: String,
        /// Second point id.
        b: String,
        /// Target distance.
        value: f64,
    },
    /// Two line entities meet at a given angle (degrees).
    Angle {
        /// First line entity id.
        a: String,
        /// Second line entity id.
        b: String,
        /// Target angle in degrees.
        value: f64,
    },
    /// Two line entities are parallel.
    Parallel {
        /// First line entity id.
        a: String,
        /// Second line entity id.
        b: String,
    },
    /// Two line entities are perpendicular.
    Perpendicular {
        /// First line entity id.
        a: String,
        /// Second line entity id.
        b: String,
    },
    /// Two entities have equal length.
    EqualLength {
        /// First entity id.
        a: String,
        /// Second entity id.
        b: String,
    },
    /// A line is tangent to an arc or circle.
    Tangent {
        /// Line entity id.
        a: String,
        /// Arc or circle entity id.
        b: String,
    },
    /// Two points mirror each other about a line.
    Symmetric {
        /// First point id.
        a: String,
        /// Second point id.
        b: String,
        /// Mirror line entity id.
        about: String,
    },
    /// A point lies on a line entity.
    PointOnLine {
        /// Point id.
        point: String,
        /// Line entity id.
        line: String,
    },
    /// A point lies on an arc or circle entity.
    PointOnArc {
        /// Point id.
        point: String,
        /// Arc or circle entity id.
        arc: String,
    },
}

/// The three identifier-keyed maps of a sketch. Identifiers are persistent
/// across solves and rebuilds; BTreeMaps keep serialization deterministic.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SketchData {
    /// Points by id.
    pub points_by_id: BTreeMap<String, SketchPoint>,
    /// Entities by id.
    pub entities_by_id: BTreeMap<String, SketchEntity>,
    /// Constraints by id.
    pub constraints_by_id: BTreeMap<String, SketchConstraint>,
}

// =============================================================================
// Features
// =============================================================================

/// Whether a swept body adds material or cuts it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyOp {
    /// Merge the new body into existing material.
    Add,
    /// Subtract the new body from existing material.
    Cut,
}

/// How an additive sweep merges into the body map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeScope {
    /// Union into the first intersecting body.
    Auto,
    /// Always create a new body.
    New,
    /// Union into the named target bodies.
    Specific,
}

/// Sweep direction relative to the sketch plane normal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SweepDirection {
    /// Along the plane normal.
    Normal,
    /// Against the plane normal.
    Reversed,
}

/// Extent semantics of an extrude.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ExtrudeExtent {
    /// Exactly `distance` deep.
    Blind,
    /// Through everything (a very large magnitude).
    ThroughAll,
    /// Up to the plane of a referenced face.
    ToFace {
        /// Persistent reference string of the target face.
        #[serde(rename = "ref")]
        target: String,
    },
    /// Up to the plane through a referenced vertex.
    ToVertex {
        /// Persistent reference string of the target vertex.
        #[serde(rename = "ref")]
        target: String,
    },
}

impl Default for ExtrudeExtent {
    fn default() -> Self {
        ExtrudeExtent::Blind
    }
}

/// Boolean operation names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BooleanOpKind {
    /// Keep material of either body.
    Union,
    /// Remove the tool from the target.
    Subtract,
    /// Keep only shared material.
    Intersect,
}

/// Type-specific feature payload, discriminated by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FeatureOp {
    /// The world origin marker.
    Origin,
    /// A datum plane, by role or explicit frame.
    Plane {
        /// World datum role, if this is one of the three standard planes.
        #[serde(skip_serializing_if = "Option::is_none")]
        role: Option<DatumRole>,
        /// Plane normal (explicit frame).
        #[serde(skip_serializing_if = "Option::is_none")]
        normal: Option<Vec3>,
        /// Plane origin (explicit frame).
        #[serde(skip_serializing_if = "Option::is_none")]
        origin: Option<Vec3>,
        /// Plane x direction (explicit frame).
        #[serde(rename = "xDir", skip_serializing_if = "Option::is_none")]
        x_dir: Option<Vec3>,
    },
    /// A constrained 2D sketch on a plane.
    Sketch {
        /// The plane the sketch lives on.
        plane: SketchPlaneRef,
        /// Points, entities, and constraints.
        data: SketchData,
    },
    /// Linear sweep of a sketch profile.
    #[serde(rename_all = "camelCase")]
    Extrude {
        /// Source sketch feature id.
        sketch: String,
        /// Add or cut.
        op: BodyOp,
        /// Sweep direction sign.
        #[serde(default = "default_direction")]
        direction: SweepDirection,
        /// Extent semantics.
        #[serde(default)]
        extent: ExtrudeExtent,
        /// Sweep distance (for blind extents).
        distance: f64,
        /// Merge policy for additive sweeps.
        #[serde(skip_serializing_if = "Option::is_none")]
        merge_scope: Option<MergeScope>,
        /// Target body feature ids for `specific` merges.
        #[serde(skip_serializing_if = "Option::is_none")]
        target_bodies: Option<Vec<String>>,
        /// Name for a newly created body.
        #[serde(skip_serializing_if = "Option::is_none")]
        result_body_name: Option<String>,
        /// Color for a newly created body.
        #[serde(skip_serializing_if = "Option::is_none")]
        result_body_color: Option<String>,
    },
    /// Rotational sweep of a sketch profile about an axis entity.
    #[serde(rename_all = "camelCase")]
    Revolve {
        /// Source sketch feature id.
        sketch: String,
        /// Sketch entity id of the axis line.
        axis: String,
        /// Sweep angle in degrees.
        angle: f64,
        /// Add or cut.
        op: BodyOp,
        /// Merge policy for additive sweeps.
        #[serde(skip_serializing_if = "Option::is_none")]
        merge_scope: Option<MergeScope>,
        /// Target body feature ids for `specific` merges.
        #[serde(skip_serializing_if = "Option::is_none")]
        target_bodies: Option<Vec<String>>,
        /// Name for a newly created body.
        #[serde(skip_serializing_if = "Option::is_none")]
        result_body_name: Option<String>,
        /// Color for a newly created body.
        #[serde(skip_serializing_if = "Option::is_none")]
        result_body_color: Option<String>,
    },
    /// Explicit boolean between two bodies in the body map.
    Boolean {
        /// The operation.
        operation: BooleanOpKind,
        /// Feature id owning the target body.
        target: String,
        /// Feature id owning the tool body.
        tool: String,
    },
}

fn default_direction() -> SweepDirection {
    SweepDirection::Normal
}

/// One feature of the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    /// Opaque stable identifier.
    pub id: String,
    /// Suppressed features are skipped during rebuild.
    #[serde(default)]
    pub suppressed: bool,
    /// Optional display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// The type-specific payload.
    #[serde(flatten)]
    pub op: FeatureOp,
}
