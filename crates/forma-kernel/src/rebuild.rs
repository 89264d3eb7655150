//! The rebuild driver: ordered feature interpretation, body-merge
//! policies, error collection, and the final tessellation/naming pass.

use std::collections::BTreeMap;

use forma_ir::{
    BodyOp, BooleanOpKind, DatumRole, ExtrudeExtent, Feature, FeatureOp, MergeScope, SketchData,
    SketchEntity, SketchPlaneRef, SketchPoint, SweepDirection,
};
use forma_kernel_booleans::{evaluate, BooleanError, BooleanOp};
use forma_kernel_geom::Plane;
use forma_kernel_math::{Dir3, Point3, Vec3};
use forma_kernel_naming::{
    build_body_references, merge_through_boolean, BodyNamingInputs, OperationHistory,
    PersistentRef,
};
use forma_kernel_sketch::{build_profiles, extrude, revolve, Profile, RevolveAxis, SweepOutput};
use forma_kernel_tessellate::tessellate_body;
use forma_kernel_validate::{validate_body, ValidationOptions};
use indexmap::IndexMap;
use tracing::{debug, info_span, warn};

use crate::{
    BodyEntry, BodySummary, ErrorCode, FeatureError, FeatureStatus, RebuildResult, SolidSession,
};

/// Sweep magnitude used by `throughAll` extents.
const THROUGH_ALL_DISTANCE: f64 = 1e5;

/// Cached result of a computed sketch.
struct SolvedSketch {
    plane: Plane,
    profiles: Vec<Profile>,
    solved_points: BTreeMap<String, SketchPoint>,
    data: SketchData,
}

fn err(feature_id: &str, code: ErrorCode, message: impl Into<String>) -> FeatureError {
    FeatureError {
        feature_id: feature_id.to_string(),
        code,
        message: message.into(),
    }
}

pub(crate) fn run(
    session: &mut SolidSession,
    features_by_id: &BTreeMap<String, Feature>,
    feature_order: &[String],
    rebuild_gate: Option<&str>,
) -> RebuildResult {
    let span = info_span!("rebuild", features = feature_order.len());
    let _guard = span.enter();

    // Fresh arena and caches for every rebuild; handles never survive one.
    session.model.clear();
    let mut result = RebuildResult::default();
    let mut body_map: IndexMap<String, BodyEntry> = IndexMap::new();
    let mut sketches: BTreeMap<String, SolvedSketch> = BTreeMap::new();

    let mut reached_gate = false;
    for feature_id in feature_order {
        if reached_gate {
            result
                .feature_status
                .insert(feature_id.clone(), FeatureStatus::Gated);
            continue;
        }
        if session.is_cancelled() {
            result.errors.push(err(
                feature_id,
                ErrorCode::Cancelled,
                "rebuild cancelled between features",
            ));
            // Partial state is discarded; the arena rebuilds next time.
            body_map.clear();
            session.model.clear();
            break;
        }

        let feature = match features_by_id.get(feature_id) {
            Some(f) => f,
            None => {
                result.errors.push(err(
                    feature_id,
                    ErrorCode::BuildError,
                    "feature id not present in the document",
                ));
                result
                    .feature_status
                    .insert(feature_id.clone(), FeatureStatus::Error);
                continue;
            }
        };

        if feature.suppressed {
            result
                .feature_status
                .insert(feature_id.clone(), FeatureStatus::Suppressed);
            if Some(feature_id.as_str()) == rebuild_gate {
                reached_gate = true;
            }
            continue;
        }

        let status = match interpret_feature(
            session,
            feature,
            features_by_id,
            &mut body_map,
            &mut sketches,
            &mut result,
        ) {
            Ok(()) => FeatureStatus::Computed,
            Err(e) => {
                warn!(feature = %feature_id, code = ?e.code, "feature failed");
                result.errors.push(e);
                FeatureStatus::Error
            }
        };
        result.feature_status.insert(feature_id.clone(), status);

        if Some(feature_id.as_str()) == rebuild_gate {
            reached_gate = true;
        }
    }

    // Tessellate survivors and build the reference index.
    let ctx = session.options.tolerances;
    for (key, entry) in &body_map {
        let mesh = tessellate_body(&session.model, entry.body, &session.options.tessellation, &ctx);
        let refs = build_body_references(&BodyNamingInputs {
            body_key: key,
            source_feature_id: &entry.source_feature_id,
            mesh: &mesh,
            history: &entry.history,
        });
        result.reference_index.insert(key.clone(), refs);

        if session.options.validate {
            let report = validate_body(
                &session.model,
                entry.body,
                &ValidationOptions::default(),
                &ctx,
            );
            for issue in &report.issues {
                if issue.severity == forma_kernel_validate::Severity::Error {
                    result
                        .warnings
                        .push(format!("validator: body {key}: {}", issue.message));
                }
            }
        }

        result.bodies.insert(
            key.clone(),
            BodySummary {
                name: entry.name.clone(),
                color: entry.color.clone(),
                source_feature_id: entry.source_feature_id.clone(),
                face_count: session.model.topology.body_faces(entry.body).len(),
                edge_count: session.model.topology.body_edges(entry.body).len(),
            },
        );
        if session.options.compute_meshes {
            result.meshes.insert(key.clone(), mesh);
        }
    }

    debug!(
        bodies = result.bodies.len(),
        errors = result.errors.len(),
        "rebuild finished"
    );
    result
}

#[allow(clippy::too_many_arguments)]
fn interpret_feature(
    session: &mut SolidSession,
    feature: &Feature,
    features_by_id: &BTreeMap<String, Feature>,
    body_map: &mut IndexMap<String, BodyEntry>,
    sketches: &mut BTreeMap<String, SolvedSketch>,
    result: &mut RebuildResult,
) -> Result<(), FeatureError> {
    let ctx = session.options.tolerances;
    let feature_id = feature.id.as_str();

    match &feature.op {
        FeatureOp::Origin | FeatureOp::Plane { .. } => Ok(()),

        FeatureOp::Sketch { plane, data } => {
            let plane = resolve_sketch_plane(session, feature_id, plane, features_by_id, body_map)?;
            let solve = session.solver.solve(data, &ctx);
            let profiles =
                build_profiles(data, &solve.solved_points, &plane).unwrap_or_default();
            sketches.insert(
                feature_id.to_string(),
                SolvedSketch {
                    plane: plane.clone(),
                    profiles,
                    solved_points: solve.solved_points.clone(),
                    data: data.clone(),
                },
            );
            result
                .sketch_solve_results
                .insert(feature_id.to_string(), solve);
            Ok(())
        }

        FeatureOp::Extrude {
            sketch,
            op,
            direction,
            extent,
            distance,
            merge_scope,
            target_bodies,
            result_body_name,
            result_body_color,
        } => {
            let solved = sketches.get(sketch).ok_or_else(|| {
                err(
                    feature_id,
                    ErrorCode::SketchNotFound,
                    format!("sketch {sketch} has no computed result"),
                )
            })?;
            let profile = solved.profiles.first().ok_or_else(|| {
                err(
                    feature_id,
                    ErrorCode::OpenProfile,
                    format!("sketch {sketch} has no closed profile"),
                )
            })?;
            let distance = extent_distance(feature_id, extent, *distance, profile, *direction)?;
            let profile = profile.clone();
            let swept = extrude(
                &mut session.model,
                &profile,
                distance,
                *direction,
                feature_id,
                &ctx,
            )
            .map_err(|e| sketch_error(feature_id, e))?;
            apply_body_policy(
                session,
                feature_id,
                *op,
                merge_scope.unwrap_or(MergeScope::Auto),
                target_bodies.as_deref(),
                result_body_name.clone(),
                result_body_color.clone(),
                swept,
                body_map,
                result,
            )
        }

        FeatureOp::Revolve {
            sketch,
            axis,
            angle,
            op,
            merge_scope,
            target_bodies,
            result_body_name,
            result_body_color,
        } => {
            let solved = sketches.get(sketch).ok_or_else(|| {
                err(
                    feature_id,
                    ErrorCode::SketchNotFound,
                    format!("sketch {sketch} has no computed result"),
                )
            })?;
            let profile = solved
                .profiles
                .first()
                .ok_or_else(|| {
                    err(
                        feature_id,
                        ErrorCode::OpenProfile,
                        format!("sketch {sketch} has no closed profile"),
                    )
                })?
                .clone();
            let axis = {
                let solved = sketches.get(sketch).expect("checked above");
                resolve_axis(
                    feature_id,
                    axis,
                    &solved.data,
                    &solved.solved_points,
                    &solved.plane,
                )?
            };
            let swept = revolve(
                &mut session.model,
                &profile,
                &axis,
                angle.to_radians(),
                feature_id,
                &ctx,
            )
            .map_err(|e| sketch_error(feature_id, e))?;
            apply_body_policy(
                session,
                feature_id,
                *op,
                merge_scope.unwrap_or(MergeScope::Auto),
                target_bodies.as_deref(),
                result_body_name.clone(),
                result_body_color.clone(),
                swept,
                body_map,
                result,
            )
        }

        FeatureOp::Boolean {
            operation,
            target,
            tool,
        } => {
            if !body_map.contains_key(target) || !body_map.contains_key(tool) {
                return Err(err(
                    feature_id,
                    ErrorCode::BooleanFailed,
                    format!("boolean operands missing: target={target}, tool={tool}"),
                ));
            }
            let op = match operation {
                BooleanOpKind::Union => BooleanOp::Union,
                BooleanOpKind::Subtract => BooleanOp::Subtract,
                BooleanOpKind::Intersect => BooleanOp::Intersect,
            };
            let target_body = body_map[target].body;
            let tool_body = body_map[tool].body;

            match evaluate(&mut session.model, target_body, tool_body, op, &ctx) {
                Ok(out) => {
                    result.warnings.extend(
                        out.warnings
                            .iter()
                            .map(|w| format!("{feature_id}: {w}")),
                    );
                    let tool_entry = body_map.shift_remove(tool).expect("checked above");
                    let entry = body_map.get_mut(target).expect("checked above");
                    entry.history = merge_through_boolean(
                        &entry.history,
                        &tool_entry.history,
                        &out.face_records,
                    );
                    if out.body != entry.body {
                        session.model.topology.delete_body(entry.body);
                        entry.body = out.body;
                    }
                    if tool_entry.body != out.body {
                        session.model.topology.delete_body(tool_entry.body);
                    }
                    Ok(())
                }
                Err(BooleanError::EmptyResult) => {
                    // Cut-to-empty: both entries leave the map.
                    if let Some(tool_entry) = body_map.shift_remove(tool) {
                        session.model.topology.delete_body(tool_entry.body);
                    }
                    if let Some(target_entry) = body_map.shift_remove(target) {
                        session.model.topology.delete_body(target_entry.body);
                    }
                    Err(err(
                        feature_id,
                        ErrorCode::EmptyResult,
                        "boolean produced no material",
                    ))
                }
                Err(BooleanError::NonPlanarInput) => Err(err(
                    feature_id,
                    ErrorCode::NonPlanarInput,
                    "boolean operands must be planar-faced",
                )),
            }
        }
    }
}

/// Apply `op: add|cut` and the merge-scope policy to a freshly swept body.
#[allow(clippy::too_many_arguments)]
fn apply_body_policy(
    session: &mut SolidSession,
    feature_id: &str,
    op: BodyOp,
    merge_scope: MergeScope,
    target_bodies: Option<&[String]>,
    name: Option<String>,
    color: Option<String>,
    swept: SweepOutput,
    body_map: &mut IndexMap<String, BodyEntry>,
    result: &mut RebuildResult,
) -> Result<(), FeatureError> {
    let ctx = session.options.tolerances;

    match op {
        BodyOp::Cut => {
            // Subtract the cutter from every intersecting body, then
            // discard the cutter.
            let mut accepted = false;
            let keys: Vec<String> = body_map.keys().cloned().collect();
            for key in keys {
                let entry_body = body_map[&key].body;
                match evaluate(
                    &mut session.model,
                    entry_body,
                    swept.body,
                    BooleanOp::Subtract,
                    &ctx,
                ) {
                    Ok(out) if out.body != entry_body => {
                        result.warnings.extend(
                            out.warnings
                                .iter()
                                .map(|w| format!("{feature_id}: {w}")),
                        );
                        let entry = body_map.get_mut(&key).expect("key from map");
                        entry.history = merge_through_boolean(
                            &entry.history,
                            &swept.history,
                            &out.face_records,
                        );
                        session.model.topology.delete_body(entry.body);
                        entry.body = out.body;
                        accepted = true;
                    }
                    Ok(_) => {} // disjoint: unchanged, keep looking
                    Err(BooleanError::EmptyResult) => {
                        // The cut consumed the whole body.
                        if let Some(entry) = body_map.shift_remove(&key) {
                            session.model.topology.delete_body(entry.body);
                        }
                        accepted = true;
                    }
                    Err(BooleanError::NonPlanarInput) => {
                        // Not cuttable by this evaluator; skip it.
                        result.warnings.push(format!(
                            "{feature_id}: skipped non-planar body {key} during cut"
                        ));
                    }
                }
            }
            session.model.topology.delete_body(swept.body);
            if !accepted {
                return Err(err(
                    feature_id,
                    ErrorCode::CutFailed,
                    "cut removed no material from any body",
                ));
            }
            Ok(())
        }
        BodyOp::Add => {
            if body_map.is_empty() || merge_scope == MergeScope::New {
                body_map.insert(
                    feature_id.to_string(),
                    BodyEntry {
                        body: swept.body,
                        name,
                        color,
                        source_feature_id: feature_id.to_string(),
                        history: swept.history,
                    },
                );
                return Ok(());
            }
            match merge_scope {
                MergeScope::New => unreachable!("handled above"),
                MergeScope::Auto => {
                    let keys: Vec<String> = body_map.keys().cloned().collect();
                    for key in keys {
                        let entry_body = body_map[&key].body;
                        match evaluate(
                            &mut session.model,
                            entry_body,
                            swept.body,
                            BooleanOp::Union,
                            &ctx,
                        ) {
                            Ok(out) if out.body != entry_body => {
                                // First body that accepts; entry identity,
                                // name, and color are preserved.
                                let entry = body_map.get_mut(&key).expect("key from map");
                                entry.history = merge_through_boolean(
                                    &entry.history,
                                    &swept.history,
                                    &out.face_records,
                                );
                                session.model.topology.delete_body(entry.body);
                                session.model.topology.delete_body(swept.body);
                                entry.body = out.body;
                                return Ok(());
                            }
                            Ok(_) => {}
                            Err(_) => {}
                        }
                    }
                    // Nothing accepted the merge; keep it as a new body.
                    body_map.insert(
                        feature_id.to_string(),
                        BodyEntry {
                            body: swept.body,
                            name,
                            color,
                            source_feature_id: feature_id.to_string(),
                            history: swept.history,
                        },
                    );
                    Ok(())
                }
                MergeScope::Specific => {
                    let targets = target_bodies.unwrap_or_default();
                    if targets.is_empty() {
                        return Err(err(
                            feature_id,
                            ErrorCode::BooleanFailed,
                            "specific merge scope without target bodies",
                        ));
                    }
                    // The first target absorbs the tool; later targets are
                    // folded into the first target's entry.
                    let first = targets[0].clone();
                    if !body_map.contains_key(&first) {
                        return Err(err(
                            feature_id,
                            ErrorCode::BooleanFailed,
                            format!("merge target {first} not found"),
                        ));
                    }
                    union_into(session, feature_id, &first, swept.body, &swept.history, body_map, result)?;
                    for t in &targets[1..] {
                        let absorbed = match body_map.shift_remove(t) {
                            Some(e) => e,
                            None => {
                                return Err(err(
                                    feature_id,
                                    ErrorCode::BooleanFailed,
                                    format!("merge target {t} not found"),
                                ))
                            }
                        };
                        union_into(
                            session,
                            feature_id,
                            &first,
                            absorbed.body,
                            &absorbed.history,
                            body_map,
                            result,
                        )?;
                    }
                    Ok(())
                }
            }
        }
    }
}

/// Union a tool body into a named entry, merging histories.
fn union_into(
    session: &mut SolidSession,
    feature_id: &str,
    entry_key: &str,
    tool_body: forma_kernel_topo::BodyId,
    tool_history: &OperationHistory,
    body_map: &mut IndexMap<String, BodyEntry>,
    result: &mut RebuildResult,
) -> Result<(), FeatureError> {
    let ctx = session.options.tolerances;
    let entry_body = body_map[entry_key].body;
    match evaluate(
        &mut session.model,
        entry_body,
        tool_body,
        BooleanOp::Union,
        &ctx,
    ) {
        Ok(out) => {
            result
                .warnings
                .extend(out.warnings.iter().map(|w| format!("{feature_id}: {w}")));
            let entry = body_map.get_mut(entry_key).expect("caller checked");
            entry.history =
                merge_through_boolean(&entry.history, tool_history, &out.face_records);
            if out.body != entry.body {
                session.model.topology.delete_body(entry.body);
                entry.body = out.body;
            }
            if tool_body != out.body {
                session.model.topology.delete_body(tool_body);
            }
            Ok(())
        }
        Err(e) => Err(err(
            feature_id,
            ErrorCode::BooleanFailed,
            format!("union into {entry_key} failed: {e}"),
        )),
    }
}

fn sketch_error(feature_id: &str, e: forma_kernel_sketch::SketchError) -> FeatureError {
    use forma_kernel_sketch::SketchError as SE;
    let code = match &e {
        SE::OpenProfile => ErrorCode::OpenProfile,
        SE::AxisMissing(_) => ErrorCode::AxisMissing,
        SE::AxisNotALine(_) => ErrorCode::AxisNotALine,
        SE::ZeroSweep | SE::ZeroExtrusion => ErrorCode::ZeroSweep,
        _ => ErrorCode::BuildError,
    };
    err(feature_id, code, e.to_string())
}

/// Resolve the sketch's plane reference into a concrete plane.
fn resolve_sketch_plane(
    session: &SolidSession,
    feature_id: &str,
    plane_ref: &SketchPlaneRef,
    features_by_id: &BTreeMap<String, Feature>,
    body_map: &IndexMap<String, BodyEntry>,
) -> Result<Plane, FeatureError> {
    match plane_ref {
        SketchPlaneRef::DatumRole { role } => Ok(datum_plane(*role)),
        SketchPlaneRef::PlaneFeatureId { target } => {
            let feature = features_by_id.get(target).ok_or_else(|| {
                err(
                    feature_id,
                    ErrorCode::BuildError,
                    format!("plane feature {target} not found"),
                )
            })?;
            match &feature.op {
                FeatureOp::Plane {
                    role: Some(role), ..
                } => Ok(datum_plane(*role)),
                FeatureOp::Plane {
                    normal,
                    origin,
                    x_dir,
                    ..
                } => {
                    let n = normal
                        .map(|v| Vec3::new(v.x, v.y, v.z))
                        .unwrap_or_else(Vec3::z);
                    let o = origin
                        .map(|v| Point3::new(v.x, v.y, v.z))
                        .unwrap_or_else(Point3::origin);
                    let x = x_dir
                        .map(|v| Vec3::new(v.x, v.y, v.z))
                        .unwrap_or_else(|| arbitrary_x(&n));
                    Ok(Plane::new(o, n, x))
                }
                _ => Err(err(
                    feature_id,
                    ErrorCode::BuildError,
                    format!("feature {target} is not a plane"),
                )),
            }
        }
        SketchPlaneRef::FaceRef { target } => {
            // Format: face:<featureId>:<faceIndex>
            let mut parts = target.splitn(3, ':');
            let (tag, owner, index) = (parts.next(), parts.next(), parts.next());
            if tag != Some("face") {
                return Err(err(
                    feature_id,
                    ErrorCode::BuildError,
                    format!("malformed face reference: {target}"),
                ));
            }
            let owner = owner.unwrap_or_default();
            let index: usize = index
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| {
                    err(
                        feature_id,
                        ErrorCode::BuildError,
                        format!("malformed face reference: {target}"),
                    )
                })?;
            let entry = body_map.get(owner).ok_or_else(|| {
                err(
                    feature_id,
                    ErrorCode::SketchNotFound,
                    format!("face reference owner {owner} has no body"),
                )
            })?;
            let faces = session.model.topology.body_faces(entry.body);
            let face = faces.get(index).copied().ok_or_else(|| {
                err(
                    feature_id,
                    ErrorCode::BuildError,
                    format!("face index {index} out of range for body {owner}"),
                )
            })?;
            let plane = session.model.face_plane(face).ok_or_else(|| {
                err(
                    feature_id,
                    ErrorCode::BuildError,
                    "sketch plane face is not planar",
                )
            })?;
            let outward = session
                .model
                .face_normal(face)
                .unwrap_or_else(|| *plane.normal.as_ref());
            Ok(Plane::new(plane.origin, outward, *plane.x_dir.as_ref()))
        }
    }
}

fn datum_plane(role: DatumRole) -> Plane {
    match role {
        DatumRole::Xy => Plane::xy(),
        DatumRole::Xz => Plane::xz(),
        DatumRole::Yz => Plane::yz(),
    }
}

fn arbitrary_x(normal: &Vec3) -> Vec3 {
    let n = normal.normalize();
    let pick = if n.x.abs() < 0.9 { Vec3::x() } else { Vec3::y() };
    pick.cross(&n)
}

/// Resolve an extent into a concrete sweep distance.
fn extent_distance(
    feature_id: &str,
    extent: &ExtrudeExtent,
    distance: f64,
    profile: &Profile,
    direction: SweepDirection,
) -> Result<f64, FeatureError> {
    match extent {
        ExtrudeExtent::Blind => Ok(distance),
        ExtrudeExtent::ThroughAll => Ok(THROUGH_ALL_DISTANCE),
        ExtrudeExtent::ToFace { target } | ExtrudeExtent::ToVertex { target } => {
            let record = PersistentRef::decode(target).map_err(|e| {
                err(
                    feature_id,
                    ErrorCode::BuildError,
                    format!("extent reference invalid: {e}"),
                )
            })?;
            let fp = record.fingerprint.ok_or_else(|| {
                err(
                    feature_id,
                    ErrorCode::BuildError,
                    "extent reference carries no fingerprint",
                )
            })?;
            let centroid = Point3::new(fp.centroid[0], fp.centroid[1], fp.centroid[2]);
            let sign = match direction {
                SweepDirection::Normal => 1.0,
                SweepDirection::Reversed => -1.0,
            };
            let n = sign * *profile.plane.normal.as_ref();
            let d = (centroid - profile.plane.origin).dot(&n);
            if d.abs() < 1e-9 {
                return Err(err(
                    feature_id,
                    ErrorCode::ZeroSweep,
                    "extent target lies on the sketch plane",
                ));
            }
            Ok(d.abs())
        }
    }
}

/// Resolve a revolve axis from a sketch entity id. The axis may be a
/// profile edge (construction edge on the axis) or a free line.
fn resolve_axis(
    feature_id: &str,
    axis_entity: &str,
    data: &SketchData,
    solved_points: &BTreeMap<String, SketchPoint>,
    plane: &Plane,
) -> Result<RevolveAxis, FeatureError> {
    let entity = data.entities_by_id.get(axis_entity).ok_or_else(|| {
        err(
            feature_id,
            ErrorCode::AxisMissing,
            format!("axis entity {axis_entity} not in sketch"),
        )
    })?;
    let (p1, p2) = match entity {
        SketchEntity::Line { p1, p2 } => (p1, p2),
        _ => {
            return Err(err(
                feature_id,
                ErrorCode::AxisNotALine,
                format!("axis entity {axis_entity} is not a line"),
            ))
        }
    };
    let pos = |id: &str| -> Result<forma_kernel_math::Point2, FeatureError> {
        let p = solved_points
            .get(id)
            .or_else(|| data.points_by_id.get(id))
            .ok_or_else(|| {
                err(
                    feature_id,
                    ErrorCode::AxisMissing,
                    format!("axis point {id} missing"),
                )
            })?;
        Ok(forma_kernel_math::Point2::new(p.x, p.y))
    };
    let origin = plane.evaluate(pos(p1)?);
    let dir = plane.evaluate(pos(p2)?) - origin;
    if dir.norm() < 1e-12 {
        return Err(err(
            feature_id,
            ErrorCode::AxisNotALine,
            "axis line is degenerate",
        ));
    }
    Ok(RevolveAxis {
        origin,
        direction: Dir3::new_normalize(dir),
    })
}
