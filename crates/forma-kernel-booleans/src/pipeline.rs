//! The boolean pipeline driver: gates, imprint, classify, select, clamp,
//! stitch, and provenance records.

use std::collections::{HashMap, HashSet};

use rayon::prelude::*;
use tracing::{debug, warn};

use forma_kernel_geom::SolidModel;
use forma_kernel_math::{NumericContext, Point2};
use forma_kernel_naming::BooleanFaceRecord;
use forma_kernel_topo::{hash, BodyId};

use crate::api::{BooleanError, BooleanOp, BooleanOutput};
use crate::bbox::{body_aabb, Aabb3};
use crate::classify::{classify_piece, PieceClass};
use crate::imprint::{imprint_face, ring_centroid, Piece};
use crate::sew::{stitch, StitchInput};
use crate::ssi::{face_polygons, intersect_faces, signed_area, FacePoly, Seg2};

/// A piece that survived selection, still tied to its source face.
struct Selected {
    fp_index: usize,
    from_tool: bool,
    piece: Piece,
    flip: bool,
}

/// Evaluate `a op b`. Operands must be planar-faced bodies in the arena.
pub(crate) fn evaluate_boolean(
    model: &mut SolidModel,
    a: BodyId,
    b: BodyId,
    op: BooleanOp,
    ctx: &NumericContext,
) -> Result<BooleanOutput, BooleanError> {
    // Degenerate shortcut: a body against itself.
    if a == b {
        return match op {
            BooleanOp::Union | BooleanOp::Intersect => Ok(BooleanOutput {
                body: a,
                warnings: Vec::new(),
                face_records: identity_records(model, a, false, ctx),
            }),
            BooleanOp::Subtract => Err(BooleanError::EmptyResult),
        };
    }

    if !model.body_is_planar(a) || !model.body_is_planar(b) {
        return Err(BooleanError::NonPlanarInput);
    }

    // AABB gate: disjoint operands short-circuit.
    let box_a = body_aabb(&model.topology, a);
    let box_b = body_aabb(&model.topology, b);
    if !box_a.overlaps(&box_b, ctx.length) {
        return match op {
            BooleanOp::Union => Ok(BooleanOutput {
                body: a,
                warnings: vec![
                    "disjoint operands: union keeps the target body only".to_string()
                ],
                face_records: identity_records(model, a, false, ctx),
            }),
            BooleanOp::Subtract => Ok(BooleanOutput {
                body: a,
                warnings: Vec::new(),
                face_records: identity_records(model, a, false, ctx),
            }),
            BooleanOp::Intersect => Err(BooleanError::EmptyResult),
        };
    }

    let polys_a = face_polygons(model, a, ctx)?;
    let polys_b = face_polygons(model, b, ctx)?;
    debug!(
        faces_a = polys_a.len(),
        faces_b = polys_b.len(),
        ?op,
        "boolean pipeline start"
    );

    // Segment accumulation: read-only sweep over candidate face pairs.
    let segs_a = accumulate_segments(&polys_a, &polys_b, ctx);
    let segs_b = accumulate_segments(&polys_b, &polys_a, ctx);

    // Imprint each face against its accumulated segments.
    let mut warnings = Vec::new();
    let imprints_a: Vec<_> = polys_a
        .par_iter()
        .zip(&segs_a)
        .map(|(fp, segs)| imprint_face(fp, segs, ctx))
        .collect();
    let imprints_b: Vec<_> = polys_b
        .par_iter()
        .zip(&segs_b)
        .map(|(fp, segs)| imprint_face(fp, segs, ctx))
        .collect();
    for (i, imp) in imprints_a.iter().enumerate() {
        if imp.fallback {
            warn!(face = i, body = "target", "imprint fell back to whole face");
            warnings.push(format!("IMPRINT_FAILED: target face {i} kept whole"));
        }
    }
    for (i, imp) in imprints_b.iter().enumerate() {
        if imp.fallback {
            warn!(face = i, body = "tool", "imprint fell back to whole face");
            warnings.push(format!("IMPRINT_FAILED: tool face {i} kept whole"));
        }
    }

    // Classify every piece against the opposite body.
    let classified_a: Vec<(usize, Piece, PieceClass)> = imprints_a
        .par_iter()
        .enumerate()
        .flat_map_iter(|(i, imp)| {
            let pa = &polys_a[i];
            let pb_all = &polys_b;
            imp.pieces.iter().map(move |p| {
                let class = classify_piece(p, pa, pb_all, ctx);
                (i, p.clone(), class)
            })
        })
        .collect();
    let classified_b: Vec<(usize, Piece, PieceClass)> = imprints_b
        .par_iter()
        .enumerate()
        .flat_map_iter(|(i, imp)| {
            let pb = &polys_b[i];
            let pa_all = &polys_a;
            imp.pieces.iter().map(move |p| {
                let class = classify_piece(p, pb, pa_all, ctx);
                (i, p.clone(), class)
            })
        })
        .collect();

    // Select pieces per the operation's rule. Coplanar regions are kept
    // once, always from the target side: the target contributes `on_same`
    // for union/intersect and `on_opposite` for subtract (A ∩ ¬B flips the
    // tool's orientation, so "same as the complement" is "opposite to B"),
    // while coplanar tool pieces always drop.
    let mut selected: Vec<Selected> = Vec::new();
    match op {
        BooleanOp::Union => {
            for (i, piece, class) in classified_a {
                if matches!(class, PieceClass::Outside | PieceClass::OnSame) {
                    selected.push(Selected {
                        fp_index: i,
                        from_tool: false,
                        piece,
                        flip: false,
                    });
                }
            }
            for (i, piece, class) in classified_b {
                if class == PieceClass::Outside {
                    selected.push(Selected {
                        fp_index: i,
                        from_tool: true,
                        piece,
                        flip: false,
                    });
                }
            }
        }
        BooleanOp::Intersect => {
            for (i, piece, class) in classified_a {
                if matches!(class, PieceClass::Inside | PieceClass::OnSame) {
                    selected.push(Selected {
                        fp_index: i,
                        from_tool: false,
                        piece,
                        flip: false,
                    });
                }
            }
            for (i, piece, class) in classified_b {
                if class == PieceClass::Inside {
                    selected.push(Selected {
                        fp_index: i,
                        from_tool: true,
                        piece,
                        flip: false,
                    });
                }
            }
        }
        BooleanOp::Subtract => {
            for (i, mut piece, class) in classified_a {
                if matches!(class, PieceClass::Outside | PieceClass::OnOpposite) {
                    // Cap-like target faces keep their holes; side faces
                    // shed them.
                    let nz = polys_a[i].outward.z.abs();
                    let dominant_z =
                        nz >= polys_a[i].outward.x.abs() && nz >= polys_a[i].outward.y.abs();
                    if !dominant_z {
                        piece.holes.clear();
                    }
                    selected.push(Selected {
                        fp_index: i,
                        from_tool: false,
                        piece,
                        flip: false,
                    });
                }
            }
            for (i, mut piece, class) in classified_b {
                if class == PieceClass::Inside {
                    piece.holes.clear();
                    selected.push(Selected {
                        fp_index: i,
                        from_tool: true,
                        piece,
                        flip: true,
                    });
                }
            }
        }
    }

    // Exact-geometry dedup across bodies (belt and braces: the keep rules
    // already assign coplanar regions to one side).
    geometry_dedup(&mut selected, &polys_a, &polys_b, ctx);

    // Bounds clamping for material-removing operations.
    let clamp_bounds = match op {
        BooleanOp::Subtract => Some(box_a),
        BooleanOp::Intersect => Some(box_a.intersection(&box_b)),
        BooleanOp::Union => None,
    };
    if let Some(bounds) = clamp_bounds {
        let mut clamped = Vec::with_capacity(selected.len());
        for mut sel in selected {
            let fp = poly_of(&polys_a, &polys_b, sel.from_tool, sel.fp_index);
            match clamp_piece(&sel.piece, fp, &bounds, ctx) {
                Some(piece) => {
                    sel.piece = piece;
                    clamped.push(sel);
                }
                None => {}
            }
        }
        selected = clamped;
    }

    // Regularize: drop dust.
    selected.retain(|s| s.piece.area.abs() > 1e-10);

    if selected.is_empty() {
        return Err(BooleanError::EmptyResult);
    }
    debug!(pieces = selected.len(), "stitching selected pieces");

    // Stitch into a fresh body.
    let inputs: Vec<StitchInput> = selected
        .iter()
        .map(|s| {
            let fp = poly_of(&polys_a, &polys_b, s.from_tool, s.fp_index);
            StitchInput {
                origin: fp.origin,
                fx: fp.fx,
                fy: fp.fy,
                outer: s.piece.outer.clone(),
                holes: s.piece.holes.clone(),
                flip: s.flip,
                source_hash: fp.hash,
                from_tool: s.from_tool,
            }
        })
        .collect();
    let stitched = stitch(model, &inputs, ctx);
    warnings.extend(stitched.warnings);

    // Provenance records: group outputs by source face, then mark inputs
    // that produced nothing as deleted.
    let mut outputs: HashMap<(u32, bool), Vec<u32>> = HashMap::new();
    for (face, source_hash, from_tool) in &stitched.new_faces {
        let out_hash = hash::face_topology_hash(&model.topology, *face, ctx);
        outputs
            .entry((*source_hash, *from_tool))
            .or_default()
            .push(out_hash);
    }
    let mut face_records = Vec::new();
    for (fp, from_tool) in polys_a
        .iter()
        .map(|f| (f, false))
        .chain(polys_b.iter().map(|f| (f, true)))
    {
        match outputs.remove(&(fp.hash, from_tool)) {
            Some(hashes) => face_records.push(BooleanFaceRecord {
                input_hash: fp.hash,
                from_tool,
                output_hashes: hashes,
                deleted: false,
            }),
            None => face_records.push(BooleanFaceRecord {
                input_hash: fp.hash,
                from_tool,
                output_hashes: Vec::new(),
                deleted: true,
            }),
        }
    }

    Ok(BooleanOutput {
        body: stitched.body,
        warnings,
        face_records,
    })
}

fn poly_of<'a>(
    polys_a: &'a [FacePoly],
    polys_b: &'a [FacePoly],
    from_tool: bool,
    index: usize,
) -> &'a FacePoly {
    if from_tool {
        &polys_b[index]
    } else {
        &polys_a[index]
    }
}

/// Identity provenance for shortcut paths that return an operand untouched.
fn identity_records(
    model: &SolidModel,
    body: BodyId,
    from_tool: bool,
    ctx: &NumericContext,
) -> Vec<BooleanFaceRecord> {
    model
        .topology
        .body_faces(body)
        .iter()
        .map(|&f| {
            let h = hash::face_topology_hash(&model.topology, f, ctx);
            BooleanFaceRecord {
                input_hash: h,
                from_tool,
                output_hashes: vec![h],
                deleted: false,
            }
        })
        .collect()
}

fn accumulate_segments(
    own: &[FacePoly],
    other: &[FacePoly],
    ctx: &NumericContext,
) -> Vec<Vec<Seg2>> {
    own.par_iter()
        .map(|fp| {
            let mut segs = Vec::new();
            for of in other {
                if !fp.aabb.overlaps(&of.aabb, ctx.length) {
                    continue;
                }
                let (on_own, _) = intersect_faces(fp, of, ctx);
                segs.extend(on_own);
            }
            segs
        })
        .collect()
}

/// Drop exact duplicates across bodies: same plane, same outer vertices.
fn geometry_dedup(
    selected: &mut Vec<Selected>,
    polys_a: &[FacePoly],
    polys_b: &[FacePoly],
    ctx: &NumericContext,
) {
    let bucket = (1e3 * ctx.length).max(1e-6);
    let mut seen: HashSet<(i64, i64, i64, Vec<(i64, i64, i64)>)> = HashSet::new();
    selected.retain(|s| {
        let fp = poly_of(polys_a, polys_b, s.from_tool, s.fp_index);
        let outward = if s.flip { -fp.outward } else { fp.outward };
        let n = outward.normalize();
        let nk = (
            (n.x * 1e6).round() as i64,
            (n.y * 1e6).round() as i64,
            (n.z * 1e6).round() as i64,
        );
        let mut verts: Vec<(i64, i64, i64)> = s
            .piece
            .outer
            .iter()
            .map(|p| {
                let p3 = fp.to_3d(*p);
                (
                    (p3.x / bucket).round() as i64,
                    (p3.y / bucket).round() as i64,
                    (p3.z / bucket).round() as i64,
                )
            })
            .collect();
        verts.sort_unstable();
        verts.dedup();
        seen.insert((nk.0, nk.1, nk.2, verts))
    });
}

/// Clamp a piece's vertices to exact bounds (no tolerance inflation), drop
/// collapsed vertices, restore convex ordering around the centroid, and
/// discard the piece when its area falls under `tol²`.
fn clamp_piece(
    piece: &Piece,
    fp: &FacePoly,
    bounds: &Aabb3,
    ctx: &NumericContext,
) -> Option<Piece> {
    // Pieces already within bounds pass through untouched.
    let mut piece_box = Aabb3::empty();
    for p in &piece.outer {
        piece_box.include_point(&fp.to_3d(*p));
    }
    if bounds.excess(&piece_box) <= ctx.length {
        return Some(piece.clone());
    }

    let bucket = (1e3 * ctx.length).max(1e-6);
    let clamp_ring = |ring: &[Point2]| -> Vec<Point2> {
        let mut out: Vec<Point2> = Vec::with_capacity(ring.len());
        for p in ring {
            let mut p3 = fp.to_3d(*p);
            p3.x = p3.x.clamp(bounds.min.x, bounds.max.x);
            p3.y = p3.y.clamp(bounds.min.y, bounds.max.y);
            p3.z = p3.z.clamp(bounds.min.z, bounds.max.z);
            let q = fp.project(&p3);
            if let Some(last) = out.last() {
                if (q - last).norm() < bucket {
                    continue;
                }
            }
            out.push(q);
        }
        while out.len() > 1
            && (out[0] - out[out.len() - 1]).norm() < bucket
        {
            out.pop();
        }
        out
    };

    let mut outer = clamp_ring(&piece.outer);
    if outer.len() < 3 {
        return None;
    }
    // Clamping can fold the ring; re-sort by angle around the centroid to
    // restore a simple polygon.
    let (c, _) = ring_centroid(&outer, &[]);
    outer.sort_by(|p, q| {
        let ap = (p.y - c.y).atan2(p.x - c.x);
        let aq = (q.y - c.y).atan2(q.x - c.x);
        ap.partial_cmp(&aq).unwrap_or(std::cmp::Ordering::Equal)
    });
    if signed_area(&outer) < 0.0 {
        outer.reverse();
    }

    let holes: Vec<Vec<Point2>> = piece
        .holes
        .iter()
        .map(|h| clamp_ring(h))
        .filter(|h| h.len() >= 3)
        .collect();

    let (centroid, area) = ring_centroid(&outer, &holes);
    if area < ctx.length * ctx.length {
        return None;
    }
    Some(Piece {
        outer,
        holes,
        centroid,
        area,
    })
}
