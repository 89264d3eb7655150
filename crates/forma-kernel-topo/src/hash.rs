//! Topology hashes: deterministic fingerprints of faces and edges.
//!
//! A face hash is FNV-1a over the face's oriented boundary positions,
//! snapped to the length tolerance and canonically rotated so the hash is
//! invariant to which half-edge a loop happens to start at. Two faces with
//! the same boundary but opposite traversal direction hash differently,
//! which keeps coincident caps of adjacent bodies apart.
//!
//! These hashes key the operation-history maps that carry face identity
//! through booleans, so they must be bit-stable across rebuilds.

use forma_kernel_math::{NumericContext, Point3};

use crate::{EdgeId, FaceId, Topology};

const FNV_OFFSET: u32 = 0x811c9dc5;
const FNV_PRIME: u32 = 0x01000193;

/// FNV-1a over a byte slice.
pub fn fnv1a(bytes: &[u8]) -> u32 {
    let mut h = FNV_OFFSET;
    for &b in bytes {
        h ^= b as u32;
        h = h.wrapping_mul(FNV_PRIME);
    }
    h
}

/// 64-bit FNV-1a, used where 32 bits would collide too readily (loop ids).
pub fn fnv1a64(bytes: &[u8]) -> u64 {
    let mut h: u64 = 0xcbf29ce484222325;
    for &b in bytes {
        h ^= b as u64;
        h = h.wrapping_mul(0x100000001b3);
    }
    h
}

fn snap_key(p: &Point3, ctx: &NumericContext) -> [i64; 3] {
    [
        ctx.bucket(p.x, 1.0),
        ctx.bucket(p.y, 1.0),
        ctx.bucket(p.z, 1.0),
    ]
}

fn feed(h: &mut u32, key: &[i64; 3]) {
    for c in key {
        for b in c.to_le_bytes() {
            *h ^= b as u32;
            *h = h.wrapping_mul(FNV_PRIME);
        }
    }
}

/// Hash an oriented cycle of snapped positions, rotated so the
/// lexicographically smallest key comes first.
fn cycle_hash(keys: &[[i64; 3]]) -> u32 {
    if keys.is_empty() {
        return FNV_OFFSET;
    }
    let start = keys
        .iter()
        .enumerate()
        .min_by_key(|(_, k)| *k)
        .map(|(i, _)| i)
        .unwrap_or(0);
    let mut h = FNV_OFFSET;
    for i in 0..keys.len() {
        feed(&mut h, &keys[(start + i) % keys.len()]);
    }
    h
}

/// Topology hash of a face: its oriented outer boundary plus the hashes of
/// its hole loops (sorted, so hole order does not matter).
pub fn face_topology_hash(topo: &Topology, face: FaceId, ctx: &NumericContext) -> u32 {
    let outer_keys: Vec<[i64; 3]> = topo
        .loop_points(topo.face_outer_loop(face))
        .iter()
        .map(|p| snap_key(p, ctx))
        .collect();
    let mut h = cycle_hash(&outer_keys);

    let mut hole_hashes: Vec<u32> = topo
        .face_inner_loops(face)
        .iter()
        .map(|&l| {
            let keys: Vec<[i64; 3]> = topo
                .loop_points(l)
                .iter()
                .map(|p| snap_key(p, ctx))
                .collect();
            cycle_hash(&keys)
        })
        .collect();
    hole_hashes.sort_unstable();
    for hh in hole_hashes {
        for b in hh.to_le_bytes() {
            h ^= b as u32;
            h = h.wrapping_mul(FNV_PRIME);
        }
    }
    h
}

/// Topology hash of an edge: its two snapped endpoints, order-independent.
pub fn edge_topology_hash(topo: &Topology, edge: EdgeId, ctx: &NumericContext) -> u32 {
    let (a, b) = topo.edge_endpoints(edge);
    let mut ka = snap_key(&a, ctx);
    let mut kb = snap_key(&b, ctx);
    if kb < ka {
        std::mem::swap(&mut ka, &mut kb);
    }
    let mut h = FNV_OFFSET;
    feed(&mut h, &ka);
    feed(&mut h, &kb);
    h
}
