//! Geometric fingerprints computed from tessellation output.

use forma_kernel_math::{Point3, Vec3};
use forma_kernel_tessellate::SurfaceMesh;

/// Per-face fingerprint: area-weighted centroid, total area, average normal.
#[derive(Debug, Clone)]
pub struct FaceFingerprint {
    /// Area-weighted centroid.
    pub centroid: Point3,
    /// Total triangle area.
    pub area: f64,
    /// Length-normalized area-weighted normal.
    pub normal: Vec3,
}

/// Per-edge fingerprint: length-weighted midpoint and total length.
#[derive(Debug, Clone)]
pub struct EdgeFingerprint {
    /// Length-weighted midpoint.
    pub midpoint: Point3,
    /// Total polyline length.
    pub length: f64,
}

fn tri_point(mesh: &SurfaceMesh, idx: u32) -> Vec3 {
    let i = idx as usize * 3;
    Vec3::new(
        mesh.positions[i] as f64,
        mesh.positions[i + 1] as f64,
        mesh.positions[i + 2] as f64,
    )
}

/// Compute one fingerprint per face index of the mesh.
pub fn face_fingerprints(mesh: &SurfaceMesh) -> Vec<FaceFingerprint> {
    let face_count = mesh.face_hashes.len();
    let mut centroid = vec![Vec3::zeros(); face_count];
    let mut area = vec![0.0f64; face_count];
    let mut normal = vec![Vec3::zeros(); face_count];

    for (tri, &face) in mesh.face_map.iter().enumerate() {
        let i = tri * 3;
        let v0 = tri_point(mesh, mesh.indices[i]);
        let v1 = tri_point(mesh, mesh.indices[i + 1]);
        let v2 = tri_point(mesh, mesh.indices[i + 2]);
        let cross = (v1 - v0).cross(&(v2 - v0));
        let tri_area = cross.norm() / 2.0;
        let f = face as usize;
        if f >= face_count {
            continue;
        }
        area[f] += tri_area;
        centroid[f] += tri_area * (v0 + v1 + v2) / 3.0;
        normal[f] += cross / 2.0;
    }

    (0..face_count)
        .map(|f| {
            let c = if area[f] > 0.0 {
                centroid[f] / area[f]
            } else {
                Vec3::zeros()
            };
            let n = if normal[f].norm() > 1e-12 {
                normal[f].normalize()
            } else {
                Vec3::zeros()
            };
            FaceFingerprint {
                centroid: Point3::from(c),
                area: area[f],
                normal: n,
            }
        })
        .collect()
}

/// Compute one fingerprint per edge index of the mesh.
pub fn edge_fingerprints(mesh: &SurfaceMesh) -> Vec<EdgeFingerprint> {
    let edge_count = mesh.edge_hashes.len();
    let mut midpoint = vec![Vec3::zeros(); edge_count];
    let mut length = vec![0.0f64; edge_count];

    for (seg, &edge) in mesh.edge_map.iter().enumerate() {
        let i = seg * 6;
        let a = Vec3::new(
            mesh.edges[i] as f64,
            mesh.edges[i + 1] as f64,
            mesh.edges[i + 2] as f64,
        );
        let b = Vec3::new(
            mesh.edges[i + 3] as f64,
            mesh.edges[i + 4] as f64,
            mesh.edges[i + 5] as f64,
        );
        let len = (b - a).norm();
        let e = edge as usize;
        if e >= edge_count {
            continue;
        }
        length[e] += len;
        midpoint[e] += len * (a + b) / 2.0;
    }

    (0..edge_count)
        .map(|e| {
            let m = if length[e] > 0.0 {
                midpoint[e] / length[e]
            } else {
                Vec3::zeros()
            };
            EdgeFingerprint {
                midpoint: Point3::from(m),
                length: length[e],
            }
        })
        .collect()
}
