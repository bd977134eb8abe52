//! Built-in demo geometry.

use glam::{Vec2, Vec3};

use gpuframe_rhi::Vertex;

/// Face normals paired with the direction that is "up" on that face.
const FACES: [(Vec3, Vec3); 6] = [
    (Vec3::X, Vec3::Y),
    (Vec3::NEG_X, Vec3::Y),
    (Vec3::Y, Vec3::NEG_Z),
    (Vec3::NEG_Y, Vec3::Z),
    (Vec3::Z, Vec3::Y),
    (Vec3::NEG_Z, Vec3::Y),
];

/// A cube of edge `size` centered at the origin, counter-clockwise seen from outside.
pub fn cube(size: f32) -> (Vec<Vertex>, Vec<u32>) {
    let half = size * 0.5;
    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);

    for (normal, up) in FACES {
        let right = up.cross(normal);
        let base = vertices.len() as u32;
        for (u, v) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
            let position = (normal + right * u + up * v) * half;
            let tex_coord = Vec2::new((u + 1.0) * 0.5, (1.0 - v) * 0.5);
            vertices.push(Vertex::new(position, normal, tex_coord));
        }
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    (vertices, indices)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cube_counts() {
        let (vertices, indices) = cube(1.0);
        assert_eq!(vertices.len(), 24);
        assert_eq!(indices.len(), 36);
        assert!(indices.iter().all(|&i| (i as usize) < vertices.len()));
    }

    #[test]
    fn test_triangles_face_outwards() {
        let (vertices, indices) = cube(2.0);
        for triangle in indices.chunks(3) {
            let [a, b, c] = [0, 1, 2].map(|k| vertices[triangle[k] as usize].position);
            let winding_normal = (b - a).cross(c - a).normalize();
            let face_normal = vertices[triangle[0] as usize].normal;
            assert!(winding_normal.dot(face_normal) > 0.99);
            assert!(a.abs().max_element() <= 1.0 + f32::EPSILON);
        }
    }
}
