//! Vertex data structures and input descriptions.
//!
//! This module defines the vertex format consumed by the default pipeline.

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};

use crate::types::{InputLayout, VertexAttribute, VertexFormat};

/// Standard vertex format with position, normal and UV.
///
/// # Memory Layout
///
/// The struct uses `#[repr(C)]` to ensure predictable memory layout:
/// - Offset 0: position (12 bytes)
/// - Offset 12: normal (12 bytes)
/// - Offset 24: tex_coord (8 bytes)
/// - Total size: 32 bytes
///
/// # Shader Locations
///
/// - location 0: position (vec3)
/// - location 1: normal (vec3)
/// - location 2: tex_coord (vec2)
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    /// 3D position in object space.
    pub position: Vec3,
    /// Surface normal vector (should be normalized).
    pub normal: Vec3,
    /// Texture coordinates (UV).
    pub tex_coord: Vec2,
}

impl Vertex {
    #[inline]
    pub const fn new(position: Vec3, normal: Vec3, tex_coord: Vec2) -> Self {
        Self {
            position,
            normal,
            tex_coord,
        }
    }

    /// Returns the size of the vertex in bytes.
    #[inline]
    pub const fn size() -> usize {
        std::mem::size_of::<Self>()
    }

    /// Input layout for vertex buffer binding 0.
    pub fn input_layout() -> InputLayout {
        InputLayout {
            stride: Self::size() as u32,
            attributes: vec![
                VertexAttribute {
                    location: 0,
                    format: VertexFormat::Float32x3,
                    offset: 0,
                },
                VertexAttribute {
                    location: 1,
                    format: VertexFormat::Float32x3,
                    offset: 12,
                },
                VertexAttribute {
                    location: 2,
                    format: VertexFormat::Float32x2,
                    offset: 24,
                },
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_size() {
        // Vec3 + Vec3 + Vec2 = 12 + 12 + 8
        assert_eq!(Vertex::size(), 32);
        assert_eq!(std::mem::size_of::<Vertex>(), Vertex::size());
    }

    #[test]
    fn test_input_layout_matches_struct() {
        let layout = Vertex::input_layout();
        assert_eq!(layout.stride, 32);
        assert_eq!(layout.attributes.len(), 3);

        assert_eq!(layout.attributes[0].location, 0);
        assert_eq!(layout.attributes[0].offset, 0);
        assert_eq!(layout.attributes[1].offset, 12);
        assert_eq!(layout.attributes[2].format, VertexFormat::Float32x2);
        assert_eq!(layout.attributes[2].offset, 24);

        let end = layout
            .attributes
            .iter()
            .map(|a| a.offset + a.format.size())
            .max();
        assert_eq!(end, Some(layout.stride));
    }

    #[test]
    fn test_vertex_is_pod() {
        let vertex = Vertex::new(Vec3::new(1.0, 2.0, 3.0), Vec3::Y, Vec2::new(0.5, 0.25));
        let bytes: &[u8] = bytemuck::bytes_of(&vertex);
        assert_eq!(bytes.len(), 32);

        let back: Vertex = bytemuck::pod_read_unaligned(bytes);
        assert_eq!(back, vertex);
    }
}
