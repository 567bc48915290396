//! Vertex format and input descriptions.
//!
//! [`Vertex`] is the in-memory contract between the model loader and the
//! vertex buffer: position, color, normal, and texture coordinate as 32-bit
//! floats, in that field order. The same layout is declared to the pipeline
//! through [`Vertex::binding_description`] and
//! [`Vertex::attribute_descriptions`].
//!
//! # Memory Layout
//!
//! `#[repr(C)]` fixes the layout:
//! - Offset 0: position (12 bytes)
//! - Offset 12: color (12 bytes)
//! - Offset 24: normal (12 bytes)
//! - Offset 36: uv (8 bytes)
//! - Total size: 44 bytes

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};

/// Mesh vertex with position, color, normal, and texture coordinate.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    /// Position in object space.
    pub position: Vec3,
    /// Vertex color.
    pub color: Vec3,
    /// Surface normal.
    pub normal: Vec3,
    /// Texture coordinate.
    pub uv: Vec2,
}

impl Vertex {
    /// Creates a new vertex.
    #[inline]
    pub const fn new(position: Vec3, color: Vec3, normal: Vec3, uv: Vec2) -> Self {
        Self {
            position,
            color,
            normal,
            uv,
        }
    }

    /// Size of one vertex in bytes.
    #[inline]
    pub const fn size() -> usize {
        std::mem::size_of::<Self>()
    }

    /// Content-addressed key covering every attribute, bit-exact.
    ///
    /// Two vertices map to the same key exactly when all their fields are
    /// bitwise equal; the model loader uses this to merge duplicates.
    pub fn dedup_key(&self) -> VertexKey {
        VertexKey([
            self.position.x.to_bits(),
            self.position.y.to_bits(),
            self.position.z.to_bits(),
            self.color.x.to_bits(),
            self.color.y.to_bits(),
            self.color.z.to_bits(),
            self.normal.x.to_bits(),
            self.normal.y.to_bits(),
            self.normal.z.to_bits(),
            self.uv.x.to_bits(),
            self.uv.y.to_bits(),
        ])
    }

    /// Vertex input binding for binding slot 0, per-vertex rate.
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: std::mem::size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    /// Attribute descriptions for shader locations 0..=3.
    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 4] {
        [
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: 0,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 1,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: 12,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 2,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: 24,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 3,
                format: vk::Format::R32G32_SFLOAT,
                offset: 36,
            },
        ]
    }
}

/// Hashable identity of a vertex's full attribute content.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VertexKey([u32; 11]);

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::offset_of;

    #[test]
    fn vertex_size() {
        // 3 x Vec3 (36) + Vec2 (8) = 44 bytes
        assert_eq!(std::mem::size_of::<Vertex>(), 44);
        assert_eq!(Vertex::size(), 44);
    }

    #[test]
    fn vertex_field_offsets() {
        assert_eq!(offset_of!(Vertex, position), 0);
        assert_eq!(offset_of!(Vertex, color), 12);
        assert_eq!(offset_of!(Vertex, normal), 24);
        assert_eq!(offset_of!(Vertex, uv), 36);
    }

    #[test]
    fn binding_description_matches_stride() {
        let binding = Vertex::binding_description();
        assert_eq!(binding.binding, 0);
        assert_eq!(binding.stride, 44);
        assert_eq!(binding.input_rate, vk::VertexInputRate::VERTEX);
    }

    #[test]
    fn attribute_descriptions_match_layout() {
        let attrs = Vertex::attribute_descriptions();
        assert_eq!(attrs.len(), 4);

        let expected = [
            (0u32, vk::Format::R32G32B32_SFLOAT, 0u32),
            (1, vk::Format::R32G32B32_SFLOAT, 12),
            (2, vk::Format::R32G32B32_SFLOAT, 24),
            (3, vk::Format::R32G32_SFLOAT, 36),
        ];
        for (attr, (location, format, offset)) in attrs.iter().zip(expected) {
            assert_eq!(attr.binding, 0);
            assert_eq!(attr.location, location);
            assert_eq!(attr.format, format);
            assert_eq!(attr.offset, offset);
        }
    }

    #[test]
    fn dedup_key_is_bit_exact() {
        let a = Vertex::new(
            Vec3::new(1.0, 2.0, 3.0),
            Vec3::ONE,
            Vec3::Y,
            Vec2::new(0.5, 0.5),
        );
        let same = a;
        let different_uv = Vertex { uv: Vec2::new(0.5, 0.25), ..a };
        let different_normal = Vertex { normal: Vec3::Z, ..a };

        assert_eq!(a.dedup_key(), same.dedup_key());
        assert_ne!(a.dedup_key(), different_uv.dedup_key());
        assert_ne!(a.dedup_key(), different_normal.dedup_key());
    }

    #[test]
    fn vertex_pod_roundtrip() {
        let vertex = Vertex::new(
            Vec3::new(1.0, 2.0, 3.0),
            Vec3::new(0.5, 0.6, 0.7),
            Vec3::Y,
            Vec2::new(0.25, 0.75),
        );

        let bytes: &[u8] = bytemuck::bytes_of(&vertex);
        assert_eq!(bytes.len(), 44);

        let back: &Vertex = bytemuck::from_bytes(bytes);
        assert_eq!(*back, vertex);
    }
}
