//! Mesh vertex format.
//!
//! The geometry pass consumes one interleaved stream at binding 0:
//!
//! | Location | Field | Format | Offset |
//! |---|---|---|---|
//! | 0 | `pos` | `R32G32B32_SFLOAT` | 0 |
//! | 1 | `col` | `R32G32B32_SFLOAT` | 12 |
//! | 2 | `tex` | `R32G32_SFLOAT` | 24 |
//!
//! The composition pass draws a full-screen triangle generated in the
//! vertex shader and has no vertex input at all.

use std::mem::{offset_of, size_of};

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};

/// A vertex type with a fixed buffer layout at binding 0.
pub trait VertexLayout: Pod {
    /// `(location, format, byte offset)` per attribute.
    const ATTRIBUTES: &'static [(u32, vk::Format, usize)];

    fn binding() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    fn attributes() -> Vec<vk::VertexInputAttributeDescription> {
        Self::ATTRIBUTES
            .iter()
            .map(|&(location, format, offset)| vk::VertexInputAttributeDescription {
                binding: 0,
                location,
                format,
                offset: offset as u32,
            })
            .collect()
    }
}

/// Mesh vertex. 32 bytes, no padding.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub pos: Vec3,
    pub col: Vec3,
    /// V already flipped for Vulkan's top-left origin.
    pub tex: Vec2,
}

impl Vertex {
    #[inline]
    pub const fn new(pos: Vec3, col: Vec3, tex: Vec2) -> Self {
        Self { pos, col, tex }
    }
}

impl VertexLayout for Vertex {
    const ATTRIBUTES: &'static [(u32, vk::Format, usize)] = &[
        (0, vk::Format::R32G32B32_SFLOAT, offset_of!(Vertex, pos)),
        (1, vk::Format::R32G32B32_SFLOAT, offset_of!(Vertex, col)),
        (2, vk::Format::R32G32_SFLOAT, offset_of!(Vertex, tex)),
    ];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_is_32_bytes() {
        assert_eq!(size_of::<Vertex>(), 32);
        assert_eq!(Vertex::binding().stride, 32);
        assert_eq!(Vertex::binding().input_rate, vk::VertexInputRate::VERTEX);
    }

    #[test]
    fn test_attribute_layout() {
        let attrs = Vertex::attributes();

        let layout: Vec<_> = attrs.iter().map(|a| (a.location, a.offset)).collect();
        assert_eq!(layout, vec![(0, 0), (1, 12), (2, 24)]);
        assert_eq!(attrs[2].format, vk::Format::R32G32_SFLOAT);
        assert!(attrs.iter().all(|a| a.binding == 0));
    }

    #[test]
    fn test_vertex_bytes_are_tightly_packed() {
        let vertex = Vertex::new(
            Vec3::new(1.0, 2.0, 3.0),
            Vec3::splat(0.5),
            Vec2::new(0.25, 0.75),
        );

        let floats: &[f32] = bytemuck::cast_slice(bytemuck::bytes_of(&vertex));
        assert_eq!(floats, &[1.0, 2.0, 3.0, 0.5, 0.5, 0.5, 0.25, 0.75]);
    }
}
