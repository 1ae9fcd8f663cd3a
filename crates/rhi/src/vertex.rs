//! Vertex input layouts and the built-in vertex formats.
//!
//! A [`VertexInputLayout`] is the binding and attribute table a graphics
//! pipeline reads vertex buffers through. Vertex structs describe
//! themselves by implementing [`VertexType`].

use std::mem::{offset_of, size_of};

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3, Vec4};

/// Vertex buffer bindings and the attributes read from them.
#[derive(Clone, Debug, Default)]
pub struct VertexInputLayout {
    bindings: Vec<vk::VertexInputBindingDescription>,
    attributes: Vec<vk::VertexInputAttributeDescription>,
}

impl VertexInputLayout {
    /// An empty layout, for pipelines that generate vertices in the shader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a buffer binding.
    pub fn with_binding(mut self, binding: u32, stride: u32, rate: vk::VertexInputRate) -> Self {
        self.bindings.push(vk::VertexInputBindingDescription {
            binding,
            stride,
            input_rate: rate,
        });
        self
    }

    /// Adds an attribute at `location`, read from `binding` at `offset`.
    ///
    /// # Panics
    ///
    /// Panics if `location` is already used.
    pub fn with_attribute(
        mut self,
        location: u32,
        binding: u32,
        format: vk::Format,
        offset: u32,
    ) -> Self {
        assert!(
            !self.attributes.iter().any(|a| a.location == location),
            "vertex attribute location {location} used twice"
        );
        self.attributes.push(vk::VertexInputAttributeDescription {
            location,
            binding,
            format,
            offset,
        });
        self
    }

    #[inline]
    pub fn bindings(&self) -> &[vk::VertexInputBindingDescription] {
        &self.bindings
    }

    #[inline]
    pub fn attributes(&self) -> &[vk::VertexInputAttributeDescription] {
        &self.attributes
    }

    /// Vertex input state borrowing this layout.
    pub fn create_info(&self) -> vk::PipelineVertexInputStateCreateInfo<'_> {
        vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&self.bindings)
            .vertex_attribute_descriptions(&self.attributes)
    }
}

/// A vertex struct that can describe its own input layout.
pub trait VertexType: Pod {
    fn input_layout() -> VertexInputLayout;
}

/// Position and colour, for debug geometry.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct ColourVertex {
    pub position: Vec3,
    pub colour: Vec3,
}

impl ColourVertex {
    #[inline]
    pub const fn new(position: Vec3, colour: Vec3) -> Self {
        Self { position, colour }
    }
}

impl VertexType for ColourVertex {
    fn input_layout() -> VertexInputLayout {
        VertexInputLayout::new()
            .with_binding(0, size_of::<Self>() as u32, vk::VertexInputRate::VERTEX)
            .with_attribute(
                0,
                0,
                vk::Format::R32G32B32_SFLOAT,
                offset_of!(Self, position) as u32,
            )
            .with_attribute(
                1,
                0,
                vk::Format::R32G32B32_SFLOAT,
                offset_of!(Self, colour) as u32,
            )
    }
}

/// Mesh vertex: position, normal, texture coordinate and tangent.
///
/// The tangent's `w` holds the bitangent sign.
///
/// | location | field     | format |
/// |----------|-----------|--------|
/// | 0        | position  | vec3   |
/// | 1        | normal    | vec3   |
/// | 2        | tex_coord | vec2   |
/// | 3        | tangent   | vec4   |
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct MeshVertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub tex_coord: Vec2,
    pub tangent: Vec4,
}

impl MeshVertex {
    #[inline]
    pub const fn new(position: Vec3, normal: Vec3, tex_coord: Vec2, tangent: Vec4) -> Self {
        Self {
            position,
            normal,
            tex_coord,
            tangent,
        }
    }
}

impl VertexType for MeshVertex {
    fn input_layout() -> VertexInputLayout {
        VertexInputLayout::new()
            .with_binding(0, size_of::<Self>() as u32, vk::VertexInputRate::VERTEX)
            .with_attribute(
                0,
                0,
                vk::Format::R32G32B32_SFLOAT,
                offset_of!(Self, position) as u32,
            )
            .with_attribute(
                1,
                0,
                vk::Format::R32G32B32_SFLOAT,
                offset_of!(Self, normal) as u32,
            )
            .with_attribute(
                2,
                0,
                vk::Format::R32G32_SFLOAT,
                offset_of!(Self, tex_coord) as u32,
            )
            .with_attribute(
                3,
                0,
                vk::Format::R32G32B32A32_SFLOAT,
                offset_of!(Self, tangent) as u32,
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_colour_vertex_layout() {
        let layout = ColourVertex::input_layout();
        assert_eq!(layout.bindings().len(), 1);
        assert_eq!(layout.bindings()[0].stride, 24);
        assert_eq!(layout.attributes()[1].offset, 12);
    }

    #[test]
    fn test_mesh_vertex_layout() {
        let layout = MeshVertex::input_layout();
        assert_eq!(size_of::<MeshVertex>(), 48);
        assert_eq!(layout.bindings()[0].stride, 48);

        let offsets: Vec<u32> = layout.attributes().iter().map(|a| a.offset).collect();
        assert_eq!(offsets, vec![0, 12, 24, 32]);
        assert_eq!(layout.attributes()[3].format, vk::Format::R32G32B32A32_SFLOAT);
    }

    #[test]
    fn test_empty_layout_for_generated_vertices() {
        let layout = VertexInputLayout::new();
        let info = layout.create_info();
        assert_eq!(info.vertex_binding_description_count, 0);
        assert_eq!(info.vertex_attribute_description_count, 0);
    }

    #[test]
    fn test_instanced_binding() {
        let layout = VertexInputLayout::new()
            .with_binding(0, 12, vk::VertexInputRate::VERTEX)
            .with_binding(1, 64, vk::VertexInputRate::INSTANCE)
            .with_attribute(0, 0, vk::Format::R32G32B32_SFLOAT, 0)
            .with_attribute(1, 1, vk::Format::R32G32B32A32_SFLOAT, 0);
        assert_eq!(layout.bindings()[1].input_rate, vk::VertexInputRate::INSTANCE);
        assert_eq!(layout.create_info().vertex_attribute_description_count, 2);
    }

    #[test]
    #[should_panic(expected = "location 0 used twice")]
    fn test_duplicate_location_panics() {
        let _ = VertexInputLayout::new()
            .with_attribute(0, 0, vk::Format::R32_SFLOAT, 0)
            .with_attribute(0, 0, vk::Format::R32_SFLOAT, 4);
    }

    #[test]
    fn test_vertex_is_pod() {
        let v = MeshVertex::new(Vec3::ONE, Vec3::Z, Vec2::ZERO, Vec4::W);
        let bytes = bytemuck::bytes_of(&v);
        assert_eq!(bytes.len(), 48);
    }
}
