//! GPU meshes and mesh models.

use std::sync::Arc;

use glam::Mat4;
use tracing::{debug, warn};

use renderer_resources::MeshData;
use renderer_rhi::RhiResult;
use renderer_rhi::buffer::{Buffer, BufferUsage};
use renderer_rhi::command::CommandPool;
use renderer_rhi::device::Device;

use crate::texture_table::FALLBACK_TEXTURE;

/// One mesh uploaded to device-local memory.
pub struct Mesh {
    vertex_buffer: Buffer,
    index_buffer: Buffer,
    index_count: u32,
    tex_id: usize,
}

impl Mesh {
    /// Uploads a mesh through staging buffers.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `pool` - Pool used for the copy commands
    /// * `data` - CPU-side geometry; must not be empty
    /// * `tex_id` - Texture table index the mesh samples
    ///
    /// # Errors
    ///
    /// Returns an error if either buffer cannot be created or filled.
    pub fn upload(
        device: Arc<Device>,
        pool: &CommandPool,
        data: &MeshData,
        tex_id: usize,
    ) -> RhiResult<Self> {
        let vertex_buffer = Buffer::new_device_local(
            device.clone(),
            pool,
            BufferUsage::Vertex,
            bytemuck::cast_slice(&data.vertices),
        )?;
        let index_buffer = Buffer::new_device_local(
            device,
            pool,
            BufferUsage::Index,
            bytemuck::cast_slice(&data.indices),
        )?;

        debug!(
            "Uploaded mesh: {} vertices, {} indices, texture {}",
            data.vertices.len(),
            data.indices.len(),
            tex_id
        );

        Ok(Self {
            vertex_buffer,
            index_buffer,
            index_count: data.indices.len() as u32,
            tex_id,
        })
    }

    #[inline]
    pub fn vertex_buffer(&self) -> &Buffer {
        &self.vertex_buffer
    }

    #[inline]
    pub fn index_buffer(&self) -> &Buffer {
        &self.index_buffer
    }

    #[inline]
    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    /// Texture table index; a weak reference, the table owns the texture.
    #[inline]
    pub fn tex_id(&self) -> usize {
        self.tex_id
    }
}

/// An ordered list of meshes drawn with one model matrix.
pub struct MeshModel {
    meshes: Vec<Mesh>,
    transform: Mat4,
}

impl MeshModel {
    /// Creates a model with the identity transform.
    pub fn new(meshes: Vec<Mesh>) -> Self {
        Self {
            meshes,
            transform: Mat4::IDENTITY,
        }
    }

    #[inline]
    pub fn meshes(&self) -> &[Mesh] {
        &self.meshes
    }

    #[inline]
    pub fn transform(&self) -> Mat4 {
        self.transform
    }

    #[inline]
    pub fn set_transform(&mut self, transform: Mat4) {
        self.transform = transform;
    }
}

/// Picks the texture index of every mesh from its material.
///
/// Meshes without a material, or with a material index outside
/// `material_textures`, use the fallback texture.
pub fn mesh_texture_ids(meshes: &[MeshData], material_textures: &[usize]) -> Vec<usize> {
    meshes
        .iter()
        .map(|mesh| {
            mesh.material_index
                .and_then(|m| material_textures.get(m).copied())
                .unwrap_or(FALLBACK_TEXTURE)
        })
        .collect()
}

/// Returns whether a mesh has anything to draw.
///
/// Zero-sized buffers are invalid in Vulkan, so empty meshes are skipped.
pub fn is_drawable(mesh: &MeshData) -> bool {
    if mesh.vertices.is_empty() || mesh.indices.is_empty() {
        warn!(
            "Skipping empty mesh ({} vertices, {} indices)",
            mesh.vertices.len(),
            mesh.indices.len()
        );
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use renderer_rhi::vertex::Vertex;

    fn mesh(material_index: Option<usize>) -> MeshData {
        MeshData {
            vertices: vec![Vertex::default(); 3],
            indices: vec![0, 1, 2],
            material_index,
        }
    }

    #[test]
    fn test_mesh_texture_ids() {
        let meshes = [mesh(Some(0)), mesh(Some(1)), mesh(None), mesh(Some(7))];
        let ids = mesh_texture_ids(&meshes, &[1, 0]);
        assert_eq!(ids, vec![1, 0, FALLBACK_TEXTURE, FALLBACK_TEXTURE]);
    }

    #[test]
    fn test_meshes_share_a_texture() {
        let meshes = [mesh(Some(0)), mesh(Some(0))];
        let ids = mesh_texture_ids(&meshes, &[1]);
        assert_eq!(ids, vec![1, 1]);
    }

    #[test]
    fn test_is_drawable() {
        assert!(is_drawable(&mesh(None)));
        assert!(!is_drawable(&MeshData::default()));

        let no_indices = MeshData {
            indices: Vec::new(),
            ..mesh(None)
        };
        assert!(!is_drawable(&no_indices));
    }

    #[test]
    fn test_mesh_model_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<MeshModel>();
    }
}
