//! OBJ model import.
//!
//! Meshes are triangulated and single-indexed on import so every vertex
//! carries its own position, colour and texture coordinate, ready for
//! upload as one interleaved vertex buffer.
//!
//! # Example
//!
//! ```no_run
//! use renderer_resources::ModelData;
//!
//! let model = ModelData::load("geo/Alfred_Retypology.obj".as_ref())?;
//! for mesh in &model.meshes {
//!     println!("{} vertices, material {:?}", mesh.vertices.len(), mesh.material_index);
//! }
//! # Ok::<(), renderer_resources::ResourceError>(())
//! ```

use std::path::Path;

use glam::{Vec2, Vec3};
use renderer_rhi::vertex::Vertex;
use tracing::{debug, info, warn};

use crate::error::{ResourceError, ResourceResult};

/// CPU-side geometry of one mesh.
#[derive(Debug, Default, Clone)]
pub struct MeshData {
    /// Interleaved vertices.
    pub vertices: Vec<Vertex>,
    /// Triangle list indices into `vertices`.
    pub indices: Vec<u32>,
    /// Index into [`ModelData::material_texture_names`].
    pub material_index: Option<usize>,
}

/// A model imported from disk.
#[derive(Debug, Default, Clone)]
pub struct ModelData {
    /// Meshes in file order.
    pub meshes: Vec<MeshData>,
    /// Diffuse texture file name per material, empty when the material has none.
    pub material_texture_names: Vec<String>,
}

impl ModelData {
    /// Loads an OBJ file and its material library.
    ///
    /// A missing or unreadable material library is not fatal: the model
    /// loads with no materials and every mesh falls back to the default
    /// texture.
    ///
    /// # Errors
    ///
    /// - [`ResourceError::FileNotFound`] if `path` does not exist
    /// - [`ResourceError::ModelLoad`] if the importer rejects the file
    /// - [`ResourceError::NoMeshes`] if the file defines no geometry
    pub fn load(path: &Path) -> ResourceResult<Self> {
        if !path.exists() {
            return Err(ResourceError::FileNotFound(path.to_path_buf()));
        }

        let options = tobj::LoadOptions {
            triangulate: true,
            single_index: true,
            ..Default::default()
        };

        let (models, materials) =
            tobj::load_obj(path, &options).map_err(|e| ResourceError::ModelLoad {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        if models.is_empty() {
            return Err(ResourceError::NoMeshes(path.to_path_buf()));
        }

        let materials = materials.unwrap_or_else(|e| {
            warn!("Model '{}' has no usable material library: {}", path.display(), e);
            Vec::new()
        });

        let material_texture_names = materials
            .iter()
            .map(|m| texture_file_name(m.diffuse_texture.as_deref()))
            .collect();

        let meshes: Vec<MeshData> = models
            .into_iter()
            .map(|model| {
                let mesh = convert_mesh(&model.mesh);
                debug!(
                    "Mesh '{}': {} vertices, {} indices",
                    model.name,
                    mesh.vertices.len(),
                    mesh.indices.len()
                );
                mesh
            })
            .collect();

        info!(
            "Loaded model '{}': {} mesh(es), {} material(s)",
            path.display(),
            meshes.len(),
            materials.len()
        );

        Ok(Self {
            meshes,
            material_texture_names,
        })
    }
}

/// Converts one imported mesh into interleaved vertices.
///
/// Texture V is flipped to match Vulkan's top-left image origin.
fn convert_mesh(mesh: &tobj::Mesh) -> MeshData {
    let count = mesh.positions.len() / 3;
    let has_color = mesh.vertex_color.len() >= count * 3;
    let has_tex = mesh.texcoords.len() >= count * 2;

    let vertices = (0..count)
        .map(|i| {
            let pos = Vec3::new(
                mesh.positions[3 * i],
                mesh.positions[3 * i + 1],
                mesh.positions[3 * i + 2],
            );
            let col = if has_color {
                Vec3::new(
                    mesh.vertex_color[3 * i],
                    mesh.vertex_color[3 * i + 1],
                    mesh.vertex_color[3 * i + 2],
                )
            } else {
                Vec3::ZERO
            };
            let tex = if has_tex {
                Vec2::new(mesh.texcoords[2 * i], 1.0 - mesh.texcoords[2 * i + 1])
            } else {
                Vec2::ZERO
            };
            Vertex::new(pos, col, tex)
        })
        .collect();

    MeshData {
        vertices,
        indices: mesh.indices.clone(),
        material_index: mesh.material_id,
    }
}

/// Strips any directory part from a material's texture path.
///
/// Textures are always looked up by file name in the texture directory.
pub fn texture_file_name(texture: Option<&str>) -> String {
    texture
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .and_then(|t| {
            // Exporters write both separators
            t.rsplit(['/', '\\']).next().map(str::to_string)
        })
        .unwrap_or_default()
}
