//! Append-only table of textures and their sampler descriptor sets.
//!
//! Index 0 is always the fallback texture created at startup; material
//! texture names that are empty map to it. Meshes refer to entries by
//! index, so many meshes may share one descriptor set.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use renderer_resources::ImageData;
use renderer_rhi::RhiError;
use renderer_rhi::command::CommandPool;
use renderer_rhi::descriptor::DescriptorPool;
use renderer_rhi::device::Device;
use renderer_rhi::sampler::Sampler;
use renderer_rhi::texture::Texture;

use crate::descriptors::{DescriptorLayouts, SAMPLER_TYPE, SamplerWrite, write_sampler_set};
use crate::error::RendererResult;

/// Hard capacity of the sampler descriptor pool, fallback included.
pub const MAX_OBJECTS: usize = 2;

/// Index of the fallback texture.
pub const FALLBACK_TEXTURE: usize = 0;

/// Maps material texture names to texture indices.
///
/// Empty names resolve to [`FALLBACK_TEXTURE`]; any other name is handed
/// to `create`, which returns the new index.
///
/// # Errors
///
/// Returns the first error produced by `create`.
pub fn resolve_material_textures<E>(
    names: &[String],
    mut create: impl FnMut(&str) -> Result<usize, E>,
) -> Result<Vec<usize>, E> {
    names
        .iter()
        .map(|name| {
            if name.is_empty() {
                Ok(FALLBACK_TEXTURE)
            } else {
                create(name)
            }
        })
        .collect()
}

/// Checks that one more texture fits into a table holding `len` entries.
pub fn check_texture_capacity(len: usize) -> Result<(), RhiError> {
    if len >= MAX_OBJECTS {
        return Err(RhiError::CapacityExceeded {
            what: "texture table",
            capacity: MAX_OBJECTS,
        });
    }
    Ok(())
}

/// One texture and the descriptor set sampling it.
pub struct TextureEntry {
    texture: Texture,
    descriptor_set: vk::DescriptorSet,
}

impl TextureEntry {
    #[inline]
    pub fn texture(&self) -> &Texture {
        &self.texture
    }

    #[inline]
    pub fn descriptor_set(&self) -> vk::DescriptorSet {
        self.descriptor_set
    }
}

/// The global texture table.
///
/// Fields drop in declaration order: the pool (freeing its sets), then
/// the sampler, then the textures.
pub struct TextureTable {
    pool: DescriptorPool,
    sampler: Sampler,
    entries: Vec<TextureEntry>,
    device: Arc<Device>,
    texture_dir: PathBuf,
}

impl TextureTable {
    /// Creates the table and loads the fallback texture as entry 0.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `command_pool` - Pool used for the upload copies
    /// * `layouts` - Provides the sampler set layout
    /// * `texture_dir` - Directory texture names are resolved against
    /// * `fallback` - File name of the fallback texture
    ///
    /// # Errors
    ///
    /// Returns an error if the fallback texture cannot be decoded or uploaded.
    pub fn new(
        device: Arc<Device>,
        command_pool: &CommandPool,
        layouts: &DescriptorLayouts,
        texture_dir: &Path,
        fallback: &str,
    ) -> RendererResult<Self> {
        let pool =
            DescriptorPool::single_type(device.clone(), SAMPLER_TYPE, 1, MAX_OBJECTS as u32)?;
        let sampler = Sampler::new(device.clone())?;

        let mut table = Self {
            pool,
            sampler,
            entries: Vec::with_capacity(MAX_OBJECTS),
            device,
            texture_dir: texture_dir.to_path_buf(),
        };

        let index = table.create_texture(command_pool, layouts, fallback)?;
        debug_assert_eq!(index, FALLBACK_TEXTURE);

        info!("Texture table created with fallback '{}'", fallback);

        Ok(table)
    }

    /// Decodes `texture_dir/name`, uploads it and writes a sampler set for it.
    ///
    /// # Returns
    ///
    /// The index of the new entry.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::CapacityExceeded`] once [`MAX_OBJECTS`] textures
    /// exist, or the decode/upload error naming the file.
    pub fn create_texture(
        &mut self,
        command_pool: &CommandPool,
        layouts: &DescriptorLayouts,
        name: &str,
    ) -> RendererResult<usize> {
        check_texture_capacity(self.entries.len())?;

        let path = self.texture_dir.join(name);
        let image = ImageData::load(&path)?;
        let texture = Texture::from_rgba8(
            self.device.clone(),
            command_pool,
            image.width,
            image.height,
            &image.pixels,
        )?;

        let descriptor_set = self
            .pool
            .allocate_many(layouts.sampler(), 1)?
            .into_iter()
            .next()
            .ok_or_else(|| RhiError::InvalidHandle("No sampler set allocated".to_string()))?;

        write_sampler_set(
            &self.device,
            &SamplerWrite {
                set: descriptor_set,
                view: texture.view(),
                sampler: self.sampler.handle(),
            },
        );

        let index = self.entries.len();
        self.entries.push(TextureEntry {
            texture,
            descriptor_set,
        });

        debug!(
            "Texture {} loaded from '{}' ({}x{})",
            index,
            path.display(),
            image.width,
            image.height
        );

        Ok(index)
    }

    /// Returns the descriptor set of entry `index`, falling back to entry 0.
    pub fn descriptor_set(&self, index: usize) -> vk::DescriptorSet {
        self.entries
            .get(index)
            .or_else(|| self.entries.get(FALLBACK_TEXTURE))
            .map(TextureEntry::descriptor_set)
            .unwrap_or_default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
