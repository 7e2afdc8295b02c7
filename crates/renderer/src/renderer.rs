//! Main renderer orchestration.
//!
//! This module provides the [`Renderer`] that owns every Vulkan object and
//! drives the per-frame acquire, record, submit and present sequence.

use std::mem::ManuallyDrop;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ash::vk;
use glam::Mat4;
use tracing::{debug, error, info, warn};

use renderer_core::RendererConfig;
use renderer_platform::{Surface, Window};
use renderer_resources::ModelData;
use renderer_rhi::command::CommandPool;
use renderer_rhi::device::Device;
use renderer_rhi::image::choose_depth_format;
use renderer_rhi::instance::Instance;
use renderer_rhi::physical_device::select_physical_device;
use renderer_rhi::swapchain::Swapchain;
use renderer_rhi::{RhiError, RhiResult};
use renderer_scene::Camera;

use crate::descriptors::DescriptorLayouts;
use crate::error::{RendererError, RendererResult};
use crate::frame_sync::FrameSynchronizer;
use crate::mesh::{Mesh, MeshModel, is_drawable, mesh_texture_ids};
use crate::recorder::{DrawList, FrameInputs, MeshDraw, ModelDraw};
use crate::render_graph::RenderGraph;
use crate::targets::SwapchainResources;
use crate::texture_table::{MAX_OBJECTS, TextureTable, resolve_material_textures};
use crate::ubo::ViewProjection;

/// Outcome of asking the swap chain for the next image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// An image was acquired; `suboptimal` asks for a rebuild after presenting.
    Image { index: u32, suboptimal: bool },
    /// The swap chain no longer matches the surface.
    OutOfDate,
}

/// Sorts an acquire result into an outcome or a fatal error.
pub fn classify_acquire(result: Result<(u32, bool), vk::Result>) -> RhiResult<AcquireOutcome> {
    match result {
        Ok((index, suboptimal)) => Ok(AcquireOutcome::Image { index, suboptimal }),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
        Err(e) => Err(RhiError::VulkanError(e)),
    }
}

/// Returns whether a present result asks for a swap-chain rebuild.
///
/// # Errors
///
/// Any result other than success, suboptimal or out-of-date is fatal.
pub fn present_needs_rebuild(result: Result<bool, vk::Result>) -> RhiResult<bool> {
    match result {
        Ok(suboptimal) => Ok(suboptimal),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR | vk::Result::SUBOPTIMAL_KHR) => Ok(true),
        Err(e) => Err(RhiError::VulkanError(e)),
    }
}

/// Main renderer that manages all Vulkan resources.
///
/// # Resource Destruction Order
///
/// Vulkan objects are released in reverse creation order:
/// 1. Wait for all GPU work to complete
/// 2. Mesh models (vertex/index buffers)
/// 3. Texture table (sampler pool and sets, sampler, textures)
/// 4. Swap-chain resources (framebuffers, attachments, uniform and input
///    pools, uniform buffers, command buffers)
/// 5. Frame synchronization objects
/// 6. Command pool
/// 7. Pipelines, pipeline layouts and render pass
/// 8. Descriptor set layouts
/// 9. Swapchain
/// 10. Device
/// 11. Surface
/// 12. Instance (with its debug messenger)
///
/// `ManuallyDrop` enforces the order for everything that cannot be rebuilt.
pub struct Renderer {
    instance: ManuallyDrop<Instance>,
    surface: ManuallyDrop<Surface>,
    device: ManuallyDrop<Arc<Device>>,
    swapchain: ManuallyDrop<Swapchain>,
    layouts: ManuallyDrop<DescriptorLayouts>,
    render_graph: ManuallyDrop<RenderGraph>,
    command_pool: ManuallyDrop<CommandPool>,
    frames: ManuallyDrop<FrameSynchronizer>,
    texture_table: ManuallyDrop<TextureTable>,

    /// Rebuilt as one unit whenever the swap chain changes.
    targets: Option<SwapchainResources>,
    models: Vec<MeshModel>,

    camera: Camera,
    view_projection: ViewProjection,

    shader_dir: PathBuf,
    /// Flag indicating the swap chain needs recreation.
    framebuffer_resized: bool,
    width: u32,
    height: u32,
}

impl Renderer {
    /// Creates a renderer drawing into `window`.
    ///
    /// # Arguments
    ///
    /// * `window` - The window to render to
    /// * `config` - Validation flag and asset directories
    ///
    /// # Errors
    ///
    /// Returns an error if no suitable GPU exists, a shader or the fallback
    /// texture cannot be loaded, or any Vulkan object creation fails.
    pub fn new(window: &Window, config: &RendererConfig) -> RendererResult<Self> {
        let (width, height) = window.framebuffer_size();
        info!("Initializing Vulkan renderer ({}x{})", width, height);

        let extensions = window.required_extensions()?;
        let instance = Instance::new(config.enable_validation, &extensions)?;
        let surface = window.create_surface(instance.entry(), instance.handle())?;

        let adapter = select_physical_device(instance.handle(), surface.handle(), surface.loader())?;
        let device = Device::new(&instance, &adapter)?;

        let swapchain = Swapchain::new(&instance, device.clone(), surface.handle(), width, height)?;
        let depth_format = choose_depth_format(&device)?;

        let layouts = DescriptorLayouts::new(device.clone())?;
        let render_graph = RenderGraph::new(
            device.clone(),
            swapchain.format(),
            depth_format,
            &layouts,
            &config.shader_dir,
        )?;

        let command_pool = CommandPool::new(device.clone(), device.queue_families().graphics)?;
        let frames = FrameSynchronizer::new(device.clone(), swapchain.image_count() as usize)?;
        let texture_table = TextureTable::new(
            device.clone(),
            &command_pool,
            &layouts,
            &config.texture_dir,
            &config.fallback_texture,
        )?;

        let targets = SwapchainResources::new(
            device.clone(),
            &swapchain,
            &render_graph,
            &layouts,
            &command_pool,
        )?;

        let camera = Camera::default();
        let extent = swapchain.extent();
        let view_projection = ViewProjection::from_camera(&camera, extent.width, extent.height);

        info!(
            "Renderer initialized: {} swapchain images, {:?}",
            swapchain.image_count(),
            swapchain.format()
        );

        Ok(Self {
            instance: ManuallyDrop::new(instance),
            surface: ManuallyDrop::new(surface),
            device: ManuallyDrop::new(device),
            swapchain: ManuallyDrop::new(swapchain),
            layouts: ManuallyDrop::new(layouts),
            render_graph: ManuallyDrop::new(render_graph),
            command_pool: ManuallyDrop::new(command_pool),
            frames: ManuallyDrop::new(frames),
            texture_table: ManuallyDrop::new(texture_table),
            targets: Some(targets),
            models: Vec::new(),
            camera,
            view_projection,
            shader_dir: config.shader_dir.clone(),
            framebuffer_resized: false,
            width,
            height,
        })
    }

    // =========================================================================
    // Scene
    // =========================================================================

    /// Loads a model file and uploads its meshes.
    ///
    /// Material texture names are resolved through the texture table; empty
    /// names use the fallback texture. Must not be called while a frame that
    /// could read the texture table is being recorded.
    ///
    /// # Returns
    ///
    /// The model id, i.e. its index in the model list.
    ///
    /// # Errors
    ///
    /// Returns an error naming the file if the model or one of its textures
    /// cannot be loaded, or if the texture table is full.
    pub fn create_mesh_model(&mut self, path: &Path) -> RendererResult<usize> {
        let data = ModelData::load(path)?;

        let material_textures = resolve_material_textures(&data.material_texture_names, |name| {
            self.texture_table
                .create_texture(&self.command_pool, &self.layouts, name)
        })?;
        let tex_ids = mesh_texture_ids(&data.meshes, &material_textures);

        let mut meshes = Vec::with_capacity(data.meshes.len());
        for (mesh, &tex_id) in data.meshes.iter().zip(&tex_ids) {
            if is_drawable(mesh) {
                meshes.push(Mesh::upload(
                    (*self.device).clone(),
                    &self.command_pool,
                    mesh,
                    tex_id,
                )?);
            }
        }

        let id = self.models.len();
        info!(
            "Model {} created from '{}': {} mesh(es), textures {:?} ({} of {} table slots used)",
            id,
            path.display(),
            meshes.len(),
            material_textures,
            self.texture_table.len(),
            MAX_OBJECTS
        );
        self.models.push(MeshModel::new(meshes));

        Ok(id)
    }

    /// Replaces the transform of model `id`.
    ///
    /// Unknown ids are ignored with a warning.
    pub fn update_model(&mut self, id: usize, transform: Mat4) {
        match self.models.get_mut(id) {
            Some(model) => model.set_transform(transform),
            None => warn!("update_model: no model with id {}", id),
        }
    }

    /// Returns model `id`.
    ///
    /// # Errors
    ///
    /// Returns [`RendererError::InvalidModel`] for an unknown id.
    pub fn model(&self, id: usize) -> RendererResult<&MeshModel> {
        self.models.get(id).ok_or(RendererError::InvalidModel(id))
    }

    #[inline]
    pub fn model_count(&self) -> usize {
        self.models.len()
    }

    #[inline]
    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    // =========================================================================
    // Swapchain
    // =========================================================================

    /// Notifies the renderer that the window has been resized.
    ///
    /// The actual swapchain recreation happens on the next frame. A zero
    /// size pauses rendering until the window gets an area again.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == self.width && height == self.height {
            return;
        }

        debug!(
            "Resize triggered: {}x{} -> {}x{}",
            self.width, self.height, width, height
        );
        self.width = width;
        self.height = height;
        self.framebuffer_resized = true;
    }

    /// Whether the framebuffer currently has no area.
    #[inline]
    pub fn is_minimized(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Rebuilds the swap chain and everything that depends on it.
    ///
    /// The old group is dropped before the swap chain is recreated, because
    /// its framebuffers reference the old image views.
    fn rebuild_swapchain(&mut self) -> RendererResult<()> {
        self.device.wait_idle()?;

        drop(self.targets.take());

        self.swapchain.recreate(
            &self.instance,
            self.surface.handle(),
            self.width,
            self.height,
        )?;

        if self.swapchain.format() != self.render_graph.swapchain_format() {
            info!(
                "Swapchain format changed {:?} -> {:?}, rebuilding render graph",
                self.render_graph.swapchain_format(),
                self.swapchain.format()
            );
            let graph = RenderGraph::new(
                (*self.device).clone(),
                self.swapchain.format(),
                self.render_graph.depth_format(),
                &self.layouts,
                &self.shader_dir,
            )?;
            // SAFETY: the device is idle and nothing references the old graph.
            unsafe {
                ManuallyDrop::drop(&mut self.render_graph);
            }
            self.render_graph = ManuallyDrop::new(graph);
        }

        self.targets = Some(SwapchainResources::new(
            (*self.device).clone(),
            &self.swapchain,
            &self.render_graph,
            &self.layouts,
            &self.command_pool,
        )?);
        self.frames
            .swapchain_rebuilt(self.swapchain.image_count() as usize)?;

        let extent = self.swapchain.extent();
        self.view_projection =
            ViewProjection::from_camera(&self.camera, extent.width, extent.height);
        self.framebuffer_resized = false;

        if let Some(targets) = &self.targets {
            info!(
                "Swapchain rebuilt: {} image(s), {}x{}, {} uniform and {} input set(s)",
                self.swapchain.image_count(),
                extent.width,
                extent.height,
                targets.uniform_sets_allocated(),
                targets.input_sets_allocated()
            );
        }
        Ok(())
    }

    // =========================================================================
    // Frame
    // =========================================================================

    /// Draws one frame.
    ///
    /// Does nothing while the window is minimized. An out-of-date swap chain
    /// is rebuilt and the frame is skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if any wait, acquire, submit or present call fails
    /// for a reason other than the swap chain being out of date.
    pub fn render_frame(&mut self) -> RendererResult<()> {
        if self.is_minimized() {
            return Ok(());
        }

        if self.framebuffer_resized || self.targets.is_none() {
            debug!("Resize requested, recreating swapchain before acquire");
            self.rebuild_swapchain()?;
        }

        let slot = self.frames.begin_frame()?;
        let image_available = self.frames.sync(slot).image_available();

        let acquired = classify_acquire(self.swapchain.acquire_next_image(image_available))?;
        let (image_index, acquire_suboptimal) = match acquired {
            AcquireOutcome::Image { index, suboptimal } => (index, suboptimal),
            AcquireOutcome::OutOfDate => {
                debug!("Swapchain out of date on acquire, recreating");
                self.frames.acquire_failed(slot)?;
                return self.rebuild_swapchain();
            }
        };

        self.frames.image_acquired(slot, image_index as usize)?;

        let targets = self.targets.as_ref().ok_or_else(|| {
            RhiError::SwapchainError("Swapchain resources missing".to_string())
        })?;
        let image = targets.image(image_index as usize).ok_or_else(|| {
            RhiError::SwapchainError(format!("Acquired unknown image {}", image_index))
        })?;

        image.write_uniform(&self.view_projection)?;

        let models: Vec<ModelDraw> = self
            .models
            .iter()
            .map(|model| ModelDraw {
                transform: model.transform(),
                meshes: model
                    .meshes()
                    .iter()
                    .map(|mesh| MeshDraw {
                        vertex_buffer: mesh.vertex_buffer().handle(),
                        index_buffer: mesh.index_buffer().handle(),
                        index_count: mesh.index_count(),
                        texture_set: self.texture_table.descriptor_set(mesh.tex_id()),
                    })
                    .collect(),
            })
            .collect();

        let draw_list = DrawList::build(&FrameInputs {
            render_pass: self.render_graph.render_pass().handle(),
            framebuffer: image.framebuffer().handle(),
            extent: targets.extent(),
            geometry_pipeline: self.render_graph.geometry_pipeline().handle(),
            geometry_layout: self.render_graph.geometry_layout().handle(),
            composition_pipeline: self.render_graph.composition_pipeline().handle(),
            composition_layout: self.render_graph.composition_layout().handle(),
            uniform_set: image.uniform_set(),
            input_set: image.input_set(),
            models: &models,
        });
        draw_list.record(image.command_buffer())?;

        let sync = self.frames.sync(slot);
        let wait_semaphores = [sync.image_available()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [sync.render_finished()];
        let command_buffers = [image.command_buffer().handle()];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        // SAFETY: the command buffer is fully recorded and its image is not
        // used by another submission; the slot's fence was reset on acquire.
        unsafe {
            self.device
                .submit_graphics(&[submit_info], sync.fence().handle())?;
        }

        let render_finished = sync.render_finished();
        self.frames.submitted(slot)?;

        let present_result =
            self.swapchain
                .present(self.device.present_queue(), image_index, render_finished);

        if present_needs_rebuild(present_result)? || acquire_suboptimal {
            debug!("Swapchain suboptimal or out of date on present, recreating");
            self.rebuild_swapchain()?;
        }

        Ok(())
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            error!("Device did not go idle before teardown: {}", e);
        }

        self.models.clear();

        // SAFETY: the device is idle and each field is dropped exactly once,
        // dependents before the objects they were created from.
        unsafe {
            ManuallyDrop::drop(&mut self.texture_table);
            drop(self.targets.take());
            ManuallyDrop::drop(&mut self.frames);
            ManuallyDrop::drop(&mut self.command_pool);
            ManuallyDrop::drop(&mut self.render_graph);
            ManuallyDrop::drop(&mut self.layouts);
            ManuallyDrop::drop(&mut self.swapchain);
            ManuallyDrop::drop(&mut self.device);
            ManuallyDrop::drop(&mut self.surface);
            ManuallyDrop::drop(&mut self.instance);
        }

        info!("Renderer destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_success() {
        assert_eq!(
            classify_acquire(Ok((2, false))).unwrap(),
            AcquireOutcome::Image {
                index: 2,
                suboptimal: false
            }
        );
        assert_eq!(
            classify_acquire(Ok((0, true))).unwrap(),
            AcquireOutcome::Image {
                index: 0,
                suboptimal: true
            }
        );
    }

    #[test]
    fn test_acquire_out_of_date_is_recoverable() {
        assert_eq!(
            classify_acquire(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap(),
            AcquireOutcome::OutOfDate
        );
    }

    #[test]
    fn test_acquire_device_lost_is_fatal() {
        let err = classify_acquire(Err(vk::Result::ERROR_DEVICE_LOST)).unwrap_err();
        assert!(matches!(
            err,
            RhiError::VulkanError(vk::Result::ERROR_DEVICE_LOST)
        ));
    }

    #[test]
    fn test_present_rebuild_decisions() {
        assert!(!present_needs_rebuild(Ok(false)).unwrap());
        assert!(present_needs_rebuild(Ok(true)).unwrap());
        assert!(present_needs_rebuild(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap());
        assert!(present_needs_rebuild(Err(vk::Result::SUBOPTIMAL_KHR)).unwrap());
    }

    #[test]
    fn test_present_failure_is_fatal() {
        assert!(present_needs_rebuild(Err(vk::Result::ERROR_SURFACE_LOST_KHR)).is_err());
    }
}
