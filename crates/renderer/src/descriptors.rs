//! Descriptor set layouts and write plans.
//!
//! Three independent layouts are used:
//!
//! - **uniform**: binding 0, view/projection uniform buffer, vertex stage.
//!   One set per swap-chain image.
//! - **sampler**: binding 0, combined image sampler, fragment stage.
//!   One permanent set per texture.
//! - **input**: bindings 0 (colour) and 1 (depth), input attachments,
//!   fragment stage. One set per swap-chain image.
//!
//! Writes are first described as plain data (`*Write` plans) so two
//! rebuilds over unchanged resources can be compared for equality, then
//! applied with `vkUpdateDescriptorSets`.

use std::sync::Arc;

use ash::vk;

use renderer_rhi::RhiResult;
use renderer_rhi::descriptor::{DescriptorSetLayout, apply_writes, layout_binding};
use renderer_rhi::device::Device;

use crate::ubo::ViewProjection;

/// Uniform buffer descriptor type.
pub const UNIFORM_TYPE: vk::DescriptorType = vk::DescriptorType::UNIFORM_BUFFER;
/// Texture descriptor type.
pub const SAMPLER_TYPE: vk::DescriptorType = vk::DescriptorType::COMBINED_IMAGE_SAMPLER;
/// Offscreen attachment descriptor type.
pub const INPUT_TYPE: vk::DescriptorType = vk::DescriptorType::INPUT_ATTACHMENT;
/// Colour and depth.
pub const INPUTS_PER_SET: u32 = 2;

/// Bindings of the uniform layout.
pub fn uniform_bindings() -> [vk::DescriptorSetLayoutBinding<'static>; 1] {
    [layout_binding(0, UNIFORM_TYPE, vk::ShaderStageFlags::VERTEX)]
}

/// Bindings of the sampler layout.
pub fn sampler_bindings() -> [vk::DescriptorSetLayoutBinding<'static>; 1] {
    [layout_binding(0, SAMPLER_TYPE, vk::ShaderStageFlags::FRAGMENT)]
}

/// Bindings of the input attachment layout.
pub fn input_bindings() -> [vk::DescriptorSetLayoutBinding<'static>; INPUTS_PER_SET as usize] {
    [0, 1].map(|binding| layout_binding(binding, INPUT_TYPE, vk::ShaderStageFlags::FRAGMENT))
}

/// The three descriptor set layouts, created once at startup.
pub struct DescriptorLayouts {
    uniform: DescriptorSetLayout,
    sampler: DescriptorSetLayout,
    input: DescriptorSetLayout,
}

impl DescriptorLayouts {
    /// Creates all three layouts.
    ///
    /// # Errors
    ///
    /// Returns an error if any layout creation fails.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        Ok(Self {
            uniform: DescriptorSetLayout::new(device.clone(), &uniform_bindings())?,
            sampler: DescriptorSetLayout::new(device.clone(), &sampler_bindings())?,
            input: DescriptorSetLayout::new(device, &input_bindings())?,
        })
    }

    #[inline]
    pub fn uniform(&self) -> &DescriptorSetLayout {
        &self.uniform
    }

    #[inline]
    pub fn sampler(&self) -> &DescriptorSetLayout {
        &self.sampler
    }

    #[inline]
    pub fn input(&self) -> &DescriptorSetLayout {
        &self.input
    }
}

// =============================================================================
// Write plans
// =============================================================================

/// Points a uniform set at an image's uniform buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UniformWrite {
    pub set: vk::DescriptorSet,
    pub buffer: vk::Buffer,
    pub range: vk::DeviceSize,
}

/// Points an input set at an image's offscreen colour and depth views.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InputWrite {
    pub set: vk::DescriptorSet,
    pub color_view: vk::ImageView,
    pub depth_view: vk::ImageView,
}

/// Points a sampler set at a texture.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SamplerWrite {
    pub set: vk::DescriptorSet,
    pub view: vk::ImageView,
    pub sampler: vk::Sampler,
}

/// Uniform plans for `(set, uniform buffer)` pairs, one per image. Each
/// write covers one [`ViewProjection`].
pub fn uniform_plan(targets: &[(vk::DescriptorSet, vk::Buffer)]) -> Vec<UniformWrite> {
    targets
        .iter()
        .map(|&(set, buffer)| UniformWrite {
            set,
            buffer,
            range: ViewProjection::SIZE as vk::DeviceSize,
        })
        .collect()
}

/// Input plans for `(set, colour view, depth view)` triples, one per image.
pub fn input_plan(targets: &[(vk::DescriptorSet, vk::ImageView, vk::ImageView)]) -> Vec<InputWrite> {
    targets
        .iter()
        .map(|&(set, color_view, depth_view)| InputWrite {
            set,
            color_view,
            depth_view,
        })
        .collect()
}

/// Applies uniform writes.
pub fn write_uniform_sets(device: &Device, plans: &[UniformWrite]) {
    let infos: Vec<[vk::DescriptorBufferInfo; 1]> = plans
        .iter()
        .map(|p| {
            [vk::DescriptorBufferInfo::default()
                .buffer(p.buffer)
                .range(p.range)]
        })
        .collect();

    let writes: Vec<vk::WriteDescriptorSet> = plans
        .iter()
        .zip(&infos)
        .map(|(p, info)| {
            vk::WriteDescriptorSet::default()
                .dst_set(p.set)
                .dst_binding(0)
                .dst_array_element(0)
                .descriptor_type(UNIFORM_TYPE)
                .buffer_info(info)
        })
        .collect();

    apply_writes(device, &writes);
}

/// Applies input attachment writes.
pub fn write_input_sets(device: &Device, plans: &[InputWrite]) {
    let layout = vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL;
    let infos: Vec<[[vk::DescriptorImageInfo; 1]; 2]> = plans
        .iter()
        .map(|p| {
            [p.color_view, p.depth_view].map(|view| {
                [vk::DescriptorImageInfo::default()
                    .image_view(view)
                    .image_layout(layout)]
            })
        })
        .collect();

    let writes: Vec<vk::WriteDescriptorSet> = plans
        .iter()
        .zip(&infos)
        .flat_map(|(p, [color, depth])| {
            [(0, color), (1, depth)].map(|(binding, info)| {
                vk::WriteDescriptorSet::default()
                    .dst_set(p.set)
                    .dst_binding(binding)
                    .dst_array_element(0)
                    .descriptor_type(INPUT_TYPE)
                    .image_info(info)
            })
        })
        .collect();

    apply_writes(device, &writes);
}

/// Applies one sampler write.
pub fn write_sampler_set(device: &Device, plan: &SamplerWrite) {
    let info = [vk::DescriptorImageInfo::default()
        .sampler(plan.sampler)
        .image_view(plan.view)
        .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)];

    let write = vk::WriteDescriptorSet::default()
        .dst_set(plan.set)
        .dst_binding(0)
        .dst_array_element(0)
        .descriptor_type(SAMPLER_TYPE)
        .image_info(&info);

    apply_writes(device, &[write]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn uniform_targets(base: u64) -> Vec<(vk::DescriptorSet, vk::Buffer)> {
        (0..3)
            .map(|i| (vk::DescriptorSet::from_raw(base + i), vk::Buffer::from_raw(base + 10 + i)))
            .collect()
    }

    fn input_targets() -> Vec<(vk::DescriptorSet, vk::ImageView, vk::ImageView)> {
        (0..3)
            .map(|i| {
                (
                    vk::DescriptorSet::from_raw(100 + i),
                    vk::ImageView::from_raw(200 + i),
                    vk::ImageView::from_raw(300 + i),
                )
            })
            .collect()
    }

    #[test]
    fn test_uniform_plan_is_idempotent() {
        let targets = uniform_targets(1);
        let first = uniform_plan(&targets);
        let second = uniform_plan(&targets);
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
        assert!(first.iter().all(|w| w.range == 128));
        assert_eq!(first[2].buffer, vk::Buffer::from_raw(13));
    }

    #[test]
    fn test_uniform_plan_follows_new_buffers() {
        assert_ne!(uniform_plan(&uniform_targets(1)), uniform_plan(&uniform_targets(50)));
    }

    #[test]
    fn test_input_plan_is_idempotent() {
        let targets = input_targets();
        let plan = input_plan(&targets);
        assert_eq!(plan, input_plan(&targets));
        assert_eq!(plan[1].set, vk::DescriptorSet::from_raw(101));
        assert_eq!(plan[1].color_view, vk::ImageView::from_raw(201));
        assert_eq!(plan[1].depth_view, vk::ImageView::from_raw(301));
    }

    #[test]
    fn test_uniform_bindings() {
        let [binding] = uniform_bindings();
        assert_eq!(binding.binding, 0);
        assert_eq!(binding.descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(binding.stage_flags, vk::ShaderStageFlags::VERTEX);
    }

    #[test]
    fn test_sampler_bindings() {
        let [binding] = sampler_bindings();
        assert_eq!(binding.binding, 0);
        assert_eq!(
            binding.descriptor_type,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER
        );
        assert_eq!(binding.stage_flags, vk::ShaderStageFlags::FRAGMENT);
    }

    #[test]
    fn test_input_bindings() {
        let bindings = input_bindings();
        assert_eq!(bindings[0].binding, 0);
        assert_eq!(bindings[1].binding, 1);
        for b in &bindings {
            assert_eq!(b.descriptor_type, vk::DescriptorType::INPUT_ATTACHMENT);
            assert_eq!(b.stage_flags, vk::ShaderStageFlags::FRAGMENT);
            assert_eq!(b.descriptor_count, 1);
        }
    }
}
