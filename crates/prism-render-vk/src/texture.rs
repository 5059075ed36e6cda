// SPDX-License-Identifier: CEPL-1.0
//! Sampled RGBA texture shared by every object's descriptor set.

use crate::error::VkResultExt;
use crate::memory::{GpuBuffer, GpuImage, OneShot};
use ash::vk;
use prism_render::{FatalError, TextureData};
use tracing::debug;

pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;
pub const MAX_ANISOTROPY: f32 = 16.0;

pub fn sampler_info(device_limit: f32) -> vk::SamplerCreateInfo<'static> {
    vk::SamplerCreateInfo {
        s_type: vk::StructureType::SAMPLER_CREATE_INFO,
        mag_filter: vk::Filter::LINEAR,
        min_filter: vk::Filter::LINEAR,
        mipmap_mode: vk::SamplerMipmapMode::LINEAR,
        address_mode_u: vk::SamplerAddressMode::REPEAT,
        address_mode_v: vk::SamplerAddressMode::REPEAT,
        address_mode_w: vk::SamplerAddressMode::REPEAT,
        anisotropy_enable: vk::TRUE,
        max_anisotropy: MAX_ANISOTROPY.min(device_limit),
        border_color: vk::BorderColor::INT_OPAQUE_BLACK,
        unnormalized_coordinates: vk::FALSE,
        compare_enable: vk::FALSE,
        compare_op: vk::CompareOp::ALWAYS,
        ..Default::default()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Texture {
    pub image: GpuImage,
    pub sampler: vk::Sampler,
}

impl Texture {
    /// Staging upload, then UNDEFINED -> TRANSFER_DST -> SHADER_READ_ONLY.
    pub unsafe fn upload(
        one_shot: &OneShot<'_>,
        mem_props: &vk::PhysicalDeviceMemoryProperties,
        max_anisotropy: f32,
        data: &TextureData,
    ) -> Result<Self, FatalError> {
        let device = one_shot.device;
        let mut tex = Self::default();
        match tex.build(one_shot, mem_props, max_anisotropy, data) {
            Ok(()) => {
                debug!(
                    target: "prism::resources",
                    width = data.width(),
                    height = data.height(),
                    "texture uploaded"
                );
                Ok(tex)
            }
            Err(e) => {
                tex.destroy(device);
                Err(e)
            }
        }
    }

    unsafe fn build(
        &mut self,
        one_shot: &OneShot<'_>,
        mem_props: &vk::PhysicalDeviceMemoryProperties,
        max_anisotropy: f32,
        data: &TextureData,
    ) -> Result<(), FatalError> {
        let device = one_shot.device;
        let extent = vk::Extent2D {
            width: data.width(),
            height: data.height(),
        };
        let pixels = data.rgba();

        let staging = GpuBuffer::host_visible(
            device,
            mem_props,
            pixels.len() as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_SRC,
        )?;
        let copied = (|| -> Result<(), FatalError> {
            staging.write(device, pixels)?;
            self.image = GpuImage::new(
                device,
                mem_props,
                extent,
                TEXTURE_FORMAT,
                vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
                vk::ImageAspectFlags::COLOR,
            )?;
            one_shot.transition_layout(
                self.image.image,
                TEXTURE_FORMAT,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            )?;
            one_shot.copy_buffer_to_image(staging.buffer, self.image.image, extent)?;
            one_shot.transition_layout(
                self.image.image,
                TEXTURE_FORMAT,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            )
        })();
        staging.destroy(device);
        copied?;

        self.sampler = device
            .create_sampler(&sampler_info(max_anisotropy), None)
            .vk_call("vkCreateSampler")?;
        Ok(())
    }

    pub fn descriptor(&self) -> vk::DescriptorImageInfo {
        vk::DescriptorImageInfo {
            sampler: self.sampler,
            image_view: self.image.view,
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }
    }

    pub unsafe fn destroy(&mut self, device: &ash::Device) {
        if self.sampler != vk::Sampler::null() {
            device.destroy_sampler(self.sampler, None);
            self.sampler = vk::Sampler::null();
        }
        self.image.destroy(device);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anisotropy_clamped_to_device_limit() {
        assert_eq!(sampler_info(4.0).max_anisotropy, 4.0);
        assert_eq!(sampler_info(64.0).max_anisotropy, MAX_ANISOTROPY);
    }

    #[test]
    fn sampler_filters_and_wraps() {
        let info = sampler_info(16.0);
        assert_eq!(info.mag_filter, vk::Filter::LINEAR);
        assert_eq!(info.min_filter, vk::Filter::LINEAR);
        assert_eq!(info.address_mode_u, vk::SamplerAddressMode::REPEAT);
        assert_eq!(info.address_mode_v, vk::SamplerAddressMode::REPEAT);
        assert_eq!(info.border_color, vk::BorderColor::INT_OPAQUE_BLACK);
        assert_eq!(info.compare_op, vk::CompareOp::ALWAYS);
        assert_eq!(info.unnormalized_coordinates, vk::FALSE);
    }
}
