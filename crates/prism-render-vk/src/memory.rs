// SPDX-License-Identifier: CEPL-1.0
//! Buffers, images, one-shot command submission and layout transitions.

use crate::error::VkResultExt;
use ash::vk;
use bytemuck::Pod;
use prism_render::FatalError;

pub fn find_memory_type(
    props: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    required: vk::MemoryPropertyFlags,
) -> Result<u32, FatalError> {
    (0..props.memory_type_count)
        .find(|&i| {
            (type_bits & (1 << i)) != 0
                && props.memory_types[i as usize]
                    .property_flags
                    .contains(required)
        })
        .ok_or_else(|| FatalError::NoSuitableMemoryType {
            type_bits,
            properties: format!("{required:?}"),
        })
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GpuBuffer {
    pub buffer: vk::Buffer,
    pub memory: vk::DeviceMemory,
    pub size: vk::DeviceSize,
}

impl GpuBuffer {
    pub unsafe fn new(
        device: &ash::Device,
        mem_props: &vk::PhysicalDeviceMemoryProperties,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        props: vk::MemoryPropertyFlags,
    ) -> Result<Self, FatalError> {
        let bci = vk::BufferCreateInfo {
            s_type: vk::StructureType::BUFFER_CREATE_INFO,
            size,
            usage,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            ..Default::default()
        };
        let buffer = device.create_buffer(&bci, None).vk_call("vkCreateBuffer")?;
        let req = device.get_buffer_memory_requirements(buffer);
        let memory = find_memory_type(mem_props, req.memory_type_bits, props).and_then(|idx| {
            let mai = vk::MemoryAllocateInfo {
                s_type: vk::StructureType::MEMORY_ALLOCATE_INFO,
                allocation_size: req.size,
                memory_type_index: idx,
                ..Default::default()
            };
            device.allocate_memory(&mai, None).vk_call("vkAllocateMemory")
        });
        let memory = match memory {
            Ok(m) => m,
            Err(e) => {
                device.destroy_buffer(buffer, None);
                return Err(e);
            }
        };
        let out = Self {
            buffer,
            memory,
            size,
        };
        if let Err(e) = device
            .bind_buffer_memory(buffer, memory, 0)
            .vk_call("vkBindBufferMemory")
        {
            out.destroy(device);
            return Err(e);
        }
        Ok(out)
    }

    pub unsafe fn host_visible(
        device: &ash::Device,
        mem_props: &vk::PhysicalDeviceMemoryProperties,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
    ) -> Result<Self, FatalError> {
        Self::new(
            device,
            mem_props,
            size,
            usage,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )
    }

    /// Map, copy, unmap. Memory must be host-visible.
    pub unsafe fn write(&self, device: &ash::Device, bytes: &[u8]) -> Result<(), FatalError> {
        debug_assert!(bytes.len() as vk::DeviceSize <= self.size);
        let ptr = device
            .map_memory(self.memory, 0, self.size, vk::MemoryMapFlags::empty())
            .vk_call("vkMapMemory")?;
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr as *mut u8, bytes.len());
        device.unmap_memory(self.memory);
        Ok(())
    }

    pub unsafe fn write_pod<T: Pod>(
        &self,
        device: &ash::Device,
        data: &[T],
    ) -> Result<(), FatalError> {
        self.write(device, bytemuck::cast_slice(data))
    }

    pub unsafe fn destroy(&self, device: &ash::Device) {
        if self.buffer != vk::Buffer::null() {
            device.destroy_buffer(self.buffer, None);
        }
        if self.memory != vk::DeviceMemory::null() {
            device.free_memory(self.memory, None);
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GpuImage {
    pub image: vk::Image,
    pub memory: vk::DeviceMemory,
    pub view: vk::ImageView,
    pub format: vk::Format,
}

impl GpuImage {
    /// Device-local 2D image with optimal tiling, one mip level, plus a view.
    pub unsafe fn new(
        device: &ash::Device,
        mem_props: &vk::PhysicalDeviceMemoryProperties,
        extent: vk::Extent2D,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
        aspect: vk::ImageAspectFlags,
    ) -> Result<Self, FatalError> {
        let img_ci = vk::ImageCreateInfo {
            s_type: vk::StructureType::IMAGE_CREATE_INFO,
            image_type: vk::ImageType::TYPE_2D,
            format,
            extent: vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            },
            mip_levels: 1,
            array_layers: 1,
            samples: vk::SampleCountFlags::TYPE_1,
            tiling: vk::ImageTiling::OPTIMAL,
            usage,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            ..Default::default()
        };
        let mut out = Self {
            format,
            ..Default::default()
        };
        out.image = device.create_image(&img_ci, None).vk_call("vkCreateImage")?;

        let built = (|| -> Result<(), FatalError> {
            let req = device.get_image_memory_requirements(out.image);
            let idx = find_memory_type(
                mem_props,
                req.memory_type_bits,
                vk::MemoryPropertyFlags::DEVICE_LOCAL,
            )?;
            let alloc = vk::MemoryAllocateInfo {
                s_type: vk::StructureType::MEMORY_ALLOCATE_INFO,
                allocation_size: req.size,
                memory_type_index: idx,
                ..Default::default()
            };
            out.memory = device.allocate_memory(&alloc, None).vk_call("vkAllocateMemory")?;
            device
                .bind_image_memory(out.image, out.memory, 0)
                .vk_call("vkBindImageMemory")?;
            out.view = create_image_view(device, out.image, format, aspect)?;
            Ok(())
        })();

        match built {
            Ok(()) => Ok(out),
            Err(e) => {
                out.destroy(device);
                Err(e)
            }
        }
    }

    pub unsafe fn destroy(&mut self, device: &ash::Device) {
        if self.view != vk::ImageView::null() {
            device.destroy_image_view(self.view, None);
            self.view = vk::ImageView::null();
        }
        if self.image != vk::Image::null() {
            device.destroy_image(self.image, None);
            self.image = vk::Image::null();
        }
        if self.memory != vk::DeviceMemory::null() {
            device.free_memory(self.memory, None);
            self.memory = vk::DeviceMemory::null();
        }
    }
}

pub unsafe fn create_image_view(
    device: &ash::Device,
    image: vk::Image,
    format: vk::Format,
    aspect: vk::ImageAspectFlags,
) -> Result<vk::ImageView, FatalError> {
    let view_ci = vk::ImageViewCreateInfo {
        s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
        image,
        view_type: vk::ImageViewType::TYPE_2D,
        format,
        subresource_range: subresource(aspect),
        ..Default::default()
    };
    device
        .create_image_view(&view_ci, None)
        .vk_call("vkCreateImageView")
}

fn subresource(aspect: vk::ImageAspectFlags) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: aspect,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    }
}

pub fn has_stencil(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D32_SFLOAT_S8_UINT | vk::Format::D24_UNORM_S8_UINT
    )
}

/// Aspect mask for a barrier on an image of `format` entering `new_layout`.
pub fn barrier_aspect(format: vk::Format, new_layout: vk::ImageLayout) -> vk::ImageAspectFlags {
    if new_layout == vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL {
        if has_stencil(format) {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        } else {
            vk::ImageAspectFlags::DEPTH
        }
    } else {
        vk::ImageAspectFlags::COLOR
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransitionMasks {
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
    pub src_stage: vk::PipelineStageFlags,
    pub dst_stage: vk::PipelineStageFlags,
}

/// Access and stage masks for the supported layout transitions.
pub fn layout_transition_masks(
    old: vk::ImageLayout,
    new: vk::ImageLayout,
) -> Result<TransitionMasks, FatalError> {
    use vk::ImageLayout as L;
    match (old, new) {
        (L::UNDEFINED, L::TRANSFER_DST_OPTIMAL) => Ok(TransitionMasks {
            src_access: vk::AccessFlags::empty(),
            dst_access: vk::AccessFlags::TRANSFER_WRITE,
            src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
            dst_stage: vk::PipelineStageFlags::TRANSFER,
        }),
        (L::TRANSFER_DST_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL) => Ok(TransitionMasks {
            src_access: vk::AccessFlags::TRANSFER_WRITE,
            dst_access: vk::AccessFlags::SHADER_READ,
            src_stage: vk::PipelineStageFlags::TRANSFER,
            dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
        }),
        (L::UNDEFINED, L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL) => Ok(TransitionMasks {
            src_access: vk::AccessFlags::empty(),
            dst_access: vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
            dst_stage: vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
        }),
        _ => Err(FatalError::UnsupportedLayoutTransition {
            from: format!("{old:?}"),
            to: format!("{new:?}"),
        }),
    }
}

/// Transient pool plus queue for blocking one-time submissions.
pub struct OneShot<'a> {
    pub device: &'a ash::Device,
    pub queue: vk::Queue,
    pub pool: vk::CommandPool,
}

impl OneShot<'_> {
    /// Records with `record`, submits, waits for the queue to idle, frees.
    pub unsafe fn run<F>(&self, record: F) -> Result<(), FatalError>
    where
        F: FnOnce(vk::CommandBuffer) -> Result<(), FatalError>,
    {
        let d = self.device;
        let ai = vk::CommandBufferAllocateInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
            command_pool: self.pool,
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: 1,
            ..Default::default()
        };
        let cmd = d
            .allocate_command_buffers(&ai)
            .vk_call("vkAllocateCommandBuffers")?[0];

        let submitted = (|| -> Result<(), FatalError> {
            let bi = vk::CommandBufferBeginInfo {
                s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
                flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
                ..Default::default()
            };
            d.begin_command_buffer(cmd, &bi).vk_call("vkBeginCommandBuffer")?;
            record(cmd)?;
            d.end_command_buffer(cmd).vk_call("vkEndCommandBuffer")?;

            let si = vk::SubmitInfo {
                s_type: vk::StructureType::SUBMIT_INFO,
                command_buffer_count: 1,
                p_command_buffers: &cmd,
                ..Default::default()
            };
            d.queue_submit(self.queue, std::slice::from_ref(&si), vk::Fence::null())
                .vk_call("vkQueueSubmit")?;
            d.queue_wait_idle(self.queue).vk_call("vkQueueWaitIdle")
        })();

        d.free_command_buffers(self.pool, std::slice::from_ref(&cmd));
        submitted
    }

    /// Host bytes -> staging buffer -> device-local `dst`.
    pub unsafe fn upload_buffer(
        &self,
        mem_props: &vk::PhysicalDeviceMemoryProperties,
        dst: vk::Buffer,
        bytes: &[u8],
    ) -> Result<(), FatalError> {
        let size = bytes.len() as vk::DeviceSize;
        let staging =
            GpuBuffer::host_visible(self.device, mem_props, size, vk::BufferUsageFlags::TRANSFER_SRC)?;
        let result = staging.write(self.device, bytes).and_then(|()| {
            self.run(|cmd| {
                let region = vk::BufferCopy {
                    src_offset: 0,
                    dst_offset: 0,
                    size,
                };
                self.device
                    .cmd_copy_buffer(cmd, staging.buffer, dst, std::slice::from_ref(&region));
                Ok(())
            })
        });
        staging.destroy(self.device);
        result
    }

    /// Creates a device-local buffer with `usage | TRANSFER_DST` holding `bytes`.
    pub unsafe fn device_local_buffer(
        &self,
        mem_props: &vk::PhysicalDeviceMemoryProperties,
        usage: vk::BufferUsageFlags,
        bytes: &[u8],
    ) -> Result<GpuBuffer, FatalError> {
        let buf = GpuBuffer::new(
            self.device,
            mem_props,
            bytes.len() as vk::DeviceSize,
            usage | vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;
        if let Err(e) = self.upload_buffer(mem_props, buf.buffer, bytes) {
            buf.destroy(self.device);
            return Err(e);
        }
        Ok(buf)
    }

    pub unsafe fn transition_layout(
        &self,
        image: vk::Image,
        format: vk::Format,
        old: vk::ImageLayout,
        new: vk::ImageLayout,
    ) -> Result<(), FatalError> {
        let masks = layout_transition_masks(old, new)?;
        self.run(|cmd| {
            let barrier = vk::ImageMemoryBarrier {
                s_type: vk::StructureType::IMAGE_MEMORY_BARRIER,
                src_access_mask: masks.src_access,
                dst_access_mask: masks.dst_access,
                old_layout: old,
                new_layout: new,
                src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
                dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
                image,
                subresource_range: subresource(barrier_aspect(format, new)),
                ..Default::default()
            };
            self.device.cmd_pipeline_barrier(
                cmd,
                masks.src_stage,
                masks.dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                std::slice::from_ref(&barrier),
            );
            Ok(())
        })
    }

    pub unsafe fn copy_buffer_to_image(
        &self,
        buffer: vk::Buffer,
        image: vk::Image,
        extent: vk::Extent2D,
    ) -> Result<(), FatalError> {
        self.run(|cmd| {
            let region = vk::BufferImageCopy {
                buffer_offset: 0,
                buffer_row_length: 0,
                buffer_image_height: 0,
                image_subresource: vk::ImageSubresourceLayers {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    mip_level: 0,
                    base_array_layer: 0,
                    layer_count: 1,
                },
                image_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
                image_extent: vk::Extent3D {
                    width: extent.width,
                    height: extent.height,
                    depth: 1,
                },
            };
            self.device.cmd_copy_buffer_to_image(
                cmd,
                buffer,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                std::slice::from_ref(&region),
            );
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mem_props(types: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: types.len() as u32,
            ..Default::default()
        };
        for (i, &flags) in types.iter().enumerate() {
            props.memory_types[i] = vk::MemoryType {
                property_flags: flags,
                heap_index: 0,
            };
        }
        props
    }

    #[test]
    fn memory_type_honours_bits_and_flags() {
        let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        let props = mem_props(&[vk::MemoryPropertyFlags::DEVICE_LOCAL, host, host]);

        assert_eq!(find_memory_type(&props, 0b111, host).unwrap(), 1);
        assert_eq!(find_memory_type(&props, 0b100, host).unwrap(), 2);
        assert_eq!(
            find_memory_type(&props, 0b111, vk::MemoryPropertyFlags::DEVICE_LOCAL).unwrap(),
            0
        );
    }

    #[test]
    fn memory_type_failure_is_fatal() {
        let props = mem_props(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);
        let err = find_memory_type(&props, 0b1, vk::MemoryPropertyFlags::HOST_VISIBLE).unwrap_err();
        assert!(matches!(err, FatalError::NoSuitableMemoryType { type_bits: 1, .. }));
    }

    #[test]
    fn supported_transitions() {
        use vk::ImageLayout as L;
        let up = layout_transition_masks(L::UNDEFINED, L::TRANSFER_DST_OPTIMAL).unwrap();
        assert_eq!(up.dst_stage, vk::PipelineStageFlags::TRANSFER);

        let read = layout_transition_masks(L::TRANSFER_DST_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL).unwrap();
        assert_eq!(read.src_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(read.dst_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);

        let depth = layout_transition_masks(L::UNDEFINED, L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL).unwrap();
        assert_eq!(depth.dst_stage, vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS);
    }

    #[test]
    fn unsupported_transition_is_fatal() {
        let err = layout_transition_masks(
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )
        .unwrap_err();
        assert!(matches!(err, FatalError::UnsupportedLayoutTransition { .. }));
    }

    #[test]
    fn depth_aspect_includes_stencil_when_present() {
        let l = vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL;
        assert_eq!(barrier_aspect(vk::Format::D32_SFLOAT, l), vk::ImageAspectFlags::DEPTH);
        assert_eq!(
            barrier_aspect(vk::Format::D24_UNORM_S8_UINT, l),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
        assert_eq!(
            barrier_aspect(vk::Format::R8G8B8A8_UNORM, vk::ImageLayout::TRANSFER_DST_OPTIMAL),
            vk::ImageAspectFlags::COLOR
        );
    }
}
