// SPDX-License-Identifier: CEPL-1.0
//! Per-object GPU resources: vertex, index and uniform buffers plus a
//! descriptor set, provisioned once for every object present at init.

use crate::error::VkResultExt;
use crate::memory::{GpuBuffer, OneShot};
use crate::pipeline::{SAMPLER_BINDING, UNIFORM_BINDING};
use ash::vk;
use prism_render::{
    FatalError, IndexedDraw, ObjectId, RenderObject, ResourceTable, UniformPayload,
};
use tracing::{debug, info};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ObjectGpu {
    pub vertex: GpuBuffer,
    pub index: GpuBuffer,
    pub uniform: GpuBuffer,
    pub index_count: u32,
    pub set: vk::DescriptorSet,
}

impl IndexedDraw for ObjectGpu {
    fn index_count(&self) -> u32 {
        self.index_count
    }
}

impl ObjectGpu {
    unsafe fn destroy_buffers(&self, device: &ash::Device) {
        self.uniform.destroy(device);
        self.index.destroy(device);
        self.vertex.destroy(device);
    }
}

/// One uniform buffer and one sampler descriptor per object.
pub fn descriptor_pool_sizes(object_count: u32) -> ([vk::DescriptorPoolSize; 2], u32) {
    (
        [
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER,
                descriptor_count: object_count,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                descriptor_count: object_count,
            },
        ],
        object_count,
    )
}

#[derive(Debug, Default)]
pub struct ObjectResources {
    pub table: ResourceTable<ObjectGpu>,
    pub pool: vk::DescriptorPool,
}

impl ObjectResources {
    /// Uploads every mesh, allocates uniforms and writes both descriptors.
    ///
    /// Meshes are validated first, so a bad mesh fails before any GPU work.
    /// On error, everything created so far is released.
    pub unsafe fn provision(
        one_shot: &OneShot<'_>,
        mem_props: &vk::PhysicalDeviceMemoryProperties,
        set_layout: vk::DescriptorSetLayout,
        texture: vk::DescriptorImageInfo,
        objects: &[RenderObject],
    ) -> Result<Self, FatalError> {
        for object in objects {
            object.mesh.validate(object.id)?;
        }

        let mut out = Self {
            table: ResourceTable::with_capacity(objects.len()),
            pool: vk::DescriptorPool::null(),
        };
        match out.build(one_shot, mem_props, set_layout, texture, objects) {
            Ok(()) => {
                info!(target: "prism::resources", objects = out.table.len(), "object resources provisioned");
                Ok(out)
            }
            Err(e) => {
                out.destroy_buffers(one_shot.device);
                out.destroy_pool(one_shot.device);
                Err(e)
            }
        }
    }

    unsafe fn build(
        &mut self,
        one_shot: &OneShot<'_>,
        mem_props: &vk::PhysicalDeviceMemoryProperties,
        set_layout: vk::DescriptorSetLayout,
        texture: vk::DescriptorImageInfo,
        objects: &[RenderObject],
    ) -> Result<(), FatalError> {
        let device = one_shot.device;
        if objects.is_empty() {
            debug!(target: "prism::resources", "no objects, descriptor pool skipped");
            return Ok(());
        }

        let (sizes, max_sets) = descriptor_pool_sizes(objects.len() as u32);
        let pool_info = vk::DescriptorPoolCreateInfo {
            s_type: vk::StructureType::DESCRIPTOR_POOL_CREATE_INFO,
            max_sets,
            pool_size_count: sizes.len() as u32,
            p_pool_sizes: sizes.as_ptr(),
            ..Default::default()
        };
        self.pool = device
            .create_descriptor_pool(&pool_info, None)
            .vk_call("vkCreateDescriptorPool")?;

        let layouts = vec![set_layout; objects.len()];
        let alloc = vk::DescriptorSetAllocateInfo {
            s_type: vk::StructureType::DESCRIPTOR_SET_ALLOCATE_INFO,
            descriptor_pool: self.pool,
            descriptor_set_count: layouts.len() as u32,
            p_set_layouts: layouts.as_ptr(),
            ..Default::default()
        };
        let sets = device
            .allocate_descriptor_sets(&alloc)
            .vk_call("vkAllocateDescriptorSets")?;

        for (object, set) in objects.iter().zip(sets) {
            let mut entry = ObjectGpu {
                set,
                index_count: object.mesh.index_count(),
                ..Default::default()
            };
            if let Err(e) = provision_one(one_shot, mem_props, texture, object, &mut entry) {
                entry.destroy_buffers(device);
                return Err(e);
            }
            if let Err(e) = self.table.insert(object.id, entry) {
                entry.destroy_buffers(device);
                return Err(e);
            }
            debug!(
                target: "prism::resources",
                id = %object.id,
                vertices = object.mesh.vertices.len(),
                indices = entry.index_count,
                "object provisioned"
            );
        }
        Ok(())
    }

    /// Returns `false` if `id` has no entry.
    pub unsafe fn write_uniform(
        &self,
        device: &ash::Device,
        id: ObjectId,
        payload: &UniformPayload,
    ) -> Result<bool, FatalError> {
        match self.table.get(id) {
            Some(entry) => {
                entry.uniform.write_pod(device, std::slice::from_ref(payload))?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Sets are freed with their pool.
    pub unsafe fn destroy_pool(&mut self, device: &ash::Device) {
        if self.pool != vk::DescriptorPool::null() {
            device.destroy_descriptor_pool(self.pool, None);
            self.pool = vk::DescriptorPool::null();
        }
    }

    pub unsafe fn destroy_buffers(&mut self, device: &ash::Device) {
        for (_, entry) in self.table.drain() {
            entry.destroy_buffers(device);
        }
    }
}

unsafe fn provision_one(
    one_shot: &OneShot<'_>,
    mem_props: &vk::PhysicalDeviceMemoryProperties,
    texture: vk::DescriptorImageInfo,
    object: &RenderObject,
    entry: &mut ObjectGpu,
) -> Result<(), FatalError> {
    let device = one_shot.device;
    entry.vertex = one_shot.device_local_buffer(
        mem_props,
        vk::BufferUsageFlags::VERTEX_BUFFER,
        object.mesh.vertex_bytes(),
    )?;
    entry.index = one_shot.device_local_buffer(
        mem_props,
        vk::BufferUsageFlags::INDEX_BUFFER,
        object.mesh.index_bytes(),
    )?;
    entry.uniform = GpuBuffer::host_visible(
        device,
        mem_props,
        UniformPayload::SIZE as vk::DeviceSize,
        vk::BufferUsageFlags::UNIFORM_BUFFER,
    )?;

    let buffer_info = vk::DescriptorBufferInfo {
        buffer: entry.uniform.buffer,
        offset: 0,
        range: UniformPayload::SIZE as vk::DeviceSize,
    };
    let writes = [
        vk::WriteDescriptorSet {
            s_type: vk::StructureType::WRITE_DESCRIPTOR_SET,
            dst_set: entry.set,
            dst_binding: UNIFORM_BINDING,
            dst_array_element: 0,
            descriptor_count: 1,
            descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
            p_buffer_info: &buffer_info,
            ..Default::default()
        },
        vk::WriteDescriptorSet {
            s_type: vk::StructureType::WRITE_DESCRIPTOR_SET,
            dst_set: entry.set,
            dst_binding: SAMPLER_BINDING,
            dst_array_element: 0,
            descriptor_count: 1,
            descriptor_type: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            p_image_info: &texture,
            ..Default::default()
        },
    ];
    device.update_descriptor_sets(&writes, &[]);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_sized_to_object_count() {
        let (sizes, max_sets) = descriptor_pool_sizes(7);
        assert_eq!(max_sets, 7);
        assert_eq!(sizes[0].ty, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(sizes[0].descriptor_count, 7);
        assert_eq!(sizes[1].ty, vk::DescriptorType::COMBINED_IMAGE_SAMPLER);
        assert_eq!(sizes[1].descriptor_count, 7);
    }

    #[test]
    fn entry_reports_its_index_count() {
        let entry = ObjectGpu {
            index_count: 36,
            ..Default::default()
        };
        assert_eq!(IndexedDraw::index_count(&entry), 36);
    }

    #[test]
    fn empty_resources_hold_no_handles() {
        let res = ObjectResources::default();
        assert!(res.table.is_empty());
        assert_eq!(res.pool, vk::DescriptorPool::null());
    }
}
