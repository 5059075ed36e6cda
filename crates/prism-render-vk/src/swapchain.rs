// SPDX-License-Identifier: CEPL-1.0
//! Presentable image chain, per-image views and the shared depth buffer.

use crate::context::{DeviceContext, QueueFamilies};
use crate::error::VkResultExt;
use crate::memory::{create_image_view, has_stencil, GpuImage, OneShot};
use ash::vk;
use prism_render::{FatalError, RenderSize};
use tracing::info;

pub const PREFERRED_SURFACE_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_UNORM,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

pub const DEPTH_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// BGRA8 + sRGB-nonlinear when offered (or when the surface has no
/// preference), otherwise the first format reported.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    match formats {
        [] => PREFERRED_SURFACE_FORMAT,
        [only] if only.format == vk::Format::UNDEFINED => PREFERRED_SURFACE_FORMAT,
        _ => formats
            .iter()
            .copied()
            .find(|f| {
                f.format == PREFERRED_SURFACE_FORMAT.format
                    && f.color_space == PREFERRED_SURFACE_FORMAT.color_space
            })
            .unwrap_or(formats[0]),
    }
}

/// Mailbox > Immediate > FIFO.
pub fn choose_present_mode(modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE]
        .into_iter()
        .find(|m| modes.contains(m))
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// One more than the minimum, capped by the maximum (0 means no cap).
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let want = caps.min_image_count + 1;
    if caps.max_image_count > 0 {
        want.min(caps.max_image_count)
    } else {
        want
    }
}

pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, window: RenderSize) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        caps.current_extent
    } else {
        vk::Extent2D {
            width: window
                .width
                .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: window
                .height
                .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }
}

/// Concurrent across both families when they differ.
pub fn sharing_mode(families: QueueFamilies) -> (vk::SharingMode, Vec<u32>) {
    if families.is_shared() {
        (vk::SharingMode::EXCLUSIVE, Vec::new())
    } else {
        (
            vk::SharingMode::CONCURRENT,
            vec![families.graphics, families.present],
        )
    }
}

/// First candidate usable as an optimal-tiling depth/stencil attachment.
pub fn choose_depth_format(
    mut props: impl FnMut(vk::Format) -> vk::FormatProperties,
) -> Result<vk::Format, FatalError> {
    DEPTH_CANDIDATES
        .into_iter()
        .find(|&f| {
            props(f)
                .optimal_tiling_features
                .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
        })
        .ok_or(FatalError::NoSupportedDepthFormat)
}

pub unsafe fn pick_depth_format(ctx: &DeviceContext) -> Result<vk::Format, FatalError> {
    let format = choose_depth_format(|f| {
        ctx.instance
            .get_physical_device_format_properties(ctx.phys, f)
    })?;
    info!(target: "prism::swapchain", ?format, stencil = has_stencil(format), "depth format");
    Ok(format)
}

pub struct SwapchainState {
    pub swapchain: vk::SwapchainKHR,
    pub format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub images: Vec<vk::Image>,
    pub views: Vec<vk::ImageView>,
    pub depth: GpuImage,
}

impl Default for SwapchainState {
    fn default() -> Self {
        Self {
            swapchain: vk::SwapchainKHR::null(),
            format: PREFERRED_SURFACE_FORMAT,
            present_mode: vk::PresentModeKHR::FIFO,
            extent: vk::Extent2D::default(),
            images: Vec::new(),
            views: Vec::new(),
            depth: GpuImage::default(),
        }
    }
}

impl SwapchainState {
    /// Builds the chain, its views and a depth buffer of the same extent.
    /// On failure everything created here is released.
    pub unsafe fn create(
        ctx: &DeviceContext,
        one_shot: &OneShot<'_>,
        window: RenderSize,
        depth_format: vk::Format,
    ) -> Result<Self, FatalError> {
        let mut state = Self::default();
        match state.build(ctx, one_shot, window, depth_format) {
            Ok(()) => Ok(state),
            Err(e) => {
                state.destroy_depth(&ctx.device);
                state.destroy_views(&ctx.device);
                state.destroy_swapchain(ctx);
                Err(e)
            }
        }
    }

    unsafe fn build(
        &mut self,
        ctx: &DeviceContext,
        one_shot: &OneShot<'_>,
        window: RenderSize,
        depth_format: vk::Format,
    ) -> Result<(), FatalError> {
        let sl = &ctx.surface_loader;
        let caps = sl
            .get_physical_device_surface_capabilities(ctx.phys, ctx.surface)
            .vk_call("vkGetPhysicalDeviceSurfaceCapabilitiesKHR")?;
        let formats = sl
            .get_physical_device_surface_formats(ctx.phys, ctx.surface)
            .vk_call("vkGetPhysicalDeviceSurfaceFormatsKHR")?;
        let modes = sl
            .get_physical_device_surface_present_modes(ctx.phys, ctx.surface)
            .vk_call("vkGetPhysicalDeviceSurfacePresentModesKHR")?;

        self.format = choose_surface_format(&formats);
        self.present_mode = choose_present_mode(&modes);
        self.extent = choose_extent(&caps, window);
        let image_count = choose_image_count(&caps);
        let (sharing, family_indices) = sharing_mode(ctx.families);

        info!(
            target: "prism::swapchain",
            format = ?self.format.format,
            color_space = ?self.format.color_space,
            present_mode = ?self.present_mode,
            width = self.extent.width,
            height = self.extent.height,
            image_count,
            ?sharing,
            "creating swapchain"
        );

        let swap_info = vk::SwapchainCreateInfoKHR {
            s_type: vk::StructureType::SWAPCHAIN_CREATE_INFO_KHR,
            surface: ctx.surface,
            min_image_count: image_count,
            image_format: self.format.format,
            image_color_space: self.format.color_space,
            image_extent: self.extent,
            image_array_layers: 1,
            image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            image_sharing_mode: sharing,
            queue_family_index_count: family_indices.len() as u32,
            p_queue_family_indices: family_indices.as_ptr(),
            pre_transform: caps.current_transform,
            composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            present_mode: self.present_mode,
            clipped: vk::TRUE,
            old_swapchain: vk::SwapchainKHR::null(),
            ..Default::default()
        };

        self.swapchain = ctx
            .swapchain_loader
            .create_swapchain(&swap_info, None)
            .vk_call("vkCreateSwapchainKHR")?;
        self.images = ctx
            .swapchain_loader
            .get_swapchain_images(self.swapchain)
            .vk_call("vkGetSwapchainImagesKHR")?;

        for &image in &self.images {
            let view = create_image_view(
                &ctx.device,
                image,
                self.format.format,
                vk::ImageAspectFlags::COLOR,
            )?;
            self.views.push(view);
        }

        self.depth = GpuImage::new(
            &ctx.device,
            &ctx.memory_properties,
            self.extent,
            depth_format,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            vk::ImageAspectFlags::DEPTH,
        )?;
        one_shot.transition_layout(
            self.depth.image,
            depth_format,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        )?;
        Ok(())
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn render_size(&self) -> RenderSize {
        RenderSize::new(self.extent.width, self.extent.height)
    }

    pub unsafe fn destroy_depth(&mut self, device: &ash::Device) {
        self.depth.destroy(device);
    }

    pub unsafe fn destroy_views(&mut self, device: &ash::Device) {
        for view in self.views.drain(..) {
            device.destroy_image_view(view, None);
        }
    }

    /// Images belong to the presentation engine and go with the swapchain.
    pub unsafe fn destroy_swapchain(&mut self, ctx: &DeviceContext) {
        if self.swapchain != vk::SwapchainKHR::null() {
            ctx.swapchain_loader.destroy_swapchain(self.swapchain, None);
            self.swapchain = vk::SwapchainKHR::null();
        }
        self.images.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(min: u32, max: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            ..Default::default()
        }
    }

    #[test]
    fn present_mode_priority() {
        use vk::PresentModeKHR as P;
        assert_eq!(choose_present_mode(&[P::FIFO, P::IMMEDIATE, P::MAILBOX]), P::MAILBOX);
        assert_eq!(choose_present_mode(&[P::FIFO, P::IMMEDIATE]), P::IMMEDIATE);
        assert_eq!(choose_present_mode(&[P::FIFO_RELAXED, P::FIFO]), P::FIFO);
        assert_eq!(choose_present_mode(&[P::FIFO]), P::FIFO);
    }

    fn same(a: vk::SurfaceFormatKHR, b: vk::SurfaceFormatKHR) -> bool {
        a.format == b.format && a.color_space == b.color_space
    }

    #[test]
    fn single_undefined_format_maps_to_preferred() {
        let undefined = vk::SurfaceFormatKHR {
            format: vk::Format::UNDEFINED,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        assert!(same(choose_surface_format(&[undefined]), PREFERRED_SURFACE_FORMAT));
    }

    #[test]
    fn surface_format_prefers_bgra_then_first() {
        let rgba = vk::SurfaceFormatKHR {
            format: vk::Format::R8G8B8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        let bgra_srgb = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_SRGB,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        assert!(same(
            choose_surface_format(&[rgba, PREFERRED_SURFACE_FORMAT]),
            PREFERRED_SURFACE_FORMAT
        ));
        assert!(same(choose_surface_format(&[bgra_srgb, rgba]), bgra_srgb));
    }

    #[test]
    fn image_count_is_min_plus_one_capped() {
        assert_eq!(choose_image_count(&caps(2, 0)), 3);
        assert_eq!(choose_image_count(&caps(2, 2)), 2);
        assert_eq!(choose_image_count(&caps(2, 8)), 3);
    }

    #[test]
    fn extent_uses_current_when_defined() {
        let c = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 1280,
                height: 720,
            },
            ..Default::default()
        };
        let e = choose_extent(&c, RenderSize::new(1920, 1080));
        assert_eq!((e.width, e.height), (1280, 720));
    }

    #[test]
    fn extent_clamps_window_size_when_undefined() {
        let c = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 100,
                height: 100,
            },
            max_image_extent: vk::Extent2D {
                width: 1000,
                height: 1000,
            },
            ..Default::default()
        };
        let e = choose_extent(&c, RenderSize::new(50, 4000));
        assert_eq!((e.width, e.height), (100, 1000));
    }

    #[test]
    fn sharing_depends_on_families() {
        let same = QueueFamilies {
            graphics: 0,
            present: 0,
        };
        assert_eq!(sharing_mode(same), (vk::SharingMode::EXCLUSIVE, vec![]));
        let split = QueueFamilies {
            graphics: 0,
            present: 2,
        };
        assert_eq!(sharing_mode(split), (vk::SharingMode::CONCURRENT, vec![0, 2]));
    }

    fn supports(ok: Vec<vk::Format>) -> impl FnMut(vk::Format) -> vk::FormatProperties {
        move |f| vk::FormatProperties {
            optimal_tiling_features: if ok.contains(&f) {
                vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT
            } else {
                vk::FormatFeatureFlags::empty()
            },
            ..Default::default()
        }
    }

    #[test]
    fn depth_format_follows_priority() {
        let both = vec![vk::Format::D24_UNORM_S8_UINT, vk::Format::D32_SFLOAT];
        assert_eq!(choose_depth_format(supports(both)).unwrap(), vk::Format::D32_SFLOAT);
        assert_eq!(
            choose_depth_format(supports(vec![vk::Format::D24_UNORM_S8_UINT])).unwrap(),
            vk::Format::D24_UNORM_S8_UINT
        );
        assert!(matches!(
            choose_depth_format(supports(Vec::new())),
            Err(FatalError::NoSupportedDepthFormat)
        ));
    }

    #[test]
    fn depth_format_ignores_linear_tiling() {
        let linear_only = |_: vk::Format| vk::FormatProperties {
            linear_tiling_features: vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            ..Default::default()
        };
        assert!(choose_depth_format(linear_only).is_err());
    }
}
