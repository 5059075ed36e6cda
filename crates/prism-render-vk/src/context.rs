// SPDX-License-Identifier: CEPL-1.0
//! Instance, validation messenger, physical-device choice, logical device and
//! the graphics/present queues. The physical device and queue families are
//! chosen once and never change.

use crate::error::{api_error, VkResultExt};
use crate::features::DeviceFeatures;
use ash::ext::debug_utils as ext_debug;
use ash::khr::{surface, swapchain};
use ash::{vk, Entry, Instance};
use prism_render::FatalError;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use std::ffi::{c_char, c_void, CStr, CString};
use tracing::{debug, error, info, trace, warn};

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

#[derive(Clone, Debug)]
pub struct ContextConfig {
    pub app_name: String,
    pub validation: bool,
    pub device_extensions: Vec<&'static CStr>,
    pub required_features: DeviceFeatures,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            app_name: "prism".to_owned(),
            validation: cfg!(debug_assertions),
            device_extensions: vec![swapchain::NAME],
            required_features: DeviceFeatures::SAMPLER_ANISOTROPY,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilies {
    pub fn is_shared(&self) -> bool {
        self.graphics == self.present
    }

    /// Distinct family indices, graphics first.
    pub fn unique(&self) -> Vec<u32> {
        if self.is_shared() {
            vec![self.graphics]
        } else {
            vec![self.graphics, self.present]
        }
    }
}

/// What device selection needs to know about one physical device.
#[derive(Clone, Debug)]
pub struct DeviceCandidate {
    pub name: String,
    pub device_type: vk::PhysicalDeviceType,
    pub missing_extensions: Vec<String>,
    pub missing_features: DeviceFeatures,
    pub graphics_family: Option<u32>,
    pub present_family: Option<u32>,
}

impl DeviceCandidate {
    pub fn is_suitable(&self) -> bool {
        self.missing_extensions.is_empty()
            && self.missing_features.is_empty()
            && self.graphics_family.is_some()
            && self.present_family.is_some()
    }

    pub fn families(&self) -> Option<QueueFamilies> {
        Some(QueueFamilies {
            graphics: self.graphics_family?,
            present: self.present_family?,
        })
    }
}

/// First suitable discrete GPU, else the first suitable device.
pub fn pick_device(candidates: &[DeviceCandidate]) -> Option<usize> {
    let suitable = || candidates.iter().enumerate().filter(|(_, c)| c.is_suitable());
    suitable()
        .find(|(_, c)| c.device_type == vk::PhysicalDeviceType::DISCRETE_GPU)
        .or_else(|| suitable().next())
        .map(|(i, _)| i)
}

/// First graphics-capable family and first family able to present.
pub fn find_queue_families(
    families: &[vk::QueueFamilyProperties],
    mut can_present: impl FnMut(u32) -> bool,
) -> (Option<u32>, Option<u32>) {
    let graphics = families
        .iter()
        .position(|q| q.queue_count > 0 && q.queue_flags.contains(vk::QueueFlags::GRAPHICS))
        .map(|i| i as u32);
    let present = (0..families.len() as u32).find(|&i| families[i as usize].queue_count > 0 && can_present(i));
    (graphics, present)
}

pub struct DeviceContext {
    pub entry: Entry,
    pub instance: Instance,
    debug: Option<(ext_debug::Instance, vk::DebugUtilsMessengerEXT)>,
    pub surface_loader: surface::Instance,
    pub surface: vk::SurfaceKHR,
    pub phys: vk::PhysicalDevice,
    pub device: ash::Device,
    pub swapchain_loader: swapchain::Device,
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
    pub families: QueueFamilies,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub limits: vk::PhysicalDeviceLimits,
}

unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user: *mut c_void,
) -> vk::Bool32 {
    if data.is_null() || (*data).p_message.is_null() {
        return vk::FALSE;
    }
    let msg = CStr::from_ptr((*data).p_message).to_string_lossy();
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        error!(target: "prism::validation", ?types, "{msg}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        warn!(target: "prism::validation", ?types, "{msg}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        info!(target: "prism::validation", ?types, "{msg}");
    } else {
        trace!(target: "prism::validation", ?types, "{msg}");
    }
    // Observational only.
    vk::FALSE
}

unsafe fn create_debug_messenger(
    entry: &Entry,
    instance: &Instance,
) -> Result<(ext_debug::Instance, vk::DebugUtilsMessengerEXT), FatalError> {
    let loader = ext_debug::Instance::new(entry, instance);
    let ci = vk::DebugUtilsMessengerCreateInfoEXT {
        s_type: vk::StructureType::DEBUG_UTILS_MESSENGER_CREATE_INFO_EXT,
        message_severity: vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
            | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
            | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
            | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        message_type: vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
            | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
            | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        pfn_user_callback: Some(debug_callback),
        ..Default::default()
    };
    let messenger = loader
        .create_debug_utils_messenger(&ci, None)
        .vk_call("vkCreateDebugUtilsMessengerEXT")?;
    Ok((loader, messenger))
}

unsafe fn create_instance(
    entry: &Entry,
    cfg: &ContextConfig,
    mut extensions: Vec<*const c_char>,
) -> Result<(Instance, bool), FatalError> {
    let app = CString::new(cfg.app_name.as_str()).unwrap_or_else(|_| c"prism".to_owned());

    let app_info = vk::ApplicationInfo {
        s_type: vk::StructureType::APPLICATION_INFO,
        p_application_name: app.as_ptr(),
        application_version: vk::make_api_version(0, 0, 1, 0),
        p_engine_name: c"prism".as_ptr(),
        engine_version: vk::make_api_version(0, 0, 1, 0),
        api_version: vk::API_VERSION_1_0,
        ..Default::default()
    };

    // Validation is best-effort: missing layer means no messenger.
    let validation = cfg.validation && {
        let layers = entry
            .enumerate_instance_layer_properties()
            .unwrap_or_default();
        let found = layers
            .iter()
            .any(|l| CStr::from_ptr(l.layer_name.as_ptr()) == VALIDATION_LAYER);
        if !found {
            warn!(target: "prism::context", "validation requested but {VALIDATION_LAYER:?} is not installed");
        }
        found
    };

    let layer_ptrs: Vec<*const c_char> = if validation {
        extensions.push(ext_debug::NAME.as_ptr());
        vec![VALIDATION_LAYER.as_ptr()]
    } else {
        Vec::new()
    };

    let create_info = vk::InstanceCreateInfo {
        s_type: vk::StructureType::INSTANCE_CREATE_INFO,
        p_application_info: &app_info,
        enabled_extension_count: extensions.len() as u32,
        pp_enabled_extension_names: extensions.as_ptr(),
        enabled_layer_count: layer_ptrs.len() as u32,
        pp_enabled_layer_names: layer_ptrs.as_ptr(),
        ..Default::default()
    };

    let instance = entry
        .create_instance(&create_info, None)
        .vk_call("vkCreateInstance")?;
    Ok((instance, validation))
}

unsafe fn describe_candidate(
    instance: &Instance,
    surface_loader: &surface::Instance,
    surface: vk::SurfaceKHR,
    phys: vk::PhysicalDevice,
    cfg: &ContextConfig,
) -> Result<DeviceCandidate, FatalError> {
    let props = instance.get_physical_device_properties(phys);
    let name = CStr::from_ptr(props.device_name.as_ptr())
        .to_string_lossy()
        .into_owned();

    let available = instance
        .enumerate_device_extension_properties(phys)
        .vk_call("vkEnumerateDeviceExtensionProperties")?;
    let missing_extensions = cfg
        .device_extensions
        .iter()
        .filter(|want| {
            !available
                .iter()
                .any(|e| CStr::from_ptr(e.extension_name.as_ptr()) == **want)
        })
        .map(|want| want.to_string_lossy().into_owned())
        .collect();

    let have = DeviceFeatures::supported_by(&instance.get_physical_device_features(phys));
    let missing_features = cfg.required_features - have;

    let qprops = instance.get_physical_device_queue_family_properties(phys);
    let (graphics_family, present_family) = find_queue_families(&qprops, |i| {
        surface_loader
            .get_physical_device_surface_support(phys, i, surface)
            .unwrap_or(false)
    });

    Ok(DeviceCandidate {
        name,
        device_type: props.device_type,
        missing_extensions,
        missing_features,
        graphics_family,
        present_family,
    })
}

unsafe fn log_queue_families(instance: &Instance, phys: vk::PhysicalDevice) {
    for (i, q) in instance
        .get_physical_device_queue_family_properties(phys)
        .iter()
        .enumerate()
    {
        debug!(target: "prism::context", family = i, count = q.queue_count, flags = ?q.queue_flags, "queue family");
    }
}

unsafe fn create_logical_device(
    instance: &Instance,
    phys: vk::PhysicalDevice,
    families: QueueFamilies,
    cfg: &ContextConfig,
) -> Result<ash::Device, FatalError> {
    let priorities = [1.0_f32];
    let queue_infos: Vec<_> = families
        .unique()
        .into_iter()
        .map(|family| vk::DeviceQueueCreateInfo {
            s_type: vk::StructureType::DEVICE_QUEUE_CREATE_INFO,
            queue_family_index: family,
            queue_count: 1,
            p_queue_priorities: priorities.as_ptr(),
            ..Default::default()
        })
        .collect();

    let features = cfg.required_features.to_vk();
    let ext_ptrs: Vec<*const c_char> = cfg.device_extensions.iter().map(|e| e.as_ptr()).collect();

    let dinfo = vk::DeviceCreateInfo {
        s_type: vk::StructureType::DEVICE_CREATE_INFO,
        queue_create_info_count: queue_infos.len() as u32,
        p_queue_create_infos: queue_infos.as_ptr(),
        enabled_extension_count: ext_ptrs.len() as u32,
        pp_enabled_extension_names: ext_ptrs.as_ptr(),
        p_enabled_features: &features,
        ..Default::default()
    };

    info!(
        target: "prism::context",
        extensions = ?cfg.device_extensions,
        features = ?cfg.required_features.names(),
        "creating logical device"
    );
    instance
        .create_device(phys, &dinfo, None)
        .vk_call("vkCreateDevice")
}

impl DeviceContext {
    /// Creates a context whose surface comes from a window.
    pub unsafe fn for_window(
        cfg: &ContextConfig,
        display: RawDisplayHandle,
        window: RawWindowHandle,
    ) -> Result<Self, FatalError> {
        let required = ash_window::enumerate_required_extensions(display)
            .vk_call("ash_window::enumerate_required_extensions")?;
        Self::new(cfg, required, |entry, instance| {
            ash_window::create_surface(entry, instance, display, window, None)
        })
    }

    // STRICT ORDER:
    // 1) instance (WSI + optional debug extension)
    // 2) messenger, then surface from THIS instance
    // 3) device selection tested against THIS surface
    // 4) logical device, queues, swapchain loader
    // Anything created before a failure is released before returning.
    pub unsafe fn new<F>(
        cfg: &ContextConfig,
        instance_extensions: &[*const c_char],
        surface_factory: F,
    ) -> Result<Self, FatalError>
    where
        F: FnOnce(&Entry, &Instance) -> Result<vk::SurfaceKHR, vk::Result>,
    {
        let entry = Entry::linked();
        let (instance, validation) = create_instance(&entry, cfg, instance_extensions.to_vec())?;

        let debug = if validation {
            match create_debug_messenger(&entry, &instance) {
                Ok(d) => Some(d),
                Err(e) => {
                    warn!(target: "prism::context", "debug messenger unavailable: {e}");
                    None
                }
            }
        } else {
            None
        };

        let release_instance = |debug: Option<(ext_debug::Instance, vk::DebugUtilsMessengerEXT)>| {
            if let Some((loader, messenger)) = debug {
                loader.destroy_debug_utils_messenger(messenger, None);
            }
            instance.destroy_instance(None);
        };

        let surface_loader = surface::Instance::new(&entry, &instance);
        let surface = match surface_factory(&entry, &instance) {
            Ok(s) => s,
            Err(r) => {
                release_instance(debug);
                return Err(api_error("vkCreateSurfaceKHR", r));
            }
        };

        let selected = Self::select_physical_device(&instance, &surface_loader, surface, cfg);
        let (phys, families) = match selected {
            Ok(v) => v,
            Err(e) => {
                surface_loader.destroy_surface(surface, None);
                release_instance(debug);
                return Err(e);
            }
        };
        log_queue_families(&instance, phys);

        let device = match create_logical_device(&instance, phys, families, cfg) {
            Ok(d) => d,
            Err(e) => {
                surface_loader.destroy_surface(surface, None);
                release_instance(debug);
                return Err(e);
            }
        };

        let graphics_queue = device.get_device_queue(families.graphics, 0);
        let present_queue = device.get_device_queue(families.present, 0);
        let swapchain_loader = swapchain::Device::new(&instance, &device);
        let memory_properties = instance.get_physical_device_memory_properties(phys);
        let limits = instance.get_physical_device_properties(phys).limits;

        Ok(Self {
            entry,
            instance,
            debug,
            surface_loader,
            surface,
            phys,
            device,
            swapchain_loader,
            graphics_queue,
            present_queue,
            families,
            memory_properties,
            limits,
        })
    }

    unsafe fn select_physical_device(
        instance: &Instance,
        surface_loader: &surface::Instance,
        surface: vk::SurfaceKHR,
        cfg: &ContextConfig,
    ) -> Result<(vk::PhysicalDevice, QueueFamilies), FatalError> {
        let devices = instance
            .enumerate_physical_devices()
            .vk_call("vkEnumeratePhysicalDevices")?;
        let mut candidates = Vec::with_capacity(devices.len());
        for &phys in &devices {
            let c = describe_candidate(instance, surface_loader, surface, phys, cfg)?;
            info!(
                target: "prism::context",
                name = %c.name,
                kind = ?c.device_type,
                suitable = c.is_suitable(),
                "physical device"
            );
            if !c.is_suitable() {
                debug!(
                    target: "prism::context",
                    name = %c.name,
                    missing_extensions = ?c.missing_extensions,
                    missing_features = ?c.missing_features.names(),
                    graphics = ?c.graphics_family,
                    present = ?c.present_family,
                    "rejected"
                );
            }
            candidates.push(c);
        }

        let index = pick_device(&candidates).ok_or(FatalError::NoSuitableDevice)?;
        let chosen = &candidates[index];
        let families = chosen.families().ok_or(FatalError::NoSuitableDevice)?;
        info!(
            target: "prism::context",
            name = %chosen.name,
            discrete = chosen.device_type == vk::PhysicalDeviceType::DISCRETE_GPU,
            graphics = families.graphics,
            present = families.present,
            "selected physical device"
        );
        Ok((devices[index], families))
    }

    pub fn max_sampler_anisotropy(&self) -> f32 {
        self.limits.max_sampler_anisotropy
    }

    pub unsafe fn wait_idle(&self) -> Result<(), FatalError> {
        self.device
            .device_wait_idle()
            .vk_call("vkDeviceWaitIdle")
    }

    pub(crate) unsafe fn destroy_device(&self) {
        self.device.destroy_device(None);
    }

    pub(crate) unsafe fn destroy_surface(&mut self) {
        if self.surface != vk::SurfaceKHR::null() {
            self.surface_loader.destroy_surface(self.surface, None);
            self.surface = vk::SurfaceKHR::null();
        }
    }

    pub(crate) unsafe fn destroy_debug_messenger(&mut self) {
        if let Some((loader, messenger)) = self.debug.take() {
            loader.destroy_debug_utils_messenger(messenger, None);
        }
    }

    pub(crate) unsafe fn destroy_instance(&self) {
        self.instance.destroy_instance(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(name: &str, kind: vk::PhysicalDeviceType) -> DeviceCandidate {
        DeviceCandidate {
            name: name.to_owned(),
            device_type: kind,
            missing_extensions: Vec::new(),
            missing_features: DeviceFeatures::empty(),
            graphics_family: Some(0),
            present_family: Some(0),
        }
    }

    #[test]
    fn prefers_discrete_gpu() {
        let cands = [
            candidate("igpu", vk::PhysicalDeviceType::INTEGRATED_GPU),
            candidate("dgpu", vk::PhysicalDeviceType::DISCRETE_GPU),
        ];
        assert_eq!(pick_device(&cands), Some(1));
    }

    #[test]
    fn falls_back_to_first_suitable() {
        let mut no_present = candidate("a", vk::PhysicalDeviceType::DISCRETE_GPU);
        no_present.present_family = None;
        let cands = [
            no_present,
            candidate("b", vk::PhysicalDeviceType::INTEGRATED_GPU),
            candidate("c", vk::PhysicalDeviceType::CPU),
        ];
        assert_eq!(pick_device(&cands), Some(1));
    }

    #[test]
    fn missing_feature_or_extension_rejects() {
        let mut no_aniso = candidate("a", vk::PhysicalDeviceType::DISCRETE_GPU);
        no_aniso.missing_features = DeviceFeatures::SAMPLER_ANISOTROPY;
        let mut no_swapchain = candidate("b", vk::PhysicalDeviceType::DISCRETE_GPU);
        no_swapchain.missing_extensions = vec!["VK_KHR_swapchain".into()];
        assert_eq!(pick_device(&[no_aniso, no_swapchain]), None);
        assert_eq!(pick_device(&[]), None);
    }

    #[test]
    fn queue_families_pick_first_match() {
        let fam = |flags| vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        };
        let props = [
            fam(vk::QueueFlags::TRANSFER),
            fam(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
            fam(vk::QueueFlags::GRAPHICS),
        ];
        let (g, p) = find_queue_families(&props, |i| i == 0 || i == 2);
        assert_eq!(g, Some(1));
        assert_eq!(p, Some(0));

        let families = QueueFamilies { graphics: 1, present: 0 };
        assert!(!families.is_shared());
        assert_eq!(families.unique(), vec![1, 0]);
    }
}
