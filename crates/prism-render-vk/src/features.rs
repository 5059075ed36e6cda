// SPDX-License-Identifier: CEPL-1.0
//! Static table of core device features, used both to request features and
//! to report which ones a device lacks.

use ash::vk;
use bitflags::bitflags;

pub struct FeatureEntry {
    pub flag: DeviceFeatures,
    pub name: &'static str,
    pub get: fn(&vk::PhysicalDeviceFeatures) -> vk::Bool32,
    pub set: fn(&mut vk::PhysicalDeviceFeatures),
}

macro_rules! device_features {
    ($($flag:ident = $bit:literal => $field:ident, $name:literal;)*) => {
        bitflags! {
            #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
            pub struct DeviceFeatures: u64 {
                $(const $flag = 1 << $bit;)*
            }
        }

        pub const FEATURE_TABLE: &[FeatureEntry] = &[
            $(FeatureEntry {
                flag: DeviceFeatures::$flag,
                name: $name,
                get: |f| f.$field,
                set: |f| f.$field = vk::TRUE,
            },)*
        ];
    };
}

device_features! {
    ROBUST_BUFFER_ACCESS = 0 => robust_buffer_access, "robustBufferAccess";
    FULL_DRAW_INDEX_UINT32 = 1 => full_draw_index_uint32, "fullDrawIndexUint32";
    IMAGE_CUBE_ARRAY = 2 => image_cube_array, "imageCubeArray";
    INDEPENDENT_BLEND = 3 => independent_blend, "independentBlend";
    GEOMETRY_SHADER = 4 => geometry_shader, "geometryShader";
    TESSELLATION_SHADER = 5 => tessellation_shader, "tessellationShader";
    SAMPLE_RATE_SHADING = 6 => sample_rate_shading, "sampleRateShading";
    DUAL_SRC_BLEND = 7 => dual_src_blend, "dualSrcBlend";
    LOGIC_OP = 8 => logic_op, "logicOp";
    MULTI_DRAW_INDIRECT = 9 => multi_draw_indirect, "multiDrawIndirect";
    DEPTH_CLAMP = 10 => depth_clamp, "depthClamp";
    DEPTH_BIAS_CLAMP = 11 => depth_bias_clamp, "depthBiasClamp";
    FILL_MODE_NON_SOLID = 12 => fill_mode_non_solid, "fillModeNonSolid";
    DEPTH_BOUNDS = 13 => depth_bounds, "depthBounds";
    WIDE_LINES = 14 => wide_lines, "wideLines";
    LARGE_POINTS = 15 => large_points, "largePoints";
    MULTI_VIEWPORT = 16 => multi_viewport, "multiViewport";
    SAMPLER_ANISOTROPY = 17 => sampler_anisotropy, "samplerAnisotropy";
    TEXTURE_COMPRESSION_BC = 18 => texture_compression_bc, "textureCompressionBC";
    OCCLUSION_QUERY_PRECISE = 19 => occlusion_query_precise, "occlusionQueryPrecise";
    PIPELINE_STATISTICS_QUERY = 20 => pipeline_statistics_query, "pipelineStatisticsQuery";
    FRAGMENT_STORES_AND_ATOMICS = 21 => fragment_stores_and_atomics, "fragmentStoresAndAtomics";
    SHADER_INT64 = 22 => shader_int64, "shaderInt64";
}

impl DeviceFeatures {
    pub fn supported_by(features: &vk::PhysicalDeviceFeatures) -> Self {
        FEATURE_TABLE
            .iter()
            .filter(|e| (e.get)(features) == vk::TRUE)
            .fold(Self::empty(), |acc, e| acc | e.flag)
    }

    pub fn to_vk(self) -> vk::PhysicalDeviceFeatures {
        let mut out = vk::PhysicalDeviceFeatures::default();
        for e in FEATURE_TABLE.iter().filter(|e| self.contains(e.flag)) {
            (e.set)(&mut out);
        }
        out
    }

    pub fn names(self) -> Vec<&'static str> {
        FEATURE_TABLE
            .iter()
            .filter(|e| self.contains(e.flag))
            .map(|e| e.name)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_covers_every_flag_once() {
        let all = FEATURE_TABLE.iter().fold(DeviceFeatures::empty(), |acc, e| {
            assert!(!acc.contains(e.flag), "{} listed twice", e.name);
            acc | e.flag
        });
        assert_eq!(all, DeviceFeatures::all());
    }

    #[test]
    fn missing_features_are_detected() {
        let available = vk::PhysicalDeviceFeatures {
            geometry_shader: vk::TRUE,
            ..Default::default()
        };
        let have = DeviceFeatures::supported_by(&available);
        let want = DeviceFeatures::SAMPLER_ANISOTROPY | DeviceFeatures::GEOMETRY_SHADER;
        let missing = want - have;
        assert_eq!(missing, DeviceFeatures::SAMPLER_ANISOTROPY);
        assert_eq!(missing.names(), vec!["samplerAnisotropy"]);
    }

    #[test]
    fn to_vk_sets_only_requested_fields() {
        let f = DeviceFeatures::SAMPLER_ANISOTROPY.to_vk();
        assert_eq!(f.sampler_anisotropy, vk::TRUE);
        assert_eq!(f.geometry_shader, vk::FALSE);
        assert_eq!(DeviceFeatures::supported_by(&f), DeviceFeatures::SAMPLER_ANISOTROPY);
    }
}
