// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use prism_render::FatalError;

/// Names the failing entry point when a raw `vk::Result` becomes fatal.
pub(crate) trait VkResultExt<T> {
    fn vk_call(self, call: &'static str) -> Result<T, FatalError>;
}

impl<T> VkResultExt<T> for Result<T, vk::Result> {
    fn vk_call(self, call: &'static str) -> Result<T, FatalError> {
        self.map_err(|r| api_error(call, r))
    }
}

pub(crate) fn api_error(call: &'static str, result: vk::Result) -> FatalError {
    FatalError::Api {
        call,
        result: format!("{result:?}"),
    }
}
