// SPDX-License-Identifier: CEPL-1.0
use crate::scene::ObjectId;
use thiserror::Error;

/// Conditions that abort initialization or the frame loop.
#[derive(Debug, Error)]
pub enum FatalError {
    #[error("no physical device satisfies the renderer requirements")]
    NoSuitableDevice,
    #[error("no depth format usable as an optimal-tiling depth attachment")]
    NoSupportedDepthFormat,
    #[error("no memory type in bits {type_bits:#x} with properties {properties}")]
    NoSuitableMemoryType { type_bits: u32, properties: String },
    #[error("unsupported image layout transition {from} -> {to}")]
    UnsupportedLayoutTransition { from: String, to: String },
    #[error("invalid shader bytecode: {0}")]
    InvalidShader(String),
    #[error("graphics pipeline creation failed: {0}")]
    PipelineCreation(String),
    #[error("object {id}: {reason}")]
    InvalidMesh { id: ObjectId, reason: &'static str },
    #[error("object {0} provisioned twice")]
    DuplicateObject(ObjectId),
    #[error("texture {width}x{height} needs {expected} bytes, got {actual}")]
    InvalidTexture {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
    #[error("window handle unavailable: {0}")]
    WindowHandle(String),
    #[error("cannot build a swapchain for an empty drawable area")]
    EmptySurface,
    #[error("{call} failed: {result}")]
    Api { call: &'static str, result: String },
    #[error("renderer initialization task could not start: {0}")]
    InitTaskSpawn(String),
    #[error("renderer initialization task panicked")]
    InitTaskPanicked,
}

/// Result of the two presentation-engine calls that may report staleness.
///
/// Only acquire and present produce `SwapchainStale`; the frame executor
/// consumes it and never lets it escape.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    Fatal(#[from] FatalError),
    #[error("swapchain is out of date or suboptimal")]
    SwapchainStale,
}
