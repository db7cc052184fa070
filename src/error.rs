//! Error types for dyeflow.
//!
//! Everything here is a construction-time or tooling failure. The solver
//! itself has no runtime error class.

use std::fmt;

#[derive(Debug)]
pub enum FluidError {
    /// No compute adapter could be acquired.
    NoAdapter,
    /// The adapter lacks a feature or limit the kernels need.
    UnsupportedAdapter(String),
    /// Device creation failed.
    #[cfg(feature = "gpu")]
    DeviceCreation(wgpu::RequestDeviceError),
    /// Mapping a readback buffer failed.
    BufferMapping(String),
    /// A grid was used before it was allocated.
    MissingGrid(&'static str),
    /// Grids were allocated or dispatched before the kernel program was loaded.
    ProgramNotLoaded,
    /// The configuration cannot produce a usable simulator.
    InvalidConfig(String),
    Io(std::io::Error),
    Json(serde_json::Error),
    Image(image::ImageError),
}

impl fmt::Display for FluidError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FluidError::NoAdapter => write!(
                f,
                "No compatible GPU adapter found. Ensure your system has Vulkan/Metal/DX12 support."
            ),
            FluidError::UnsupportedAdapter(what) => {
                write!(f, "GPU adapter is missing required support: {}", what)
            }
            #[cfg(feature = "gpu")]
            FluidError::DeviceCreation(e) => write!(f, "Failed to create GPU device: {}", e),
            FluidError::BufferMapping(msg) => write!(f, "Failed to map readback buffer: {}", msg),
            FluidError::MissingGrid(name) => write!(f, "Grid '{}' was never allocated", name),
            FluidError::ProgramNotLoaded => {
                write!(f, "Kernel program must be loaded before grids are used")
            }
            FluidError::InvalidConfig(msg) => write!(f, "Invalid configuration: {}", msg),
            FluidError::Io(e) => write!(f, "I/O error: {}", e),
            FluidError::Json(e) => write!(f, "Failed to parse configuration: {}", e),
            FluidError::Image(e) => write!(f, "Failed to encode image: {}", e),
        }
    }
}

impl std::error::Error for FluidError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            #[cfg(feature = "gpu")]
            FluidError::DeviceCreation(e) => Some(e),
            FluidError::Io(e) => Some(e),
            FluidError::Json(e) => Some(e),
            FluidError::Image(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(feature = "gpu")]
impl From<wgpu::RequestDeviceError> for FluidError {
    fn from(e: wgpu::RequestDeviceError) -> Self {
        FluidError::DeviceCreation(e)
    }
}

impl From<std::io::Error> for FluidError {
    fn from(e: std::io::Error) -> Self {
        FluidError::Io(e)
    }
}

impl From<serde_json::Error> for FluidError {
    fn from(e: serde_json::Error) -> Self {
        FluidError::Json(e)
    }
}

impl From<image::ImageError> for FluidError {
    fn from(e: image::ImageError) -> Self {
        FluidError::Image(e)
    }
}
