//! Real-time stable-fluids dye simulation driven through a compute backend.

pub mod analysis;
pub mod backend;
pub mod config;
pub mod desktop;
pub mod error;
pub mod export;
pub mod grid;
pub mod injector;
pub mod kernels;
pub mod params;
pub mod pipeline;
pub mod render;
pub mod simulator;

#[cfg(feature = "cpu")]
pub mod cpu;

#[cfg(feature = "gpu")]
pub mod gpu;

// Feature-based backend selection
#[cfg(feature = "cpu")]
pub type DefaultBackend = cpu::CpuBackend;

#[cfg(all(feature = "gpu", not(feature = "cpu")))]
pub type DefaultBackend = gpu::GpuBackend;

#[cfg(feature = "cpu")]
pub fn default_backend() -> Result<DefaultBackend, FluidError> {
    Ok(cpu::CpuBackend::new())
}

#[cfg(all(feature = "gpu", not(feature = "cpu")))]
pub fn default_backend() -> Result<DefaultBackend, FluidError> {
    gpu::GpuBackend::new_blocking()
}

pub use analysis::{AnalysisRecorder, FluidMetrics};
pub use backend::ComputeBackend;
pub use config::SimConfig;
pub use desktop::{FluidApp, FrameCanvas};
pub use error::FluidError;
pub use export::ImageExporter;
pub use grid::{FieldSnapshot, GridFormat, GridId, GridLayout, GridStore};
pub use injector::{DragState, ImpulseInjector};
pub use kernels::Kernel;
pub use params::{ImpulseParams, ParameterChannel, SimulationConstants};
pub use pipeline::KernelPipeline;
pub use render::Renderer;
pub use simulator::{FluidSimulator, PresentationSurface};

#[cfg(feature = "cpu")]
pub use cpu::CpuBackend;

#[cfg(feature = "gpu")]
pub use gpu::GpuBackend;
