//! The compute environment the core drives.

use crate::error::FluidError;
use crate::grid::{FieldSnapshot, GridFormat, GridId};
use crate::kernels::Kernel;
use crate::params::{ImpulseParams, SimulationConstants};

/// Primitive operations the simulation needs from a compute device.
///
/// Operations execute in call order. A backend may defer work until
/// [`ComputeBackend::submit`], but an `upload` must never be observed by a
/// dispatch issued before it.
pub trait ComputeBackend {
    /// Compiles the kernel program and binds the simulation constants.
    fn load_program(&mut self, constants: &SimulationConstants) -> Result<(), FluidError>;

    /// Allocates a zero-initialized grid in `slot`.
    fn allocate(
        &mut self,
        slot: GridId,
        width: u32,
        height: u32,
        format: GridFormat,
    ) -> Result<(), FluidError>;

    fn clear(&mut self, grid: GridId);

    fn copy(&mut self, src: GridId, dst: GridId);

    fn upload(&mut self, params: &ImpulseParams);

    fn dispatch(&mut self, kernel: Kernel, blocks: [u32; 2]);

    /// Flushes recorded work to the device.
    fn submit(&mut self);

    /// Copies a grid back to the host. Implies a submit.
    fn read_grid(&mut self, grid: GridId) -> Result<FieldSnapshot, FluidError>;

    /// Overwrites a grid from host data laid out like [`FieldSnapshot::data`].
    fn write_grid(&mut self, grid: GridId, data: &[f32]) -> Result<(), FluidError>;
}
