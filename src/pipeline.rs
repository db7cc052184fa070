//! One simulation step as a fixed sequence of dispatches.

use crate::backend::ComputeBackend;
use crate::config::SimConfig;
use crate::grid::{GridId, GridStore};
use crate::kernels::{Kernel, blocks_for};

pub struct KernelPipeline {
    jacobi_iterations: u32,
}

impl KernelPipeline {
    pub fn new(config: &SimConfig) -> Self {
        Self {
            jacobi_iterations: config.jacobi_iterations,
        }
    }

    pub fn jacobi_iterations(&self) -> u32 {
        self.jacobi_iterations
    }

    /// Advances every field by one step and composites the output image.
    pub fn step<B: ComputeBackend>(&self, store: &mut GridStore<B>) {
        self.advect_velocity(store);
        self.compute_divergence(store);
        self.confine_vorticity(store);
        self.project(store);
        self.transport_density(store);
        self.render(store);
    }

    fn coarse_blocks<B: ComputeBackend>(store: &GridStore<B>) -> [u32; 2] {
        let layout = store.layout();
        blocks_for(layout.coarse_width, layout.coarse_height)
    }

    fn fine_blocks<B: ComputeBackend>(store: &GridStore<B>) -> [u32; 2] {
        let layout = store.layout();
        blocks_for(layout.fine_width, layout.fine_height)
    }

    pub fn advect_velocity<B: ComputeBackend>(&self, store: &mut GridStore<B>) {
        let blocks = Self::coarse_blocks(store);
        store.copy(GridId::Velocity, GridId::PreviousVelocity);
        store.backend_mut().dispatch(Kernel::Advection, blocks);
    }

    pub fn compute_divergence<B: ComputeBackend>(&self, store: &mut GridStore<B>) {
        let blocks = Self::coarse_blocks(store);
        store.backend_mut().dispatch(Kernel::Divergence, blocks);
    }

    /// The kernel reads curl around each cell, so it works from a fresh snapshot.
    pub fn confine_vorticity<B: ComputeBackend>(&self, store: &mut GridStore<B>) {
        let blocks = Self::coarse_blocks(store);
        store.copy(GridId::Velocity, GridId::PreviousVelocity);
        store.backend_mut().dispatch(Kernel::Vorticity, blocks);
    }

    /// Jacobi pressure solve followed by gradient subtraction. Reads the
    /// divergence grid as last computed by [`Self::compute_divergence`].
    pub fn project<B: ComputeBackend>(&self, store: &mut GridStore<B>) {
        let blocks = Self::coarse_blocks(store);
        store.clear(GridId::PreviousPressure);
        for _ in 0..self.jacobi_iterations {
            store.backend_mut().dispatch(Kernel::Jacobi, blocks);
            store.copy(GridId::Pressure, GridId::PreviousPressure);
        }
        store
            .backend_mut()
            .dispatch(Kernel::GradientSubtraction, blocks);
    }

    pub fn transport_density<B: ComputeBackend>(&self, store: &mut GridStore<B>) {
        let blocks = Self::fine_blocks(store);
        store.copy(GridId::Density, GridId::PreviousDensity);
        store.backend_mut().dispatch(Kernel::DensityAdvection, blocks);
    }

    pub fn render<B: ComputeBackend>(&self, store: &mut GridStore<B>) {
        let blocks = Self::fine_blocks(store);
        store.backend_mut().dispatch(Kernel::Render, blocks);
    }
}
