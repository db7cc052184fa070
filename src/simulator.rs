//! Frame driver: owns every component and runs one step per display tick.

use glam::Vec2;
use image::RgbaImage;
use std::time::Instant;

use crate::backend::ComputeBackend;
use crate::config::SimConfig;
use crate::error::FluidError;
use crate::grid::{FieldSnapshot, GridId, GridLayout, GridStore};
use crate::injector::ImpulseInjector;
use crate::params::{ParameterChannel, SimulationConstants};
use crate::pipeline::KernelPipeline;
use crate::render::Renderer;

/// Where finished frames go. Surface swap mechanics belong to the host.
pub trait PresentationSurface {
    fn present(&mut self, frame: &RgbaImage);
}

pub struct FluidSimulator<B: ComputeBackend> {
    config: SimConfig,
    store: GridStore<B>,
    channel: ParameterChannel,
    injector: ImpulseInjector,
    pipeline: KernelPipeline,
    frames: u64,
}

impl<B: ComputeBackend> FluidSimulator<B> {
    /// Loads the kernel program and allocates every grid. Fails only here.
    pub fn new(mut backend: B, config: SimConfig) -> Result<Self, FluidError> {
        let layout = GridLayout::from_config(&config)?;
        backend.load_program(&SimulationConstants::new(&layout, &config))?;
        let store = GridStore::new(backend, layout)?;
        log::info!(
            "Simulator ready: surface {}x{}, scale {}, {} Jacobi iterations",
            config.surface_width,
            config.surface_height,
            config.scale,
            config.jacobi_iterations
        );

        Ok(Self {
            pipeline: KernelPipeline::new(&config),
            injector: ImpulseInjector::new(&config),
            channel: ParameterChannel::new(),
            store,
            config,
            frames: 0,
        })
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn layout(&self) -> &GridLayout {
        self.store.layout()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn parameter_uploads(&self) -> u64 {
        self.channel.uploads()
    }

    pub fn injector(&self) -> &ImpulseInjector {
        &self.injector
    }

    pub fn backend(&self) -> &B {
        self.store.backend()
    }

    /// Individual pipeline stages, for diagnostics.
    pub fn stages(&mut self) -> (&KernelPipeline, &mut GridStore<B>) {
        (&self.pipeline, &mut self.store)
    }

    /// One pipeline step.
    pub fn tick(&mut self) {
        let start = Instant::now();
        self.pipeline.step(&mut self.store);
        self.store.backend_mut().submit();
        self.frames += 1;
        log::trace!("Frame {} recorded in {:?}", self.frames, start.elapsed());
    }

    /// One pipeline step, then hands the composited image to `surface`.
    pub fn tick_and_present(
        &mut self,
        surface: &mut impl PresentationSurface,
    ) -> Result<(), FluidError> {
        self.tick();
        let frame = self.frame_image()?;
        surface.present(&frame);
        Ok(())
    }

    /// The image written by the most recent render pass.
    pub fn frame_image(&mut self) -> Result<RgbaImage, FluidError> {
        let output = self.store.read(GridId::Output)?;
        Ok(Renderer::output_to_image(&output))
    }

    pub fn press(&mut self, position: Vec2) {
        self.injector.press_random(position);
    }

    pub fn press_with_color(&mut self, position: Vec2, color: [f32; 3]) {
        self.injector.press(position, color);
    }

    pub fn press_seeded(&mut self, position: Vec2, seed: u64) {
        self.injector.press_seeded(position, seed);
    }

    pub fn pointer_move(&mut self, position: Vec2) {
        self.injector
            .pointer_move(position, &mut self.store, &mut self.channel);
    }

    pub fn release(&mut self) {
        self.injector.release();
    }

    /// Injects one impulse regardless of drag state.
    pub fn apply_impulse(&mut self, current: Vec2, previous: Vec2, color: [f32; 3]) {
        self.injector
            .apply_impulse(current, previous, color, &mut self.store, &mut self.channel);
    }

    pub fn read_field(&mut self, grid: GridId) -> Result<FieldSnapshot, FluidError> {
        self.store.read(grid)
    }

    pub fn write_field(&mut self, grid: GridId, data: &[f32]) -> Result<(), FluidError> {
        self.store.write(grid, data)
    }

    /// Zeroes every field. Drag state is left alone.
    pub fn reset(&mut self) {
        self.store.clear_all();
        self.store.backend_mut().submit();
        log::info!("Fields cleared after {} frames", self.frames);
    }
}
