use std::path::Path;

use crate::backend::ComputeBackend;
use crate::error::FluidError;
use crate::grid::GridId;
use crate::render::Renderer;
use crate::simulator::FluidSimulator;

pub struct ImageExporter {
    renderer: Renderer,
}

impl ImageExporter {
    /// `width`/`height` size the velocity visualization; frames keep the
    /// surface resolution.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            renderer: Renderer::new(width, height),
        }
    }

    pub fn export_frame_png<B: ComputeBackend>(
        &self,
        sim: &mut FluidSimulator<B>,
        path: &Path,
    ) -> Result<(), FluidError> {
        let img = sim.frame_image()?;
        img.save(path)?;
        Ok(())
    }

    pub fn export_velocity_png<B: ComputeBackend>(
        &self,
        sim: &mut FluidSimulator<B>,
        path: &Path,
    ) -> Result<(), FluidError> {
        let velocity = sim.read_field(GridId::Velocity)?;
        let max_speed = velocity
            .cells()
            .map(|v| (v[0] * v[0] + v[1] * v[1]).sqrt())
            .fold(0.0f32, f32::max);
        let img = self.renderer.render_velocity_field(&velocity, max_speed);
        img.save(path)?;
        Ok(())
    }

    /// Steps `steps` times, writing `{prefix}_frame_NNNN.png` after each.
    pub fn export_frame_sequence<B: ComputeBackend>(
        &self,
        sim: &mut FluidSimulator<B>,
        steps: usize,
        output_dir: &Path,
        prefix: &str,
    ) -> Result<(), FluidError> {
        std::fs::create_dir_all(output_dir)?;
        for i in 0..steps {
            sim.tick();

            let filename = format!("{}_frame_{:04}.png", prefix, i);
            let path = output_dir.join(filename);

            self.export_frame_png(sim, &path)?;
        }
        log::info!("Exported {} frames to {}", steps, output_dir.display());
        Ok(())
    }
}
