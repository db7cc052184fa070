use crate::backend::ComputeBackend;
use crate::error::FluidError;
use crate::grid::{FieldSnapshot, GridId};
use crate::simulator::FluidSimulator;

/// Dye channel value above which a pixel counts as covered.
pub const COVERAGE_THRESHOLD: f32 = 0.01;

#[derive(Debug, Clone, PartialEq)]
pub struct FluidMetrics {
    pub kinetic_energy: f32,
    pub max_velocity: f32,
    pub avg_velocity: f32,
    /// Sum of squared central-difference divergence over the velocity grid.
    pub divergence_energy: f32,
    pub vorticity: f32,
    /// Fraction of dye pixels with any channel above [`COVERAGE_THRESHOLD`].
    pub dye_coverage: f32,
    pub max_dye: f32,
    pub frame: u64,
}

fn clamped(field: &FieldSnapshot, x: i64, y: i64) -> &[f32] {
    let x = x.clamp(0, field.width as i64 - 1) as usize;
    let y = y.clamp(0, field.height as i64 - 1) as usize;
    field.at(x, y)
}

/// Central-difference divergence with clamped neighbours, as the kernels compute it.
pub fn divergence_at(velocity: &FieldSnapshot, x: usize, y: usize) -> f32 {
    let (x, y) = (x as i64, y as i64);
    let du = clamped(velocity, x + 1, y)[0] - clamped(velocity, x - 1, y)[0];
    let dv = clamped(velocity, x, y + 1)[1] - clamped(velocity, x, y - 1)[1];
    0.5 * (du + dv)
}

pub fn curl_at(velocity: &FieldSnapshot, x: usize, y: usize) -> f32 {
    let (x, y) = (x as i64, y as i64);
    let dv = clamped(velocity, x + 1, y)[1] - clamped(velocity, x - 1, y)[1];
    let du = clamped(velocity, x, y + 1)[0] - clamped(velocity, x, y - 1)[0];
    0.5 * (dv - du)
}

impl FluidMetrics {
    pub fn analyze(velocity: &FieldSnapshot, density: &FieldSnapshot, frame: u64) -> Self {
        let mut kinetic_energy = 0.0;
        let mut max_velocity: f32 = 0.0;
        let mut velocity_sum = 0.0;
        let mut divergence_energy = 0.0;
        let mut total_vorticity = 0.0;

        for y in 0..velocity.height {
            for x in 0..velocity.width {
                let v = velocity.at(x, y);
                let speed_sq = v[0] * v[0] + v[1] * v[1];
                kinetic_energy += 0.5 * speed_sq;
                max_velocity = max_velocity.max(speed_sq.sqrt());
                velocity_sum += speed_sq.sqrt();

                let div = divergence_at(velocity, x, y);
                divergence_energy += div * div;
                total_vorticity += curl_at(velocity, x, y).abs();
            }
        }

        let cells = (velocity.width * velocity.height).max(1) as f32;

        let mut covered = 0usize;
        let mut max_dye: f32 = 0.0;
        for texel in density.cells() {
            let peak = texel[..3].iter().fold(0.0f32, |m, &c| m.max(c));
            max_dye = max_dye.max(peak);
            if peak > COVERAGE_THRESHOLD {
                covered += 1;
            }
        }
        let pixels = (density.width * density.height).max(1) as f32;

        Self {
            kinetic_energy,
            max_velocity,
            avg_velocity: velocity_sum / cells,
            divergence_energy,
            vorticity: total_vorticity / cells,
            dye_coverage: covered as f32 / pixels,
            max_dye,
            frame,
        }
    }

    /// Reads velocity and dye back from the simulator and analyzes them.
    pub fn capture<B: ComputeBackend>(sim: &mut FluidSimulator<B>) -> Result<Self, FluidError> {
        let velocity = sim.read_field(GridId::Velocity)?;
        let density = sim.read_field(GridId::Density)?;
        Ok(Self::analyze(&velocity, &density, sim.frames()))
    }

    pub fn print_summary(&self) {
        println!("Frame {} Metrics:", self.frame);
        println!("  Kinetic Energy: {:.6}", self.kinetic_energy);
        println!("  Max Velocity: {:.6}", self.max_velocity);
        println!("  Avg Velocity: {:.6}", self.avg_velocity);
        println!("  Divergence Energy: {:.6}", self.divergence_energy);
        println!("  Vorticity: {:.6}", self.vorticity);
        println!("  Dye Coverage: {:.3}%", self.dye_coverage * 100.0);
        println!("  Max Dye: {:.6}", self.max_dye);
        println!();
    }
}

#[derive(Default)]
pub struct AnalysisRecorder {
    pub metrics_history: Vec<FluidMetrics>,
}

impl AnalysisRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_frame<B: ComputeBackend>(
        &mut self,
        sim: &mut FluidSimulator<B>,
    ) -> Result<&FluidMetrics, FluidError> {
        let metrics = FluidMetrics::capture(sim)?;
        log::debug!(
            "Frame {}: energy {:.4}, divergence {:.4}",
            metrics.frame,
            metrics.kinetic_energy,
            metrics.divergence_energy
        );
        self.metrics_history.push(metrics);
        Ok(&self.metrics_history[self.metrics_history.len() - 1])
    }

    pub fn print_trends(&self) {
        let (Some(first), Some(last)) = (self.metrics_history.first(), self.metrics_history.last())
        else {
            return;
        };
        if self.metrics_history.len() < 2 {
            return;
        }

        println!("=== TREND ANALYSIS ===");
        println!(
            "Kinetic Energy change: {:.6} -> {:.6} ({:+.3}%)",
            first.kinetic_energy,
            last.kinetic_energy,
            (last.kinetic_energy - first.kinetic_energy) / first.kinetic_energy.max(0.001) * 100.0
        );
        println!(
            "Divergence change: {:.6} -> {:.6}",
            first.divergence_energy, last.divergence_energy
        );
        println!(
            "Dye coverage change: {:.3}% -> {:.3}%",
            first.dye_coverage * 100.0,
            last.dye_coverage * 100.0
        );
    }
}
