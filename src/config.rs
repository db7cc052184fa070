use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::FluidError;

/// Tunable constants for one simulator instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Output surface width in pixels. The dye grid uses this directly.
    pub surface_width: u32,
    /// Output surface height in pixels.
    pub surface_height: u32,
    /// Integer downscale from the surface to the velocity/pressure grid.
    pub scale: u32,
    /// Jacobi passes per step. Fixed, no convergence test.
    pub jacobi_iterations: u32,
    /// Velocity splat radius in surface pixels.
    pub force_radius: f32,
    /// Dye splat radius as a multiple of `force_radius`.
    pub density_radius_factor: f32,
    /// Time step used by both advection kernels.
    pub dt: f32,
    /// Vorticity confinement strength. Not scaled by dt or resolution.
    pub vorticity: f32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            surface_width: 720,
            surface_height: 480,
            scale: 3,
            jacobi_iterations: 64,
            force_radius: 50.0,
            density_radius_factor: 3.0,
            dt: 1.0,
            vorticity: 0.25,
        }
    }
}

impl SimConfig {
    pub fn with_surface(width: u32, height: u32) -> Self {
        Self {
            surface_width: width,
            surface_height: height,
            ..Self::default()
        }
    }

    pub fn load(path: &Path) -> Result<Self, FluidError> {
        let text = std::fs::read_to_string(path)?;
        let config: SimConfig = serde_json::from_str(&text)?;
        config.validate()?;
        log::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), FluidError> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn density_radius(&self) -> f32 {
        self.force_radius * self.density_radius_factor
    }

    pub fn validate(&self) -> Result<(), FluidError> {
        if self.surface_width == 0 || self.surface_height == 0 {
            return Err(FluidError::InvalidConfig(format!(
                "surface must be non-empty, got {}x{}",
                self.surface_width, self.surface_height
            )));
        }
        if self.scale == 0 {
            return Err(FluidError::InvalidConfig("scale must be at least 1".into()));
        }
        if self.surface_width / self.scale == 0 || self.surface_height / self.scale == 0 {
            return Err(FluidError::InvalidConfig(format!(
                "surface {}x{} is smaller than one coarse cell at scale {}",
                self.surface_width, self.surface_height, self.scale
            )));
        }
        if self.jacobi_iterations == 0 {
            return Err(FluidError::InvalidConfig(
                "jacobi_iterations must be at least 1".into(),
            ));
        }
        if !(self.force_radius > 0.0) {
            return Err(FluidError::InvalidConfig("force_radius must be positive".into()));
        }
        if !(self.density_radius_factor >= 1.0) {
            return Err(FluidError::InvalidConfig(
                "density_radius_factor must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
