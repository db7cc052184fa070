//! Grid store: every simulation texture, at two resolutions.

use crate::backend::ComputeBackend;
use crate::config::SimConfig;
use crate::error::FluidError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridFormat {
    /// Two float channels (velocity).
    Vector2,
    /// One float channel (pressure, divergence).
    Scalar,
    /// Four channels normalized to [0, 1] (dye).
    Color,
    /// RGBA8 presentation image.
    Output,
}

impl GridFormat {
    pub fn channels(self) -> usize {
        match self {
            GridFormat::Vector2 => 2,
            GridFormat::Scalar => 1,
            GridFormat::Color | GridFormat::Output => 4,
        }
    }
}

/// Slot of a grid in the store. Current/previous pairs are two slots of one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GridId {
    Velocity,
    PreviousVelocity,
    Divergence,
    Pressure,
    PreviousPressure,
    Density,
    PreviousDensity,
    Output,
}

impl GridId {
    pub const ALL: [GridId; 8] = [
        GridId::Velocity,
        GridId::PreviousVelocity,
        GridId::Divergence,
        GridId::Pressure,
        GridId::PreviousPressure,
        GridId::Density,
        GridId::PreviousDensity,
        GridId::Output,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            GridId::Velocity => "velocity",
            GridId::PreviousVelocity => "previous velocity",
            GridId::Divergence => "divergence",
            GridId::Pressure => "pressure",
            GridId::PreviousPressure => "previous pressure",
            GridId::Density => "density",
            GridId::PreviousDensity => "previous density",
            GridId::Output => "output",
        }
    }

    pub fn format(self) -> GridFormat {
        match self {
            GridId::Velocity | GridId::PreviousVelocity => GridFormat::Vector2,
            GridId::Divergence | GridId::Pressure | GridId::PreviousPressure => GridFormat::Scalar,
            GridId::Density | GridId::PreviousDensity => GridFormat::Color,
            GridId::Output => GridFormat::Output,
        }
    }

    /// Velocity, pressure and divergence live on the downscaled grid.
    pub fn is_coarse(self) -> bool {
        matches!(
            self,
            GridId::Velocity
                | GridId::PreviousVelocity
                | GridId::Divergence
                | GridId::Pressure
                | GridId::PreviousPressure
        )
    }
}

/// Grid dimensions derived once from the output surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridLayout {
    pub coarse_width: u32,
    pub coarse_height: u32,
    pub fine_width: u32,
    pub fine_height: u32,
    pub scale: u32,
}

impl GridLayout {
    pub fn from_config(config: &SimConfig) -> Result<Self, FluidError> {
        config.validate()?;
        Ok(Self {
            coarse_width: config.surface_width / config.scale,
            coarse_height: config.surface_height / config.scale,
            fine_width: config.surface_width,
            fine_height: config.surface_height,
            scale: config.scale,
        })
    }

    pub fn dimensions(&self, grid: GridId) -> (u32, u32) {
        if grid.is_coarse() {
            (self.coarse_width, self.coarse_height)
        } else {
            (self.fine_width, self.fine_height)
        }
    }
}

/// Host copy of one grid, row-major with interleaved channels.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSnapshot {
    pub width: usize,
    pub height: usize,
    pub channels: usize,
    pub data: Vec<f32>,
}

impl FieldSnapshot {
    pub fn at(&self, x: usize, y: usize) -> &[f32] {
        let start = (y * self.width + x) * self.channels;
        &self.data[start..start + self.channels]
    }

    pub fn cells(&self) -> impl Iterator<Item = &[f32]> {
        self.data.chunks_exact(self.channels)
    }

    pub fn is_zero(&self) -> bool {
        self.data.iter().all(|&v| v == 0.0)
    }

    pub fn max_abs(&self) -> f32 {
        self.data.iter().fold(0.0f32, |m, v| m.max(v.abs()))
    }

    pub fn sum_squares(&self) -> f64 {
        self.data.iter().map(|&v| (v as f64) * (v as f64)).sum()
    }
}

/// Owns the backend and every grid allocated on it.
pub struct GridStore<B: ComputeBackend> {
    backend: B,
    layout: GridLayout,
}

impl<B: ComputeBackend> GridStore<B> {
    /// Allocates every grid, zero-initialized. Any failure aborts construction.
    pub fn new(mut backend: B, layout: GridLayout) -> Result<Self, FluidError> {
        for grid in GridId::ALL {
            let (width, height) = layout.dimensions(grid);
            backend.allocate(grid, width, height, grid.format())?;
        }
        log::info!(
            "Allocated grids: coarse {}x{}, fine {}x{}",
            layout.coarse_width,
            layout.coarse_height,
            layout.fine_width,
            layout.fine_height
        );
        Ok(Self { backend, layout })
    }

    pub fn layout(&self) -> &GridLayout {
        &self.layout
    }

    pub fn clear(&mut self, grid: GridId) {
        self.backend.clear(grid);
    }

    pub fn clear_all(&mut self) {
        for grid in GridId::ALL {
            self.backend.clear(grid);
        }
    }

    /// Byte-identical snapshot of `src` into `dst`.
    pub fn copy(&mut self, src: GridId, dst: GridId) {
        debug_assert_eq!(src.format(), dst.format(), "copy between mismatched formats");
        debug_assert_eq!(
            self.layout.dimensions(src),
            self.layout.dimensions(dst),
            "copy between mismatched dimensions"
        );
        self.backend.copy(src, dst);
    }

    pub fn read(&mut self, grid: GridId) -> Result<FieldSnapshot, FluidError> {
        self.backend.read_grid(grid)
    }

    pub fn write(&mut self, grid: GridId, data: &[f32]) -> Result<(), FluidError> {
        self.backend.write_grid(grid, data)
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_downscales_only_coarse_grids() {
        let layout = GridLayout::from_config(&SimConfig::with_surface(301, 200)).unwrap();
        assert_eq!(layout.dimensions(GridId::Velocity), (100, 66));
        assert_eq!(layout.dimensions(GridId::Pressure), (100, 66));
        assert_eq!(layout.dimensions(GridId::Density), (301, 200));
        assert_eq!(layout.dimensions(GridId::Output), (301, 200));
    }

    #[test]
    fn test_pairs_share_format() {
        assert_eq!(GridId::Velocity.format(), GridId::PreviousVelocity.format());
        assert_eq!(GridId::Pressure.format(), GridId::PreviousPressure.format());
        assert_eq!(GridId::Density.format(), GridId::PreviousDensity.format());
    }

    #[test]
    fn test_slot_indices_are_dense() {
        for (i, grid) in GridId::ALL.iter().enumerate() {
            assert_eq!(grid.index(), i);
        }
    }
}
