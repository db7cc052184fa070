//! The kernel set and how dispatch extents are derived.

use crate::grid::GridId;

/// Invocations per block side. Every kernel runs in 8x8 blocks.
pub const BLOCK_SIZE: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kernel {
    Advection,
    Divergence,
    Vorticity,
    Jacobi,
    GradientSubtraction,
    DensityAdvection,
    Render,
    AddForce,
    AddDensity,
}

impl Kernel {
    pub const ALL: [Kernel; 9] = [
        Kernel::Advection,
        Kernel::Divergence,
        Kernel::Vorticity,
        Kernel::Jacobi,
        Kernel::GradientSubtraction,
        Kernel::DensityAdvection,
        Kernel::Render,
        Kernel::AddForce,
        Kernel::AddDensity,
    ];

    /// Entry point name in the shader program.
    pub fn entry_point(self) -> &'static str {
        match self {
            Kernel::Advection => "advection",
            Kernel::Divergence => "divergence",
            Kernel::Vorticity => "vorticity",
            Kernel::Jacobi => "jacobi",
            Kernel::GradientSubtraction => "gradient_subtraction",
            Kernel::DensityAdvection => "density_advection",
            Kernel::Render => "render",
            Kernel::AddForce => "add_force",
            Kernel::AddDensity => "add_density",
        }
    }

    /// Grids sampled at more than the invocation's own cell.
    pub fn stencil_reads(self) -> &'static [GridId] {
        match self {
            Kernel::Advection => &[GridId::PreviousVelocity],
            Kernel::Divergence => &[GridId::Velocity],
            Kernel::Vorticity => &[GridId::PreviousVelocity],
            Kernel::Jacobi => &[GridId::PreviousPressure],
            Kernel::GradientSubtraction => &[GridId::Pressure],
            Kernel::DensityAdvection => &[GridId::Velocity, GridId::PreviousDensity],
            Kernel::Render | Kernel::AddForce | Kernel::AddDensity => &[],
        }
    }

    /// Grids written. A kernel may read its own cell of these, never a neighbour.
    pub fn writes(self) -> &'static [GridId] {
        match self {
            Kernel::Advection | Kernel::Vorticity | Kernel::GradientSubtraction => {
                &[GridId::Velocity]
            }
            Kernel::Divergence => &[GridId::Divergence],
            Kernel::Jacobi => &[GridId::Pressure],
            Kernel::DensityAdvection | Kernel::AddDensity => &[GridId::Density],
            Kernel::Render => &[GridId::Output],
            Kernel::AddForce => &[GridId::Velocity, GridId::Density],
        }
    }

    pub fn uses_impulse(self) -> bool {
        matches!(self, Kernel::AddForce | Kernel::AddDensity)
    }
}

/// Blocks needed to cover `width` x `height` cells, rounding up.
pub fn blocks_for(width: u32, height: u32) -> [u32; 2] {
    [width.div_ceil(BLOCK_SIZE), height.div_ceil(BLOCK_SIZE)]
}

/// Side of the square of invocations an impulse of `radius` covers.
pub fn radius_extent(radius: f32) -> u32 {
    (2.0 * radius + 1.0) as u32
}

/// Blocks covering the `2r+1` square around an impulse.
pub fn blocks_for_radius(radius: f32) -> [u32; 2] {
    let side = radius_extent(radius).div_ceil(BLOCK_SIZE);
    [side, side]
}
