//! Uniform records shared with the kernels, and the channel that uploads them.

use bytemuck::{Pod, Zeroable};
use glam::Vec2;

use crate::backend::ComputeBackend;
use crate::config::SimConfig;
use crate::grid::{GridLayout, GridStore};

/// Per-dispatch injection record. Layout matches `Impulse` in `fluid.wgsl`.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct ImpulseParams {
    pub position: [f32; 2],
    pub force: [f32; 2],
    pub color: [f32; 3],
    pub radius: f32,
}

impl ImpulseParams {
    pub fn new(position: Vec2, force: Vec2, color: [f32; 3], radius: f32) -> Self {
        Self {
            position: position.to_array(),
            force: force.to_array(),
            color,
            radius,
        }
    }

    pub fn with_radius(self, radius: f32) -> Self {
        Self { radius, ..self }
    }
}

/// Constants fixed at construction. Layout matches `Simulation` in `fluid.wgsl`.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct SimulationConstants {
    pub coarse: [u32; 2],
    pub fine: [u32; 2],
    pub scale: u32,
    pub dt: f32,
    pub vorticity: f32,
    pub _padding: u32,
}

impl SimulationConstants {
    pub fn new(layout: &GridLayout, config: &SimConfig) -> Self {
        Self {
            coarse: [layout.coarse_width, layout.coarse_height],
            fine: [layout.fine_width, layout.fine_height],
            scale: layout.scale,
            dt: config.dt,
            vorticity: config.vorticity,
            _padding: 0,
        }
    }
}

/// Marshals impulse records to the compute environment. Nothing is cached:
/// every call reaches the backend.
#[derive(Debug, Default)]
pub struct ParameterChannel {
    uploads: u64,
}

impl ParameterChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upload<B: ComputeBackend>(&mut self, store: &mut GridStore<B>, params: &ImpulseParams) {
        store.backend_mut().upload(params);
        self.uploads += 1;
    }

    /// Total uploads since construction.
    pub fn uploads(&self) -> u64 {
        self.uploads
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_sizes_match_shader_layout() {
        assert_eq!(std::mem::size_of::<ImpulseParams>(), 32);
        assert_eq!(std::mem::size_of::<SimulationConstants>(), 32);
        assert_eq!(std::mem::offset_of!(ImpulseParams, color), 16);
        assert_eq!(std::mem::offset_of!(ImpulseParams, radius), 28);
    }

    #[test]
    fn test_with_radius_keeps_other_fields() {
        let params = ImpulseParams::new(Vec2::new(3.0, 4.0), Vec2::X, [0.1, 0.2, 0.3], 50.0);
        let wide = params.with_radius(150.0);
        assert_eq!(wide.radius, 150.0);
        assert_eq!(wide.position, params.position);
        assert_eq!(wide.force, params.force);
        assert_eq!(wide.color, params.color);
    }
}
