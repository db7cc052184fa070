//! Turns pointer drags into velocity and dye impulses.

use glam::Vec2;
use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::backend::ComputeBackend;
use crate::config::SimConfig;
use crate::grid::GridStore;
use crate::kernels::{Kernel, blocks_for_radius};
use crate::params::{ImpulseParams, ParameterChannel};

/// Pointer state between press and release. Only the input handlers on
/// [`ImpulseInjector`] change it.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DragState {
    pub dragging: bool,
    pub last_position: Option<Vec2>,
    pub color: [f32; 3],
}

pub fn random_color(rng: &mut impl Rng) -> [f32; 3] {
    [rng.r#gen(), rng.r#gen(), rng.r#gen()]
}

pub struct ImpulseInjector {
    drag: DragState,
    force_radius: f32,
    density_radius: f32,
    impulses: u64,
}

impl ImpulseInjector {
    pub fn new(config: &SimConfig) -> Self {
        Self {
            drag: DragState::default(),
            force_radius: config.force_radius,
            density_radius: config.density_radius(),
            impulses: 0,
        }
    }

    pub fn drag(&self) -> &DragState {
        &self.drag
    }

    pub fn impulses(&self) -> u64 {
        self.impulses
    }

    pub fn press(&mut self, position: Vec2, color: [f32; 3]) {
        self.drag = DragState {
            dragging: true,
            last_position: Some(position),
            color,
        };
        log::debug!("Press at ({:.1}, {:.1}) color {:?}", position.x, position.y, color);
    }

    pub fn press_random(&mut self, position: Vec2) {
        let color = random_color(&mut rand::thread_rng());
        self.press(position, color);
    }

    /// Same as [`Self::press_random`] but reproducible.
    pub fn press_seeded(&mut self, position: Vec2, seed: u64) {
        let color = random_color(&mut StdRng::seed_from_u64(seed));
        self.press(position, color);
    }

    /// Injects an impulse from the last position while dragging. Outside a
    /// drag this only records the position.
    pub fn pointer_move<B: ComputeBackend>(
        &mut self,
        position: Vec2,
        store: &mut GridStore<B>,
        channel: &mut ParameterChannel,
    ) {
        if self.drag.dragging {
            let previous = self.drag.last_position.unwrap_or(position);
            let color = self.drag.color;
            self.apply_impulse(position, previous, color, store, channel);
        }
        self.drag.last_position = Some(position);
    }

    pub fn release(&mut self) {
        if self.drag.dragging {
            log::debug!("Release after {} impulses", self.impulses);
        }
        self.drag.dragging = false;
    }

    /// Velocity splat at the force radius, then a wider dye splat. Both
    /// dispatches read the record uploaded right before them.
    pub fn apply_impulse<B: ComputeBackend>(
        &mut self,
        current: Vec2,
        previous: Vec2,
        color: [f32; 3],
        store: &mut GridStore<B>,
        channel: &mut ParameterChannel,
    ) {
        let params = ImpulseParams::new(current, current - previous, color, self.force_radius);
        channel.upload(store, &params);
        store
            .backend_mut()
            .dispatch(Kernel::AddForce, blocks_for_radius(self.force_radius));

        let params = params.with_radius(self.density_radius);
        channel.upload(store, &params);
        store
            .backend_mut()
            .dispatch(Kernel::AddDensity, blocks_for_radius(self.density_radius));

        self.impulses += 1;
    }
}
