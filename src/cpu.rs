//! Reference compute environment: every kernel evaluated on the host.
//!
//! Each kernel follows the same invocation and masking rules as its shader
//! counterpart in `fluid.wgsl`: the dispatch covers `blocks * 8` invocations
//! per axis and every invocation decides for itself whether it has work.

use glam::Vec2;
use rayon::prelude::*;

use crate::backend::ComputeBackend;
use crate::error::FluidError;
use crate::grid::{FieldSnapshot, GridFormat, GridId};
use crate::kernels::{BLOCK_SIZE, Kernel, radius_extent};
use crate::params::{ImpulseParams, SimulationConstants};
use crate::render::tone_map;

#[derive(Debug, Clone)]
struct CpuGrid {
    width: usize,
    height: usize,
    channels: usize,
    format: GridFormat,
    data: Vec<f32>,
}

impl CpuGrid {
    fn new(width: usize, height: usize, format: GridFormat) -> Self {
        let channels = format.channels();
        Self {
            width,
            height,
            channels,
            format,
            data: vec![0.0; width * height * channels],
        }
    }

    /// Texel at `(x, y)` with coordinates clamped to the grid.
    #[inline]
    fn at(&self, x: i64, y: i64) -> &[f32] {
        let x = x.clamp(0, self.width as i64 - 1) as usize;
        let y = y.clamp(0, self.height as i64 - 1) as usize;
        let start = (y * self.width + x) * self.channels;
        &self.data[start..start + self.channels]
    }

    /// Bilinear sample at a cell-space position, clamped to the edges.
    fn sample(&self, pos: Vec2) -> [f32; 4] {
        let px = pos.x.clamp(0.0, (self.width - 1) as f32);
        let py = pos.y.clamp(0.0, (self.height - 1) as f32);
        let x0 = px.floor() as i64;
        let y0 = py.floor() as i64;
        let tx = px - x0 as f32;
        let ty = py - y0 as f32;

        let v00 = self.at(x0, y0);
        let v10 = self.at(x0 + 1, y0);
        let v01 = self.at(x0, y0 + 1);
        let v11 = self.at(x0 + 1, y0 + 1);

        let mut out = [0.0; 4];
        for c in 0..self.channels {
            let top = v00[c] + (v10[c] - v00[c]) * tx;
            let bottom = v01[c] + (v11[c] - v01[c]) * tx;
            out[c] = top + (bottom - top) * ty;
        }
        out
    }

    fn row_len(&self) -> usize {
        self.width * self.channels
    }
}

fn curl(velocity: &CpuGrid, x: i64, y: i64) -> f32 {
    let x = x.clamp(0, velocity.width as i64 - 1);
    let y = y.clamp(0, velocity.height as i64 - 1);
    0.5 * ((velocity.at(x + 1, y)[1] - velocity.at(x - 1, y)[1])
        - (velocity.at(x, y + 1)[0] - velocity.at(x, y - 1)[0]))
}

/// Cell targeted by impulse invocation `(i, j)` and its falloff weight, or
/// `None` when the invocation is masked out.
fn impulse_cell(
    params: &ImpulseParams,
    fine: [u32; 2],
    i: u32,
    j: u32,
) -> Option<(i64, i64, f32)> {
    let extent = radius_extent(params.radius);
    if i >= extent || j >= extent {
        return None;
    }
    let cx = params.position[0].floor() as i64;
    let cy = params.position[1].floor() as i64;
    let r = params.radius.floor() as i64;
    let x = cx - r + i as i64;
    let y = cy - r + j as i64;
    if x < 0 || y < 0 || x >= fine[0] as i64 || y >= fine[1] as i64 {
        return None;
    }
    let d2 = ((x - cx) * (x - cx) + (y - cy) * (y - cy)) as f32;
    let r2 = params.radius * params.radius;
    if d2 > r2 {
        return None;
    }
    Some((x, y, 1.0 - d2 / r2))
}

pub struct CpuBackend {
    grids: [Option<CpuGrid>; 8],
    constants: Option<SimulationConstants>,
    impulse: ImpulseParams,
    dispatches: u64,
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuBackend {
    pub fn new() -> Self {
        Self {
            grids: Default::default(),
            constants: None,
            impulse: ImpulseParams::default(),
            dispatches: 0,
        }
    }

    /// Dispatches executed so far.
    pub fn dispatch_count(&self) -> u64 {
        self.dispatches
    }

    fn grid(&self, id: GridId) -> Option<&CpuGrid> {
        self.grids[id.index()].as_ref()
    }

    fn take(&mut self, id: GridId) -> Option<CpuGrid> {
        self.grids[id.index()].take()
    }

    fn restore(&mut self, id: GridId, grid: CpuGrid) {
        self.grids[id.index()] = Some(grid);
    }

    fn advection(&self, out: &mut CpuGrid, c: &SimulationConstants, extent: (usize, usize)) {
        let Some(prev) = self.grid(GridId::PreviousVelocity) else {
            return;
        };
        let step = c.dt / c.scale as f32;
        let (cols, rows) = extent;
        let row_len = out.row_len();
        out.data
            .par_chunks_mut(row_len)
            .take(rows)
            .enumerate()
            .for_each(|(y, row)| {
                for x in 0..cols {
                    let v = prev.at(x as i64, y as i64);
                    let src = Vec2::new(x as f32 - v[0] * step, y as f32 - v[1] * step);
                    let s = prev.sample(src);
                    row[x * 2] = s[0];
                    row[x * 2 + 1] = s[1];
                }
            });
    }

    fn divergence(&self, out: &mut CpuGrid, extent: (usize, usize)) {
        let Some(vel) = self.grid(GridId::Velocity) else {
            return;
        };
        let (cols, rows) = extent;
        let row_len = out.row_len();
        out.data
            .par_chunks_mut(row_len)
            .take(rows)
            .enumerate()
            .for_each(|(y, row)| {
                let y = y as i64;
                for x in 0..cols {
                    let xi = x as i64;
                    let du = vel.at(xi + 1, y)[0] - vel.at(xi - 1, y)[0];
                    let dv = vel.at(xi, y + 1)[1] - vel.at(xi, y - 1)[1];
                    row[x] = 0.5 * (du + dv);
                }
            });
    }

    fn vorticity(&self, out: &mut CpuGrid, c: &SimulationConstants, extent: (usize, usize)) {
        let Some(prev) = self.grid(GridId::PreviousVelocity) else {
            return;
        };
        let (cols, rows) = extent;
        let row_len = out.row_len();
        out.data
            .par_chunks_mut(row_len)
            .take(rows)
            .enumerate()
            .for_each(|(y, row)| {
                let y = y as i64;
                for x in 0..cols {
                    let xi = x as i64;
                    let gradient = 0.5
                        * Vec2::new(
                            curl(prev, xi + 1, y).abs() - curl(prev, xi - 1, y).abs(),
                            curl(prev, xi, y + 1).abs() - curl(prev, xi, y - 1).abs(),
                        );
                    let n = gradient / (gradient.length() + 1e-5);
                    let w = curl(prev, xi, y);
                    let force = c.vorticity * w * Vec2::new(n.y, -n.x);
                    let v = prev.at(xi, y);
                    row[x * 2] = v[0] + force.x * c.dt;
                    row[x * 2 + 1] = v[1] + force.y * c.dt;
                }
            });
    }

    fn jacobi(&self, out: &mut CpuGrid, extent: (usize, usize)) {
        let (Some(pp), Some(div)) = (
            self.grid(GridId::PreviousPressure),
            self.grid(GridId::Divergence),
        ) else {
            return;
        };
        let (cols, rows) = extent;
        let row_len = out.row_len();
        out.data
            .par_chunks_mut(row_len)
            .take(rows)
            .enumerate()
            .for_each(|(y, row)| {
                let y = y as i64;
                for x in 0..cols {
                    let xi = x as i64;
                    let sum = pp.at(xi - 1, y)[0]
                        + pp.at(xi + 1, y)[0]
                        + pp.at(xi, y - 1)[0]
                        + pp.at(xi, y + 1)[0];
                    row[x] = (sum - div.at(xi, y)[0]) * 0.25;
                }
            });
    }

    fn gradient_subtraction(&self, out: &mut CpuGrid, extent: (usize, usize)) {
        let Some(p) = self.grid(GridId::Pressure) else {
            return;
        };
        let (cols, rows) = extent;
        let row_len = out.row_len();
        out.data
            .par_chunks_mut(row_len)
            .take(rows)
            .enumerate()
            .for_each(|(y, row)| {
                let y = y as i64;
                for x in 0..cols {
                    let xi = x as i64;
                    row[x * 2] -= 0.5 * (p.at(xi + 1, y)[0] - p.at(xi - 1, y)[0]);
                    row[x * 2 + 1] -= 0.5 * (p.at(xi, y + 1)[0] - p.at(xi, y - 1)[0]);
                }
            });
    }

    fn density_advection(&self, out: &mut CpuGrid, c: &SimulationConstants, extent: (usize, usize)) {
        let (Some(vel), Some(pd)) = (
            self.grid(GridId::Velocity),
            self.grid(GridId::PreviousDensity),
        ) else {
            return;
        };
        let scale = c.scale as f32;
        let (cols, rows) = extent;
        let row_len = out.row_len();
        out.data
            .par_chunks_mut(row_len)
            .take(rows)
            .enumerate()
            .for_each(|(y, row)| {
                for x in 0..cols {
                    let pixel = Vec2::new(x as f32, y as f32);
                    let coarse = (pixel + 0.5) / scale - 0.5;
                    let v = vel.sample(coarse);
                    let src = pixel - Vec2::new(v[0], v[1]) * c.dt;
                    let s = pd.sample(src);
                    for ch in 0..4 {
                        row[x * 4 + ch] = s[ch].clamp(0.0, 1.0);
                    }
                }
            });
    }

    fn render(&self, out: &mut CpuGrid, extent: (usize, usize)) {
        let Some(d) = self.grid(GridId::Density) else {
            return;
        };
        let (cols, rows) = extent;
        let row_len = out.row_len();
        out.data
            .par_chunks_mut(row_len)
            .take(rows)
            .enumerate()
            .for_each(|(y, row)| {
                for x in 0..cols {
                    let texel = tone_map(d.at(x as i64, y as i64));
                    row[x * 4..x * 4 + 4].copy_from_slice(&texel);
                }
            });
    }

    /// Serial: an impulse touches at most a few hundred rows.
    fn splat(&mut self, kernel: Kernel, c: &SimulationConstants, blocks: [u32; 2]) {
        let Some(mut density) = self.take(GridId::Density) else {
            return;
        };
        let mut velocity = if kernel == Kernel::AddForce {
            self.take(GridId::Velocity)
        } else {
            None
        };
        let params = self.impulse;
        let scale = c.scale as i64;

        for j in 0..blocks[1] * BLOCK_SIZE {
            for i in 0..blocks[0] * BLOCK_SIZE {
                let Some((x, y, falloff)) = impulse_cell(&params, c.fine, i, j) else {
                    continue;
                };

                let start = (y as usize * density.width + x as usize) * 4;
                let texel = &mut density.data[start..start + 4];
                for ch in 0..3 {
                    texel[ch] = (texel[ch] + params.color[ch] * falloff).clamp(0.0, 1.0);
                }
                texel[3] = (texel[3] + falloff).clamp(0.0, 1.0);

                // One invocation per coarse cell: the one on the cell's origin pixel.
                if let Some(vel) = velocity.as_mut() {
                    if x % scale == 0 && y % scale == 0 {
                        let (vx, vy) = ((x / scale) as usize, (y / scale) as usize);
                        if vx < vel.width && vy < vel.height {
                            let start = (vy * vel.width + vx) * 2;
                            vel.data[start] += params.force[0] * falloff;
                            vel.data[start + 1] += params.force[1] * falloff;
                        }
                    }
                }
            }
        }

        self.restore(GridId::Density, density);
        if let Some(vel) = velocity {
            self.restore(GridId::Velocity, vel);
        }
    }
}

impl ComputeBackend for CpuBackend {
    fn load_program(&mut self, constants: &SimulationConstants) -> Result<(), FluidError> {
        self.constants = Some(*constants);
        log::info!(
            "CPU backend ready ({} rayon threads)",
            rayon::current_num_threads()
        );
        Ok(())
    }

    fn allocate(
        &mut self,
        slot: GridId,
        width: u32,
        height: u32,
        format: GridFormat,
    ) -> Result<(), FluidError> {
        if self.constants.is_none() {
            return Err(FluidError::ProgramNotLoaded);
        }
        self.grids[slot.index()] = Some(CpuGrid::new(width as usize, height as usize, format));
        Ok(())
    }

    fn clear(&mut self, grid: GridId) {
        if let Some(g) = self.grids[grid.index()].as_mut() {
            g.data.fill(0.0);
        }
    }

    fn copy(&mut self, src: GridId, dst: GridId) {
        let Some(mut target) = self.take(dst) else {
            return;
        };
        match self.grid(src) {
            Some(source) if source.data.len() == target.data.len() => {
                target.data.copy_from_slice(&source.data);
            }
            _ => log::error!("Cannot copy {} into {}", src.name(), dst.name()),
        }
        self.restore(dst, target);
    }

    fn upload(&mut self, params: &ImpulseParams) {
        self.impulse = *params;
    }

    fn dispatch(&mut self, kernel: Kernel, blocks: [u32; 2]) {
        let Some(c) = self.constants else {
            log::error!("Dispatch of {:?} before program load", kernel);
            return;
        };
        self.dispatches += 1;

        if kernel.uses_impulse() {
            self.splat(kernel, &c, blocks);
            return;
        }

        let target = kernel.writes()[0];
        let Some(mut out) = self.take(target) else {
            return;
        };
        let extent = (
            ((blocks[0] * BLOCK_SIZE) as usize).min(out.width),
            ((blocks[1] * BLOCK_SIZE) as usize).min(out.height),
        );
        match kernel {
            Kernel::Advection => self.advection(&mut out, &c, extent),
            Kernel::Divergence => self.divergence(&mut out, extent),
            Kernel::Vorticity => self.vorticity(&mut out, &c, extent),
            Kernel::Jacobi => self.jacobi(&mut out, extent),
            Kernel::GradientSubtraction => self.gradient_subtraction(&mut out, extent),
            Kernel::DensityAdvection => self.density_advection(&mut out, &c, extent),
            Kernel::Render => self.render(&mut out, extent),
            Kernel::AddForce | Kernel::AddDensity => {}
        }
        self.restore(target, out);
    }

    fn submit(&mut self) {}

    fn read_grid(&mut self, grid: GridId) -> Result<FieldSnapshot, FluidError> {
        let g = self.grid(grid).ok_or(FluidError::MissingGrid(grid.name()))?;
        Ok(FieldSnapshot {
            width: g.width,
            height: g.height,
            channels: g.channels,
            data: g.data.clone(),
        })
    }

    fn write_grid(&mut self, grid: GridId, data: &[f32]) -> Result<(), FluidError> {
        let g = self.grids[grid.index()]
            .as_mut()
            .ok_or(FluidError::MissingGrid(grid.name()))?;
        if data.len() != g.data.len() {
            return Err(FluidError::InvalidConfig(format!(
                "{} expects {} values, got {}",
                grid.name(),
                g.data.len(),
                data.len()
            )));
        }
        g.data.copy_from_slice(data);
        if g.format == GridFormat::Color {
            g.data.iter_mut().for_each(|v| *v = v.clamp(0.0, 1.0));
        }
        Ok(())
    }
}
