use dyeflow::{CpuBackend, FieldSnapshot, FluidSimulator, GridId, SimConfig};
use glam::Vec2;
use rand::{Rng, SeedableRng, rngs::StdRng};

fn simulator(config: SimConfig) -> FluidSimulator<CpuBackend> {
    FluidSimulator::new(CpuBackend::new(), config).unwrap()
}

fn speed(v: &[f32]) -> f32 {
    (v[0] * v[0] + v[1] * v[1]).sqrt()
}

fn nonzero_cells(field: &FieldSnapshot) -> Vec<(usize, usize)> {
    let mut cells = Vec::new();
    for y in 0..field.height {
        for x in 0..field.width {
            if field.at(x, y).iter().any(|&v| v != 0.0) {
                cells.push((x, y));
            }
        }
    }
    cells
}

#[test]
fn test_impulse_stays_inside_bounding_squares() {
    let config = SimConfig {
        force_radius: 10.0,
        ..SimConfig::with_surface(300, 300)
    };
    let r = config.force_radius as i64;
    let dye_r = config.density_radius() as i64;
    let scale = config.scale as i64;
    let mut sim = simulator(config);

    sim.apply_impulse(Vec2::new(150.0, 150.0), Vec2::new(140.0, 150.0), [1.0, 0.5, 0.25]);

    let velocity = sim.read_field(GridId::Velocity).unwrap();
    let touched = nonzero_cells(&velocity);
    assert!(!touched.is_empty());
    for (x, y) in touched {
        let (fx, fy) = (x as i64 * scale, y as i64 * scale);
        assert!(
            (fx - 150).abs() <= r && (fy - 150).abs() <= r,
            "velocity written outside the force square at coarse ({}, {})",
            x,
            y
        );
    }
    // Coarse cell 50 has its origin pixel on the impulse centre.
    assert_eq!(velocity.at(50, 50), &[10.0, 0.0]);

    let density = sim.read_field(GridId::Density).unwrap();
    for (x, y) in nonzero_cells(&density) {
        assert!(
            (x as i64 - 150).abs() <= dye_r && (y as i64 - 150).abs() <= dye_r,
            "dye written outside the density square at ({}, {})",
            x,
            y
        );
    }
    // Both splats add dye at the centre, then clamp.
    assert_eq!(density.at(150, 150), &[1.0, 1.0, 0.5, 1.0]);
    // Beyond the force radius only the wide splat contributes.
    let outer = density.at(170, 150);
    let falloff = 1.0 - 400.0 / 900.0;
    assert!((outer[0] - falloff).abs() < 1e-5);
    assert!((outer[2] - 0.25 * falloff).abs() < 1e-5);
}

#[test]
fn test_impulse_near_corner_is_clipped() {
    let mut sim = simulator(SimConfig {
        force_radius: 8.0,
        ..SimConfig::with_surface(60, 60)
    });
    sim.apply_impulse(Vec2::new(1.0, 2.0), Vec2::new(0.0, 0.0), [0.0, 1.0, 0.0]);

    let velocity = sim.read_field(GridId::Velocity).unwrap();
    assert_eq!(velocity.at(0, 0), &[0.921875, 1.84375]);
    let density = sim.read_field(GridId::Density).unwrap();
    assert!(density.at(0, 0)[1] > 0.0);
    assert!(density.data.iter().all(|v| (0.0..=1.0).contains(v)));
}

#[test]
fn test_each_injection_uploads_twice() {
    let mut sim = simulator(SimConfig::with_surface(120, 90));
    sim.press_with_color(Vec2::new(30.0, 30.0), [1.0, 1.0, 1.0]);
    sim.pointer_move(Vec2::new(35.0, 30.0));
    sim.pointer_move(Vec2::new(40.0, 30.0));
    assert_eq!(sim.parameter_uploads(), 4);
    assert_eq!(sim.injector().impulses(), 2);
}

#[test]
fn test_move_without_press_injects_nothing() {
    let mut sim = simulator(SimConfig::with_surface(120, 90));
    sim.pointer_move(Vec2::new(30.0, 30.0));
    sim.pointer_move(Vec2::new(60.0, 30.0));
    assert_eq!(sim.parameter_uploads(), 0);
    assert!(sim.read_field(GridId::Velocity).unwrap().is_zero());
    assert!(sim.read_field(GridId::Density).unwrap().is_zero());
    assert_eq!(
        sim.injector().drag().last_position,
        Some(Vec2::new(60.0, 30.0))
    );
}

#[test]
fn test_release_stops_injection_and_keeps_fields() {
    let mut sim = simulator(SimConfig::with_surface(120, 90));
    sim.press_with_color(Vec2::new(30.0, 30.0), [1.0, 0.0, 0.0]);
    sim.pointer_move(Vec2::new(36.0, 30.0));
    sim.release();
    let before = sim.read_field(GridId::Density).unwrap();

    sim.pointer_move(Vec2::new(60.0, 60.0));
    assert_eq!(sim.parameter_uploads(), 2);
    assert_eq!(sim.read_field(GridId::Density).unwrap(), before);
}

#[test]
fn test_drag_scenario() {
    let mut sim = simulator(SimConfig::default());
    sim.press_with_color(Vec2::new(100.0, 100.0), [0.2, 0.6, 0.9]);
    sim.pointer_move(Vec2::new(110.0, 100.0));

    // Coarse (35, 33) has its origin pixel at (105, 99), five pixels from the centre.
    let velocity = sim.read_field(GridId::Velocity).unwrap();
    let v = velocity.at(35, 33);
    let falloff = 1.0 - 26.0 / 2500.0;
    assert!((v[0] - 10.0 * falloff).abs() < 1e-4, "got {:?}", v);
    assert_eq!(v[1], 0.0);

    let density = sim.read_field(GridId::Density).unwrap();
    let texel = density.at(105, 100);
    assert!(texel[0] > 0.2 && texel[1] > 0.6 && texel[2] > 0.9);
    // Inside 3R but outside R only the density splat reaches.
    let far = density.at(110, 200);
    let falloff = 1.0 - 10000.0 / 22500.0;
    assert!((far[1] - 0.6 * falloff).abs() < 1e-5);
    assert_eq!(density.at(110, 251), &[0.0; 4]);

    sim.tick();
    let velocity = sim.read_field(GridId::Velocity).unwrap();
    assert!(velocity.at(35, 33)[0] > 0.0);
}

#[test]
fn test_single_cell_spreads_over_two_steps() {
    let config = SimConfig::with_surface(48, 48);
    let mut sim = simulator(config);
    let layout = *sim.layout();

    let mut data = vec![0.0; (layout.coarse_width * layout.coarse_height * 2) as usize];
    let idx = ((8 * layout.coarse_width + 8) * 2) as usize;
    data[idx] = 1.0;
    data[idx + 1] = 0.5;
    sim.write_field(GridId::Velocity, &data).unwrap();

    sim.tick();
    sim.tick();

    let velocity = sim.read_field(GridId::Velocity).unwrap();
    let peak = velocity.cells().map(speed).fold(0.0f32, f32::max);
    assert!(peak < 0.9 * speed(&[1.0, 0.5]), "peak {}", peak);
    assert!(velocity.data.iter().all(|v| v.is_finite()));
    let spread = velocity.cells().filter(|v| speed(v) > 1e-6).count();
    assert!(spread >= 9, "only {} cells carry velocity", spread);
}

#[test]
fn test_projection_reduces_divergence() {
    let mut sim = simulator(SimConfig::with_surface(144, 144));
    let layout = *sim.layout();
    let (w, h) = (layout.coarse_width as usize, layout.coarse_height as usize);

    // Gaussian source: strongly divergent, smooth, and decayed at the walls.
    let mut data = Vec::with_capacity(w * h * 2);
    let centre = Vec2::new(w as f32 / 2.0, h as f32 / 2.0);
    for y in 0..h {
        for x in 0..w {
            let d = Vec2::new(x as f32, y as f32) - centre;
            let v = d * (-d.length_squared() / 16.0).exp();
            data.push(v.x);
            data.push(v.y);
        }
    }
    sim.write_field(GridId::Velocity, &data).unwrap();

    let (pipeline, store) = sim.stages();
    pipeline.compute_divergence(store);
    let before = store.read(GridId::Divergence).unwrap().sum_squares();
    pipeline.project(store);
    pipeline.compute_divergence(store);
    let after = store.read(GridId::Divergence).unwrap().sum_squares();

    assert!(before > 0.0);
    assert!(after < 0.5 * before, "divergence {} -> {}", before, after);
}

#[test]
fn test_repeated_advection_stays_bounded() {
    let mut sim = simulator(SimConfig::with_surface(48, 48));
    let layout = *sim.layout();
    let mut rng = StdRng::seed_from_u64(11);
    let data: Vec<f32> = (0..layout.coarse_width * layout.coarse_height * 2)
        .map(|_| rng.gen_range(-5.0..5.0))
        .collect();
    sim.write_field(GridId::Velocity, &data).unwrap();
    let initial = sim.read_field(GridId::Velocity).unwrap().max_abs();

    let (pipeline, store) = sim.stages();
    for _ in 0..10_000 {
        pipeline.advect_velocity(store);
    }

    let velocity = store.read(GridId::Velocity).unwrap();
    assert!(velocity.data.iter().all(|v| v.is_finite()));
    assert!(velocity.max_abs() <= initial * (1.0 + 1e-3));
}

#[test]
fn test_full_steps_without_input_stay_bounded() {
    let mut sim = simulator(SimConfig {
        vorticity: 0.0,
        ..SimConfig::with_surface(48, 48)
    });
    let layout = *sim.layout();
    let mut rng = StdRng::seed_from_u64(5);
    let data: Vec<f32> = (0..layout.coarse_width * layout.coarse_height * 2)
        .map(|_| rng.gen_range(-3.0..3.0))
        .collect();
    sim.write_field(GridId::Velocity, &data).unwrap();
    let initial = sim.read_field(GridId::Velocity).unwrap().max_abs();

    for _ in 0..500 {
        sim.tick();
    }

    let velocity = sim.read_field(GridId::Velocity).unwrap();
    assert!(velocity.data.iter().all(|v| v.is_finite()));
    assert!(velocity.max_abs() <= 2.0 * initial);
    let density = sim.read_field(GridId::Density).unwrap();
    assert!(density.is_zero());
}

fn velocity_field(
    sim: &FluidSimulator<CpuBackend>,
    mut f: impl FnMut(usize, usize) -> [f32; 2],
) -> Vec<f32> {
    let layout = sim.layout();
    let mut data = Vec::new();
    for y in 0..layout.coarse_height as usize {
        for x in 0..layout.coarse_width as usize {
            data.extend_from_slice(&f(x, y));
        }
    }
    data
}

#[test]
fn test_vorticity_pushes_along_curl_gradient() {
    let mut sim = simulator(SimConfig::with_surface(48, 48));
    // v = (0, 0.1 x²): curl = 0.2 x, so |curl| grows towards +x.
    let data = velocity_field(&sim, |x, _| [0.0, 0.1 * (x * x) as f32]);
    sim.write_field(GridId::Velocity, &data).unwrap();

    let (pipeline, store) = sim.stages();
    pipeline.confine_vorticity(store);
    let velocity = store.read(GridId::Velocity).unwrap();

    // At (5, 8): curl = 1, N = (0.2, 0) / (0.2 + 1e-5), force = 0.25 * (N.y, -N.x).
    let v = velocity.at(5, 8);
    let n = 0.2 / (0.2 + 1e-5);
    assert!(v[0].abs() < 1e-6, "got {:?}", v);
    assert!((v[1] - (2.5 - 0.25 * n)).abs() < 1e-5, "got {:?}", v);
}

#[test]
fn test_zero_vorticity_leaves_field_untouched() {
    let mut sim = simulator(SimConfig {
        vorticity: 0.0,
        ..SimConfig::with_surface(48, 48)
    });
    let mut rng = StdRng::seed_from_u64(23);
    let data = velocity_field(&sim, |_, _| {
        [rng.gen_range(-2.0..2.0), rng.gen_range(-2.0..2.0)]
    });
    sim.write_field(GridId::Velocity, &data).unwrap();

    let (pipeline, store) = sim.stages();
    pipeline.confine_vorticity(store);
    assert_eq!(store.read(GridId::Velocity).unwrap().data, data);
}

#[test]
fn test_uniform_flow_has_no_confinement_force() {
    let mut sim = simulator(SimConfig::with_surface(48, 48));
    let data = velocity_field(&sim, |_, _| [1.5, -0.5]);
    sim.write_field(GridId::Velocity, &data).unwrap();

    let (pipeline, store) = sim.stages();
    pipeline.confine_vorticity(store);
    assert_eq!(store.read(GridId::Velocity).unwrap().data, data);
}

fn dye_field(
    sim: &FluidSimulator<CpuBackend>,
    mut f: impl FnMut(usize, usize) -> [f32; 4],
) -> Vec<f32> {
    let layout = sim.layout();
    let mut data = Vec::new();
    for y in 0..layout.fine_height as usize {
        for x in 0..layout.fine_width as usize {
            data.extend_from_slice(&f(x, y));
        }
    }
    data
}

#[test]
fn test_uniform_flow_moves_dye_in_surface_pixels() {
    let mut sim = simulator(SimConfig::with_surface(96, 48));
    let velocity = velocity_field(&sim, |_, _| [3.0, 0.0]);
    sim.write_field(GridId::Velocity, &velocity).unwrap();
    // Red stripe at x = 30, green on the left wall.
    let dye = dye_field(&sim, |x, _| match x {
        0 => [0.0, 0.5, 0.0, 1.0],
        30 => [1.0, 0.0, 0.0, 1.0],
        _ => [0.0; 4],
    });
    sim.write_field(GridId::Density, &dye).unwrap();

    let (pipeline, store) = sim.stages();
    pipeline.transport_density(store);
    let density = store.read(GridId::Density).unwrap();

    for y in [0, 20, 47] {
        assert_eq!(density.at(33, y), &[1.0, 0.0, 0.0, 1.0]);
        assert_eq!(density.at(30, y), &[0.0; 4]);
        assert_eq!(density.at(32, y)[0], 0.0);
        assert_eq!(density.at(34, y)[0], 0.0);
        // Traces past the wall sample the clamped edge column.
        for x in 0..=3 {
            assert_eq!(density.at(x, y), &[0.0, 0.5, 0.0, 1.0], "column {}", x);
        }
        assert_eq!(density.at(4, y), &[0.0; 4]);
    }
}

#[test]
fn test_dye_samples_coarse_velocity_at_pixel_centres() {
    let mut sim = simulator(SimConfig::with_surface(96, 48));
    // u equals the coarse column index, so the sampled velocity is the
    // coarse-space coordinate of the pixel.
    let velocity = velocity_field(&sim, |x, _| [x as f32, 0.0]);
    sim.write_field(GridId::Velocity, &velocity).unwrap();
    let dye = dye_field(&sim, |x, _| [x as f32 / 100.0, 0.0, 0.0, 1.0]);
    sim.write_field(GridId::Density, &dye).unwrap();

    let (pipeline, store) = sim.stages();
    pipeline.transport_density(store);
    let density = store.read(GridId::Density).unwrap();

    for x in [30usize, 45, 60] {
        let coarse = (x as f32 + 0.5) / 3.0 - 0.5;
        let expected = (x as f32 - coarse) / 100.0;
        let got = density.at(x, 10)[0];
        assert!(
            (got - expected).abs() < 1e-5,
            "pixel {}: expected {}, got {}",
            x,
            expected,
            got
        );
    }
}
