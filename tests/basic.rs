use dyeflow::{CpuBackend, FluidError, FluidSimulator, GridId, SimConfig};
use glam::Vec2;

fn small_config() -> SimConfig {
    SimConfig {
        force_radius: 6.0,
        ..SimConfig::with_surface(96, 72)
    }
}

#[test]
fn test_simulator_creation() {
    let mut sim = FluidSimulator::new(CpuBackend::new(), small_config()).unwrap();
    let layout = *sim.layout();
    assert_eq!((layout.coarse_width, layout.coarse_height), (32, 24));
    assert_eq!((layout.fine_width, layout.fine_height), (96, 72));

    let velocity = sim.read_field(GridId::Velocity).unwrap();
    assert_eq!((velocity.width, velocity.height, velocity.channels), (32, 24, 2));
    let density = sim.read_field(GridId::Density).unwrap();
    assert_eq!((density.width, density.height, density.channels), (96, 72, 4));
    assert!(velocity.is_zero() && density.is_zero());
}

#[test]
fn test_invalid_config_fails_construction() {
    let config = SimConfig {
        scale: 0,
        ..SimConfig::default()
    };
    let result = FluidSimulator::new(CpuBackend::new(), config);
    assert!(matches!(result, Err(FluidError::InvalidConfig(_))));
}

#[test]
fn test_zero_input_stays_zero() {
    let mut sim = FluidSimulator::new(CpuBackend::new(), small_config()).unwrap();
    for _ in 0..10 {
        sim.tick();
    }
    assert_eq!(sim.frames(), 10);

    for grid in [
        GridId::Velocity,
        GridId::Divergence,
        GridId::Pressure,
        GridId::Density,
    ] {
        assert!(sim.read_field(grid).unwrap().is_zero(), "{} drifted", grid.name());
    }

    let output = sim.read_field(GridId::Output).unwrap();
    assert!(output.cells().all(|t| t == [0.0, 0.0, 0.0, 1.0]));
}

#[test]
fn test_frame_image_matches_surface() {
    let mut sim = FluidSimulator::new(CpuBackend::new(), small_config()).unwrap();
    sim.press_with_color(Vec2::new(48.0, 36.0), [1.0, 0.0, 0.0]);
    sim.pointer_move(Vec2::new(50.0, 36.0));
    sim.tick();

    let img = sim.frame_image().unwrap();
    assert_eq!(img.dimensions(), (96, 72));
    let centre = img.get_pixel(50, 36);
    assert!(centre[0] > 0, "dye should be visible at the impulse");
    assert_eq!(centre[3], 255);
}

#[test]
fn test_reset_clears_fields() {
    let mut sim = FluidSimulator::new(CpuBackend::new(), small_config()).unwrap();
    sim.apply_impulse(Vec2::new(40.0, 30.0), Vec2::new(30.0, 30.0), [0.5, 0.5, 0.5]);
    sim.tick();
    assert!(!sim.read_field(GridId::Density).unwrap().is_zero());

    sim.reset();
    for grid in GridId::ALL {
        assert!(sim.read_field(grid).unwrap().is_zero(), "{} not cleared", grid.name());
    }
}

#[test]
fn test_config_round_trips_through_file() {
    let path = std::env::temp_dir().join(format!("dyeflow_config_{}.json", std::process::id()));
    let config = SimConfig {
        jacobi_iterations: 32,
        vorticity: 0.0,
        ..small_config()
    };
    config.save(&path).unwrap();
    let loaded = SimConfig::load(&path).unwrap();
    std::fs::remove_file(&path).ok();
    assert_eq!(loaded, config);
}

#[test]
fn test_load_rejects_missing_file() {
    let result = SimConfig::load(std::path::Path::new("/nonexistent/dyeflow.json"));
    assert!(matches!(result, Err(FluidError::Io(_))));
}
