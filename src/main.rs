use dyeflow::{
    AnalysisRecorder, FluidApp, FluidError, FluidSimulator, ImageExporter, SimConfig,
    default_backend,
};
use glam::Vec2;
use std::path::{Path, PathBuf};

struct Args {
    headless: bool,
    frames: usize,
    out_dir: PathBuf,
    config: Option<PathBuf>,
}

fn parse_args() -> Args {
    let mut args = Args {
        headless: false,
        frames: 60,
        out_dir: PathBuf::from("frames"),
        config: None,
    };
    let mut positional = Vec::new();
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => args.config = iter.next().map(PathBuf::from),
            "headless" => args.headless = true,
            _ => positional.push(arg),
        }
    }
    if let Some(frames) = positional.first().and_then(|s| s.parse().ok()) {
        args.frames = frames;
    }
    if let Some(dir) = positional.get(1) {
        args.out_dir = PathBuf::from(dir);
    }
    args
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = parse_args();

    let config = match &args.config {
        Some(path) => SimConfig::load(path)?,
        None => SimConfig::default(),
    };

    if args.headless {
        run_headless(config, args.frames, &args.out_dir)?;
    } else {
        run_gui_app(config)?;
    }

    Ok(())
}

/// Drags a seeded stroke across the surface and exports every frame.
fn run_headless(config: SimConfig, frames: usize, out_dir: &Path) -> Result<(), FluidError> {
    println!("Running headless simulation for {} frames...", frames);

    let (width, height) = (config.surface_width as f32, config.surface_height as f32);
    let mut simulation = FluidSimulator::new(default_backend()?, config)?;
    let exporter = ImageExporter::new(width as u32, height as u32);
    let mut recorder = AnalysisRecorder::new();
    std::fs::create_dir_all(out_dir)?;

    let start = Vec2::new(width * 0.2, height * 0.5);
    let end = Vec2::new(width * 0.8, height * 0.5);
    let stroke_frames = (frames / 3).max(1);
    simulation.press_seeded(start, 42);

    for frame in 0..frames {
        if frame < stroke_frames {
            let t = (frame + 1) as f32 / stroke_frames as f32;
            let wobble = Vec2::new(0.0, (t * std::f32::consts::TAU).sin() * height * 0.1);
            simulation.pointer_move(start.lerp(end, t) + wobble);
        } else if frame == stroke_frames {
            simulation.release();
        }

        simulation.tick();
        exporter.export_frame_png(
            &mut simulation,
            &out_dir.join(format!("frame_{:04}.png", frame)),
        )?;

        let metrics = recorder.record_frame(&mut simulation)?;
        if frame % 10 == 0 {
            metrics.print_summary();
        }
    }
    exporter.export_velocity_png(&mut simulation, &out_dir.join("velocity_final.png"))?;

    recorder.print_trends();
    println!(
        "Exported {} frames to {} ({} parameter uploads)",
        frames,
        out_dir.display(),
        simulation.parameter_uploads()
    );
    Ok(())
}

fn run_gui_app(config: SimConfig) -> Result<(), Box<dyn std::error::Error>> {
    let size = [config.surface_width as f32, config.surface_height as f32];
    let simulation = FluidSimulator::new(default_backend()?, config)?;

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size(size)
            .with_title("dyeflow - Space: pause, C: clear"),
        ..Default::default()
    };

    eframe::run_native(
        "dyeflow",
        options,
        Box::new(|_cc| Box::new(FluidApp::new(simulation))),
    )?;
    Ok(())
}
