use eframe::egui;
use glam::Vec2;
use image::RgbaImage;

use crate::backend::ComputeBackend;
use crate::simulator::{FluidSimulator, PresentationSurface};

/// Holds the latest frame until the next repaint uploads it.
#[derive(Default)]
pub struct FrameCanvas {
    pending: Option<egui::ColorImage>,
    texture: Option<egui::TextureHandle>,
}

impl PresentationSurface for FrameCanvas {
    fn present(&mut self, frame: &RgbaImage) {
        let size = [frame.width() as usize, frame.height() as usize];
        self.pending = Some(egui::ColorImage::from_rgba_unmultiplied(size, frame.as_raw()));
    }
}

impl FrameCanvas {
    fn texture(&mut self, ctx: &egui::Context) -> Option<&egui::TextureHandle> {
        if let Some(image) = self.pending.take() {
            match self.texture.as_mut() {
                Some(texture) => texture.set(image, egui::TextureOptions::LINEAR),
                None => {
                    self.texture =
                        Some(ctx.load_texture("fluid", image, egui::TextureOptions::LINEAR))
                }
            }
        }
        self.texture.as_ref()
    }
}

pub struct FluidApp<B: ComputeBackend> {
    simulation: FluidSimulator<B>,
    canvas: FrameCanvas,
    paused: bool,
    last_pointer: Option<Vec2>,
}

impl<B: ComputeBackend> FluidApp<B> {
    pub fn new(simulation: FluidSimulator<B>) -> Self {
        Self {
            simulation,
            canvas: FrameCanvas::default(),
            paused: false,
            last_pointer: None,
        }
    }

    fn surface_size(&self) -> egui::Vec2 {
        let config = self.simulation.config();
        egui::Vec2::new(config.surface_width as f32, config.surface_height as f32)
    }

    /// Canvas position to surface pixels.
    fn to_surface(&self, rect: egui::Rect, pos: egui::Pos2) -> Vec2 {
        let size = self.surface_size();
        let rel = (pos - rect.min) / rect.size() * size;
        Vec2::new(rel.x, rel.y)
    }

    fn handle_pointer(&mut self, rect: egui::Rect, response: &egui::Response) {
        if response.drag_started_by(egui::PointerButton::Primary) {
            if let Some(pos) = response.interact_pointer_pos() {
                let p = self.to_surface(rect, pos);
                self.simulation.press(p);
                self.last_pointer = Some(p);
            }
        }

        if let Some(pos) = response.hover_pos().or(response.interact_pointer_pos()) {
            let p = self.to_surface(rect, pos);
            if self.last_pointer != Some(p) {
                self.simulation.pointer_move(p);
                self.last_pointer = Some(p);
            }
        }

        if response.drag_stopped_by(egui::PointerButton::Primary) {
            self.simulation.release();
        }
    }
}

impl<B: ComputeBackend> eframe::App for FluidApp<B> {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if ctx.input(|i| i.key_pressed(egui::Key::Space)) {
            self.paused = !self.paused;
            log::info!("Simulation {}", if self.paused { "paused" } else { "resumed" });
        }
        if ctx.input(|i| i.key_pressed(egui::Key::C)) {
            self.simulation.reset();
        }

        egui::CentralPanel::default()
            .frame(egui::Frame::none().fill(egui::Color32::BLACK))
            .show(ctx, |ui| {
                let available = ui.available_size();
                let surface = self.surface_size();
                let fit = (available.x / surface.x).min(available.y / surface.y).max(0.1);

                let (rect, response) =
                    ui.allocate_exact_size(surface * fit, egui::Sense::click_and_drag());
                self.handle_pointer(rect, &response);

                if !self.paused {
                    if let Err(e) = self.simulation.tick_and_present(&mut self.canvas) {
                        log::error!("Frame {} failed: {}", self.simulation.frames(), e);
                    }
                }

                if let Some(texture) = self.canvas.texture(ctx) {
                    ui.painter().image(
                        texture.id(),
                        rect,
                        egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
                        egui::Color32::WHITE,
                    );
                }

                if self.paused {
                    ui.painter().text(
                        rect.left_top() + egui::vec2(8.0, 8.0),
                        egui::Align2::LEFT_TOP,
                        format!("Paused | Frame: {}", self.simulation.frames()),
                        egui::FontId::monospace(14.0),
                        egui::Color32::WHITE,
                    );
                }
            });

        ctx.request_repaint();
    }
}
