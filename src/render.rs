use image::{ImageBuffer, Rgb, RgbImage, Rgba, RgbaImage};

use crate::grid::FieldSnapshot;

/// Maps one dye texel to a displayable RGBA value in [0, 1].
/// `fluid.wgsl` carries the same curve in its `render` entry point.
pub fn tone_map(dye: &[f32]) -> [f32; 4] {
    [
        dye[0].clamp(0.0, 1.0),
        dye[1].clamp(0.0, 1.0),
        dye[2].clamp(0.0, 1.0),
        1.0,
    ]
}

pub struct Renderer {
    width: u32,
    height: u32,
}

impl Renderer {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Converts the render kernel's output grid to an image.
    pub fn output_to_image(output: &FieldSnapshot) -> RgbaImage {
        ImageBuffer::from_fn(output.width as u32, output.height as u32, |x, y| {
            let texel = output.at(x as usize, y as usize);
            Rgba([
                to_byte(texel[0]),
                to_byte(texel[1]),
                to_byte(texel[2]),
                to_byte(texel[3]),
            ])
        })
    }

    /// Red for |u|, green for |v|, scaled so `max_speed` saturates.
    pub fn render_velocity_field(&self, velocity: &FieldSnapshot, max_speed: f32) -> RgbImage {
        let mut img = ImageBuffer::new(self.width, self.height);
        let max_speed = max_speed.max(f32::EPSILON);

        for (x, y, pixel) in img.enumerate_pixels_mut() {
            let sim_x = (x as f32 / self.width as f32 * velocity.width as f32) as usize;
            let sim_y = (y as f32 / self.height as f32 * velocity.height as f32) as usize;

            if sim_x < velocity.width && sim_y < velocity.height {
                let v = velocity.at(sim_x, sim_y);
                let r = to_byte(v[0].abs() / max_speed);
                let g = to_byte(v[1].abs() / max_speed);
                *pixel = Rgb([r, g, 128]);
            } else {
                *pixel = Rgb([0, 0, 0]);
            }
        }

        img
    }
}

fn to_byte(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}
