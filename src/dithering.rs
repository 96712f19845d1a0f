//! Grayscale to monochrome conversion for label images.

use std::path::Path;

use image::imageops::{self, FilterType};
use image::{GrayImage, Luma};
use imageproc::drawing::draw_filled_circle_mut;
use log::debug;

use crate::error::Result;
use crate::raster::Raster;

/// Luma values below this print as black.
const BLACK_BELOW: u8 = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageDithering {
    #[default]
    Threshold,
    FloydSteinberg,
    Atkinson,
    Halftone,
    Bayer,
}

impl ImageDithering {
    /// Dithers `img` down to pure black and white, keeping its size.
    pub fn apply(self, img: &GrayImage) -> GrayImage {
        let mut out = img.clone();
        match self {
            ImageDithering::Threshold => threshold(&mut out),
            ImageDithering::FloydSteinberg => imageops::dither(&mut out, &imageops::BiLevel),
            ImageDithering::Atkinson => atkinson(&mut out),
            ImageDithering::Bayer => bayer(&mut out),
            ImageDithering::Halftone => {
                let (w, h) = img.dimensions();
                out = imageops::crop_imm(&halftone(img), 0, 0, w, h).to_image();
            }
        }
        out
    }
}

/// Turns a black and white image into a raster: dark pixels are set.
pub fn raster_from_gray(img: &GrayImage) -> Result<Raster> {
    let (w, h) = img.dimensions();
    let pixels = img.pixels().map(|p| p[0] < BLACK_BELOW).collect();
    Raster::new(w as usize, h as usize, pixels)
}

/// Loads an image file and converts it into a printable raster.
///
/// The image is scaled to `width` dots, keeping its aspect ratio, cut to at
/// most `max_height` rows and dithered.
///
/// - `path`: path to image file
/// - `width`: printer row width in dots
/// - `max_height`: label height limit in dots
/// - `dithering`: dithering algorithm to apply
pub fn raster_from_path(
    path: impl AsRef<Path>,
    width: u32,
    max_height: u32,
    dithering: ImageDithering,
) -> Result<Raster> {
    let gray = image::open(path.as_ref())?.to_luma8();
    let (orig_w, orig_h) = gray.dimensions();
    let scale = width as f32 / orig_w.max(1) as f32;
    let height = ((orig_h as f32 * scale).round() as u32).clamp(1, max_height.max(1));
    debug!(
        "scaling {}x{} image from {} to {}x{}",
        orig_w,
        orig_h,
        path.as_ref().display(),
        width,
        height
    );
    let resized = imageops::resize(&gray, width, height, FilterType::Lanczos3);
    raster_from_gray(&dithering.apply(&resized))
}

fn threshold(img: &mut GrayImage) {
    for pixel in img.pixels_mut() {
        pixel[0] = if pixel[0] < BLACK_BELOW { 0 } else { 255 };
    }
}

/// Atkinson error diffusion: 6/8 of the error spread to six neighbours.
fn atkinson(img: &mut GrayImage) {
    let (width, height) = img.dimensions();
    let (w, h) = (width as i64, height as i64);
    let raw: &mut [u8] = &mut **img;
    for y in 0..h {
        for x in 0..w {
            let idx = (y * w + x) as usize;
            let old = raw[idx];
            let new = if old < BLACK_BELOW { 0 } else { 255 };
            raw[idx] = new;
            let share = (old as i16 - new as i16) / 8;
            for (dx, dy) in [(1, 0), (2, 0), (-1, 1), (0, 1), (1, 1), (0, 2)] {
                let (nx, ny) = (x + dx, y + dy);
                if nx >= 0 && nx < w && ny < h {
                    let n = (ny * w + nx) as usize;
                    raw[n] = (raw[n] as i16 + share).clamp(0, 255) as u8;
                }
            }
        }
    }
}

/// Ordered dithering with a 4x4 Bayer matrix.
fn bayer(img: &mut GrayImage) {
    const MATRIX: [[u8; 4]; 4] = [[0, 8, 2, 10], [12, 4, 14, 6], [3, 11, 1, 9], [15, 7, 13, 5]];
    for (x, y, pixel) in img.enumerate_pixels_mut() {
        let level = MATRIX[(y % 4) as usize][(x % 4) as usize] as u16 * 16 + 8;
        pixel[0] = if pixel[0] as u16 >= level { 255 } else { 0 };
    }
}

/// Halftone: one dot per 4x4 cell, radius growing with cell darkness.
///
/// The result is padded up to a multiple of the cell size.
fn halftone(img: &GrayImage) -> GrayImage {
    const CELL: u32 = 4;
    const GAIN: f32 = 3.0;
    let (width, height) = img.dimensions();
    let mut canvas = GrayImage::from_pixel(
        width.div_ceil(CELL) * CELL,
        height.div_ceil(CELL) * CELL,
        Luma([255]),
    );

    for cy in (0..height).step_by(CELL as usize) {
        for cx in (0..width).step_by(CELL as usize) {
            let mut sum = 0u32;
            let mut n = 0u32;
            for y in cy..(cy + CELL).min(height) {
                for x in cx..(cx + CELL).min(width) {
                    sum += img.get_pixel(x, y)[0] as u32;
                    n += 1;
                }
            }
            let darkness = 1.0 - (sum as f32 / n as f32) / 255.0;
            let radius = (GAIN * darkness * CELL as f32 / 2.0) as i32;
            if radius > 0 {
                let mut cell = GrayImage::from_pixel(CELL, CELL, Luma([255]));
                draw_filled_circle_mut(&mut cell, (CELL as i32 / 2, CELL as i32 / 2), radius, Luma([0]));
                imageops::overlay(&mut canvas, &cell, cx as i64, cy as i64);
            }
        }
    }
    canvas
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::{assert, let_assert};

    fn gradient(width: u32, height: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, _| Luma([(x * 255 / (width - 1)) as u8]))
    }

    #[test]
    fn threshold_splits_at_midpoint() {
        let img = gradient(96, 2);
        let_assert!(Ok(raster) = raster_from_gray(&ImageDithering::Threshold.apply(&img)));
        assert!(raster.width() == 96);
        assert!(raster.height() == 2);
        assert!(raster.get(0, 0));
        assert!(!raster.get(95, 1));
    }

    #[test]
    fn every_mode_keeps_size_and_is_bilevel() {
        let img = gradient(96, 10);
        for mode in [
            ImageDithering::Threshold,
            ImageDithering::FloydSteinberg,
            ImageDithering::Atkinson,
            ImageDithering::Bayer,
            ImageDithering::Halftone,
        ] {
            let out = mode.apply(&img);
            assert!(out.dimensions() == (96, 10), "{:?}", mode);
            assert!(out.pixels().all(|p| p[0] == 0 || p[0] == 255), "{:?}", mode);
        }
    }

    #[test]
    fn white_image_is_blank() {
        let img = GrayImage::from_pixel(96, 8, Luma([255]));
        for mode in [ImageDithering::Atkinson, ImageDithering::Halftone, ImageDithering::Bayer] {
            let raster = raster_from_gray(&mode.apply(&img)).unwrap();
            assert!(raster.pixels().iter().all(|on| !on), "{:?}", mode);
        }
    }
}
