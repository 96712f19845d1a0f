//! Monochrome rasters and their encoding into printer line commands.
//!
//! Every raster row becomes one of three commands:
//!
//! | Row content | Command | Body |
//! |-------------|---------|------|
//! | no pixels set | `IMAGE_CLEAR` (0x84) | none |
//! | few pixels set | `IMAGE_SET` (0x83) | big-endian u16 column indices |
//! | otherwise | `IMAGE_DATA` (0x85) | packed bitmap, MSB = leftmost |
//!
//! Payload layout: `y_hi y_lo [count per 32-pixel group..] repeat [body..]`.
//! Clear rows carry no group counts. Identical consecutive rows are merged
//! into one command with a repeat count.

use crate::config::PrinterConfig;
use crate::error::{Error, Result};
use crate::protocol::{Packet, cmd};

/// Row-major monochrome pixel buffer. `true` is a printed (black) dot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Raster {
    width: usize,
    height: usize,
    pixels: Vec<bool>,
}

impl Raster {
    /// Wraps a pixel buffer.
    ///
    /// - `width`: pixels per row, must be > 0
    /// - `height`: number of rows
    /// - `pixels`: row-major, exactly `width * height` entries
    pub fn new(width: usize, height: usize, pixels: Vec<bool>) -> Result<Self> {
        if width == 0 {
            return Err(Error::InvalidRaster("width must be > 0".into()));
        }
        let required = width
            .checked_mul(height)
            .ok_or_else(|| Error::InvalidRaster("width*height overflow".into()))?;
        if pixels.len() != required {
            return Err(Error::InvalidRaster(format!(
                "expected {} pixels for {}x{}, got {}",
                required,
                width,
                height,
                pixels.len()
            )));
        }
        Ok(Self { width, height, pixels })
    }

    /// An all-white raster.
    pub fn blank(width: usize, height: usize) -> Result<Self> {
        Self::new(width, height, vec![false; width.saturating_mul(height)])
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn pixels(&self) -> &[bool] {
        &self.pixels
    }

    /// Pixel at (`x`, `y`); out of range reads as white.
    pub fn get(&self, x: usize, y: usize) -> bool {
        x < self.width && y < self.height && self.pixels[y * self.width + x]
    }

    /// Sets a pixel; out of range writes are ignored.
    pub fn set(&mut self, x: usize, y: usize, on: bool) {
        if x < self.width && y < self.height {
            self.pixels[y * self.width + x] = on;
        }
    }

    /// Row `y`, or `None` past the last row.
    pub fn row(&self, y: usize) -> Option<&[bool]> {
        if y < self.height {
            Some(&self.pixels[y * self.width..(y + 1) * self.width])
        } else {
            None
        }
    }

    pub fn rows(&self) -> impl Iterator<Item = &[bool]> {
        self.pixels.chunks(self.width)
    }
}

/// Body of one line command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineKind {
    Clear,
    Sparse(Vec<u16>),
    Dense(Vec<u8>),
}

/// One encoded line command, possibly covering several identical rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageLine {
    /// First raster row this command covers
    pub y: u16,
    /// How many times the printer repeats the line
    pub repeat: u8,
    /// Set pixels in each 32-pixel group, empty for clear lines
    pub group_counts: Vec<u8>,
    pub kind: LineKind,
}

impl ImageLine {
    /// Classifies and encodes one raster row.
    ///
    /// - `y`: row offset
    /// - `row`: the row's pixels
    /// - `repeat`: number of identical rows starting at `y`
    pub fn from_row(y: u16, row: &[bool], repeat: u8) -> Self {
        let set: Vec<u16> = row
            .iter()
            .enumerate()
            .filter(|(_, on)| **on)
            .map(|(x, _)| x as u16)
            .collect();

        if set.is_empty() {
            return Self {
                y,
                repeat,
                group_counts: Vec::new(),
                kind: LineKind::Clear,
            };
        }

        let group_counts = row
            .chunks(32)
            .map(|group| group.iter().filter(|on| **on).count() as u8)
            .collect();

        // an index list costs two bytes per set pixel
        let kind = if set.len() * 2 < row.len().div_ceil(8) {
            LineKind::Sparse(set)
        } else {
            LineKind::Dense(pack_row(row))
        };

        Self {
            y,
            repeat,
            group_counts,
            kind,
        }
    }

    pub fn command(&self) -> u8 {
        match self.kind {
            LineKind::Clear => cmd::IMAGE_CLEAR,
            LineKind::Sparse(_) => cmd::IMAGE_SET,
            LineKind::Dense(_) => cmd::IMAGE_DATA,
        }
    }

    pub fn payload(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(3 + self.group_counts.len() + 16);
        out.extend_from_slice(&self.y.to_be_bytes());
        out.extend_from_slice(&self.group_counts);
        out.push(self.repeat);
        match &self.kind {
            LineKind::Clear => {}
            LineKind::Sparse(indices) => {
                for index in indices {
                    out.extend_from_slice(&index.to_be_bytes());
                }
            }
            LineKind::Dense(bits) => out.extend_from_slice(bits),
        }
        out
    }

    pub fn to_packet(&self) -> Packet {
        Packet::new(self.command(), self.payload())
    }
}

/// Packs a row into bytes, bit `7 - b` of byte `x / 8` holding pixel `x + b`.
pub fn pack_row(row: &[bool]) -> Vec<u8> {
    row.chunks(8)
        .map(|group| {
            group
                .iter()
                .enumerate()
                .filter(|(_, on)| **on)
                .fold(0u8, |bits, (b, _)| bits | 1 << (7 - b))
        })
        .collect()
}

/// Turns rasters into line commands grouped for transfer.
#[derive(Debug, Clone, Copy)]
pub struct ImageEncoder {
    row_width: usize,
    max_rows_per_slice: usize,
}

impl ImageEncoder {
    /// - `row_width`: the only raster width the printer accepts
    /// - `max_rows_per_slice`: raster rows per transfer round trip
    pub fn new(row_width: usize, max_rows_per_slice: usize) -> Self {
        Self {
            row_width,
            max_rows_per_slice: max_rows_per_slice.max(1),
        }
    }

    pub fn from_config(config: &PrinterConfig) -> Self {
        Self::new(config.row_width, config.max_rows_per_slice)
    }

    pub fn row_width(&self) -> usize {
        self.row_width
    }

    /// Encodes a raster into merged line commands.
    ///
    /// Returns [`Error::UnsupportedWidth`] if the raster width differs from
    /// the printer row width.
    pub fn encode(&self, raster: &Raster) -> Result<Vec<ImageLine>> {
        if raster.width() != self.row_width {
            return Err(Error::UnsupportedWidth {
                width: raster.width(),
                expected: self.row_width,
            });
        }
        if raster.height() > u16::MAX as usize {
            return Err(Error::InvalidRaster(format!(
                "{} rows do not fit a 16-bit row offset",
                raster.height()
            )));
        }

        // a merged run must fit both the repeat byte and one slice
        let max_run = self.max_rows_per_slice.min(u8::MAX as usize);
        let rows: Vec<&[bool]> = raster.rows().collect();
        let mut lines = Vec::new();
        let mut y = 0;
        while y < rows.len() {
            let row = rows[y];
            let mut run = 1;
            while run < max_run && y + run < rows.len() && rows[y + run] == row {
                run += 1;
            }
            lines.push(ImageLine::from_row(y as u16, row, run as u8));
            y += run;
        }
        Ok(lines)
    }

    /// Groups lines so that no group covers more than `max_rows_per_slice` rows.
    pub fn slice<'a>(&self, lines: &'a [ImageLine]) -> Vec<&'a [ImageLine]> {
        let mut slices = Vec::new();
        let mut start = 0;
        let mut rows = 0;
        for (i, line) in lines.iter().enumerate() {
            let repeat = line.repeat as usize;
            if rows + repeat > self.max_rows_per_slice && i > start {
                slices.push(&lines[start..i]);
                start = i;
                rows = 0;
            }
            rows += repeat;
        }
        if start < lines.len() {
            slices.push(&lines[start..]);
        }
        slices
    }

    /// Encodes a raster into framed byte blocks, one per transfer round trip.
    pub fn encode_slices(&self, raster: &Raster) -> Result<Vec<Vec<u8>>> {
        let lines = self.encode(raster)?;
        Ok(self
            .slice(&lines)
            .into_iter()
            .map(|slice| slice.iter().flat_map(|line| line.to_packet().encode()).collect())
            .collect())
    }
}

impl Default for ImageEncoder {
    fn default() -> Self {
        Self::from_config(&PrinterConfig::default())
    }
}
