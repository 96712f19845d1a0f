//! Printer model parameters.
//!
//! | Model | Row width | Resolution | Max label |
//! |-------|-----------|------------|-----------|
//! | D11 | 96 dots | 203 DPI | 15 x 75 mm |

use std::time::Duration;

use crate::protocol::mm_to_px;

/// Byte order of the two values sent with `SET_DIMENSION`.
///
/// Firmware variants disagree on this; check against the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DimensionOrder {
    #[default]
    WidthHeight,
    HeightWidth,
}

/// Hardware and link parameters for a printer model.
#[derive(Debug, Clone, Copy)]
pub struct PrinterConfig {
    /// Printer model name
    pub name: &'static str,

    /// Width in dots of every image line the printer accepts
    pub row_width: usize,

    /// Largest label width accepted by `SET_DIMENSION`
    pub max_width_mm: u32,

    /// Largest label height accepted by `SET_DIMENSION`
    pub max_height_mm: u32,

    /// Bytes per BLE write
    pub chunk_size: usize,

    /// How long to wait for each notification
    pub response_timeout: Duration,

    /// Raster rows sent per image round trip
    pub max_rows_per_slice: usize,

    /// Pause between print status queries
    pub poll_interval: Duration,

    pub dimension_order: DimensionOrder,
}

impl PrinterConfig {
    /// Niimbot D11: 203 DPI, 12mm print head.
    pub const D11: PrinterConfig = PrinterConfig {
        name: "D11",
        row_width: 96,
        max_width_mm: 15,
        max_height_mm: 75,
        chunk_size: 150,
        response_timeout: Duration::from_millis(1000),
        max_rows_per_slice: 200,
        poll_interval: Duration::from_millis(1),
        dimension_order: DimensionOrder::WidthHeight,
    };

    /// Largest label width in dots.
    pub fn max_width_px(&self) -> u32 {
        mm_to_px(self.max_width_mm)
    }

    /// Largest label height in dots.
    pub fn max_height_px(&self) -> u32 {
        mm_to_px(self.max_height_mm)
    }
}

impl Default for PrinterConfig {
    fn default() -> Self {
        Self::D11
    }
}
