//! niimprint: print monochrome labels on D11-family label printers via BLE.
//!
//! Main modules:
//! - protocol: packet framing and the command table
//! - transport: the write/notify seam, [`ble`] implements it over BLE
//! - transceiver: request/response exchange with timeout
//! - raster: monochrome rasters and line command encoding
//! - status: status decoding and completion polling
//! - printer: single commands and the print job sequence
//! - dithering: turn photos and drawings into rasters

pub mod ble;
pub mod config;
pub mod dithering;
pub mod error;
pub mod printer;
pub mod protocol;
pub mod raster;
pub mod status;
pub mod transceiver;
pub mod transport;

/// BLE API: scan/connect to printers
pub use ble::{BleTransport, DeviceInfo, connect, scan};
pub use config::{DimensionOrder, PrinterConfig};
pub use error::{DecodeError, Error, Result};
/// Printer API
pub use printer::{DeviceInfoSummary, PrintJob, PrintStage, Printer};
/// Protocol utilities (packets, unit conversion)
pub use protocol::{InfoType, Packet, decode, encode, mm_to_px, px_to_mm};
pub use raster::{ImageEncoder, ImageLine, LineKind, Raster};
pub use status::{Heartbeat, PrintStatus, RfidInfo, StatusPoller};
pub use transceiver::Transceiver;
pub use transport::{ListenerSlot, NotificationListener, Transport};
