//! Packet framing and the printer command table.
//!
//! Wire format: `55 55 <cmd> <len> <payload..> <checksum> AA AA`, where the
//! checksum is the XOR of `cmd`, `len` and every payload byte.

use crate::error::DecodeError;

pub const HEADER: [u8; 2] = [0x55, 0x55];
pub const FOOTER: [u8; 2] = [0xAA, 0xAA];

/// Largest payload a single length byte can describe.
pub const MAX_PAYLOAD: usize = u8::MAX as usize;

/// Framing overhead: header, command, length, checksum, footer.
const FRAME_OVERHEAD: usize = 7;

/// Printer command codes.
pub mod cmd {
    pub const GET_INFO: u8 = 0x40;
    pub const GET_RFID: u8 = 0x1A;
    pub const HEARTBEAT: u8 = 0xDC;
    pub const SET_LABEL_TYPE: u8 = 0x23;
    pub const SET_LABEL_DENSITY: u8 = 0x21;
    pub const START_PRINT: u8 = 0x01;
    pub const END_PRINT: u8 = 0xF3;
    pub const START_PAGE_PRINT: u8 = 0x03;
    pub const END_PAGE_PRINT: u8 = 0xE3;
    pub const ALLOW_PRINT_CLEAR: u8 = 0x20;
    pub const SET_DIMENSION: u8 = 0x13;
    pub const SET_QUANTITY: u8 = 0x15;
    pub const GET_PRINT_STATUS: u8 = 0xA3;
    /// Sparse line: list of set pixel indices.
    pub const IMAGE_SET: u8 = 0x83;
    pub const IMAGE_CLEAR: u8 = 0x84;
    /// Dense line: packed bitmap.
    pub const IMAGE_DATA: u8 = 0x85;
    pub const IMAGE_RECEIVED: u8 = 0xD3;

    /// Response code the printer uses to report a failure.
    pub const DEVICE_ERROR: u8 = 0xDB;
    /// Response code for commands the printer does not know.
    pub const UNIMPLEMENTED: u8 = 0x00;
}

/// Sub-types for [`cmd::GET_INFO`].
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfoType {
    Density = 1,
    PrintSpeed = 2,
    LabelType = 3,
    LanguageType = 6,
    AutoShutdownTime = 7,
    DeviceType = 8,
    SoftVersion = 9,
    Battery = 10,
    DeviceSerial = 11,
    HardVersion = 12,
}

/// A decoded packet: command code plus payload, framing stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub command: u8,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn new(command: u8, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            command,
            payload: payload.into(),
        }
    }

    /// Frames this packet for the wire.
    pub fn encode(&self) -> Vec<u8> {
        encode(self.command, &self.payload)
    }
}

/// Computes the packet checksum: XOR of command, length byte and payload.
///
/// - `command`: command byte
/// - `payload`: command payload
///
/// Returns the checksum byte
pub fn checksum(command: u8, payload: &[u8]) -> u8 {
    payload
        .iter()
        .fold(command ^ payload.len() as u8, |acc, &b| acc ^ b)
}

/// Builds a framed packet ready to send.
///
/// The payload must fit a single length byte; longer payloads are the
/// caller's problem (see [`MAX_PAYLOAD`]).
///
/// - `command`: command byte
/// - `payload`: command payload
///
/// Returns Vec<u8> ready to send
pub fn encode(command: u8, payload: &[u8]) -> Vec<u8> {
    debug_assert!(payload.len() <= MAX_PAYLOAD);
    let mut out = Vec::with_capacity(FRAME_OVERHEAD + payload.len());
    out.extend_from_slice(&HEADER);
    out.push(command);
    out.push(payload.len() as u8);
    out.extend_from_slice(payload);
    out.push(checksum(command, payload));
    out.extend_from_slice(&FOOTER);
    out
}

/// Parses and validates a framed packet from the printer.
///
/// Checks are applied in order: framing, checksum, declared length.
///
/// - `data`: raw notification bytes
///
/// Returns the decoded [`Packet`] on success
pub fn decode(data: &[u8]) -> Result<Packet, DecodeError> {
    if data.len() < FRAME_OVERHEAD {
        return Err(DecodeError::Frame);
    }
    let (head, rest) = data.split_at(2);
    let (body, foot) = rest.split_at(rest.len() - 2);
    if head != HEADER || foot != FOOTER {
        return Err(DecodeError::Frame);
    }

    // body = cmd, len, payload.., checksum
    let (&message, contents) = body.split_last().ok_or(DecodeError::Frame)?;
    let computed = contents.iter().fold(0u8, |acc, &b| acc ^ b);
    if computed != message {
        return Err(DecodeError::Checksum { message, computed });
    }

    let command = contents[0];
    let declared = contents[1] as usize;
    let payload = &contents[2..];
    if payload.len() != declared {
        return Err(DecodeError::Length {
            declared,
            actual: payload.len(),
        });
    }

    Ok(Packet::new(command, payload))
}

/// Splits data into chunks of given size.
///
/// - `data`: input bytes
/// - `chunk_size`: size of each chunk
///
/// Returns Vec of byte slices
pub fn chunk_data(data: &[u8], chunk_size: usize) -> Vec<&[u8]> {
    if chunk_size == 0 {
        return vec![data];
    }
    data.chunks(chunk_size).collect()
}

/// Printer resolution in dots per inch.
pub const DPI: u32 = 203;

/// Millimetres to printer dots, rounding up.
pub fn mm_to_px(mm: u32) -> u32 {
    ((mm as f64) / 25.4 * DPI as f64).ceil() as u32
}

/// Printer dots to millimetres, rounding down.
pub fn px_to_mm(px: u32) -> u32 {
    ((px as f64) / DPI as f64 * 25.4).floor() as u32
}

/// Formats bytes as lowercase hex without separators.
pub fn to_hex(data: &[u8]) -> String {
    data.iter().map(|b| format!("{:02x}", b)).collect()
}
