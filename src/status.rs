//! Device status responses and print completion polling.

use std::time::Duration;

use log::debug;

use crate::error::{DecodeError, Result};
use crate::protocol::{cmd, to_hex};
use crate::transceiver::Transceiver;
use crate::transport::Transport;

/// Response offset of the status query.
const PRINT_STATUS_OFFSET: u8 = 16;

/// Progress of the running print job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrintStatus {
    /// Pages printed so far
    pub page: u16,
    pub progress1: u8,
    pub progress2: u8,
}

impl PrintStatus {
    /// Parses a `GET_PRINT_STATUS` response payload.
    ///
    /// - payload[0..2]: printed pages, big-endian
    /// - payload[2], payload[3]: progress counters
    pub fn parse(payload: &[u8]) -> std::result::Result<Self, DecodeError> {
        if payload.len() < 4 {
            return Err(DecodeError::Length {
                declared: 4,
                actual: payload.len(),
            });
        }
        Ok(Self {
            page: u16::from_be_bytes([payload[0], payload[1]]),
            progress1: payload[2],
            progress2: payload[3],
        })
    }
}

/// Decoded heartbeat. Which fields are present depends on the firmware,
/// which is told apart by the payload length.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Heartbeat {
    pub closing_state: Option<u8>,
    pub power_level: Option<u8>,
    pub paper_state: Option<u8>,
    pub rfid_read_state: Option<u8>,
}

impl Heartbeat {
    pub fn parse(payload: &[u8]) -> Self {
        let back = |n: usize| payload.get(payload.len().wrapping_sub(n)).copied();
        match payload.len() {
            20 => Self {
                paper_state: back(2),
                rfid_read_state: back(1),
                ..Self::default()
            },
            13 | 19 => Self {
                closing_state: back(4),
                power_level: back(3),
                paper_state: back(2),
                rfid_read_state: back(1),
            },
            10 => Self {
                closing_state: back(2),
                power_level: back(1),
                rfid_read_state: back(2),
                ..Self::default()
            },
            9 => Self {
                closing_state: back(1),
                ..Self::default()
            },
            _ => Self::default(),
        }
    }
}

/// Label roll information read from its RFID tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RfidInfo {
    pub uuid: String,
    pub barcode: String,
    pub serial: String,
    pub total_len: u16,
    pub used_len: u16,
    pub label_type: u8,
}

impl RfidInfo {
    /// Parses a `GET_RFID` response. A leading zero byte means no tag.
    pub fn parse(payload: &[u8]) -> std::result::Result<Option<Self>, DecodeError> {
        if payload.first().is_none_or(|&b| b == 0) {
            return Ok(None);
        }
        let mut reader = Reader::new(payload);
        let uuid = to_hex(reader.take(8)?);
        let len = reader.byte()? as usize;
        let barcode = String::from_utf8_lossy(reader.take(len)?).into_owned();
        let len = reader.byte()? as usize;
        let serial = String::from_utf8_lossy(reader.take(len)?).into_owned();
        let total_len = reader.u16_be()?;
        let used_len = reader.u16_be()?;
        let label_type = reader.byte()?;
        Ok(Some(Self {
            uuid,
            barcode,
            serial,
            total_len,
            used_len,
            label_type,
        }))
    }
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> std::result::Result<&'a [u8], DecodeError> {
        let end = self.pos + n;
        let out = self.data.get(self.pos..end).ok_or(DecodeError::Length {
            declared: end,
            actual: self.data.len(),
        })?;
        self.pos = end;
        Ok(out)
    }

    fn byte(&mut self) -> std::result::Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    fn u16_be(&mut self) -> std::result::Result<u16, DecodeError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }
}

/// Polls the print status until enough pages are done.
pub struct StatusPoller<'a, T: Transport> {
    transceiver: &'a Transceiver<T>,
    interval: Duration,
}

impl<'a, T: Transport> StatusPoller<'a, T> {
    pub fn new(transceiver: &'a Transceiver<T>, interval: Duration) -> Self {
        Self { transceiver, interval }
    }

    /// Issues one status query.
    pub async fn print_status(&self) -> Result<PrintStatus> {
        let payload = self
            .transceiver
            .transceive(cmd::GET_PRINT_STATUS, &[1], cmd::GET_PRINT_STATUS + PRINT_STATUS_OFFSET)
            .await?;
        Ok(PrintStatus::parse(&payload)?)
    }

    /// Queries until the printed page count reaches `target`.
    ///
    /// There is no retry limit; the first transceiver error ends the wait.
    pub async fn wait_for_completion(&self, target: u16) -> Result<PrintStatus> {
        loop {
            let status = self.print_status().await?;
            if status.page >= target {
                return Ok(status);
            }
            debug!("printed {}/{} pages ({:?})", status.page, target, status);
            tokio::time::sleep(self.interval).await;
        }
    }
}
