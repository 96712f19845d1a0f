//! One-at-a-time request/response exchange over a notification transport.
//!
//! The printer pushes every notification onto the same characteristic, so a
//! response has to be picked out of whatever else the device emits. A
//! request is answered by the first notification carrying the expected
//! command code, the device error code (0xDB) or the unimplemented code (0).
//! Anything else is skipped and the transceiver listens again.

use std::time::Duration;

use log::{debug, trace};

use crate::config::PrinterConfig;
use crate::error::{Error, Result};
use crate::protocol::{self, Packet, chunk_data, cmd, to_hex};
use crate::transport::{NotificationListener, Transport};

/// Receive loop state for one request.
#[derive(Debug)]
pub enum ReceiveState {
    AwaitingResponse,
    Resolved(Vec<u8>),
    Failed(Error),
}

impl ReceiveState {
    /// Classifies a decoded notification while waiting for `expected`.
    pub fn on_packet(expected: u8, packet: Packet) -> Self {
        match packet.command {
            cmd::DEVICE_ERROR => ReceiveState::Failed(Error::Device {
                payload: packet.payload,
            }),
            cmd::UNIMPLEMENTED => ReceiveState::Failed(Error::Unimplemented { expected }),
            code if code == expected => ReceiveState::Resolved(packet.payload),
            _ => ReceiveState::AwaitingResponse,
        }
    }
}

/// Owns the request/response channel to one printer.
pub struct Transceiver<T: Transport> {
    transport: T,
    timeout: Duration,
    chunk_size: usize,
}

impl<T: Transport> Transceiver<T> {
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, &PrinterConfig::default())
    }

    pub fn with_config(transport: T, config: &PrinterConfig) -> Self {
        Self {
            transport,
            timeout: config.response_timeout,
            chunk_size: config.chunk_size,
        }
    }

    /// Sets how long each notification may take to arrive.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Writes `data` in chunks of at most `chunk_size` bytes, one after the other.
    ///
    /// - `data`: raw bytes, usually one or more framed packets
    /// - `chunk_size`: bytes per write
    pub async fn send_raw(&self, data: &[u8], chunk_size: usize) -> Result<()> {
        for chunk in chunk_data(data, chunk_size) {
            trace!("TX {}", to_hex(chunk));
            self.transport.write(chunk).await?;
        }
        Ok(())
    }

    /// Waits for the next notification and decodes it.
    ///
    /// - `timeout`: how long to wait
    ///
    /// Returns the decoded packet, or [`Error::Timeout`]
    pub async fn receive_one(&self, timeout: Duration) -> Result<Packet> {
        let listener = self.transport.on_notification();
        self.receive_on(listener, timeout).await
    }

    /// Sends one command and waits for the response coded `expected`.
    ///
    /// - `command`: command byte
    /// - `payload`: command payload, at most 255 bytes
    /// - `expected`: response command code
    ///
    /// Returns the response payload
    pub async fn transceive(&self, command: u8, payload: &[u8], expected: u8) -> Result<Vec<u8>> {
        if payload.len() > protocol::MAX_PAYLOAD {
            return Err(Error::InvalidParameter(format!(
                "payload of {} bytes does not fit one packet",
                payload.len()
            )));
        }
        self.transceive_raw(&protocol::encode(command, payload), expected)
            .await
    }

    /// Sends pre-framed bytes and waits for the response coded `expected`.
    ///
    /// The send and the receive loop run concurrently and both run to the
    /// end, so a response that arrives early never cuts a transfer short.
    /// The listener for the first response is registered before anything is
    /// written. A receive error is reported before a send error.
    pub async fn transceive_raw(&self, data: &[u8], expected: u8) -> Result<Vec<u8>> {
        self.transport.discard_backlog();
        let listener = self.transport.on_notification();
        let send = self.send_raw(data, self.chunk_size);
        let receive = self.receive_response(listener, expected);
        let (sent, received) = futures::join!(send, receive);
        let payload = received?;
        sent?;
        Ok(payload)
    }

    /// Ends the session.
    pub async fn close(&self) -> Result<()> {
        self.transport.close().await
    }

    async fn receive_response(&self, first: NotificationListener, expected: u8) -> Result<Vec<u8>> {
        let mut listener = first;
        loop {
            let packet = self.receive_on(listener, self.timeout).await?;
            let command = packet.command;
            match ReceiveState::on_packet(expected, packet) {
                ReceiveState::AwaitingResponse => {
                    debug!("skipping notification {:#04x} while waiting for {:#04x}", command, expected);
                    listener = self.transport.on_notification();
                }
                ReceiveState::Resolved(payload) => return Ok(payload),
                ReceiveState::Failed(e) => return Err(e),
            }
        }
    }

    async fn receive_on(&self, listener: NotificationListener, timeout: Duration) -> Result<Packet> {
        let raw = match tokio::time::timeout(timeout, listener).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(_)) => return Err(Error::Transport("notification listener dropped".into())),
            Err(_) => {
                return Err(Error::Timeout {
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
        };
        trace!("RX {}", to_hex(&raw));
        Ok(protocol::decode(&raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::{assert, let_assert};

    #[test]
    fn expected_code_resolves() {
        let_assert!(
            ReceiveState::Resolved(payload) = ReceiveState::on_packet(51, Packet::new(51, vec![0]))
        );
        assert!(payload == [0]);
    }

    #[test]
    fn error_codes_fail_regardless_of_expected() {
        for expected in [0x33u8, 0xB3, 0xD3] {
            let_assert!(
                ReceiveState::Failed(Error::Device { .. }) =
                    ReceiveState::on_packet(expected, Packet::new(cmd::DEVICE_ERROR, vec![]))
            );
        }
        let_assert!(
            ReceiveState::Failed(Error::Unimplemented { expected: 0x33 }) =
                ReceiveState::on_packet(0x33, Packet::new(cmd::UNIMPLEMENTED, vec![1]))
        );
    }

    #[test]
    fn unrelated_codes_keep_waiting() {
        let state = ReceiveState::on_packet(51, Packet::new(cmd::HEARTBEAT + 1, vec![1, 2]));
        assert!(let ReceiveState::AwaitingResponse = state);
    }
}
