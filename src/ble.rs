//! BLE transport for D11-family printers, built on btleplug.
//!
//! The printer exposes one GATT characteristic that is written without
//! response and notifies every reply. Notifications are forwarded to the
//! single listener registered through [`Transport::on_notification`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{Central, CharPropFlags, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use log::{debug, info, trace};
use tokio::task::JoinHandle;
use uuid::{Uuid, uuid};

use crate::config::PrinterConfig;
use crate::error::{Error, Result};
use crate::printer::Printer;
use crate::protocol::to_hex;
use crate::transport::{ListenerSlot, NotificationListener, Transport};

/// Printer service advertised by the label printers.
pub const SERVICE_UUID: Uuid = uuid!("e7810a71-73ae-499d-8c15-faa9aef0c3f2");
/// Characteristic used for both commands and notifications.
pub const CHARACTERISTIC_UUID: Uuid = uuid!("bef8d6c9-9c21-4c9e-b632-bd58c1009f9f");

/// A printer seen during a scan.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub id: String,
    pub name: Option<String>,
    peripheral: Peripheral,
}

/// An open BLE session with one printer.
pub struct BleTransport {
    peripheral: Peripheral,
    characteristic: Characteristic,
    listeners: Arc<ListenerSlot>,
    forwarder: JoinHandle<()>,
}

impl BleTransport {
    /// Connects to a scanned device, subscribes to its notifications and
    /// starts forwarding them.
    pub async fn open(device: &DeviceInfo) -> Result<Self> {
        let peripheral = device.peripheral.clone();
        if !peripheral.is_connected().await? {
            peripheral.connect().await?;
        }
        peripheral.discover_services().await?;

        let characteristic = peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == CHARACTERISTIC_UUID)
            .ok_or_else(|| Error::Transport(format!("characteristic {} not found", CHARACTERISTIC_UUID)))?;
        if !characteristic.properties.contains(CharPropFlags::NOTIFY) {
            return Err(Error::Transport("printer characteristic does not notify".into()));
        }

        peripheral.subscribe(&characteristic).await?;
        let mut notifications = peripheral.notifications().await?;

        let listeners = Arc::new(ListenerSlot::new());
        let slot = listeners.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(notification) = notifications.next().await {
                if notification.uuid != CHARACTERISTIC_UUID {
                    continue;
                }
                if !slot.dispatch(notification.value.clone()) {
                    trace!("queued unsolicited notification {}", to_hex(&notification.value));
                }
            }
            debug!("notification stream ended");
            slot.clear();
        });

        info!("connected to {:?}", device.name);
        Ok(Self {
            peripheral,
            characteristic,
            listeners,
            forwarder,
        })
    }
}

#[async_trait]
impl Transport for BleTransport {
    async fn write(&self, data: &[u8]) -> Result<()> {
        self.peripheral
            .write(&self.characteristic, data, WriteType::WithoutResponse)
            .await?;
        Ok(())
    }

    fn on_notification(&self) -> NotificationListener {
        self.listeners.register()
    }

    fn discard_backlog(&self) {
        self.listeners.discard_backlog();
    }

    async fn close(&self) -> Result<()> {
        self.forwarder.abort();
        self.listeners.clear();
        if self.peripheral.is_connected().await? {
            self.peripheral.unsubscribe(&self.characteristic).await?;
            self.peripheral.disconnect().await?;
        }
        info!("disconnected");
        Ok(())
    }
}

impl Drop for BleTransport {
    fn drop(&mut self) {
        self.forwarder.abort();
    }
}

async fn first_adapter() -> Result<Adapter> {
    let manager = Manager::new().await?;
    manager
        .adapters()
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| Error::Transport("no bluetooth adapter found".into()))
}

/// Scans for printers advertising the printer service.
///
/// - `duration`: how long to scan
pub async fn scan(duration: Duration) -> Result<Vec<DeviceInfo>> {
    let adapter = first_adapter().await?;
    adapter
        .start_scan(ScanFilter {
            services: vec![SERVICE_UUID],
        })
        .await?;
    tokio::time::sleep(duration).await;
    adapter.stop_scan().await?;

    let mut devices = Vec::new();
    for peripheral in adapter.peripherals().await? {
        let Some(properties) = peripheral.properties().await? else {
            continue;
        };
        // some platforms ignore the scan filter
        if !properties.services.contains(&SERVICE_UUID) {
            continue;
        }
        debug!("found {} {:?}", peripheral.id(), properties.local_name);
        devices.push(DeviceInfo {
            id: peripheral.id().to_string(),
            name: properties.local_name,
            peripheral,
        });
    }
    Ok(devices)
}

/// Opens a printer session with the default D11 configuration.
///
/// - `device`: a device returned by [`scan`]
/// - `timeout`: limit for connecting and discovering the characteristic
pub async fn connect(device: &DeviceInfo, timeout: Duration) -> Result<Printer<BleTransport>> {
    connect_with_config(device, timeout, PrinterConfig::default()).await
}

pub async fn connect_with_config(
    device: &DeviceInfo,
    timeout: Duration,
    config: PrinterConfig,
) -> Result<Printer<BleTransport>> {
    let transport = tokio::time::timeout(timeout, BleTransport::open(device))
        .await
        .map_err(|_| Error::Timeout {
            timeout_ms: timeout.as_millis() as u64,
        })??;
    Ok(Printer::with_config(transport, config))
}
