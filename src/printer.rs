use std::future::Future;

use log::{debug, info};

use crate::config::{DimensionOrder, PrinterConfig};
use crate::error::{DecodeError, Error, Result};
use crate::raster::{ImageEncoder, Raster};
use crate::protocol::{InfoType, cmd, to_hex};
use crate::status::{Heartbeat, PrintStatus, RfidInfo, StatusPoller};
use crate::transceiver::Transceiver;
use crate::transport::Transport;

/// Default response code offset: the printer answers command `c` with `c + 1`.
const DEFAULT_OFFSET: u8 = 1;
/// Offset used by the label setup commands and the status query.
const SETUP_OFFSET: u8 = 16;

/// Steps of a print job, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrintStage {
    SetLabelType,
    SetLabelDensity,
    StartPrint,
    AllowPrintClear,
    StartPagePrint,
    SetDimension,
    SetQuantity,
    SendImage,
    EndPagePrint,
    WaitForCompletion,
    EndPrint,
}

/// Everything needed to print one image.
#[derive(Debug, Clone)]
pub struct PrintJob {
    /// Label width in dots
    pub width: u16,
    /// Label height in dots
    pub height: u16,
    pub raster: Raster,
    /// Copies to print, at least 1
    pub quantity: u16,
    /// 1-3
    pub label_type: u8,
    /// 1-3
    pub density: u8,
}

impl PrintJob {
    /// A single copy of `raster`, sized to the raster, label type 1, density 2.
    pub fn new(raster: Raster) -> Self {
        Self {
            width: raster.width().min(u16::MAX as usize) as u16,
            height: raster.height().min(u16::MAX as usize) as u16,
            raster,
            quantity: 1,
            label_type: 1,
            density: 2,
        }
    }

    pub fn quantity(mut self, quantity: u16) -> Self {
        self.quantity = quantity;
        self
    }

    pub fn label_type(mut self, label_type: u8) -> Self {
        self.label_type = label_type;
        self
    }

    pub fn density(mut self, density: u8) -> Self {
        self.density = density;
        self
    }

    /// Checks every parameter against the printer limits.
    pub fn validate(&self, config: &PrinterConfig) -> Result<()> {
        check_dimension(self.width, self.height, config)?;
        if self.width as usize != self.raster.width() || self.height as usize != self.raster.height() {
            return Err(Error::InvalidParameter(format!(
                "label is {}x{} but the raster is {}x{}",
                self.width,
                self.height,
                self.raster.width(),
                self.raster.height()
            )));
        }
        check_level("label type", self.label_type)?;
        check_level("density", self.density)?;
        if self.quantity == 0 {
            return Err(Error::InvalidParameter("quantity must be at least 1".into()));
        }
        Ok(())
    }
}

/// Firmware and serial number, as hex strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfoSummary {
    pub soft_version: String,
    pub hard_version: String,
    pub serial: String,
}

/// Async printer API: single commands and whole print jobs.
///
/// - `transport`: implements Transport trait (BLE or mock)
/// - `config`: model limits and link tuning (default: D11)
pub struct Printer<T: Transport> {
    transceiver: Transceiver<T>,
    config: PrinterConfig,
    encoder: ImageEncoder,
}

impl<T: Transport> Printer<T> {
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, PrinterConfig::default())
    }

    pub fn with_config(transport: T, config: PrinterConfig) -> Self {
        Self {
            transceiver: Transceiver::with_config(transport, &config),
            encoder: ImageEncoder::from_config(&config),
            config,
        }
    }

    pub fn config(&self) -> &PrinterConfig {
        &self.config
    }

    pub fn transceiver(&self) -> &Transceiver<T> {
        &self.transceiver
    }

    /// End the session. The printer must not be used afterwards.
    pub async fn close(self) -> Result<T> {
        self.transceiver.close().await?;
        Ok(self.transceiver.into_transport())
    }

    async fn command(&self, command: u8, payload: &[u8], offset: u8) -> Result<Vec<u8>> {
        debug!("command {:#04x} {:02x?}", command, payload);
        self.transceiver
            .transceive(command, payload, command.wrapping_add(offset))
            .await
    }

    /// Runs a command and returns the first response byte.
    async fn command_byte(&self, command: u8, payload: &[u8], offset: u8) -> Result<u8> {
        let response = self.command(command, payload, offset).await?;
        Ok(response.first().copied().ok_or(DecodeError::Length {
            declared: 1,
            actual: 0,
        })?)
    }

    /// Reads one info value. The response code is `GET_INFO + info type`.
    pub async fn get_info(&self, info: InfoType) -> Result<Vec<u8>> {
        self.command(cmd::GET_INFO, &[info as u8], info as u8).await
    }

    /// Reads software version, hardware version and serial number.
    pub async fn get_info_summary(&self) -> Result<DeviceInfoSummary> {
        let soft_version = to_hex(&self.get_info(InfoType::SoftVersion).await?);
        let hard_version = to_hex(&self.get_info(InfoType::HardVersion).await?);
        let serial = to_hex(&self.get_info(InfoType::DeviceSerial).await?);
        Ok(DeviceInfoSummary {
            soft_version,
            hard_version,
            serial,
        })
    }

    /// Reads the label roll's RFID tag. `None` when no tag is present.
    pub async fn get_rfid(&self) -> Result<Option<RfidInfo>> {
        let payload = self.command(cmd::GET_RFID, &[1], DEFAULT_OFFSET).await?;
        Ok(RfidInfo::parse(&payload)?)
    }

    pub async fn heartbeat(&self) -> Result<Heartbeat> {
        let payload = self.command(cmd::HEARTBEAT, &[1], DEFAULT_OFFSET).await?;
        Ok(Heartbeat::parse(&payload))
    }

    pub async fn set_label_type(&self, label_type: u8) -> Result<u8> {
        check_level("label type", label_type)?;
        self.command_byte(cmd::SET_LABEL_TYPE, &[label_type], SETUP_OFFSET).await
    }

    pub async fn set_label_density(&self, density: u8) -> Result<u8> {
        check_level("density", density)?;
        self.command_byte(cmd::SET_LABEL_DENSITY, &[density], SETUP_OFFSET).await
    }

    pub async fn start_print(&self) -> Result<u8> {
        self.command_byte(cmd::START_PRINT, &[1], DEFAULT_OFFSET).await
    }

    pub async fn end_print(&self) -> Result<u8> {
        self.command_byte(cmd::END_PRINT, &[1], DEFAULT_OFFSET).await
    }

    pub async fn start_page_print(&self) -> Result<u8> {
        self.command_byte(cmd::START_PAGE_PRINT, &[1], DEFAULT_OFFSET).await
    }

    pub async fn end_page_print(&self) -> Result<u8> {
        self.command_byte(cmd::END_PAGE_PRINT, &[1], DEFAULT_OFFSET).await
    }

    pub async fn allow_print_clear(&self) -> Result<u8> {
        self.command_byte(cmd::ALLOW_PRINT_CLEAR, &[1], SETUP_OFFSET).await
    }

    /// Sets the label size in dots.
    pub async fn set_dimension(&self, width: u16, height: u16) -> Result<u8> {
        check_dimension(width, height, &self.config)?;
        let payload = dimension_payload(width, height, self.config.dimension_order);
        self.command_byte(cmd::SET_DIMENSION, &payload, DEFAULT_OFFSET).await
    }

    pub async fn set_quantity(&self, quantity: u16) -> Result<u8> {
        if quantity == 0 {
            return Err(Error::InvalidParameter("quantity must be at least 1".into()));
        }
        self.command_byte(cmd::SET_QUANTITY, &quantity.to_be_bytes(), DEFAULT_OFFSET)
            .await
    }

    pub async fn get_print_status(&self) -> Result<PrintStatus> {
        self.poller().print_status().await
    }

    /// Blocks until `quantity` pages have been printed.
    pub async fn wait_for_completion(&self, quantity: u16) -> Result<PrintStatus> {
        self.poller().wait_for_completion(quantity).await
    }

    /// Encodes and transfers a raster, one acknowledged slice at a time.
    pub async fn send_image(&self, raster: &Raster) -> Result<()> {
        let slices = self.encoder.encode_slices(raster)?;
        self.send_slices(&slices).await
    }

    async fn send_slices(&self, slices: &[Vec<u8>]) -> Result<()> {
        for (i, slice) in slices.iter().enumerate() {
            debug!("image slice {}/{} ({} bytes)", i + 1, slices.len(), slice.len());
            self.transceiver
                .transceive_raw(slice, cmd::IMAGE_RECEIVED)
                .await?;
        }
        Ok(())
    }

    /// Prints a job from label setup to end of print.
    ///
    /// Parameters are checked and the image is encoded before anything is
    /// sent. A failing step aborts the job and is reported as
    /// [`Error::Stage`]; no cleanup command is sent.
    pub async fn print(&self, job: &PrintJob) -> Result<()> {
        job.validate(&self.config)?;
        let slices = self.encoder.encode_slices(&job.raster)?;
        info!(
            "printing {}x{}, {} copies, label type {}, density {}",
            job.width, job.height, job.quantity, job.label_type, job.density
        );

        stage(PrintStage::SetLabelType, self.set_label_type(job.label_type)).await?;
        stage(PrintStage::SetLabelDensity, self.set_label_density(job.density)).await?;
        stage(PrintStage::StartPrint, self.start_print()).await?;
        stage(PrintStage::AllowPrintClear, self.allow_print_clear()).await?;
        stage(PrintStage::StartPagePrint, self.start_page_print()).await?;
        stage(PrintStage::SetDimension, self.set_dimension(job.width, job.height)).await?;
        stage(PrintStage::SetQuantity, self.set_quantity(job.quantity)).await?;
        stage(PrintStage::SendImage, self.send_slices(&slices)).await?;
        stage(PrintStage::EndPagePrint, self.end_page_print()).await?;
        stage(PrintStage::WaitForCompletion, self.wait_for_completion(job.quantity)).await?;
        stage(PrintStage::EndPrint, self.end_print()).await?;

        info!("printed {}x{}, {} copies", job.width, job.height, job.quantity);
        Ok(())
    }

    fn poller(&self) -> StatusPoller<'_, T> {
        StatusPoller::new(&self.transceiver, self.config.poll_interval)
    }
}

async fn stage<R>(stage: PrintStage, step: impl Future<Output = Result<R>>) -> Result<R> {
    debug!("print stage {:?}", stage);
    step.await.map_err(|e| Error::Stage {
        stage,
        source: Box::new(e),
    })
}

fn check_level(name: &str, value: u8) -> Result<()> {
    if (1..=3).contains(&value) {
        Ok(())
    } else {
        Err(Error::InvalidParameter(format!("{} must be 1-3, got {}", name, value)))
    }
}

fn check_dimension(width: u16, height: u16, config: &PrinterConfig) -> Result<()> {
    let max_width = config.max_width_px();
    let max_height = config.max_height_px();
    if width == 0 || width as u32 > max_width {
        return Err(Error::InvalidParameter(format!(
            "width must be 1-{}, got {}",
            max_width, width
        )));
    }
    if height == 0 || height as u32 > max_height {
        return Err(Error::InvalidParameter(format!(
            "height must be 1-{}, got {}",
            max_height, height
        )));
    }
    Ok(())
}

/// `SET_DIMENSION` payload: two big-endian u16 values.
pub fn dimension_payload(width: u16, height: u16, order: DimensionOrder) -> [u8; 4] {
    let (first, second) = match order {
        DimensionOrder::WidthHeight => (width, height),
        DimensionOrder::HeightWidth => (height, width),
    };
    let [a, b] = first.to_be_bytes();
    let [c, d] = second.to_be_bytes();
    [a, b, c, d]
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::{assert, let_assert};

    fn job() -> PrintJob {
        PrintJob::new(Raster::blank(96, 240).unwrap())
    }

    #[test]
    fn dimension_bytes_are_big_endian() {
        assert!(dimension_payload(96, 300, DimensionOrder::WidthHeight) == [0, 96, 1, 44]);
        assert!(dimension_payload(96, 300, DimensionOrder::HeightWidth) == [1, 44, 0, 96]);
    }

    #[test]
    fn default_job_is_valid() {
        let job = job();
        assert!(job.width == 96);
        assert!(job.height == 240);
        assert!(let Ok(()) = job.validate(&PrinterConfig::D11));
    }

    #[test]
    fn out_of_range_parameters_are_rejected() {
        let config = PrinterConfig::D11;
        let mut wide = job();
        wide.width = 121;
        let_assert!(Err(Error::InvalidParameter(_)) = wide.validate(&config));

        let mut tall = job();
        tall.height = 601;
        let_assert!(Err(Error::InvalidParameter(_)) = tall.validate(&config));

        let edge = PrintJob::new(Raster::blank(120, 600).unwrap());
        assert!(let Ok(()) = edge.validate(&config));

        let_assert!(Err(Error::InvalidParameter(_)) = job().label_type(0).validate(&config));
        let_assert!(Err(Error::InvalidParameter(_)) = job().label_type(4).validate(&config));
        let_assert!(Err(Error::InvalidParameter(_)) = job().density(4).validate(&config));
        let_assert!(Err(Error::InvalidParameter(_)) = job().quantity(0).validate(&config));
    }

    #[test]
    fn label_size_must_match_raster() {
        let config = PrinterConfig::D11;
        let mut taller = PrintJob::new(Raster::blank(96, 10).unwrap());
        taller.height = 600;
        let_assert!(Err(Error::InvalidParameter(message)) = taller.validate(&config));
        assert!(message.contains("96x10"));

        let mut narrower = job();
        narrower.width = 80;
        let_assert!(Err(Error::InvalidParameter(_)) = narrower.validate(&config));
    }
}
