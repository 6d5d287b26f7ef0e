use embassy_stm32::can::{Can, CanRx, CanTx, Frame, Id, StandardId};
use embassy_stm32::peripherals::{CAN1, PB8, PB9};
use embassy_stm32::Peri;
use embassy_time::{with_timeout, Duration};

use bms_balancer::can_management::CanFrame;

use crate::Irqs;

const WRITE_TIMEOUT: Duration = Duration::from_millis(10);

#[derive(Debug, Copy, Clone, Eq, PartialEq, defmt::Format)]
pub enum CanError {
    Timeout,
    WriteError,
    ReadError,
}

/// Brings up CAN1 on PB8 (RX) / PB9 (TX).
pub async fn new_can1(
    peri: Peri<'static, CAN1>,
    rx: Peri<'static, PB8>,
    tx: Peri<'static, PB9>,
    bitrate: u32,
) -> Can<'static> {
    let mut can = Can::new(peri, rx, tx, Irqs);

    can.modify_config()
        .set_loopback(false)
        .set_silent(false)
        .set_automatic_retransmit(true);
    can.set_bitrate(bitrate);
    can.enable().await;
    can
}

pub struct CanWriter {
    tx: CanTx<'static>,
}

impl CanWriter {
    pub fn new(tx: CanTx<'static>) -> Self {
        CanWriter { tx }
    }

    pub async fn write(&mut self, frame: &CanFrame) -> Result<(), CanError> {
        let id = StandardId::new(frame.id()).ok_or(CanError::WriteError)?;
        let frame = Frame::new_data(id, frame.bytes()).map_err(|_| CanError::WriteError)?;

        match with_timeout(WRITE_TIMEOUT, self.tx.write(&frame)).await {
            Ok(_) => Ok(()),
            Err(_) => Err(CanError::Timeout),
        }
    }
}

pub struct CanReader {
    rx: CanRx<'static>,
}

impl CanReader {
    pub fn new(rx: CanRx<'static>) -> Self {
        CanReader { rx }
    }

    /// Next standard-identifier frame. Extended frames are not part of the
    /// pack protocol and are reported as read errors.
    pub async fn read(&mut self) -> Result<CanFrame, CanError> {
        let envelope = self.rx.read().await.map_err(|_| CanError::ReadError)?;
        match envelope.frame.id() {
            Id::Standard(id) => Ok(CanFrame::new(id.as_raw(), envelope.frame.data())),
            Id::Extended(_) => Err(CanError::ReadError),
        }
    }
}
