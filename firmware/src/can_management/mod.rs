pub mod can_controller;

pub use can_controller::{new_can1, CanError, CanReader, CanWriter};

use bms_balancer::can_management::{Registry, TelemetryBuffers};
use defmt::{info, warn};

/// Sends every bus packet of one telemetry snapshot, in registry order.
///
/// A frame that fails is logged and skipped; the next snapshot resends it.
pub async fn send_telemetry(
    registry: &Registry,
    buffers: &TelemetryBuffers,
    writer: &mut CanWriter,
) -> Result<(), CanError> {
    let mut result = Ok(());
    for frame in registry.frames(buffers) {
        match writer.write(&frame).await {
            Ok(()) => {}
            Err(CanError::Timeout) => {
                info!("Timeout Can connection on {:x}", frame.id());
                result = Err(CanError::Timeout);
            }
            Err(err) => {
                warn!("Can write error on {:x}: {}", frame.id(), err);
                result = Err(err);
            }
        }
    }
    result
}
