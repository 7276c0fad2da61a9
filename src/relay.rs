// Relay Module
// Moves pass-through lines between the serial host and the broker.
// Nothing is queued: a line that cannot be published now is dropped.

use log::{debug, warn};

use crate::config::{LINE_TERMINATOR, PASSTHROUGH_MARKER};
use crate::hal::{BrokerTransport, SerialLink};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    Published,
    Dropped,
}

/// Publish one pass-through payload (marker already stripped) to `topic`
pub fn forward_to_broker<B: BrokerTransport + ?Sized>(
    broker: &mut B,
    topic: &str,
    payload: &[u8],
) -> RelayOutcome {
    if !broker.is_connected() {
        warn!("⚠️ Broker not connected - dropping serial line ({} bytes)", payload.len());
        return RelayOutcome::Dropped;
    }

    match broker.publish(topic, payload) {
        Ok(()) => {
            debug!("📤 Published {} bytes to '{}'", payload.len(), topic);
            RelayOutcome::Published
        }
        Err(e) => {
            warn!("⚠️ Publish to '{}' failed: {:?} - line dropped", topic, e);
            RelayOutcome::Dropped
        }
    }
}

/// Serial frame for a broker delivery: marker, payload without trailing
/// CR/LF, one line terminator
pub fn frame_inbound(payload: &[u8]) -> Vec<u8> {
    let end = payload
        .iter()
        .rposition(|&b| b != b'\r' && b != b'\n')
        .map_or(0, |i| i + 1);

    let mut frame = Vec::with_capacity(end + 1 + LINE_TERMINATOR.len());
    let mut marker = [0u8; 4];
    frame.extend_from_slice(PASSTHROUGH_MARKER.encode_utf8(&mut marker).as_bytes());
    frame.extend_from_slice(&payload[..end]);
    frame.extend_from_slice(LINE_TERMINATOR.as_bytes());
    frame
}

/// Write a broker delivery to the serial host
pub fn forward_to_serial<S: SerialLink + ?Sized>(serial: &mut S, topic: &str, payload: &[u8]) {
    debug!("📥 Delivery on '{}' ({} bytes)", topic, payload.len());
    if let Err(e) = serial.write(&frame_inbound(payload)) {
        warn!("⚠️ Serial write failed: {:?}", e);
    }
}
