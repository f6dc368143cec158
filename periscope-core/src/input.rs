//! Pointer-event relay with outbound backpressure.
//!
//! Pointer tracking is latest-wins: when the server stops draining its
//! socket, stale samples are dropped rather than buffered. A dropped
//! sample is correct behaviour, not a failure, so nothing here returns
//! an error to the caller.

use tracing::trace;

use crate::transport::WriterHandle;
use crate::wire::{self, ButtonMask};

/// Forward one pointer sample through the writer, gated by the
/// outbound queue depth.
///
/// Coordinates are bounded to the current geometry by the caller.
/// Returns whether the event was enqueued; `false` covers both the
/// backpressure drop and a writer that is already gone.
pub fn forward_pointer(
    writer: &WriterHandle,
    queue_limit: usize,
    x: u16,
    y: u16,
    buttons: ButtonMask,
) -> bool {
    if writer.queued_bytes() >= queue_limit {
        trace!(x, y, queued = writer.queued_bytes(), "pointer event dropped under backpressure");
        return false;
    }
    writer.send(wire::pointer_event(buttons, x, y)).is_ok()
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    /// A writer double: no task drains the channel, so the gauge holds
    /// whatever has been enqueued.
    fn idle_writer() -> (WriterHandle, tokio::sync::mpsc::Receiver<Bytes>) {
        WriterHandle::channel()
    }

    #[tokio::test]
    async fn empty_queue_forwards_exactly_one_message() {
        let (writer, mut rx) = idle_writer();

        assert!(forward_pointer(&writer, 2048, 500, 300, ButtonMask::LEFT));

        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.len(), 6);
        assert_eq!(msg[0], wire::MSG_POINTER_EVENT);
        assert_eq!(msg[1], ButtonMask::LEFT.bits());
        assert_eq!(u16::from_be_bytes([msg[2], msg[3]]), 500);
        assert_eq!(u16::from_be_bytes([msg[4], msg[5]]), 300);

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn queue_below_threshold_still_forwards() {
        let (writer, mut rx) = idle_writer();
        writer.send(Bytes::from(vec![0u8; 2000])).unwrap();
        assert_eq!(writer.queued_bytes(), 2000);

        assert!(forward_pointer(&writer, 2048, 10, 20, ButtonMask::empty()));

        // The backlog message, then the pointer event.
        assert_eq!(rx.recv().await.unwrap().len(), 2000);
        let msg = rx.recv().await.unwrap();
        assert_eq!(msg[0], wire::MSG_POINTER_EVENT);
    }

    #[tokio::test]
    async fn queue_above_threshold_drops_without_error() {
        let (writer, mut rx) = idle_writer();
        writer.send(Bytes::from(vec![0u8; 3000])).unwrap();
        assert_eq!(writer.queued_bytes(), 3000);

        assert!(!forward_pointer(&writer, 2048, 10, 20, ButtonMask::LEFT));

        // Only the backlog is in the channel; no pointer message.
        assert_eq!(rx.recv().await.unwrap().len(), 3000);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn queue_at_threshold_drops() {
        let (writer, _rx) = idle_writer();
        writer.send(Bytes::from(vec![0u8; 2048])).unwrap();
        assert!(!forward_pointer(&writer, 2048, 0, 0, ButtonMask::empty()));
    }

    #[tokio::test]
    async fn dead_writer_drops_without_error() {
        let (writer, rx) = idle_writer();
        drop(rx);
        assert!(!forward_pointer(&writer, 2048, 1, 1, ButtonMask::RIGHT));
    }
}
