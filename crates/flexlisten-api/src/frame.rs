// ── Discovery frame seam ──
//
// Radios broadcast their discovery payload wrapped in a binary VITA-49
// frame. Decoding that frame is not this crate's job: the LAN listener is
// handed a `FrameDecoder` and only looks at the classification and the
// payload bytes it returns.

use bytes::Bytes;

/// Classification reported by the frame decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameClass {
    /// Radio discovery announcement; payload is `key=value` ASCII text.
    Discovery,
    /// Anything else seen on the discovery port.
    Other,
}

/// A decoded datagram.
#[derive(Debug, Clone)]
pub struct Frame {
    pub class: FrameClass,
    pub payload: Bytes,
}

impl Frame {
    pub fn discovery(payload: impl Into<Bytes>) -> Self {
        Self {
            class: FrameClass::Discovery,
            payload: payload.into(),
        }
    }

    /// The discovery text with trailing NUL padding removed.
    ///
    /// Returns `None` for non-discovery frames and for payloads that are
    /// not valid UTF-8.
    pub fn discovery_text(&self) -> Option<&str> {
        if self.class != FrameClass::Discovery {
            return None;
        }
        std::str::from_utf8(&self.payload)
            .ok()
            .map(|text| text.trim_end_matches('\0'))
    }
}

/// Turns a raw datagram into a classified [`Frame`].
///
/// Returns `None` when the datagram is not a recognizable frame at all.
pub trait FrameDecoder: Send + Sync {
    fn decode(&self, datagram: &[u8]) -> Option<Frame>;
}

/// Decoder that treats every datagram as an already-unwrapped discovery
/// payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughDecoder;

impl FrameDecoder for PassthroughDecoder {
    fn decode(&self, datagram: &[u8]) -> Option<Frame> {
        Some(Frame::discovery(Bytes::copy_from_slice(datagram)))
    }
}
