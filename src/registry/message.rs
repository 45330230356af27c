//! Broadcast message type

use bytes::Bytes;

/// A message submitted for delivery
///
/// Cheap to clone: every bucket's copy shares the same `Bytes` allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushMessage {
    payload: Bytes,
}

impl PushMessage {
    /// Create a message from any byte payload
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    /// Create a message from text
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(text.into())
    }

    /// The payload written to each connection
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Payload length in bytes
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Check if the payload is empty
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

impl From<String> for PushMessage {
    fn from(text: String) -> Self {
        Self::text(text)
    }
}

impl From<&'static str> for PushMessage {
    fn from(text: &'static str) -> Self {
        Self::new(Bytes::from_static(text.as_bytes()))
    }
}
