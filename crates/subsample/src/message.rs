//! Opaque message buffers for the coordinator/worker exchange.
//!
//! A [`Message`] is a byte buffer with typed push/pop operations. Fields are
//! popped in the order they were pushed; the payload types (integers,
//! doubles, points) are whatever the job encodings of the
//! [`coordinator`](crate::coordinator) say they are.

use serde::{de::DeserializeOwned, Serialize};

/// A byte buffer with typed, ordered push/pop.
#[derive(Debug, Clone, Default)]
pub struct Message {
    /// The encoded fields, back to back.
    bytes: Vec<u8>,
    /// Read position for [`pop`](Self::pop).
    cursor: usize,
}

impl Message {
    /// Creates an empty message.
    #[must_use]
    pub const fn new() -> Self {
        Self { bytes: Vec::new(), cursor: 0 }
    }

    /// Appends one field.
    ///
    /// # Panics
    ///
    /// If the value cannot be encoded; payload types are plain data, so this
    /// is a programmer error.
    pub fn push<T: Serialize>(&mut self, value: &T) {
        if let Err(e) = bincode::serialize_into(&mut self.bytes, value) {
            panic!("failed to encode message field: {e}");
        }
    }

    /// Reads the next field.
    ///
    /// # Errors
    ///
    /// If the buffer is exhausted or the bytes do not decode as `T`; a
    /// malformed message is an input-format error.
    pub fn pop<T: DeserializeOwned>(&mut self) -> Result<T, String> {
        let mut reader = &self.bytes[self.cursor..];
        let before = reader.len();
        let value = bincode::deserialize_from(&mut reader).map_err(|e| format!("malformed message field: {e}"))?;
        self.cursor += before - reader.len();
        Ok(value)
    }

    /// Whether every pushed field has been popped.
    #[must_use]
    pub fn is_drained(&self) -> bool {
        self.cursor >= self.bytes.len()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn fields_pop_in_push_order() {
        let mut message = Message::new();
        message.push(&1_i64);
        message.push(&"pair".to_string());
        message.push(&2.5_f64);

        assert_eq!(message.pop::<i64>().unwrap(), 1);
        assert_eq!(message.pop::<String>().unwrap(), "pair");
        assert_eq!(message.pop::<f64>().unwrap(), 2.5);
        assert!(message.is_drained());
    }

    #[test]
    fn popping_past_the_end_is_an_error() {
        let mut message = Message::new();
        message.push(&7_i64);
        let _ = message.pop::<i64>().unwrap();
        assert!(message.pop::<i64>().is_err());
    }

    #[test]
    fn wrong_width_pop_is_an_error() {
        let mut message = Message::new();
        message.push(&7_u8);
        assert!(message.pop::<i64>().is_err());
    }
}
