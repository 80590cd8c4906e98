//! Wire framing for the dispenser bus
//!
//! Requests and responses share one shape:
//!
//! ```text
//! [SOH] [address] [opcode/status] [len] [payload ...] [checksum]
//! ```
//!
//! The checksum is the XOR of every byte after SOH up to the payload's
//! end. In a request the third byte is an opcode; in a response it is a
//! status byte, zero for success.

use thiserror::Error;

/// Frame start byte
pub const SOH: u8 = 0x01;

/// Status byte of a successful response
pub const STATUS_OK: u8 = 0x00;

/// Largest payload a frame may carry
pub const MAX_PAYLOAD: usize = 32;

/// Commands understood by dispenser units
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    /// Presence check used by the bus scanner
    Probe = 0x01,
    /// Eject the current item; response carries its code
    Dispense = 0x10,
    /// Return the unit to its home state
    Reset = 0x11,
    MotorOn = 0x12,
    MotorOff = 0x13,
    /// Advance to the next item; response carries its code
    LoadNext = 0x14,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame truncated: expected {expected} bytes, got {got}")]
    Truncated { expected: usize, got: usize },
    #[error("invalid start byte 0x{0:02x}")]
    BadStart(u8),
    #[error("checksum mismatch: expected 0x{expected:02x}, got 0x{got:02x}")]
    ChecksumMismatch { expected: u8, got: u8 },
    #[error("payload too large: {0} bytes")]
    Oversize(usize),
    #[error("response address mismatch: expected {expected}, got {got}")]
    AddressMismatch { expected: u8, got: u8 },
    #[error("device fault, status 0x{0:02x}")]
    DeviceFault(u8),
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// A single bus frame. `code` is the opcode of a request or the status
/// byte of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub address: u8,
    pub code: u8,
    pub payload: Vec<u8>,
}

impl Frame {
    /// Build a payload-less request frame.
    pub fn request(address: u8, opcode: Opcode) -> Self {
        Self {
            address,
            code: opcode as u8,
            payload: Vec::new(),
        }
    }

    /// XOR checksum over address, code, length, and payload.
    pub fn checksum(address: u8, code: u8, payload: &[u8]) -> u8 {
        payload
            .iter()
            .fold(address ^ code ^ payload.len() as u8, |acc, b| acc ^ b)
    }

    /// Serialize for the wire.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(5 + self.payload.len());
        buf.push(SOH);
        buf.push(self.address);
        buf.push(self.code);
        buf.push(self.payload.len() as u8);
        buf.extend_from_slice(&self.payload);
        buf.push(Self::checksum(self.address, self.code, &self.payload));
        buf
    }

    /// Parse a complete frame from `buf`.
    pub fn decode(buf: &[u8]) -> Result<Self, FrameError> {
        if buf.len() < 5 {
            return Err(FrameError::Truncated {
                expected: 5,
                got: buf.len(),
            });
        }
        if buf[0] != SOH {
            return Err(FrameError::BadStart(buf[0]));
        }
        let len = buf[3] as usize;
        if len > MAX_PAYLOAD {
            return Err(FrameError::Oversize(len));
        }
        let total = 5 + len;
        if buf.len() < total {
            return Err(FrameError::Truncated {
                expected: total,
                got: buf.len(),
            });
        }
        let payload = buf[4..4 + len].to_vec();
        let expected = Self::checksum(buf[1], buf[2], &payload);
        let got = buf[4 + len];
        if expected != got {
            return Err(FrameError::ChecksumMismatch { expected, got });
        }
        Ok(Self {
            address: buf[1],
            code: buf[2],
            payload,
        })
    }

    /// Treat this frame as a response and check its status byte.
    pub fn status_ok(&self) -> Result<(), FrameError> {
        if self.code == STATUS_OK {
            Ok(())
        } else {
            Err(FrameError::DeviceFault(self.code))
        }
    }

    /// Extract the 8-byte big-endian item code a dispense or load
    /// response carries.
    pub fn item_code(&self) -> Result<u64, FrameError> {
        let bytes: [u8; 8] = self.payload.as_slice().try_into().map_err(|_| {
            FrameError::Malformed(format!(
                "item code payload is {} bytes, expected 8",
                self.payload.len()
            ))
        })?;
        Ok(u64::from_be_bytes(bytes))
    }
}
