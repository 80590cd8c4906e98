//! Adam-4052 auxiliary digital inputs
//!
//! The secondary serial channel carries an Adam-4052 isolated digital
//! input module wired to the per-chute drop sensors. The module speaks
//! an ASCII protocol: `$AA6\r` requests the input states of unit `AA`
//! and the reply is `!AAdd` with `dd` the input bitmap in hex.

use tracing::trace;

use crate::channel::{Channel, ChannelError};
use crate::frame::FrameError;

/// Bus unit number the Adam module is configured to
pub const DEFAULT_UNIT: u8 = 0x01;

/// Read the digital input bitmap of Adam unit `unit`.
pub async fn read_inputs(channel: &mut Channel, unit: u8) -> Result<u8, ChannelError> {
    let command = format!("${:02X}6\r", unit);
    let line = channel.transceive_line(&command).await?;
    let inputs = parse_inputs(&line, unit)?;
    trace!(unit, inputs = format!("{:08b}", inputs), "Read Adam inputs");
    Ok(inputs)
}

/// Parse an `!AAdd` response line.
fn parse_inputs(line: &str, unit: u8) -> Result<u8, FrameError> {
    let body = line
        .strip_prefix('!')
        .ok_or_else(|| FrameError::Malformed(format!("unexpected Adam response '{line}'")))?;
    if body.len() < 4 {
        return Err(FrameError::Malformed(format!(
            "Adam response '{line}' too short"
        )));
    }
    let echoed = u8::from_str_radix(&body[..2], 16)
        .map_err(|_| FrameError::Malformed(format!("bad unit echo in '{line}'")))?;
    if echoed != unit {
        return Err(FrameError::AddressMismatch {
            expected: unit,
            got: echoed,
        });
    }
    u8::from_str_radix(&body[2..4], 16)
        .map_err(|_| FrameError::Malformed(format!("bad input bitmap in '{line}'")))
}
