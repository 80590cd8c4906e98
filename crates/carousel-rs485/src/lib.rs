//! Carousel RS-485 - transport channel and hardware dispenser driver
//!
//! This crate owns everything that touches the serial bus:
//! - The channel abstraction over a serial port with the fixed bus
//!   configuration (9600 8N1, no flow control, 100 ms timeout)
//! - The dispenser wire framing with XOR checksum
//! - The hardware-backed dispenser driver and its probe operation
//! - The Adam-4052 auxiliary digital-input reader (drop sensors)

pub mod adam;
pub mod channel;
pub mod dispenser;
pub mod frame;

pub use channel::{Channel, ChannelError, SerialConfig, SharedChannel};
pub use dispenser::{probe, Rs485Dispenser};
pub use frame::{Frame, FrameError, Opcode};
