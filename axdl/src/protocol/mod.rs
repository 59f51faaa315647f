//! The BSL wire protocol: packet framing, checksum, and opcodes.

pub mod checksum;
pub mod chunk;
pub mod frame;
pub mod name;

pub use checksum::checksum16;
pub use chunk::{IMAGE_CHUNK_SIZE, LOADER_CHUNK_SIZE, midst_header};
pub use frame::{MAGIC, decode, encode};
pub use name::{NAME_BYTES, decode_name, encode_name};

/// Host-to-device command opcodes.
pub mod opcode {
    /// Begin a session against the currently running loader generation.
    pub const CONNECT: u16 = 0x00;
    /// Announce an incoming blob (loader download or image burn).
    pub const START_DATA: u16 = 0x01;
    /// One chunk of an in-progress blob transfer.
    pub const MIDST_DATA: u16 = 0x02;
    /// The blob transfer is complete.
    pub const ENDED_DATA: u16 = 0x03;
    /// Transfer execution to the just-downloaded loader.
    pub const EXEC_DATA: u16 = 0x04;
    /// Ask the device to reboot.
    pub const RESET: u16 = 0x05;
    /// Erase a flash partition (or the whole device).
    pub const ERASE_FLASH: u16 = 0x0A;
    /// Replace the flash partition table.
    pub const REPARTITION: u16 = 0x0B;
}

/// Device-to-host reply opcodes.
pub mod reply {
    /// Generic positive acknowledgement.
    pub const ACK: u16 = 0x80;
    /// Handshake banner reply.
    pub const VERSION: u16 = 0x81;
    /// Reserved; not produced during a normal flash. See the design
    /// notes on why this is kept but never matched on.
    pub const FLASH_DATA: u16 = 0x93;
}
