#![no_std]
#![doc = include_str!("../README.md")]

mod command;
#[cfg(feature = "ds1820")]
pub mod ds1820;
mod error;
mod id;
mod master;
mod search;
mod wire;

pub use command::{OpCode, RomCommand};
pub use error::Error;
pub use id::{DeviceId, ParseIdError};
pub use master::Master;
pub use search::{DeviceIter, SearchState, SearchStatus};
pub use wire::{Inverted, OpenDrainWire};

/// Feeds one byte into a running Dow/Maxim CRC8 (polynomial
/// x^8 + x^5 + x^4 + 1, bit-reflected), as used for ROM identifiers
/// and scratchpad frames.
pub fn crc8_update(crc: u8, byte: u8) -> u8 {
    let mut crc = crc;
    let mut byte = byte;
    for _ in 0..8 {
        let mix = (crc ^ byte) & 0x01;
        crc >>= 1;
        if mix != 0x00 {
            crc ^= 0x8C;
        }
        byte >>= 1;
    }
    crc
}

/// Runs the Dow/Maxim CRC8 over `data`, continuing from `crc`.
/// Start with `crc = 0` for a fresh computation.
pub fn compute_crc8(crc: u8, data: &[u8]) -> u8 {
    data.iter().fold(crc, |crc, byte| crc8_update(crc, *byte))
}
