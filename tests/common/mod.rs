//! Simulated 1-Wire bus for exercising the protocol engine without
//! hardware. The master's pin wiggles and busy-waits are replayed
//! against virtual time; attached devices run slave-side protocol
//! state machines, including the wired-AND behaviour of concurrent
//! search responses.

#![allow(dead_code)]

use std::cell::RefCell;
use std::convert::Infallible;
use std::rc::Rc;

use embedded_hal::delay::DelayNs;
use w1_master::{compute_crc8, OpenDrainWire};

/// A low pulse at least this long is a bus reset
const RESET_LOW_NS: u64 = 480_000;
/// A low pulse at least this long (but shorter than a reset) is a
/// write-0 slot; anything shorter starts a write-1 or read slot
const WRITE_ZERO_LOW_NS: u64 = 15_000;
/// Devices hold their response for this long after a slot starts
const READ_SAMPLE_WINDOW_NS: u64 = 15_000;
/// Presence pulses end this long after the reset is released
const PRESENCE_WINDOW_NS: u64 = 75_000;

/// Builds a ROM identifier from a family code and serial, computing
/// the trailing CRC byte.
pub fn rom_with_crc(body: [u8; 7]) -> [u8; 8] {
    let mut rom = [0u8; 8];
    rom[..7].copy_from_slice(&body);
    rom[7] = compute_crc8(0, &body);
    rom
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum DeviceState {
    Idle,
    RomCommand { byte: u8, bits: u8 },
    SearchRespond { pos: u8, phase: u8 },
    MatchRom { pos: u8, matched: bool },
    RomSend { pos: u8 },
    Function { byte: u8, bits: u8 },
    ScratchpadSend { pos: u8 },
    ScratchpadRecv { pos: u8 },
}

pub struct SimDevice {
    rom: [u8; 8],
    scratchpad: [u8; 9],
    temperature: u16,
    vanish_at: Option<u8>,
    state: DeviceState,
    conversions: u32,
}

impl SimDevice {
    pub fn new(rom: [u8; 8]) -> Self {
        let mut device = SimDevice {
            rom,
            // power-on scratchpad: 85 °C, Th/Tl defaults, 12-bit config
            scratchpad: [0x50, 0x05, 0x4B, 0x46, 0x7F, 0xFF, 0x00, 0x10, 0x00],
            temperature: 0x0550,
            vanish_at: None,
            state: DeviceState::Idle,
            conversions: 0,
        };
        device.seal_scratchpad();
        device
    }

    /// Sets the temperature the device reports once a conversion has
    /// been triggered.
    pub fn with_temperature(mut self, raw: u16) -> Self {
        self.temperature = raw;
        self
    }

    /// Breaks the scratchpad CRC so every read fails the check.
    pub fn with_corrupt_scratchpad(mut self) -> Self {
        self.scratchpad[2] ^= 0x01;
        self
    }

    /// Makes the device silently stop responding at the given search
    /// bit position, as if unplugged mid-enumeration.
    pub fn vanishing_at(mut self, pos: u8) -> Self {
        self.vanish_at = Some(pos);
        self
    }

    fn seal_scratchpad(&mut self) {
        self.scratchpad[8] = compute_crc8(0, &self.scratchpad[..8]);
    }

    fn rom_bit(&self, pos: u8) -> bool {
        self.rom[(pos >> 3) as usize] & (1 << (pos & 0x07)) != 0
    }

    fn scratchpad_bit(&self, pos: u8) -> bool {
        self.scratchpad[(pos >> 3) as usize] & (1 << (pos & 0x07)) != 0
    }

    fn reset(&mut self) {
        self.state = DeviceState::RomCommand { byte: 0, bits: 0 };
    }

    /// Runs one time slot. `master_bit` is the level the master wrote
    /// (true for a short low pulse). Returns `Some(level)` while the
    /// device is transmitting.
    fn slot(&mut self, master_bit: bool) -> Option<bool> {
        match self.state {
            DeviceState::Idle => None,

            DeviceState::RomCommand { mut byte, mut bits } => {
                if master_bit {
                    byte |= 1 << bits;
                }
                bits += 1;
                self.state = if bits == 8 {
                    match byte {
                        0xF0 => DeviceState::SearchRespond { pos: 0, phase: 0 },
                        0x55 => DeviceState::MatchRom {
                            pos: 0,
                            matched: true,
                        },
                        0x33 => DeviceState::RomSend { pos: 0 },
                        0xCC => DeviceState::Function { byte: 0, bits: 0 },
                        _ => DeviceState::Idle,
                    }
                } else {
                    DeviceState::RomCommand { byte, bits }
                };
                None
            }

            DeviceState::SearchRespond { pos, phase } => {
                if self.vanish_at == Some(pos) {
                    self.state = DeviceState::Idle;
                    return None;
                }
                match phase {
                    0 => {
                        self.state = DeviceState::SearchRespond { pos, phase: 1 };
                        Some(self.rom_bit(pos))
                    }
                    1 => {
                        self.state = DeviceState::SearchRespond { pos, phase: 2 };
                        Some(!self.rom_bit(pos))
                    }
                    _ => {
                        // the master's direction bit decides whether
                        // this device stays in the round
                        self.state = if master_bit != self.rom_bit(pos) {
                            DeviceState::Idle
                        } else if pos == 63 {
                            DeviceState::Function { byte: 0, bits: 0 }
                        } else {
                            DeviceState::SearchRespond {
                                pos: pos + 1,
                                phase: 0,
                            }
                        };
                        None
                    }
                }
            }

            DeviceState::MatchRom { pos, matched } => {
                let matched = matched && master_bit == self.rom_bit(pos);
                self.state = if pos == 63 {
                    if matched {
                        DeviceState::Function { byte: 0, bits: 0 }
                    } else {
                        DeviceState::Idle
                    }
                } else {
                    DeviceState::MatchRom {
                        pos: pos + 1,
                        matched,
                    }
                };
                None
            }

            DeviceState::RomSend { pos } => {
                let bit = self.rom_bit(pos);
                self.state = if pos == 63 {
                    DeviceState::Function { byte: 0, bits: 0 }
                } else {
                    DeviceState::RomSend { pos: pos + 1 }
                };
                Some(bit)
            }

            DeviceState::Function { mut byte, mut bits } => {
                if master_bit {
                    byte |= 1 << bits;
                }
                bits += 1;
                self.state = if bits == 8 {
                    match byte {
                        0x44 => {
                            self.conversions += 1;
                            self.scratchpad[0] = (self.temperature & 0xFF) as u8;
                            self.scratchpad[1] = (self.temperature >> 8) as u8;
                            self.seal_scratchpad();
                            DeviceState::Idle
                        }
                        0xBE => DeviceState::ScratchpadSend { pos: 0 },
                        0x4E => DeviceState::ScratchpadRecv { pos: 0 },
                        _ => DeviceState::Idle,
                    }
                } else {
                    DeviceState::Function { byte, bits }
                };
                None
            }

            DeviceState::ScratchpadSend { pos } => {
                let bit = self.scratchpad_bit(pos);
                self.state = if pos == 71 {
                    DeviceState::Idle
                } else {
                    DeviceState::ScratchpadSend { pos: pos + 1 }
                };
                Some(bit)
            }

            DeviceState::ScratchpadRecv { pos } => {
                // incoming bytes land in Th, Tl, configuration
                let index = 2 + (pos >> 3) as usize;
                let mask = 1 << (pos & 0x07);
                if master_bit {
                    self.scratchpad[index] |= mask;
                } else {
                    self.scratchpad[index] &= !mask;
                }
                if pos & 0x07 == 7 {
                    self.seal_scratchpad();
                }
                self.state = if pos == 23 {
                    DeviceState::Idle
                } else {
                    DeviceState::ScratchpadRecv { pos: pos + 1 }
                };
                None
            }
        }
    }
}

struct Sim {
    now_ns: u64,
    master_low: bool,
    fall_ns: u64,
    presence_until_ns: u64,
    /// Slot start and the level driven by transmitting devices
    read_slot: Option<(u64, bool)>,
    devices: Vec<SimDevice>,
}

impl Sim {
    /// Feeds one slot to every device; the line level is the wired
    /// AND of all transmitting devices.
    fn dispatch_slot(&mut self, master_bit: bool) -> bool {
        let mut level = true;
        for device in &mut self.devices {
            if let Some(out) = device.slot(master_bit) {
                level &= out;
            }
        }
        level
    }

    fn release(&mut self) {
        if !self.master_low {
            return;
        }
        self.master_low = false;
        let held_ns = self.now_ns - self.fall_ns;

        if held_ns >= RESET_LOW_NS {
            for device in &mut self.devices {
                device.reset();
            }
            if !self.devices.is_empty() {
                self.presence_until_ns = self.now_ns + PRESENCE_WINDOW_NS;
            }
            self.read_slot = None;
        } else if held_ns >= WRITE_ZERO_LOW_NS {
            self.dispatch_slot(false);
            self.read_slot = None;
        } else {
            let level = self.dispatch_slot(true);
            self.read_slot = Some((self.fall_ns, level));
        }
    }

    fn level(&self) -> bool {
        if self.master_low {
            return false;
        }
        if !self.devices.is_empty() && self.now_ns < self.presence_until_ns {
            return false;
        }
        if let Some((start_ns, level)) = self.read_slot {
            if self.now_ns.saturating_sub(start_ns) <= READ_SAMPLE_WINDOW_NS {
                return level;
            }
        }
        true
    }
}

/// Handle to the simulated bus line. Clones share the same bus, so a
/// test keeps one clone for inspection while the master owns another.
#[derive(Clone)]
pub struct SimBus(Rc<RefCell<Sim>>);

pub struct SimClock(Rc<RefCell<Sim>>);

impl SimBus {
    pub fn new(devices: Vec<SimDevice>) -> Self {
        SimBus(Rc::new(RefCell::new(Sim {
            now_ns: 0,
            master_low: false,
            fall_ns: 0,
            presence_until_ns: 0,
            read_slot: None,
            devices,
        })))
    }

    /// The delay source feeding the same virtual timeline
    pub fn clock(&self) -> SimClock {
        SimClock(self.0.clone())
    }

    pub fn conversions(&self, index: usize) -> u32 {
        self.0.borrow().devices[index].conversions
    }

    pub fn scratchpad(&self, index: usize) -> [u8; 9] {
        self.0.borrow().devices[index].scratchpad
    }
}

impl OpenDrainWire for SimBus {
    type Error = Infallible;

    fn pull_low(&mut self) -> Result<(), Infallible> {
        let mut sim = self.0.borrow_mut();
        if !sim.master_low {
            sim.master_low = true;
            sim.fall_ns = sim.now_ns;
        }
        Ok(())
    }

    fn release(&mut self) -> Result<(), Infallible> {
        self.0.borrow_mut().release();
        Ok(())
    }

    fn is_high(&mut self) -> Result<bool, Infallible> {
        Ok(self.0.borrow().level())
    }

    fn is_low(&mut self) -> Result<bool, Infallible> {
        Ok(!self.0.borrow().level())
    }
}

impl DelayNs for SimClock {
    fn delay_ns(&mut self, ns: u32) {
        self.0.borrow_mut().now_ns += ns as u64;
    }
}
