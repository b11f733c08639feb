//! DS18B20/DS18S20 temperature sensor driver.
//!
//! Built entirely on the ROM command layer and the search engine. A
//! [`Ds1820`] owns a copy of its identifier plus a cache of the
//! device's scratchpad registers; the cache is only updated by an
//! explicit [`read_scratchpad`](Ds1820::read_scratchpad) and survives
//! failed reads unchanged.

use byteorder::{ByteOrder, LittleEndian};
use core::fmt::Debug;
use embedded_hal::delay::DelayNs;
use heapless::Vec;

use crate::{
    compute_crc8, DeviceId, Error, Master, OpCode, OpenDrainWire, SearchState, SearchStatus,
};

pub const FAMILY_DS18B20: u8 = 0x28;
pub const FAMILY_DS18S20: u8 = 0x10;

/// Worst-case conversion time over both families, in milliseconds
pub const CONVERSION_TIME_MAX_MS: u16 = 750;

const DS18S20_CONVERSION_TIME_MS: u16 = 750;

/// Function commands, valid after a device has been selected.
#[derive(Clone, Copy, Debug)]
#[repr(u8)]
pub enum Command {
    ConvertT = 0x44,
    WriteScratchpad = 0x4E,
    ReadScratchpad = 0xBE,
    CopyScratchpad = 0x48,
    RecallE2 = 0xB8,
    ReadPowerSupply = 0xB4,
}

impl OpCode for Command {
    fn op_code(&self) -> u8 {
        *self as _
    }
}

/// Measurement resolution, DS18B20 only. The value is the
/// configuration register byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Resolution {
    Bits9 = 0x00,
    Bits10 = 0x20,
    Bits11 = 0x40,
    Bits12 = 0x60,
}

impl Resolution {
    fn from_config(reg: u8) -> Self {
        match reg & 0x60 {
            0x00 => Resolution::Bits9,
            0x20 => Resolution::Bits10,
            0x40 => Resolution::Bits11,
            _ => Resolution::Bits12,
        }
    }

    /// Conversion time at this resolution, doubling per extra bit
    pub fn conversion_time_ms(&self) -> u16 {
        94 << ((*self as u8) >> 5)
    }
}

/// One DS18B20 or DS18S20 sensor: its identifier and a cached copy of
/// the scratchpad registers.
#[derive(Clone, Debug)]
pub struct Ds1820 {
    id: DeviceId,
    reg_temp: u16,
    reg_th: u8,
    reg_tl: u8,
    reg_conf: u8,
}

impl Ds1820 {
    /// Sensor record with power-on register defaults (85 °C, 12-bit)
    pub fn new(id: DeviceId) -> Self {
        Ds1820 {
            id,
            reg_temp: 0x0550,
            reg_th: 0x7F,
            reg_tl: 0x80,
            reg_conf: Resolution::Bits12 as u8,
        }
    }

    pub fn id(&self) -> &DeviceId {
        &self.id
    }

    pub fn is_ds18b20(&self) -> bool {
        self.id.family_code() == FAMILY_DS18B20
    }

    pub fn is_ds18s20(&self) -> bool {
        self.id.family_code() == FAMILY_DS18S20
    }

    /// Searches the bus for temperature sensors, appending them to
    /// `sensors` with default register caches: all DS18B20 devices
    /// first, then all DS18S20 devices, each via a family-targeted
    /// enumeration. Stops quietly once `sensors` is full; an empty bus
    /// yields no sensors.
    pub fn search_bus<W: OpenDrainWire, const N: usize>(
        master: &mut Master<W>,
        delay: &mut impl DelayNs,
        sensors: &mut Vec<Ds1820, N>,
    ) -> Result<usize, Error<W::Error>> {
        scan_family(master, delay, FAMILY_DS18B20, sensors)?;
        scan_family(master, delay, FAMILY_DS18S20, sensors)?;
        Ok(sensors.len())
    }

    /// Triggers a temperature conversion on this sensor. Returns the
    /// time in milliseconds to wait before reading the result.
    pub fn convert_t<W: OpenDrainWire>(
        &self,
        master: &mut Master<W>,
        delay: &mut impl DelayNs,
    ) -> Result<u16, Error<W::Error>> {
        master.reset_match_write(delay, &self.id, &[Command::ConvertT.op_code()])?;
        Ok(self.conversion_time_ms())
    }

    /// Broadcasts a conversion to every device on the bus. Returns the
    /// worst-case time in milliseconds to wait before reading.
    pub fn convert_t_all<W: OpenDrainWire>(
        master: &mut Master<W>,
        delay: &mut impl DelayNs,
    ) -> Result<u16, Error<W::Error>> {
        master.reset_skip_write(delay, &[Command::ConvertT.op_code()])?;
        Ok(CONVERSION_TIME_MAX_MS)
    }

    /// Reads the device scratchpad into the register cache. On a CRC
    /// mismatch the cache is left untouched, so the last valid reading
    /// stays available.
    pub fn read_scratchpad<W: OpenDrainWire>(
        &mut self,
        master: &mut Master<W>,
        delay: &mut impl DelayNs,
    ) -> Result<(), Error<W::Error>> {
        let mut scratchpad = [0u8; 9];
        master.reset_match_write_read(
            delay,
            &self.id,
            &[Command::ReadScratchpad.op_code()],
            &mut scratchpad,
        )?;

        let computed = compute_crc8(0, &scratchpad[..8]);
        if computed != scratchpad[8] {
            return Err(Error::CrcMismatch(computed, scratchpad[8]));
        }

        self.reg_temp = LittleEndian::read_u16(&scratchpad[0..2]);
        self.reg_th = scratchpad[2];
        self.reg_tl = scratchpad[3];
        self.reg_conf = scratchpad[4];
        Ok(())
    }

    /// Writes the cached alarm thresholds (and, on the DS18B20, the
    /// configuration byte) to the device scratchpad.
    pub fn write_scratchpad<W: OpenDrainWire>(
        &self,
        master: &mut Master<W>,
        delay: &mut impl DelayNs,
    ) -> Result<(), Error<W::Error>> {
        let frame = [
            Command::WriteScratchpad.op_code(),
            self.reg_th,
            self.reg_tl,
            self.reg_conf,
        ];
        // the DS18S20 scratchpad takes only Th and Tl
        let len = if self.is_ds18b20() { 4 } else { 3 };
        master.reset_match_write(delay, &self.id, &frame[..len])
    }

    /// Commits the device scratchpad to EEPROM
    pub fn copy_scratchpad<W: OpenDrainWire>(
        &self,
        master: &mut Master<W>,
        delay: &mut impl DelayNs,
    ) -> Result<(), Error<W::Error>> {
        master.reset_match_write(delay, &self.id, &[Command::CopyScratchpad.op_code()])
    }

    /// Recalls alarm thresholds and configuration from EEPROM
    pub fn recall_e2<W: OpenDrainWire>(
        &self,
        master: &mut Master<W>,
        delay: &mut impl DelayNs,
    ) -> Result<(), Error<W::Error>> {
        master.reset_match_write(delay, &self.id, &[Command::RecallE2.op_code()])
    }

    /// Raw cached value of the temperature register
    pub fn temperature_raw(&self) -> u16 {
        self.reg_temp
    }

    /// Cached temperature in tenths of a degree Celsius.
    ///
    /// The DS18B20 register carries four fractional bits, scaled to a
    /// single decimal digit; the DS18S20 counts half degrees.
    pub fn temperature_deci_degrees(&self) -> i16 {
        let raw = self.reg_temp;
        let negative = raw & 0x8000 != 0;
        let magnitude = if negative { (!raw).wrapping_add(1) } else { raw } as i32;

        let mut value = if self.is_ds18b20() {
            let frac = ((magnitude & 0x000F) * 63) / 100;
            ((magnitude & 0x07F8) >> 4) * 10 + frac
        } else {
            magnitude * 5
        };
        if negative {
            value = -value;
        }
        value as i16
    }

    /// Cached temperature rounded to whole degrees Celsius
    pub fn temperature_degrees(&self) -> i16 {
        let raw = self.reg_temp;
        let negative = raw & 0x8000 != 0;
        let magnitude = if negative { (!raw).wrapping_add(1) } else { raw } as i32;

        let (half_bit, mut value) = if self.is_ds18b20() {
            (magnitude & 0x08 != 0, magnitude >> 4)
        } else {
            (magnitude & 0x01 != 0, magnitude >> 1)
        };
        if half_bit {
            value += 1;
        }
        if negative {
            value = -value;
        }
        value as i16
    }

    /// Cached high alarm threshold in whole degrees
    pub fn alarm_high(&self) -> i8 {
        self.reg_th as i8
    }

    pub fn set_alarm_high(&mut self, degrees: i8) {
        self.reg_th = degrees as u8;
    }

    /// Cached low alarm threshold in whole degrees
    pub fn alarm_low(&self) -> i8 {
        self.reg_tl as i8
    }

    pub fn set_alarm_low(&mut self, degrees: i8) {
        self.reg_tl = degrees as u8;
    }

    /// Cached measurement resolution (fixed at the hardware's native
    /// resolution on the DS18S20)
    pub fn resolution(&self) -> Resolution {
        Resolution::from_config(self.reg_conf)
    }

    /// Updates the cached resolution; a no-op on the DS18S20. Takes
    /// effect on the device after [`write_scratchpad`](Self::write_scratchpad).
    pub fn set_resolution(&mut self, resolution: Resolution) {
        if self.is_ds18b20() {
            self.reg_conf = resolution as u8;
        }
    }

    /// Time in milliseconds a conversion takes at the cached resolution
    pub fn conversion_time_ms(&self) -> u16 {
        if self.is_ds18b20() {
            Resolution::from_config(self.reg_conf).conversion_time_ms()
        } else {
            DS18S20_CONVERSION_TIME_MS
        }
    }
}

fn scan_family<E: Debug, W: OpenDrainWire<Error = E>, const N: usize>(
    master: &mut Master<W>,
    delay: &mut impl DelayNs,
    family_code: u8,
    sensors: &mut Vec<Ds1820, N>,
) -> Result<(), Error<E>> {
    let mut state = SearchState::for_family(family_code);

    while !sensors.is_full() {
        let status = match master.search_rom(&mut state, delay) {
            Ok(status) => status,
            // an empty bus just means no sensors
            Err(Error::NoPresence) => return Ok(()),
            Err(e) => return Err(e),
        };

        if state.device_id().family_code() != family_code {
            // walked past the targeted family
            return Ok(());
        }

        // capacity checked by the loop condition
        let _ = sensors.push(Ds1820::new(*state.device_id()));

        if status == SearchStatus::Done {
            return Ok(());
        }
    }

    Ok(())
}
