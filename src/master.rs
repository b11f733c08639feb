use crate::{DeviceId, Error, OpCode, OpenDrainWire, RomCommand};
use core::fmt::Debug;
use embedded_hal::delay::DelayNs;

/// 1-Wire bus master.
///
/// Owns the bus line and provides the three protocol layers on top of
/// it: timed signalling (reset and read/write slots), LSB-first byte
/// framing, and the ROM-level commands. Timing is driven by the
/// injected [`DelayNs`] so the whole engine can run against simulated
/// hardware.
///
/// Slot timings assume exclusive CPU access for the duration of each
/// call; suppressing interrupts around bus transactions is the
/// caller's responsibility.
pub struct Master<W: OpenDrainWire> {
    wire: W,
}

impl<E: Debug, W: OpenDrainWire<Error = E>> Master<W> {
    pub fn new(wire: W) -> Self {
        Master { wire }
    }

    /// Issues a reset pulse and listens for a presence pulse.
    ///
    /// Returns `Err(WireFault)` if the line never reads high before
    /// the reset (shorted bus), `Err(NoPresence)` if no device pulled
    /// the line low in the presence window.
    pub fn reset(&mut self, delay: &mut impl DelayNs) -> Result<(), Error<E>> {
        self.ensure_wire_high(delay)?;

        self.wire.pull_low()?;
        delay.delay_us(480);
        self.wire.release()?;

        // devices answer 15..60us after the release, for 60..240us
        delay.delay_us(70);
        let presence = self.wire.is_low()?;
        delay.delay_us(410);

        if presence {
            Ok(())
        } else {
            Err(Error::NoPresence)
        }
    }

    fn ensure_wire_high(&mut self, delay: &mut impl DelayNs) -> Result<(), Error<E>> {
        for _ in 0..125 {
            if self.wire.is_high()? {
                return Ok(());
            }
            delay.delay_us(2);
        }
        Err(Error::WireFault)
    }

    pub(crate) fn write_bit(&mut self, delay: &mut impl DelayNs, bit: bool) -> Result<(), E> {
        self.wire.pull_low()?;
        delay.delay_us(if bit { 6 } else { 60 });
        self.wire.release()?;
        delay.delay_us(if bit { 64 } else { 10 });
        Ok(())
    }

    pub(crate) fn read_bit(&mut self, delay: &mut impl DelayNs) -> Result<bool, E> {
        self.wire.pull_low()?;
        delay.delay_us(6);
        self.wire.release()?;
        delay.delay_us(9);
        let bit = self.wire.is_high()?;
        delay.delay_us(55);
        Ok(bit)
    }

    pub fn write_byte(&mut self, delay: &mut impl DelayNs, byte: u8) -> Result<(), E> {
        for i in 0..8 {
            self.write_bit(delay, byte & (1 << i) != 0)?;
        }
        Ok(())
    }

    pub fn read_byte(&mut self, delay: &mut impl DelayNs) -> Result<u8, E> {
        let mut byte = 0;
        for i in 0..8 {
            byte |= (self.read_bit(delay)? as u8) << i;
        }
        Ok(byte)
    }

    pub fn write_bytes(&mut self, delay: &mut impl DelayNs, bytes: &[u8]) -> Result<(), E> {
        for b in bytes {
            self.write_byte(delay, *b)?;
        }
        Ok(())
    }

    pub fn read_bytes(&mut self, delay: &mut impl DelayNs, dst: &mut [u8]) -> Result<(), E> {
        for d in dst {
            *d = self.read_byte(delay)?;
        }
        Ok(())
    }

    /// Addresses every device on the bus at once. Only valid for
    /// commands that need no individual response, e.g. broadcasting a
    /// temperature conversion.
    pub fn skip_rom(&mut self, delay: &mut impl DelayNs) -> Result<(), Error<E>> {
        self.write_byte(delay, RomCommand::SkipRom.op_code())?;
        Ok(())
    }

    /// Selects exactly one device; all others ignore what follows
    /// until the next reset.
    pub fn match_rom(
        &mut self,
        delay: &mut impl DelayNs,
        id: &DeviceId,
    ) -> Result<(), Error<E>> {
        self.write_byte(delay, RomCommand::MatchRom.op_code())?;
        self.write_bytes(delay, id.as_ref())?;
        Ok(())
    }

    /// Reads the identifier of the only device on the bus and checks
    /// its CRC. The response is garbage when several devices answer
    /// at once; use the search for that.
    pub fn read_rom(&mut self, delay: &mut impl DelayNs) -> Result<DeviceId, Error<E>> {
        self.reset(delay)?;
        self.write_byte(delay, RomCommand::ReadRom.op_code())?;

        let mut id = DeviceId::default();
        self.read_bytes(delay, id.as_mut())?;
        id.ensure_valid()?;
        Ok(id)
    }

    pub fn reset_match_write(
        &mut self,
        delay: &mut impl DelayNs,
        id: &DeviceId,
        write: &[u8],
    ) -> Result<(), Error<E>> {
        self.reset(delay)?;
        self.match_rom(delay, id)?;
        self.write_bytes(delay, write)?;
        Ok(())
    }

    pub fn reset_match_write_read(
        &mut self,
        delay: &mut impl DelayNs,
        id: &DeviceId,
        write: &[u8],
        read: &mut [u8],
    ) -> Result<(), Error<E>> {
        self.reset(delay)?;
        self.match_rom(delay, id)?;
        self.write_bytes(delay, write)?;
        self.read_bytes(delay, read)?;
        Ok(())
    }

    pub fn reset_skip_write(
        &mut self,
        delay: &mut impl DelayNs,
        write: &[u8],
    ) -> Result<(), Error<E>> {
        self.reset(delay)?;
        self.skip_rom(delay)?;
        self.write_bytes(delay, write)?;
        Ok(())
    }
}
