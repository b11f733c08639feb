use crate::{DeviceId, Error, Master, OpCode, OpenDrainWire, RomCommand};
use core::fmt::Debug;
use embedded_hal::delay::DelayNs;

/// Outcome of one successful search pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SearchStatus {
    /// The identifier just read belongs to the last device on the bus
    Done,
    /// More devices remain; call again with the same state
    MoreAvailable,
}

/// Cursor over the bus's identifier space.
///
/// One search pass extracts exactly one device identifier;
/// `last_deviation` remembers the highest bit position where devices
/// disagreed and the 0-branch was taken, so the next pass can explore
/// the 1-branch. Devices must not join or leave the bus between
/// passes of one enumeration.
#[derive(Clone, Default)]
pub struct SearchState {
    last_deviation: Option<u8>,
    device_id: DeviceId,
}

impl SearchState {
    /// Fresh state for a full enumeration.
    pub fn new() -> SearchState {
        SearchState::default()
    }

    /// State seeded for a family-targeted enumeration: the identifier
    /// starts at the family code and the deviation marker at the top
    /// bit, so the first pass replays the seeded path wherever devices
    /// disagree. Devices of other families drop out at the family-code
    /// bits; the first identifier read back must still be checked, as
    /// the seeded family may be absent entirely.
    pub fn for_family(family_code: u8) -> SearchState {
        let mut device_id = DeviceId::default();
        device_id[0] = family_code;
        SearchState {
            last_deviation: Some(DeviceId::BITS - 1),
            device_id,
        }
    }

    /// The path explored by the last pass, i.e. the identifier of the
    /// most recently discovered device.
    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    pub fn last_deviation(&self) -> Option<u8> {
        self.last_deviation
    }
}

impl<E: Debug, W: OpenDrainWire<Error = E>> Master<W> {
    /// Runs one pass of the ROM search, the collision-resolved
    /// depth-first walk over the 64-bit identifier space (Maxim
    /// AN187). Each pass reads a bit and its complement for all 64
    /// positions and writes the chosen branch back, which drops every
    /// device disagreeing with it out of the round.
    pub fn search_rom(
        &mut self,
        state: &mut SearchState,
        delay: &mut impl DelayNs,
    ) -> Result<SearchStatus, Error<E>> {
        self.reset(delay)?;
        self.write_byte(delay, RomCommand::SearchRom.op_code())?;

        let mut new_deviation = None;

        for pos in 0..DeviceId::BITS {
            let id_bit = self.read_bit(delay)?;
            let id_bit_compl = self.read_bit(delay)?;

            if id_bit && id_bit_compl {
                // nobody drove the slot pair
                return Err(Error::InvalidComplement);
            }

            if id_bit != id_bit_compl {
                // all active devices agree on this position
                state.device_id.set_bit(pos, id_bit);
            } else {
                match state.last_deviation {
                    // the branch deferred by the previous pass,
                    // take the 1-path this time
                    Some(last) if pos == last => state.device_id.set_bit(pos, true),
                    // replaying an outer stretch of the previous path;
                    // a stored 0 still has its 1-side unexplored
                    Some(last) if pos < last => {
                        if !state.device_id.bit(pos) {
                            new_deviation = Some(pos);
                        }
                    }
                    // unexplored branch point, 0-path first
                    _ => {
                        state.device_id.set_bit(pos, false);
                        new_deviation = Some(pos);
                    }
                }
            }

            // tell the devices which branch stays in the round
            self.write_bit(delay, state.device_id.bit(pos))?;
        }

        state.last_deviation = new_deviation;
        Ok(if new_deviation.is_none() {
            SearchStatus::Done
        } else {
            SearchStatus::MoreAvailable
        })
    }

    /// Enumerates the bus from scratch, filling `buffer` with the
    /// discovered identifiers. Stops when the buffer is full --
    /// remaining devices are silently not enumerated -- or when the
    /// last device has been found. An empty bus yields a count of 0.
    pub fn find_devices(
        &mut self,
        delay: &mut impl DelayNs,
        buffer: &mut [DeviceId],
    ) -> Result<usize, Error<E>> {
        let mut state = SearchState::new();
        let mut count = 0;

        while count < buffer.len() {
            match self.search_rom(&mut state, delay) {
                Ok(status) => {
                    buffer[count] = *state.device_id();
                    count += 1;
                    if status == SearchStatus::Done {
                        break;
                    }
                }
                Err(Error::NoPresence) if count == 0 => break,
                Err(e) => return Err(e),
            }
        }

        Ok(count)
    }

    /// Iterator over all device identifiers on the bus.
    pub fn devices<'a, D: DelayNs>(
        &'a mut self,
        delay: &'a mut D,
    ) -> DeviceIter<'a, W, D> {
        DeviceIter {
            master: self,
            delay,
            state: SearchState::new(),
            finished: false,
        }
    }
}

pub struct DeviceIter<'a, W: OpenDrainWire, D: DelayNs> {
    master: &'a mut Master<W>,
    delay: &'a mut D,
    state: SearchState,
    finished: bool,
}

impl<'a, W: OpenDrainWire, D: DelayNs> Iterator for DeviceIter<'a, W, D> {
    type Item = Result<DeviceId, Error<W::Error>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.master.search_rom(&mut self.state, self.delay) {
            Ok(status) => {
                if status == SearchStatus::Done {
                    self.finished = true;
                }
                Some(Ok(*self.state.device_id()))
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}
