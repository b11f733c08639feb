pub trait OpCode {
    fn op_code(&self) -> u8;
}

/// ROM-level commands, issued right after a bus reset.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum RomCommand {
    /// Read the identifier of the only device on the bus
    ReadRom = 0x33,
    /// Select one device by its identifier
    MatchRom = 0x55,
    /// Address all devices at once
    SkipRom = 0xCC,
    /// Start a search pass (collision-resolved enumeration)
    SearchRom = 0xF0,
    /// Search restricted to devices in alarm state (opcode only, no
    /// search variant is implemented for it)
    AlarmSearch = 0xEC,
}

impl OpCode for RomCommand {
    fn op_code(&self) -> u8 {
        *self as _
    }
}
