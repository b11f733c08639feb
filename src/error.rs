use core::fmt::Debug;

/// Error type
#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E: Sized + Debug> {
    /// The line never returned to idle high (shorted or missing pull-up)
    WireFault,
    /// No presence pulse after a bus reset
    NoPresence,
    /// A search slot pair read back as 1/1: no device drove the line,
    /// the enumeration round is corrupt
    InvalidComplement,
    /// CRC8 check failed (computed, received)
    CrcMismatch(u8, u8),
    PortError(E),
}

impl<E: Sized + Debug> From<E> for Error<E> {
    fn from(e: E) -> Self {
        Error::PortError(e)
    }
}
