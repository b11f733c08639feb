use crate::{compute_crc8, Error};
use core::{
    fmt::{Debug, Display, Formatter, Result as FmtResult},
    ops::{Deref, DerefMut},
    str::FromStr,
};

/// A 64-bit 1-Wire device identifier: family code, 48-bit serial
/// number, trailing CRC8 over the first seven bytes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(transparent)]
pub struct DeviceId {
    raw: [u8; Self::BYTES as usize],
}

impl From<[u8; Self::BYTES as usize]> for DeviceId {
    fn from(raw: [u8; Self::BYTES as usize]) -> Self {
        DeviceId { raw }
    }
}

impl From<DeviceId> for [u8; DeviceId::BYTES as usize] {
    fn from(id: DeviceId) -> [u8; DeviceId::BYTES as usize] {
        id.raw
    }
}

impl Deref for DeviceId {
    type Target = [u8; Self::BYTES as usize];

    fn deref(&self) -> &Self::Target {
        &self.raw
    }
}

impl DerefMut for DeviceId {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.raw
    }
}

impl AsRef<[u8]> for DeviceId {
    fn as_ref(&self) -> &[u8] {
        self.deref() as _
    }
}

impl AsMut<[u8]> for DeviceId {
    fn as_mut(&mut self) -> &mut [u8] {
        self.deref_mut() as _
    }
}

impl DeviceId {
    /// The length of a device identifier in bytes
    pub const BYTES: u8 = 8;

    /// The length of a device identifier in bits
    pub const BITS: u8 = Self::BYTES * 8;

    pub fn family_code(&self) -> u8 {
        self[0]
    }

    /// Whether the trailing CRC byte matches the first seven bytes
    pub fn is_valid(&self) -> bool {
        compute_crc8(0, &self[..7]) == self[7]
    }

    pub fn ensure_valid<E: Debug>(&self) -> Result<(), Error<E>> {
        let computed = compute_crc8(0, &self[..7]);
        if computed != self[7] {
            Err(Error::CrcMismatch(computed, self[7]))
        } else {
            Ok(())
        }
    }

    /// Identifier bit at `pos` (0..63), LSB-first within each byte —
    /// the order bits travel on the wire during a search.
    pub(crate) fn bit(&self, pos: u8) -> bool {
        self.raw[(pos >> 3) as usize] & (1 << (pos & 0x07)) != 0
    }

    pub(crate) fn set_bit(&mut self, pos: u8, value: bool) {
        let mask = 1 << (pos & 0x07);
        if value {
            self.raw[(pos >> 3) as usize] |= mask;
        } else {
            self.raw[(pos >> 3) as usize] &= !mask;
        }
    }
}

/// Error type
#[derive(Debug)]
pub enum ParseIdError {
    NotEnough,
    Invalid,
}

impl FromStr for DeviceId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut id = DeviceId::default();
        let mut digits = s
            .chars()
            .filter(|c| !c.is_whitespace() && *c != ':')
            .map(|c| c.to_digit(16));

        for i in 0..Self::BYTES as usize {
            match (digits.next(), digits.next()) {
                (Some(Some(h)), Some(Some(l))) => {
                    id[i] = ((h << 4) | l) as u8;
                }
                (Some(None), _) | (_, Some(None)) => return Err(ParseIdError::Invalid),
                _ => return Err(ParseIdError::NotEnough),
            }
        }

        Ok(id)
    }
}

impl Display for DeviceId {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self[0], self[1], self[2], self[3], self[4], self[5], self[6], self[7],
        )
    }
}
