//! Logical states encoded as bit patterns inside a latch byte

use super::Error;

/// A two-state value occupying the bits of `mask`.
/// `on` and `off` are the patterns of the two states, every other pattern is invalid.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BitField {
    mask: u8,
    on: u8,
    off: u8,
}

impl BitField {
    /// Bit `n`, set for "on"
    /// # Errors
    /// Returns an error if `n` is not a bit of a byte
    pub fn bit(n: u8) -> Result<Self, Error> {
        let mask = Self::single(n)?;
        Ok(Self {
            mask,
            on: mask,
            off: 0,
        })
    }

    /// Bit `n`, clear for "on"
    /// # Errors
    /// Returns an error if `n` is not a bit of a byte
    pub fn inverted_bit(n: u8) -> Result<Self, Error> {
        let mask = Self::single(n)?;
        Ok(Self {
            mask,
            on: 0,
            off: mask,
        })
    }

    /// An arbitrary pair of patterns within `mask`
    /// # Errors
    /// Returns an error if either pattern sets bits outside of `mask` or the patterns are equal
    pub fn pattern(mask: u8, on: u8, off: u8) -> Result<Self, Error> {
        if mask == 0 || on & !mask != 0 || off & !mask != 0 {
            return Err(Error::Config(format!(
                "patterns {on:#010b} and {off:#010b} don't fit mask {mask:#010b}"
            )));
        }
        if on == off {
            return Err(Error::Config(format!(
                "both states are encoded as {on:#010b}"
            )));
        }
        Ok(Self { mask, on, off })
    }

    fn single(n: u8) -> Result<u8, Error> {
        1u8.checked_shl(u32::from(n))
            .ok_or_else(|| Error::Config(format!("there is no bit {n} in a latch")))
    }

    #[must_use]
    pub fn mask(&self) -> u8 {
        self.mask
    }

    /// The state shown by `byte`, or `None` if the masked bits match neither pattern
    #[must_use]
    pub fn decode(&self, byte: u8) -> Option<bool> {
        match byte & self.mask {
            b if b == self.on => Some(true),
            b if b == self.off => Some(false),
            _ => None,
        }
    }

    /// `byte` with the masked bits replaced by the pattern for `on`
    #[must_use]
    pub fn encode(&self, byte: u8, on: bool) -> u8 {
        let pattern = if on { self.on } else { self.off };
        (byte & !self.mask) | pattern
    }
}
