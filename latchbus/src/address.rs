//! Latch addressing.
//!
//! A0-A7 select one of 256 eight-bit latches. The address byte has three parts:
//! - bits 3-7 select the block of eight latches belonging to a digital module (DM)
//! - bit 2 is clear for the write-mode latch and set for the read-mode latch
//! - bits 0-1 select the latch group (LG) within the digital module
//!
//! So latches in write mode have addresses ending in 0-3 and the status of the same group is
//! read at the address plus four.

use packed_struct::prelude::*;
use std::fmt::Display;
use thiserror::Error;

/// Bit 2 of a latch address selects the read-mode latch
pub const READ_BIT: u8 = 0b100;

#[derive(Error, Debug, PartialEq)]
pub enum AddressError {
    #[error("Latch group {0} does not exist, groups are numbered 1 through 4")]
    Group(u8),
    #[error("Base address {0} is not aligned to a block of eight latches")]
    Unaligned(u8),
    #[error("Digital module {module} with base address {base} is outside the latch address space")]
    OutOfRange { base: u8, module: u8 },
    #[error("This board has {modules} digital module(s), there is no module {module}")]
    NoSuchModule { module: u8, modules: u8 },
    #[error("Address {0} is a read-mode address, latch groups are identified by their write address")]
    ReadAddress(u8),
    #[error("Could not pack the latch address")]
    Packing(#[from] PackingError),
}

/// Whether a transfer targets the write-mode or the read-mode latch of a group
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Direction {
    Write,
    Read,
}

/// The layout of the byte driven onto A0-A7
#[derive(PackedStruct, Debug, Copy, Clone, PartialEq, Eq, Default)]
#[packed_struct(bit_numbering = "lsb0", size_bytes = "1")]
pub struct LatchAddress {
    #[packed_field(bits = "0..=1")]
    group: Integer<u8, packed_bits::Bits<2>>,
    #[packed_field(bits = "2")]
    read: bool,
    #[packed_field(bits = "3..=7")]
    block: Integer<u8, packed_bits::Bits<5>>,
}

impl LatchAddress {
    /// Splits a raw address byte into its fields
    /// # Errors
    /// Returns an error if the byte can't be unpacked
    pub fn decode(address: u8) -> Result<Self, AddressError> {
        Ok(Self::unpack(&[address])?)
    }

    /// The latch group, numbered from 1
    #[must_use]
    pub fn group(&self) -> u8 {
        let g: u8 = self.group.into();
        g + 1
    }

    /// The block of eight latches this address falls in
    #[must_use]
    pub fn block(&self) -> u8 {
        self.block.into()
    }

    #[must_use]
    pub fn direction(&self) -> Direction {
        if self.read {
            Direction::Read
        } else {
            Direction::Write
        }
    }

    #[must_use]
    pub fn location(self) -> Location {
        Location(self)
    }
}

/// Short form of a decoded address for log messages, such as "block 10 LG 4 (read)"
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Location(pub LatchAddress);

impl Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let address = &self.0;
        write!(
            f,
            "block {} LG {} ({})",
            address.block(),
            address.group(),
            match address.direction() {
                Direction::Write => "write",
                Direction::Read => "read",
            }
        )
    }
}

/// Computes the address of latch group `group` in digital module `digital_module`.
///
/// The address is `base + ((DM - 1) << 3) + (read << 2) + (LG - 1)`. Module 0 is allowed and
/// selects the block below `base`, which is where the analog monitor select latches of a board
/// with base 8 live.
/// # Errors
/// Returns an error if `group` is not in 1..=4, `base` is not a multiple of eight, or the
/// address would fall outside 0..=255
pub fn compute_address(
    base: u8,
    digital_module: u8,
    group: u8,
    direction: Direction,
) -> Result<u8, AddressError> {
    if !(1..=4).contains(&group) {
        return Err(AddressError::Group(group));
    }
    if base % 8 != 0 {
        return Err(AddressError::Unaligned(base));
    }
    let out_of_range = AddressError::OutOfRange {
        base,
        module: digital_module,
    };
    let block = i16::from(base >> 3) + i16::from(digital_module) - 1;
    let block = match u8::try_from(block) {
        Ok(b) if b < 32 => b,
        _ => return Err(out_of_range),
    };
    let address = LatchAddress {
        group: (group - 1).into(),
        read: direction == Direction::Read,
        block: block.into(),
    };
    Ok(address.pack()?[0])
}

/// The addressing scheme of one board family
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct AddressScheme {
    /// Write address of DM 1 LG 1
    pub base: u8,
    /// Number of digital modules fitted
    pub modules: u8,
    /// Modules whose latch block is strapped somewhere other than `base + ((DM - 1) << 3)`,
    /// as (module, base address of that module) pairs
    pub relocated: &'static [(u8, u8)],
}

impl AddressScheme {
    /// WBDC1: a single digital module at 80
    pub const WBDC1: Self = Self {
        base: 80,
        modules: 1,
        relocated: &[],
    };

    /// WBDC2: DM 1 at 8, DM 2 at 160
    pub const WBDC2: Self = Self {
        base: 8,
        modules: 2,
        relocated: &[(2, 160)],
    };

    /// Address of latch group `group` in `module` for the given transfer direction
    /// # Errors
    /// Returns an error if the module isn't fitted or the group doesn't exist
    pub fn address(&self, module: u8, group: u8, direction: Direction) -> Result<u8, AddressError> {
        if module > self.modules {
            return Err(AddressError::NoSuchModule {
                module,
                modules: self.modules,
            });
        }
        match self.relocated.iter().find(|(m, _)| *m == module) {
            Some((_, base)) => compute_address(*base, 1, group, direction),
            None => compute_address(self.base, module, group, direction),
        }
    }
}
