use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// A single eye pass. Bit values match the wire encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum Eye {
    Cyclop = 1,
    Left = 2,
    Right = 4,
}

impl Eye {
    /// Frame update pass order. `is_last_inherit_eye` relies on this
    /// being ascending in bit value.
    pub const PASS_ORDER: [Eye; 3] = [Eye::Cyclop, Eye::Left, Eye::Right];

    pub const fn index(self) -> usize {
        match self {
            Eye::Cyclop => 0,
            Eye::Left => 1,
            Eye::Right => 2,
        }
    }

    pub const fn bit(self) -> Eyes {
        Eyes::from_bits_truncate(self as u32)
    }

    pub fn from_bits(bits: u32) -> Option<Eye> {
        match bits {
            1 => Some(Eye::Cyclop),
            2 => Some(Eye::Left),
            4 => Some(Eye::Right),
            _ => None,
        }
    }
}

bitflags! {
    /// Eye activity mask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Eyes: u32 {
        const CYCLOP = 1;
        const LEFT = 2;
        const RIGHT = 4;
    }
}

impl Eyes {
    pub const STEREO: Eyes = Eyes::LEFT.union(Eyes::RIGHT);

    pub fn contains_eye(self, eye: Eye) -> bool {
        self.contains(eye.bit())
    }

    /// True when no eye with a higher bit than `eye` is in the mask.
    pub fn is_last(self, eye: Eye) -> bool {
        let higher = Eyes::from_bits_truncate(!((eye as u32) | ((eye as u32) - 1)));
        (self & higher).is_empty()
    }
}

impl Default for Eyes {
    fn default() -> Self {
        Eyes::all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_eye_follows_pass_order() {
        let stereo = Eyes::STEREO;
        assert!(!stereo.is_last(Eye::Cyclop));
        assert!(!stereo.is_last(Eye::Left));
        assert!(stereo.is_last(Eye::Right));

        let mono = Eyes::CYCLOP;
        assert!(mono.is_last(Eye::Cyclop));
        assert!(mono.is_last(Eye::Right));
    }
}
