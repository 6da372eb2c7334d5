use bitflags::bitflags;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

bitflags! {
    /// Per-channel color write mask, used by anaglyph stereo.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ColorMask: u32 {
        const RED = 1 << 0;
        const GREEN = 1 << 1;
        const BLUE = 1 << 2;
    }
}

impl ColorMask {
    pub const ALL: ColorMask = ColorMask::all();
}

impl Default for ColorMask {
    fn default() -> Self {
        ColorMask::ALL
    }
}

// Serialized as the raw bit value, matching the wire layout.
impl Serialize for ColorMask {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.bits())
    }
}

impl<'de> Deserialize<'de> for ColorMask {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bits = u32::deserialize(deserializer)?;
        ColorMask::from_bits(bits)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid color mask bits {bits:#x}")))
    }
}
