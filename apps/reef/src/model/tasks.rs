use bitflags::bitflags;

bitflags! {
    /// Rendering tasks a compound executes on its channel.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Tasks: u32 {
        const CLEAR = 1 << 0;
        const DRAW = 1 << 1;
        const ASSEMBLE = 1 << 2;
        const READBACK = 1 << 3;
        const VIEW = 1 << 4;
    }
}

impl Default for Tasks {
    fn default() -> Self {
        Tasks::empty()
    }
}
