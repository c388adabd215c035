/// Script-visible handle to a host object boxed in the state's userdata
/// arena.
///
/// The handle is what the collector tracks; the host object itself lives in
/// the arena slot. A generation counter makes handles to released objects
/// resolve to nothing instead of to whatever reuses the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UserdataRef {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl UserdataRef {
    pub(crate) const fn new(index: u32, generation: u32) -> Self {
        UserdataRef { index, generation }
    }

    /// Stable pseudo-address for `userdata: 0x...` representations
    pub fn address(&self) -> usize {
        0x5500_0000 + ((self.generation as usize) << 20) + (self.index as usize) * 0x40
    }
}
