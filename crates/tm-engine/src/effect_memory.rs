//! Per-channel effect parameter memory.

use tm_ir::EffectFamily;

/// Last nonzero parameter of each [`EffectFamily`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EffectMemory {
    slots: [u8; EffectFamily::COUNT],
}

impl EffectMemory {
    pub const fn new() -> Self {
        Self { slots: [0; EffectFamily::COUNT] }
    }

    /// Resolve a parameter: zero recalls the stored byte, anything else is
    /// stored and returned.
    #[inline]
    pub fn recall(&mut self, family: EffectFamily, param: u8) -> u8 {
        let slot = &mut self.slots[family.index()];
        if param != 0 {
            *slot = param;
        }
        *slot
    }

    #[inline]
    pub fn get(&self, family: EffectFamily) -> u8 {
        self.slots[family.index()]
    }

    /// Overwrite a slot unconditionally.
    #[inline]
    pub fn store(&mut self, family: EffectFamily, value: u8) {
        self.slots[family.index()] = value;
    }

    pub fn clear(&mut self) {
        self.slots = [0; EffectFamily::COUNT];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_recalls_and_nonzero_overwrites() {
        for family in EffectFamily::ALL {
            for stored in [0u8, 1, 0x37, 0xFF] {
                for param in [0u8, 1, 0x42, 0xFF] {
                    let mut mem = EffectMemory::new();
                    mem.store(family, stored);
                    let used = mem.recall(family, param);
                    let expected = if param == 0 { stored } else { param };
                    assert_eq!(used, expected);
                    assert_eq!(mem.get(family), expected);
                }
            }
        }
    }

    #[test]
    fn families_are_independent() {
        let mut mem = EffectMemory::new();
        mem.recall(EffectFamily::PortaUp, 5);
        mem.recall(EffectFamily::PortaDown, 9);
        assert_eq!(mem.recall(EffectFamily::PortaUp, 0), 5);
        assert_eq!(mem.get(EffectFamily::Vibrato), 0);
    }

    #[test]
    fn clear_forgets_everything() {
        let mut mem = EffectMemory::new();
        mem.recall(EffectFamily::Tremor, 0x21);
        mem.clear();
        assert_eq!(mem, EffectMemory::new());
    }
}
