//! Thread creation flags

use bitflags::bitflags;

bitflags! {
    /// Options accepted by thread creation.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CreateFlags: u8 {
        /// Leave the new thread sleeping until it is woken explicitly.
        const SLEEPING = 1 << 0;
        /// Do not reschedule at creation even if the new thread outranks
        /// the creator; the pending request is honoured at the next safe
        /// point instead.
        const WITHOUT_YIELD = 1 << 1;
        /// Paint the stack so that unused space can be measured later.
        const STACKTEST = 1 << 2;
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for CreateFlags {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "CreateFlags({=u8:#x})", self.bits());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_values_are_stable() {
        assert_eq!(CreateFlags::SLEEPING.bits(), 0x1);
        assert_eq!(CreateFlags::WITHOUT_YIELD.bits(), 0x2);
        assert_eq!(CreateFlags::STACKTEST.bits(), 0x4);
    }

    #[test]
    fn unknown_bits_are_dropped() {
        let flags = CreateFlags::from_bits_truncate(0xff);
        assert_eq!(flags, CreateFlags::all());
        assert!(CreateFlags::from_bits(0x8).is_none());
    }
}
