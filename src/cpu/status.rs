use bitflags::bitflags;

bitflags! {
    /// The 6502 processor status register (P).
    ///
    /// ```text
    /// 7 6 5 4 3 2 1 0
    /// N V 1 B D I Z C
    /// ```
    ///
    /// `Break` is not a real latch on the chip; it only describes how a
    /// status byte got pushed to the stack (BRK/PHP push it set, hardware
    /// interrupts push it clear). `Decimal` is readable/writable but the
    /// NES ALU ignores it.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Status: u8 {
        const CARRY     = 0b0000_0001;
        const ZERO      = 0b0000_0010;
        const IRQ_DISABLE = 0b0000_0100;
        const DECIMAL   = 0b0000_1000;
        const BREAK     = 0b0001_0000;
        const EXPANSION = 0b0010_0000;
        const OVERFLOW  = 0b0100_0000;
        const NEGATIVE  = 0b1000_0000;
    }
}

impl Status {
    /// Power-on value: `I` set, `EXPANSION` set.
    pub fn power_on() -> Self {
        Status::IRQ_DISABLE | Status::EXPANSION
    }

    pub fn set_zn(&mut self, value: u8) {
        self.set(Status::ZERO, value == 0);
        self.set(Status::NEGATIVE, value & 0x80 != 0);
    }

    /// Status byte as pushed by BRK/PHP (break + expansion both set).
    pub fn to_pushed_byte(self, with_break: bool) -> u8 {
        let mut bits = self | Status::EXPANSION;
        bits.set(Status::BREAK, with_break);
        bits.bits()
    }

    /// Restores flags from a byte pulled off the stack (RTI/PLP). The break
    /// bit is not a real latch, so it is dropped; expansion is always 1.
    pub fn from_pulled_byte(byte: u8) -> Self {
        (Status::from_bits_truncate(byte) | Status::EXPANSION) & !Status::BREAK
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pull_round_trips_flags_except_break() {
        let p = Status::CARRY | Status::NEGATIVE | Status::IRQ_DISABLE;
        let pushed = p.to_pushed_byte(false);
        let pulled = Status::from_pulled_byte(pushed);
        assert_eq!(pulled, p | Status::EXPANSION);
    }

    #[test]
    fn brk_pushes_with_break_set() {
        let p = Status::empty();
        assert_ne!(p.to_pushed_byte(true) & Status::BREAK.bits(), 0);
        assert_eq!(p.to_pushed_byte(false) & Status::BREAK.bits(), 0);
    }
}
