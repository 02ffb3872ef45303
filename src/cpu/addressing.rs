/// Addressing mode of a decoded instruction.
///
/// Mirrors the 6502 opcode matrix's column grouping; cycle counts and
/// page-crossing behavior are derived from this plus the opcode's class
/// (read vs. read-modify-write vs. store) in [`super::mod`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressingMode {
    Implied,
    Accumulator,
    Immediate,
    ZeroPage,
    ZeroPageX,
    ZeroPageY,
    Absolute,
    AbsoluteX,
    AbsoluteY,
    Indirect,
    IndirectX,
    IndirectY,
    Relative,
}

impl AddressingMode {
    /// Number of operand bytes following the opcode.
    pub fn operand_len(self) -> u8 {
        match self {
            AddressingMode::Implied | AddressingMode::Accumulator => 0,
            AddressingMode::Immediate
            | AddressingMode::ZeroPage
            | AddressingMode::ZeroPageX
            | AddressingMode::ZeroPageY
            | AddressingMode::IndirectX
            | AddressingMode::IndirectY
            | AddressingMode::Relative => 1,
            AddressingMode::Absolute
            | AddressingMode::AbsoluteX
            | AddressingMode::AbsoluteY
            | AddressingMode::Indirect => 2,
        }
    }

    /// Whether this mode can incur the "+1 cycle on page cross" penalty for
    /// reads (stores/RMW always pay it regardless of crossing).
    pub fn indexed(self) -> bool {
        matches!(
            self,
            AddressingMode::AbsoluteX
                | AddressingMode::AbsoluteY
                | AddressingMode::IndirectY
                | AddressingMode::ZeroPageX
                | AddressingMode::ZeroPageY
        )
    }
}
