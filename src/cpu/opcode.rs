//! The 256-entry opcode decode table.
//!
//! Implemented as a `match` over the raw byte rather than a `static`
//! array-of-structs literal — the match form is easier to cross-reference
//! against a 6502 opcode sheet while reading.

use super::addressing::AddressingMode as Mode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mnemonic {
    Adc, And, Asl, Bcc, Bcs, Beq, Bit, Bmi, Bne, Bpl, Brk, Bvc, Bvs,
    Clc, Cld, Cli, Clv, Cmp, Cpx, Cpy, Dec, Dex, Dey, Eor, Inc, Inx, Iny,
    Jmp, Jsr, Lda, Ldx, Ldy, Lsr, Nop, Ora, Pha, Php, Pla, Plp, Rol, Ror,
    Rti, Rts, Sbc, Sec, Sed, Sei, Sta, Stx, Sty, Tax, Tay, Tsx, Txa, Txs, Tya,
    /// Unofficial opcode trap: locks the CPU up, requiring a reset.
    Jam,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpInfo {
    pub mnemonic: Mnemonic,
    pub mode: Mode,
    /// Base cycle count, excluding the dynamic page-cross/branch-taken
    /// penalties applied during addressing/execution.
    pub cycles: u8,
}

const fn op(mnemonic: Mnemonic, mode: Mode, cycles: u8) -> OpInfo {
    OpInfo { mnemonic, mode, cycles }
}

/// Decodes one opcode byte. Unofficial/illegal opcodes decode to `Jam`.
pub fn decode(opcode: u8) -> OpInfo {
    use Mnemonic::*;
    use Mode::*;
    match opcode {
        // ADC
        0x69 => op(Adc, Immediate, 2),
        0x65 => op(Adc, ZeroPage, 3),
        0x75 => op(Adc, ZeroPageX, 4),
        0x6D => op(Adc, Absolute, 4),
        0x7D => op(Adc, AbsoluteX, 4),
        0x79 => op(Adc, AbsoluteY, 4),
        0x61 => op(Adc, IndirectX, 6),
        0x71 => op(Adc, IndirectY, 5),
        // AND
        0x29 => op(And, Immediate, 2),
        0x25 => op(And, ZeroPage, 3),
        0x35 => op(And, ZeroPageX, 4),
        0x2D => op(And, Absolute, 4),
        0x3D => op(And, AbsoluteX, 4),
        0x39 => op(And, AbsoluteY, 4),
        0x21 => op(And, IndirectX, 6),
        0x31 => op(And, IndirectY, 5),
        // ASL
        0x0A => op(Asl, Accumulator, 2),
        0x06 => op(Asl, ZeroPage, 5),
        0x16 => op(Asl, ZeroPageX, 6),
        0x0E => op(Asl, Absolute, 6),
        0x1E => op(Asl, AbsoluteX, 7),
        // Branches
        0x90 => op(Bcc, Relative, 2),
        0xB0 => op(Bcs, Relative, 2),
        0xF0 => op(Beq, Relative, 2),
        0x30 => op(Bmi, Relative, 2),
        0xD0 => op(Bne, Relative, 2),
        0x10 => op(Bpl, Relative, 2),
        0x50 => op(Bvc, Relative, 2),
        0x70 => op(Bvs, Relative, 2),
        // BIT
        0x24 => op(Bit, ZeroPage, 3),
        0x2C => op(Bit, Absolute, 4),
        // BRK
        0x00 => op(Brk, Implied, 7),
        // Flags
        0x18 => op(Clc, Implied, 2),
        0xD8 => op(Cld, Implied, 2),
        0x58 => op(Cli, Implied, 2),
        0xB8 => op(Clv, Implied, 2),
        0x38 => op(Sec, Implied, 2),
        0xF8 => op(Sed, Implied, 2),
        0x78 => op(Sei, Implied, 2),
        // CMP
        0xC9 => op(Cmp, Immediate, 2),
        0xC5 => op(Cmp, ZeroPage, 3),
        0xD5 => op(Cmp, ZeroPageX, 4),
        0xCD => op(Cmp, Absolute, 4),
        0xDD => op(Cmp, AbsoluteX, 4),
        0xD9 => op(Cmp, AbsoluteY, 4),
        0xC1 => op(Cmp, IndirectX, 6),
        0xD1 => op(Cmp, IndirectY, 5),
        // CPX/CPY
        0xE0 => op(Cpx, Immediate, 2),
        0xE4 => op(Cpx, ZeroPage, 3),
        0xEC => op(Cpx, Absolute, 4),
        0xC0 => op(Cpy, Immediate, 2),
        0xC4 => op(Cpy, ZeroPage, 3),
        0xCC => op(Cpy, Absolute, 4),
        // DEC
        0xC6 => op(Dec, ZeroPage, 5),
        0xD6 => op(Dec, ZeroPageX, 6),
        0xCE => op(Dec, Absolute, 6),
        0xDE => op(Dec, AbsoluteX, 7),
        0xCA => op(Dex, Implied, 2),
        0x88 => op(Dey, Implied, 2),
        // EOR
        0x49 => op(Eor, Immediate, 2),
        0x45 => op(Eor, ZeroPage, 3),
        0x55 => op(Eor, ZeroPageX, 4),
        0x4D => op(Eor, Absolute, 4),
        0x5D => op(Eor, AbsoluteX, 4),
        0x59 => op(Eor, AbsoluteY, 4),
        0x41 => op(Eor, IndirectX, 6),
        0x51 => op(Eor, IndirectY, 5),
        // INC
        0xE6 => op(Inc, ZeroPage, 5),
        0xF6 => op(Inc, ZeroPageX, 6),
        0xEE => op(Inc, Absolute, 6),
        0xFE => op(Inc, AbsoluteX, 7),
        0xE8 => op(Inx, Implied, 2),
        0xC8 => op(Iny, Implied, 2),
        // JMP/JSR
        0x4C => op(Jmp, Absolute, 3),
        0x6C => op(Jmp, Indirect, 5),
        0x20 => op(Jsr, Absolute, 6),
        // LDA
        0xA9 => op(Lda, Immediate, 2),
        0xA5 => op(Lda, ZeroPage, 3),
        0xB5 => op(Lda, ZeroPageX, 4),
        0xAD => op(Lda, Absolute, 4),
        0xBD => op(Lda, AbsoluteX, 4),
        0xB9 => op(Lda, AbsoluteY, 4),
        0xA1 => op(Lda, IndirectX, 6),
        0xB1 => op(Lda, IndirectY, 5),
        // LDX
        0xA2 => op(Ldx, Immediate, 2),
        0xA6 => op(Ldx, ZeroPage, 3),
        0xB6 => op(Ldx, ZeroPageY, 4),
        0xAE => op(Ldx, Absolute, 4),
        0xBE => op(Ldx, AbsoluteY, 4),
        // LDY
        0xA0 => op(Ldy, Immediate, 2),
        0xA4 => op(Ldy, ZeroPage, 3),
        0xB4 => op(Ldy, ZeroPageX, 4),
        0xAC => op(Ldy, Absolute, 4),
        0xBC => op(Ldy, AbsoluteX, 4),
        // LSR
        0x4A => op(Lsr, Accumulator, 2),
        0x46 => op(Lsr, ZeroPage, 5),
        0x56 => op(Lsr, ZeroPageX, 6),
        0x4E => op(Lsr, Absolute, 6),
        0x5E => op(Lsr, AbsoluteX, 7),
        // NOP
        0xEA => op(Nop, Implied, 2),
        // ORA
        0x09 => op(Ora, Immediate, 2),
        0x05 => op(Ora, ZeroPage, 3),
        0x15 => op(Ora, ZeroPageX, 4),
        0x0D => op(Ora, Absolute, 4),
        0x1D => op(Ora, AbsoluteX, 4),
        0x19 => op(Ora, AbsoluteY, 4),
        0x01 => op(Ora, IndirectX, 6),
        0x11 => op(Ora, IndirectY, 5),
        // Stack
        0x48 => op(Pha, Implied, 3),
        0x08 => op(Php, Implied, 3),
        0x68 => op(Pla, Implied, 4),
        0x28 => op(Plp, Implied, 4),
        // ROL
        0x2A => op(Rol, Accumulator, 2),
        0x26 => op(Rol, ZeroPage, 5),
        0x36 => op(Rol, ZeroPageX, 6),
        0x2E => op(Rol, Absolute, 6),
        0x3E => op(Rol, AbsoluteX, 7),
        // ROR
        0x6A => op(Ror, Accumulator, 2),
        0x66 => op(Ror, ZeroPage, 5),
        0x76 => op(Ror, ZeroPageX, 6),
        0x6E => op(Ror, Absolute, 6),
        0x7E => op(Ror, AbsoluteX, 7),
        // RTI/RTS
        0x40 => op(Rti, Implied, 6),
        0x60 => op(Rts, Implied, 6),
        // SBC
        0xE9 => op(Sbc, Immediate, 2),
        0xE5 => op(Sbc, ZeroPage, 3),
        0xF5 => op(Sbc, ZeroPageX, 4),
        0xED => op(Sbc, Absolute, 4),
        0xFD => op(Sbc, AbsoluteX, 4),
        0xF9 => op(Sbc, AbsoluteY, 4),
        0xE1 => op(Sbc, IndirectX, 6),
        0xF1 => op(Sbc, IndirectY, 5),
        // STA
        0x85 => op(Sta, ZeroPage, 3),
        0x95 => op(Sta, ZeroPageX, 4),
        0x8D => op(Sta, Absolute, 4),
        0x9D => op(Sta, AbsoluteX, 5),
        0x99 => op(Sta, AbsoluteY, 5),
        0x81 => op(Sta, IndirectX, 6),
        0x91 => op(Sta, IndirectY, 6),
        // STX/STY
        0x86 => op(Stx, ZeroPage, 3),
        0x96 => op(Stx, ZeroPageY, 4),
        0x8E => op(Stx, Absolute, 4),
        0x84 => op(Sty, ZeroPage, 3),
        0x94 => op(Sty, ZeroPageX, 4),
        0x8C => op(Sty, Absolute, 4),
        // Transfers
        0xAA => op(Tax, Implied, 2),
        0xA8 => op(Tay, Implied, 2),
        0xBA => op(Tsx, Implied, 2),
        0x8A => op(Txa, Implied, 2),
        0x9A => op(Txs, Implied, 2),
        0x98 => op(Tya, Implied, 2),
        _ => op(Jam, Implied, 2),
    }
}
