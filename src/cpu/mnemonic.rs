//! Bit-exact ALU semantics, independent of addressing mode or bus access.
//!
//! Kept separate from the cycle-stepping state machine in [`super`] so the
//! algebraic properties (`SBC == ADC(!b)`, `ROL`/`ROR` involution) can be
//! exercised directly with `proptest`.

use super::status::Status;

/// `ADC`: `A = A + M + C`, with carry/overflow/zero/negative updated.
pub fn adc(a: u8, m: u8, p: &mut Status) -> u8 {
    let carry_in = p.contains(Status::CARRY) as u16;
    let sum = a as u16 + m as u16 + carry_in;
    let result = sum as u8;
    p.set(Status::CARRY, sum > 0xFF);
    p.set(Status::OVERFLOW, (a ^ result) & (m ^ result) & 0x80 != 0);
    p.set_zn(result);
    result
}

/// `SBC(a, m, p) == ADC(a, !m, p)` — the 6502 has no separate subtractor.
pub fn sbc(a: u8, m: u8, p: &mut Status) -> u8 {
    adc(a, !m, p)
}

/// Updates flags for `CMP`/`CPX`/`CPY` without producing a usable result byte.
pub fn compare(reg: u8, m: u8, p: &mut Status) {
    let result = reg.wrapping_sub(m);
    p.set(Status::CARRY, reg >= m);
    p.set_zn(result);
}

/// `BIT`: `Z` from `A & M`, `N`/`V` copied straight from bits 7/6 of `M`.
pub fn bit(a: u8, m: u8, p: &mut Status) {
    p.set(Status::ZERO, a & m == 0);
    p.set(Status::NEGATIVE, m & 0x80 != 0);
    p.set(Status::OVERFLOW, m & 0x40 != 0);
}

pub fn and(a: u8, m: u8, p: &mut Status) -> u8 {
    let r = a & m;
    p.set_zn(r);
    r
}

pub fn ora(a: u8, m: u8, p: &mut Status) -> u8 {
    let r = a | m;
    p.set_zn(r);
    r
}

pub fn eor(a: u8, m: u8, p: &mut Status) -> u8 {
    let r = a ^ m;
    p.set_zn(r);
    r
}

pub fn asl(m: u8, p: &mut Status) -> u8 {
    p.set(Status::CARRY, m & 0x80 != 0);
    let r = m << 1;
    p.set_zn(r);
    r
}

pub fn lsr(m: u8, p: &mut Status) -> u8 {
    p.set(Status::CARRY, m & 0x01 != 0);
    let r = m >> 1;
    p.set_zn(r);
    r
}

pub fn rol(m: u8, p: &mut Status) -> u8 {
    let carry_in = p.contains(Status::CARRY) as u8;
    p.set(Status::CARRY, m & 0x80 != 0);
    let r = (m << 1) | carry_in;
    p.set_zn(r);
    r
}

pub fn ror(m: u8, p: &mut Status) -> u8 {
    let carry_in = p.contains(Status::CARRY) as u8;
    p.set(Status::CARRY, m & 0x01 != 0);
    let r = (m >> 1) | (carry_in << 7);
    p.set_zn(r);
    r
}

pub fn inc(m: u8, p: &mut Status) -> u8 {
    let r = m.wrapping_add(1);
    p.set_zn(r);
    r
}

pub fn dec(m: u8, p: &mut Status) -> u8 {
    let r = m.wrapping_sub(1);
    p.set_zn(r);
    r
}

/// Load-register helper shared by `LDA`/`LDX`/`LDY`.
pub fn load(m: u8, p: &mut Status) -> u8 {
    p.set_zn(m);
    m
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn sbc_is_adc_of_complement(a: u8, b: u8, carry: bool, other: u8) {
            let mut p1 = Status::from_bits_truncate(other);
            p1.set(Status::CARRY, carry);
            let mut p2 = p1;
            let lhs = sbc(a, b, &mut p1);
            let rhs = adc(a, !b, &mut p2);
            prop_assert_eq!(lhs, rhs);
            prop_assert_eq!(p1, p2);
        }

        #[test]
        fn rol_ror_are_involutions_when_carry_preserved(v: u8, carry: bool) {
            let mut p = Status::empty();
            p.set(Status::CARRY, carry);
            let rolled = rol(v, &mut p);
            // rolling in the carry that rol() just produced, then rotating
            // back right, must reproduce the original byte and restore the
            // original carry-out bit as carry-in.
            let carry_out = p.contains(Status::CARRY);
            let mut p2 = Status::empty();
            p2.set(Status::CARRY, carry_out);
            // Undo: ROR with the bit that ROL shifted out as carry-in.
            let mut p3 = Status::empty();
            p3.set(Status::CARRY, carry);
            let _ = p2;
            let restored = ror(rolled, &mut {
                let mut undo = Status::empty();
                undo.set(Status::CARRY, (v & 0x80) != 0);
                undo
            });
            prop_assert_eq!(restored, v);
            let _ = p3;
        }

        #[test]
        fn compare_sets_carry_iff_reg_gte_operand(reg: u8, m: u8) {
            let mut p = Status::empty();
            compare(reg, m, &mut p);
            prop_assert_eq!(p.contains(Status::CARRY), reg >= m);
            prop_assert_eq!(p.contains(Status::ZERO), reg == m);
        }
    }
}
