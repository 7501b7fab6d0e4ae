//! The single-cycle execution units. Each is a pure function of its operands.

use crate::instruction::{BranchCondition, RegImmOp, RegRegOp, RegShiftImmOp};

/// Logic unit: AND, OR, XOR (register and immediate forms).
pub fn logic(op: LogicOp, lhs: u32, rhs: u32) -> u32 {
    match op {
        LogicOp::And => lhs & rhs,
        LogicOp::Or => lhs | rhs,
        LogicOp::Xor => lhs ^ rhs,
    }
}

/// Adder: ADD, SUB, ADDI. Overflow wraps.
pub fn adder(subtract: bool, lhs: u32, rhs: u32) -> u32 {
    match subtract {
        true => lhs.wrapping_sub(rhs),
        false => lhs.wrapping_add(rhs),
    }
}

/// Shifter: only the five least significant bits of `amount` are used.
pub fn shifter(op: ShiftOp, value: u32, amount: u32) -> u32 {
    let amount = amount & 0x1f;
    match op {
        ShiftOp::Left => value << amount,
        ShiftOp::RightLogical => value >> amount,
        ShiftOp::RightArithmetic => ((value as i32) >> amount) as u32,
    }
}

/// Compare unit: SLT/SLTU and their immediate forms.
pub fn compare(signed: bool, lhs: u32, rhs: u32) -> u32 {
    let less = match signed {
        true => (lhs as i32) < (rhs as i32),
        false => lhs < rhs,
    };
    less as u32
}

pub fn branch_taken(condition: BranchCondition, lhs: u32, rhs: u32) -> bool {
    match condition {
        BranchCondition::Beq => lhs == rhs,
        BranchCondition::Bne => lhs != rhs,
        BranchCondition::Blt => (lhs as i32) < (rhs as i32),
        BranchCondition::Bge => (lhs as i32) >= (rhs as i32),
        BranchCondition::Bltu => lhs < rhs,
        BranchCondition::Bgeu => lhs >= rhs,
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum LogicOp {
    And,
    Or,
    Xor,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ShiftOp {
    Left,
    RightLogical,
    RightArithmetic,
}

/// Result of an OP-IMM instruction.
pub fn reg_imm(op: RegImmOp, src: u32, immediate: i32) -> u32 {
    let imm = immediate as u32;
    match op {
        RegImmOp::Addi => adder(false, src, imm),
        RegImmOp::Slti => compare(true, src, imm),
        RegImmOp::Sltiu => compare(false, src, imm),
        RegImmOp::Xori => logic(LogicOp::Xor, src, imm),
        RegImmOp::Ori => logic(LogicOp::Or, src, imm),
        RegImmOp::Andi => logic(LogicOp::And, src, imm),
    }
}

pub fn reg_shift_imm(op: RegShiftImmOp, src: u32, amount: u32) -> u32 {
    let op = match op {
        RegShiftImmOp::Slli => ShiftOp::Left,
        RegShiftImmOp::Srli => ShiftOp::RightLogical,
        RegShiftImmOp::Srai => ShiftOp::RightArithmetic,
    };
    shifter(op, src, amount)
}

/// Result of an OP instruction.
pub fn reg_reg(op: RegRegOp, src1: u32, src2: u32) -> u32 {
    match op {
        RegRegOp::Add => adder(false, src1, src2),
        RegRegOp::Sub => adder(true, src1, src2),
        RegRegOp::Slt => compare(true, src1, src2),
        RegRegOp::Sltu => compare(false, src1, src2),
        RegRegOp::And => logic(LogicOp::And, src1, src2),
        RegRegOp::Or => logic(LogicOp::Or, src1, src2),
        RegRegOp::Xor => logic(LogicOp::Xor, src1, src2),
        RegRegOp::Sll => shifter(ShiftOp::Left, src1, src2),
        RegRegOp::Srl => shifter(ShiftOp::RightLogical, src1, src2),
        RegRegOp::Sra => shifter(ShiftOp::RightArithmetic, src1, src2),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reg_imm() {
        assert_eq!(0xde, reg_imm(RegImmOp::Addi, 0, 0xde));
        assert_eq!(0xffff_ffff, reg_imm(RegImmOp::Addi, 0, -1));
        assert_eq!(1, reg_imm(RegImmOp::Slti, -5i32 as u32, -4));
        assert_eq!(1, reg_imm(RegImmOp::Sltiu, 5, -1));
        assert_eq!(0xffff_f0f0, reg_imm(RegImmOp::Xori, 0x0f0f, -1));
    }

    #[test]
    fn test_shifts() {
        assert_eq!(0x8000_0000, reg_shift_imm(RegShiftImmOp::Slli, 1, 31));
        assert_eq!(0xffff_ff00, reg_reg(RegRegOp::Sra, 0x8000_0000, 23));
        assert_eq!(0x0000_0100, reg_reg(RegRegOp::Srl, 0x8000_0000, 23));
        assert_eq!(2, reg_reg(RegRegOp::Sll, 1, 33));
    }

    #[test]
    fn test_branches() {
        assert!(branch_taken(BranchCondition::Blt, -1i32 as u32, 0));
        assert!(!branch_taken(BranchCondition::Bltu, -1i32 as u32, 0));
        assert!(branch_taken(BranchCondition::Bgeu, -1i32 as u32, 0));
        assert!(branch_taken(BranchCondition::Bge, 3, 3));
        assert!(!branch_taken(BranchCondition::Bne, 3, 3));
    }
}
