//! RV32I instruction decoding.
//!
//! Decoding is a pure function of the fetched word. The engine decodes once per instruction and
//! dispatches on [`Instruction::class`] to pick the single execution unit that handles it.

use crate::registers::Specifier;
use thiserror::Error;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Instruction {
    OpImm {
        op: RegImmOp,
        dest: Specifier,
        src: Specifier,
        immediate: i32,
    },
    OpShiftImm {
        op: RegShiftImmOp,
        dest: Specifier,
        src: Specifier,
        shift_amount_u5: u32,
    },
    /// Add upper immediate to pc. `immediate` has its lower 12 bits cleared.
    Auipc {
        dest: Specifier,
        immediate: i32,
    },
    /// Load upper immediate. `immediate` has its lower 12 bits cleared.
    Lui {
        dest: Specifier,
        immediate: i32,
    },
    Op {
        op: RegRegOp,
        dest: Specifier,
        src1: Specifier,
        src2: Specifier,
    },
    Jal {
        dest: Specifier,
        offset: i32,
    },
    Jalr {
        dest: Specifier,
        base: Specifier,
        offset: i32,
    },
    Branch {
        condition: BranchCondition,
        src1: Specifier,
        src2: Specifier,
        offset: i32,
    },
    Load {
        width: LoadWidth,
        dest: Specifier,
        base: Specifier,
        offset: i32,
    },
    Store {
        width: StoreWidth,
        src: Specifier,
        base: Specifier,
        offset: i32,
    },
    /// All fence variants. The hart has a single in-order bus port, so there is nothing to order.
    Fence,
    Ecall,
    Ebreak,
    Mret,
    Csr {
        op: CsrOp,
        dest: Specifier,
        source: CsrSource,
        csr: u16,
    },
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum RegImmOp {
    Addi,
    Slti,
    Sltiu,
    Xori,
    Ori,
    Andi,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum RegShiftImmOp {
    Slli,
    Srli,
    Srai,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum RegRegOp {
    Add,
    Slt,
    Sltu,
    And,
    Or,
    Xor,
    Sll,
    Srl,
    Sub,
    Sra,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum BranchCondition {
    Beq,
    Bne,
    Blt,
    Bltu,
    Bge,
    Bgeu,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum LoadWidth {
    Lb,
    Lh,
    Lw,
    Lbu,
    Lhu,
}

impl LoadWidth {
    /// Access size in bytes.
    pub fn size(self) -> u32 {
        match self {
            Self::Lb | Self::Lbu => 1,
            Self::Lh | Self::Lhu => 2,
            Self::Lw => 4,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum StoreWidth {
    Sb,
    Sh,
    Sw,
}

impl StoreWidth {
    /// Access size in bytes.
    pub fn size(self) -> u32 {
        match self {
            Self::Sb => 1,
            Self::Sh => 2,
            Self::Sw => 4,
        }
    }
}

/// Read-modify-write flavour of a Zicsr instruction.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum CsrOp {
    ReadWrite,
    ReadSet,
    ReadClear,
}

/// Second operand of a Zicsr instruction: `rs1` for CSRRW/CSRRS/CSRRC, a zero-extended 5-bit
/// immediate for the `I` variants.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum CsrSource {
    Register(Specifier),
    Immediate(u32),
}

/// The execution unit an instruction is dispatched to.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum InstrClass {
    Logic,
    Adder,
    Shifter,
    Compare,
    Mem,
    Lui,
    Auipc,
    Jal,
    Jalr,
    Branch,
    Csr,
    Mret,
    Fence,
    Ecall,
    Ebreak,
}

impl Instruction {
    pub fn decode(raw_instruction: u32) -> Result<Self, DecodeError> {
        let dest = rd(raw_instruction);
        let src1 = rs1(raw_instruction);
        let src2 = rs2(raw_instruction);
        let illegal = DecodeError::IllegalInstruction(raw_instruction);
        match opcode(raw_instruction).ok_or(DecodeError::UnsupportedOpcode(raw_instruction))? {
            Opcode::OpImm => match i_funct(raw_instruction) {
                Some(op) => Ok(Self::OpImm {
                    op,
                    dest,
                    src: src1,
                    immediate: i_imm(raw_instruction),
                }),
                None => i_shfunct(raw_instruction)
                    .map(|op| Self::OpShiftImm {
                        op,
                        dest,
                        src: src1,
                        shift_amount_u5: shamt(raw_instruction),
                    })
                    .ok_or(illegal),
            },
            Opcode::Auipc => Ok(Self::Auipc {
                dest,
                immediate: u_imm(raw_instruction),
            }),
            Opcode::Lui => Ok(Self::Lui {
                dest,
                immediate: u_imm(raw_instruction),
            }),
            Opcode::Op => r_funct(raw_instruction)
                .map(|op| Self::Op {
                    op,
                    dest,
                    src1,
                    src2,
                })
                .ok_or(illegal),
            Opcode::Jal => Ok(Self::Jal {
                dest,
                offset: j_imm(raw_instruction),
            }),
            Opcode::Jalr => match funct3(raw_instruction) {
                0 => Ok(Self::Jalr {
                    dest,
                    base: src1,
                    offset: i_imm(raw_instruction),
                }),
                _ => Err(illegal),
            },
            Opcode::Branch => b_funct(raw_instruction)
                .map(|condition| Self::Branch {
                    condition,
                    src1,
                    src2,
                    offset: b_imm(raw_instruction),
                })
                .ok_or(illegal),
            Opcode::Load => i_width(raw_instruction)
                .map(|width| Self::Load {
                    width,
                    dest,
                    base: src1,
                    offset: i_imm(raw_instruction),
                })
                .ok_or(illegal),
            Opcode::Store => s_width(raw_instruction)
                .map(|width| Self::Store {
                    width,
                    src: src2,
                    base: src1,
                    offset: s_imm(raw_instruction),
                })
                .ok_or(illegal),
            // FENCE and FENCE.TSO share funct3 0; reserved fields decode as a plain fence.
            Opcode::MiscMem => match funct3(raw_instruction) {
                0b000 => Ok(Self::Fence),
                _ => Err(illegal),
            },
            Opcode::System => match funct3(raw_instruction) {
                0b000 => {
                    if !dest.is_zero() || !src1.is_zero() {
                        return Err(illegal);
                    }
                    match raw_instruction >> 20 {
                        0x000 => Ok(Self::Ecall),
                        0x001 => Ok(Self::Ebreak),
                        0x302 => Ok(Self::Mret),
                        _ => Err(illegal),
                    }
                }
                0b100 => Err(illegal),
                f3 => {
                    let op = match f3 & 0b11 {
                        0b01 => CsrOp::ReadWrite,
                        0b10 => CsrOp::ReadSet,
                        _ => CsrOp::ReadClear,
                    };
                    let source = match f3 & 0b100 {
                        0 => CsrSource::Register(src1),
                        _ => CsrSource::Immediate((raw_instruction >> 15) & 0x1f),
                    };
                    Ok(Self::Csr {
                        op,
                        dest,
                        source,
                        csr: (raw_instruction >> 20) as u16,
                    })
                }
            },
        }
    }

    /// Returns the execution unit responsible for this instruction.
    pub fn class(&self) -> InstrClass {
        match self {
            Self::OpImm { op, .. } => match op {
                RegImmOp::Addi => InstrClass::Adder,
                RegImmOp::Slti | RegImmOp::Sltiu => InstrClass::Compare,
                RegImmOp::Xori | RegImmOp::Ori | RegImmOp::Andi => InstrClass::Logic,
            },
            Self::OpShiftImm { .. } => InstrClass::Shifter,
            Self::Op { op, .. } => match op {
                RegRegOp::Add | RegRegOp::Sub => InstrClass::Adder,
                RegRegOp::Slt | RegRegOp::Sltu => InstrClass::Compare,
                RegRegOp::And | RegRegOp::Or | RegRegOp::Xor => InstrClass::Logic,
                RegRegOp::Sll | RegRegOp::Srl | RegRegOp::Sra => InstrClass::Shifter,
            },
            Self::Auipc { .. } => InstrClass::Auipc,
            Self::Lui { .. } => InstrClass::Lui,
            Self::Jal { .. } => InstrClass::Jal,
            Self::Jalr { .. } => InstrClass::Jalr,
            Self::Branch { .. } => InstrClass::Branch,
            Self::Load { .. } | Self::Store { .. } => InstrClass::Mem,
            Self::Fence => InstrClass::Fence,
            Self::Ecall => InstrClass::Ecall,
            Self::Ebreak => InstrClass::Ebreak,
            Self::Mret => InstrClass::Mret,
            Self::Csr { .. } => InstrClass::Csr,
        }
    }

    /// The register committed at writeback, or `None` if this instruction class doesn't write
    /// `rd`.
    pub fn destination(&self) -> Option<Specifier> {
        match *self {
            Self::OpImm { dest, .. }
            | Self::OpShiftImm { dest, .. }
            | Self::Auipc { dest, .. }
            | Self::Lui { dest, .. }
            | Self::Op { dest, .. }
            | Self::Jal { dest, .. }
            | Self::Jalr { dest, .. }
            | Self::Load { dest, .. }
            | Self::Csr { dest, .. } => Some(dest),
            Self::Branch { .. }
            | Self::Store { .. }
            | Self::Fence
            | Self::Ecall
            | Self::Ebreak
            | Self::Mret => None,
        }
    }
}

#[derive(Error, Debug, Clone, Copy, Eq, PartialEq)]
pub enum DecodeError {
    #[error("unsupported opcode in instruction {0:#010x}")]
    UnsupportedOpcode(u32),
    #[error("illegal instruction {0:#010x}")]
    IllegalInstruction(u32),
}

impl DecodeError {
    /// The undecodable word, reported in `mtval`.
    pub fn raw(&self) -> u32 {
        match *self {
            Self::UnsupportedOpcode(raw) | Self::IllegalInstruction(raw) => raw,
        }
    }
}

enum Opcode {
    Load,
    MiscMem,
    OpImm,
    Auipc,
    Store,
    Op,
    Lui,
    Branch,
    Jalr,
    Jal,
    System,
}

fn opcode(raw_instruction: u32) -> Option<Opcode> {
    #[allow(clippy::unusual_byte_groupings)]
    match raw_instruction & 0x7f {
        0b00_000_11 => Some(Opcode::Load),
        0b00_011_11 => Some(Opcode::MiscMem),
        0b00_100_11 => Some(Opcode::OpImm),
        0b00_101_11 => Some(Opcode::Auipc),
        0b01_000_11 => Some(Opcode::Store),
        0b01_100_11 => Some(Opcode::Op),
        0b01_101_11 => Some(Opcode::Lui),
        0b11_000_11 => Some(Opcode::Branch),
        0b11_001_11 => Some(Opcode::Jalr),
        0b11_011_11 => Some(Opcode::Jal),
        0b11_100_11 => Some(Opcode::System),
        _ => None,
    }
}

fn rd(raw_instruction: u32) -> Specifier {
    Specifier::from_u5(raw_instruction >> 7)
}

fn rs1(raw_instruction: u32) -> Specifier {
    Specifier::from_u5(raw_instruction >> 15)
}

fn rs2(raw_instruction: u32) -> Specifier {
    Specifier::from_u5(raw_instruction >> 20)
}

fn i_funct(raw_instruction: u32) -> Option<RegImmOp> {
    match funct3(raw_instruction) {
        0b000 => Some(RegImmOp::Addi),
        0b010 => Some(RegImmOp::Slti),
        0b011 => Some(RegImmOp::Sltiu),
        0b100 => Some(RegImmOp::Xori),
        0b110 => Some(RegImmOp::Ori),
        0b111 => Some(RegImmOp::Andi),
        _ => None,
    }
}

fn i_shfunct(raw_instruction: u32) -> Option<RegShiftImmOp> {
    match (funct7(raw_instruction), funct3(raw_instruction)) {
        (0b000_0000, 0b001) => Some(RegShiftImmOp::Slli),
        (0b000_0000, 0b101) => Some(RegShiftImmOp::Srli),
        (0b010_0000, 0b101) => Some(RegShiftImmOp::Srai),
        _ => None,
    }
}

fn i_width(raw_instruction: u32) -> Option<LoadWidth> {
    match funct3(raw_instruction) {
        0b000 => Some(LoadWidth::Lb),
        0b001 => Some(LoadWidth::Lh),
        0b010 => Some(LoadWidth::Lw),
        0b100 => Some(LoadWidth::Lbu),
        0b101 => Some(LoadWidth::Lhu),
        _ => None,
    }
}

fn s_width(raw_instruction: u32) -> Option<StoreWidth> {
    match funct3(raw_instruction) {
        0b000 => Some(StoreWidth::Sb),
        0b001 => Some(StoreWidth::Sh),
        0b010 => Some(StoreWidth::Sw),
        _ => None,
    }
}

fn r_funct(raw_instruction: u32) -> Option<RegRegOp> {
    match (funct7(raw_instruction), funct3(raw_instruction)) {
        (0b000_0000, 0b000) => Some(RegRegOp::Add),
        (0b000_0000, 0b001) => Some(RegRegOp::Sll),
        (0b000_0000, 0b010) => Some(RegRegOp::Slt),
        (0b000_0000, 0b011) => Some(RegRegOp::Sltu),
        (0b000_0000, 0b100) => Some(RegRegOp::Xor),
        (0b000_0000, 0b101) => Some(RegRegOp::Srl),
        (0b000_0000, 0b110) => Some(RegRegOp::Or),
        (0b000_0000, 0b111) => Some(RegRegOp::And),
        (0b010_0000, 0b000) => Some(RegRegOp::Sub),
        (0b010_0000, 0b101) => Some(RegRegOp::Sra),
        _ => None,
    }
}

fn b_funct(raw_instruction: u32) -> Option<BranchCondition> {
    match funct3(raw_instruction) {
        0b000 => Some(BranchCondition::Beq),
        0b001 => Some(BranchCondition::Bne),
        0b100 => Some(BranchCondition::Blt),
        0b101 => Some(BranchCondition::Bge),
        0b110 => Some(BranchCondition::Bltu),
        0b111 => Some(BranchCondition::Bgeu),
        _ => None,
    }
}

fn funct3(raw_instruction: u32) -> u8 {
    ((raw_instruction >> 12) & 0b111) as u8
}

fn funct7(raw_instruction: u32) -> u8 {
    (raw_instruction >> 25) as u8
}

fn shamt(raw_instruction: u32) -> u32 {
    (raw_instruction >> 20) & 0x1f
}

/// 12-bit I-immediate, sign-extended.
fn i_imm(raw_instruction: u32) -> i32 {
    raw_instruction as i32 >> 20
}

/// 12-bit S-immediate, sign-extended.
fn s_imm(raw_instruction: u32) -> i32 {
    (raw_instruction & 0xfe00_0000) as i32 >> 20 | ((raw_instruction >> 7) & 0x1f) as i32
}

/// 13-bit B-immediate (bit 0 always clear), sign-extended.
fn b_imm(raw_instruction: u32) -> i32 {
    (raw_instruction & 0x8000_0000) as i32 >> 19
        | ((raw_instruction & 0x80) << 4) as i32
        | ((raw_instruction >> 20) & 0x7e0) as i32
        | ((raw_instruction >> 7) & 0x1e) as i32
}

/// U-immediate with the low 12 bits cleared.
fn u_imm(raw_instruction: u32) -> i32 {
    (raw_instruction & 0xffff_f000) as i32
}

/// 21-bit J-immediate (bit 0 always clear), sign-extended.
fn j_imm(raw_instruction: u32) -> i32 {
    (raw_instruction & 0x8000_0000) as i32 >> 11
        | (raw_instruction & 0x000f_f000) as i32
        | ((raw_instruction >> 9) & 0x800) as i32
        | ((raw_instruction >> 20) & 0x7fe) as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm;

    fn x(index: u32) -> Specifier {
        Specifier::from_u5(index)
    }

    #[test]
    fn test_decode_immediates() {
        assert_eq!(
            Ok(Instruction::OpImm {
                op: RegImmOp::Addi,
                dest: x(10),
                src: x(0),
                immediate: 0xde,
            }),
            Instruction::decode(asm::addi(10, 0, 0xde))
        );
        assert_eq!(
            Ok(Instruction::Store {
                width: StoreWidth::Sw,
                src: x(5),
                base: x(2),
                offset: -12,
            }),
            Instruction::decode(asm::sw(5, 2, -12))
        );
        assert_eq!(
            Ok(Instruction::Branch {
                condition: BranchCondition::Bne,
                src1: x(1),
                src2: x(2),
                offset: -4096,
            }),
            Instruction::decode(asm::bne(1, 2, -4096))
        );
        assert_eq!(
            Ok(Instruction::Jal {
                dest: x(1),
                offset: 0x000f_fffe,
            }),
            Instruction::decode(asm::jal(1, 0x000f_fffe))
        );
        assert_eq!(
            Ok(Instruction::Jal {
                dest: x(0),
                offset: -8,
            }),
            Instruction::decode(asm::jal(0, -8))
        );
        assert_eq!(
            Ok(Instruction::Lui {
                dest: x(3),
                immediate: 0xdead_b000_u32 as i32,
            }),
            Instruction::decode(asm::lui(3, 0xdead_b000))
        );
    }

    #[test]
    fn test_decode_system() {
        assert_eq!(Ok(Instruction::Ecall), Instruction::decode(asm::ecall()));
        assert_eq!(Ok(Instruction::Ebreak), Instruction::decode(asm::ebreak()));
        assert_eq!(Ok(Instruction::Mret), Instruction::decode(asm::mret()));
        assert_eq!(
            Ok(Instruction::Csr {
                op: CsrOp::ReadSet,
                dest: x(3),
                source: CsrSource::Register(x(0)),
                csr: 0x301,
            }),
            Instruction::decode(asm::csrr(3, 0x301))
        );
        assert_eq!(
            Ok(Instruction::Csr {
                op: CsrOp::ReadWrite,
                dest: x(0),
                source: CsrSource::Immediate(17),
                csr: 0x7b0,
            }),
            Instruction::decode(asm::csrrwi(0, 0x7b0, 17))
        );
        // wfi is not implemented
        assert_eq!(
            Err(DecodeError::IllegalInstruction(0x1050_0073)),
            Instruction::decode(0x1050_0073)
        );
    }

    #[test]
    fn test_illegal_reports_raw_word() {
        assert_eq!(0xffff_ffff, Instruction::decode(0xffff_ffff).unwrap_err().raw());
        assert_eq!(
            Err(DecodeError::UnsupportedOpcode(0)),
            Instruction::decode(0x0000_0000)
        );
        // sub with a bad funct7
        let bad_sub = asm::sub(1, 2, 3) | 1 << 26;
        assert_eq!(
            Err(DecodeError::IllegalInstruction(bad_sub)),
            Instruction::decode(bad_sub)
        );
    }

    #[test]
    fn test_class_and_destination() {
        let decode = |raw| Instruction::decode(raw).unwrap();
        assert_eq!(InstrClass::Adder, decode(asm::addi(1, 1, 1)).class());
        assert_eq!(InstrClass::Compare, decode(asm::slti(1, 1, 1)).class());
        assert_eq!(InstrClass::Logic, decode(asm::xori(1, 1, 1)).class());
        assert_eq!(InstrClass::Shifter, decode(asm::srai(1, 1, 3)).class());
        assert_eq!(InstrClass::Mem, decode(asm::lw(1, 0, 0)).class());
        assert_eq!(InstrClass::Fence, decode(asm::fence()).class());
        assert_eq!(Some(x(10)), decode(asm::jalr(10, 0, 0)).destination());
        assert_eq!(None, decode(asm::sw(1, 0, 0)).destination());
    }
}
