//! RV32I encoders used by tests to build programs without an assembler.

#![allow(dead_code)]

fn r_type(opcode: u32, funct3: u32, funct7: u32, rd: u8, rs1: u8, rs2: u8) -> u32 {
    funct7 << 25
        | (rs2 as u32) << 20
        | (rs1 as u32) << 15
        | funct3 << 12
        | (rd as u32) << 7
        | opcode
}

fn i_type(opcode: u32, funct3: u32, rd: u8, rs1: u8, imm: i32) -> u32 {
    ((imm as u32) & 0xfff) << 20 | (rs1 as u32) << 15 | funct3 << 12 | (rd as u32) << 7 | opcode
}

fn s_type(opcode: u32, funct3: u32, rs1: u8, rs2: u8, imm: i32) -> u32 {
    let imm = imm as u32;
    (imm >> 5 & 0x7f) << 25
        | (rs2 as u32) << 20
        | (rs1 as u32) << 15
        | funct3 << 12
        | (imm & 0x1f) << 7
        | opcode
}

fn b_type(funct3: u32, rs1: u8, rs2: u8, offset: i32) -> u32 {
    let imm = offset as u32;
    (imm >> 12 & 1) << 31
        | (imm >> 5 & 0x3f) << 25
        | (rs2 as u32) << 20
        | (rs1 as u32) << 15
        | funct3 << 12
        | (imm >> 1 & 0xf) << 8
        | (imm >> 11 & 1) << 7
        | 0b110_0011
}

pub fn addi(rd: u8, rs1: u8, imm: i32) -> u32 {
    i_type(0b001_0011, 0b000, rd, rs1, imm)
}

pub fn slti(rd: u8, rs1: u8, imm: i32) -> u32 {
    i_type(0b001_0011, 0b010, rd, rs1, imm)
}

pub fn xori(rd: u8, rs1: u8, imm: i32) -> u32 {
    i_type(0b001_0011, 0b100, rd, rs1, imm)
}

pub fn slli(rd: u8, rs1: u8, shamt: u32) -> u32 {
    i_type(0b001_0011, 0b001, rd, rs1, shamt as i32)
}

pub fn srai(rd: u8, rs1: u8, shamt: u32) -> u32 {
    i_type(0b001_0011, 0b101, rd, rs1, (0x400 | shamt) as i32)
}

pub fn add(rd: u8, rs1: u8, rs2: u8) -> u32 {
    r_type(0b011_0011, 0b000, 0, rd, rs1, rs2)
}

pub fn sub(rd: u8, rs1: u8, rs2: u8) -> u32 {
    r_type(0b011_0011, 0b000, 0b010_0000, rd, rs1, rs2)
}

pub fn sltu(rd: u8, rs1: u8, rs2: u8) -> u32 {
    r_type(0b011_0011, 0b011, 0, rd, rs1, rs2)
}

pub fn lui(rd: u8, imm: u32) -> u32 {
    imm & 0xffff_f000 | (rd as u32) << 7 | 0b011_0111
}

pub fn auipc(rd: u8, imm: u32) -> u32 {
    imm & 0xffff_f000 | (rd as u32) << 7 | 0b001_0111
}

pub fn jal(rd: u8, offset: i32) -> u32 {
    let imm = offset as u32;
    (imm >> 20 & 1) << 31
        | (imm >> 1 & 0x3ff) << 21
        | (imm >> 11 & 1) << 20
        | (imm >> 12 & 0xff) << 12
        | (rd as u32) << 7
        | 0b110_1111
}

pub fn jalr(rd: u8, rs1: u8, offset: i32) -> u32 {
    i_type(0b110_0111, 0b000, rd, rs1, offset)
}

pub fn beq(rs1: u8, rs2: u8, offset: i32) -> u32 {
    b_type(0b000, rs1, rs2, offset)
}

pub fn bne(rs1: u8, rs2: u8, offset: i32) -> u32 {
    b_type(0b001, rs1, rs2, offset)
}

pub fn lb(rd: u8, rs1: u8, offset: i32) -> u32 {
    i_type(0b000_0011, 0b000, rd, rs1, offset)
}

pub fn lhu(rd: u8, rs1: u8, offset: i32) -> u32 {
    i_type(0b000_0011, 0b101, rd, rs1, offset)
}

pub fn lw(rd: u8, rs1: u8, offset: i32) -> u32 {
    i_type(0b000_0011, 0b010, rd, rs1, offset)
}

pub fn sb(rs2: u8, rs1: u8, offset: i32) -> u32 {
    s_type(0b010_0011, 0b000, rs1, rs2, offset)
}

pub fn sw(rs2: u8, rs1: u8, offset: i32) -> u32 {
    s_type(0b010_0011, 0b010, rs1, rs2, offset)
}

pub fn csrrw(rd: u8, csr: u16, rs1: u8) -> u32 {
    i_type(0b111_0011, 0b001, rd, rs1, csr as i32)
}

pub fn csrrs(rd: u8, csr: u16, rs1: u8) -> u32 {
    i_type(0b111_0011, 0b010, rd, rs1, csr as i32)
}

pub fn csrrc(rd: u8, csr: u16, rs1: u8) -> u32 {
    i_type(0b111_0011, 0b011, rd, rs1, csr as i32)
}

pub fn csrrwi(rd: u8, csr: u16, uimm: u8) -> u32 {
    i_type(0b111_0011, 0b101, rd, uimm, csr as i32)
}

pub fn csrrsi(rd: u8, csr: u16, uimm: u8) -> u32 {
    i_type(0b111_0011, 0b110, rd, uimm, csr as i32)
}

pub fn csrr(rd: u8, csr: u16) -> u32 {
    csrrs(rd, csr, 0)
}

pub fn fence() -> u32 {
    0x0ff0_000f
}

pub fn ecall() -> u32 {
    0x0000_0073
}

pub fn ebreak() -> u32 {
    0x0010_0073
}

pub fn mret() -> u32 {
    0x3020_0073
}

pub fn nop() -> u32 {
    addi(0, 0, 0)
}
