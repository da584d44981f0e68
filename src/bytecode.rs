// File: src/bytecode.rs
//
// Byte-encoded instruction stream for the Monkey VM: opcode definitions,
// operand-width table, the `make`/`read_operands` codec pair, and a
// disassembly formatter for observation only.

use std::collections::HashMap;
use std::fmt;

use once_cell::sync::Lazy;

pub type Instructions = Vec<u8>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    OpConstant = 0,
    OpAdd,
    OpSub,
    OpMul,
    OpDiv,
    OpPop,
    OpTrue,
    OpFalse,
    OpEqual,
    OpNotEqual,
    OpGreaterThan,
    OpGreaterThanOrEqual,
    OpMinus,
    OpBang,
    OpJumpNotTruthy,
    OpJump,
    OpNull,
    OpGetGlobal,
    OpSetGlobal,
    OpArray,
    OpHash,
    OpIndex,
    OpCall,
    OpReturnValue,
    OpReturn,
    OpGetLocal,
    OpSetLocal,
}

impl OpCode {
    pub fn from_byte(b: u8) -> Option<OpCode> {
        use OpCode::*;
        const TABLE: [OpCode; 27] = [
            OpConstant,
            OpAdd,
            OpSub,
            OpMul,
            OpDiv,
            OpPop,
            OpTrue,
            OpFalse,
            OpEqual,
            OpNotEqual,
            OpGreaterThan,
            OpGreaterThanOrEqual,
            OpMinus,
            OpBang,
            OpJumpNotTruthy,
            OpJump,
            OpNull,
            OpGetGlobal,
            OpSetGlobal,
            OpArray,
            OpHash,
            OpIndex,
            OpCall,
            OpReturnValue,
            OpReturn,
            OpGetLocal,
            OpSetLocal,
        ];
        TABLE.get(b as usize).copied()
    }
}

pub struct Definition {
    pub name: &'static str,
    pub operand_widths: &'static [usize],
}

static DEFINITIONS: Lazy<HashMap<OpCode, Definition>> = Lazy::new(|| {
    use OpCode::*;
    let mut m = HashMap::new();
    m.insert(OpConstant, Definition { name: "OpConstant", operand_widths: &[2] });
    m.insert(OpAdd, Definition { name: "OpAdd", operand_widths: &[] });
    m.insert(OpSub, Definition { name: "OpSub", operand_widths: &[] });
    m.insert(OpMul, Definition { name: "OpMul", operand_widths: &[] });
    m.insert(OpDiv, Definition { name: "OpDiv", operand_widths: &[] });
    m.insert(OpPop, Definition { name: "OpPop", operand_widths: &[] });
    m.insert(OpTrue, Definition { name: "OpTrue", operand_widths: &[] });
    m.insert(OpFalse, Definition { name: "OpFalse", operand_widths: &[] });
    m.insert(OpEqual, Definition { name: "OpEqual", operand_widths: &[] });
    m.insert(OpNotEqual, Definition { name: "OpNotEqual", operand_widths: &[] });
    m.insert(OpGreaterThan, Definition { name: "OpGreaterThan", operand_widths: &[] });
    m.insert(
        OpGreaterThanOrEqual,
        Definition { name: "OpGreaterThanOrEqual", operand_widths: &[] },
    );
    m.insert(OpMinus, Definition { name: "OpMinus", operand_widths: &[] });
    m.insert(OpBang, Definition { name: "OpBang", operand_widths: &[] });
    m.insert(OpJumpNotTruthy, Definition { name: "OpJumpNotTruthy", operand_widths: &[2] });
    m.insert(OpJump, Definition { name: "OpJump", operand_widths: &[2] });
    m.insert(OpNull, Definition { name: "OpNull", operand_widths: &[] });
    m.insert(OpGetGlobal, Definition { name: "OpGetGlobal", operand_widths: &[2] });
    m.insert(OpSetGlobal, Definition { name: "OpSetGlobal", operand_widths: &[2] });
    m.insert(OpArray, Definition { name: "OpArray", operand_widths: &[2] });
    m.insert(OpHash, Definition { name: "OpHash", operand_widths: &[2] });
    m.insert(OpIndex, Definition { name: "OpIndex", operand_widths: &[] });
    m.insert(OpCall, Definition { name: "OpCall", operand_widths: &[1] });
    m.insert(OpReturnValue, Definition { name: "OpReturnValue", operand_widths: &[] });
    m.insert(OpReturn, Definition { name: "OpReturn", operand_widths: &[] });
    m.insert(OpGetLocal, Definition { name: "OpGetLocal", operand_widths: &[1] });
    m.insert(OpSetLocal, Definition { name: "OpSetLocal", operand_widths: &[1] });
    m
});

pub fn lookup(op: u8) -> Result<&'static Definition, String> {
    let opcode = OpCode::from_byte(op).ok_or_else(|| format!("opcode {} undefined", op))?;
    DEFINITIONS.get(&opcode).ok_or_else(|| format!("opcode {} undefined", op))
}

/// Encodes one instruction. Unknown opcodes (none exist in this table, but
/// `from_byte`'s inverse would be caller error) never happen here since
/// `op` is already a typed `OpCode`; operands wider than the declared
/// width are truncated big-endian.
pub fn make(op: OpCode, operands: &[usize]) -> Vec<u8> {
    let def = match DEFINITIONS.get(&op) {
        Some(d) => d,
        None => return Vec::new(),
    };

    let instruction_len = 1 + def.operand_widths.iter().sum::<usize>();
    let mut instruction = vec![0u8; instruction_len];
    instruction[0] = op as u8;

    let mut offset = 1;
    for (i, width) in def.operand_widths.iter().enumerate() {
        let operand = operands.get(i).copied().unwrap_or(0);
        match width {
            2 => {
                let bytes = (operand as u16).to_be_bytes();
                instruction[offset] = bytes[0];
                instruction[offset + 1] = bytes[1];
            }
            1 => {
                instruction[offset] = operand as u8;
            }
            _ => {}
        }
        offset += width;
    }

    instruction
}

pub fn read_uint16(ins: &[u8]) -> u16 {
    u16::from_be_bytes([ins[0], ins[1]])
}

pub fn read_uint8(ins: &[u8]) -> u8 {
    ins[0]
}

/// Inverse of `make` restricted to valid input: returns the decoded
/// operands and the number of bytes consumed.
pub fn read_operands(def: &Definition, ins: &[u8]) -> (Vec<usize>, usize) {
    let mut operands = vec![0usize; def.operand_widths.len()];
    let mut offset = 0;

    for (i, width) in def.operand_widths.iter().enumerate() {
        match width {
            2 => operands[i] = read_uint16(&ins[offset..]) as usize,
            1 => operands[i] = read_uint8(&ins[offset..]) as usize,
            _ => {}
        }
        offset += width;
    }

    (operands, offset)
}

/// Disassembles an instruction stream for observation only; never
/// consumed by the VM.
pub fn disassemble(ins: &Instructions) -> String {
    let mut out = String::new();
    let mut i = 0;
    while i < ins.len() {
        match lookup(ins[i]) {
            Ok(def) => {
                let (operands, read) = read_operands(def, &ins[i + 1..]);
                out.push_str(&format!("{:04} {}\n", i, fmt_instruction(def, &operands)));
                i += 1 + read;
            }
            Err(err) => {
                out.push_str(&format!("ERROR: {}\n", err));
                i += 1;
            }
        }
    }
    out
}

fn fmt_instruction(def: &Definition, operands: &[usize]) -> String {
    if operands.len() != def.operand_widths.len() {
        return format!(
            "ERROR: operand len {} does not match defined {}",
            operands.len(),
            def.operand_widths.len()
        );
    }
    match operands.len() {
        0 => def.name.to_string(),
        1 => format!("{} {}", def.name, operands[0]),
        _ => format!("ERROR: unhandled operandCount for {}", def.name),
    }
}

impl fmt::Display for Definition {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn make_encodes_two_byte_operand() {
        let ins = make(OpCode::OpConstant, &[65534]);
        assert_eq!(ins, vec![OpCode::OpConstant as u8, 255, 254]);
    }

    #[test]
    fn make_encodes_one_byte_operand() {
        let ins = make(OpCode::OpGetLocal, &[255]);
        assert_eq!(ins, vec![OpCode::OpGetLocal as u8, 255]);
    }

    #[test]
    fn make_encodes_no_operand() {
        let ins = make(OpCode::OpAdd, &[]);
        assert_eq!(ins, vec![OpCode::OpAdd as u8]);
    }

    #[test]
    fn read_operands_round_trips_make() {
        let cases: Vec<(OpCode, Vec<usize>, usize)> =
            vec![(OpCode::OpConstant, vec![65535], 2), (OpCode::OpGetLocal, vec![255], 1)];
        for (op, operands, bytes_read) in cases {
            let ins = make(op, &operands);
            let def = lookup(ins[0]).unwrap();
            let (decoded, n) = read_operands(def, &ins[1..]);
            assert_eq!(n, bytes_read);
            assert_eq!(decoded, operands);
        }
    }

    #[test]
    fn disassemble_formats_instructions() {
        let instructions: Instructions = [
            make(OpCode::OpAdd, &[]),
            make(OpCode::OpGetLocal, &[1]),
            make(OpCode::OpConstant, &[2]),
            make(OpCode::OpConstant, &[65535]),
        ]
        .concat();

        let expected = "0000 OpAdd\n0001 OpGetLocal 1\n0003 OpConstant 2\n0006 OpConstant 65535\n";
        assert_eq!(disassemble(&instructions), expected);
    }

    #[test]
    fn lookup_reports_undefined_opcode() {
        let err = lookup(255).unwrap_err();
        assert_eq!(err, "opcode 255 undefined");
    }
}
