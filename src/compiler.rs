// File: src/compiler.rs
//
// Lowers the AST into a byte-encoded instruction stream plus an
// append-only constant pool. Tracks a stack of compilation scopes so
// function literals can be compiled into their own private instruction
// buffer while sharing the outer constants pool and an enclosed symbol
// table.

use std::rc::Rc;

use tracing::debug;

use crate::ast::{BlockStatement, Expression, Program, Statement};
use crate::bytecode::{make, Instructions, OpCode};
use crate::errors::CompileError;
use crate::object::{CompiledFunction, Object};
use crate::symbol_table::{SymbolScope, SymbolTable};

#[derive(Debug, Clone, Copy, Default)]
struct EmittedInstruction {
    opcode: Option<OpCode>,
    position: usize,
}

struct CompilationScope {
    instructions: Instructions,
    last_instruction: EmittedInstruction,
    previous_instruction: EmittedInstruction,
}

impl CompilationScope {
    fn new() -> Self {
        CompilationScope {
            instructions: Vec::new(),
            last_instruction: EmittedInstruction::default(),
            previous_instruction: EmittedInstruction::default(),
        }
    }
}

pub struct Bytecode {
    pub instructions: Instructions,
    pub constants: Vec<Object>,
}

pub struct Compiler {
    constants: Vec<Object>,
    symbol_table: SymbolTable,
    scopes: Vec<CompilationScope>,
}

impl Compiler {
    pub fn new() -> Self {
        Compiler { constants: Vec::new(), symbol_table: SymbolTable::new(), scopes: vec![CompilationScope::new()] }
    }

    /// Preserves constants and symbol table across REPL iterations.
    pub fn new_with_state(symbol_table: SymbolTable, constants: Vec<Object>) -> Self {
        let mut compiler = Compiler::new();
        compiler.symbol_table = symbol_table;
        compiler.constants = constants;
        compiler
    }

    pub fn into_state(self) -> (SymbolTable, Vec<Object>) {
        (self.symbol_table, self.constants)
    }

    fn current_instructions(&self) -> &Instructions {
        &self.scopes.last().unwrap().instructions
    }

    pub fn compile(&mut self, program: &Program) -> Result<(), CompileError> {
        for stmt in &program.statements {
            self.compile_statement(stmt)?;
        }
        Ok(())
    }

    fn compile_statement(&mut self, stmt: &Statement) -> Result<(), CompileError> {
        match stmt {
            Statement::Expression(expr) => {
                self.compile_expression(expr)?;
                self.emit(OpCode::OpPop, &[]);
            }
            Statement::Let { name, value } => {
                self.compile_expression(value)?;
                let symbol = self.symbol_table.define(name);
                match symbol.scope {
                    SymbolScope::Global => self.emit(OpCode::OpSetGlobal, &[symbol.index]),
                    SymbolScope::Local => self.emit(OpCode::OpSetLocal, &[symbol.index]),
                };
            }
            Statement::Return { value } => {
                self.compile_expression(value)?;
                self.emit(OpCode::OpReturnValue, &[]);
            }
        }
        Ok(())
    }

    fn compile_block(&mut self, block: &BlockStatement) -> Result<(), CompileError> {
        for stmt in &block.statements {
            self.compile_statement(stmt)?;
        }
        Ok(())
    }

    fn compile_expression(&mut self, expr: &Expression) -> Result<(), CompileError> {
        match expr {
            Expression::IntegerLiteral(value) => {
                let idx = self.add_constant(Object::Integer(*value));
                self.emit(OpCode::OpConstant, &[idx]);
            }
            Expression::StringLiteral(value) => {
                let idx = self.add_constant(Object::Str(Rc::new(value.clone())));
                self.emit(OpCode::OpConstant, &[idx]);
            }
            Expression::Boolean(value) => {
                self.emit(if *value { OpCode::OpTrue } else { OpCode::OpFalse }, &[]);
            }
            Expression::Prefix { operator, right } => {
                self.compile_expression(right)?;
                match operator.as_str() {
                    "!" => self.emit(OpCode::OpBang, &[]),
                    "-" => self.emit(OpCode::OpMinus, &[]),
                    other => return Err(CompileError(format!("unknown operator {}", other))),
                };
            }
            Expression::Infix { operator, left, right } => {
                if operator == "<" || operator == "<=" {
                    self.compile_expression(right)?;
                    self.compile_expression(left)?;
                    self.emit(
                        if operator == "<" { OpCode::OpGreaterThan } else { OpCode::OpGreaterThanOrEqual },
                        &[],
                    );
                    return Ok(());
                }

                self.compile_expression(left)?;
                self.compile_expression(right)?;
                match operator.as_str() {
                    "+" => self.emit(OpCode::OpAdd, &[]),
                    "-" => self.emit(OpCode::OpSub, &[]),
                    "*" => self.emit(OpCode::OpMul, &[]),
                    "/" => self.emit(OpCode::OpDiv, &[]),
                    ">" => self.emit(OpCode::OpGreaterThan, &[]),
                    ">=" => self.emit(OpCode::OpGreaterThanOrEqual, &[]),
                    "==" => self.emit(OpCode::OpEqual, &[]),
                    "!=" => self.emit(OpCode::OpNotEqual, &[]),
                    other => return Err(CompileError(format!("unknown operator {}", other))),
                };
            }
            Expression::If { condition, consequence, alternative } => {
                self.compile_expression(condition)?;
                let jump_not_truthy_pos = self.emit(OpCode::OpJumpNotTruthy, &[9999]);

                self.compile_block(consequence)?;
                if self.last_instruction_is(OpCode::OpPop) {
                    self.remove_last_pop();
                }

                let jump_pos = self.emit(OpCode::OpJump, &[9999]);
                let after_consequence_pos = self.current_instructions().len();
                self.change_operand(jump_not_truthy_pos, after_consequence_pos);

                match alternative {
                    None => {
                        self.emit(OpCode::OpNull, &[]);
                    }
                    Some(alt) => {
                        self.compile_block(alt)?;
                        if self.last_instruction_is(OpCode::OpPop) {
                            self.remove_last_pop();
                        }
                    }
                }

                let after_alternative_pos = self.current_instructions().len();
                self.change_operand(jump_pos, after_alternative_pos);
            }
            Expression::Identifier(name) => {
                let symbol = self
                    .symbol_table
                    .resolve(name)
                    .ok_or_else(|| CompileError(format!("undefined variable {}", name)))?;
                match symbol.scope {
                    SymbolScope::Global => self.emit(OpCode::OpGetGlobal, &[symbol.index]),
                    SymbolScope::Local => self.emit(OpCode::OpGetLocal, &[symbol.index]),
                };
            }
            Expression::ArrayLiteral { elements } => {
                for element in elements {
                    self.compile_expression(element)?;
                }
                self.emit(OpCode::OpArray, &[elements.len()]);
            }
            Expression::HashLiteral { pairs } => {
                let mut sorted = pairs.clone();
                sorted.sort_by(|(a, _), (b, _)| a.string_form().cmp(&b.string_form()));

                for (key, value) in &sorted {
                    self.compile_expression(key)?;
                    self.compile_expression(value)?;
                }
                self.emit(OpCode::OpHash, &[sorted.len() * 2]);
            }
            Expression::Index { left, index } => {
                self.compile_expression(left)?;
                self.compile_expression(index)?;
                self.emit(OpCode::OpIndex, &[]);
            }
            Expression::FunctionLiteral { parameters, body } => {
                self.enter_scope();

                for param in parameters {
                    self.symbol_table.define(param);
                }

                self.compile_block(body)?;

                if self.last_instruction_is(OpCode::OpPop) {
                    self.replace_last_pop_with_return();
                }
                if !self.last_instruction_is(OpCode::OpReturnValue) {
                    self.emit(OpCode::OpReturn, &[]);
                }

                let num_locals = self.symbol_table.num_definitions();
                let instructions = self.leave_scope();

                let compiled_fn = CompiledFunction {
                    instructions,
                    num_locals,
                    num_parameters: parameters.len(),
                };
                let idx = self.add_constant(Object::CompiledFunction(Rc::new(compiled_fn)));
                self.emit(OpCode::OpConstant, &[idx]);
            }
            Expression::Call { function, arguments } => {
                self.compile_expression(function)?;
                for arg in arguments {
                    self.compile_expression(arg)?;
                }
                self.emit(OpCode::OpCall, &[arguments.len()]);
            }
        }
        Ok(())
    }

    pub fn bytecode(self) -> Bytecode {
        Bytecode { instructions: self.scopes.into_iter().next().unwrap().instructions, constants: self.constants }
    }

    pub fn bytecode_ref(&self) -> Bytecode {
        Bytecode { instructions: self.current_instructions().clone(), constants: self.constants.clone() }
    }

    fn add_constant(&mut self, obj: Object) -> usize {
        self.constants.push(obj);
        self.constants.len() - 1
    }

    fn emit(&mut self, op: OpCode, operands: &[usize]) -> usize {
        let ins = make(op, operands);
        let pos = self.add_instruction(ins);
        self.set_last_instruction(op, pos);
        pos
    }

    fn add_instruction(&mut self, ins: Vec<u8>) -> usize {
        let scope = self.scopes.last_mut().unwrap();
        let pos = scope.instructions.len();
        scope.instructions.extend_from_slice(&ins);
        pos
    }

    fn set_last_instruction(&mut self, op: OpCode, pos: usize) {
        let scope = self.scopes.last_mut().unwrap();
        let previous = scope.last_instruction;
        scope.previous_instruction = previous;
        scope.last_instruction = EmittedInstruction { opcode: Some(op), position: pos };
    }

    fn last_instruction_is(&self, op: OpCode) -> bool {
        if self.current_instructions().is_empty() {
            return false;
        }
        self.scopes.last().unwrap().last_instruction.opcode == Some(op)
    }

    fn remove_last_pop(&mut self) {
        let scope = self.scopes.last_mut().unwrap();
        let last = scope.last_instruction;
        let previous = scope.previous_instruction;
        scope.instructions.truncate(last.position);
        scope.last_instruction = previous;
    }

    fn replace_instruction(&mut self, pos: usize, new_instruction: Vec<u8>) {
        let scope = self.scopes.last_mut().unwrap();
        for (i, byte) in new_instruction.into_iter().enumerate() {
            scope.instructions[pos + i] = byte;
        }
    }

    /// Overwrites an operand in place. Precondition: the replacement
    /// encoding has the same byte width as the original.
    fn change_operand(&mut self, op_pos: usize, operand: usize) {
        let op_byte = self.current_instructions()[op_pos];
        let op = crate::bytecode::OpCode::from_byte(op_byte).expect("valid opcode at patch site");
        let new_instruction = make(op, &[operand]);
        self.replace_instruction(op_pos, new_instruction);
    }

    fn enter_scope(&mut self) {
        self.scopes.push(CompilationScope::new());
        let outer = std::mem::take(&mut self.symbol_table);
        self.symbol_table = SymbolTable::new_enclosed(outer);
        debug!(depth = self.scopes.len(), "entered compilation scope");
    }

    fn leave_scope(&mut self) -> Instructions {
        let scope = self.scopes.pop().unwrap();
        let outer = std::mem::take(&mut self.symbol_table).into_outer().expect("leave_scope without enter_scope");
        self.symbol_table = outer;
        debug!(depth = self.scopes.len(), "left compilation scope");
        scope.instructions
    }

    fn replace_last_pop_with_return(&mut self) {
        let last_pos = self.scopes.last().unwrap().last_instruction.position;
        self.replace_instruction(last_pos, make(OpCode::OpReturnValue, &[]));
        self.scopes.last_mut().unwrap().last_instruction.opcode = Some(OpCode::OpReturnValue);
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::disassemble;
    use crate::parser::Parser;

    fn compile(input: &str) -> Bytecode {
        let (program, errors) = Parser::parse_program(input);
        assert!(errors.is_empty(), "parse errors: {:?}", errors);
        let mut compiler = Compiler::new();
        compiler.compile(&program).expect("compile should succeed");
        compiler.bytecode()
    }

    #[test]
    fn compiles_integer_arithmetic() {
        let bytecode = compile("1 + 2");
        assert_eq!(bytecode.constants.len(), 2);
        let dis = disassemble(&bytecode.instructions);
        assert!(dis.contains("OpConstant 0"));
        assert!(dis.contains("OpConstant 1"));
        assert!(dis.contains("OpAdd"));
        assert!(dis.contains("OpPop"));
    }

    #[test]
    fn compiles_less_than_via_greater_than_reordering() {
        let bytecode = compile("1 < 2");
        let dis = disassemble(&bytecode.instructions);
        assert!(dis.contains("OpGreaterThan"));
    }

    #[test]
    fn compiles_if_else_with_backpatched_jumps() {
        let bytecode = compile("if (true) { 10 } else { 20 }");
        let dis = disassemble(&bytecode.instructions);
        assert!(dis.contains("OpJumpNotTruthy"));
        assert!(dis.contains("OpJump"));
    }

    #[test]
    fn compiles_let_and_global_identifiers() {
        let bytecode = compile("let one = 1; let two = 2; one + two");
        let dis = disassemble(&bytecode.instructions);
        assert!(dis.contains("OpSetGlobal 0"));
        assert!(dis.contains("OpSetGlobal 1"));
        assert!(dis.contains("OpGetGlobal 0"));
        assert!(dis.contains("OpGetGlobal 1"));
    }

    #[test]
    fn compiles_hash_literal_with_sorted_keys() {
        let bytecode = compile(r#"{"b": 2, "a": 1}"#);
        let dis = disassemble(&bytecode.instructions);
        // "a" sorts before "b" so its key/value pair is emitted first
        // regardless of source order.
        assert!(dis.contains("OpHash 4"));
    }

    #[test]
    fn compiles_function_literal_with_locals_and_return() {
        let bytecode = compile("fn(a, b) { a + b }");
        match &bytecode.constants[0] {
            Object::CompiledFunction(f) => {
                assert_eq!(f.num_parameters, 2);
                assert_eq!(f.num_locals, 2);
                let dis = disassemble(&f.instructions);
                assert!(dis.contains("OpGetLocal 0"));
                assert!(dis.contains("OpGetLocal 1"));
                assert!(dis.contains("OpReturnValue"));
                assert!(!dis.contains("OpPop"));
            }
            other => panic!("expected CompiledFunction, got {:?}", other),
        }
    }

    #[test]
    fn compiles_call_expression() {
        let bytecode = compile("let f = fn(a, b) { a + b }; f(5, 10);");
        let dis = disassemble(&bytecode.instructions);
        assert!(dis.contains("OpCall 2"));
    }

    #[test]
    fn reports_undefined_variable() {
        let (program, errors) = Parser::parse_program("foo");
        assert!(errors.is_empty());
        let mut compiler = Compiler::new();
        let err = compiler.compile(&program).unwrap_err();
        assert_eq!(err.0, "undefined variable foo");
    }

    #[test]
    fn compile_is_deterministic() {
        let a = compile(r#"{"b": 2, "a": 1, "c": 3}"#);
        let b = compile(r#"{"b": 2, "a": 1, "c": 3}"#);
        assert_eq!(a.instructions, b.instructions);
    }
}
