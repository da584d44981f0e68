// File: src/vm.rs
//
// Stack machine executing Monkey bytecode: a single operand stack shared
// by all frames, a separate frame stack for call/return, and a globals
// array addressed by `OpGetGlobal`/`OpSetGlobal`.

use std::rc::Rc;

use tracing::trace;

use crate::bytecode::{read_uint16, read_uint8, OpCode};
use crate::compiler::Bytecode;
use crate::errors::VmError;
use crate::object::{native_bool_to_object, CompiledFunction, Object, FALSE, NULL, TRUE};

const STACK_SIZE: usize = 2048;
const GLOBALS_SIZE: usize = 65536;
const MAX_FRAMES: usize = 1024;

struct Frame {
    func: Rc<CompiledFunction>,
    ip: isize,
    base_pointer: usize,
}

impl Frame {
    fn new(func: Rc<CompiledFunction>, base_pointer: usize) -> Self {
        Frame { func, ip: -1, base_pointer }
    }

    fn instructions(&self) -> &[u8] {
        &self.func.instructions
    }
}

pub struct Vm {
    constants: Vec<Object>,

    stack: Vec<Object>,
    sp: usize,
    globals: Vec<Object>,

    frames: Vec<Frame>,
}

impl Vm {
    pub fn new(bytecode: Bytecode) -> Self {
        let main_fn = Rc::new(CompiledFunction {
            instructions: bytecode.instructions,
            num_locals: 0,
            num_parameters: 0,
        });
        let main_frame = Frame::new(main_fn, 0);

        Vm {
            constants: bytecode.constants,
            stack: vec![NULL.clone(); STACK_SIZE],
            sp: 0,
            globals: vec![NULL.clone(); GLOBALS_SIZE],
            frames: vec![main_frame],
        }
    }

    /// Reuses a caller-provided globals array for REPL persistence.
    pub fn new_with_globals(bytecode: Bytecode, globals: Vec<Object>) -> Self {
        let mut vm = Vm::new(bytecode);
        vm.globals = globals;
        vm
    }

    pub fn into_globals(self) -> Vec<Object> {
        self.globals
    }

    pub fn last_popped_stack_element(&self) -> &Object {
        &self.stack[self.sp]
    }

    fn current_frame(&self) -> &Frame {
        self.frames.last().unwrap()
    }

    fn current_frame_mut(&mut self) -> &mut Frame {
        self.frames.last_mut().unwrap()
    }

    pub fn run(&mut self) -> Result<(), VmError> {
        while (self.current_frame().ip as i64) < self.current_frame().instructions().len() as i64 - 1 {
            self.current_frame_mut().ip += 1;
            let ip = self.current_frame().ip as usize;
            let op_byte = self.current_frame().instructions()[ip];
            let op = OpCode::from_byte(op_byte)
                .ok_or_else(|| VmError(format!("opcode {} undefined", op_byte)))?;
            trace!(?op, ip, "dispatch");

            match op {
                OpCode::OpConstant => {
                    let const_index = read_uint16(&self.current_frame().instructions()[ip + 1..]) as usize;
                    self.current_frame_mut().ip += 2;
                    let constant = self.constants[const_index].clone();
                    self.push(constant)?;
                }
                OpCode::OpAdd | OpCode::OpSub | OpCode::OpMul | OpCode::OpDiv => {
                    self.execute_binary_operation(op)?;
                }
                OpCode::OpPop => {
                    self.pop();
                }
                OpCode::OpTrue => self.push(TRUE.clone())?,
                OpCode::OpFalse => self.push(FALSE.clone())?,
                OpCode::OpEqual | OpCode::OpNotEqual | OpCode::OpGreaterThan | OpCode::OpGreaterThanOrEqual => {
                    self.execute_comparison(op)?;
                }
                OpCode::OpBang => self.execute_bang_operator()?,
                OpCode::OpMinus => self.execute_minus_operator()?,
                OpCode::OpJump => {
                    let pos = read_uint16(&self.current_frame().instructions()[ip + 1..]) as isize;
                    self.current_frame_mut().ip = pos - 1;
                }
                OpCode::OpJumpNotTruthy => {
                    let pos = read_uint16(&self.current_frame().instructions()[ip + 1..]) as isize;
                    self.current_frame_mut().ip += 2;
                    let condition = self.pop();
                    if !is_truthy(&condition) {
                        self.current_frame_mut().ip = pos - 1;
                    }
                }
                OpCode::OpNull => self.push(NULL.clone())?,
                OpCode::OpSetGlobal => {
                    let idx = read_uint16(&self.current_frame().instructions()[ip + 1..]) as usize;
                    self.current_frame_mut().ip += 2;
                    let value = self.pop();
                    self.globals[idx] = value;
                }
                OpCode::OpGetGlobal => {
                    let idx = read_uint16(&self.current_frame().instructions()[ip + 1..]) as usize;
                    self.current_frame_mut().ip += 2;
                    self.push(self.globals[idx].clone())?;
                }
                OpCode::OpArray => {
                    let n = read_uint16(&self.current_frame().instructions()[ip + 1..]) as usize;
                    self.current_frame_mut().ip += 2;
                    let array = self.build_array(self.sp - n, self.sp);
                    self.sp -= n;
                    self.push(array)?;
                }
                OpCode::OpHash => {
                    let n = read_uint16(&self.current_frame().instructions()[ip + 1..]) as usize;
                    self.current_frame_mut().ip += 2;
                    let hash = self.build_hash(self.sp - n, self.sp)?;
                    self.sp -= n;
                    self.push(hash)?;
                }
                OpCode::OpIndex => {
                    let index = self.pop();
                    let left = self.pop();
                    self.execute_index_expression(left, index)?;
                }
                OpCode::OpCall => {
                    let nargs = read_uint8(&self.current_frame().instructions()[ip + 1..]) as usize;
                    self.current_frame_mut().ip += 1;
                    self.call_function(nargs)?;
                }
                OpCode::OpReturnValue => {
                    let return_value = self.pop();
                    let frame = self.frames.pop().expect("return from empty frame stack");
                    self.sp = frame.base_pointer - 1;
                    self.push(return_value)?;
                }
                OpCode::OpReturn => {
                    let frame = self.frames.pop().expect("return from empty frame stack");
                    self.sp = frame.base_pointer - 1;
                    self.push(NULL.clone())?;
                }
                OpCode::OpSetLocal => {
                    let local_index = read_uint8(&self.current_frame().instructions()[ip + 1..]) as usize;
                    self.current_frame_mut().ip += 1;
                    let base = self.current_frame().base_pointer;
                    let value = self.pop();
                    self.stack[base + local_index] = value;
                }
                OpCode::OpGetLocal => {
                    let local_index = read_uint8(&self.current_frame().instructions()[ip + 1..]) as usize;
                    self.current_frame_mut().ip += 1;
                    let base = self.current_frame().base_pointer;
                    self.push(self.stack[base + local_index].clone())?;
                }
            }
        }

        Ok(())
    }

    fn push(&mut self, obj: Object) -> Result<(), VmError> {
        if self.sp >= STACK_SIZE {
            return Err(VmError("stack overflow".to_string()));
        }
        self.stack[self.sp] = obj;
        self.sp += 1;
        Ok(())
    }

    fn pop(&mut self) -> Object {
        let obj = self.stack[self.sp - 1].clone();
        self.sp -= 1;
        obj
    }

    fn execute_binary_operation(&mut self, op: OpCode) -> Result<(), VmError> {
        let right = self.pop();
        let left = self.pop();

        match (&left, &right) {
            (Object::Integer(_), Object::Integer(_)) => self.execute_binary_integer_operation(op, left, right),
            (Object::Str(_), Object::Str(_)) => self.execute_binary_string_operation(op, left, right),
            _ => Err(VmError(format!(
                "unsupported types for binary operation: {} {}",
                left.type_tag(),
                right.type_tag()
            ))),
        }
    }

    fn execute_binary_integer_operation(&mut self, op: OpCode, left: Object, right: Object) -> Result<(), VmError> {
        let (Object::Integer(l), Object::Integer(r)) = (left, right) else {
            unreachable!("caller guarantees both operands are integers")
        };

        let result = match op {
            OpCode::OpAdd => l.wrapping_add(r),
            OpCode::OpSub => l.wrapping_sub(r),
            OpCode::OpMul => l.wrapping_mul(r),
            OpCode::OpDiv => l.wrapping_div(r),
            other => return Err(VmError(format!("unknown integer operator: {:?}", other))),
        };

        self.push(Object::Integer(result))
    }

    fn execute_binary_string_operation(&mut self, op: OpCode, left: Object, right: Object) -> Result<(), VmError> {
        if op != OpCode::OpAdd {
            return Err(VmError(format!("unknown string operator: {:?}", op)));
        }

        let (Object::Str(l), Object::Str(r)) = (left, right) else {
            unreachable!("caller guarantees both operands are strings")
        };

        self.push(Object::Str(Rc::new(format!("{}{}", l, r))))
    }

    fn execute_comparison(&mut self, op: OpCode) -> Result<(), VmError> {
        let right = self.pop();
        let left = self.pop();

        if let (Object::Integer(l), Object::Integer(r)) = (&left, &right) {
            return self.execute_integer_comparison(op, *l, *r);
        }

        match op {
            OpCode::OpEqual => self.push(native_bool_to_object(left.identical(&right))),
            OpCode::OpNotEqual => self.push(native_bool_to_object(!left.identical(&right))),
            other => Err(VmError(format!(
                "unknown operator: {:?} ({} {})",
                other,
                left.type_tag(),
                right.type_tag()
            ))),
        }
    }

    fn execute_integer_comparison(&mut self, op: OpCode, left: i64, right: i64) -> Result<(), VmError> {
        let result = match op {
            OpCode::OpEqual => left == right,
            OpCode::OpNotEqual => left != right,
            OpCode::OpGreaterThan => left > right,
            OpCode::OpGreaterThanOrEqual => left >= right,
            other => return Err(VmError(format!("unknown operator: {:?}", other))),
        };
        self.push(native_bool_to_object(result))
    }

    fn execute_bang_operator(&mut self) -> Result<(), VmError> {
        let operand = self.pop();
        let result = if operand.identical(&TRUE) {
            FALSE.clone()
        } else if operand.identical(&FALSE) {
            TRUE.clone()
        } else if operand.identical(&NULL) {
            TRUE.clone()
        } else {
            FALSE.clone()
        };
        self.push(result)
    }

    fn execute_minus_operator(&mut self) -> Result<(), VmError> {
        let operand = self.pop();
        match operand {
            Object::Integer(v) => self.push(Object::Integer(-v)),
            other => Err(VmError(format!("unsupported type for negation: {}", other.type_tag()))),
        }
    }

    fn execute_index_expression(&mut self, left: Object, index: Object) -> Result<(), VmError> {
        match (&left, &index) {
            (Object::Array(_), Object::Integer(_)) => self.execute_array_index(left, index),
            (Object::Hash(_), _) => self.execute_hash_index(left, index),
            _ => Err(VmError(format!("index operator not supported: {}", left.type_tag()))),
        }
    }

    fn execute_array_index(&mut self, array: Object, index: Object) -> Result<(), VmError> {
        let Object::Array(elements) = array else { unreachable!() };
        let Object::Integer(i) = index else { unreachable!() };
        let max = elements.len() as i64 - 1;

        if i < 0 || i > max {
            return self.push(NULL.clone());
        }
        self.push(elements[i as usize].clone())
    }

    fn execute_hash_index(&mut self, hash: Object, index: Object) -> Result<(), VmError> {
        let Object::Hash(pairs) = hash else { unreachable!() };
        let key = index
            .hash_key()
            .ok_or_else(|| VmError(format!("unusable as hash key: {}", index.type_tag())))?;

        match pairs.get(&key) {
            Some((_, value)) => self.push(value.clone()),
            None => self.push(NULL.clone()),
        }
    }

    fn build_array(&self, start: usize, end: usize) -> Object {
        Object::Array(Rc::new(self.stack[start..end].to_vec()))
    }

    fn build_hash(&self, start: usize, end: usize) -> Result<Object, VmError> {
        let mut pairs = std::collections::HashMap::new();
        let mut i = start;
        while i < end {
            let key = self.stack[i].clone();
            let value = self.stack[i + 1].clone();

            let hash_key = key
                .hash_key()
                .ok_or_else(|| VmError(format!("unusable as hash key: {}", key.type_tag())))?;
            pairs.insert(hash_key, (key, value));
            i += 2;
        }
        Ok(Object::Hash(Rc::new(pairs)))
    }

    fn call_function(&mut self, nargs: usize) -> Result<(), VmError> {
        if self.frames.len() >= MAX_FRAMES {
            return Err(VmError("stack overflow".to_string()));
        }

        let callee = self.stack[self.sp - 1 - nargs].clone();
        let func = match callee {
            Object::CompiledFunction(f) => f,
            _ => return Err(VmError("calling non-function".to_string())),
        };

        if nargs != func.num_parameters {
            return Err(VmError(format!(
                "wrong number of arguments: want={}, got={}",
                func.num_parameters, nargs
            )));
        }

        let base_pointer = self.sp - nargs;
        let num_locals = func.num_locals;
        self.frames.push(Frame::new(func, base_pointer));
        self.sp = base_pointer + num_locals;
        Ok(())
    }
}

fn is_truthy(obj: &Object) -> bool {
    if obj.identical(&FALSE) {
        false
    } else {
        !obj.identical(&NULL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::Compiler;
    use crate::parser::Parser;

    fn run(input: &str) -> Object {
        let (program, errors) = Parser::parse_program(input);
        assert!(errors.is_empty(), "parse errors: {:?}", errors);
        let mut compiler = Compiler::new();
        compiler.compile(&program).expect("compile should succeed");
        let bytecode = compiler.bytecode();
        let mut vm = Vm::new(bytecode);
        vm.run().expect("vm should run without error");
        vm.last_popped_stack_element().clone()
    }

    fn run_err(input: &str) -> String {
        let (program, errors) = Parser::parse_program(input);
        assert!(errors.is_empty(), "parse errors: {:?}", errors);
        let mut compiler = Compiler::new();
        compiler.compile(&program).expect("compile should succeed");
        let bytecode = compiler.bytecode();
        let mut vm = Vm::new(bytecode);
        vm.run().unwrap_err().0
    }

    #[test]
    fn adds_integers() {
        assert!(matches!(run("1 + 2"), Object::Integer(3)));
    }

    #[test]
    fn evaluates_if_else() {
        assert!(matches!(run("if (true) { 10 } else { 20 }"), Object::Integer(10)));
    }

    #[test]
    fn binds_and_reads_globals() {
        assert!(matches!(run("let one = 1; let two = 2; one + two"), Object::Integer(3)));
    }

    #[test]
    fn concatenates_strings() {
        match run(r#""hello" + " " + "world""#) {
            Object::Str(s) => assert_eq!(*s, "hello world"),
            other => panic!("expected string, got {:?}", other),
        }
    }

    #[test]
    fn indexes_arrays_with_bounds_check() {
        assert!(matches!(run("[1, 2, 3][1]"), Object::Integer(2)));
        assert!(matches!(run("[1][5]"), Object::Null(_)));
    }

    #[test]
    fn calls_function_with_parameters() {
        assert!(matches!(run("let f = fn(a, b) { a + b }; f(5, 10);"), Object::Integer(15)));
    }

    #[test]
    fn string_equality_is_by_reference_not_content() {
        // Two independently-constructed strings with equal content are
        // NOT == per the VM's reference-equality contract for non-integer
        // types; only a shared binding compares equal to itself.
        assert!(matches!(run(r#""abc" == "abc""#), Object::Boolean(b) if !*b));
        assert!(matches!(run(r#"let a = "abc"; a == a"#), Object::Boolean(b) if *b));
    }

    #[test]
    fn binary_type_mismatch_is_a_runtime_error() {
        assert_eq!(
            run_err("1 + true"),
            "unsupported types for binary operation: INTEGER BOOLEAN"
        );
    }

    #[test]
    fn wrong_arity_is_a_runtime_error() {
        assert_eq!(run_err("fn() { 1 }(1)"), "wrong number of arguments: want=0, got=1");
    }

    #[test]
    fn singleton_identity_holds_across_pushes() {
        assert!(matches!(run("true"), Object::Boolean(b) if *b));
        assert!(matches!(run("!true"), Object::Boolean(b) if !*b));
    }
}
