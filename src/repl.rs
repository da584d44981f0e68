// File: src/repl.rs
//
// Interactive REPL for Monkey. Persists (symbol_table, constants,
// globals) across turns so a `let` in one line is visible in the next;
// the compiler and VM are rebuilt fresh each turn from that state bundle
// rather than kept alive.

use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::compiler::Compiler;
use crate::errors::{print_parse_errors, woops};
use crate::object::Object;
use crate::parser::Parser;
use crate::symbol_table::SymbolTable;
use crate::vm::Vm;

pub struct Repl {
    editor: DefaultEditor,
    symbol_table: SymbolTable,
    constants: Vec<Object>,
    globals: Vec<Object>,
}

impl Repl {
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let editor = DefaultEditor::new()?;
        Ok(Repl {
            editor,
            symbol_table: SymbolTable::new(),
            constants: Vec::new(),
            globals: vec![crate::object::NULL.clone(); 65536],
        })
    }

    fn show_banner(&self) {
        println!("{}", "╔══════════════════════════════════════════════╗".bright_cyan());
        println!("{}", "║            Monkey REPL — bytecode VM          ║".bright_cyan());
        println!("{}", "╚══════════════════════════════════════════════╝".bright_cyan());
        println!();
        println!("  {} Use {}{}{}{}", "Welcome!".bright_green(), ":".bright_blue(), "help".bright_yellow(), " for commands or ".bright_blue(), ":quit".bright_yellow());
        println!();
    }

    fn reset(&mut self) {
        self.symbol_table = SymbolTable::new();
        self.constants = Vec::new();
        self.globals = vec![crate::object::NULL.clone(); 65536];
    }

    pub fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.show_banner();

        loop {
            match self.editor.readline(">> ") {
                Ok(line) => {
                    let trimmed = line.trim();
                    self.editor.add_history_entry(&line)?;

                    match trimmed {
                        "" => continue,
                        ":quit" | ":q" => break,
                        ":help" => {
                            println!("  :help   show this message");
                            println!("  :reset  clear symbol table, constants, and globals");
                            println!("  :clear  alias for :reset");
                            println!("  :quit   exit the REPL");
                            continue;
                        }
                        ":reset" | ":clear" => {
                            self.reset();
                            continue;
                        }
                        _ => {}
                    }

                    self.eval(&line);
                }
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
                Err(err) => {
                    eprintln!("{}", woops("reading input", err));
                    break;
                }
            }
        }

        Ok(())
    }

    fn eval(&mut self, line: &str) {
        let (program, parse_errors) = Parser::parse_program(line);
        if !parse_errors.is_empty() {
            print_parse_errors(&parse_errors);
            return;
        }

        let symbol_table = std::mem::replace(&mut self.symbol_table, SymbolTable::new());
        let mut compiler = Compiler::new_with_state(symbol_table, std::mem::take(&mut self.constants));

        if let Err(err) = compiler.compile(&program) {
            eprintln!("{}", woops("Compilation failed", err));
            let (symbol_table, constants) = compiler.into_state();
            self.symbol_table = symbol_table;
            self.constants = constants;
            return;
        }

        let bytecode = compiler.bytecode_ref();
        let (symbol_table, constants) = compiler.into_state();
        self.symbol_table = symbol_table;
        self.constants = constants;

        let globals = std::mem::take(&mut self.globals);
        let mut vm = Vm::new_with_globals(bytecode, globals);

        match vm.run() {
            Ok(()) => {
                let result = vm.last_popped_stack_element().clone();
                self.globals = vm.into_globals();
                println!("{}", result.inspect());
            }
            Err(err) => {
                self.globals = vm.into_globals();
                eprintln!("{}", woops("Executing bytecode failed", err));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Mirrors `Repl::eval` turn-by-turn without needing a `DefaultEditor`,
    /// threading `(symbol_table, constants, globals)` through each call the
    /// way the REPL's `run` loop does.
    fn eval_turn(
        line: &str,
        symbol_table: SymbolTable,
        constants: Vec<Object>,
        globals: Vec<Object>,
    ) -> (Object, SymbolTable, Vec<Object>, Vec<Object>) {
        let (program, parse_errors) = Parser::parse_program(line);
        assert!(parse_errors.is_empty(), "unexpected parse errors: {:?}", parse_errors);

        let mut compiler = Compiler::new_with_state(symbol_table, constants);
        compiler.compile(&program).expect("compile should succeed");

        let bytecode = compiler.bytecode_ref();
        let (symbol_table, constants) = compiler.into_state();

        let mut vm = Vm::new_with_globals(bytecode, globals);
        vm.run().expect("vm should run without error");
        let result = vm.last_popped_stack_element().clone();
        let globals = vm.into_globals();

        (result, symbol_table, constants, globals)
    }

    #[test]
    fn let_binding_persists_across_repl_turns() {
        let symbol_table = SymbolTable::new();
        let constants = Vec::new();
        let globals = vec![crate::object::NULL.clone(); 65536];

        let (_, symbol_table, constants, globals) =
            eval_turn("let x = 5;", symbol_table, constants, globals);

        let (result, _, _, _) = eval_turn("x + 1;", symbol_table, constants, globals);

        assert!(matches!(result, Object::Integer(6)));
    }
}
