//! The bytecode virtual machine.

use std::rc::Rc;

use crate::compiler;
use crate::gc::StringInterner;
use crate::globals::Globals;
use crate::prelude::{Chunk, InterpretationError, OpCode, Value};
use crate::value::Obj;

/// Used as the minimum capacity of the stack.
/// Since we're using a growable [Vec], the stack size can be arbitrarily large.
const STACK_SIZE: usize = 256;

/// Maintains state for the Blue virtual machine.
///
/// A [VM] outlives any single [VM::interpret] call: its globals and string interner are the
/// "shared resources" of §5, carried across every line of a REPL session, and dropped (along
/// with every `Rc<Obj>` they were keeping alive) only when the `VM` itself is dropped.
#[derive(Default)]
pub struct VM {
    globals: Globals,
    strings: StringInterner,
}

/// A VM with an active chunk and mutable access to the VM's shared tables.
struct VmWithChunk<'a> {
    /// Instruction pointer --- index into the chunk for the next opcode to be executed.
    // TODO: convert to slice?
    ip: usize,
    /// Value stack -- modified as elements are pushed and popped from the stack.
    stack: Vec<Value>,
    chunk: &'a Chunk,
    globals: &'a mut Globals,
    strings: &'a mut StringInterner,
}

/// Fetches the next bytecode in the chunk, **AND** increments the instruction pointer.
///
/// Note: use [current_ip] to get the "current" value of the instruction pointer being executed
/// right now.
macro_rules! next_bytecode {
    ($self: ident, $chunk: ident) => {{
        let byte = $chunk.get($self.ip);
        $self.ip += 1;
        byte
    }};
}

/// Gets the value of the current instruction pointer. To be used in conjunction with
/// [next_bytecode].
macro_rules! current_ip {
    ($self: ident) => {
        $self.ip - 1
    };
}

impl VM {
    /// Returns a fresh [VM] with empty globals and an empty string interner.
    pub fn new() -> Self {
        VM::default()
    }

    /// Compiles and interprets a source string, reusing this VM's globals and string interner
    /// across calls (so a REPL can `interpret` one line at a time and still see earlier
    /// definitions).
    pub fn interpret(&mut self, source: &str) -> crate::Result<()> {
        let chunk = compiler::compile(source, &mut self.strings)?;
        let mut vm = VmWithChunk {
            ip: 0,
            stack: Vec::with_capacity(STACK_SIZE),
            chunk: &chunk,
            globals: &mut self.globals,
            strings: &mut self.strings,
        };
        vm.run()
    }
}

impl<'a> VmWithChunk<'a> {
    /// The main opcode interpreter loop.
    fn run(&mut self) -> crate::Result<()> {
        use OpCode::*;
        let chunk = self.chunk;

        loop {
            if cfg!(feature = "trace_execution") {
                use crate::debug::disassemble_instruction;

                // Prints the current stack:
                print!("        ");
                for value in self.stack.iter() {
                    print!("[ {value:?} ]")
                }
                println!();

                // Print the next instruction:
                disassemble_instruction(chunk, self.ip);
            }

            let opcode = next_bytecode!(self, chunk)
                .expect("I have an instruction pointer within range")
                .as_opcode();

            match opcode {
                Some(Constant) => {
                    let constant = next_bytecode!(self, chunk)
                        .expect("there should be an operand")
                        .resolve_constant()
                        .expect("there should be a constant at this index");
                    self.push(constant);
                }
                Some(Nil) => self.push(Value::Nil),
                Some(True) => self.push(true.into()),
                Some(False) => self.push(false.into()),
                Some(Pop) => {
                    self.pop();
                }
                Some(GetLocal) => {
                    let slot = next_bytecode!(self, chunk)
                        .expect("there should be an operand")
                        .as_constant_index();
                    self.push(self.stack[slot].clone());
                }
                Some(SetLocal) => {
                    let slot = next_bytecode!(self, chunk)
                        .expect("there should be an operand")
                        .as_constant_index();
                    // Assignment is an expression: leave the value on the stack, don't pop.
                    self.stack[slot] = self.peek(0);
                }
                Some(GetGlobal) => {
                    let name = self.read_name_constant(chunk);
                    match self.globals.get(&name).cloned() {
                        Some(value) => self.push(value),
                        None => return self.undefined_variable_error(&name),
                    }
                }
                Some(DefineGlobal) => {
                    let name = self.read_name_constant(chunk);
                    let value = self.peek(0);
                    self.globals.set(name, value);
                    self.pop();
                }
                Some(SetGlobal) => {
                    let name = self.read_name_constant(chunk);
                    if !self.globals.contains(&name) {
                        return self.undefined_variable_error(&name);
                    }
                    // Assignment is an expression: leave the value on the stack, don't pop.
                    let value = self.peek(0);
                    self.globals.set(name, value);
                }
                Some(Equal) => {
                    let rhs = self.pop();
                    let lhs = self.pop();
                    self.push(lhs.lox_equal(&rhs).into());
                }
                Some(Greater) => self.numeric_op(|a, b| Value::Bool(a > b))?,
                Some(Less) => self.numeric_op(|a, b| Value::Bool(a < b))?,
                Some(Add) => self.add()?,
                Some(Subtract) => self.numeric_op(|a, b| Value::Number(a - b))?,
                Some(Multiply) => self.numeric_op(|a, b| Value::Number(a * b))?,
                Some(Divide) => self.numeric_op(|a, b| Value::Number(a / b))?,
                Some(Exponent) => self.numeric_op(|a, b| Value::Number(a.powf(b)))?,
                Some(Not) => {
                    let value = self.pop();
                    self.push(value.is_falsy().into());
                }
                Some(Negate) => {
                    let value = self.pop();
                    match value.as_number() {
                        Some(number) => self.push((-number).into()),
                        None => return self.runtime_error("The operand or value must be a number."),
                    }
                }
                Some(Print) => {
                    let value = self.pop();
                    println!("{value}");
                }
                Some(Jump) => {
                    let offset = chunk.read_u16(self.ip);
                    self.ip += 2 + offset as usize;
                }
                Some(JumpIfFalse) => {
                    let offset = chunk.read_u16(self.ip);
                    self.ip += 2;
                    if self.peek(0).is_falsy() {
                        self.ip += offset as usize;
                    }
                }
                Some(Loop) => {
                    let offset = chunk.read_u16(self.ip);
                    self.ip += 2;
                    self.ip -= offset as usize;
                }
                Some(Return) => {
                    return Ok(());
                }
                None => panic!("fetched invalid opcode at {}", current_ip!(self)),
            }
        }
    }

    /// Reads the one-byte operand following the current opcode as an index into the constant
    /// pool, and returns the `Rc<Obj>` stored there. Used by `GET_GLOBAL`/`DEFINE_GLOBAL`/
    /// `SET_GLOBAL`, whose operand is always a name the compiler interned via
    /// `identifier_constant`.
    fn read_name_constant(&mut self, chunk: &Chunk) -> Rc<Obj> {
        let index = next_bytecode!(self, chunk)
            .expect("there should be an operand")
            .as_constant_index();

        chunk
            .constants
            .get(index)
            .expect("there should be a constant at this index")
            .as_obj()
            .expect("a name constant must be a string")
            .clone()
    }

    fn undefined_variable_error<T>(&mut self, name: &Rc<Obj>) -> crate::Result<T> {
        let Obj::String(name) = name.as_ref();
        self.runtime_error(&format!("Undefined variable: {}", name.as_str()))
    }

    fn runtime_error<T>(&mut self, message: &str) -> crate::Result<T> {
        eprintln!("{message}");

        let line = self
            .chunk
            .line_number_for(current_ip!(self))
            .expect("line number");
        eprintln!("[line {line}] in script.");

        self.reset_stack();

        Err(InterpretationError::RuntimeError)
    }

    /// `ADD` is the one binary operator that accepts either numbers or strings (concatenating the
    /// latter, through the interner, so the result is still subject to §3's interning invariant).
    fn add(&mut self) -> crate::Result<()> {
        let rhs = self.pop();
        let lhs = self.pop();

        if let (Some(a), Some(b)) = (lhs.as_number(), rhs.as_number()) {
            self.push(Value::Number(a + b));
            return Ok(());
        }

        if let (Some(a), Some(b)) = (lhs.as_string(), rhs.as_string()) {
            let concatenated = format!("{}{}", a.as_str(), b.as_str());
            let value = self.strings.intern_value(&concatenated);
            self.push(value);
            return Ok(());
        }

        self.runtime_error("Values must be two strings or numbers.")
    }

    /// Pops two operands and applies `op` to them, as `f64`s. Both operands must be numbers;
    /// anything else is a runtime error. Shared by `GREATER`/`LESS`/`SUBTRACT`/`MULTIPLY`/
    /// `DIVIDE`/`EXPONENT` -- only `ADD` needs the string-concatenation fallback, see [Self::add].
    fn numeric_op<F>(&mut self, op: F) -> crate::Result<()>
    where
        F: FnOnce(f64, f64) -> Value,
    {
        let rhs = self.pop();
        let lhs = self.pop();

        match (lhs.as_number(), rhs.as_number()) {
            (Some(a), Some(b)) => {
                self.push(op(a, b));
                Ok(())
            }
            _ => self.runtime_error("Values must be numbers."),
        }
    }

    /// Pushes a [Value] on to the value stack.
    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    /// Pops and returns the top [Value] on the value stack.
    ///
    /// # Panics
    ///
    /// Panics when the value stack is empty. Given well-formed Blue bytecode, a pop cannot occur
    /// when the value stack is empty; therefore the interpreter panics if it is in this state.
    #[inline(always)]
    fn pop(&mut self) -> Value {
        self.stack.pop().expect("value stack is empty")
    }

    /// Peeks at (and clones) the value relative to the top of the stack, without removing it.
    /// Used by jumps, assignment (`SET_LOCAL`/`SET_GLOBAL`/`DEFINE_GLOBAL` don't pop; see §9)
    /// and `JUMP_IF_FALSE`, all of which need to inspect the top of the stack without disturbing
    /// it.
    ///
    /// # Panics
    ///
    ///  * When the stack is empty
    ///  * When the distance goes off the end of the stack
    #[inline(always)]
    fn peek(&self, distance: usize) -> Value {
        self.stack[self.stack.len() - 1 - distance].clone()
    }

    #[inline(always)]
    fn reset_stack(&mut self) {
        self.stack.clear()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn run(source: &str) -> crate::Result<()> {
        VM::new().interpret(source)
    }

    #[test]
    fn arithmetic_precedence() {
        assert!(run("print 1 + 2 * 3;").is_ok());
    }

    #[test]
    fn string_concatenation_through_the_interner() {
        let mut vm = VM::new();
        assert!(vm
            .interpret("var a = \"foo\"; var b = \"bar\"; print a + b;")
            .is_ok());
    }

    #[test]
    fn interned_equality_after_concatenation() {
        // "ab" == "a"+"b" should hold, because the concatenation result is interned just like
        // any other string, so content-equal strings remain identity-equal.
        let mut vm = VM::new();
        assert!(vm.interpret("print \"ab\" == \"a\" + \"b\";").is_ok());
    }

    #[test]
    fn for_loop_accumulates() {
        let mut vm = VM::new();
        assert!(vm
            .interpret("var x = 0; for (var i = 0; i < 3; i = i + 1) { x = x + i; } print x;")
            .is_ok());
    }

    #[test]
    fn block_scoping_shadows_and_restores() {
        let mut vm = VM::new();
        assert!(vm
            .interpret("var a = 1; { var a = 2; print a; } print a;")
            .is_ok());
    }

    #[test]
    fn short_circuit_and_or() {
        let mut vm = VM::new();
        assert!(vm
            .interpret("print nil or 5; print false or nil or \"hi\"; print 1 and 2;")
            .is_ok());
    }

    #[test]
    fn adding_string_and_number_is_a_runtime_error() {
        let mut vm = VM::new();
        assert!(matches!(
            vm.interpret("print 1 + \"a\";"),
            Err(InterpretationError::RuntimeError)
        ));
    }

    #[test]
    fn negating_a_string_is_a_runtime_error() {
        let mut vm = VM::new();
        assert!(matches!(
            vm.interpret("print -\"a\";"),
            Err(InterpretationError::RuntimeError)
        ));
    }

    #[test]
    fn reading_an_undefined_global_is_a_runtime_error() {
        let mut vm = VM::new();
        assert!(matches!(
            vm.interpret("print undefinedVariable;"),
            Err(InterpretationError::RuntimeError)
        ));
    }

    #[test]
    fn exponent_is_left_associative() {
        // Preserved quirk (§9): `^` shares FACTOR precedence with `*`/`/`, so `2^3^2 == 64`,
        // not `2^(3^2) == 512`.
        let mut vm = VM::new();
        assert!(vm.interpret("print 2^3^2;").is_ok());
    }

    #[test]
    fn globals_persist_across_interpret_calls() {
        // A REPL calls `interpret` once per line on the same VM; globals defined on one line
        // must be visible on the next.
        let mut vm = VM::new();
        assert!(vm.interpret("var counter = 1;").is_ok());
        assert!(vm.interpret("print counter;").is_ok());
    }

    #[test]
    fn compile_error_short_circuits_before_running() {
        assert!(matches!(run("1 +;"), Err(InterpretationError::CompileError)));
    }

    #[test]
    fn global_self_reference_in_initializer_evaluates_to_nil() {
        // `var x = x;` at global scope must succeed (the initializer reads the
        // not-yet-defined `x` as nil, then defines it), not abort with an
        // "Undefined variable" runtime error.
        let mut vm = VM::new();
        assert!(vm.interpret("var x = x; print x;").is_ok());
    }
}
