//! `blue` -- the command-line front end (§6): a REPL when given no arguments, a file runner when
//! given exactly one, and a usage error otherwise.
//!
//! This is deliberately the thinnest possible wrapper around [blue::vm::VM]: reading source text
//! in, handing it to `interpret`, and translating the result into the documented exit code. Out
//! of scope per spec.md §1 ("the REPL loop, file reading, command-line dispatch... are trivial
//! front-ends"), but a shippable crate needs one, so it's implemented here per the external
//! contract in §6.

use std::io::{self, Write};
use std::process::ExitCode;

use blue::prelude::*;

/// `fgets`-style line cap from the original REPL: lines longer than this are truncated rather
/// than rejected.
const MAX_REPL_LINE_CHARS: usize = 1024;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();

    match args.as_slice() {
        [] => {
            repl();
            ExitCode::SUCCESS
        }
        [path] => run_file(path),
        _ => {
            eprintln!("Usage: blue [file path]");
            ExitCode::from(64)
        }
    }
}

/// Prompts `> `, reads a line at a time from stdin, and `interpret`s each one on the same [VM] --
/// so variables defined on one line are visible on the next -- until EOF.
fn repl() {
    let mut vm = VM::new();
    let stdin = io::stdin();

    loop {
        print!("> ");
        if io::stdout().flush().is_err() {
            break;
        }

        let mut line = String::new();
        match stdin.read_line(&mut line) {
            Ok(0) => {
                // EOF (e.g. Ctrl-D).
                println!();
                break;
            }
            Ok(_) => {
                if line.chars().count() > MAX_REPL_LINE_CHARS {
                    line = line.chars().take(MAX_REPL_LINE_CHARS).collect();
                }
                // A REPL line that fails to compile or run just gets reported; the loop
                // continues so the user can try again.
                let _ = vm.interpret(&line);
            }
            Err(_) => break,
        }
    }
}

/// Reads `path`, `interpret`s its contents once, and maps the result to the documented exit code.
fn run_file(path: &str) -> ExitCode {
    let source = match std::fs::read_to_string(path) {
        Ok(source) => source,
        Err(error) => {
            eprintln!("Could not read file \"{path}\": {error}");
            return ExitCode::from(74);
        }
    };

    match VM::new().interpret(&source) {
        Ok(()) => ExitCode::SUCCESS,
        Err(InterpretationError::CompileError) => ExitCode::from(65),
        Err(InterpretationError::RuntimeError) => ExitCode::from(70),
    }
}
