//! The interpreter value: the workspace plus the session-scoped settings
//! that are not persisted in it (comparison tolerance, debug flags,
//! result echoing), and the I/O endpoints the REPL, the editor and quad
//! input share.

use std::io::{self, BufRead, Write};

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::{AplError, Result};
use crate::lexer::Lexer;
use crate::token::Tok;
use crate::workspace::{Workspace, DEF_WS_KB, REPL_BUF_SIZE};

/// Debug flag bits (`⎕dbg`).
pub const DBG_REPL_TOKENS: u32 = 1;
pub const DBG_DUMP_FUNCTION: u32 = 2;

/// Bound on nested recovery contexts (REPL, file load, editor, `⍎`).
const MAX_RECOVERY_DEPTH: usize = 4;

/// Where interpreter output goes; tests capture it instead of stdout.
pub enum Output {
    Stdout,
    Capture(String),
}

/// A line source for the editor and quad input.
pub trait LineInput {
    /// Show `prompt` and read one line (no newline). `None` on EOF.
    fn read_line(&mut self, prompt: &str) -> Option<String>;
}

/// Interactive input from stdin.
pub struct StdinInput;

impl LineInput for StdinInput {
    fn read_line(&mut self, prompt: &str) -> Option<String> {
        print!("{prompt}");
        io::stdout().flush().ok();
        let mut buf = String::new();
        match io::stdin().lock().read_line(&mut buf) {
            Ok(0) | Err(_) => None,
            Ok(_) => {
                while buf.ends_with('\n') || buf.ends_with('\r') {
                    buf.pop();
                }
                Some(buf)
            }
        }
    }
}

/// No input available (scripted runs and tests).
pub struct NullInput;

impl LineInput for NullInput {
    fn read_line(&mut self, _prompt: &str) -> Option<String> {
        None
    }
}

/// Scripted input for tests: hands out the queued lines in order.
pub struct QueuedInput(pub Vec<String>);

impl LineInput for QueuedInput {
    fn read_line(&mut self, _prompt: &str) -> Option<String> {
        if self.0.is_empty() {
            None
        } else {
            Some(self.0.remove(0))
        }
    }
}

pub struct Interpreter {
    pub ws: Workspace,
    /// `⎕ct`.
    pub comp_tol: f64,
    /// `⎕dbg`.
    pub dbg_flags: u32,
    /// Cleared during `)load` so sourced expressions stay quiet.
    pub print_expr: bool,
    pub running: bool,
    pub(crate) rng: StdRng,
    recovery_depth: usize,
    out: Output,
    pub input: Box<dyn LineInput>,
}

pub const PROMPT: &str = "      ";

impl Interpreter {
    pub fn new(ws_kb: usize) -> Result<Interpreter> {
        Ok(Interpreter {
            ws: Workspace::new(ws_kb)?,
            comp_tol: 1e-14,
            dbg_flags: 0,
            print_expr: true,
            running: true,
            rng: StdRng::from_entropy(),
            recovery_depth: 0,
            out: Output::Stdout,
            input: Box::new(StdinInput),
        })
    }

    /// An interpreter with captured output and scripted input, for tests.
    pub fn for_tests() -> Interpreter {
        let mut it = Interpreter::new(DEF_WS_KB).expect("default workspace size is valid");
        it.out = Output::Capture(String::new());
        it.input = Box::new(NullInput);
        it
    }

    pub fn origin(&self) -> usize {
        self.ws.origin()
    }

    pub fn print_prec(&self) -> usize {
        self.ws.print_prec()
    }

    // --- output ---------------------------------------------------------

    pub fn print(&mut self, text: &str) {
        match &mut self.out {
            Output::Stdout => {
                print!("{text}");
                io::stdout().flush().ok();
            }
            Output::Capture(buf) => buf.push_str(text),
        }
    }

    pub fn println(&mut self, text: &str) {
        self.print(text);
        self.print("\n");
    }

    /// Drain captured output (empty for stdout interpreters).
    pub fn take_output(&mut self) -> String {
        match &mut self.out {
            Output::Stdout => String::new(),
            Output::Capture(buf) => std::mem::take(buf),
        }
    }

    // --- recovery points ------------------------------------------------

    /// Establish a recovery point before entering a nested execution
    /// context. Exhausting the bounded stack is fatal.
    pub fn enter_context(&mut self) -> Result<()> {
        if self.recovery_depth >= MAX_RECOVERY_DEPTH {
            return Err(AplError::fatal("recovery stack overflow"));
        }
        self.recovery_depth += 1;
        Ok(())
    }

    pub fn leave_context(&mut self) {
        debug_assert!(self.recovery_depth > 0, "recovery stack underflow");
        self.recovery_depth = self.recovery_depth.saturating_sub(1);
    }

    // --- line execution -------------------------------------------------

    /// A lexer over the REPL/compile buffer at the end of the workspace.
    pub fn repl_lexer(&self) -> Lexer {
        Lexer::new(self.ws.buf_base(), REPL_BUF_SIZE, 0, None)
    }

    /// Copy `line` into the REPL buffer (truncated and NUL-terminated)
    /// and return its byte length including the terminator.
    pub fn stage_line(&mut self, line: &str) -> usize {
        let bytes = line.as_bytes();
        let n = bytes.len().min(REPL_BUF_SIZE - 1);
        let base = self.ws.buf_base();
        self.ws.bytes_mut(base, n).copy_from_slice(&bytes[..n]);
        self.ws.set_u8(base + n, 0);
        n + 1
    }

    /// Evaluate one line of input: a system command, a `∇` directive, or
    /// an expression list.
    pub fn eval_line(&mut self, line: &str) -> Result<()> {
        if let Some(cmd) = line.strip_prefix(')') {
            crate::syscmd::run_command(self, cmd);
            return Ok(());
        }
        if line.trim().is_empty() {
            return Ok(());
        }

        let len = self.stage_line(line);
        let mut lex = self.repl_lexer();
        lex.init(len)?;
        lex.start_line(&mut self.ws)?;

        if lex.tok == Tok::Del {
            let result = crate::editor::del_command(self, &mut lex);
            self.ws.reset_stacks();
            return result;
        }

        lex.tok_expr(&mut self.ws)?;
        let mut env = crate::eval::Env::from_lexer(&lex, &self.ws);
        if self.dbg_flags & DBG_REPL_TOKENS != 0 {
            let listing = crate::eval::tok_print(self, env.code, env.lit_base);
            self.print(&listing);
        }
        crate::eval::eval_expr_list(self, &mut env)?;
        self.ws.reset_stacks();
        Ok(())
    }

    /// One REPL step: evaluate the line, report any error, reset the
    /// evaluation stacks. Returns `false` on a fatal error.
    pub fn session_line(&mut self, line: &str) -> bool {
        if self.enter_context().is_err() {
            return false;
        }
        let result = self.eval_line(line);
        self.leave_context();
        match result {
            Ok(()) => true,
            Err(err) => {
                let fatal = err.is_fatal();
                self.println(&format!("{err}"));
                self.ws.reset_stacks();
                !fatal
            }
        }
    }
}
