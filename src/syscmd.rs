//! `)command` handling: workspace management, listings, load/save.
//!
//! Commands match case-insensitively by prefix; an ambiguous prefix is
//! reported rather than guessed. A failing command reports its error and
//! returns a nonzero status without leaving the session.

use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use crate::editor;
use crate::eval::{self, Env};
use crate::function::FunObj;
use crate::image;
use crate::interp::Interpreter;
use crate::workspace::{REPL_BUF_SIZE, WSID_SIZE};

struct Command {
    name: &'static str,
    help: &'static str,
    handler: fn(&mut Interpreter, &[String]) -> i32,
}

static COMMANDS: [Command; 13] = [
    Command { name: "clear", help: "Clear the workspace", handler: cmd_clear },
    Command { name: "digits", help: "Set/get print precision", handler: cmd_digits },
    Command { name: "erase", help: "Erase variable/function", handler: cmd_erase },
    Command { name: "fns", help: "Show defined functions", handler: cmd_fns },
    Command { name: "heap", help: "Heap statistics", handler: cmd_heap },
    Command { name: "load", help: "Load source/workspace", handler: cmd_load },
    Command { name: "mem", help: "Show memory usage [K|M]", handler: cmd_mem },
    Command { name: "off", help: "Exit APL", handler: cmd_off },
    Command { name: "origin", help: "Set/get the system origin (0/1)", handler: cmd_origin },
    Command { name: "save", help: "Save source/workspace", handler: cmd_save },
    Command { name: "vars", help: "Show defined variables", handler: cmd_vars },
    Command { name: "wsid", help: "Show/change workspace ID", handler: cmd_wsid },
    Command { name: "?", help: "Display help", handler: cmd_help },
];

/// Split a command line into arguments; double quotes group words.
fn make_argv(line: &str) -> Vec<String> {
    let mut argv = Vec::new();
    let mut chars = line.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        let mut arg = String::new();
        if c == '"' {
            chars.next();
            for c in chars.by_ref() {
                if c == '"' {
                    break;
                }
                arg.push(c);
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() {
                    break;
                }
                arg.push(c);
                chars.next();
            }
        }
        argv.push(arg);
    }
    argv
}

enum Lookup {
    Found(&'static Command),
    Ambiguous,
    Unknown,
}

fn find_command(name: &str) -> Lookup {
    let lowered = name.to_ascii_lowercase();
    let mut found = None;
    let mut matches = 0;
    for cmd in &COMMANDS {
        if cmd.name == lowered {
            return Lookup::Found(cmd);
        }
        if cmd.name.starts_with(&lowered) {
            matches += 1;
            found = Some(cmd);
        }
    }
    match (matches, found) {
        (1, Some(cmd)) => Lookup::Found(cmd),
        (0, _) => Lookup::Unknown,
        _ => Lookup::Ambiguous,
    }
}

/// Run a system command (without its leading `)`); returns its status.
pub fn run_command(it: &mut Interpreter, line: &str) -> i32 {
    let argv = make_argv(line);
    let Some(name) = argv.first() else {
        it.println("Invalid system command.");
        return 1;
    };
    match find_command(name) {
        Lookup::Found(cmd) => (cmd.handler)(it, &argv),
        Lookup::Ambiguous => {
            it.println("Ambiguous system command.");
            1
        }
        Lookup::Unknown => {
            it.println("Invalid system command.");
            1
        }
    }
}

fn cmd_clear(it: &mut Interpreter, _argv: &[String]) -> i32 {
    it.ws.clear(true);
    it.println("Clear WS");
    0
}

fn cmd_digits(it: &mut Interpreter, argv: &[String]) -> i32 {
    match argv.len() {
        1 => {
            let prec = it.print_prec();
            it.println(&format!("Print precision is {prec}."));
            0
        }
        2 => match argv[1].parse::<usize>() {
            Ok(n) if (1..=16).contains(&n) => {
                let old = it.print_prec();
                it.println(&format!("Print precision was {old}"));
                it.ws.set_print_prec(n);
                0
            }
            _ => {
                it.println(" Must be between 1 and 16.");
                1
            }
        },
        _ => 1,
    }
}

fn cmd_erase(it: &mut Interpreter, argv: &[String]) -> i32 {
    if argv.len() < 2 {
        it.println(")ERASE name1 name2...");
        return 1;
    }
    for name in &argv[1..] {
        it.ws.name_erase(name.as_bytes());
    }
    0
}

fn cmd_fns(it: &mut Interpreter, argv: &[String]) -> i32 {
    let _ = argv;
    let mut listing = String::new();
    for entry in it.ws.name_entries() {
        if entry.is_function() && entry.is_defined() {
            let arity = entry.dtype.arity();
            listing.push_str(&format!("   {}/{}\n", entry.name, arity));
        }
    }
    it.print(&listing);
    0
}

fn cmd_heap(it: &mut Interpreter, argv: &[String]) -> i32 {
    let _ = argv;
    let stats = it.ws.heap_stats();
    if stats.blocks > 0 {
        it.println(&format!(
            "Heap stats: {} blocks, min={}, max={}, avg={}",
            stats.blocks, stats.min, stats.max, stats.avg
        ));
    } else {
        it.println("Heap stats: empty");
    }
    0
}

fn cmd_load(it: &mut Interpreter, argv: &[String]) -> i32 {
    if argv.len() == 1 {
        it.println("Load <file.apl>");
        return 0;
    }
    let mut status = 0;
    for file in &argv[1..] {
        if load_file(it, Path::new(file)).is_err() {
            status = 1;
        }
    }
    status
}

fn cmd_mem(it: &mut Interpreter, argv: &[String]) -> i32 {
    let scale = match argv.get(1).map(|a| a.to_ascii_lowercase()) {
        Some(a) if a.starts_with('k') => 1024,
        Some(a) if a.starts_with('m') => 1024 * 1024,
        _ => 1,
    };

    let ws = &it.ws;
    let rows = [
        ("REPL buffer", REPL_BUF_SIZE, REPL_BUF_SIZE, 0),
        (
            "Name table",
            ws.nam_size(),
            ws.nam_top() - ws.nam_base(),
            ws.hep_base() - ws.nam_top(),
        ),
        (
            "Heap",
            ws.hepopr_size(),
            ws.hep_top() - ws.hep_base(),
            ws.opr_top() - ws.hep_top(),
        ),
        (
            "Oper stack",
            ws.hepopr_size(),
            ws.opr_base() - ws.opr_top(),
            ws.opr_top() - ws.hep_top(),
        ),
        (
            "Global desc",
            ws.gblarr_size(),
            ws.gbl_top() - ws.gbl_base(),
            ws.arr_top() - ws.gbl_top(),
        ),
        (
            "Array stack",
            ws.gblarr_size(),
            ws.arr_base() - ws.arr_top(),
            ws.arr_top() - ws.gbl_top(),
        ),
    ];

    let mut text = String::new();
    text.push_str("Region            Size        Used        Free\n");
    text.push_str("-----------   ---------   ---------   ---------\n");
    let mut tsize = 0;
    let mut tused = 0;
    for (name, size, used, free) in rows {
        tsize += size;
        tused += used;
        text.push_str(&format!(
            "{name:<12}{:>10}  {:>10}  {:>10}\n",
            size / scale,
            used / scale,
            free / scale
        ));
    }
    text.push_str("              ---------   ---------   ---------\n");
    text.push_str(&format!("Total       {:>10}  {:>10}\n", tsize / scale, tused / scale));
    it.print(&text);
    0
}

fn cmd_off(it: &mut Interpreter, _argv: &[String]) -> i32 {
    it.running = false;
    0
}

fn cmd_origin(it: &mut Interpreter, argv: &[String]) -> i32 {
    match argv.len() {
        1 => {
            let origin = it.origin();
            it.println(&format!("System ORIGIN is {origin}."));
            0
        }
        2 => match argv[1].parse::<usize>() {
            Ok(n @ (0 | 1)) => {
                let old = it.origin();
                it.println(&format!("System ORIGIN was {old}"));
                it.ws.set_origin(n);
                0
            }
            _ => {
                it.println(" Invalid ORIGIN.");
                1
            }
        },
        _ => 1,
    }
}

fn cmd_save(it: &mut Interpreter, argv: &[String]) -> i32 {
    match argv.len() {
        // )save file : binary workspace image.
        2 => match image::save_image(&it.ws, Path::new(&argv[1])) {
            Ok(()) => {
                let id = it.ws.wsid();
                it.println(&format!("Saved {id}"));
                0
            }
            Err(err) => {
                it.println(&format!("Error saving workspace: {err:#}"));
                1
            }
        },
        // )save fun1 fun2 ... file : functions as text.
        n if n >= 3 => save_functions(it, &argv[1..n - 1], Path::new(&argv[n - 1])),
        _ => {
            it.println(")SAVE fun1 fun2 ... file.apl");
            1
        }
    }
}

fn save_functions(it: &mut Interpreter, names: &[String], path: &Path) -> i32 {
    let mut text = String::new();
    for name in names {
        let Some((_, block)) = it.ws.function_of(name.as_bytes()) else {
            it.println(&format!("Undefined function: {name}"));
            return 1;
        };
        let fun = FunObj::read(&it.ws, block);
        let lines = fun.source_lines(&it.ws, block);
        text.push_str(&lines[0]);
        text.push('\n');
        for line in &lines[1..] {
            text.push_str("  ");
            text.push_str(line);
            text.push('\n');
        }
        text.push_str("∇\n\n");
    }

    let result = File::create(path).and_then(|mut f| f.write_all(text.as_bytes()));
    match result {
        Ok(()) => 0,
        Err(err) => {
            it.println(&format!("Error opening {} for writing: {err}", path.display()));
            1
        }
    }
}

fn cmd_vars(it: &mut Interpreter, argv: &[String]) -> i32 {
    let _ = argv;
    let mut listing = String::new();
    for entry in it.ws.name_entries() {
        if entry.is_variable() && entry.is_defined() {
            listing.push_str(&format!("   {}\n", entry.name));
        }
    }
    it.print(&listing);
    0
}

fn cmd_wsid(it: &mut Interpreter, argv: &[String]) -> i32 {
    match argv.len() {
        1 => {
            let id = it.ws.wsid();
            it.println(&id);
            0
        }
        2 => {
            if argv[1].len() > WSID_SIZE - 1 {
                it.println(&format!("Max length of workspace ID is {}.", WSID_SIZE - 1));
                return 1;
            }
            let old = it.ws.wsid();
            it.println(&format!("WAS {old}"));
            it.ws.set_wsid(&argv[1]);
            0
        }
        _ => {
            it.println("Too many arguments: WSID [NAME]");
            1
        }
    }
}

fn cmd_help(it: &mut Interpreter, argv: &[String]) -> i32 {
    if argv.len() == 1 {
        let width = COMMANDS.iter().map(|c| c.name.len()).max().unwrap_or(0) + 4;
        let mut text = String::from("Available system commands:\n\n");
        for cmd in &COMMANDS {
            text.push_str(&format!("{:<width$}{}\n", cmd.name, cmd.help));
        }
        it.print(&text);
        it.print("\n");
        0
    } else {
        match find_command(&argv[1]) {
            Lookup::Found(cmd) => {
                it.println(&format!("{}\t{}", cmd.name, cmd.help));
                0
            }
            Lookup::Ambiguous => {
                it.println(&format!("Ambiguous HELP command: {}", argv[1]));
                1
            }
            Lookup::Unknown => {
                it.println(&format!("Invalid HELP command: {}", argv[1]));
                1
            }
        }
    }
}

/// Source a file: text statements and function definitions, or a binary
/// workspace image (detected by its magic).
pub fn load_file(it: &mut Interpreter, path: &Path) -> crate::error::Result<()> {
    if image::is_image_file(path) {
        match image::load_image(path) {
            Ok(ws) => {
                it.ws = ws;
                let id = it.ws.wsid();
                it.println(&format!("Loaded {id}"));
                return Ok(());
            }
            Err(err) => {
                it.println(&format!("Could not load {}: {err:#}", path.display()));
                return Ok(());
            }
        }
    }

    let file = match File::open(path) {
        Ok(f) => f,
        Err(_) => {
            it.println(&format!("Could not open {}", path.display()));
            return Ok(());
        }
    };
    it.println(&format!("Loading {}", path.display()));

    let mut lines = BufReader::new(file)
        .lines()
        .map_while(|l| l.ok())
        .collect::<Vec<_>>()
        .into_iter();

    it.enter_context()?;
    let saved_print = it.print_expr;
    it.print_expr = false;

    let result = (|| -> crate::error::Result<()> {
        while let Some(line) = lines.next() {
            let trimmed = line.trim_end();
            if trimmed.is_empty() || trimmed.trim_start().starts_with(')') {
                continue;
            }
            if trimmed.trim_start().starts_with('∇') {
                let mut lex = it.repl_lexer();
                let mut next = || lines.next();
                editor::load_fun(it, &mut lex, trimmed.trim_start(), &mut next)?;
                // The definition's scratch buffer is dead once saved.
                it.ws.temp_reset();
                continue;
            }

            let len = it.stage_line(trimmed);
            let mut lex = it.repl_lexer();
            lex.init(len)?;
            lex.start_line(&mut it.ws)?;
            lex.tok_expr(&mut it.ws)?;
            let mut env = Env::from_lexer(&lex, &it.ws);
            eval::eval_expr_list(it, &mut env)?;
            it.ws.reset_stacks();
        }
        Ok(())
    })();

    it.print_expr = saved_print;
    it.leave_context();
    if let Err(err) = &result {
        it.println(&format!("{err}"));
        it.ws.reset_stacks();
    }
    match result {
        Err(err) if err.is_fatal() => Err(err),
        _ => Ok(()),
    }
}
