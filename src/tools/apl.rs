//! The `apl` binary: REPL or batch file execution.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;

use apl_rs::interp::{Interpreter, PROMPT};
use apl_rs::syscmd;
use apl_rs::workspace::{DEF_WS_KB, WS_VERSION};

/// An APL interpreter. With no files, start the interactive session.
#[derive(Clone, Debug, Parser)]
#[command(version)]
struct Args {
    /// Workspace size in KiB (64 KiB to 2 GiB)
    #[arg(long, default_value_t = DEF_WS_KB)]
    ws_kb: usize,
    /// APL source files to run, in order, before exiting
    files: Vec<PathBuf>,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<()> {
    let mut it = Interpreter::new(args.ws_kb).context("workspace setup failed")?;
    it.print(&format!(
        "apl-rs Version {}.{}.{}\n",
        WS_VERSION[0], WS_VERSION[1], WS_VERSION[2]
    ));
    it.print("Released under the MIT License\n\n");

    if args.files.is_empty() {
        repl(&mut it)
    } else {
        for file in &args.files {
            syscmd::load_file(&mut it, file)
                .map_err(|err| anyhow::anyhow!("{err}"))
                .with_context(|| format!("loading {}", file.display()))?;
        }
        Ok(())
    }
}

fn repl(it: &mut Interpreter) -> Result<()> {
    while it.running {
        let Some(line) = it.input.read_line(PROMPT) else {
            it.print("\n");
            break;
        };
        if line.is_empty() {
            continue;
        }
        if !it.session_line(&line) {
            anyhow::bail!("fatal interpreter error");
        }
    }
    it.println("Good-bye!");
    Ok(())
}
