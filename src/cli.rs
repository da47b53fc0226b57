extern crate nix;

use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::collections::HashMap;
use std::env;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process;

use crate::common::*;
use crate::exec;
use crate::jobs::{self, JobState};
use crate::parse::{self, Pipeline};
use crate::signal::SignalGuard;

type Builtin = Box<dyn Fn(&[String]) -> CliResult>;

pub struct Cli {
    emit_prompt: bool,
    prompt: String,
    builtins: HashMap<String, Builtin>,
}

impl Cli {
    pub fn new(emit_prompt: bool) -> Cli {
        let mut cli = Cli {
            emit_prompt,
            prompt: "jsh> ".to_owned(),
            builtins: HashMap::new(),
        };
        // register builtins
        cli.builtin("quit", |_| process::exit(0));
        cli.builtin("exit", |_| process::exit(0));
        cli.builtin("jobs", |_| list_jobs());
        cli.builtin("cd", change_dir);
        cli.builtin("kill", kill_job);
        cli
    }

    fn builtin<F>(&mut self, name: &str, f: F)
    where
        F: Fn(&[String]) -> CliResult + 'static,
    {
        self.builtins.insert(name.to_owned(), Box::new(f));
    }

    pub fn go(&mut self) {
        let mut buf = String::new();
        loop {
            if self.emit_prompt {
                print!("{}", self.prompt);
                io::stdout().flush().unwrap();
            }
            buf.clear();
            match io::stdin().read_line(&mut buf) {
                Ok(0) => break, // EOF
                Ok(_) => {}
                Err(e) => fatal("read", e),
            }
            match self.dispatch(&buf) {
                Ok(out) => print!("{}", out),
                Err(msg) => eprint!("{}", msg),
            }
            io::stdout().flush().unwrap();
        }
    }

    /// One line: parse, short-circuit built-ins, otherwise hand the pipeline
    /// to the executor. Built-ins never fork.
    fn dispatch(&mut self, line: &str) -> CliResult {
        let pipeline = match parse::parse_line(line) {
            Ok(Some(p)) => p,
            Ok(None) => return ok(""),
            Err(e) => return err(format!("jsh: {}\n", e)),
        };
        if pipeline.stages.len() == 1 {
            let argv = &pipeline.stages[0];
            if let Some(f) = self.builtins.get(argv[0].as_str()) {
                log::debug!("builtin: {}", argv[0]);
                return f(&argv[1..]);
            }
        }
        run_pipeline(line, pipeline)
    }
}

/// Launch a pipeline and either wait for it (foreground) or report it
/// (background). The relay signals stay blocked from before the fork until
/// after registration, so a fast exit can never be reaped before the table
/// knows the job.
fn run_pipeline(cmdline: &str, pipeline: Pipeline) -> CliResult {
    let cmdline = cmdline.trim_end();
    let guard = SignalGuard::block();
    if jobs::with_table(|t| t.is_full()) {
        return err("jsh: too many jobs\n");
    }
    let pgid = match exec::spawn(&pipeline.stages) {
        Ok(pid) => pid,
        Err(e) => fatal("fork", e),
    };
    let state = if pipeline.background {
        JobState::Background
    } else {
        JobState::Foreground
    };
    let jid = match jobs::with_table(|t| t.register(cmdline, pgid, state)) {
        Ok(jid) => jid,
        Err(msg) => return err(format!("jsh: {}\n", msg)),
    };
    log::debug!("pipeline pgid {} registered as job [{}]", pgid, jid);

    if pipeline.background {
        println!("[{}] {} {}", jid, pgid, cmdline);
    } else {
        // Woken only by signal delivery; the relay clears or stops the slot.
        while jobs::with_table(|t| t.foreground().map(|j| j.pgid)) == Some(pgid) {
            guard.suspend();
        }
    }
    drop(guard);
    ok("")
}

fn list_jobs() -> CliResult {
    let _guard = SignalGuard::block();
    jobs::with_table(|t| {
        for job in t.iter_live() {
            println!(
                "[{}] ({}) {} {}",
                job.jid,
                job.pgid,
                job.state.label(),
                job.cmdline
            );
        }
    });
    ok("")
}

fn change_dir(args: &[String]) -> CliResult {
    if args.len() > 1 {
        return err("cd: too many arguments\n");
    }
    let target = match args.first() {
        None => home_dir()?,
        Some(s) if s.as_str() == "~" => home_dir()?,
        Some(s) => PathBuf::from(s),
    };
    if let Err(e) = env::set_current_dir(&target) {
        return err(format!("cd: {}: {}\n", target.display(), e));
    }
    ok("")
}

fn home_dir() -> Result<PathBuf, String> {
    dirs::home_dir().ok_or_else(|| "cd: cannot locate home directory\n".to_string())
}

/// `kill %jid` or `kill pid`: send SIGINT to the job's (or raw pid's) whole
/// process group. Bad arguments signal nothing.
fn kill_job(args: &[String]) -> CliResult {
    let arg = match args.first() {
        Some(arg) => arg,
        None => return err("kill: usage: kill %jobid | pid\n"),
    };
    let pgid = if let Some(id) = arg.strip_prefix('%') {
        let jid: i32 = match id.parse() {
            Ok(n) if n > 0 => n,
            _ => return err("kill: job id must be a positive integer\n"),
        };
        let _guard = SignalGuard::block();
        match jobs::with_table(|t| t.by_jid(jid).map(|j| j.pgid)) {
            Some(pgid) => pgid,
            None => return err(format!("kill: %{}: no such job\n", jid)),
        }
    } else {
        match arg.parse::<i32>() {
            Ok(n) if n > 0 => Pid::from_raw(n),
            _ => return err("kill: pid must be a positive integer\n"),
        }
    };
    if let Err(e) = killpg(pgid, Signal::SIGINT) {
        return err(format!("kill: ({}): {}\n", pgid, e));
    }
    ok("")
}
