extern crate libc;
extern crate nix;

use nix::errno::Errno;
use nix::sys::signal::{self, SigHandler, SigSet, SigmaskHow, Signal};
use nix::unistd::{self, ForkResult, Pid};
use std::env;
use std::ffi::{CStr, CString};
use std::os::unix::io::RawFd;
use std::process;

use crate::common::fatal;

const STDIN_FD: RawFd = libc::STDIN_FILENO;
const STDOUT_FD: RawFd = libc::STDOUT_FILENO;

/// Directories every command can rely on, appended to whatever PATH the
/// environment already carries.
const DEFAULT_PATH: &str = "/bin:/usr/bin";

pub fn append_default_path() {
    let path = match env::var("PATH") {
        Ok(old) if !old.is_empty() => format!("{}:{}", old, DEFAULT_PATH),
        _ => DEFAULT_PATH.to_string(),
    };
    env::set_var("PATH", path);
}

/// Fork the pipeline's process-group leader and return its pid, which is
/// also the group id of every stage. The caller must hold a SignalGuard
/// across this call and the job registration that follows it.
pub fn spawn(stages: &[Vec<String>]) -> nix::Result<Pid> {
    match unsafe { unistd::fork() }? {
        ForkResult::Parent { child, .. } => Ok(child),
        ForkResult::Child => {
            // Shed the inherited mask and terminal-signal dispositions
            // before any stage runs; ignored dispositions survive exec.
            let _ = signal::sigprocmask(SigmaskHow::SIG_SETMASK, Some(&SigSet::empty()), None);
            unsafe {
                let _ = signal::signal(Signal::SIGTTOU, SigHandler::SigDfl);
                let _ = signal::signal(Signal::SIGTTIN, SigHandler::SigDfl);
            }
            if let Err(e) = unistd::setpgid(Pid::from_raw(0), Pid::from_raw(0)) {
                fatal("setpgid", e);
            }
            run_stages(stages)
        }
    }
}

/// Wire and exec every stage, left to right, carrying the upstream read end
/// as loop state. Runs in the group leader and never returns: the leader
/// itself becomes the final stage. Each stage's pipe is created before that
/// stage is forked, and unused ends are closed on both sides so downstream
/// readers see end-of-input when an upstream stage exits.
fn run_stages(stages: &[Vec<String>]) -> ! {
    let mut in_fd = STDIN_FD;
    let last = stages.len() - 1;
    for stage in &stages[..last] {
        let (read_end, write_end) = match unistd::pipe() {
            Ok(ends) => ends,
            Err(e) => fatal("pipe", e),
        };
        match unsafe { unistd::fork() } {
            Ok(ForkResult::Child) => {
                let _ = unistd::close(read_end);
                exec_stage(stage, in_fd, write_end);
            }
            Ok(ForkResult::Parent { .. }) => {
                let _ = unistd::close(write_end);
                if in_fd != STDIN_FD {
                    let _ = unistd::close(in_fd);
                }
                in_fd = read_end;
            }
            Err(e) => fatal("fork", e),
        }
    }
    exec_stage(&stages[last], in_fd, STDOUT_FD)
}

/// Point stdin/stdout at the stage's pipe ends and exec its argv. Failure is
/// isolated to this stage's process; the shell and the other stages keep
/// running.
fn exec_stage(argv: &[String], in_fd: RawFd, out_fd: RawFd) -> ! {
    if in_fd != STDIN_FD {
        if let Err(e) = unistd::dup2(in_fd, STDIN_FD) {
            fatal("dup2", e);
        }
        let _ = unistd::close(in_fd);
    }
    if out_fd != STDOUT_FD {
        if let Err(e) = unistd::dup2(out_fd, STDOUT_FD) {
            fatal("dup2", e);
        }
        let _ = unistd::close(out_fd);
    }

    let array: Vec<CString> = match argv.iter().map(|x| CString::new(x.as_bytes())).collect() {
        Ok(array) => array,
        Err(_) => {
            eprintln!("jsh: argument contains an interior NUL byte");
            process::exit(1);
        }
    };
    let args: Vec<&CStr> = array.iter().map(|x| x.as_c_str()).collect();
    match unistd::execvp(&array[0], &args) {
        Err(e) if e.as_errno() == Some(Errno::ENOENT) => {
            eprintln!("{}: Command not found", argv[0]);
            process::exit(127);
        }
        Err(e) => {
            eprintln!("jsh: execvp: {}", e);
            process::exit(126);
        }
        Ok(_) => unreachable!(),
    }
}
