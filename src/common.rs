use std::fmt::Display;
use std::process;

pub type CliResult = Result<String, String>;

pub fn ok<T: ToString>(s: T) -> CliResult {
    Ok(s.to_string())
}

pub fn err<T: ToString>(s: T) -> CliResult {
    Err(s.to_string())
}

/// Report a failed system operation by name and exit. The shell cannot run
/// without fork/sigaction/sigprocmask, so these are not recoverable.
pub fn fatal<E: Display>(op: &str, e: E) -> ! {
    eprintln!("jsh: {}: {}", op, e);
    process::exit(1);
}
