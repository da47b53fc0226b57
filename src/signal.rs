extern crate libc;
extern crate nix;

use nix::sys::signal::{self, killpg, SaFlags, SigAction, SigHandler, SigSet, SigmaskHow, Signal};
use nix::sys::wait::{self, WaitPidFlag, WaitStatus};
use nix::unistd::{self, Pid};

use crate::common::fatal;
use crate::jobs;

/// Scoped critical section against the relay handlers. Blocks
/// SIGCHLD/SIGINT/SIGTSTP on construction and restores the previous mask on
/// drop; the job table must only be touched from the main flow while one of
/// these is alive.
pub struct SignalGuard {
    prev: SigSet,
}

impl SignalGuard {
    pub fn block() -> SignalGuard {
        let mut set = SigSet::empty();
        set.add(Signal::SIGCHLD);
        set.add(Signal::SIGINT);
        set.add(Signal::SIGTSTP);
        let mut prev = SigSet::empty();
        if let Err(e) = signal::sigprocmask(SigmaskHow::SIG_BLOCK, Some(&set), Some(&mut prev)) {
            fatal("sigprocmask", e);
        }
        SignalGuard { prev }
    }

    /// Atomically swap in the pre-guard mask and sleep until a signal is
    /// delivered; returns with the guard's mask re-established. This is the
    /// only suspension point of the shell, so no delivery can be missed
    /// between unblock and sleep.
    pub fn suspend(&self) {
        let _ = unsafe { libc::sigsuspend(self.prev.as_ref()) };
    }
}

impl Drop for SignalGuard {
    fn drop(&mut self) {
        if let Err(e) = signal::sigprocmask(SigmaskHow::SIG_SETMASK, Some(&self.prev), None) {
            fatal("sigprocmask", e);
        }
    }
}

/// Install the relay. Each handler runs with the other relay signals blocked
/// so handlers never interleave over the job table. SIGTTOU/SIGTTIN are
/// ignored so a background pipeline touching the terminal cannot stop the
/// shell itself.
pub fn install() {
    let mut mask = SigSet::empty();
    mask.add(Signal::SIGCHLD);
    mask.add(Signal::SIGINT);
    mask.add(Signal::SIGTSTP);

    install_handler(Signal::SIGCHLD, handle_sigchld, mask);
    install_handler(Signal::SIGINT, handle_sigint, mask);
    install_handler(Signal::SIGTSTP, handle_sigtstp, mask);
    install_handler(Signal::SIGQUIT, handle_sigquit, mask);

    for sig in &[Signal::SIGTTOU, Signal::SIGTTIN] {
        if let Err(e) = unsafe { signal::signal(*sig, SigHandler::SigIgn) } {
            fatal("signal", e);
        }
    }
}

fn install_handler(sig: Signal, handler: extern "C" fn(libc::c_int), mask: SigSet) {
    let action = SigAction::new(SigHandler::Handler(handler), SaFlags::SA_RESTART, mask);
    if let Err(e) = unsafe { signal::sigaction(sig, &action) } {
        fatal("sigaction", e);
    }
}

/// Reap every child with a pending status without blocking. An exited child
/// clears its slot silently; a killed or stopped one also gets a notice.
extern "C" fn handle_sigchld(_sig: libc::c_int) {
    loop {
        match wait::waitpid(
            Pid::from_raw(-1),
            Some(WaitPidFlag::WNOHANG | WaitPidFlag::WUNTRACED),
        ) {
            Ok(WaitStatus::Exited(pid, _)) => {
                jobs::clear_by_pgid(pid);
            }
            Ok(WaitStatus::Signaled(pid, sig, _)) => {
                if let Some(jid) = jobs::clear_by_pgid(pid) {
                    sio_job_notice(jid, pid, "terminated", sig);
                }
            }
            Ok(WaitStatus::Stopped(pid, sig)) => {
                if let Some(jid) = jobs::stop_by_pgid(pid) {
                    sio_job_notice(jid, pid, "stopped", sig);
                }
            }
            _ => break,
        }
    }
}

extern "C" fn handle_sigint(_sig: libc::c_int) {
    if let Some(pgid) = jobs::fg_pgid() {
        let _ = killpg(pgid, Signal::SIGINT);
    }
}

extern "C" fn handle_sigtstp(_sig: libc::c_int) {
    if let Some(pgid) = jobs::fg_pgid() {
        let _ = killpg(pgid, Signal::SIGTSTP);
    }
}

extern "C" fn handle_sigquit(_sig: libc::c_int) {
    sio_puts("Terminating after receipt of SIGQUIT signal\n");
    unsafe { libc::_exit(1) };
}

// Reentrant-safe output for handler context: raw write(2), stack-buffer
// number formatting, no allocation.

fn sio_puts(s: &str) {
    let _ = unistd::write(libc::STDOUT_FILENO, s.as_bytes());
}

/// Non-negative values only; that is all the notices need.
fn sio_putl(mut v: i64) {
    let mut buf = [0u8; 20];
    let mut i = buf.len();
    loop {
        i -= 1;
        buf[i] = b'0' + (v % 10) as u8;
        v /= 10;
        if v == 0 {
            break;
        }
    }
    let _ = unistd::write(libc::STDOUT_FILENO, &buf[i..]);
}

fn sio_job_notice(jid: i32, pid: Pid, what: &str, sig: Signal) {
    sio_puts("Job [");
    sio_putl(i64::from(jid));
    sio_puts("] (");
    sio_putl(i64::from(pid.as_raw()));
    sio_puts(") ");
    sio_puts(what);
    sio_puts(" by signal ");
    sio_putl(sig as i64);
    sio_puts("\n");
}
