extern crate lazy_static;
extern crate nix;

use lazy_static::lazy_static;
use nix::unistd::Pid;
use std::sync::Mutex;

pub const MAXJOBS: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Foreground,
    Background,
    Stopped,
}

impl JobState {
    pub fn label(self) -> &'static str {
        match self {
            JobState::Foreground => "Foreground",
            JobState::Background => "Running",
            JobState::Stopped => "Stopped",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Job {
    pub jid: i32,
    pub pgid: Pid,
    pub state: JobState,
    pub cmdline: String,
}

/// Fixed-capacity job registry. Slot i holds the job with id i + 1; a
/// cleared slot is None, is never returned by lookups, and its id is the
/// smallest one handed out next.
#[derive(Debug)]
pub struct JobTable {
    slots: Vec<Option<Job>>,
}

impl JobTable {
    pub fn new(capacity: usize) -> JobTable {
        JobTable {
            slots: vec![None; capacity],
        }
    }

    pub fn is_full(&self) -> bool {
        self.slots.iter().all(|s| s.is_some())
    }

    pub fn register(&mut self, cmdline: &str, pgid: Pid, state: JobState) -> Result<i32, String> {
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if slot.is_none() {
                let jid = i as i32 + 1;
                *slot = Some(Job {
                    jid,
                    pgid,
                    state,
                    cmdline: cmdline.to_string(),
                });
                log::debug!("added job [{}] ({}) {}", jid, pgid, cmdline);
                return Ok(jid);
            }
        }
        Err("too many jobs".to_string())
    }

    pub fn by_jid(&self, jid: i32) -> Option<&Job> {
        if jid < 1 || jid as usize > self.slots.len() {
            return None;
        }
        self.slots[jid as usize - 1].as_ref()
    }

    pub fn by_pgid(&self, pgid: Pid) -> Option<&Job> {
        self.slots.iter().flatten().find(|j| j.pgid == pgid)
    }

    fn by_pgid_mut(&mut self, pgid: Pid) -> Option<&mut Job> {
        self.slots.iter_mut().flatten().find(|j| j.pgid == pgid)
    }

    pub fn foreground(&self) -> Option<&Job> {
        self.slots
            .iter()
            .flatten()
            .find(|j| j.state == JobState::Foreground)
    }

    /// Idempotent; an out-of-range id is a no-op.
    pub fn clear(&mut self, jid: i32) {
        if jid >= 1 && (jid as usize) <= self.slots.len() {
            self.slots[jid as usize - 1] = None;
        }
    }

    /// Live jobs in id order.
    pub fn iter_live(&self) -> impl Iterator<Item = &Job> {
        self.slots.iter().flatten()
    }
}

lazy_static! {
    static ref JOBS: Mutex<JobTable> = Mutex::new(JobTable::new(MAXJOBS));
}

/// Force the registry into existence; must run before the first relay
/// handler can fire.
pub fn init() {
    with_table(|_| {});
}

/// Run f against the global registry. Main-flow callers must hold a
/// SignalGuard for the duration of the call; the relay handlers are the only
/// callers that may enter unmasked.
pub fn with_table<R>(f: impl FnOnce(&mut JobTable) -> R) -> R {
    let mut table = JOBS.lock().unwrap();
    f(&mut table)
}

pub fn fg_pgid() -> Option<Pid> {
    with_table(|t| t.foreground().map(|j| j.pgid))
}

/// Handler-side: drop the job owning pgid, returning its id for the notice.
pub fn clear_by_pgid(pgid: Pid) -> Option<i32> {
    with_table(|t| {
        let jid = t.by_pgid(pgid).map(|j| j.jid);
        if let Some(jid) = jid {
            t.clear(jid);
        }
        jid
    })
}

/// Handler-side: mark the job owning pgid stopped, returning its id.
pub fn stop_by_pgid(pgid: Pid) -> Option<i32> {
    with_table(|t| {
        t.by_pgid_mut(pgid).map(|j| {
            j.state = JobState::Stopped;
            j.jid
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(n: i32) -> Pid {
        Pid::from_raw(n)
    }

    #[test]
    fn register_assigns_smallest_free_id() {
        let mut t = JobTable::new(4);
        assert_eq!(t.register("a", pid(10), JobState::Background).unwrap(), 1);
        assert_eq!(t.register("b", pid(11), JobState::Background).unwrap(), 2);
        t.clear(1);
        assert_eq!(t.register("c", pid(12), JobState::Background).unwrap(), 1);
        assert_eq!(t.register("d", pid(13), JobState::Background).unwrap(), 3);
    }

    #[test]
    fn register_reports_exhaustion() {
        let mut t = JobTable::new(2);
        t.register("a", pid(1), JobState::Background).unwrap();
        t.register("b", pid(2), JobState::Background).unwrap();
        assert!(t.is_full());
        assert!(t.register("c", pid(3), JobState::Background).is_err());
    }

    #[test]
    fn foreground_lookup_tracks_registration_and_clear() {
        let mut t = JobTable::new(4);
        t.register("bg job", pid(5), JobState::Background).unwrap();
        assert!(t.foreground().is_none());
        let jid = t.register("fg job", pid(6), JobState::Foreground).unwrap();
        assert_eq!(t.foreground().map(|j| j.pgid), Some(pid(6)));
        t.clear(jid);
        assert!(t.foreground().is_none());
    }

    #[test]
    fn clear_is_idempotent() {
        let mut t = JobTable::new(4);
        let jid = t.register("a", pid(7), JobState::Background).unwrap();
        t.clear(jid);
        t.clear(jid);
        t.clear(99);
        assert!(t.by_jid(jid).is_none());
    }

    #[test]
    fn cleared_slot_is_never_returned_by_lookup() {
        let mut t = JobTable::new(4);
        let jid = t.register("a", pid(8), JobState::Background).unwrap();
        t.clear(jid);
        assert!(t.by_pgid(pid(8)).is_none());
        assert!(t.by_jid(jid).is_none());
    }

    #[test]
    fn live_listing_is_ordered_by_id() {
        let mut t = JobTable::new(4);
        t.register("a", pid(1), JobState::Background).unwrap();
        t.register("b", pid(2), JobState::Stopped).unwrap();
        t.register("c", pid(3), JobState::Background).unwrap();
        t.clear(2);
        let ids: Vec<i32> = t.iter_live().map(|j| j.jid).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn state_labels_match_job_listing() {
        assert_eq!(JobState::Background.label(), "Running");
        assert_eq!(JobState::Stopped.label(), "Stopped");
        assert_eq!(JobState::Foreground.label(), "Foreground");
    }
}
