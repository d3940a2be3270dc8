//! Parent-chain walking over a `ProcessSource`.
//!
//! Pids recycle, so a naive parent walk can match an "ancestor" that is
//! really an unrelated newer process wearing a reused pid. Every backend
//! here exposes process start times, so the walk treats a chain as broken
//! whenever an apparent ancestor started strictly later than the candidate.

use crate::platform::ProcessSource;

// Parent chains are short in practice; the bound only guards against ppid
// cycles observed while the table is mutating under us.
const MAX_CHAIN_DEPTH: usize = 256;

/// True when `ancestor` lies on the parent chain of `candidate`.
///
/// A pid is never its own descendant, pid 1 and the kernel are descendants
/// of nothing, and every live process with pid > 1 descends from pid 1.
pub fn is_descendant_of<S>(source: &S, candidate: u32, ancestor: u32) -> bool
where
    S: ProcessSource + ?Sized,
{
    if candidate <= 1 || candidate == ancestor {
        return false;
    }
    if ancestor == 1 {
        return source.parent_pid(candidate).is_ok();
    }

    let candidate_start = source.start_time(candidate);
    let mut cur = candidate;
    for _ in 0..MAX_CHAIN_DEPTH {
        let parent = match source.parent_pid(cur) {
            Ok(p) => p,
            Err(_) => return false, // chain member vanished
        };
        // Reused pid: the process occupying this slot postdates the
        // candidate, so it cannot be a real ancestor.
        if let (Some(cs), Some(ps)) = (candidate_start, source.start_time(parent)) {
            if ps > cs {
                return false;
            }
        }
        if parent == ancestor {
            return true;
        }
        if parent <= 1 {
            return false;
        }
        cur = parent;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CpucapError, Result};
    use crate::model::{ProcessDescriptor, ProcessFilter};
    use std::collections::HashMap;

    struct FakeSource {
        parents: HashMap<u32, u32>,
        starts: HashMap<u32, u64>,
    }

    impl FakeSource {
        fn new(edges: &[(u32, u32, u64)]) -> Self {
            let mut parents = HashMap::new();
            let mut starts = HashMap::new();
            for &(pid, ppid, start) in edges {
                parents.insert(pid, ppid);
                starts.insert(pid, start);
            }
            Self { parents, starts }
        }
    }

    impl ProcessSource for FakeSource {
        fn snapshot(&self, _filter: &ProcessFilter) -> Result<Vec<ProcessDescriptor>> {
            Ok(Vec::new())
        }

        fn parent_pid(&self, pid: u32) -> Result<u32> {
            self.parents
                .get(&pid)
                .copied()
                .ok_or(CpucapError::ProcessNotFound(pid))
        }

        fn start_time(&self, pid: u32) -> Option<u64> {
            self.starts.get(&pid).copied()
        }
    }

    #[test]
    fn direct_and_transitive_descendants() {
        // 1 -> 100 -> 200 -> 300
        let src = FakeSource::new(&[(100, 1, 10), (200, 100, 20), (300, 200, 30)]);
        assert!(is_descendant_of(&src, 200, 100));
        assert!(is_descendant_of(&src, 300, 100));
        assert!(!is_descendant_of(&src, 100, 200));
        assert!(!is_descendant_of(&src, 200, 300));
    }

    #[test]
    fn never_own_descendant() {
        let src = FakeSource::new(&[(100, 1, 10)]);
        assert!(!is_descendant_of(&src, 100, 100));
    }

    #[test]
    fn pid_one_and_below_are_special() {
        let src = FakeSource::new(&[(100, 1, 10)]);
        assert!(is_descendant_of(&src, 100, 1));
        assert!(!is_descendant_of(&src, 1, 1));
        assert!(!is_descendant_of(&src, 0, 1));
        // dead pid is not a descendant of 1
        assert!(!is_descendant_of(&src, 999, 1));
    }

    #[test]
    fn reused_ancestor_pid_breaks_chain() {
        // Candidate 300 started at t=30, but the process now holding its
        // "parent" pid 200 started at t=50 -- a reused pid, not an ancestor.
        let src = FakeSource::new(&[(100, 1, 10), (200, 100, 50), (300, 200, 30)]);
        assert!(!is_descendant_of(&src, 300, 200));
        assert!(!is_descendant_of(&src, 300, 100));
    }

    #[test]
    fn ppid_cycle_terminates() {
        let src = FakeSource::new(&[(100, 200, 10), (200, 100, 10)]);
        assert!(!is_descendant_of(&src, 100, 300));
    }

    #[test]
    fn unknown_start_times_fall_back_to_plain_walk() {
        let mut src = FakeSource::new(&[(100, 1, 0), (200, 100, 0)]);
        src.starts.clear();
        assert!(is_descendant_of(&src, 200, 100));
    }
}
