//! Syscall descriptor registry: the link-time set of every syscall this
//! fuzzer knows how to call, plus name/group lookup and filtering.
//!
//! Grounded on `syscall.h`/`syscall.c`: `SET_DECLARE(syscalls, struct
//! scdesc)` and `DATA_SET(syscalls, desc)` become `inventory::collect!`/
//! `inventory::submit!`; `sc_lookup`/`scgroup_lookup` are ported directly.

use sysfuzz_shared::{SysfuzzError, SysfuzzResult};

use crate::argpool::ArgPool;

pub const SYSCALL_MAXARGS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScGroup(u32);

impl ScGroup {
    pub const NONE: ScGroup = ScGroup(0);
    pub const VM: ScGroup = ScGroup(1 << 0);
    pub const SCHED: ScGroup = ScGroup(1 << 1);
    pub const FORK: ScGroup = ScGroup(1 << 2);

    pub const fn union(self, other: ScGroup) -> ScGroup {
        ScGroup(self.0 | other.0)
    }

    pub const fn intersects(self, other: ScGroup) -> bool {
        self.0 & other.0 != 0
    }

    fn by_name(name: &str) -> Option<ScGroup> {
        match name.to_ascii_lowercase().as_str() {
            "vm" => Some(ScGroup::VM),
            "sched" => Some(ScGroup::SCHED),
            "fork" => Some(ScGroup::FORK),
            _ => None,
        }
    }
}

/// The tagged-union argument descriptor (`scargdesc`). Rust models the C
/// union as a closed enum with per-variant payloads instead of a raw union
/// plus a separate `sa_argcnt`; a slice already knows its own length.
#[derive(Debug, Clone, Copy)]
pub enum ScArgType {
    Unspec,
    Fd,
    Path,
    Socket,
    MemAddr,
    MemLen,
    Mode,
    Pid,
    ProcDesc,
    IFlagMask(&'static [i64]),
    LFlagMask(&'static [i64]),
    Cmd(&'static [i64]),
    Uid,
    Gid,
    KQueue,
    SchedParam,
    TimeSpec,
}

#[derive(Debug, Clone, Copy)]
pub struct ScArgDesc {
    pub ty: ScArgType,
    pub name: &'static str,
}

/// Pre-call fixup hook. Takes explicit pool/RNG context rather than
/// reaching into a global singleton, since a worker's pool is owned by
/// that worker's process after `fork`, which also makes unit testing
/// `rman`/`ap` straightforward without a global singleton.
pub type FixupFn = fn(&mut [u64; SYSCALL_MAXARGS], &mut ArgPool, &mut dyn rand::RngCore);
/// Post-call cleanup hook. Receives the raw return value exactly as the
/// kernel gave it back; a cleanup never interprets it as an error.
pub type CleanupFn = fn(&[u64; SYSCALL_MAXARGS], u64, &mut ArgPool);

#[derive(Debug, Clone, Copy)]
pub struct ScDesc {
    pub num: i64,
    pub name: &'static str,
    pub groups: ScGroup,
    pub fixup: Option<FixupFn>,
    pub cleanup: Option<CleanupFn>,
    pub args: &'static [ScArgDesc],
}

impl ScDesc {
    pub fn nargs(&self) -> usize {
        self.args.len()
    }
}

/// The linker-set entry. Every descriptor module calls
/// `inventory::submit! { ScDescEntry(&FOO_DESC) }` once per descriptor.
pub struct ScDescEntry(pub &'static ScDesc);

inventory::collect!(ScDescEntry);

/// Look up a syscall descriptor by name (`sc_lookup`).
pub fn lookup(name: &str) -> Option<&'static ScDesc> {
    inventory::iter::<ScDescEntry>()
        .find(|entry| entry.0.name.eq_ignore_ascii_case(name))
        .map(|entry| entry.0)
}

/// Look up (and OR into an accumulator) a syscall group by name
/// (`scgroup_lookup`).
pub fn group_lookup(name: &str) -> Option<ScGroup> {
    ScGroup::by_name(name)
}

/// The filtered table of descriptors a fuzzing run actually exercises
/// (`sctable`/`sctable_alloc`).
pub struct SyscallTable {
    descs: Vec<&'static ScDesc>,
}

impl SyscallTable {
    /// Build the table by validating the comma-separated syscall and group
    /// filter lists, then keeping every descriptor that passes
    /// `sc_filter`. An empty filter list (both `sclist` and `scgrplist`
    /// are `None`/empty) keeps every registered descriptor.
    pub fn build(sclist: Option<&str>, scgrplist: Option<&str>) -> SysfuzzResult<Self> {
        let sc_names: Vec<&str> = sclist
            .map(|s| s.split(',').filter(|s| !s.is_empty()).collect())
            .unwrap_or_default();
        for name in &sc_names {
            if lookup(name).is_none() {
                return Err(SysfuzzError::UnknownSyscall(name.to_string()));
            }
        }

        let scgrp_names: Vec<&str> = scgrplist
            .map(|s| s.split(',').filter(|s| !s.is_empty()).collect())
            .unwrap_or_default();
        let mut groups = ScGroup::NONE;
        for name in &scgrp_names {
            match group_lookup(name) {
                Some(g) => groups = groups.union(g),
                None => return Err(SysfuzzError::UnknownGroup(name.to_string())),
            }
        }

        let descs: Vec<&'static ScDesc> = inventory::iter::<ScDescEntry>()
            .map(|entry| entry.0)
            .filter(|desc| sc_filter(desc, &sc_names, groups))
            .collect();

        if descs.is_empty() {
            return Err(SysfuzzError::Config(
                "no syscalls matched the given filters".to_string(),
            ));
        }

        Ok(SyscallTable { descs })
    }

    pub fn len(&self) -> usize {
        self.descs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descs.is_empty()
    }

    pub fn pick(&self, rng: &mut impl rand::Rng) -> &'static ScDesc {
        self.descs[rng.random_range(0..self.descs.len())]
    }

    /// List every descriptor in a single group, for the `-l` flag
    /// (`scgrp_list`).
    pub fn list_group(group: ScGroup) -> Vec<&'static str> {
        inventory::iter::<ScDescEntry>()
            .map(|entry| entry.0)
            .filter(|desc| desc.groups.intersects(group))
            .map(|desc| desc.name)
            .collect()
    }
}

/// A descriptor passes the filter if the name list is empty and the group
/// list is empty (no filtering at all), or it's named explicitly, or it
/// belongs to one of the requested groups.
fn sc_filter(desc: &ScDesc, sc_names: &[&str], groups: ScGroup) -> bool {
    if sc_names.is_empty() && groups == ScGroup::NONE {
        return true;
    }
    if sc_names.iter().any(|n| desc.name.eq_ignore_ascii_case(n)) {
        return true;
    }
    desc.groups.intersects(groups)
}

#[cfg(test)]
mod tests {
    use super::*;

    static NOOP_DESC: ScDesc = ScDesc {
        num: 999_001,
        name: "sysfuzz_test_noop",
        groups: ScGroup::NONE,
        fixup: None,
        cleanup: None,
        args: &[],
    };
    inventory::submit! { ScDescEntry(&NOOP_DESC) }

    #[test]
    fn lookup_is_case_insensitive() {
        assert!(lookup("SYSFUZZ_TEST_NOOP").is_some());
        assert!(lookup("not-a-real-syscall-name").is_none());
    }

    #[test]
    fn group_lookup_recognizes_known_names() {
        assert_eq!(group_lookup("VM"), Some(ScGroup::VM));
        assert!(group_lookup("nonexistent-group").is_none());
    }

    #[test]
    fn build_rejects_unknown_filter_names() {
        assert!(SyscallTable::build(Some("not-a-real-syscall"), None).is_err());
        assert!(SyscallTable::build(None, Some("not-a-real-group")).is_err());
    }

    #[test]
    fn build_with_no_filters_keeps_everything_registered() {
        let table = SyscallTable::build(None, None).expect("build");
        assert!(table.len() >= 1);
    }
}
