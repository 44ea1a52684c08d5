//! Process-creation syscall descriptors.
//!
//! Grounded on `fork.c`: `fork`, `rfork`, and `vfork`. The original guards
//! `vfork` behind `#ifdef notyet`; this workspace registers it
//! like any other descriptor rather than carry the build-time gate forward.

use crate::argpool::ArgPool;
use crate::registry::{ScArgDesc, ScArgType, ScDesc, ScDescEntry, ScGroup, SYSCALL_MAXARGS};

const RFORK_FLAGS: &[i64] = &[
    libc::CLONE_VM as i64,
    libc::CLONE_FS as i64,
    libc::CLONE_FILES as i64,
    libc::CLONE_SIGHAND as i64,
    libc::CLONE_THREAD as i64,
    libc::CLONE_VFORK as i64,
];

/// Force `CLONE_VM` off and never let the synthesizer ask the kernel to
/// share the parent's address space by accident, mirroring `rfork_fixup`'s
/// `args[0] |= RFPROC; args[0] &= ~RFMEM;` under the Linux `clone(2)` flag
/// set (there is no direct `RFPROC` equivalent to force on; the
/// meaningful part is the `RFMEM` exclusion).
fn rfork_fixup(args: &mut [u64; SYSCALL_MAXARGS], _pool: &mut ArgPool, _rng: &mut dyn rand::RngCore) {
    args[0] &= !(libc::CLONE_VM as u64);
}

/// In the child, exit immediately without unwinding or running atexit
/// handlers; in the parent, reap the child and demand a clean exit.
/// Matches `fork_cleanup`.
fn fork_cleanup(_args: &[u64; SYSCALL_MAXARGS], ret: u64, _pool: &mut ArgPool) {
    let ret = ret as i64;
    if ret == 0 {
        // SAFETY: _exit never returns; no destructors run.
        unsafe { libc::_exit(0) };
    }
    if ret < 0 {
        return; // the fork/rfork/vfork call itself failed; nothing to reap
    }
    match nix::sys::wait::wait() {
        Ok(nix::sys::wait::WaitStatus::Exited(_, 0)) => {}
        Ok(status) => panic!("fuzzer child exited unexpectedly: {status:?}"),
        Err(e) => panic!("wait: {e}"),
    }
}

static FORK_DESC: ScDesc = ScDesc {
    num: libc::SYS_fork,
    name: "fork",
    groups: ScGroup::FORK,
    fixup: None,
    cleanup: Some(fork_cleanup),
    args: &[],
};
inventory::submit! { ScDescEntry(&FORK_DESC) }

static RFORK_ARGS: &[ScArgDesc] = &[ScArgDesc {
    ty: ScArgType::IFlagMask(RFORK_FLAGS),
    name: "flags",
}];

static RFORK_DESC: ScDesc = ScDesc {
    num: libc::SYS_clone,
    name: "rfork",
    groups: ScGroup::FORK,
    fixup: Some(rfork_fixup),
    cleanup: Some(fork_cleanup),
    args: RFORK_ARGS,
};
inventory::submit! { ScDescEntry(&RFORK_DESC) }

static VFORK_DESC: ScDesc = ScDesc {
    num: libc::SYS_vfork,
    name: "vfork",
    groups: ScGroup::FORK,
    fixup: None,
    cleanup: Some(fork_cleanup),
    args: &[],
};
inventory::submit! { ScDescEntry(&VFORK_DESC) }

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn rfork_fixup_clears_clone_vm() {
        let mut args = [0u64; SYSCALL_MAXARGS];
        args[0] = libc::CLONE_VM as u64 | libc::CLONE_FILES as u64;
        let mut rng = StdRng::seed_from_u64(5);
        let config = crate::argpool::ArgPoolConfig {
            hier_depth: 0,
            hier_max_files_per_dir: 1,
            ..crate::argpool::ArgPoolConfig::default()
        };
        let mut pool = ArgPool::init(&config, &mut rng).expect("init");
        rfork_fixup(&mut args, &mut pool, &mut rng);
        assert_eq!(args[0] & libc::CLONE_VM as u64, 0);
        assert_ne!(args[0] & libc::CLONE_FILES as u64, 0);
    }

    #[test]
    fn every_fork_group_descriptor_is_registered() {
        let names = crate::registry::SyscallTable::list_group(ScGroup::FORK);
        for expected in ["fork", "rfork", "vfork"] {
            assert!(names.contains(&expected), "{expected} not registered");
        }
    }
}
