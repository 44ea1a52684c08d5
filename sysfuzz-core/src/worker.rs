//! Fuzz loop and worker pool: forks `num-fuzzers` workers, seeds each
//! distinctly, and runs the pick-synthesize-fixup-call-cleanup cycle.
//!
//! Grounded on `sysfuzz.c`'s `main`/`scloop`/`pickseed`/`drop_privs`. The
//! parent never enters the loop itself; it only reaps children.

use rand::SeedableRng;
use rand::rngs::StdRng;

use sysfuzz_shared::{SysfuzzError, SysfuzzResult};

use crate::argpool::{ArgPool, ArgPoolConfig};
use crate::registry::{SYSCALL_MAXARGS, SyscallTable};
use crate::synth;

/// Configuration for one fuzzing run, independent of CLI parsing so it can
/// be constructed directly in tests.
pub struct WorkerPoolConfig {
    pub num_fuzzers: u64,
    /// Calls per worker; `0` means run forever.
    pub call_count: u64,
    pub base_seed: u64,
    pub pool_config: ArgPoolConfig,
}

/// Abstraction over "invoke the kernel" so the loop can be driven against a
/// stub in tests without making a real raw syscall.
pub trait SyscallInvoker {
    /// Invoke the syscall numbered `num` with up to
    /// [`SYSCALL_MAXARGS`](crate::registry::SYSCALL_MAXARGS) arguments and
    /// return its raw result, reinterpreted as an unsigned machine word
    /// exactly as the kernel handed it back.
    fn invoke(&mut self, num: i64, args: &[u64; SYSCALL_MAXARGS]) -> u64;
}

/// The real invoker: calls the kernel directly through libc's indirect
/// `syscall(2)`, bypassing any argument-validating wrapper. This is the
/// whole point of the fuzzer; never substitute a
/// higher-level wrapper here.
pub struct RawSyscallInvoker;

impl SyscallInvoker for RawSyscallInvoker {
    fn invoke(&mut self, num: i64, args: &[u64; SYSCALL_MAXARGS]) -> u64 {
        // SAFETY: none. Arguments are randomly synthesized and may be
        // invalid in any way the kernel can observe; that is the fuzzer's
        // entire purpose. The kernel, not this process, must not crash.
        let ret = unsafe {
            libc::syscall(
                num,
                args[0], args[1], args[2], args[3], args[4], args[5], args[6], args[7],
            )
        };
        ret as u64
    }
}

/// Run one worker's pick-synthesize-fixup-call-cleanup cycle for
/// `call_count` iterations (`0` = forever), matching `scloop`.
pub fn run_loop(
    table: &SyscallTable,
    pool: &mut ArgPool,
    rng: &mut impl rand::Rng,
    call_count: u64,
    invoker: &mut impl SyscallInvoker,
) {
    let mut remaining = call_count;
    loop {
        if call_count != 0 {
            if remaining == 0 {
                break;
            }
            remaining -= 1;
        }

        let desc = table.pick(rng);
        let mut args = synth::synthesize(desc, pool, rng);
        if let Some(fixup) = desc.fixup {
            fixup(&mut args, pool, rng);
        }
        let ret = invoker.invoke(desc.num, &args);
        if let Some(cleanup) = desc.cleanup {
            cleanup(&args, ret, pool);
        }
    }
}

/// Returns whether the running process is root, matching `drop_privs`'s
/// gate on whether privilege-dropping is needed at all.
pub fn is_root() -> bool {
    // SAFETY: getuid takes no arguments and cannot fail.
    unsafe { libc::getuid() == 0 }
}

/// Drop from root to the `nobody` account, unless `keep_privileges` is set
/// (`-p`). Matches `drop_privs`'s `setgid`/`initgroups`/`setuid` sequence,
/// performed in that order so the process never holds only one of the two
/// privileges it's trying to shed.
pub fn drop_privileges(keep_privileges: bool) -> SysfuzzResult<()> {
    if keep_privileges || !is_root() {
        return Ok(());
    }
    tracing::info!("dropping root privileges to nobody");
    let nobody =
        nix::unistd::User::from_name("nobody").map_err(|e| SysfuzzError::Config(format!("getpwnam(nobody): {e}")))?;
    let Some(nobody) = nobody else {
        return Err(SysfuzzError::Config("no \"nobody\" account on this host".to_string()));
    };
    nix::unistd::setgid(nobody.gid).map_err(|e| SysfuzzError::Config(format!("setgid: {e}")))?;
    nix::unistd::initgroups(
        &std::ffi::CString::new(nobody.name.as_str()).unwrap(),
        nobody.gid,
    )
    .map_err(|e| SysfuzzError::Config(format!("initgroups: {e}")))?;
    nix::unistd::setuid(nobody.uid).map_err(|e| SysfuzzError::Config(format!("setuid: {e}")))?;
    Ok(())
}

/// Fork `config.num_fuzzers` workers, each seeded with
/// `config.base_seed + index` (index starting at 1, matching
/// distinct, non-zero-offset streams), run
/// `run_loop` in each child, and wait for all children in the parent.
///
/// Returns the exit status each child actually produced, in spawn order,
/// so a caller can surface a non-clean worker exit.
pub fn spawn_workers(config: &WorkerPoolConfig, table: &SyscallTable) -> SysfuzzResult<Vec<i32>> {
    let mut pids = Vec::with_capacity(config.num_fuzzers as usize);

    for index in 1..=config.num_fuzzers {
        // SAFETY: fork() duplicates the calling process; the child branch
        // below never returns out of this function except via _exit/process::exit.
        match unsafe { nix::unistd::fork() } {
            Ok(nix::unistd::ForkResult::Child) => {
                let seed = config.base_seed.wrapping_add(index);
                // The one guaranteed line of stdout per worker; tracing
                // carries everything else.
                println!("seeding with {seed}");
                tracing::info!(worker = index, seed, "worker started");
                let mut rng = StdRng::seed_from_u64(seed);
                let mut pool = match ArgPool::init(&config.pool_config, &mut rng) {
                    Ok(pool) => pool,
                    Err(e) => {
                        eprintln!("Error: {e}");
                        std::process::exit(1);
                    }
                };
                run_loop(table, &mut pool, &mut rng, config.call_count, &mut RawSyscallInvoker);
                std::process::exit(0);
            }
            Ok(nix::unistd::ForkResult::Parent { child }) => {
                tracing::debug!(worker = index, pid = child.as_raw(), "worker forked");
                pids.push(child);
            }
            Err(e) => {
                return Err(SysfuzzError::Config(format!("fork: {e}")));
            }
        }
    }

    let mut statuses = Vec::with_capacity(pids.len());
    for pid in pids {
        match nix::sys::wait::waitpid(pid, None) {
            Ok(nix::sys::wait::WaitStatus::Exited(_, code)) => statuses.push(code),
            Ok(other) => {
                return Err(SysfuzzError::Child(format!("worker {pid} exited abnormally: {other:?}")));
            }
            Err(e) => return Err(SysfuzzError::Child(format!("waitpid({pid}): {e}"))),
        }
    }
    Ok(statuses)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ScArgDesc, ScArgType, ScDesc, ScDescEntry, ScGroup};
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::sync::atomic::{AtomicU64, Ordering};

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    struct CountingInvoker;
    impl SyscallInvoker for CountingInvoker {
        fn invoke(&mut self, _num: i64, _args: &[u64; SYSCALL_MAXARGS]) -> u64 {
            COUNTER.fetch_add(1, Ordering::SeqCst);
            0
        }
    }

    static STUB_ARGS: &[ScArgDesc] = &[ScArgDesc {
        ty: ScArgType::Unspec,
        name: "x",
    }];
    static STUB_DESC: ScDesc = ScDesc {
        num: 999_002,
        name: "sysfuzz_test_worker_stub",
        groups: ScGroup::NONE,
        fixup: None,
        cleanup: None,
        args: STUB_ARGS,
    };
    inventory::submit! { ScDescEntry(&STUB_DESC) }

    fn test_pool_config() -> ArgPoolConfig {
        ArgPoolConfig {
            hier_depth: 0,
            hier_max_fsize: 16,
            hier_max_files_per_dir: 1,
            hier_max_subdirs_per_dir: 0,
            hier_root: None,
            memblk_page_count: 8,
            memblk_max_size: 4,
        }
    }

    #[test]
    fn run_loop_respects_bounded_call_count() {
        COUNTER.store(0, Ordering::SeqCst);
        let table = SyscallTable::build(Some("sysfuzz_test_worker_stub"), None).expect("build");
        let mut rng = StdRng::seed_from_u64(41);
        let mut pool = ArgPool::init(&test_pool_config(), &mut rng).expect("init");
        run_loop(&table, &mut pool, &mut rng, 7, &mut CountingInvoker);
        assert_eq!(COUNTER.load(Ordering::SeqCst), 7);
    }

    #[test]
    fn descriptor_sequence_is_reproducible_for_the_same_seed() {
        let table = SyscallTable::build(None, Some("vm")).expect("build");
        let mut rng_a = StdRng::seed_from_u64(123);
        let mut rng_b = StdRng::seed_from_u64(123);
        let picks_a: Vec<&str> = (0..20).map(|_| table.pick(&mut rng_a).name).collect();
        let picks_b: Vec<&str> = (0..20).map(|_| table.pick(&mut rng_b).name).collect();
        assert_eq!(picks_a, picks_b);
    }

    #[test]
    fn drop_privileges_is_a_noop_when_keeping_privileges() {
        assert!(drop_privileges(true).is_ok());
    }
}
