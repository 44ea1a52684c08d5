//! Virtual-memory syscall descriptors.
//!
//! Grounded on `vm.c`: `mmap`, `madvise`, `mincore`, `minherit`, `mlock`,
//! `mprotect`, `msync`, `munlock`, `munmap`, `mlockall`, `munlockall`.
//! Flag/command tables use `libc`'s Linux constants in place of BSD
//! ones; `minherit` has no Linux syscall and is omitted.

use crate::argpool::{ArgPool, MemBlk};
use crate::registry::{ScArgDesc, ScArgType, ScDesc, ScDescEntry, ScGroup, SYSCALL_MAXARGS};

const MMAP_PROT_FLAGS: &[i64] = &[
    libc::PROT_NONE as i64,
    libc::PROT_READ as i64,
    libc::PROT_WRITE as i64,
    libc::PROT_EXEC as i64,
];

const MMAP_FLAGS: &[i64] = &[
    libc::MAP_SHARED as i64,
    libc::MAP_PRIVATE as i64,
    libc::MAP_FIXED as i64,
    libc::MAP_ANONYMOUS as i64,
    libc::MAP_NORESERVE as i64,
    libc::MAP_POPULATE as i64,
    libc::MAP_STACK as i64,
    libc::MAP_LOCKED as i64,
];

/// Overwrite the address/length args with a reclaimed memblk and force an
/// anonymous, unbacked mapping, matching `mmap_fixup`. If the pool has
/// nothing to reclaim the args are left as the synthesizer generated them,
/// which is allowed to produce wild address/length values by design.
fn mmap_fixup(args: &mut [u64; SYSCALL_MAXARGS], pool: &mut ArgPool, rng: &mut dyn rand::RngCore) {
    if let Some(blk) = pool.memblk_reclaim(rng) {
        args[0] = blk.addr;
        args[1] = blk.len;
        args[3] &= !(libc::MAP_STACK as u64 | libc::MAP_LOCKED as u64);
        args[3] |= libc::MAP_ANONYMOUS as u64;
        args[4] = u64::MAX; // fd = -1
        args[5] = 0; // offset
    }
}

/// Matches `mmap_cleanup`: if the kernel didn't honor the fixup's requested
/// address, the reclaimed region is gone for good and the kernel's actual
/// (unrequested) mapping is unmapped right back out instead of leaking it;
/// otherwise the process now owns the returned region, so it is added to the
/// memblk pool.
fn mmap_cleanup(args: &[u64; SYSCALL_MAXARGS], ret: u64, pool: &mut ArgPool) {
    if ret == u64::MAX {
        return; // mmap failed (MAP_FAILED), nothing to reconcile
    }
    if args[4] == u64::MAX && ret != args[0] {
        // SAFETY: ret/args[1] are exactly the region `mmap` itself just handed back.
        let _ = unsafe { libc::munmap(ret as *mut libc::c_void, args[1] as usize) };
        return;
    }
    pool.memblk_return(MemBlk { addr: ret, len: args[1] });
}

static MMAP_ARGS: &[ScArgDesc] = &[
    ScArgDesc {
        ty: ScArgType::MemAddr,
        name: "addr",
    },
    ScArgDesc {
        ty: ScArgType::MemLen,
        name: "len",
    },
    ScArgDesc {
        ty: ScArgType::IFlagMask(MMAP_PROT_FLAGS),
        name: "prot",
    },
    ScArgDesc {
        ty: ScArgType::IFlagMask(MMAP_FLAGS),
        name: "flags",
    },
    ScArgDesc {
        ty: ScArgType::Fd,
        name: "fd",
    },
    ScArgDesc {
        ty: ScArgType::Unspec,
        name: "offset",
    },
];

static MMAP_DESC: ScDesc = ScDesc {
    num: libc::SYS_mmap,
    name: "mmap",
    groups: ScGroup::VM,
    fixup: Some(mmap_fixup),
    cleanup: Some(mmap_cleanup),
    args: MMAP_ARGS,
};
inventory::submit! { ScDescEntry(&MMAP_DESC) }

const MADVISE_CMDS: &[i64] = &[
    libc::MADV_NORMAL as i64,
    libc::MADV_RANDOM as i64,
    libc::MADV_SEQUENTIAL as i64,
    libc::MADV_WILLNEED as i64,
    libc::MADV_DONTNEED as i64,
    libc::MADV_FREE as i64,
    libc::MADV_REMOVE as i64,
    libc::MADV_DONTFORK as i64,
    libc::MADV_DOFORK as i64,
    libc::MADV_MERGEABLE as i64,
    libc::MADV_UNMERGEABLE as i64,
    libc::MADV_HUGEPAGE as i64,
    libc::MADV_NOHUGEPAGE as i64,
];

static MADVISE_ARGS: &[ScArgDesc] = &[
    ScArgDesc {
        ty: ScArgType::MemAddr,
        name: "addr",
    },
    ScArgDesc {
        ty: ScArgType::MemLen,
        name: "len",
    },
    ScArgDesc {
        ty: ScArgType::Cmd(MADVISE_CMDS),
        name: "behav",
    },
];

static MADVISE_DESC: ScDesc = ScDesc {
    num: libc::SYS_madvise,
    name: "madvise",
    groups: ScGroup::VM,
    fixup: None,
    cleanup: None,
    args: MADVISE_ARGS,
};
inventory::submit! { ScDescEntry(&MADVISE_DESC) }

/// Allocate the `vec` output buffer `mincore` writes residency bytes into,
/// one byte per page, and stash the raw pointer in `args[2]` (`mincore_fixup`).
fn mincore_fixup(args: &mut [u64; SYSCALL_MAXARGS], _pool: &mut ArgPool, _rng: &mut dyn rand::RngCore) {
    let page_size = crate::util::page_size();
    let npages = (args[1] / page_size) + 1;
    let buf: Box<[u8]> = vec![0u8; npages as usize].into_boxed_slice();
    let ptr = Box::into_raw(buf) as *mut u8;
    args[2] = ptr as u64;
}

/// Free the buffer `mincore_fixup` allocated (`mincore_cleanup`).
fn mincore_cleanup(args: &[u64; SYSCALL_MAXARGS], _ret: u64, _pool: &mut ArgPool) {
    if args[2] == 0 {
        return;
    }
    let page_size = crate::util::page_size();
    let npages = (args[1] / page_size) + 1;
    // SAFETY: this pointer/length pair is exactly what mincore_fixup allocated.
    unsafe {
        drop(Box::from_raw(std::slice::from_raw_parts_mut(
            args[2] as *mut u8,
            npages as usize,
        )));
    }
}

static MINCORE_ARGS: &[ScArgDesc] = &[
    ScArgDesc {
        ty: ScArgType::MemAddr,
        name: "addr",
    },
    ScArgDesc {
        ty: ScArgType::MemLen,
        name: "len",
    },
    ScArgDesc {
        ty: ScArgType::Unspec,
        name: "vec",
    },
];

static MINCORE_DESC: ScDesc = ScDesc {
    num: libc::SYS_mincore,
    name: "mincore",
    groups: ScGroup::VM,
    fixup: Some(mincore_fixup),
    cleanup: Some(mincore_cleanup),
    args: MINCORE_ARGS,
};
inventory::submit! { ScDescEntry(&MINCORE_DESC) }

static MLOCK_ARGS: &[ScArgDesc] = &[
    ScArgDesc {
        ty: ScArgType::MemAddr,
        name: "addr",
    },
    ScArgDesc {
        ty: ScArgType::MemLen,
        name: "len",
    },
];

static MLOCK_DESC: ScDesc = ScDesc {
    num: libc::SYS_mlock,
    name: "mlock",
    groups: ScGroup::VM,
    fixup: None,
    cleanup: None,
    args: MLOCK_ARGS,
};
inventory::submit! { ScDescEntry(&MLOCK_DESC) }

static MPROTECT_ARGS: &[ScArgDesc] = &[
    ScArgDesc {
        ty: ScArgType::MemAddr,
        name: "addr",
    },
    ScArgDesc {
        ty: ScArgType::MemLen,
        name: "len",
    },
    ScArgDesc {
        ty: ScArgType::IFlagMask(MMAP_PROT_FLAGS),
        name: "prot",
    },
];

static MPROTECT_DESC: ScDesc = ScDesc {
    num: libc::SYS_mprotect,
    name: "mprotect",
    groups: ScGroup::VM,
    fixup: None,
    cleanup: None,
    args: MPROTECT_ARGS,
};
inventory::submit! { ScDescEntry(&MPROTECT_DESC) }

const MSYNC_CMDS: &[i64] = &[
    libc::MS_ASYNC as i64,
    libc::MS_SYNC as i64,
    libc::MS_INVALIDATE as i64,
];

static MSYNC_ARGS: &[ScArgDesc] = &[
    ScArgDesc {
        ty: ScArgType::MemAddr,
        name: "addr",
    },
    ScArgDesc {
        ty: ScArgType::MemLen,
        name: "len",
    },
    ScArgDesc {
        ty: ScArgType::Cmd(MSYNC_CMDS),
        name: "flags",
    },
];

static MSYNC_DESC: ScDesc = ScDesc {
    num: libc::SYS_msync,
    name: "msync",
    groups: ScGroup::VM,
    fixup: None,
    cleanup: None,
    args: MSYNC_ARGS,
};
inventory::submit! { ScDescEntry(&MSYNC_DESC) }

static MUNLOCK_ARGS: &[ScArgDesc] = &[
    ScArgDesc {
        ty: ScArgType::MemAddr,
        name: "addr",
    },
    ScArgDesc {
        ty: ScArgType::MemLen,
        name: "len",
    },
];

static MUNLOCK_DESC: ScDesc = ScDesc {
    num: libc::SYS_munlock,
    name: "munlock",
    groups: ScGroup::VM,
    fixup: None,
    cleanup: None,
    args: MUNLOCK_ARGS,
};
inventory::submit! { ScDescEntry(&MUNLOCK_DESC) }

/// Release the region from the live pool, unless the call itself failed
/// (`munmap_cleanup`: nonzero return means nothing changed). The release can
/// itself fail if the synthesizer picked an address/length pair that wasn't
/// exactly one live memblk; there is nothing further to reconcile in that
/// case since the pool's view was already out of step with this call.
fn munmap_cleanup(args: &[u64; SYSCALL_MAXARGS], ret: u64, pool: &mut ArgPool) {
    if ret != 0 {
        return;
    }
    let _ = pool.memblk_unmap(MemBlk {
        addr: args[0],
        len: args[1],
    });
}

static MUNMAP_ARGS: &[ScArgDesc] = &[
    ScArgDesc {
        ty: ScArgType::MemAddr,
        name: "addr",
    },
    ScArgDesc {
        ty: ScArgType::MemLen,
        name: "len",
    },
];

static MUNMAP_DESC: ScDesc = ScDesc {
    num: libc::SYS_munmap,
    name: "munmap",
    groups: ScGroup::VM,
    fixup: None,
    cleanup: Some(munmap_cleanup),
    args: MUNMAP_ARGS,
};
inventory::submit! { ScDescEntry(&MUNMAP_DESC) }

const MLOCKALL_FLAGS: &[i64] = &[libc::MCL_CURRENT as i64, libc::MCL_FUTURE as i64];

static MLOCKALL_ARGS: &[ScArgDesc] = &[ScArgDesc {
    ty: ScArgType::IFlagMask(MLOCKALL_FLAGS),
    name: "flags",
}];

static MLOCKALL_DESC: ScDesc = ScDesc {
    num: libc::SYS_mlockall,
    name: "mlockall",
    groups: ScGroup::VM,
    fixup: None,
    cleanup: None,
    args: MLOCKALL_ARGS,
};
inventory::submit! { ScDescEntry(&MLOCKALL_DESC) }

static MUNLOCKALL_DESC: ScDesc = ScDesc {
    num: libc::SYS_munlockall,
    name: "munlockall",
    groups: ScGroup::VM,
    fixup: None,
    cleanup: None,
    args: &[],
};
inventory::submit! { ScDescEntry(&MUNLOCKALL_DESC) }

#[cfg(test)]
mod tests {
    use super::*;
    use crate::argpool::ArgPoolConfig;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn mmap_fixup_overwrites_addr_and_len_on_reclaim() {
        let mut rng = StdRng::seed_from_u64(5);
        let config = ArgPoolConfig {
            hier_depth: 0,
            hier_max_fsize: 16,
            hier_max_files_per_dir: 1,
            hier_max_subdirs_per_dir: 0,
            hier_root: None,
            memblk_page_count: 32,
            memblk_max_size: 8,
        };
        let mut pool = ArgPool::init(&config, &mut rng).expect("init");
        let mut args = [0u64; SYSCALL_MAXARGS];
        args[3] = libc::MAP_STACK as u64;
        mmap_fixup(&mut args, &mut pool, &mut rng);
        assert_eq!(args[4], u64::MAX);
        assert_eq!(args[5], 0);
        assert_eq!(args[3] & libc::MAP_STACK as u64, 0);
    }

    #[test]
    fn mincore_fixup_then_cleanup_round_trips() {
        let mut rng = StdRng::seed_from_u64(6);
        let mut args = [0u64; SYSCALL_MAXARGS];
        args[1] = 4096 * 3;
        let config = ArgPoolConfig::default();
        let mut pool = ArgPool::init(
            &ArgPoolConfig {
                hier_depth: 0,
                hier_max_files_per_dir: 1,
                ..config
            },
            &mut rng,
        )
        .expect("init");
        mincore_fixup(&mut args, &mut pool, &mut rng);
        assert_ne!(args[2], 0);
        mincore_cleanup(&args, 0, &mut pool);
    }

    #[test]
    fn munmap_cleanup_ignores_failed_calls() {
        let mut rng = StdRng::seed_from_u64(7);
        let config = ArgPoolConfig {
            hier_depth: 0,
            hier_max_files_per_dir: 1,
            ..ArgPoolConfig::default()
        };
        let mut pool = ArgPool::init(&config, &mut rng).expect("init");
        let args = [0u64; SYSCALL_MAXARGS];
        munmap_cleanup(&args, 1, &mut pool); // nonzero => no-op
    }

    #[test]
    fn munmap_cleanup_releases_the_region_on_success() {
        let mut rng = StdRng::seed_from_u64(8);
        let config = ArgPoolConfig {
            hier_depth: 0,
            hier_max_files_per_dir: 1,
            ..ArgPoolConfig::default()
        };
        let mut pool = ArgPool::init(&config, &mut rng).expect("init");
        let blk = pool
            .memblk_random(&mut rng)
            .expect("pool seeded with at least one block");
        let mut args = [0u64; SYSCALL_MAXARGS];
        args[0] = blk.addr;
        args[1] = blk.len;
        munmap_cleanup(&args, 0, &mut pool);
        assert!(
            pool.memblk_unmap(blk).is_err(),
            "region must already be gone from the pool after a successful munmap"
        );
    }

    #[test]
    fn mmap_cleanup_adds_the_returned_region_on_success() {
        let mut rng = StdRng::seed_from_u64(9);
        let config = ArgPoolConfig {
            hier_depth: 0,
            hier_max_files_per_dir: 1,
            ..ArgPoolConfig::default()
        };
        let mut pool = ArgPool::init(&config, &mut rng).expect("init");
        let mut args = [0u64; SYSCALL_MAXARGS];
        args[4] = 0; // not the reclaim-fixup path (fd != -1 sentinel)
        let page_size = crate::util::page_size();
        args[1] = page_size;
        let fake_ret = 0x1000 * page_size; // a region the pool has never seen
        mmap_cleanup(&args, fake_ret, &mut pool);
        assert!(
            pool.memblk_unmap(MemBlk {
                addr: fake_ret,
                len: page_size,
            })
            .is_ok(),
            "cleanup must have added the returned region to the pool"
        );
    }

    #[test]
    fn every_vm_descriptor_is_registered() {
        let names = crate::registry::SyscallTable::list_group(ScGroup::VM);
        for expected in [
            "mmap",
            "madvise",
            "mincore",
            "mlock",
            "mprotect",
            "msync",
            "munlock",
            "munmap",
            "mlockall",
            "munlockall",
        ] {
            assert!(names.contains(&expected), "{expected} not registered");
        }
    }
}
