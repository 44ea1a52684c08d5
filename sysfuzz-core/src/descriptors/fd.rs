//! File-descriptor lifecycle descriptors.
//!
//! The `syscall.c`-style descriptor files only ever *consume* descriptors
//! out of the pool through `ARG_FD` arguments (themselves left unhandled
//! by the argument synthesizer's dispatch and defaulted to zero). That
//! leaves a gap: with nothing that ever adds to or drains the fd pool
//! through a real syscall, the only descriptors exercising a real fd
//! close are the hierarchy-builder's pre-seeded files. `open`/`openat`/
//! `close` close that gap, grounded on the same `ScDesc`/fixup/cleanup
//! shape as `vm.rs`.

use std::ffi::CString;

use crate::argpool::ArgPool;
use crate::registry::{ScArgDesc, ScArgType, ScDesc, ScDescEntry, ScGroup, SYSCALL_MAXARGS};

const OPEN_FLAGS: &[i64] = &[
    libc::O_RDONLY as i64,
    libc::O_WRONLY as i64,
    libc::O_RDWR as i64,
    libc::O_CREAT as i64,
    libc::O_TRUNC as i64,
    libc::O_APPEND as i64,
    libc::O_NONBLOCK as i64,
    libc::O_CLOEXEC as i64,
];

/// Point the path argument at a real file in the throwaway hierarchy
/// instead of whatever garbage address the synthesizer picked, so `open`
/// has a realistic chance of succeeding (and, when it does, of handing the
/// cleanup a live fd to register).
fn open_fixup(args: &mut [u64; SYSCALL_MAXARGS], pool: &mut ArgPool, _rng: &mut dyn rand::RngCore) {
    let path = pool.hier_root().join("f0");
    if let Ok(cpath) = CString::new(path.as_os_str().as_encoded_bytes()) {
        args[0] = cpath.into_raw() as u64;
    }
}

/// Register a successful open's fd with the pool so later `close`/fd-typed
/// arguments can draw on it; free the path string `open_fixup` leaked.
fn open_cleanup(args: &[u64; SYSCALL_MAXARGS], ret: u64, pool: &mut ArgPool) {
    if args[0] != 0 {
        // SAFETY: open_fixup only ever stores a pointer from CString::into_raw.
        unsafe { drop(CString::from_raw(args[0] as *mut libc::c_char)) };
    }
    let fd = ret as i64;
    if fd >= 0 {
        pool.fd_add(fd as std::os::fd::RawFd);
    }
}

static OPEN_ARGS: &[ScArgDesc] = &[
    ScArgDesc {
        ty: ScArgType::Path,
        name: "path",
    },
    ScArgDesc {
        ty: ScArgType::IFlagMask(OPEN_FLAGS),
        name: "flags",
    },
    ScArgDesc {
        ty: ScArgType::Mode,
        name: "mode",
    },
];

static OPEN_DESC: ScDesc = ScDesc {
    num: libc::SYS_open,
    name: "open",
    groups: ScGroup::NONE,
    fixup: Some(open_fixup),
    cleanup: Some(open_cleanup),
    args: OPEN_ARGS,
};
inventory::submit! { ScDescEntry(&OPEN_DESC) }

/// `openat` with a directory-descriptor argument drawn from the pool,
/// falling back to `AT_FDCWD` when the dirfd pool has nothing to offer.
fn openat_fixup(args: &mut [u64; SYSCALL_MAXARGS], pool: &mut ArgPool, rng: &mut dyn rand::RngCore) {
    args[0] = pool
        .dirfd_select(rng)
        .map(|fd| fd as u64)
        .unwrap_or(libc::AT_FDCWD as i64 as u64);
    let path = pool.hier_root().join("f0");
    if let Ok(cpath) = CString::new(path.as_os_str().as_encoded_bytes()) {
        args[1] = cpath.into_raw() as u64;
    }
}

fn openat_cleanup(args: &[u64; SYSCALL_MAXARGS], ret: u64, pool: &mut ArgPool) {
    if args[1] != 0 {
        // SAFETY: openat_fixup only ever stores a pointer from CString::into_raw.
        unsafe { drop(CString::from_raw(args[1] as *mut libc::c_char)) };
    }
    let fd = ret as i64;
    if fd >= 0 {
        pool.fd_add(fd as std::os::fd::RawFd);
    }
}

static OPENAT_ARGS: &[ScArgDesc] = &[
    ScArgDesc {
        ty: ScArgType::Fd,
        name: "dirfd",
    },
    ScArgDesc {
        ty: ScArgType::Path,
        name: "path",
    },
    ScArgDesc {
        ty: ScArgType::IFlagMask(OPEN_FLAGS),
        name: "flags",
    },
    ScArgDesc {
        ty: ScArgType::Mode,
        name: "mode",
    },
];

static OPENAT_DESC: ScDesc = ScDesc {
    num: libc::SYS_openat,
    name: "openat",
    groups: ScGroup::NONE,
    fixup: Some(openat_fixup),
    cleanup: Some(openat_cleanup),
    args: OPENAT_ARGS,
};
inventory::submit! { ScDescEntry(&OPENAT_DESC) }

/// Draw a live fd out of the pool rather than letting the synthesizer's
/// all-else-zero default hand `close` a fixed, almost certainly stale
/// descriptor every time.
fn close_fixup(args: &mut [u64; SYSCALL_MAXARGS], pool: &mut ArgPool, rng: &mut dyn rand::RngCore) {
    if let Some(fd) = pool.fd_select(rng) {
        args[0] = fd as u64;
    }
}

/// Release the descriptor from the pool regardless of whether the close
/// itself succeeded, since the kernel consumes the fd number either way
/// once it's been passed to `close(2)`.
fn close_cleanup(args: &[u64; SYSCALL_MAXARGS], _ret: u64, pool: &mut ArgPool) {
    let _ = pool.fd_close(args[0] as std::os::fd::RawFd);
}

static CLOSE_ARGS: &[ScArgDesc] = &[ScArgDesc {
    ty: ScArgType::Fd,
    name: "fd",
}];

static CLOSE_DESC: ScDesc = ScDesc {
    num: libc::SYS_close,
    name: "close",
    groups: ScGroup::NONE,
    fixup: Some(close_fixup),
    cleanup: Some(close_cleanup),
    args: CLOSE_ARGS,
};
inventory::submit! { ScDescEntry(&CLOSE_DESC) }

#[cfg(test)]
mod tests {
    use super::*;
    use crate::argpool::ArgPoolConfig;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn test_pool(rng: &mut StdRng) -> ArgPool {
        let config = ArgPoolConfig {
            hier_depth: 0,
            hier_max_fsize: 16,
            hier_max_files_per_dir: 1,
            hier_max_subdirs_per_dir: 0,
            hier_root: None,
            memblk_page_count: 4,
            memblk_max_size: 4,
        };
        ArgPool::init(&config, rng).expect("init")
    }

    #[test]
    fn open_fixup_points_at_a_real_path() {
        let mut rng = StdRng::seed_from_u64(21);
        let mut pool = test_pool(&mut rng);
        let mut args = [0u64; SYSCALL_MAXARGS];
        open_fixup(&mut args, &mut pool, &mut rng);
        assert_ne!(args[0], 0);
        open_cleanup(&args, 3, &mut pool); // pretend fd 3 was returned
    }

    #[test]
    fn close_fixup_then_cleanup_releases_a_real_fd() {
        let mut rng = StdRng::seed_from_u64(22);
        let mut pool = test_pool(&mut rng);
        let before = pool.fd_select(&mut rng).is_some();
        assert!(before, "hierarchy builder should have seeded at least one fd");
        let mut args = [0u64; SYSCALL_MAXARGS];
        close_fixup(&mut args, &mut pool, &mut rng);
        close_cleanup(&args, 0, &mut pool);
    }

    #[test]
    fn every_fd_descriptor_is_registered() {
        for expected in ["open", "openat", "close"] {
            assert!(crate::registry::lookup(expected).is_some(), "{expected} not registered");
        }
    }
}
