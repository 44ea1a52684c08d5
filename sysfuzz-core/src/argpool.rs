//! Argument pool: the sub-pools the synthesizer draws live addresses and
//! descriptors from.
//!
//! Grounded on `argpool.c`'s memory-block budget/seeding policy (page-count
//! budget divided across CPUs, each block a random page count up to 1024,
//! backed by an anonymous `mmap`) combined with the `rman`-based pool shape
//! this crate treats as authoritative: rather than a flat array scanned
//! linearly by `memblk_random`, each sub-pool (memory, file descriptors,
//! directory descriptors) is a `Rman` so reclaiming and releasing a region
//! reuses the same coalescing/splitting machinery.

use std::fs::{self, File};
use std::os::fd::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};

use nix::sys::mman::{MapFlags, ProtFlags, mmap_anonymous};
use rand::Rng;
use sysfuzz_shared::{SysfuzzError, SysfuzzResult};
use tempfile::TempDir;

use crate::rman::Rman;
use crate::util;

/// A live, mmap-backed memory region (or a sub-range handed out of one).
#[derive(Debug, Clone, Copy)]
pub struct MemBlk {
    pub addr: u64,
    pub len: u64,
}

pub struct ArgPoolConfig {
    pub hier_depth: u32,
    pub hier_max_fsize: u64,
    pub hier_max_files_per_dir: u64,
    pub hier_max_subdirs_per_dir: u64,
    pub hier_root: Option<PathBuf>,
    /// Total page budget for the memblk pool (`memblk-page-count`).
    pub memblk_page_count: u64,
    /// Upper bound, in pages, on any single memblk (`memblk-max-size`).
    pub memblk_max_size: u64,
}

impl Default for ArgPoolConfig {
    fn default() -> Self {
        ArgPoolConfig {
            hier_depth: 4,
            hier_max_fsize: 1024 * 1024,
            hier_max_files_per_dir: 10,
            hier_max_subdirs_per_dir: 7,
            hier_root: None,
            memblk_page_count: util::pagecnt() / (util::ncpu() as u64 * 4).max(1),
            memblk_max_size: 1024,
        }
    }
}

pub struct ArgPool {
    memblk: Rman,
    fd: Rman,
    dirfd: Rman,
    _hier_root: TempDir,
    hier_root_path: PathBuf,
}

impl ArgPool {
    /// Seed the memory-block pool and build the throwaway file hierarchy,
    /// matching `argpool_init`'s call into `memblk_init` and registering
    /// the hierarchy's files/directories into the fd/dirfd pools.
    pub fn init(config: &ArgPoolConfig, rng: &mut impl Rng) -> SysfuzzResult<Self> {
        let page_size = util::page_size();
        let mut pgcnt = config.memblk_page_count;

        let mut memblk = Rman::new(page_size)?;
        while pgcnt > 0 {
            let mut blk_pages = rng.random_range(0..config.memblk_max_size.max(1));
            if blk_pages > pgcnt {
                blk_pages = pgcnt;
            }
            pgcnt -= blk_pages;
            if blk_pages == 0 {
                continue;
            }
            let len = blk_pages * page_size;
            let addr = seed_region(len, rng)?;
            memblk.add(addr, len);
        }

        let hier_root = if let Some(root) = &config.hier_root {
            fs::create_dir_all(root).map_err(|e| SysfuzzError::Hierarchy {
                path: root.display().to_string(),
                source: e,
            })?;
            TempDir::new_in(root)
        } else {
            TempDir::with_prefix("sysfuzz.")
        }
        .map_err(|e| SysfuzzError::Hierarchy {
            path: config
                .hier_root
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| std::env::temp_dir().display().to_string()),
            source: e,
        })?;
        let hier_root_path = hier_root.path().to_path_buf();

        let mut pool = ArgPool {
            memblk,
            fd: Rman::new(1)?,
            dirfd: Rman::new(1)?,
            _hier_root: hier_root,
            hier_root_path,
        };
        pool.build_hierarchy(&pool.hier_root_path.clone(), config.hier_depth, config, rng)?;
        Ok(pool)
    }

    pub fn hier_root(&self) -> &Path {
        &self.hier_root_path
    }

    fn build_hierarchy(
        &mut self,
        dir: &Path,
        depth_remaining: u32,
        config: &ArgPoolConfig,
        rng: &mut impl Rng,
    ) -> SysfuzzResult<()> {
        let dir_handle = File::open(dir).map_err(|e| SysfuzzError::Hierarchy {
            path: dir.display().to_string(),
            source: e,
        })?;
        self.dirfd_add(dir_handle.as_raw_fd());
        std::mem::forget(dir_handle); // the fd now belongs to the dirfd pool

        let nfiles = rng.random_range(1..=config.hier_max_files_per_dir.max(1));
        for i in 0..nfiles {
            let path = dir.join(format!("f{i}"));
            let size = rng.random_range(0..=config.hier_max_fsize);
            let file = File::create(&path).map_err(|e| SysfuzzError::Hierarchy {
                path: path.display().to_string(),
                source: e,
            })?;
            file.set_len(size).map_err(|e| SysfuzzError::Hierarchy {
                path: path.display().to_string(),
                source: e,
            })?;
            self.fd_add(file.as_raw_fd());
            std::mem::forget(file);
        }

        if depth_remaining > 0 {
            let ndirs = rng.random_range(0..=config.hier_max_subdirs_per_dir);
            for i in 0..ndirs {
                let subdir = dir.join(format!("d{i}"));
                fs::create_dir(&subdir).map_err(|e| SysfuzzError::Hierarchy {
                    path: subdir.display().to_string(),
                    source: e,
                })?;
                self.build_hierarchy(&subdir, depth_remaining - 1, config, rng)?;
            }
        }
        Ok(())
    }

    /// Sample a live memory region without removing it (`ap_memblk_random`),
    /// for argument synthesis that only needs to read an address/length
    /// pair, not consume the block.
    pub fn memblk_random(&self, rng: &mut impl Rng) -> Option<MemBlk> {
        let (addr, len) = self.memblk.select(rng, 0)?;
        Some(MemBlk { addr, len })
    }

    /// Claim a random live memory region from the pool, removing it so it
    /// can't be handed out twice while a generated syscall (e.g. `munmap`)
    /// is free to invalidate it. Combines `rman_select` with an immediate
    /// `rman_release`, standing in for `ap_memblk_reclaim`.
    pub fn memblk_reclaim(&mut self, rng: &mut impl Rng) -> Option<MemBlk> {
        let (start, len) = self.memblk.select(rng, 0)?;
        self.memblk.release(start, len).ok()?;
        Some(MemBlk { addr: start, len })
    }

    /// Give a region back to the pool (used by fixups that decide not to
    /// consume the region they reclaimed after all).
    pub fn memblk_return(&mut self, blk: MemBlk) {
        self.memblk.add(blk.addr, blk.len);
    }

    /// Release a region out of the live memblk pool after a successful
    /// `munmap`-family cleanup (`ap_memblk_unmap`/`rman_release`): the
    /// kernel no longer maps it, so the pool must stop offering it as an
    /// argument.
    pub fn memblk_unmap(&mut self, blk: MemBlk) -> SysfuzzResult<()> {
        self.memblk.release(blk.addr, blk.len)
    }

    pub fn fd_add(&mut self, fd: RawFd) {
        self.fd.add(fd as u64, 1);
    }

    pub fn fd_select(&self, rng: &mut impl Rng) -> Option<RawFd> {
        self.fd.select(rng, 1).map(|(start, _)| start as RawFd)
    }

    /// Release an fd back out of the pool, removing the descriptor so
    /// later selections can't hand out a closed fd.
    pub fn fd_close(&mut self, fd: RawFd) -> SysfuzzResult<()> {
        self.fd.release(fd as u64, 1)
    }

    pub fn dirfd_add(&mut self, fd: RawFd) {
        self.dirfd.add(fd as u64, 1);
    }

    pub fn dirfd_select(&self, rng: &mut impl Rng) -> Option<RawFd> {
        self.dirfd.select(rng, 1).map(|(start, _)| start as RawFd)
    }

    pub fn dirfd_close(&mut self, fd: RawFd) -> SysfuzzResult<()> {
        self.dirfd.release(fd as u64, 1)
    }
}

/// Map a zero length-backed anonymous region, zero-filling it with 50%
/// probability (`argpool.c`'s own comment flags the unconditional zero-fill
/// of its era as something that should probably be probabilistic).
fn seed_region(len: u64, rng: &mut impl Rng) -> SysfuzzResult<u64> {
    let len_nz = std::num::NonZeroUsize::new(len as usize)
        .ok_or_else(|| SysfuzzError::Resource("zero-length memblk region".to_string()))?;
    // SAFETY: anonymous, fixed-address-free mapping; no file descriptor involved.
    let ptr = unsafe {
        mmap_anonymous(
            None,
            len_nz,
            ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
            MapFlags::MAP_PRIVATE,
        )
    }
    .map_err(|e| SysfuzzError::Resource(format!("mmap {len} bytes: {e}")))?;

    if rng.random_bool(0.5) {
        // SAFETY: ptr is valid for len bytes, just mapped above.
        unsafe { std::ptr::write_bytes(ptr.as_ptr() as *mut u8, 0, len as usize) };
    }
    Ok(ptr.as_ptr() as u64)
}
