//! Small host-introspection helpers.
//!
//! Grounded on `util.c`'s `ncpu()`/`pagecnt()` (there read via
//! `sysctlbyname("hw.ncpu", ...)`/`sysctlbyname("vm.stats.vm.v_page_count",
//! ...)`) and `sysfuzz.c`'s `pickseed()`.

use std::fs::File;
use std::io::Read;

use sysfuzz_shared::{SysfuzzError, SysfuzzResult};

/// Number of CPUs visible to this process.
pub fn ncpu() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Total physical page count, read from `/proc/meminfo` (the Linux
/// analogue of a BSD `vm.stats.vm.v_page_count` sysctl).
pub fn pagecnt() -> u64 {
    let page_size = page_size();
    let Ok(contents) = std::fs::read_to_string("/proc/meminfo") else {
        return 0;
    };
    for line in contents.lines() {
        if let Some(rest) = line.strip_prefix("MemTotal:") {
            let kb: u64 = rest
                .trim()
                .trim_end_matches("kB")
                .trim()
                .parse()
                .unwrap_or(0);
            return (kb * 1024) / page_size;
        }
    }
    0
}

/// System page size in bytes.
pub fn page_size() -> u64 {
    // SAFETY: sysconf with _SC_PAGESIZE never fails on a sane host.
    let sz = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if sz > 0 { sz as u64 } else { 4096 }
}

/// Draw a single random seed from the system entropy source, matching
/// `pickseed()`'s `/dev/urandom` read of exactly `sizeof(u_long)` bytes.
pub fn pickseed() -> SysfuzzResult<u64> {
    let mut file = File::open("/dev/urandom")
        .map_err(|e| SysfuzzError::Entropy("/dev/urandom".to_string(), e))?;
    let mut buf = [0u8; 8];
    file.read_exact(&mut buf)
        .map_err(|e| SysfuzzError::Entropy("/dev/urandom".to_string(), e))?;
    Ok(u64::from_ne_bytes(buf))
}
