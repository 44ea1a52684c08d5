//! Resource-interval manager.
//!
//! Tracks disjoint half-open ranges `[start, start+len)` over a `u64`
//! address space, block-aligned to a power-of-two block size. Used to track
//! free memory regions, file descriptors, and directory descriptors so the
//! synthesizer can hand out addresses/handles that are actually live.
//!
//! Grounded on `rman.c`/`rman.h`: `add` coalesces overlapping or adjacent
//! ranges, `select` draws a uniformly random sub-range without removing it,
//! `release` removes a previously-selected range, trimming or splitting the
//! owning entry as needed.

use sysfuzz_shared::{SysfuzzError, SysfuzzResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Resource {
    start: u64,
    len: u64,
}

impl Resource {
    fn end(&self) -> u64 {
        self.start + self.len
    }
}

#[derive(Debug)]
pub struct Rman {
    blksz: u64,
    entries: Vec<Resource>,
}

impl Rman {
    /// `blksz` must be a power of two, matching `rman_init`'s `__bitcount`
    /// check.
    pub fn new(blksz: u64) -> SysfuzzResult<Self> {
        if blksz == 0 || !blksz.is_power_of_two() {
            return Err(SysfuzzError::Resource(format!(
                "block size {blksz} is not a power of two"
            )));
        }
        Ok(Rman {
            blksz,
            entries: Vec::new(),
        })
    }

    pub fn blksz(&self) -> u64 {
        self.blksz
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Round `[start, start+len)` out to block boundaries, matching the
    /// `rman_adjust` macro.
    fn adjust(&self, start: u64, len: u64) -> (u64, u64) {
        let mask = self.blksz - 1;
        let aligned_start = start & !mask;
        let extended_len = len + (start - aligned_start);
        let rounded_len = (extended_len + mask) & !mask;
        (aligned_start, rounded_len)
    }

    /// Insert `[start, start+len)`, coalescing with any overlapping or
    /// touching range. A `len` of zero is a no-op, matching `rman_add`.
    ///
    /// `rman_add`'s own overlap-merge arithmetic has an order-of-operations
    /// quirk that drops the leftward extension when the new range starts
    /// before the entry it merges into; this implementation computes the
    /// union span directly instead, which is what the surrounding comment
    /// ("coalescing entries if needed") actually promises.
    pub fn add(&mut self, start: u64, len: u64) {
        assert!(u64::MAX - start >= len, "range end overflows u64");
        if len == 0 {
            return;
        }
        let (start, len) = self.adjust(start, len);

        let mut new_start = start;
        let mut new_end = start + len;
        let mut insert_pos = self.entries.len();
        let mut merge_start = None;
        let mut merge_end = 0;

        for (i, res) in self.entries.iter().enumerate() {
            if new_end < res.start {
                insert_pos = i;
                break;
            }
            if res.end() < new_start {
                continue;
            }
            new_start = new_start.min(res.start);
            new_end = new_end.max(res.end());
            if merge_start.is_none() {
                merge_start = Some(i);
            }
            merge_end = i + 1;
            insert_pos = i;
        }

        if let Some(first) = merge_start {
            self.entries.drain(first..merge_end);
            insert_pos = first;
        }
        self.entries.insert(
            insert_pos.min(self.entries.len()),
            Resource {
                start: new_start,
                len: new_end - new_start,
            },
        );
        self.validate();
    }

    /// Draw a uniformly random sub-range from the pool without removing it.
    /// Returns `None` if the pool is empty, matching `rman_select`'s
    /// nonzero-on-empty return convention. `max_blks`, if nonzero, caps the
    /// number of blocks in the returned length.
    pub fn select(&self, rng: &mut impl rand::Rng, max_blks: u64) -> Option<(u64, u64)> {
        if self.entries.is_empty() {
            return None;
        }
        let interval = rng.random_range(0..self.entries.len());
        let res = self.entries[interval];
        let total_blks = res.len / self.blksz;
        assert!(total_blks > 0);

        let start = rng.random_range(0..total_blks) * self.blksz + res.start;
        let mut remaining_blks = total_blks - (start - res.start) / self.blksz;
        if max_blks > 0 && remaining_blks > max_blks {
            remaining_blks = max_blks;
        }
        let len = (rng.random_range(0..remaining_blks) + 1) * self.blksz;
        Some((start, len))
    }

    /// Remove a previously-selected `[start, start+len)` range. The range
    /// must be fully contained within a single existing entry; trims the
    /// entry from the left, from the right (removing it if it becomes
    /// empty), or splits it into two if the released range falls in its
    /// interior.
    pub fn release(&mut self, start: u64, len: u64) -> SysfuzzResult<()> {
        assert!(u64::MAX - start >= len, "range end overflows u64");
        let (start, len) = self.adjust(start, len);

        for i in 0..self.entries.len() {
            let res = self.entries[i];
            if start < res.start {
                break;
            }
            if start > res.end() {
                continue;
            }
            if res.len < len {
                return Err(SysfuzzError::Resource(format!(
                    "release: range [{start}, {}) exceeds containing resource",
                    start + len
                )));
            }

            if start == res.start || start + len == res.end() {
                if start == res.start {
                    self.entries[i].start = start + len;
                }
                self.entries[i].len -= len;
                if self.entries[i].len == 0 {
                    self.entries.remove(i);
                }
            } else {
                let tail = Resource {
                    start: start + len,
                    len: res.len - len - (start - res.start),
                };
                self.entries[i].len = start - res.start;
                self.entries.insert(i + 1, tail);
            }
            self.validate();
            return Ok(());
        }

        Err(SysfuzzError::Resource(format!(
            "release: range [{start}, {}) not present",
            start + len
        )))
    }

    #[cfg(debug_assertions)]
    fn validate(&self) {
        for w in self.entries.windows(2) {
            debug_assert!(w[0].len > 0);
            debug_assert!(w[0].end() < w[1].start, "entries must not touch or overlap");
        }
        if let Some(last) = self.entries.last() {
            debug_assert!(last.len > 0);
        }
    }

    #[cfg(not(debug_assertions))]
    fn validate(&self) {}
}
