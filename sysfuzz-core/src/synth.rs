//! Argument synthesizer: fills an 8-slot argument vector for a chosen
//! syscall descriptor.
//!
//! Grounded on `sysfuzz.c`'s `scargs_alloc`, ported statement-for-statement:
//! dispatch on each argument's tag, with the one cross-argument rule being
//! `MEMADDR` immediately followed by `MEMLEN` consuming both slots from the
//! same sampled memblk.

use rand::Rng;

use crate::argpool::ArgPool;
use crate::registry::{SYSCALL_MAXARGS, ScArgType, ScDesc};

/// Populate `args[0..SYSCALL_MAXARGS]` for `desc`, zeroing every slot first
/// so unused slots beyond `desc.nargs()` stay zero.
pub fn synthesize(desc: &ScDesc, pool: &mut ArgPool, rng: &mut impl Rng) -> [u64; SYSCALL_MAXARGS] {
    let mut args = [0u64; SYSCALL_MAXARGS];
    let argdescs = desc.args;
    let mut i = 0;
    while i < argdescs.len() {
        match argdescs[i].ty {
            ScArgType::Unspec => {
                args[i] = rng.random::<u64>();
            }
            ScArgType::MemAddr => {
                if let Some(blk) = pool.memblk_random(rng) {
                    args[i] = blk.addr;
                    if i + 1 < argdescs.len() && matches!(argdescs[i + 1].ty, ScArgType::MemLen) {
                        args[i + 1] = blk.len;
                        i += 1;
                    }
                }
            }
            ScArgType::MemLen => {
                if let Some(blk) = pool.memblk_random(rng) {
                    args[i] = blk.len;
                }
            }
            ScArgType::Cmd(candidates) => {
                if !candidates.is_empty() {
                    args[i] = candidates[rng.random_range(0..candidates.len())] as u64;
                }
            }
            ScArgType::IFlagMask(candidates) | ScArgType::LFlagMask(candidates) => {
                let mut mask: u64 = 0;
                if !candidates.is_empty() {
                    let count = rng.random_range(0..=candidates.len());
                    for _ in 0..count {
                        mask |= candidates[rng.random_range(0..candidates.len())] as u64;
                    }
                }
                args[i] = mask;
            }
            _ => {
                args[i] = 0;
            }
        }
        i += 1;
    }
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::argpool::ArgPoolConfig;
    use crate::registry::ScArgDesc;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn test_pool(rng: &mut StdRng) -> ArgPool {
        let config = ArgPoolConfig {
            hier_depth: 0,
            hier_max_fsize: 16,
            hier_max_files_per_dir: 1,
            hier_max_subdirs_per_dir: 0,
            hier_root: None,
            memblk_page_count: 64,
            memblk_max_size: 16,
        };
        ArgPool::init(&config, rng).expect("init")
    }

    #[test]
    fn memaddr_followed_by_memlen_pairs_from_the_same_block() {
        let mut rng = StdRng::seed_from_u64(31);
        let mut pool = test_pool(&mut rng);

        static ARGS: &[ScArgDesc] = &[
            ScArgDesc {
                ty: ScArgType::MemAddr,
                name: "addr",
            },
            ScArgDesc {
                ty: ScArgType::MemLen,
                name: "len",
            },
        ];
        static DESC: ScDesc = ScDesc {
            num: 0,
            name: "synth_test_memaddr_memlen",
            groups: crate::registry::ScGroup::NONE,
            fixup: None,
            cleanup: None,
            args: ARGS,
        };

        for _ in 0..25 {
            let args = synthesize(&DESC, &mut pool, &mut rng);
            // The address must fall within some live memblk, and the paired
            // length must be exactly that memblk's length -- check by
            // re-deriving what select() would return is not possible after
            // the fact, so instead assert the structural invariant: len > 0
            // and addr is block-aligned to the page size used by the pool.
            assert!(args[1] > 0);
            assert_eq!(args[0] % crate::util::page_size(), 0);
        }
    }

    #[test]
    fn iflagmask_result_is_subset_of_candidates() {
        let mut rng = StdRng::seed_from_u64(32);
        let mut pool = test_pool(&mut rng);
        const FLAGS: &[i64] = &[0x1, 0x2, 0x4, 0x8];
        static ARGS_CELL: std::sync::OnceLock<Vec<ScArgDesc>> = std::sync::OnceLock::new();
        let argdescs = ARGS_CELL.get_or_init(|| {
            vec![ScArgDesc {
                ty: ScArgType::IFlagMask(FLAGS),
                name: "flags",
            }]
        });
        let desc = ScDesc {
            num: 0,
            name: "synth_test_iflagmask",
            groups: crate::registry::ScGroup::NONE,
            fixup: None,
            cleanup: None,
            args: argdescs,
        };

        let union: u64 = FLAGS.iter().fold(0u64, |acc, f| acc | (*f as u64));
        for _ in 0..50 {
            let args = synthesize(&desc, &mut pool, &mut rng);
            assert_eq!(args[0] & !union, 0, "result must be a subset of the candidate OR");
        }
    }

    #[test]
    fn cmd_result_is_always_a_candidate_member() {
        let mut rng = StdRng::seed_from_u64(33);
        let mut pool = test_pool(&mut rng);
        const CMDS: &[i64] = &[10, 20, 30];
        static ARGS: &[ScArgDesc] = &[ScArgDesc {
            ty: ScArgType::Cmd(CMDS),
            name: "cmd",
        }];
        static DESC: ScDesc = ScDesc {
            num: 0,
            name: "synth_test_cmd",
            groups: crate::registry::ScGroup::NONE,
            fixup: None,
            cleanup: None,
            args: ARGS,
        };

        for _ in 0..25 {
            let args = synthesize(&DESC, &mut pool, &mut rng);
            assert!(CMDS.contains(&(args[0] as i64)));
        }
    }

    #[test]
    fn unused_slots_beyond_nargs_stay_zero() {
        let mut rng = StdRng::seed_from_u64(34);
        let mut pool = test_pool(&mut rng);
        static ARGS: &[ScArgDesc] = &[ScArgDesc {
            ty: ScArgType::Unspec,
            name: "only",
        }];
        static DESC: ScDesc = ScDesc {
            num: 0,
            name: "synth_test_unused_slots",
            groups: crate::registry::ScGroup::NONE,
            fixup: None,
            cleanup: None,
            args: ARGS,
        };
        let args = synthesize(&DESC, &mut pool, &mut rng);
        for slot in &args[1..] {
            assert_eq!(*slot, 0);
        }
    }
}
