//! sysfuzz-core: the argument-synthesis pipeline, resource manager, and
//! worker fuzz loop behind the `sysfuzz` kernel system-call fuzzer.
//!
//! This crate has no notion of "success" for a syscall under test; the
//! kernel is the oracle. It owns only the parts that must agree across a
//! fuzzing run: the descriptor registry, the pools synthesized arguments
//! are drawn from, and the fork/seed/loop/reap worker model.

pub mod argpool;
pub mod descriptors;
pub mod params;
pub mod registry;
pub mod rman;
pub mod synth;
pub mod util;
pub mod worker;

pub use argpool::{ArgPool, ArgPoolConfig, MemBlk};
pub use params::{ParamValue, Params};
pub use registry::{ScArgDesc, ScArgType, ScDesc, ScGroup, SyscallTable, SYSCALL_MAXARGS};
pub use rman::Rman;
pub use worker::{RawSyscallInvoker, SyscallInvoker, WorkerPoolConfig, drop_privileges, is_root, run_loop, spawn_workers};
