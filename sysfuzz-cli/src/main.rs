mod cli;

use std::process;

use clap::Parser;
use cli::Cli;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use sysfuzz_core::{ArgPoolConfig, Params, SyscallTable, WorkerPoolConfig, drop_privileges, spawn_workers};
use sysfuzz_shared::{SysfuzzError, SysfuzzResult};

fn main() {
    let cli = Cli::parse();

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(error) = run(cli) {
        eprintln!("Error: {error}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> SysfuzzResult<()> {
    let mut params = Params::default();
    for kvp in &cli.params {
        params.apply_override(kvp)?;
    }

    if cli.dump_params {
        print!("{}", params.dump());
        return Ok(());
    }

    if let Some(group_name) = &cli.list_group {
        let group = sysfuzz_core::registry::group_lookup(group_name)
            .ok_or_else(|| SysfuzzError::UnknownGroup(group_name.clone()))?;
        for name in SyscallTable::list_group(group) {
            println!("{name}");
        }
        return Ok(());
    }

    drop_privileges(cli.keep_privileges)?;

    let table = SyscallTable::build(cli.syscalls.as_deref(), cli.groups.as_deref())?;

    let base_seed = match cli.seed {
        Some(seed) => seed,
        None => sysfuzz_core::util::pickseed()?,
    };

    let hier_root = {
        let configured = params.string("hier-root");
        if configured.is_empty() {
            None
        } else {
            Some(std::path::PathBuf::from(configured))
        }
    };

    let pool_config = ArgPoolConfig {
        hier_depth: params.u64("hier-depth") as u32,
        hier_max_fsize: params.u64("hier-max-fsize"),
        hier_max_files_per_dir: params.u64("hier-max-files-per-dir"),
        hier_max_subdirs_per_dir: params.u64("hier-max-subdirs-per-dir"),
        hier_root,
        memblk_page_count: params.u64("memblk-page-count"),
        memblk_max_size: params.u64("memblk-max-size"),
    };

    let worker_config = WorkerPoolConfig {
        num_fuzzers: params.u64("num-fuzzers"),
        call_count: cli.count,
        base_seed,
        pool_config,
    };

    let statuses = spawn_workers(&worker_config, &table)?;
    if statuses.iter().any(|&code| code != 0) {
        return Err(SysfuzzError::Child(format!(
            "one or more workers exited nonzero: {statuses:?}"
        )));
    }
    Ok(())
}
