//! CLI definition and argument parsing for `sysfuzz`.
//!
//! One flat `derive(Parser)` struct: there are no independent verbs here,
//! just a single mode of operation with mutually-informing flags (the
//! syscall/group whitelist, the seed, the parameter overrides, and the two
//! auxiliary dump/list modes that each short-circuit before any worker is
//! forked).

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "sysfuzz", author, version, about = "Kernel system-call fuzzer")]
pub struct Cli {
    /// Bounded call count per worker (0 = infinite).
    #[arg(short = 'n', long = "count", default_value_t = 0)]
    pub count: u64,

    /// Retain root privileges instead of dropping to `nobody`.
    #[arg(short = 'p', long = "keep-privileges")]
    pub keep_privileges: bool,

    /// Comma-separated syscall name whitelist.
    #[arg(short = 'c', long = "syscalls")]
    pub syscalls: Option<String>,

    /// Comma-separated syscall group whitelist.
    #[arg(short = 'g', long = "groups")]
    pub groups: Option<String>,

    /// Explicit PRNG seed (default: drawn from the system entropy device).
    #[arg(short = 's', long = "seed")]
    pub seed: Option<u64>,

    /// Parameter override as `name=value`; repeatable.
    #[arg(short = 'x', long = "param", action = clap::ArgAction::Append)]
    pub params: Vec<String>,

    /// Dump the parameter registry and exit.
    #[arg(short = 'd', long = "dump-params")]
    pub dump_params: bool,

    /// List every syscall in the named group and exit.
    #[arg(short = 'l', long = "list-group", value_name = "GROUP")]
    pub list_group: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_count_is_unbounded() {
        let cli = Cli::parse_from(["sysfuzz"]);
        assert_eq!(cli.count, 0);
        assert!(!cli.keep_privileges);
        assert!(cli.syscalls.is_none());
    }

    #[test]
    fn param_override_flag_is_repeatable() {
        let cli = Cli::parse_from([
            "sysfuzz",
            "-x",
            "memblk-max-size=0x400",
            "-x",
            "num-fuzzers=2",
        ]);
        assert_eq!(
            cli.params,
            vec!["memblk-max-size=0x400".to_string(), "num-fuzzers=2".to_string()]
        );
    }

    #[test]
    fn group_and_syscall_filters_parse() {
        let cli = Cli::parse_from(["sysfuzz", "-g", "vm,sched", "-c", "open"]);
        assert_eq!(cli.groups.as_deref(), Some("vm,sched"));
        assert_eq!(cli.syscalls.as_deref(), Some("open"));
    }

    #[test]
    fn dump_and_list_flags_parse() {
        let cli = Cli::parse_from(["sysfuzz", "-d"]);
        assert!(cli.dump_params);

        let cli = Cli::parse_from(["sysfuzz", "-l", "vm"]);
        assert_eq!(cli.list_group.as_deref(), Some("vm"));
    }
}
