//! Parameter registry: a typed, name-keyed dictionary with defaults.
//!
//! Grounded on `params.c`'s static option table and `-x name=value`
//! override parsing, and on `options.c`'s `option_flag` (whose
//! string-for-bool return is a known bug, not reproduced here:
//! `Params::flag`-equivalent access returns `bool`).

use std::collections::BTreeMap;

use sysfuzz_shared::{SysfuzzError, SysfuzzResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    Bool(bool),
    U64(u64),
    Str(String),
}

impl ParamValue {
    fn type_name(&self) -> &'static str {
        match self {
            ParamValue::Bool(_) => "bool",
            ParamValue::U64(_) => "u64",
            ParamValue::Str(_) => "string",
        }
    }
}

struct ParamEntry {
    value: ParamValue,
    description: &'static str,
}

/// The typed, name-keyed option dictionary. Construction
/// always starts from the full default table; overrides replace entries in
/// place after a type check, matching `params_init`'s "look up, check type,
/// overwrite" sequence.
pub struct Params {
    entries: BTreeMap<&'static str, ParamEntry>,
}

impl Default for Params {
    fn default() -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(
            "hier-depth",
            ParamEntry {
                value: ParamValue::U64(4),
                description: "max file-hierarchy recursion depth",
            },
        );
        entries.insert(
            "hier-max-fsize",
            ParamEntry {
                value: ParamValue::U64(1024 * 1024),
                description: "upper bound on per-file size",
            },
        );
        entries.insert(
            "hier-max-files-per-dir",
            ParamEntry {
                value: ParamValue::U64(10),
                description: "upper bound on files per directory",
            },
        );
        entries.insert(
            "hier-max-subdirs-per-dir",
            ParamEntry {
                value: ParamValue::U64(7),
                description: "upper bound on subdirs per directory",
            },
        );
        entries.insert(
            "hier-root",
            ParamEntry {
                value: ParamValue::Str(String::new()),
                description: "root path (default: a freshly created temp directory)",
            },
        );
        entries.insert(
            "memblk-page-count",
            ParamEntry {
                value: ParamValue::U64(
                    crate::util::pagecnt() / (crate::util::ncpu() as u64 * 4).max(1),
                ),
                description: "total pages in the memblk pool",
            },
        );
        entries.insert(
            "memblk-max-size",
            ParamEntry {
                value: ParamValue::U64(1024),
                description: "max pages per individual memblk",
            },
        );
        entries.insert(
            "num-fuzzers",
            ParamEntry {
                value: ParamValue::U64(crate::util::ncpu() as u64),
                description: "number of worker processes",
            },
        );
        Params { entries }
    }
}

impl Params {
    /// Apply one `-x name=value` override. Unknown names and type mismatches
    /// are both fatal startup errors.
    pub fn apply_override(&mut self, kvp: &str) -> SysfuzzResult<()> {
        let (name, raw) = kvp
            .split_once('=')
            .ok_or_else(|| SysfuzzError::Config(format!("malformed -x value {kvp:?} (expected name=value)")))?;

        let entry = self
            .entries
            .get_mut(name)
            .ok_or_else(|| SysfuzzError::UnknownParam(name.to_string()))?;

        let parsed = match &entry.value {
            ParamValue::Bool(_) => {
                let lowered = raw.to_ascii_lowercase();
                match lowered.as_str() {
                    "true" => ParamValue::Bool(true),
                    "false" => ParamValue::Bool(false),
                    _ => {
                        return Err(SysfuzzError::ParamType {
                            name: name.to_string(),
                            expected: "bool",
                            got: raw.to_string(),
                        });
                    }
                }
            }
            ParamValue::U64(_) => {
                let n = if let Some(hex) = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
                    u64::from_str_radix(hex, 16)
                } else {
                    raw.parse::<u64>()
                };
                match n {
                    Ok(n) => ParamValue::U64(n),
                    Err(_) => {
                        return Err(SysfuzzError::ParamType {
                            name: name.to_string(),
                            expected: "u64",
                            got: raw.to_string(),
                        });
                    }
                }
            }
            ParamValue::Str(_) => ParamValue::Str(raw.to_string()),
        };

        entry.value = parsed;
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.entries.get(name).map(|e| &e.value)
    }

    pub fn u64(&self, name: &str) -> u64 {
        match self.entries.get(name).map(|e| &e.value) {
            Some(ParamValue::U64(n)) => *n,
            _ => panic!("parameter {name:?} is not a u64 parameter"),
        }
    }

    pub fn string(&self, name: &str) -> &str {
        match self.entries.get(name).map(|e| &e.value) {
            Some(ParamValue::Str(s)) => s,
            _ => panic!("parameter {name:?} is not a string parameter"),
        }
    }

    /// Print `name: value\n<description>\n\n` for every registered
    /// parameter, matching the `-d` dump format.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        for (name, entry) in &self.entries {
            let value_str = match &entry.value {
                ParamValue::Bool(b) => b.to_string(),
                ParamValue::U64(n) => n.to_string(),
                ParamValue::Str(s) if s.is_empty() => "(unset)".to_string(),
                ParamValue::Str(s) => s.clone(),
            };
            out.push_str(&format!("{name}: {value_str}\n{}\n\n", entry.description));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_parses_hex_and_decimal() {
        let mut params = Params::default();
        params.apply_override("memblk-max-size=0x400").unwrap();
        assert_eq!(params.u64("memblk-max-size"), 1024);

        params.apply_override("memblk-max-size=10").unwrap();
        assert_eq!(params.u64("memblk-max-size"), 10);
    }

    #[test]
    fn override_rejects_type_mismatch() {
        let mut params = Params::default();
        assert!(params.apply_override("memblk-max-size=true").is_err());
    }

    #[test]
    fn override_rejects_unknown_name() {
        let mut params = Params::default();
        assert!(params.apply_override("not-a-real-param=1").is_err());
    }

    #[test]
    fn override_accepts_string_params_verbatim() {
        let mut params = Params::default();
        params.apply_override("hier-root=/tmp/x").unwrap();
        assert_eq!(params.string("hier-root"), "/tmp/x");
    }

    #[test]
    fn override_is_case_insensitive_for_bools() {
        let mut params = Params {
            entries: BTreeMap::new(),
        };
        params.entries.insert(
            "test-flag",
            ParamEntry {
                value: ParamValue::Bool(false),
                description: "test-only boolean parameter",
            },
        );
        params.apply_override("test-flag=TRUE").unwrap();
        assert_eq!(params.get("test-flag"), Some(&ParamValue::Bool(true)));
    }

    #[test]
    fn dump_includes_every_registered_parameter() {
        let params = Params::default();
        let dump = params.dump();
        for name in [
            "hier-depth",
            "hier-max-fsize",
            "hier-max-files-per-dir",
            "hier-max-subdirs-per-dir",
            "hier-root",
            "memblk-page-count",
            "memblk-max-size",
            "num-fuzzers",
        ] {
            assert!(dump.contains(name), "{name} missing from dump");
        }
    }

    #[test]
    fn malformed_override_without_equals_is_an_error() {
        let mut params = Params::default();
        assert!(params.apply_override("no-equals-sign").is_err());
    }
}
