//! Scheduling syscall descriptors.
//!
//! Grounded on `sched.c`: every descriptor there is wrapped in
//! `#ifdef notyet` upstream; here they are registered active rather
//! than carrying the build-time gate forward. None of these need a
//! fixup or cleanup.

use crate::registry::{ScArgDesc, ScArgType, ScDesc, ScDescEntry, ScGroup};

const SCHED_POLICIES: &[i64] = &[
    libc::SCHED_FIFO as i64,
    libc::SCHED_OTHER as i64,
    libc::SCHED_RR as i64,
];

static SCHED_SETPARAM_ARGS: &[ScArgDesc] = &[
    ScArgDesc {
        ty: ScArgType::Pid,
        name: "pid",
    },
    ScArgDesc {
        ty: ScArgType::SchedParam,
        name: "param",
    },
];

static SCHED_SETPARAM_DESC: ScDesc = ScDesc {
    num: libc::SYS_sched_setparam,
    name: "sched_setparam",
    groups: ScGroup::SCHED,
    fixup: None,
    cleanup: None,
    args: SCHED_SETPARAM_ARGS,
};
inventory::submit! { ScDescEntry(&SCHED_SETPARAM_DESC) }

static SCHED_GETPARAM_ARGS: &[ScArgDesc] = &[
    ScArgDesc {
        ty: ScArgType::Pid,
        name: "pid",
    },
    ScArgDesc {
        ty: ScArgType::SchedParam,
        name: "param",
    },
];

static SCHED_GETPARAM_DESC: ScDesc = ScDesc {
    num: libc::SYS_sched_getparam,
    name: "sched_getparam",
    groups: ScGroup::SCHED,
    fixup: None,
    cleanup: None,
    args: SCHED_GETPARAM_ARGS,
};
inventory::submit! { ScDescEntry(&SCHED_GETPARAM_DESC) }

static SCHED_SETSCHEDULER_ARGS: &[ScArgDesc] = &[
    ScArgDesc {
        ty: ScArgType::Pid,
        name: "pid",
    },
    ScArgDesc {
        ty: ScArgType::Cmd(SCHED_POLICIES),
        name: "policy",
    },
    ScArgDesc {
        ty: ScArgType::SchedParam,
        name: "param",
    },
];

static SCHED_SETSCHEDULER_DESC: ScDesc = ScDesc {
    num: libc::SYS_sched_setscheduler,
    name: "sched_setscheduler",
    groups: ScGroup::SCHED,
    fixup: None,
    cleanup: None,
    args: SCHED_SETSCHEDULER_ARGS,
};
inventory::submit! { ScDescEntry(&SCHED_SETSCHEDULER_DESC) }

static SCHED_GETSCHEDULER_ARGS: &[ScArgDesc] = &[ScArgDesc {
    ty: ScArgType::Pid,
    name: "pid",
}];

static SCHED_GETSCHEDULER_DESC: ScDesc = ScDesc {
    num: libc::SYS_sched_getscheduler,
    name: "sched_getscheduler",
    groups: ScGroup::SCHED,
    fixup: None,
    cleanup: None,
    args: SCHED_GETSCHEDULER_ARGS,
};
inventory::submit! { ScDescEntry(&SCHED_GETSCHEDULER_DESC) }

static SCHED_YIELD_DESC: ScDesc = ScDesc {
    num: libc::SYS_sched_yield,
    name: "sched_yield",
    groups: ScGroup::SCHED,
    fixup: None,
    cleanup: None,
    args: &[],
};
inventory::submit! { ScDescEntry(&SCHED_YIELD_DESC) }

static SCHED_GET_PRIORITY_MAX_ARGS: &[ScArgDesc] = &[ScArgDesc {
    ty: ScArgType::Cmd(SCHED_POLICIES),
    name: "policy",
}];

static SCHED_GET_PRIORITY_MAX_DESC: ScDesc = ScDesc {
    num: libc::SYS_sched_get_priority_max,
    name: "sched_get_priority_max",
    groups: ScGroup::SCHED,
    fixup: None,
    cleanup: None,
    args: SCHED_GET_PRIORITY_MAX_ARGS,
};
inventory::submit! { ScDescEntry(&SCHED_GET_PRIORITY_MAX_DESC) }

static SCHED_GET_PRIORITY_MIN_ARGS: &[ScArgDesc] = &[ScArgDesc {
    ty: ScArgType::Cmd(SCHED_POLICIES),
    name: "policy",
}];

static SCHED_GET_PRIORITY_MIN_DESC: ScDesc = ScDesc {
    num: libc::SYS_sched_get_priority_min,
    name: "sched_get_priority_min",
    groups: ScGroup::SCHED,
    fixup: None,
    cleanup: None,
    args: SCHED_GET_PRIORITY_MIN_ARGS,
};
inventory::submit! { ScDescEntry(&SCHED_GET_PRIORITY_MIN_DESC) }

static SCHED_RR_GET_INTERVAL_ARGS: &[ScArgDesc] = &[
    ScArgDesc {
        ty: ScArgType::Pid,
        name: "pid",
    },
    ScArgDesc {
        ty: ScArgType::TimeSpec,
        name: "interval",
    },
];

static SCHED_RR_GET_INTERVAL_DESC: ScDesc = ScDesc {
    num: libc::SYS_sched_rr_get_interval,
    name: "sched_rr_get_interval",
    groups: ScGroup::SCHED,
    fixup: None,
    cleanup: None,
    args: SCHED_RR_GET_INTERVAL_ARGS,
};
inventory::submit! { ScDescEntry(&SCHED_RR_GET_INTERVAL_DESC) }
