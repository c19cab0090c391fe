//! Soft real-time plumbing: round-robin scheduling priority and memory
//! locking. Both degrade to a warning when the system refuses; the loopback
//! still works, just with weaker latency guarantees.

use log::warn;

/// Elevates the process to SCHED_RR at the requested priority, clamped to
/// what RLIMIT_RTPRIO allows. A priority of 0 disables elevation.
pub fn set_realtime_priority(priority: u32) {
    if priority == 0 {
        return;
    }

    let mut limit = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    unsafe {
        libc::getrlimit(libc::RLIMIT_RTPRIO, &mut limit);
    }
    if limit.rlim_cur == 0 {
        warn!("system does not allow real-time priority");
        return;
    }
    let mut priority = priority;
    if priority as libc::rlim_t > limit.rlim_cur {
        priority = limit.rlim_cur as u32;
        warn!("system limits real-time priority to {}", priority);
    }

    let param = libc::sched_param {
        sched_priority: priority as libc::c_int,
    };
    let res = unsafe { libc::sched_setscheduler(0, libc::SCHED_RR, &param) };
    if res != 0 {
        warn!("failed to set real-time priority");
    }
}

/// Locks the whole address space into RAM so page faults cannot stall the
/// loop.
pub fn set_memory_lock() {
    let res = unsafe { libc::mlockall(libc::MCL_CURRENT | libc::MCL_FUTURE) };
    if res != 0 {
        warn!("failed to lock process memory");
    }
}
