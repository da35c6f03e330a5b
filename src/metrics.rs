//! Ambient observability counters.
//!
//! Not part of the specified core; carried forward because the teacher
//! kernel instruments every syscall and context switch this way, and a
//! kernel with no observability at all is not representative of the
//! corpus this crate is built from. Counters are plain atomics, read
//! under the same interrupts-disabled discipline that protects the rest
//! of kernel state, so `Relaxed` ordering is sufficient.

use core::sync::atomic::{AtomicUsize, Ordering};

use crate::config::PRIORITY_NUM;
use crate::syscall::Syscall;

pub struct KernelMetrics {
    pub context_switches: AtomicUsize,
    pub syscall_count: [AtomicUsize; 11],
    pub ipc_sends: AtomicUsize,
    pub ipc_recvs: AtomicUsize,
    pub ipc_queue_full: AtomicUsize,
    pub sleep_count: AtomicUsize,
    pub wake_count: AtomicUsize,
    pub timer_ticks: AtomicUsize,
    pub thread_faults: AtomicUsize,
}

impl KernelMetrics {
    pub const fn new() -> Self {
        const ZERO: AtomicUsize = AtomicUsize::new(0);
        KernelMetrics {
            context_switches: AtomicUsize::new(0),
            syscall_count: [ZERO; 11],
            ipc_sends: AtomicUsize::new(0),
            ipc_recvs: AtomicUsize::new(0),
            ipc_queue_full: AtomicUsize::new(0),
            sleep_count: AtomicUsize::new(0),
            wake_count: AtomicUsize::new(0),
            timer_ticks: AtomicUsize::new(0),
            thread_faults: AtomicUsize::new(0),
        }
    }

    pub fn record_syscall(&self, call: &Syscall) {
        self.syscall_count[call.discriminant()].fetch_add(1, Ordering::Relaxed);
        match call {
            Syscall::Send { .. } => {
                self.ipc_sends.fetch_add(1, Ordering::Relaxed);
            }
            Syscall::Recv { .. } => {
                self.ipc_recvs.fetch_add(1, Ordering::Relaxed);
            }
            Syscall::Sleep => {
                self.sleep_count.fetch_add(1, Ordering::Relaxed);
            }
            Syscall::Wakeup(_) => {
                self.wake_count.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
    }

    pub fn record_context_switch(&self) {
        self.context_switches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tick(&self) {
        self.timer_ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fault(&self) {
        self.thread_faults.fetch_add(1, Ordering::Relaxed);
    }
}

pub static METRICS: KernelMetrics = KernelMetrics::new();

const _: () = assert!(PRIORITY_NUM > 0, "PRIORITY_NUM must be non-zero");
