//! Demonstration threads reproducing the six scenarios this kernel is
//! meant to satisfy. Compiled into the boot image because this kernel has
//! no separate loader (§1); not part of THE CORE.

use core::ptr::NonNull;

use crate::syslib;
use kozos_kernel::config::DEFAULT_STACK_SIZE;

const PRIO_IDLE: u8 = 15;

pub fn spawn_all() {
    syslib::run(three_priorities_low, "prio-low", 1, DEFAULT_STACK_SIZE, 0, core::ptr::null());
    syslib::run(yield_a, "yield-a", 2, DEFAULT_STACK_SIZE, 0, core::ptr::null());
    syslib::run(yield_b, "yield-b", 2, DEFAULT_STACK_SIZE, 0, core::ptr::null());
    syslib::run(mailbox_receiver, "mbox-recv", 1, DEFAULT_STACK_SIZE, 0, core::ptr::null());
    syslib::run(mailbox_sender, "mbox-send", 2, DEFAULT_STACK_SIZE, 0, core::ptr::null());
    syslib::run(mailbox_alloc_sender, "mbox-alloc-send", 2, DEFAULT_STACK_SIZE, 0, core::ptr::null());
    syslib::run(mailbox_alloc_receiver, "mbox-alloc-recv", 1, DEFAULT_STACK_SIZE, 0, core::ptr::null());
    syslib::run(faulting_thread, "faulter", 3, DEFAULT_STACK_SIZE, 0, core::ptr::null());
    syslib::run(priority_elevator, "elevator", 3, DEFAULT_STACK_SIZE, 0, core::ptr::null());
}

/// Scenario 1: three priorities, created low to high; each just logs its
/// name once and exits, demonstrating strict priority ordering once the
/// scheduler starts favouring the other two over this one.
fn three_priorities_low(_argc: usize, _argv: *const *const u8) {
    kozos_kernel::serial_println!("prio-low running");
}

/// Scenario 2: two equal-priority threads that `wait()` in a loop,
/// expected to alternate strictly.
fn yield_a(_argc: usize, _argv: *const *const u8) {
    for _ in 0..3 {
        kozos_kernel::serial_println!("A");
        syslib::wait();
    }
}

fn yield_b(_argc: usize, _argv: *const *const u8) {
    for _ in 0..3 {
        kozos_kernel::serial_println!("B");
        syslib::wait();
    }
}

const MBOX_STATIC: usize = 0;
const MBOX_ALLOC: usize = 1;

/// Scenario 3: receiver blocks first, sender delivers a static payload.
fn mailbox_receiver(_argc: usize, _argv: *const *const u8) {
    let mut size = 0usize;
    let mut payload: *mut u8 = core::ptr::null_mut();
    let sender = syslib::recv(MBOX_STATIC, &mut size, &mut payload);
    let bytes = unsafe { core::slice::from_raw_parts(payload, size) };
    let text = core::str::from_utf8(bytes).unwrap_or("?");
    kozos_kernel::serial_println!("mbox-recv got {} bytes from {:?}: {}", size, sender, text);
}

fn mailbox_sender(_argc: usize, _argv: *const *const u8) {
    static MESSAGE: &[u8] = b"static memory\n";
    let ptr = NonNull::new(MESSAGE.as_ptr() as *mut u8).unwrap();
    syslib::send(MBOX_STATIC, MESSAGE.len(), ptr);
}

/// Scenario 4: sender allocates and sends first, receiver arrives later
/// and frees the block after reading it.
fn mailbox_alloc_sender(_argc: usize, _argv: *const *const u8) {
    static MESSAGE: &[u8] = b"allocated memory\n";
    if let Some(ptr) = syslib::kmalloc(MESSAGE.len()) {
        unsafe { core::ptr::copy_nonoverlapping(MESSAGE.as_ptr(), ptr.as_ptr(), MESSAGE.len()) };
        syslib::send(MBOX_ALLOC, MESSAGE.len(), ptr);
    }
}

fn mailbox_alloc_receiver(_argc: usize, _argv: *const *const u8) {
    let mut size = 0usize;
    let mut payload: *mut u8 = core::ptr::null_mut();
    syslib::recv(MBOX_ALLOC, &mut size, &mut payload);
    if let Some(ptr) = NonNull::new(payload) {
        syslib::kmfree(ptr);
    }
}

/// Scenario 5: trips the software-error vector; the kernel prints a
/// "DOWN" marker and removes this thread, everything else continues.
fn faulting_thread(_argc: usize, _argv: *const *const u8) {
    syslib::raise_software_error();
    kozos_kernel::serial_println!("unreachable: faulter survived its own fault");
}

/// Scenario 6: a priority-3 thread elevates itself to priority 0.
fn priority_elevator(_argc: usize, _argv: *const *const u8) {
    let old = syslib::chpri(Some(0));
    kozos_kernel::serial_println!("elevator: was priority {}, now masked", old);
}

pub const IDLE_PRIORITY: u8 = PRIO_IDLE;
