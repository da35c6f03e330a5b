//! User-facing syscall wrappers, in the idiom of the reference design's
//! `kz_run`/`kz_send`/... library functions: build the registers the
//! trap entry expects and execute the trap instruction. Bin-only: no
//! thread other than the demo threads in [`crate::demos`] calls these.

use core::arch::asm;
use core::ptr::NonNull;

use kozos_kernel::task::{EntryFn, TaskId};

#[repr(C)]
struct RunArgs {
    func: usize,
    name_ptr: *const u8,
    name_len: usize,
    priority: u8,
    stack_size: usize,
    argc: usize,
    argv: *const *const u8,
}

unsafe fn syscall(id: u64, a0: u64, a1: u64, a2: u64) -> u64 {
    let ret: u64;
    unsafe {
        asm!(
            "int 0x80",
            inout("rax") id => ret,
            in("rdi") a0,
            in("rsi") a1,
            in("rdx") a2,
            options(nostack),
        );
    }
    ret
}

pub fn run(func: EntryFn, name: &str, priority: u8, stack_size: usize, argc: usize, argv: *const *const u8) -> Option<TaskId> {
    let args = RunArgs {
        func: func as usize,
        name_ptr: name.as_ptr(),
        name_len: name.len(),
        priority,
        stack_size,
        argc,
        argv,
    };
    let raw = unsafe { syscall(0, &args as *const RunArgs as u64, 0, 0) };
    if raw == u64::MAX {
        None
    } else {
        Some(TaskId::from_raw(raw))
    }
}

pub fn exit() -> ! {
    unsafe {
        syscall(1, 0, 0, 0);
    }
    unreachable!("exit does not return")
}

pub fn wait() {
    unsafe {
        syscall(2, 0, 0, 0);
    }
}

pub fn sleep() {
    unsafe {
        syscall(3, 0, 0, 0);
    }
}

pub fn wakeup(id: TaskId) {
    unsafe {
        syscall(4, id.to_raw(), 0, 0);
    }
}

pub fn getid() -> TaskId {
    TaskId::from_raw(unsafe { syscall(5, 0, 0, 0) })
}

/// `priority = None` reads the current priority without changing it.
pub fn chpri(priority: Option<u8>) -> u8 {
    let arg = match priority {
        Some(p) => p as u64,
        None => u64::MAX,
    };
    unsafe { syscall(6, arg, 0, 0) as u8 }
}

pub fn kmalloc(size: usize) -> Option<NonNull<u8>> {
    let raw = unsafe { syscall(7, size as u64, 0, 0) };
    NonNull::new(raw as *mut u8)
}

pub fn kmfree(ptr: NonNull<u8>) {
    unsafe {
        syscall(8, ptr.as_ptr() as u64, 0, 0);
    }
}

pub fn send(mailbox: usize, size: usize, payload: NonNull<u8>) -> usize {
    unsafe { syscall(9, mailbox as u64, size as u64, payload.as_ptr() as u64) as usize }
}

/// Returns the sender, with `size` and `payload` written through the two
/// out-parameters, exactly as §4.4 describes.
pub fn recv(mailbox: usize, size: &mut usize, payload: &mut *mut u8) -> TaskId {
    let raw = unsafe { syscall(10, mailbox as u64, size as *mut usize as u64, payload as *mut *mut u8 as u64) };
    TaskId::from_raw(raw)
}

/// Deliberately raise the software-error vector (§4.5, §8 scenario 5).
/// Vector 0x81, not 0x0e: 0x0e is the CPU's own Page Fault exception,
/// left wired to a real page-fault handler (see `boot::idt`).
pub fn raise_software_error() {
    unsafe {
        asm!("int 0x81", options(nostack));
    }
}
