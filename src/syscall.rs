//! The syscall tagged union and the trampoline-side `exit` helper.
//!
//! A C kernel keys a tagged union on an integer `type` field; a Rust
//! enum variant *is* that tag, so [`Syscall`] carries its own arguments
//! directly rather than through a separate parameter struct. What the
//! reference design calls the "reserved return field" is simply this
//! dispatcher's `Result<SyscallResult, SyscallError>` return value.

use core::ptr::NonNull;

use crate::task::{EntryFn, TaskId};

#[derive(Debug, Clone, Copy)]
pub enum Syscall {
    Run {
        func: EntryFn,
        name: &'static str,
        priority: u8,
        stack_size: usize,
        argc: usize,
        argv: *const *const u8,
    },
    Exit,
    Wait,
    Sleep,
    Wakeup(TaskId),
    GetId,
    ChangePriority(Option<u8>),
    KMalloc(usize),
    KMFree(NonNull<u8>),
    Send {
        mailbox: usize,
        size: usize,
        payload: NonNull<u8>,
    },
    Recv {
        mailbox: usize,
    },
}

impl Syscall {
    /// Stable small index used to bucket [`crate::metrics::KernelMetrics`]
    /// counters; order matches the variant declaration above.
    pub fn discriminant(&self) -> usize {
        match self {
            Syscall::Run { .. } => 0,
            Syscall::Exit => 1,
            Syscall::Wait => 2,
            Syscall::Sleep => 3,
            Syscall::Wakeup(_) => 4,
            Syscall::GetId => 5,
            Syscall::ChangePriority(_) => 6,
            Syscall::KMalloc(_) => 7,
            Syscall::KMFree(_) => 8,
            Syscall::Send { .. } => 9,
            Syscall::Recv { .. } => 10,
        }
    }
}

/// What a syscall produced, on the success path. `recv`'s out-parameters
/// are written through raw pointers by the caller (§4.4); this type
/// carries the values for that write rather than performing it, keeping
/// `Kernel::handle_syscall` free of addresses outside its own structures.
#[derive(Debug, Clone, Copy)]
pub enum SyscallResult {
    ThreadId(TaskId),
    Priority(u8),
    Pointer(Option<NonNull<u8>>),
    Sent { size: usize },
    Received {
        sender: TaskId,
        size: usize,
        payload: NonNull<u8>,
    },
    Unit,
}

/// Called by the architecture trampoline when a thread's entry function
/// returns. Present here, rather than inlined at each call site, so both
/// the real and simulated trampolines share one implementation.
#[cfg(not(test))]
pub fn exit_current() -> ! {
    use crate::kernel::KERNEL;
    let next = {
        let mut kernel = KERNEL.lock();
        kernel.exit_current();
        kernel.schedule()
    };
    let ctx = KERNEL.lock().context_of(next);
    unsafe { crate::arch::dispatch(ctx) }
}
