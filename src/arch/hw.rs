//! Real x86_64 backend: IDT-driven trap entry, register save/restore, and
//! the synthesized initial stack frame for brand-new threads.
//!
//! Grounded on the naked-function syscall trampoline in the reference
//! kernel this crate was built from, corrected to pop registers in exact
//! reverse order of the pushes (the reference trampoline shuffled the
//! return value through `r15` in a way that clobbered it before the
//! matching `pop r15`; here the return value is written directly into the
//! saved `rax` slot before any register is restored) and generalized to
//! the three vectors this kernel registers (syscall, software-error,
//! timer tick) instead of one.

use core::arch::naked_asm;
use core::ptr::NonNull;

use spin::MutexGuard;

use crate::kernel::{Kernel, KERNEL};
use crate::syscall::{Syscall, SyscallResult};
use crate::task::{EntryFn, StartupRecord, TaskId};

use super::SavedContext;

/// Number of 8-byte words this entry path saves per trap: 9 caller-saved
/// + 6 callee-saved general purpose registers, below the 5-word hardware
/// IRETQ frame. Slot order, low to high address: r15 r14 r13 r12 rbp rbx
/// r11 r10 r9 r8 rdi rsi rdx rcx rax.
const SAVED_GPRS: usize = 15;
const SLOT_RDI: usize = 10;
const SLOT_RSI: usize = 11;
const SLOT_RDX: usize = 12;
const SLOT_RCX: usize = 13;
const SLOT_RAX: usize = 14;

/// RFLAGS bit 9: interrupt enable.
const RFLAGS_IF: u64 = 1 << 9;

extern "C" fn thread_trampoline(argc: usize, argv: *const *const u8) -> ! {
    let startup = KERNEL.lock().current_startup();
    if let Some(StartupRecord { func, .. }) = startup {
        func(argc, argv);
    }
    crate::syscall::exit_current();
}

macro_rules! trap_entry {
    ($name:ident, $handler:path) => {
        #[unsafe(naked)]
        #[no_mangle]
        pub extern "C" fn $name() {
            naked_asm!(
                "push rax",
                "push rcx",
                "push rdx",
                "push rsi",
                "push rdi",
                "push r8",
                "push r9",
                "push r10",
                "push r11",
                "push rbx",
                "push rbp",
                "push r12",
                "push r13",
                "push r14",
                "push r15",
                "cld",
                "mov rdi, rsp",
                "call {handler}",
                // the handler never returns here: it ends in `resume`,
                // which restores a (possibly different) thread's saved
                // context and `iretq`s away directly.
                "ud2",
                handler = sym $handler,
            )
        }
    };
}

trap_entry!(syscall_entry, dispatch_syscall_trap);
trap_entry!(software_error_entry, dispatch_software_error_trap);
trap_entry!(timer_entry, dispatch_timer_trap);

/// Restore registers from `ctx` and resume that thread. Never returns.
///
/// # Safety
/// `ctx` must have been produced either by a previous trap entry or by
/// [`build_initial_context_impl`], and must not be resumed by more than
/// one CPU concurrently (this kernel is single-core, so that is implicit).
pub unsafe fn dispatch(ctx: SavedContext) -> ! {
    unsafe {
        core::arch::asm!(
            "mov rsp, {0}",
            "pop r15",
            "pop r14",
            "pop r13",
            "pop r12",
            "pop rbp",
            "pop rbx",
            "pop r11",
            "pop r10",
            "pop r9",
            "pop r8",
            "pop rdi",
            "pop rsi",
            "pop rdx",
            "pop rcx",
            "pop rax",
            "iretq",
            in(reg) ctx,
            options(noreturn),
        )
    }
}

/// Select the next thread, patch in any message a `recv` it had blocked
/// on was just delivered (the out-parameters live in that thread's own
/// saved registers, §4.2/§4.4), and resume it. Never returns. Called at
/// the end of every trap handler instead of each one doing it inline.
fn resume(mut kernel: MutexGuard<'static, Kernel>) -> ! {
    let next = kernel.schedule();
    let ctx = kernel.context_of(next);
    if let Some(msg) = kernel.take_pending_message(next) {
        let words = ctx as *mut u64;
        unsafe {
            let out_size = *words.add(SLOT_RSI) as *mut usize;
            let out_payload = *words.add(SLOT_RDX) as *mut *mut u8;
            if !out_size.is_null() {
                out_size.write(msg.size);
            }
            if !out_payload.is_null() {
                out_payload.write(msg.payload.as_ptr());
            }
            words.add(SLOT_RAX).write(msg.sender.to_raw());
        }
    }
    drop(kernel);
    unsafe { dispatch(ctx) }
}

extern "C" fn dispatch_timer_trap(trap_rsp: u64) -> ! {
    let mut kernel = KERNEL.lock();
    kernel.save_current_context(trap_rsp);
    kernel.note_tick();
    unsafe { crate::boot::pic::notify_end_of_interrupt(crate::boot::idt::TIMER_VECTOR) };
    resume(kernel)
}

extern "C" fn dispatch_software_error_trap(trap_rsp: u64) -> ! {
    let mut kernel = KERNEL.lock();
    kernel.save_current_context(trap_rsp);
    kernel.enter_syscall();
    kernel.fault_current(crate::err::Fault::SoftwareError);
    resume(kernel)
}

/// Pointer-packed arguments for the `run` syscall: too many fields to
/// fit in the four argument registers the other syscalls use, so `run`
/// passes a pointer to this struct in `rdi` instead, in the spirit of
/// the reference design's single `&kz_syscall_param_t`.
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

/// Decode the trapped thread's registers into a [`Syscall`]. A syscall
/// whose own arguments fail validation (a null pointer where one is
/// required) is reported as `Err` rather than trusted or panicked on:
/// the caller turns that into a fault on the offending thread alone,
/// the same way an `int 0x81` software-error trap would (§7) — a bad
/// argument from one thread must never take down every other thread.
unsafe fn decode_syscall(words: *const u64) -> Result<Syscall, crate::err::SyscallError> {
    use crate::err::SyscallError;
    unsafe {
        let id = *words.add(SLOT_RAX);
        let a0 = *words.add(SLOT_RDI);
        let a1 = *words.add(SLOT_RSI);
        let a2 = *words.add(SLOT_RDX);
        Ok(match id {
            0 => {
                let args = &*(a0 as *const RunArgs);
                let name = core::str::from_utf8_unchecked(core::slice::from_raw_parts(args.name_ptr, args.name_len));
                Syscall::Run {
                    func: core::mem::transmute::<usize, EntryFn>(args.func),
                    name,
                    priority: args.priority,
                    stack_size: args.stack_size,
                    argc: args.argc,
                    argv: args.argv,
                }
            }
            1 => Syscall::Exit,
            2 => Syscall::Wait,
            3 => Syscall::Sleep,
            4 => Syscall::Wakeup(TaskId::from_raw(a0)),
            5 => Syscall::GetId,
            6 => Syscall::ChangePriority(if (a0 as i64) < 0 { None } else { Some(a0 as u8) }),
            7 => Syscall::KMalloc(a0 as usize),
            8 => Syscall::KMFree(NonNull::new(a0 as *mut u8).ok_or(SyscallError::InvalidFree)?),
            9 => Syscall::Send {
                mailbox: a0 as usize,
                size: a1 as usize,
                payload: NonNull::new(a2 as *mut u8).ok_or(SyscallError::InvalidPayload)?,
            },
            10 => Syscall::Recv { mailbox: a0 as usize },
            other => {
                crate::serial_println!("invalid syscall id {}", other);
                Syscall::Wait
            }
        })
    }
}

/// Write an immediately-available result back into the trapped thread's
/// saved `rax` (and, for `recv`, its out-parameter pointers in `rsi`/
/// `rdx`). A `recv` that blocked has nothing to write yet; [`resume`]
/// fills it in later, when delivery actually happens.
unsafe fn write_syscall_result(words: *mut u64, result: Result<SyscallResult, crate::err::SyscallError>) {
    unsafe {
        let rax = match result {
            Ok(SyscallResult::ThreadId(id)) => id.to_raw(),
            Ok(SyscallResult::Priority(p)) => p as u64,
            Ok(SyscallResult::Pointer(Some(p))) => p.as_ptr() as u64,
            Ok(SyscallResult::Pointer(None)) => 0,
            Ok(SyscallResult::Sent { size }) => size as u64,
            Ok(SyscallResult::Received { sender, size, payload }) => {
                let out_size = *words.add(SLOT_RSI) as *mut usize;
                let out_payload = *words.add(SLOT_RDX) as *mut *mut u8;
                if !out_size.is_null() {
                    out_size.write(size);
                }
                if !out_payload.is_null() {
                    out_payload.write(payload.as_ptr());
                }
                sender.to_raw()
            }
            Ok(SyscallResult::Unit) => 0,
            Err(_) => u64::MAX, // -1, matching the reference design's error convention
        };
        words.add(SLOT_RAX).write(rax);
    }
}

extern "C" fn dispatch_syscall_trap(trap_rsp: u64) -> ! {
    let mut kernel = KERNEL.lock();
    kernel.save_current_context(trap_rsp);
    let caller = kernel.enter_syscall();
    let words = trap_rsp as *mut u64;
    match unsafe { decode_syscall(words) } {
        Ok(call) => {
            let result = kernel.handle_syscall(caller, call);
            unsafe { write_syscall_result(words, result) };
        }
        Err(reason) => kernel.fault_current(crate::err::Fault::InvalidSyscallArgument(reason)),
    }
    resume(kernel)
}

pub(super) fn build_initial_context_impl(stack_top: *mut u8, startup: &StartupRecord, masked: bool) -> SavedContext {
    // Stack grows down; reserve the hardware IRETQ frame (5 words) plus
    // our 15 saved GPRs, 8 bytes each.
    let frame_words = SAVED_GPRS + 5;
    let base = (stack_top as u64) - (frame_words as u64) * 8;
    let words = base as *mut u64;

    // SAFETY: `stack_top` is the exclusive top of a freshly carved,
    // otherwise-unused stack region at least `frame_words * 8` bytes long.
    unsafe {
        for i in 0..SAVED_GPRS {
            words.add(i).write(0);
        }
        // argc/argv reach the trampoline as its own arguments, per the
        // SysV ABI's rdi/rsi.
        words.add(SLOT_RDI).write(startup.argc as u64);
        words.add(SLOT_RSI).write(startup.argv as u64);

        let rip = thread_trampoline as usize as u64;
        let rflags = if masked { 0 } else { RFLAGS_IF };
        words.add(SAVED_GPRS).write(rip);
        words.add(SAVED_GPRS + 1).write(0x08); // CS: kernel code segment
        words.add(SAVED_GPRS + 2).write(rflags);
        words.add(SAVED_GPRS + 3).write(stack_top as u64);
        words.add(SAVED_GPRS + 4).write(0x10); // SS: kernel data segment
    }

    base
}

pub(super) fn console_write_line_impl(args: &core::fmt::Arguments<'_>) {
    use core::fmt::Write;
    let mut serial = crate::serial::SERIAL.lock();
    serial.write_fmt(*args).ok();
    serial.write_str("\n").ok();
}
