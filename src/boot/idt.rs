//! Software vector table: the x86 IDT entries this kernel actually uses.
//!
//! Three vectors carry the kernel's own "software vector table" (§3):
//! 0x80 for syscalls, 0x81 for a thread deliberately raising a
//! software-error trap, and the PIT's remapped IRQ0 vector for the
//! preemption tick (§4.8). Vector 14 (Page Fault) is left to its own
//! dedicated `idt.page_fault` entry rather than being repurposed: this
//! boot path runs in long mode with paging enabled (Limine hands off
//! with a page table already live), so a real #PF can and does fire —
//! from a wild pointer decoded off a syscall's registers, a demo bug, or
//! any other genuinely invalid access — in addition to whatever the
//! kernel's own software-error vector carries. The CPU double fault is
//! wired separately, onto its own IST stack, purely so a bug in this
//! kernel halts with a message instead of silently triple-faulting the
//! board; a real page fault gets the same treatment, since this kernel
//! has no virtual memory or demand-paging support to recover one into
//! (Non-goals, §1) — it is a kernel bug, not a per-thread fault.

use x86_64::structures::idt::{InterruptDescriptorTable, InterruptStackFrame, PageFaultErrorCode};
use x86_64::VirtAddr;

use super::gdt::DOUBLE_FAULT_IST_INDEX;
use super::pic::PIC_1_OFFSET;

static mut IDT: InterruptDescriptorTable = InterruptDescriptorTable::new();

pub const TIMER_VECTOR: u8 = PIC_1_OFFSET;
pub const SOFTWARE_ERROR_VECTOR: u8 = 0x81;
pub const SYSCALL_VECTOR: u8 = 0x80;

extern "x86-interrupt" fn double_fault_handler(frame: InterruptStackFrame, _code: u64) -> ! {
    crate::serial_println!("double fault: {:#?}", frame);
    loop {
        x86_64::instructions::hlt();
    }
}

extern "x86-interrupt" fn page_fault_handler(frame: InterruptStackFrame, code: PageFaultErrorCode) {
    let addr = x86_64::registers::control::Cr2::read_raw();
    crate::serial_println!("page fault at {:#x} (code {:?}): {:#?}", addr, code, frame);
    loop {
        x86_64::instructions::hlt();
    }
}

/// Build the IDT and load it.
///
/// # Safety
/// Must be called once after [`super::gdt::init`], so the double-fault
/// IST index refers to a loaded TSS.
pub unsafe fn init() {
    unsafe {
        IDT.double_fault.set_handler_fn(double_fault_handler).set_stack_index(DOUBLE_FAULT_IST_INDEX);
        IDT.page_fault.set_handler_fn(page_fault_handler);
        IDT[SOFTWARE_ERROR_VECTOR as usize].set_handler_addr(VirtAddr::new(crate::arch::software_error_entry as usize as u64));
        IDT[TIMER_VECTOR as usize].set_handler_addr(VirtAddr::new(crate::arch::timer_entry as usize as u64));
        IDT[SYSCALL_VECTOR as usize].set_handler_addr(VirtAddr::new(crate::arch::syscall_entry as usize as u64));
        (&*core::ptr::addr_of!(IDT)).load();
    }
}
