//! x86_64 bring-up: GDT/TSS, IDT, and the legacy PIC/PIT. Everything here
//! is bare-metal glue outside THE CORE (§1); `main.rs` calls [`init`] once,
//! before creating the first thread, then enables interrupts.

pub mod gdt;
pub mod idt;
pub mod pic;

/// # Safety
/// Must run once, very early in `_start`, before any interrupt can fire
/// and before the first thread is created (thread creation registers IDT
/// addresses for the entry points this sets up).
pub unsafe fn init() {
    unsafe {
        gdt::init();
        idt::init();
        pic::remap();
        pic::init_timer();
    }
}
