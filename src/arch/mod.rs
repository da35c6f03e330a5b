//! Architecture boundary.
//!
//! The portable kernel core never looks inside a [`SavedContext`] — it
//! only stores the value a thread had last time it trapped in, and hands
//! it back to [`dispatch`] to resume. Everything that *produces* or
//! *consumes* a `SavedContext` is architecture-specific and lives in one
//! of the two modules below, selected by `cfg`, following the split used
//! by the `kern::arch` module in this tree's reference kernel.

use crate::task::StartupRecord;

/// Saved execution state for a suspended thread. On x86_64 this is simply
/// the stack pointer: every other register lives on the thread's own
/// stack, pushed by the trap entry and popped by [`dispatch`].
pub type SavedContext = u64;

cfg_if::cfg_if! {
    if #[cfg(not(test))] {
        mod hw;
        pub use hw::*;
    } else {
        mod sim;
        pub use sim::*;
    }
}

/// Build the initial saved context for a brand-new thread: as if it had
/// trapped in just before running `startup.func(startup.argc, startup.argv)`
/// and then invoking `exit` on return. `masked` encodes priority 0's
/// "interrupts stay off for this thread" contract into the synthesized
/// status word.
pub fn build_initial_context(stack_top: *mut u8, startup: &StartupRecord, masked: bool) -> SavedContext {
    build_initial_context_impl(stack_top, startup, masked)
}

/// Write a line of kernel diagnostic output to the console.
pub fn console_write_line(line: &core::fmt::Arguments<'_>) {
    console_write_line_impl(line);
}
