//! Kernel error types.
//!
//! Three tiers, matching the error-handling design: recoverable errors are
//! returned to the offending syscall, thread-fatal errors fault the calling
//! thread and let the rest of the system continue, and system-fatal errors
//! go through [`crate::fault::system_down`] and never return.

use core::fmt;

/// Errors a syscall can report back to its caller without disturbing any
/// other thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyscallError {
    /// `run` found no free thread control block.
    ThreadTableFull,
    /// `kmalloc` found no free block in any size class that fits.
    OutOfMemory,
    /// The requested size exceeds the largest size class.
    RequestTooLarge,
    /// `kmfree` (or an internal free) was given a pointer that does not
    /// point at a block header this allocator produced.
    InvalidFree,
    /// A mailbox id outside `0..MSGBOX_ID_NUM`.
    InvalidMailbox,
    /// A thread id that no longer names a live thread (stale generation).
    InvalidThreadId,
    /// `send` was given a null payload pointer.
    InvalidPayload,
}

impl fmt::Display for SyscallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            SyscallError::ThreadTableFull => "thread table full",
            SyscallError::OutOfMemory => "out of memory",
            SyscallError::RequestTooLarge => "request too large",
            SyscallError::InvalidFree => "invalid free",
            SyscallError::InvalidMailbox => "invalid mailbox id",
            SyscallError::InvalidThreadId => "invalid thread id",
            SyscallError::InvalidPayload => "invalid payload pointer",
        };
        f.write_str(msg)
    }
}

/// A fault that removes a single thread but leaves the kernel running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// The thread trapped into the software-error vector (e.g. an invalid
    /// memory access, an illegal instruction).
    SoftwareError,
    /// A syscall argument failed validation (e.g. a null pointer where
    /// one is required) before the kernel could act on the call at all.
    /// Treated the same as a software-error trap: only the offending
    /// thread is removed, the rest of the system keeps running.
    InvalidSyscallArgument(SyscallError),
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fault::SoftwareError => f.write_str("software error"),
            Fault::InvalidSyscallArgument(reason) => write!(f, "invalid syscall argument: {reason}"),
        }
    }
}

/// A violated system invariant. Every variant is handled identically (print
/// an epitaph, halt) but is kept distinct so tests can assert on *which*
/// invariant broke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemDownReason {
    /// A second receiver tried to wait on a mailbox that already has one.
    DoubleReceiver,
    /// A mailbox needed to allocate a message descriptor and the heap was
    /// exhausted.
    MailboxAllocFailed,
    /// Every ready queue was empty when the scheduler ran.
    NoRunnableThread,
}

impl fmt::Display for SystemDownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            SystemDownReason::DoubleReceiver => "mailbox already has a receiver",
            SystemDownReason::MailboxAllocFailed => "mailbox message allocation failed",
            SystemDownReason::NoRunnableThread => "no runnable thread",
        };
        f.write_str(msg)
    }
}
