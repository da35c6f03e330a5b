//! System-fatal handling.
//!
//! `system_down` is the kernel's single unrecoverable exit: print an
//! epitaph to the console and halt with interrupts disabled. Nothing
//! calls it speculatively — every call site corresponds to one of the
//! three invariant violations named in [`crate::err::SystemDownReason`].

use crate::err::SystemDownReason;

/// Print an epitaph and halt forever. Does not return.
pub fn system_down(reason: SystemDownReason) -> ! {
    crate::serial_println!("system down: {}", reason);
    halt_forever()
}

#[cfg(not(test))]
fn halt_forever() -> ! {
    loop {
        x86_64::instructions::interrupts::disable();
        x86_64::instructions::hlt();
    }
}

#[cfg(test)]
fn halt_forever() -> ! {
    panic!("system down");
}
