#![no_std]
#![no_main]

mod demos;
mod syslib;

use limine::request::FramebufferRequest;

/// Unused by the kernel itself; kept only because Limine expects at
/// least one real request to find its base-revision marker nearby, the
/// same role it played in this crate's starting point.
#[used]
#[link_section = ".requests"]
static FRAMEBUFFER_REQUEST: FramebufferRequest = FramebufferRequest::new();

/// Runs as the dispatched initial thread, mirroring the reference
/// design's `start_threads`: only once this thread actually has a
/// `current` (set by `Kernel::start` below) is it safe to issue the
/// real `int 0x80` traps `demos::spawn_all` uses to create the rest of
/// the system's threads. It then demotes its own priority to the
/// lowest in the system and becomes the idle loop itself. `chpri` never
/// touches the saved interrupt-mask bit (only thread creation encodes
/// it), so interrupts are enabled here explicitly, same as the
/// reference design's separate `INTR_ENABLE` after `kz_chpri`.
fn boot_entry(_argc: usize, _argv: *const *const u8) {
    demos::spawn_all();
    syslib::chpri(Some(demos::IDLE_PRIORITY));
    x86_64::instructions::interrupts::enable();
    loop {
        x86_64::instructions::hlt();
    }
}

/// Kernel entry point called by the Limine bootloader.
#[no_mangle]
pub extern "C" fn _start() -> ! {
    kozos_kernel::serial::SERIAL.lock().init();
    kozos_kernel::serial_println!("kozos-kernel starting");

    let _ = FRAMEBUFFER_REQUEST.get_response();

    unsafe { kozos_kernel::boot::init() };

    // Mirrors `kz_start`: the one initial thread is created directly
    // (no trap available yet) and becomes `current` as a side effect,
    // so it can safely issue real syscalls the moment it's dispatched.
    let initial = kozos_kernel::kernel::KERNEL.lock().start(
        boot_entry,
        "idle",
        0,
        kozos_kernel::config::DEFAULT_STACK_SIZE,
        0,
        core::ptr::null(),
    );

    kozos_kernel::serial_println!("dispatching initial thread");
    let ctx = kozos_kernel::kernel::KERNEL.lock().context_of(initial);
    unsafe { kozos_kernel::arch::dispatch(ctx) }
}
