//! Legacy 8259 PIC remap and 8253/8254 PIT programming.
//!
//! The PIT is the device backing the periodic preemption tick described
//! in §4.8: it is programmed once at boot to fire at a fixed rate and is
//! otherwise never touched again by kernel logic.

use x86_64::instructions::port::Port;

pub const PIC_1_OFFSET: u8 = 0x20;
pub const PIC_2_OFFSET: u8 = 0x28;

const PIT_CHANNEL0: u16 = 0x40;
const PIT_COMMAND: u16 = 0x43;
const PIT_FREQUENCY: u32 = 1_193_182;

/// Ticks per second for the preemption timer.
pub const TICK_HZ: u32 = 100;

/// Remap the PIC so IRQs land at `PIC_1_OFFSET..PIC_1_OFFSET+16` instead
/// of colliding with CPU exception vectors 0x00-0x0f.
///
/// # Safety
/// Must run once, before interrupts are enabled.
pub unsafe fn remap() {
    unsafe {
        let mut cmd1 = Port::<u8>::new(0x20);
        let mut data1 = Port::<u8>::new(0x21);
        let mut cmd2 = Port::<u8>::new(0xa0);
        let mut data2 = Port::<u8>::new(0xa1);

        let mask1 = data1.read();
        let mask2 = data2.read();

        cmd1.write(0x11);
        cmd2.write(0x11);
        data1.write(PIC_1_OFFSET);
        data2.write(PIC_2_OFFSET);
        data1.write(4);
        data2.write(2);
        data1.write(0x01);
        data2.write(0x01);

        data1.write(mask1 & !0x01); // unmask IRQ0 (timer)
        data2.write(mask2);
    }
}

/// Program PIT channel 0 for a periodic interrupt at [`TICK_HZ`].
///
/// # Safety
/// Must run after [`remap`].
pub unsafe fn init_timer() {
    unsafe {
        let divisor = (PIT_FREQUENCY / TICK_HZ) as u16;
        let mut command = Port::<u8>::new(PIT_COMMAND);
        let mut channel0 = Port::<u8>::new(PIT_CHANNEL0);
        command.write(0x36);
        channel0.write((divisor & 0xff) as u8);
        channel0.write((divisor >> 8) as u8);
    }
}

/// # Safety
/// `vector` must be a real IRQ vector currently being serviced.
pub unsafe fn notify_end_of_interrupt(vector: u8) {
    unsafe {
        let mut cmd2 = Port::<u8>::new(0xa0);
        let mut cmd1 = Port::<u8>::new(0x20);
        if vector >= PIC_2_OFFSET {
            cmd2.write(0x20);
        }
        cmd1.write(0x20);
    }
}
