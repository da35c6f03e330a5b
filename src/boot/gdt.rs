//! Minimal GDT + TSS. The kernel runs everything at ring 0 (no user/kernel
//! privilege separation, per the Non-goals); the TSS exists only to give
//! the double-fault handler its own stack.

use x86_64::instructions::tables::load_tss;
use x86_64::registers::segmentation::{Segment, CS, DS, SS};
use x86_64::structures::gdt::{Descriptor, GlobalDescriptorTable, SegmentSelector};
use x86_64::structures::tss::TaskStateSegment;
use x86_64::VirtAddr;

pub const DOUBLE_FAULT_IST_INDEX: u16 = 0;

const STACK_SIZE: usize = 8192;
static mut DOUBLE_FAULT_STACK: [u8; STACK_SIZE] = [0; STACK_SIZE];

struct Selectors {
    code: SegmentSelector,
    data: SegmentSelector,
    tss: SegmentSelector,
}

static mut TSS: TaskStateSegment = TaskStateSegment::new();
static mut GDT: Option<(GlobalDescriptorTable, Selectors)> = None;

/// Build and load the GDT and TSS, and reload the segment registers.
///
/// # Safety
/// Must be called exactly once, early in boot, before any interrupt can
/// fire (the IST stack the TSS points at must be established first).
pub unsafe fn init() {
    unsafe {
        let stack_start = VirtAddr::from_ptr(core::ptr::addr_of!(DOUBLE_FAULT_STACK));
        TSS.interrupt_stack_table[DOUBLE_FAULT_IST_INDEX as usize] = stack_start + STACK_SIZE as u64;

        let mut gdt = GlobalDescriptorTable::new();
        let code = gdt.append(Descriptor::kernel_code_segment());
        let data = gdt.append(Descriptor::kernel_data_segment());
        let tss = gdt.append(Descriptor::tss_segment(&*core::ptr::addr_of!(TSS)));
        GDT = Some((gdt, Selectors { code, data, tss }));

        let (gdt, selectors) = GDT.as_ref().unwrap();
        gdt.load();
        CS::set_reg(selectors.code);
        DS::set_reg(selectors.data);
        SS::set_reg(selectors.data);
        load_tss(selectors.tss);
    }
}
