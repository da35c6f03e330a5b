//! Compile-time kernel configuration.
//!
//! Every fixed-size kernel data structure is sized from the constants in
//! this module, in the spirit of the "kconfig" module carried by every
//! kernel in this tree.

/// Number of thread control block slots in the fixed pool.
pub const THREAD_NUM: usize = 6;

/// Number of priority levels. Priority 0 is highest and runs with
/// interrupts masked; `PRIORITY_NUM - 1` is lowest.
pub const PRIORITY_NUM: usize = 16;

/// Maximum printable thread name length, not counting the NUL terminator.
pub const THREAD_NAME_SIZE: usize = 15;

/// Number of mailbox ids.
pub const MSGBOX_ID_NUM: usize = 4;

/// Allocator size classes, in bytes. Smallest-first; `alloc` picks the
/// smallest class that fits the request.
pub const SIZE_CLASSES: [usize; 5] = [16, 32, 64, 128, 256];

/// Number of blocks pre-carved per size class at boot.
pub const BLOCKS_PER_CLASS: usize = 8;

/// Total bytes reserved for user thread stacks, carved by a bump pointer
/// that never reclaims. Must be large enough for `THREAD_NUM` stacks.
pub const STACK_REGION_SIZE: usize = 64 * 1024;

/// Default stack size handed to a thread that does not request one.
pub const DEFAULT_STACK_SIZE: usize = 4 * 1024;
