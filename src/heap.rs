//! Global allocator for the firmware, backed by a static arena.

use core::alloc::{GlobalAlloc, Layout};
use core::cell::UnsafeCell;
use core::mem::MaybeUninit;
use core::sync::atomic::{AtomicBool, Ordering};

use embedded_alloc::LlffHeap as Heap;

/// Size of the heap arena in bytes.
pub const HEAP_SIZE: usize = 64 * 1024;

/// Allocator that owns its arena, handed to the allocator on the first [`FirmwareHeap::init`].
pub struct FirmwareHeap<const N: usize> {
    heap: Heap,
    arena: UnsafeCell<[MaybeUninit<u8>; N]>,
    initialised: AtomicBool,
}

// safety: the arena is only touched through the heap, which serialises access with a critical section.
unsafe impl<const N: usize> Sync for FirmwareHeap<N> {}

impl<const N: usize> FirmwareHeap<N> {
    pub const fn new() -> Self {
        Self {
            heap: Heap::empty(),
            arena: UnsafeCell::new([MaybeUninit::uninit(); N]),
            initialised: AtomicBool::new(false),
        }
    }

    /// Hand the arena to the allocator, returns false if that already happened.
    pub fn init(&self) -> bool {
        if self.initialised.swap(true, Ordering::AcqRel) {
            return false;
        }
        // safety: the flag above guarantees the arena is handed out exactly once.
        unsafe { self.heap.init(self.arena.get() as usize, N) }
        true
    }

    /// Bytes currently available for allocation, zero before [`FirmwareHeap::init`].
    pub fn free_bytes(&self) -> u32 {
        u32::try_from(self.heap.free()).unwrap_or(u32::MAX)
    }
}

unsafe impl<const N: usize> GlobalAlloc for FirmwareHeap<N> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        unsafe { self.heap.alloc(layout) }
    }
    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        unsafe { self.heap.dealloc(ptr, layout) }
    }
}

#[cfg(target_arch = "arm")]
#[global_allocator]
static HEAP: FirmwareHeap<HEAP_SIZE> = FirmwareHeap::new();

/// Initialise the global heap, returns false if it already was.
#[cfg(target_arch = "arm")]
pub fn init() -> bool {
    HEAP.init()
}

/// Free bytes in the global heap.
#[cfg(target_arch = "arm")]
pub fn free_bytes() -> u32 {
    HEAP.free_bytes()
}
