use pvbuf::kernels::{Add, MagAbove, MagMul, MagSmear, PhaseShift};
use pvbuf::{Complex, Runtime, WorldOptions};
use std::alloc::{GlobalAlloc, Layout};
use std::cell::RefCell;

thread_local! {
    static ALLOC_COUNT: RefCell<usize> = RefCell::new(0);
}

struct CountingAllocator;

unsafe impl GlobalAlloc for CountingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        ALLOC_COUNT.with(|c| *c.borrow_mut() += 1);
        unsafe { std::alloc::System.alloc(layout) }
    }
    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        unsafe { std::alloc::System.dealloc(ptr, layout) }
    }
}

#[global_allocator]
static A: CountingAllocator = CountingAllocator;

fn allocs() -> usize {
    ALLOC_COUNT.with(|c| *c.borrow())
}

#[test]
fn rt_alloc_invariant() {
    let (mut runtime, _rx) = Runtime::new(WorldOptions {
        num_buffers: 8,
        num_local_buffers: 2,
        ..WorldOptions::default()
    });
    let bins: Vec<Complex> = (0..255).map(|i| Complex::new(i as f32, 1.0)).collect();
    for slot in 0..4 {
        runtime.shared().alloc_slot(slot, 512).unwrap();
        runtime
            .shared()
            .with_frame(slot, |f| f.load_complex(1.0, 0.5, &bins))
            .unwrap();
    }
    runtime.add_unit(MagMul, &[0.0, 1.0]);
    runtime.add_unit(Add, &[2.0, 3.0]);
    runtime.add_unit(MagAbove, &[1.0, 3.0]);
    runtime.add_unit(PhaseShift, &[3.0, 0.01]);
    runtime.add_unit(MagSmear, &[2.0, 4.0]);
    // Stale and invalid handles take the fallback and sentinel paths.
    runtime.add_unit(PhaseShift, &[1e9, 0.0]);
    runtime.add_unit(PhaseShift, &[-1.0, 0.0]);

    let after_setup = allocs();
    for _ in 0..10_000 {
        runtime.process_block();
    }
    assert_eq!(
        allocs(),
        after_setup,
        "process_block should not allocate"
    );
    // The scratch block came out of the real-time pool.
    assert_eq!(runtime.rt_pool().in_use(), 1);
}
