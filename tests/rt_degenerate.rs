use pvbuf::diag::DiagKind;
use pvbuf::kernels::{MagSmear, PhaseShift};
use pvbuf::rt_alloc::RtPoolOptions;
use pvbuf::unit::UnitState;
use pvbuf::{Runtime, WorldOptions, NO_BUFFER};

fn starved_world() -> (Runtime, pvbuf::diag::DiagReceiver) {
    Runtime::new(WorldOptions {
        num_buffers: 2,
        num_local_buffers: 0,
        rt: RtPoolOptions {
            min_block_len: 8,
            num_classes: 2,
            blocks_per_class: 2,
        },
        ..WorldOptions::default()
    })
}

#[test]
fn alloc_failure_reports_once_and_stays_degenerate() {
    let _ = env_logger::builder().is_test(true).try_init();
    let (mut runtime, mut rx) = starved_world();
    // 66 samples need more than the largest 16-float block.
    runtime.shared().alloc_slot(0, 66).unwrap();
    let smear = runtime.add_unit(MagSmear, &[0.0, 2.0]);

    for _ in 0..100 {
        runtime.process_block();
    }

    assert_eq!(runtime.unit_state(smear), Ok(UnitState::Degenerate));
    assert_eq!(runtime.output(smear), Ok(NO_BUFFER));
    let diags = rx.drain();
    assert_eq!(diags.len(), 1);
    assert_eq!(diags[0].kind, DiagKind::AllocFailed);
    assert_eq!(diags[0].unit, "MagSmear");
    assert_eq!(diags[0].requested, 66);
    // The failed unit never touched the frame.
    let coord = runtime.shared().with_frame(0, |f| f.coord()).unwrap();
    assert_eq!(coord, pvbuf::Coord::Complex);
}

#[test]
fn exhausted_pool_retires_only_late_units() {
    let _ = env_logger::builder().is_test(true).try_init();
    let (mut runtime, mut rx) = starved_world();
    runtime.shared().alloc_slot(0, 14).unwrap();
    runtime.shared().alloc_slot(1, 14).unwrap();
    // 14 floats are served by the 16-float class, which holds two blocks.
    let a = runtime.add_unit(MagSmear, &[0.0, 1.0]);
    let b = runtime.add_unit(MagSmear, &[1.0, 1.0]);
    let c = runtime.add_unit(MagSmear, &[0.0, 1.0]);
    let shift = runtime.add_unit(PhaseShift, &[1.0, 0.0]);
    runtime.process_block();
    runtime.process_block();

    assert_eq!(runtime.unit_state(a), Ok(UnitState::Active));
    assert_eq!(runtime.unit_state(b), Ok(UnitState::Active));
    assert_eq!(runtime.unit_state(c), Ok(UnitState::Degenerate));
    assert_eq!(runtime.output(shift), Ok(1.0));
    assert_eq!(runtime.active_units(), 3);

    assert_eq!(rx.log_pending(), 1);
    assert_eq!(runtime.reap(), 1);
    assert!(rx.drain().is_empty());
}
