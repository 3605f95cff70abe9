//! Cancelling and timing out blocked waits.

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use reelflow_core::{EngineConfig, ReelflowError, Rgba8};
use reelflow_media::FramePainter;
use reelflow_workflow::WorkflowEvent;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::support::{self, clip, workflow_with_config, workflow_with_painter};

const STALL_AT: i64 = 3;

#[test]
fn cancel_releases_blocked_render() {
    // The painter stalls on frame STALL_AT until the gate sender is dropped.
    let (gate_tx, gate_rx) = bounded::<()>(0);
    let (stalled_tx, stalled_rx) = unbounded::<()>();
    let painter: FramePainter = Arc::new(move |_path, position, frame| {
        if position == STALL_AT {
            let _ = stalled_tx.send(());
            let _ = gate_rx.recv();
        }
        frame.fill(Rgba8::opaque(position as u8, 0, 0));
    });

    let main = workflow_with_painter(&["clip.mov"], painter);
    main.add_clip(clip("clip.mov", 0, 10), 0, 0).unwrap();
    for _ in 0..STALL_AT {
        main.get_synchrone_output().unwrap();
    }

    let result = thread::scope(|s| {
        s.spawn(|| {
            stalled_rx
                .recv_timeout(Duration::from_secs(5))
                .expect("producer never reached the stalled frame");
            main.cancel_synchronisation();
        });
        main.get_synchrone_output()
    });
    assert!(matches!(result, Err(ReelflowError::Cancelled)));
    assert_eq!(main.current_frame(), STALL_AT);

    // Cancelling again with nothing in flight is harmless.
    main.cancel_synchronisation();

    drop(gate_tx);
    let frame = main.get_synchrone_output().unwrap().unwrap();
    assert_eq!(frame.position, Some(STALL_AT));
    assert_eq!(frame.pixel(0, 0).r, STALL_AT as u8);
}

#[test]
fn stop_from_another_thread_ends_the_wait() {
    let (gate_tx, gate_rx) = bounded::<()>(0);
    let (stalled_tx, stalled_rx) = unbounded::<()>();
    let painter: FramePainter = Arc::new(move |_path, position, frame| {
        if position == 0 {
            let _ = stalled_tx.send(());
            let _ = gate_rx.recv();
        }
        frame.fill(Rgba8::WHITE);
    });

    let main = workflow_with_painter(&["clip.mov"], painter);
    main.add_clip(clip("clip.mov", 0, 10), 0, 0).unwrap();
    let events = main.subscribe();

    let result = thread::scope(|s| {
        s.spawn(|| {
            stalled_rx
                .recv_timeout(Duration::from_secs(5))
                .expect("producer never started");
            main.cancel_synchronisation();
            // The decode thread is still stuck in the painter; opening the
            // gate lets stop join it.
            drop(gate_tx);
            main.stop();
        });
        main.get_synchrone_output()
    });
    assert!(matches!(result, Err(ReelflowError::Cancelled)));
    assert_eq!(main.current_frame(), 0);
    assert!(events
        .try_iter()
        .any(|e| matches!(e, WorkflowEvent::FrameChanged(0))));
}

/// Painter that stalls on source frame `at` until the returned gate sender
/// is dropped, announcing each stall on the returned receiver.
fn gated_painter(at: i64) -> (FramePainter, Sender<()>, Receiver<()>) {
    let (gate_tx, gate_rx) = bounded::<()>(0);
    let (stalled_tx, stalled_rx) = unbounded::<()>();
    let painter: FramePainter = Arc::new(move |_path, position, frame| {
        if position == at {
            let _ = stalled_tx.send(());
            let _ = gate_rx.recv();
        }
        frame.fill(Rgba8::opaque(position as u8, 0, 0));
    });
    (painter, gate_tx, stalled_rx)
}

#[test]
fn cancelled_pause_does_not_count_as_paused() {
    let (painter, gate_tx, stalled_rx) = gated_painter(1);
    let main = workflow_with_painter(&["clip.mov"], painter);
    main.add_clip(clip("clip.mov", 0, 10), 0, 0).unwrap();
    main.get_synchrone_output().unwrap();

    assert!(main.start_render());
    stalled_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("producer never reached frame 1");

    let first = thread::scope(|s| {
        let pause = s.spawn(|| main.pause());
        // Keep cancelling until the pause gives up; its barrier may not be
        // armed yet on the first call.
        while !pause.is_finished() {
            main.cancel_synchronisation();
            thread::sleep(Duration::from_millis(10));
        }
        pause.join().unwrap()
    });
    assert!(matches!(first, Err(ReelflowError::Cancelled)));
    assert!(!main.is_paused());

    // The producer is still inside frame 1: pausing again has to wait for it.
    let gate_delay = Duration::from_millis(150);
    let started = Instant::now();
    let second = thread::scope(|s| {
        s.spawn(move || {
            thread::sleep(gate_delay);
            drop(gate_tx);
        });
        main.pause()
    });
    assert!(second.is_ok());
    assert!(started.elapsed() >= gate_delay);
    assert!(main.is_paused());

    let frame = main.get_synchrone_output().unwrap().unwrap();
    assert_eq!(frame.position, Some(1));
    assert!(!main.is_paused());
}

#[test]
fn timed_out_render_keeps_the_round() {
    let config = EngineConfig {
        render_timeout_ms: 100,
        ..support::config()
    };
    let (painter, gate_tx, stalled_rx) = gated_painter(2);
    let main = workflow_with_config(config, &["clip.mov"], painter);
    main.add_clip(clip("clip.mov", 0, 10), 0, 0).unwrap();
    for _ in 0..2 {
        main.get_synchrone_output().unwrap();
    }

    let result = main.get_synchrone_output();
    assert!(matches!(result, Err(ReelflowError::Timeout(_))));
    stalled_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("producer never reached frame 2");
    assert_eq!(main.current_frame(), 2);

    // The round is still in flight.
    assert!(main.seek(0).is_err());
    assert!(main.add_clip(clip("clip.mov", 0, 5), 1, 0).is_err());
    assert!(matches!(
        main.get_synchrone_output(),
        Err(ReelflowError::Timeout(_))
    ));

    drop(gate_tx);
    let frame = (0..50)
        .find_map(|_| match main.get_synchrone_output() {
            Err(ReelflowError::Timeout(_)) => None,
            other => Some(other),
        })
        .expect("round never completed")
        .unwrap()
        .unwrap();
    assert_eq!(frame.position, Some(2));
    assert_eq!(frame.pixel(0, 0).r, 2);
    assert_eq!(main.current_frame(), 3);
    main.seek(0).unwrap();
}
