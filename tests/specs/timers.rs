// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Timer scenarios: one-shot fire/stop and periodic interleaving.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;
use yn_yev::{YevLoop, YevType};

/// A one-shot timer fires once with a non-negative result; stopping the
/// completed entry still yields exactly one STOPPED completion with a
/// negative result, and the loop terminates cleanly.
#[tokio::test]
async fn one_shot_fires_and_stops() {
    let mut yev = YevLoop::new();
    let fires = Arc::new(Mutex::new(Vec::<(i32, bool)>::new()));
    let fires_cb = fires.clone();
    let started = Instant::now();
    let delay_ms = 100u64;

    let timer = yev.create_timer(move |yev, ev| {
        assert_eq!(ev.kind, YevType::Timer);
        fires_cb.lock().push((ev.result, ev.is_stopped()));
        if ev.is_stopped() {
            yev.stop_loop();
        } else {
            let _ = yev.stop(ev.id);
        }
    });
    yev.timer_start(timer, delay_ms, false).unwrap();
    yev.run().await;

    let fires = fires.lock();
    assert_eq!(fires.len(), 2);
    assert!(fires[0].0 >= 0);
    assert!(!fires[0].1);
    assert!(fires[1].0 < 0);
    assert!(fires[1].1);
    let elapsed = started.elapsed().as_millis() as u64;
    assert!(elapsed >= delay_ms, "fired after ~{delay_ms} ms, got {elapsed}");
}

/// A re-arming one-shot and a periodic timer interleave; stopping the
/// one-shot on the third periodic tick yields exactly one STOPPED for it
/// while the periodic keeps ticking.
#[tokio::test]
async fn periodic_and_one_shot_interleave() {
    let mut yev = YevLoop::new();

    #[derive(Default)]
    struct Counters {
        one_shot: u32,
        one_shot_stopped: u32,
        periodic_before_stop: u32,
        periodic_after_stop: u32,
    }
    let counters = Arc::new(Mutex::new(Counters::default()));
    let one_shot_alive = Arc::new(Mutex::new(None::<yn_yev::YevId>));

    let counters_os = counters.clone();
    let one_shot = yev.create_timer(move |yev, ev| {
        let mut c = counters_os.lock();
        if ev.is_stopped() {
            c.one_shot_stopped += 1;
            return;
        }
        c.one_shot += 1;
        drop(c);
        // one-shot re-arms itself until stopped
        let _ = yev.start(ev.id);
    });
    yev.timer_start(one_shot, 20, false).unwrap();
    *one_shot_alive.lock() = Some(one_shot);

    let counters_p = counters.clone();
    let one_shot_ref = one_shot_alive.clone();
    let periodic = yev.create_timer(move |yev, ev| {
        if ev.is_stopped() {
            yev.stop_loop();
            return;
        }
        let mut c = counters_p.lock();
        let stopped_already = c.one_shot_stopped > 0;
        if stopped_already {
            c.periodic_after_stop += 1;
            // two more ticks after the stop prove the periodic survives
            if c.periodic_after_stop == 2 {
                drop(c);
                let _ = yev.stop(ev.id);
            }
            return;
        }
        c.periodic_before_stop += 1;
        if c.periodic_before_stop == 3 {
            drop(c);
            if let Some(id) = *one_shot_ref.lock() {
                let _ = yev.stop(id);
            }
        }
    });
    yev.timer_start(periodic, 70, true).unwrap();
    yev.run().await;

    let c = counters.lock();
    assert!(c.one_shot >= 3, "one-shot re-armed several times, got {}", c.one_shot);
    assert_eq!(c.one_shot_stopped, 1, "exactly one STOPPED for the one-shot");
    assert_eq!(c.periodic_before_stop, 3);
    assert_eq!(c.periodic_after_stop, 2, "periodic ticks continue after the stop");
}
