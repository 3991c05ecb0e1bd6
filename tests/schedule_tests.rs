//! Integration coverage of `RampSchedule`/`RateSchedule` through the public
//! crate surface (spec §4.2, §8's ramp/rate testable properties).

use loadforge::{RampSchedule, RampShape, RateSchedule};
use std::time::Duration;

#[test]
fn linear_ramp_never_exceeds_its_target_before_the_window_ends() {
    let ramp = RampSchedule::new(1, 100, Duration::from_secs(10), RampShape::Linear);
    for ms in (0..10_000).step_by(250) {
        let c = ramp.concurrency_at(Duration::from_millis(ms));
        assert!(c >= 1 && c <= 100, "concurrency {c} out of [1, 100] at {ms}ms");
    }
}

#[test]
fn step_ramp_produces_exactly_the_configured_number_of_distinct_levels() {
    let ramp = RampSchedule::new(0, 100, Duration::from_secs(10), RampShape::Step { steps: 5 });
    let mut levels = std::collections::BTreeSet::new();
    for ms in (0..10_000).step_by(50) {
        levels.insert(ramp.concurrency_at(Duration::from_millis(ms)));
    }
    assert_eq!(levels.len(), 5);
}

#[test]
fn ramp_saturates_at_target_past_the_window() {
    let ramp = RampSchedule::new(10, 40, Duration::from_secs(5), RampShape::Linear);
    assert_eq!(ramp.concurrency_at(Duration::from_secs(5)), 40);
    assert_eq!(ramp.concurrency_at(Duration::from_secs(500)), 40);
}

#[tokio::test(start_paused = true)]
async fn rate_schedule_permits_arrive_at_roughly_the_target_cadence_once_ramped() {
    let schedule = RateSchedule::new(1000.0, Duration::ZERO);
    let first = schedule.next_permit_instant();
    tokio::time::sleep_until(first.into()).await;

    let second = schedule.next_permit_instant();
    let gap = second.duration_since(first);
    // At 1000/s the nominal gap is 1ms; allow generous slack for scheduling jitter.
    assert!(gap >= Duration::from_micros(500) && gap <= Duration::from_millis(5), "gap was {gap:?}");
}

#[test]
fn rollback_is_exactly_offset_by_a_matching_permit_claim() {
    let schedule = RateSchedule::new(10.0, Duration::ZERO);
    let interval_ns = (1_000_000_000.0 / 10.0) as u64;
    let _ = schedule.next_permit_instant();
    schedule.rollback(interval_ns);
    // A second claim right after rollback should land back near the first.
    let reclaimed = schedule.next_permit_instant();
    let fresh = RateSchedule::new(10.0, Duration::ZERO).next_permit_instant();
    assert!(reclaimed.duration_since(fresh) < Duration::from_millis(50));
}
