//! The demo sequences.
//!
//! Concrete cold sources used by the coordinator demos and the
//! integration tests: a countdown, a two-value pair, a meal with uneven
//! preparation pauses, and the successor sequence the flattening demos
//! nest under each pair value.

use std::time::Duration;

use crate::source::ColdSource;

/// Default countdown start value.
pub const COUNTDOWN_START: i64 = 5;

/// Default pacing between countdown ticks.
pub const COUNTDOWN_STEP: Duration = Duration::from_millis(250);

/// Default gap inside [`pair`] and [`successors`].
pub const PAIR_GAP: Duration = Duration::from_millis(250);

/// Countdown from `start` to zero inclusive, one value per `step`.
///
/// The first value is emitted immediately on subscription. A `start`
/// below zero yields that single value and completes.
pub fn countdown(start: i64, step: Duration) -> ColdSource<i64> {
    ColdSource::new(|script| {
        let mut current = start;
        loop {
            script.emit(current);
            if current <= 0 {
                break;
            }
            current -= 1;
            script.pause(step);
        }
    })
}

/// `1`, a pause of `gap`, then `2`.
pub fn pair(gap: Duration) -> ColdSource<i64> {
    ColdSource::new(|script| {
        script.emit(1);
        script.pause(gap);
        script.emit(2);
    })
}

/// The two successors of `value`, separated by `gap`.
pub fn successors(value: i64, gap: Duration) -> ColdSource<i64> {
    ColdSource::new(move |script| {
        script.emit(value + 1);
        script.pause(gap);
        script.emit(value + 2);
    })
}

/// Three meal courses, each preceded by its preparation pause.
pub fn meal_courses() -> ColdSource<&'static str> {
    ColdSource::new(|script| {
        script.pause(Duration::from_millis(50));
        script.emit("Appetizer");
        script.pause(Duration::from_millis(200));
        script.emit("Main Dish");
        script.pause(Duration::from_millis(20));
        script.emit("Dessert");
    })
}
