//! Integration tests for the operator pipeline over cold scripted sources.
//!
//! Everything here runs on tokio's paused clock, so the timed pauses in
//! the demo scripts resolve instantly and deterministically. Where the
//! schedule matters the tests assert full `(elapsed_ms, value)` logs, not
//! just the values.

mod common;

use common::Recorder;
use runnel::cancel::Canceller;
use runnel::emissions::Delivery;
use runnel::error::StreamError;
use runnel::sequences::{countdown, meal_courses, pair, successors, COUNTDOWN_STEP, PAIR_GAP};
use runnel::source::ColdSource;
use std::time::Duration;

const EATING_TIME: Duration = Duration::from_millis(300);

// =============================================================================
// Cold sequence scheduling
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_countdown_ticks_from_five_to_zero_on_schedule() {
    let recorder = Recorder::new();
    let sink = recorder.clone();

    countdown(5, COUNTDOWN_STEP)
        .subscribe()
        .collect_each(move |value| sink.record(value))
        .await
        .expect("countdown run");

    assert_eq!(
        recorder.entries(),
        vec![(0, 5), (250, 4), (500, 3), (750, 2), (1000, 1), (1250, 0)]
    );
}

#[tokio::test(start_paused = true)]
async fn test_each_subscription_restarts_the_countdown() {
    let source = countdown(2, Duration::from_millis(100));

    let first = source.subscribe().collect_values().await;
    let second = source.subscribe().collect_values().await;

    assert_eq!(first, Ok(vec![2, 1, 0]));
    assert_eq!(second, Ok(vec![2, 1, 0]));
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_interrupts_a_pending_pause() {
    let canceller = Canceller::new();
    let token = canceller.token();

    let recorder = Recorder::new();
    let sink = recorder.clone();
    let consumer = tokio::spawn(async move {
        countdown(5, COUNTDOWN_STEP)
            .subscribe()
            .until_cancelled(token)
            .collect_each(move |value| sink.record(value))
            .await
    });

    // three ticks land, then the owner tears down mid-pause
    tokio::time::sleep(Duration::from_millis(600)).await;
    canceller.cancel();

    assert_eq!(consumer.await.expect("join"), Err(StreamError::Cancelled));
    assert_eq!(recorder.entries(), vec![(0, 5), (250, 4), (500, 3)]);
}

// =============================================================================
// Operators and terminals
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_even_squares_chain_preserves_order() {
    let tapped = Recorder::new();
    let sink = tapped.clone();

    let squares = countdown(5, COUNTDOWN_STEP)
        .subscribe()
        .filter(|value| value % 2 == 0)
        .map(|value| value * value)
        .on_each(move |square| sink.record(*square))
        .collect_values()
        .await
        .expect("chain run");

    assert_eq!(squares, vec![16, 4, 0]);
    assert_eq!(tapped.entries(), vec![(250, 16), (750, 4), (1250, 0)]);
}

#[tokio::test(start_paused = true)]
async fn test_count_where_agrees_with_materialized_filter() {
    let evens = countdown(5, COUNTDOWN_STEP)
        .subscribe()
        .count_where(|value| value % 2 == 0)
        .await
        .expect("count run");

    let filtered = countdown(5, COUNTDOWN_STEP)
        .subscribe()
        .filter(|value| value % 2 == 0)
        .collect_values()
        .await
        .expect("filter run");

    assert_eq!(evens, filtered.len());
    assert_eq!(filtered, vec![4, 2, 0]);
}

#[tokio::test(start_paused = true)]
async fn test_odd_sum_reduce_and_seeded_fold() {
    let reduced = countdown(5, COUNTDOWN_STEP)
        .subscribe()
        .filter(|value| value % 2 == 1)
        .reduce(|acc, value| acc + value)
        .await;
    assert_eq!(reduced, Ok(9));

    let folded = countdown(5, COUNTDOWN_STEP)
        .subscribe()
        .filter(|value| value % 2 == 1)
        .fold(100, |acc, value| acc + value)
        .await;
    assert_eq!(folded, Ok(109));
}

#[tokio::test(start_paused = true)]
async fn test_empty_source_seeds_fold_but_fails_reduce() {
    let empty = ColdSource::<i64>::new(|_| {});

    let folded = empty.subscribe().fold(100, |acc, value| acc + value).await;
    assert_eq!(folded, Ok(100));

    let reduced = empty.subscribe().reduce(|acc, value| acc + value).await;
    assert_eq!(reduced, Err(StreamError::EmptyReduction));
}

#[tokio::test(start_paused = true)]
async fn test_production_failure_terminates_the_pipeline() {
    let source = ColdSource::new(|script| {
        script.emit(1);
        script.pause(Duration::from_millis(100));
        script.emit_with(|| Err(StreamError::production("script step failed")));
        script.emit(3);
    });

    let seen = Recorder::new();
    let sink = seen.clone();
    let result = source
        .subscribe()
        .map(|value| value * 10)
        .on_each(move |value| sink.record(*value))
        .collect_values()
        .await;

    // the failure surfaces unmasked and nothing after it is produced
    assert_eq!(result, Err(StreamError::production("script step failed")));
    assert_eq!(seen.entries(), vec![(0, 10)]);
}

// =============================================================================
// Flattening
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_concat_flattening_drains_nested_runs_in_turn() {
    let recorder = Recorder::new();
    let sink = recorder.clone();

    pair(PAIR_GAP)
        .subscribe()
        .flatten_concat(|value| successors(value, PAIR_GAP))
        .collect_each(move |value| sink.record(value))
        .await
        .expect("concat run");

    // both emissions of the first nested run precede the second run's,
    // and the outer pause only starts once the first run is drained
    assert_eq!(
        recorder.entries(),
        vec![(0, 2), (250, 3), (500, 3), (750, 4)]
    );
}

#[tokio::test(start_paused = true)]
async fn test_merge_flattening_orders_by_emission_time() {
    let recorder = Recorder::new();
    let sink = recorder.clone();

    pair(PAIR_GAP)
        .subscribe()
        .flatten_merge(|value| successors(value, PAIR_GAP))
        .collect_each(move |value| sink.record(value))
        .await
        .expect("merge run");

    let entries = recorder.entries();
    assert_eq!(entries.first(), Some(&(0, 2)));
    assert_eq!(entries.last(), Some(&(500, 4)));

    // the two middle threes land together at 250, in either order
    let mut values: Vec<i64> = entries.iter().map(|(_, value)| *value).collect();
    values.sort_unstable();
    assert_eq!(values, vec![2, 3, 3, 4]);
    assert!(entries.iter().all(|(at, _)| [0, 250, 500].contains(at)));
}

#[tokio::test(start_paused = true)]
async fn test_latest_flattening_cancels_the_superseded_run() {
    let recorder = Recorder::new();
    let sink = recorder.clone();

    pair(PAIR_GAP)
        .subscribe()
        .flatten_latest(|value| successors(value, PAIR_GAP))
        .collect_each(move |value| sink.record(value))
        .await
        .expect("latest run");

    // the first run's trailing 3 is abandoned when the outer 2 arrives
    assert_eq!(recorder.entries(), vec![(0, 2), (250, 3), (500, 4)]);
}

// =============================================================================
// Delivery policies
// =============================================================================

/// Eat each course for 300ms, recording when eating starts.
async fn eat_courses(policy: Delivery, started: Recorder<&'static str>) {
    meal_courses()
        .subscribe()
        .consume(policy, move |course| {
            let started = started.clone();
            async move {
                started.record(course);
                tokio::time::sleep(EATING_TIME).await;
            }
        })
        .await
        .expect("meal run");
}

#[tokio::test(start_paused = true)]
async fn test_buffered_meals_are_all_eaten_in_serving_order() {
    let started = Recorder::new();
    eat_courses(Delivery::Buffer, started.clone()).await;

    // courses are served at 50/250/270 and queue up behind the eater
    assert_eq!(
        started.entries(),
        vec![(50, "Appetizer"), (350, "Main Dish"), (650, "Dessert")]
    );
}

#[tokio::test(start_paused = true)]
async fn test_conflated_meals_skip_the_stale_course() {
    let started = Recorder::new();
    eat_courses(Delivery::Conflate, started.clone()).await;

    // the main dish is overwritten by dessert while the appetizer is
    // still being eaten; the final course is never lost
    assert_eq!(started.entries(), vec![(50, "Appetizer"), (350, "Dessert")]);
}

#[tokio::test(start_paused = true)]
async fn test_latest_meals_abandon_eating_on_each_arrival() {
    let started = Recorder::new();
    let finished = Recorder::new();
    let start_sink = started.clone();
    let finish_sink = finished.clone();

    meal_courses()
        .subscribe()
        .consume(Delivery::Latest, move |course| {
            let start_sink = start_sink.clone();
            let finish_sink = finish_sink.clone();
            async move {
                start_sink.record(course);
                tokio::time::sleep(EATING_TIME).await;
                finish_sink.record(course);
            }
        })
        .await
        .expect("meal run");

    // every course starts as it arrives, only the last finishes
    assert_eq!(
        started.entries(),
        vec![(50, "Appetizer"), (250, "Main Dish"), (270, "Dessert")]
    );
    assert_eq!(finished.entries(), vec![(570, "Dessert")]);
}

#[tokio::test(start_paused = true)]
async fn test_buffer_never_blocks_the_producer() {
    let served = Recorder::new();
    let serve_sink = served.clone();

    meal_courses()
        .subscribe()
        .on_each(move |course| serve_sink.record(*course))
        .consume(Delivery::Buffer, |_course| async {
            tokio::time::sleep(EATING_TIME).await;
        })
        .await
        .expect("meal run");

    // the producer keeps its own schedule regardless of the slow eater
    assert_eq!(
        served.entries(),
        vec![(50, "Appetizer"), (250, "Main Dish"), (270, "Dessert")]
    );
}

/// Serve numbered courses 100ms apart into a slow eater, then drop the
/// eater while the kitchen sits in its first pause. Returns the serving
/// log.
async fn servings_after_the_eater_leaves(policy: Delivery) -> Vec<(u64, i64)> {
    let served = Recorder::new();
    let serve_sink = served.clone();

    let courses = ColdSource::new(|script| {
        script.emit(1);
        script.pause(Duration::from_millis(100));
        script.emit(2);
        script.pause(Duration::from_millis(100));
        script.emit(3);
    });

    let eater = tokio::spawn(
        courses
            .subscribe()
            .on_each(move |course| serve_sink.record(*course))
            .consume(policy, |_course| async {
                tokio::time::sleep(Duration::from_secs(10)).await;
            }),
    );

    tokio::time::sleep(Duration::from_millis(10)).await;
    eater.abort();
    let _ = eater.await;

    // a relay still holding the subscription would serve again at 100ms
    tokio::time::sleep(Duration::from_millis(300)).await;
    served.entries()
}

#[tokio::test(start_paused = true)]
async fn test_buffer_stops_serving_once_the_eater_is_dropped() {
    let served = servings_after_the_eater_leaves(Delivery::Buffer).await;
    assert_eq!(served, vec![(0, 1)]);
}

#[tokio::test(start_paused = true)]
async fn test_conflate_stops_serving_once_the_eater_is_dropped() {
    let served = servings_after_the_eater_leaves(Delivery::Conflate).await;
    assert_eq!(served, vec![(0, 1)]);
}
