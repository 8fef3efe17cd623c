mod helpers;

use helpers::{event_json, exec, exec_with, run, run_values, series};
use proptest::prelude::*;
use rhythmix_eval::{Compiler, Event, FilterUdf, MeetUdf, NameCounter, UdfRegistry, Value};
use serde_json::json;

// =============================================================================
// count
// =============================================================================

#[test]
fn strict_count_needs_consecutive_hits() {
    let results = run_values("count!(>4,3)", &[11, 11, 1, 11, 11, 11]);
    assert_eq!(results, [false, false, false, false, false, true]);
}

#[test]
fn cumulative_count_ignores_misses() {
    let results = run_values("count(>4,3)", &[11, 11, 1, 11, 11, 11]);
    assert_eq!(results, [false, false, false, true, false, false]);
}

#[test]
fn cumulative_or_strict_count_tracks_both_counters() {
    let results = run_values("count(>4,3) || count!(>4,3)", &[11, 11, 1, 11, 11, 11]);
    assert_eq!(results, [false, false, false, true, false, false]);
}

#[test]
fn count_with_bound_variables() {
    let mut e = exec_with(
        "count(>floor, n)",
        &[("floor", Value::Int(4)), ("n", Value::Int(2))],
    );
    assert_eq!(run(&mut e, &series(&[5, 3, 9], 10)), [false, false, true]);
}

#[test]
fn count_over_udf_predicate() {
    let results = run_values("count(positiveFilter, 2)", &["abc", "5", "x", "7"]);
    assert_eq!(results, [false, false, false, true]);
}

#[test]
fn negated_compare_in_conjunction() {
    let results = run_values("count(>4,2) && !(<0)", &[5, -1, 5, 5]);
    assert_eq!(results, [false, false, true, false]);
}

// =============================================================================
// slope / delay / keep
// =============================================================================

#[test]
fn slope_needs_two_samples() {
    let mut e = exec("slope(>4,50ms)");
    assert!(!e.execute(&Event::at(0, 0)).unwrap());
    // 10 per 100ms is 5 per 50ms
    assert!(e.execute(&Event::at(100, 10)).unwrap());
}

#[test]
fn slope_without_window_is_never_true() {
    let results = run_values("slope(>4)", &[0, 100, 1000, 100000]);
    assert!(results.iter().all(|r| !r));
}

#[test]
fn slope_batch_compares_consecutive_pairs() {
    let mut e = exec("slope(>4,50ms)");
    // the steep first pair does not decide, the flat last one does
    let flat_tail = [Event::at(0, 0), Event::at(100, 100), Event::at(200, 105)];
    assert!(!e.execute_batch(&flat_tail).unwrap());

    let mut e = exec("slope(>4,50ms)");
    let steep_tail = [Event::at(0, 0), Event::at(100, 1), Event::at(200, 20)];
    assert!(e.execute_batch(&steep_tail).unwrap());
}

#[test]
fn slope_ignores_non_numeric_samples() {
    let mut e = exec("slope(>4,50ms)");
    assert!(!e.execute(&Event::at(0, 0)).unwrap());
    assert!(!e.execute(&Event::at(50, "offline")).unwrap());
    // the rate is measured against the last numeric sample
    assert!(e.execute(&Event::at(100, 10)).unwrap());
}

#[test]
fn slope_same_timestamp_is_false() {
    let mut e = exec("slope(>4,50ms)");
    assert!(!e.execute(&Event::at(0, 0)).unwrap());
    assert!(!e.execute(&Event::at(0, 100)).unwrap());
}

#[test]
fn delay_fires_after_duration() {
    let mut e = exec("delay(100ms)");
    let events = [Event::at(0, 1), Event::at(50, 1), Event::at(110, 1), Event::at(120, 1)];
    assert_eq!(run(&mut e, &events), [false, false, true, false]);
}

#[test]
fn keep_requires_uninterrupted_run() {
    let mut e = exec("keep(>4, 200ms)");
    let events = [
        Event::at(0, 5),
        Event::at(100, 6),
        Event::at(200, 7),
        Event::at(300, 3),
        Event::at(400, 9),
    ];
    assert_eq!(run(&mut e, &events), [false, false, true, false, false]);
}

#[test]
fn keep_breaks_on_failing_event() {
    let mut e = exec("keep(>4, 200ms)");
    let events = [Event::at(0, 5), Event::at(100, 1), Event::at(200, 7), Event::at(300, 7)];
    assert_eq!(run(&mut e, &events), [false, false, false, false]);
}

// =============================================================================
// arrows
// =============================================================================

#[test]
fn arrow_advances_stage_by_stage() {
    assert_eq!(run_values("{>1}->{<1}", &[0, 2, 2, 0]), [false, false, false, true]);
}

#[test]
fn arrow_does_not_refeed_completing_event() {
    assert_eq!(run_values("{>1}->{>1}", &[2, 2]), [false, true]);
}

#[test]
fn mut_sequence() {
    assert_eq!(run_values("<1,2,3>", &[1, 2, 3]), [false, false, true]);
    assert_eq!(run_values("<1,2,3>", &[1, 3, 2, 3]), [false, false, false, true]);
}

#[test]
fn arrow_with_stateful_stage() {
    let results = run_values("{count(>4,2)}->{<0}", &[5, 5, 5, -1]);
    assert_eq!(results, [false, false, false, true]);
}

// =============================================================================
// chains
// =============================================================================

#[test]
fn count_window_sum() {
    let results = run_values("filter(>0).window(3).sum().meet(>=10)", &[5, -1, 2, 3, 9]);
    assert_eq!(results, [false, false, false, true, false]);
}

#[test]
fn strict_filter_clears_buffer() {
    let results = run_values("filter!(>0).window(3).count().meet(>=3)", &[1, 2, -1, 3, 4, 5]);
    assert_eq!(results, [false, false, false, false, false, true]);
}

#[test]
fn limit_is_always_ready() {
    assert_eq!(run_values("limit(2).sum().meet(>10)", &[5, 5, 7]), [false, false, true]);
}

#[test]
fn time_limit_drops_old_events() {
    let mut e = exec("filter().limit(100ms).count().meet(>=3)");
    let events = [Event::at(0, 1), Event::at(60, 1), Event::at(200, 1), Event::at(250, 1)];
    assert_eq!(run(&mut e, &events), [false, false, false, false]);
}

#[test]
fn take_slices_a_view() {
    let results = run_values("filter().window(4).take(0,2).sum().meet(==3)", &[1, 2, 10, 10]);
    assert_eq!(results, [false, false, false, true]);
}

#[test]
fn take_negative_indices() {
    let results = run_values("filter().window(4).take(-2).avg().meet(==20)", &[1, 2, 10, 30]);
    assert_eq!(results, [false, false, false, true]);
}

#[test]
fn hit_rate_fraction() {
    let results = run_values("filter().window(4).hitRate(>4).meet(>=0.5)", &[1, 5, 6, 2]);
    assert_eq!(results, [false, false, false, true]);
}

#[test]
fn stddev_of_window() {
    let results = run_values("filter().window(2).stddev().meet(==1)", &[4, 6]);
    assert_eq!(results, [false, true]);
}

#[test]
fn time_window_carries_buffer_over_reset() {
    let mut e = exec("filter().window(100ms).count().meet(>=2)");
    let events = [Event::at(0, 1), Event::at(50, 1), Event::at(100, 1), Event::at(120, 1)];
    assert_eq!(run(&mut e, &events), [false, false, true, true]);

    let buffer = e
        .environment()
        .iter()
        .find(|(name, _)| name.starts_with("chainBuffer"))
        .map(|(_, v)| v.clone())
        .unwrap();
    assert_eq!(buffer.as_list().map(<[Value]>::len), Some(3));
}

#[test]
fn count_window_does_not_carry_over() {
    let mut e = exec("filter().window(2).count().meet(>=2)");
    assert_eq!(run(&mut e, &series(&[1, 1, 1], 10)), [false, true, false]);
}

#[test]
fn range_meet_bounds_are_inclusive() {
    let results = run_values("filter().limit(1).sum().meet(rangeMeet)", &[5.0, 50.0, 4.9, 50.1]);
    assert_eq!(results, [true, true, false, false]);
}

#[test]
fn calculator_udf_in_chain() {
    let results = run_values("filter().limit(3).maxcalc().meet(>8)", &[1, 9, 2]);
    assert_eq!(results, [false, true, false]);
}

#[test]
fn filter_udf_skips_garbage() {
    let results = run_values(
        "filter(numericFilter).window(2).avg().meet(>4)",
        &["5", "n/a", "7"],
    );
    assert_eq!(results, [false, false, true]);
}

#[test]
fn unbounded_chains_fold_running_aggregates() {
    assert_eq!(run_values("filter(>0).avg().meet(>4)", &[5, -1, 3, 9]), [true, false, false, true]);
    assert_eq!(
        run_values("filter!(>0).count().meet(>=3)", &[1, 2, -1, 3, 4, 5]),
        [false, false, false, false, false, true]
    );
    assert_eq!(run_values("filter().stddev().meet(==1)", &[4, 6]), [false, true]);
    assert_eq!(
        run_values("filter().hitRate(>4).meet(>=0.5)", &[1, 5, 6, 2]),
        [false, true, true, false]
    );
}

#[test]
fn unbounded_sum_skips_non_numeric_but_count_does_not() {
    assert_eq!(run_values("filter().sum().meet(>5)", &["3", "abc", "4"]), [false, false, true]);
    assert_eq!(run_values("filter().count().meet(>=2)", &["a", "b"]), [false, true]);
}

#[test]
fn unbounded_chain_over_long_stream_holds_no_events() {
    const N: usize = 50_000;
    let mut e = exec("filter(>0).sum().meet(>=50000)");
    let results = run(&mut e, &series(&vec![1; N], 1));
    assert_eq!(results.iter().filter(|hit| **hit).count(), 1);
    assert!(results[N - 1]);

    run(&mut e, &series(&vec![1; N / 2], 1));
    assert!(
        e.environment()
            .iter()
            .all(|(_, v)| v.as_list().is_none_or(<[Value]>::is_empty)),
        "{:?}",
        e.environment()
    );
}

// =============================================================================
// literals
// =============================================================================

#[test]
fn floats_without_leading_digit() {
    assert_eq!(run_values(">.5", &[0.25, 1.0]), [false, true]);
    assert_eq!(run_values("count(>.5,2)", &[1, 0, 1]), [false, false, true]);
    assert_eq!(exec(">.5").code(), "(event.value > 0.5)");
}

#[test]
fn oversized_integer_literal_still_executes() {
    let mut e = exec("<99999999999999999999");
    assert!(e.execute(&Event::at(0, 5)).unwrap());
}

// =============================================================================
// UDFs
// =============================================================================

struct AlwaysFilter(&'static str);

impl FilterUdf for AlwaysFilter {
    fn name(&self) -> &str {
        self.0
    }

    fn apply(&self, _event: &Event) -> bool {
        true
    }
}

struct AlwaysMeet(&'static str);

impl MeetUdf for AlwaysMeet {
    fn name(&self) -> &str {
        self.0
    }

    fn apply(&self, _value: f64) -> bool {
        true
    }
}

#[test]
fn udf_names_cannot_shadow_helpers() {
    let mut udfs = UdfRegistry::with_builtins();
    assert!(!udfs.register_filter(AlwaysFilter("len")));
    assert!(!udfs.register_meet(AlwaysMeet("first")));
    assert!(!udfs.register_meet(AlwaysMeet("stddev")));
    let compiler = Compiler::with_udfs(udfs);
    let err = compiler.compile("count(len, 1)").unwrap_err();
    assert_eq!(err.detail(), "Undefined variable: len");
}

#[test]
fn udf_names_cannot_be_keywords() {
    let mut udfs = UdfRegistry::new();
    for name in ["if", "else", "nil", "true", "false"] {
        assert!(!udfs.register_filter(AlwaysFilter(name)), "{name}");
    }
    assert_eq!(udfs.names().count(), 0);
}

#[test]
fn accepted_udfs_are_the_ones_invoked() {
    let mut udfs = UdfRegistry::with_builtins();
    assert!(udfs.register_filter(AlwaysFilter("anyFilter")));
    assert!(udfs.register_meet(AlwaysMeet("anyMeet")));
    let compiler = Compiler::with_udfs(udfs);

    let mut e = compiler.executor("count(anyFilter, 1)").unwrap();
    assert!(e.execute(&Event::at(0, "garbage")).unwrap());

    let mut e = compiler.executor("filter().limit(1).sum().meet(anyMeet)").unwrap();
    assert!(e.execute(&Event::at(0, -3)).unwrap());
}

struct EvenFilter;

impl FilterUdf for EvenFilter {
    fn name(&self) -> &str {
        "evenFilter"
    }

    fn apply(&self, event: &Event) -> bool {
        event
            .numeric_value()
            .is_some_and(|v| v.fract() == 0.0 && (v as i64) % 2 == 0)
    }
}

#[test]
fn registered_filter_udf() {
    let mut udfs = UdfRegistry::with_builtins();
    assert!(udfs.register_filter(EvenFilter));
    let compiler = Compiler::with_udfs(udfs);
    let mut e = compiler.executor("count(evenFilter(), 2)").unwrap();
    assert_eq!(run(&mut e, &series(&[1, 2, 3, 4], 10)), [false, false, false, true]);
}

#[test]
fn meet_udf_on_non_numeric_value_is_false() {
    let results = run_values("thresholdMeet", &["abc", "", "12"]);
    assert_eq!(results, [false, false, true]);
}

// =============================================================================
// runtime contracts
// =============================================================================

#[test]
fn reset_is_idempotent() {
    let mut e = exec("count!(>4,3) || filter().window(2).sum().meet(>30)");
    let events = series(&[11, 11, 1, 11, 11, 11, 20, 20], 100);
    let first = run(&mut e, &events);
    let second = run(&mut e, &events);
    assert_eq!(first, second);
    assert!(first.contains(&true));
}

#[test]
fn hidden_state_reverts_after_match() {
    let mut e = exec("count(>4,2)");
    run(&mut e, &series(&[5, 5], 10));
    let counter = e
        .environment()
        .iter()
        .find(|(name, _)| name.starts_with("count"))
        .map(|(_, v)| v.clone());
    assert_eq!(counter, Some(Value::Int(0)));
}

#[test]
fn compiling_twice_is_structurally_identical() {
    let compiler = Compiler::new();
    let source = "count!(>4,3) && filter(>0).window(2).avg().meet(>1)";
    let a = compiler.compile(source).unwrap();
    let b = compiler.compile(source).unwrap();
    assert_ne!(a.code, b.code);

    let names = NameCounter::default();
    let bases = |env: &rhythmix_eval::Environment| {
        env.names()
            .map(|n| names.base_of(n).to_string())
            .collect::<Vec<_>>()
    };
    assert_eq!(bases(&a.environment), bases(&b.environment));

    let events = series(&[11, 11, 11, 2, 11, 11, 11], 100);
    let mut ea = compiler.executor(source).unwrap();
    let mut eb = compiler.executor(source).unwrap();
    assert_eq!(run(&mut ea, &events), run(&mut eb, &events));
}

#[test]
fn batch_resets_once_at_end() {
    let mut e = exec("count!(>4,3)");
    assert!(e.execute_batch(&series(&[11, 11, 11], 10)).unwrap());
    assert!(!e.execute_batch(&series(&[11, 11], 10)).unwrap());
    assert!(!e.execute_batch(&[]).unwrap());
    assert!(e.execute(&Event::at(100, 11)).unwrap());
}

#[test]
fn manual_reset() {
    let mut e = exec("count(>4,2)");
    assert!(!e.execute(&Event::at(0, 5)).unwrap());
    e.reset();
    assert!(!e.execute(&Event::at(10, 5)).unwrap());
    assert!(e.execute(&Event::at(20, 5)).unwrap());
}

#[test]
fn json_events() {
    let mut e = exec("delay(1s) && >20");
    let first = event_json(json!({"id": "1", "name": "temp", "value": 21.5, "ts": "2024-05-01T10:00:00Z"}));
    let second = event_json(json!({"id": "2", "name": "temp", "value": "22", "ts": "2024-05-01T10:00:01Z"}));
    assert!(!e.execute(&first).unwrap());
    assert!(e.execute(&second).unwrap());
}

#[test]
fn malformed_values_never_error() {
    let mut e = exec("count(>4,2) || slope(>1,1s) || filter().window(2).avg().meet(>1)");
    for (i, v) in ["", "NaN", "abc", "1e400", "-"].iter().enumerate() {
        assert!(!e.execute(&Event::at(i as i64, v)).unwrap());
    }
}

// =============================================================================
// compiled programs never fail at runtime
// =============================================================================

const CONDITIONS: &[&str] = &[
    ">4",
    ">.5",
    "<-3",
    "[1,5)",
    "(0,2.5]",
    "==\"on\"",
    "!=0",
    "count(>4,2)",
    "count!(<0,3)",
    "count(>.5,1+1)",
    "delay(100ms)",
    "keep(>1,1s)",
    "slope(>1,1s)",
    "slope(<-0.5)",
    "{>1}->{<1}",
    "<1,2,3>",
    "positiveFilter",
    "thresholdMeet()",
    "filter(>0).sum().meet(>10)",
    "filter!(>0).avg().meet(>2.5)",
    "filter().stddev().meet(>1)",
    "filter().count().meet(>=3)",
    "filter().hitRate(>4).meet(>=0.5)",
    "filter(tempFilter).window(3).avg().meet(>4)",
    "filter().limit(200ms).count().meet(>=2)",
    "filter().window(1s).sum().meet(rangeMeet)",
    "filter().window(4).take(-2).sum().meet(>5)",
    "filter().limit(3).maxcalc().meet(>8)",
    "filter().mincalc().meet(<0)",
];

#[test]
fn every_listed_condition_compiles() {
    for source in CONDITIONS {
        exec(source);
    }
}

fn condition() -> impl Strategy<Value = String> {
    let leaf = prop::sample::select(CONDITIONS).prop_map(str::to_string);
    leaf.prop_recursive(3, 12, 2, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone()).prop_map(|(a, b)| format!("({a}) && ({b})")),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| format!("({a}) || ({b})")),
            inner.prop_map(|a| format!("!({a})")),
        ]
    })
}

fn reading() -> impl Strategy<Value = String> {
    prop_oneof![
        (-100i64..100).prop_map(|v| v.to_string()),
        (-100.0f64..100.0).prop_map(|v| v.to_string()),
        prop::sample::select(vec!["", "abc", "NaN", "-", "1e400", "true"]).prop_map(str::to_string),
    ]
}

proptest! {
    #[test]
    fn compiled_programs_execute_without_error(
        source in condition(),
        readings in prop::collection::vec((0i64..300, reading()), 1..40),
    ) {
        let Ok(mut e) = rhythmix_eval::compile(&source) else {
            return Ok(());
        };
        let mut ts = 0;
        for (gap, value) in &readings {
            ts += gap;
            let result = e.execute(&Event::at(ts, value.as_str()));
            prop_assert!(result.is_ok(), "{source}: {result:?}");
        }
        let batch: Vec<Event> = readings
            .iter()
            .map(|(gap, value)| Event::at(ts + gap, value.as_str()))
            .collect();
        prop_assert!(e.execute_batch(&batch).is_ok());
    }
}
