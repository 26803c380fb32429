//! Property-based tests for the trace engine state machine
//!
//! Properties:
//! 1. Arbitrary event sequences never underflow depth or panic
//! 2. Well-nested project calls are recorded at their nesting level, in order
//! 3. Ignored frames are invisible wherever they are spliced in
//! 4. Any number of tracked-package calls yields one boundary record per excursion
//! 5. The test's own return always closes the test

mod utils;

use calltree::engine::EventKind::{self, Call, Return};
use calltree::engine::TraceHook;
use calltree::events::FrameRecord;
use proptest::prelude::*;
use utils::{feed, frame, Fixture};

/// Which file a generated frame lives in
#[derive(Debug, Clone, Copy)]
enum Site {
    Project,
    Runtime,
    Vendor,
}

fn site_frame(fx: &Fixture, site: Site, function: &str) -> FrameRecord {
    match site {
        Site::Project => frame(fx.project_file("lib.py"), "lib", function, 1),
        Site::Runtime => frame(fx.runtime_file(), "builtins", function, 1),
        Site::Vendor => frame(fx.vendor_file("api.py"), "vendor_pkg.api", function, 1),
    }
}

fn site_strategy() -> impl Strategy<Value = Site> {
    prop_oneof![Just(Site::Project), Just(Site::Runtime), Just(Site::Vendor)]
}

fn test_frame(fx: &Fixture) -> FrameRecord {
    frame(fx.project_file("test_a.py"), "test_a", "test_prop", 1)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_arbitrary_sequences_never_underflow(
        ops in prop::collection::vec((any::<bool>(), site_strategy()), 0..60),
    ) {
        let fx = Fixture::new();
        let mut engine = fx.engine();
        engine.on_event(Call, &test_frame(&fx));

        for (is_call, site) in &ops {
            let kind = if *is_call { Call } else { Return };
            engine.on_event(kind, &site_frame(&fx, *site, "f"));
        }

        let calls = engine.call_tree().get("test_a.test_prop");
        let project_calls = ops
            .iter()
            .filter(|(is_call, site)| *is_call && matches!(site, Site::Project))
            .count();
        prop_assert!(calls.len() <= ops.len());
        prop_assert!(calls.len() >= project_calls);
        for call in calls {
            prop_assert!(call.depth <= ops.len() + 1);
        }

        engine.on_event(Return, &test_frame(&fx));
        prop_assert!(engine.state().is_idle());
        prop_assert_eq!(engine.state().depth, 0);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_nested_project_calls_record_nesting_level(
        steps in prop::collection::vec(any::<bool>(), 0..60),
    ) {
        let fx = Fixture::new();
        let mut engine = fx.engine();
        engine.on_event(Call, &test_frame(&fx));

        let mut open: Vec<String> = Vec::new();
        let mut expected: Vec<(usize, String)> = Vec::new();
        for (i, step) in steps.iter().enumerate() {
            if *step || open.is_empty() {
                let name = format!("f{}", i);
                expected.push((open.len() + 1, name.clone()));
                engine.on_event(Call, &site_frame(&fx, Site::Project, &name));
                open.push(name);
            } else if let Some(name) = open.pop() {
                engine.on_event(Return, &site_frame(&fx, Site::Project, &name));
            }
        }
        prop_assert_eq!(engine.state().depth, open.len() + 1);

        while let Some(name) = open.pop() {
            engine.on_event(Return, &site_frame(&fx, Site::Project, &name));
        }
        engine.on_event(Return, &test_frame(&fx));

        let recorded: Vec<(usize, String)> = engine
            .call_tree()
            .get("test_a.test_prop")
            .iter()
            .map(|c| (c.depth, c.function.clone()))
            .collect();
        prop_assert_eq!(recorded, expected);
        prop_assert!(engine.state().is_idle());
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_ignored_frames_are_invisible(
        steps in prop::collection::vec(any::<bool>(), 0..40),
        noise in prop::collection::vec((0usize..40, 1usize..4), 0..10),
    ) {
        let fx = Fixture::new();

        // Base: a balanced run of project calls inside one test
        let mut base: Vec<(EventKind, FrameRecord)> = vec![(Call, test_frame(&fx))];
        let mut open = Vec::new();
        for (i, step) in steps.iter().enumerate() {
            if *step || open.is_empty() {
                let name = format!("f{}", i);
                base.push((Call, site_frame(&fx, Site::Project, &name)));
                open.push(name);
            } else if let Some(name) = open.pop() {
                base.push((Return, site_frame(&fx, Site::Project, &name)));
            }
        }

        // Splice runtime excursions (nested calls, then matching returns)
        let mut noisy = base.clone();
        for (at, nesting) in &noise {
            let at = (*at).clamp(1, noisy.len());
            let mut excursion = Vec::new();
            for _ in 0..*nesting {
                excursion.push((Call, site_frame(&fx, Site::Runtime, "builtin")));
            }
            for _ in 0..*nesting {
                excursion.push((Return, site_frame(&fx, Site::Runtime, "builtin")));
            }
            noisy.splice(at..at, excursion);
        }

        let mut clean_engine = fx.engine();
        feed(&mut clean_engine, &base);
        let mut noisy_engine = fx.engine();
        feed(&mut noisy_engine, &noisy);

        prop_assert_eq!(
            clean_engine.call_tree().get("test_a.test_prop"),
            noisy_engine.call_tree().get("test_a.test_prop")
        );
        prop_assert_eq!(clean_engine.state(), noisy_engine.state());
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_tracked_excursion_records_one_boundary(
        vendor_calls in 1usize..20,
        excursions in 1usize..5,
    ) {
        let fx = Fixture::new();
        let mut engine = fx.engine();
        engine.on_event(Call, &test_frame(&fx));

        for n in 0..excursions {
            let helper = site_frame(&fx, Site::Project, &format!("helper{}", n));
            engine.on_event(Call, &helper);
            for _ in 0..vendor_calls {
                engine.on_event(Call, &site_frame(&fx, Site::Vendor, "get"));
                engine.on_event(Return, &site_frame(&fx, Site::Vendor, "get"));
            }
            engine.on_event(Return, &helper);
            prop_assert_eq!(engine.state().depth, 1);
        }

        let calls = engine.call_tree().get("test_a.test_prop");
        prop_assert_eq!(calls.len(), excursions * 2);
        for pair in calls.chunks(2) {
            prop_assert_eq!(pair[0].depth, 1);
            prop_assert_eq!(pair[1].depth, 2);
            prop_assert_eq!(pair[1].function.as_str(), "get");
        }
        prop_assert_eq!(engine.stats().suppressed as usize, excursions * (vendor_calls - 1));
    }
}
