// /////////////////////////////////////////////////////////////////////////////
// Sealog
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Property-based tests for the pipeline invariants: bounded queues,
//! protected priority, escalation monotonicity, hysteresis, and canonical
//! serialization determinism.

use proptest::prelude::*;
use sealog::infrastructure::runtime::pressure::EscalationLadder;
use sealog::infrastructure::runtime::queue::DualQueue;
use sealog::{LogEvent, PressureSettings};
use sealog_domain::services::canonical::canonicalize;
use serde_json::Map;

fn event(level: &str) -> LogEvent {
    LogEvent {
        timestamp: 1.0,
        level: level.to_string(),
        message: "m".to_string(),
        logger: "root".to_string(),
        correlation_id: "c".to_string(),
        metadata: Map::new(),
    }
}

fn level_name(tag: u8) -> &'static str {
    match tag % 5 {
        0 => "DEBUG",
        1 => "INFO",
        2 => "WARNING",
        3 => "ERROR",
        _ => "CRITICAL",
    }
}

proptest! {
    /// Queue depth never exceeds configured capacity, for any input
    /// sequence, and accounting balances: enqueued + refused = submitted.
    #[test]
    fn prop_no_unbounded_growth(
        main_capacity in 1usize..32,
        protected_capacity in 1usize..16,
        levels in proptest::collection::vec(0u8..5, 0..200),
    ) {
        let queue = DualQueue::new(
            main_capacity,
            protected_capacity,
            ["ERROR".to_string(), "CRITICAL".to_string()],
        );
        let mut accepted = 0u64;
        for tag in &levels {
            if queue.try_enqueue(event(level_name(*tag))) {
                accepted += 1;
            }
            prop_assert!(queue.main_len() <= main_capacity);
            prop_assert!(queue.protected_len() <= protected_capacity);
        }
        let refused = queue.main_drops() + queue.protected_drops();
        prop_assert_eq!(accepted + refused, levels.len() as u64);
        prop_assert_eq!(queue.len() as u64, accepted);
    }

    /// With both queues non-empty, dequeue returns protected events until
    /// the protected queue is empty.
    #[test]
    fn prop_protected_priority(
        levels in proptest::collection::vec(0u8..5, 1..100),
    ) {
        let queue = DualQueue::new(
            128,
            128,
            ["ERROR".to_string(), "CRITICAL".to_string()],
        );
        for tag in &levels {
            queue.try_enqueue(event(level_name(*tag)));
        }
        let mut seen_unprotected = false;
        while let Some(dequeued) = queue.try_dequeue() {
            let protected = dequeued.level == "ERROR" || dequeued.level == "CRITICAL";
            if protected {
                prop_assert!(
                    !seen_unprotected,
                    "protected event dequeued after an unprotected one"
                );
            } else {
                seen_unprotected = true;
            }
        }
    }

    /// The escalation ladder moves at most one step per evaluation, and
    /// holding a level implies the hysteresis band:
    /// fill < escalate(L+1) and fill >= deescalate(L).
    #[test]
    fn prop_ladder_monotone_and_hysteretic(
        fills in proptest::collection::vec(0.0f64..=1.0, 1..300),
    ) {
        let settings = PressureSettings {
            cooldown_seconds: 0.0,
            ..PressureSettings::default()
        };
        let escalate = [
            settings.escalate_to_elevated,
            settings.escalate_to_high,
            settings.escalate_to_critical,
        ];
        let deescalate = [
            settings.deescalate_from_elevated,
            settings.deescalate_from_high,
            settings.deescalate_from_critical,
        ];
        let mut ladder = EscalationLadder::new(settings);

        for fill in fills {
            let before = ladder.current_level().index();
            let after = ladder.evaluate(fill).index();
            // At most one step per evaluation
            prop_assert!(before.abs_diff(after) <= 1);

            if after == before {
                // Holding a level above NORMAL requires staying above its
                // de-escalation threshold
                if after > 0 {
                    prop_assert!(fill >= deescalate[after - 1]);
                }
                // Holding a level below CRITICAL requires staying below
                // the next escalation threshold
                if after < 3 {
                    prop_assert!(fill < escalate[after]);
                }
            }
        }
    }

    /// Canonical serialization is deterministic regardless of map
    /// insertion order.
    #[test]
    fn prop_canonical_is_order_independent(
        pairs in proptest::collection::vec(("[a-z]{1,8}", 0i64..1000), 1..20),
    ) {
        let mut forward = Map::new();
        for (key, value) in &pairs {
            forward.insert(key.clone(), serde_json::Value::from(*value));
        }
        let mut reverse = Map::new();
        for (key, value) in pairs.iter().rev() {
            reverse.insert(key.clone(), serde_json::Value::from(*value));
        }
        let a = canonicalize(&serde_json::Value::Object(forward)).unwrap();
        let b = canonicalize(&serde_json::Value::Object(reverse)).unwrap();
        prop_assert_eq!(a, b);
    }
}
