//! Property tests for resource clamping.
//!
//! Generalizes the base engine's `proptest_ecs.rs` random-op-sequence
//! pattern to `StatusController`'s resources: no sequence of
//! `modify_resource`/`set_resource` calls should ever leave a resource's
//! value outside `[0, max]` (or below zero, for an unbounded resource).

use nomai_engine::status::StatusController;
use proptest::prelude::*;
use std::collections::HashMap;

#[derive(Debug, Clone)]
enum ResourceOp {
    Modify(f32),
    Set(f32),
}

fn finite_f32() -> impl Strategy<Value = f32> {
    (-1_000_000i32..1_000_000i32).prop_map(|v| v as f32 * 0.1)
}

fn resource_op_strategy() -> impl Strategy<Value = ResourceOp> {
    prop_oneof![
        finite_f32().prop_map(ResourceOp::Modify),
        finite_f32().prop_map(ResourceOp::Set),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(2_000))]

    #[test]
    fn capped_resource_stays_within_bounds(
        max in 1.0f32..1_000.0,
        ops in prop::collection::vec(resource_op_strategy(), 0..50),
    ) {
        let mut resources = HashMap::new();
        resources.insert("health".to_owned(), nomai_engine::status::Resource::capped(max));
        let mut status = StatusController::new(HashMap::new(), resources);

        for op in ops {
            match op {
                ResourceOp::Modify(amount) => {
                    status.modify_resource("health", amount).unwrap();
                }
                ResourceOp::Set(value) => {
                    status.set_resource("health", value).unwrap();
                }
            }
            let value = status.resource("health").unwrap();
            prop_assert!(value >= 0.0 && value <= max);
        }
    }

    #[test]
    fn unbounded_resource_never_goes_negative(
        initial in -1_000.0f32..1_000.0,
        ops in prop::collection::vec(resource_op_strategy(), 0..50),
    ) {
        let mut resources = HashMap::new();
        resources.insert("energy".to_owned(), nomai_engine::status::Resource::unbounded(initial));
        let mut status = StatusController::new(HashMap::new(), resources);

        for op in ops {
            match op {
                ResourceOp::Modify(amount) => {
                    status.modify_resource("energy", amount).unwrap();
                }
                ResourceOp::Set(value) => {
                    status.set_resource("energy", value).unwrap();
                }
            }
            prop_assert!(status.resource("energy").unwrap() >= 0.0);
        }
    }

    /// A locked resource rejects every mutation, bounded or not.
    #[test]
    fn locked_resource_is_never_mutated(
        max in 1.0f32..1_000.0,
        ops in prop::collection::vec(resource_op_strategy(), 0..20),
    ) {
        let mut resources = HashMap::new();
        resources.insert("health".to_owned(), nomai_engine::status::Resource::capped(max));
        let mut status = StatusController::new(HashMap::new(), resources);
        status.set_resource_locked("health", true).unwrap();
        let before = status.resource("health").unwrap();

        for op in ops {
            match op {
                ResourceOp::Modify(amount) => {
                    status.modify_resource("health", amount).unwrap();
                }
                ResourceOp::Set(value) => {
                    status.set_resource("health", value).unwrap();
                }
            }
            prop_assert_eq!(status.resource("health").unwrap(), before);
        }
    }
}
