//! Persistence round-trips for manager configuration and problem fixtures.

use std::fs;

use batchplan::fixtures;
use batchplan::prelude::*;
use testresult::TestResult;

#[test]
fn configuration_survives_a_file_round_trip() -> TestResult {
    let mut manager = SolverManager::new();
    manager.set_constraint_enabled("minimum_batch", true)?;
    manager.set_constraint_configuration(
        "demand",
        ConstraintParams {
            equality: Some(false),
            ..ConstraintParams::default()
        },
    )?;
    manager.set_constraint_configuration(
        "minimum_batch",
        ConstraintParams {
            min_batch_size: Some(25.into()),
            ..ConstraintParams::default()
        },
    )?;

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("solver_config.yaml");
    fs::write(&path, manager.to_yaml()?)?;

    let mut restored = SolverManager::new();
    restored.load_yaml(&fs::read_to_string(&path)?)?;

    assert_eq!(
        restored.serializable_configuration(),
        manager.serializable_configuration()
    );
    assert!(restored.is_constraint_enabled("minimum_batch")?);
    assert_eq!(
        restored.constraint_configuration("demand")?.equality,
        Some(false)
    );

    Ok(())
}

#[test]
fn loading_skips_constraints_this_build_does_not_know() -> TestResult {
    let document = "\
enabled_constraints:
  demand: false
  lead_time: true
custom_configs:
  supply:
    cumulative: false
";

    let mut manager = SolverManager::new();
    manager.load_yaml(document)?;

    // The known entries take effect, the unknown one is dropped.
    assert!(!manager.is_constraint_enabled("demand")?);
    assert_eq!(
        manager.constraint_configuration("supply")?.cumulative,
        Some(false)
    );
    assert!(manager.is_constraint_enabled("lead_time").is_err());

    Ok(())
}

#[test]
fn absent_names_keep_their_current_state_on_load() -> TestResult {
    let mut manager = SolverManager::new();
    manager.set_constraint_enabled("production_rate", true)?;

    manager.load_yaml("enabled_constraints:\n  demand: true\n")?;

    assert!(manager.is_constraint_enabled("production_rate")?);

    Ok(())
}

#[test]
fn problem_fixture_loads_from_a_yaml_file() -> TestResult {
    let document = "\
products: [Classic]
resources: [Standard]
periods: [\"Week 1\"]
demand:
  Classic:
    \"Week 1\": 50
supply:
  Standard:
    \"Week 1\": 80
unit_cost:
  Classic:
    Standard: 0.25
yield:
  Classic: 10
allowed:
  Classic: [Standard]
";

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("problem.yaml");
    fs::write(&path, document)?;

    let data = fixtures::load_problem_data(&path)?;

    assert_eq!(data.demand_at("Classic", "Week 1"), Some(50.0));
    assert_eq!(data.supply_at("Standard", "Week 1"), Some(80.0));
    assert!(data.is_allowed("Classic", "Standard"));

    Ok(())
}
