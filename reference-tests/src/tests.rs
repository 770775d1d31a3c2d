//! Reference suite under `cargo test`

use crate::{
    compare_cells, quiet_maxwellian, standard_suite, subcycle_participation, ReferenceTest,
};

fn run_named(name: &str) {
    let test: ReferenceTest = standard_suite()
        .into_iter()
        .find(|t| t.name == name)
        .unwrap_or_else(|| panic!("no reference test named {}", name));
    let result = test.run().unwrap();
    result.print_summary();
    for check in &result.checks {
        assert!(check.passed, "{}: {} failed: {:?}", name, check.name, check.message);
    }
    assert!(result.passed);
}

#[test]
fn test_uniform_maxwellian_10x10x10() {
    run_named("Uniform Maxwellian 10x10x10");
}

#[test]
fn test_rank_parity() {
    run_named("Rank Parity");
}

#[test]
fn test_zero_timestep() {
    run_named("Zero Timestep");
}

#[test]
fn test_subcycle_participation() {
    run_named("Subcycle Participation");
}

#[test]
fn test_cell_sets_3x1x1() {
    run_named("Cell Sets 3x1x1");
}

#[test]
fn test_every_cell_subcycles_at_least_once() {
    let active = subcycle_participation(&[1.0, 1.0, 1.0], 0.5).unwrap();
    assert_eq!(active, vec![3]);
}

#[test]
fn test_compare_cells_reports_mismatch() {
    let config = quiet_maxwellian([2, 1, 1], 1, 1.0e-3);
    let a = orchestrator::run_distributed(&config, 0).unwrap();
    let mut b = a.clone();
    b.cells[1].rhom *= 1.5;
    let check = compare_cells("mismatch", &a, &b, 1e-12);
    assert!(!check.passed);
    assert!(check.message.unwrap().contains("cell 2"));
    assert!(compare_cells("same", &a, &a, 0.0).passed);
}
