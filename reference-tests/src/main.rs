//! Reference test binary entry point
//!
//! Runs the standard reference suite and prints a summary table.

use reference_tests::{standard_suite, TestResult};
use tracing_subscriber::EnvFilter;

fn main() {
    // Initialize logging; RUST_LOG overrides the default level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    tracing::info!("Vlasov Reference Test Suite");
    tracing::info!("===========================");

    let tests = standard_suite();
    tracing::info!("Found {} reference tests", tests.len());

    let mut results: Vec<TestResult> = Vec::new();
    let mut passed_count = 0;
    let mut failed_count = 0;

    for test in tests {
        match test.run() {
            Ok(result) => {
                if result.passed {
                    passed_count += 1;
                } else {
                    failed_count += 1;
                }
                result.print_summary();
                results.push(result);
            }
            Err(e) => {
                eprintln!("\nERROR running test {}: {}", test.name, e);
                failed_count += 1;
            }
        }
    }

    println!("\n{}", "=".repeat(80));
    println!("OVERALL SUMMARY");
    println!("{}", "=".repeat(80));
    println!("{:<32} {:>8} {:>12} {:>14}", "Test", "Status", "Timesteps", "Mass drift");
    for r in &results {
        let drift = r.mass_drift.map_or_else(|| "-".to_string(), |d| format!("{:.3e}", d));
        println!(
            "{:<32} {:>8} {:>12} {:>14}",
            r.name,
            if r.passed { "PASS" } else { "FAIL" },
            r.timesteps,
            drift
        );
    }
    println!("Passed: {}", passed_count);
    println!("Failed: {}", failed_count);
    println!("{}", "=".repeat(80));

    if failed_count > 0 {
        std::process::exit(1);
    }
}
