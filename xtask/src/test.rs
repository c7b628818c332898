use anyhow::Result;
use colored::Colorize;
use std::time::Instant;

use crate::step::{cargo, finish, OnFailure};

pub fn run(unit_only: bool, integration_only: bool) -> Result<()> {
    println!();
    println!("{}", "🧪 Running tests...".cyan().bold());
    println!();

    let total_start = Instant::now();

    let run_unit = !integration_only;
    let run_integration = !unit_only;

    if run_unit {
        let output = cargo(
            "Unit tests",
            &["test", "--lib", "--workspace"],
            OnFailure::Fail,
        )?;
        report_summary(output.as_ref());
    }

    if run_integration {
        let output = cargo(
            "Integration tests (isoc)",
            &["test", "-p", "isoc", "--tests"],
            OnFailure::Fail,
        )?;
        report_summary(output.as_ref());

        // A short end-to-end run; drops every 5th SDU to exercise resync.
        cargo(
            "Simulator smoke run",
            &[
                "run", "-p", "simulator", "--", "--bursts", "3", "--burst-gap-ms", "50",
                "--drop-every", "5",
            ],
            OnFailure::Fail,
        )?;
    }

    let output = cargo("Doc tests", &["test", "--doc", "-p", "isoc"], OnFailure::Warn)?;
    report_summary(output.as_ref());

    finish("All tests", total_start);
    Ok(())
}

fn report_summary(output: Option<&std::process::Output>) {
    if let Some(output) = output {
        let stdout = String::from_utf8_lossy(&output.stdout);
        println!("    {}", extract_test_summary(&stdout));
        println!();
    }
}

fn extract_test_summary(output: &str) -> String {
    // Look for lines like "test result: ok. 5 passed; 0 failed; 0 ignored; 0 measured; 0 filtered out"
    for line in output.lines() {
        if line.contains("test result:") {
            if let Some(summary) = line.split("test result:").nth(1) {
                return summary.trim().to_string();
            }
        }
    }
    "(summary not available)".to_string()
}
