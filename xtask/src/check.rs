use anyhow::Result;
use colored::Colorize;
use std::time::Instant;

use crate::step::{cargo, finish, OnFailure};

/// Embedded target the data plane ships on.
const EMBEDDED_TARGET: &str = "thumbv7em-none-eabihf";

pub fn run() -> Result<()> {
    println!();
    println!("{}", "🔍 Checking the isochronous data plane...".cyan().bold());
    println!();

    let total_start = Instant::now();

    // The library must stay no_std with and without defmt.
    cargo(
        "Checking isoc (no_std, embedded target)",
        &["check", "-p", "isoc", "--target", EMBEDDED_TARGET],
        OnFailure::Fail,
    )?;
    cargo(
        "Checking isoc with defmt (embedded target)",
        &["check", "-p", "isoc", "--target", EMBEDDED_TARGET, "--features", "defmt"],
        OnFailure::Fail,
    )?;
    cargo(
        "Checking isoc with tracing (host)",
        &["check", "-p", "isoc", "--features", "std,tracing"],
        OnFailure::Fail,
    )?;
    cargo(
        "Checking simulator (host)",
        &["check", "-p", "simulator"],
        OnFailure::Fail,
    )?;

    // Lints and formatting report but do not fail the check.
    cargo(
        "Running clippy lints",
        &["clippy", "--workspace", "--all-targets", "--", "-D", "warnings"],
        OnFailure::Warn,
    )?;
    if cargo(
        "Checking code formatting",
        &["fmt", "--all", "--check"],
        OnFailure::Warn,
    )?
    .is_none()
    {
        eprintln!("     Run 'cargo fmt --all' to fix");
    }

    finish("All checks", total_start);
    Ok(())
}
