use std::path::Path;

use {
    anyhow::Result,
    concierge_config::{Diagnostic, Severity, ValidationResult},
};

/// ANSI color codes.
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

/// Validate the config file (explicit or discovered) and print diagnostics.
/// Exits with status 1 when there are errors.
pub fn check(path: Option<&Path>, verbose: bool) -> Result<()> {
    let result = run_check(path);

    if let Some(ref path) = result.config_path {
        eprintln!("Checking {}\n", path.display());
    } else {
        eprintln!("No config file found; checking defaults.\n");
    }

    let mut shown = 0;
    for d in &result.diagnostics {
        if d.severity == Severity::Info && !verbose {
            continue;
        }
        eprintln!("  {}", render(d));
        shown += 1;
    }

    let errors = result.count(Severity::Error);
    let warnings = result.count(Severity::Warning);

    if shown > 0 {
        eprintln!();
    }

    if errors == 0 && warnings == 0 {
        eprintln!("No issues found.");
    } else {
        eprintln!("{errors} error(s), {warnings} warning(s)");
    }

    if errors > 0 {
        std::process::exit(1);
    }

    Ok(())
}

fn run_check(path: Option<&Path>) -> ValidationResult {
    let discovered = match path {
        Some(path) => Some(path.to_path_buf()),
        None => concierge_config::find_config_file(),
    };
    match discovered {
        Some(path) => concierge_config::validate_file(&path),
        None => {
            let mut config = concierge_config::ConciergeConfig::default();
            concierge_config::apply_env_overrides(&mut config);
            concierge_config::validate(&config)
        },
    }
}

fn render(d: &Diagnostic) -> String {
    let (color, label) = match d.severity {
        Severity::Error => (RED, "error"),
        Severity::Warning => (YELLOW, "warning"),
        Severity::Info => (CYAN, "info"),
    };
    if d.path.is_empty() {
        format!("{BOLD}{color}{label}{RESET} {}", d.message)
    } else {
        format!("{BOLD}{color}{label}{RESET} {}: {}", d.path, d.message)
    }
}
