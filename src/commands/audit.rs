//! `vfstack audit` - grants and flagged defaults

use anyhow::Result;
use colored::Colorize;

use super::Session;
use crate::Context;
use crate::audit::{Finding, FindingSeverity, audit};
use crate::ui;

pub fn run(ctx: &Context) -> Result<()> {
    let session = Session::open(ctx)?;
    let findings = audit(&session.graph);

    ui::header(&format!("Audit of {}", session.stack_name()));
    for finding in &findings {
        if ctx.quiet && !finding.is_error() {
            continue;
        }
        display_finding(finding);
    }

    let errors = findings.iter().filter(|f| f.is_error()).count();
    let warnings = findings
        .iter()
        .filter(|f| f.severity == FindingSeverity::Warning)
        .count();
    println!();
    if errors > 0 {
        anyhow::bail!("{errors} audit error(s), {warnings} warning(s)");
    }
    ui::success(&format!(
        "{} findings, no errors ({} warning(s))",
        findings.len(),
        warnings
    ));
    Ok(())
}

fn display_finding(finding: &Finding) {
    let symbol = match finding.severity {
        FindingSeverity::Error => "✗".red(),
        FindingSeverity::Warning => "⚠".yellow(),
        FindingSeverity::Info => "ℹ".blue(),
    };
    println!(
        "  {} {:<20} {:<16} {}",
        symbol,
        finding.resource,
        format!("[{}]", finding.code).dimmed(),
        finding.message
    );
}
