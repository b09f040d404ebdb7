//! `vfstack plan` - creation waves

use anyhow::Result;
use colored::Colorize;
use declarative::{ExecutionPlan, ResourceGraph};

use super::Session;
use crate::Context;
use crate::cli::PlanArgs;
use crate::ui;

pub fn run(ctx: &Context, args: PlanArgs) -> Result<()> {
    let session = Session::open(ctx)?;
    let plan = ExecutionPlan::from_graph(&session.graph)?
        .filter_by_target(&session.graph, args.target.as_deref());

    if plan.is_empty() {
        ui::warn("No resources match the target");
        return Ok(());
    }

    ui::header(&format!(
        "{}: {} resources in {} waves",
        session.stack_name(),
        plan.total_resources(),
        plan.waves.len()
    ));
    display_plan(&plan, &session.graph);
    Ok(())
}

fn display_plan(plan: &ExecutionPlan, graph: &ResourceGraph) {
    for (index, wave) in plan.waves.iter().enumerate() {
        ui::section(&format!("Wave {}", index + 1));
        for id in wave {
            let Some(node) = graph.node(id) else {
                continue;
            };
            let barrier = node
                .barrier
                .as_ref()
                .map(|b| {
                    format!(" ⏸ blocks dependents up to {}s", b.wait_ceiling.as_secs())
                        .yellow()
                        .to_string()
                })
                .unwrap_or_default();
            println!("  • {:<36} {}{}", id, node.kind.dimmed(), barrier);
        }
    }
}
