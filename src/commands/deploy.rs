//! Commands that work against the deployment ledger
//!
//! - `diff` - Preview what apply would change
//! - `apply` - Converge the ledger to the stack
//! - `destroy` - Remove everything recorded

use anyhow::Result;
use declarative::{
    ExecuteOptions, ExecuteSummary, ExecutionPlan, ResourceDiff, Template, compute_diffs, execute,
};
use std::collections::{BTreeMap, HashSet};

use super::Session;
use crate::Context;
use crate::cli::{ApplyArgs, DestroyArgs, DiffArgs};
use crate::config::StackConfig;
use crate::engine::differ::{display_diff, display_property_diffs};
use crate::engine::{DialoguerConfirm, LocalProvisioner, UiProgress, print_summary};
use crate::state::DeployState;
use crate::ui;

pub fn diff(ctx: &Context, args: DiffArgs) -> Result<()> {
    let session = Session::open(ctx)?;
    let state = DeployState::load(session.stack_name())?;
    let desired = session.desired();
    let plan = ExecutionPlan::from_graph(&session.graph)?
        .filter_by_target(&session.graph, args.target.as_deref());

    let diffs = planned_diffs(&plan, &desired, &state.template);
    display_diff(&diffs);
    if ctx.verbose > 0 {
        display_property_diffs(&diffs, &desired, &state.template);
    }
    Ok(())
}

pub fn apply(ctx: &Context, args: ApplyArgs) -> Result<()> {
    let session = Session::open(ctx)?;
    session.flag_warnings(ctx);

    let mut state = DeployState::load(session.stack_name())?;
    let desired = session.desired();
    let plan = ExecutionPlan::from_graph(&session.graph)?
        .filter_by_target(&session.graph, args.target.as_deref());

    let diffs = planned_diffs(&plan, &desired, &state.template);
    display_diff(&diffs);
    if diffs.is_empty() {
        return Ok(());
    }

    let opts = ExecuteOptions {
        dry_run: args.dry_run,
        jobs: args.jobs.max(1),
        verbose: ctx.verbose > 0,
    };
    let provisioner = LocalProvisioner::new(&state.template);
    let mut progress = UiProgress::new(diffs.len(), opts.verbose)?;
    let mut confirm = DialoguerConfirm { yes: args.yes };

    let summary = execute(
        &plan,
        &desired,
        &state.template,
        &opts,
        &provisioner,
        &mut progress,
        &mut confirm,
    )?;
    progress.finish();

    if args.dry_run {
        println!();
        ui::info("Dry run - no changes made");
        return Ok(());
    }
    if was_declined(&summary, diffs.len()) {
        println!();
        ui::error("Aborted");
        return Ok(());
    }

    let resources = provisioner.into_resources();
    let outputs = session.outputs_for(|id| resources.contains_key(id));
    state.record(&desired.description, resources, outputs);
    state.save()?;

    print_summary(&summary, "applied");
    finish(&summary)
}

pub fn destroy(ctx: &Context, args: DestroyArgs) -> Result<()> {
    let (config, _) = StackConfig::load(ctx.config.as_deref())?;
    let mut state = DeployState::load(&config.stack.name)?;
    if !state.is_deployed() {
        ui::info(&format!("{} has nothing recorded", config.stack.name));
        return Ok(());
    }

    let desired = Template::default();
    let diffs = compute_diffs(&desired, &state.template);
    display_diff(&diffs);

    let opts = ExecuteOptions {
        dry_run: false,
        jobs: 1,
        verbose: ctx.verbose > 0,
    };
    let provisioner = LocalProvisioner::new(&state.template);
    let mut progress = UiProgress::new(diffs.len(), opts.verbose)?;
    let mut confirm = DialoguerConfirm { yes: args.yes };

    let summary = execute(
        &ExecutionPlan::default(),
        &desired,
        &state.template,
        &opts,
        &provisioner,
        &mut progress,
        &mut confirm,
    )?;
    progress.finish();

    if was_declined(&summary, diffs.len()) {
        println!();
        ui::error("Aborted");
        return Ok(());
    }

    let description = state.template.description.clone();
    state.record(&description, provisioner.into_resources(), BTreeMap::new());
    state.save()?;

    print_summary(&summary, "destroyed");
    finish(&summary)
}

/// Diffs the executor will act on: planned resources plus every removal
fn planned_diffs(plan: &ExecutionPlan, desired: &Template, previous: &Template) -> Vec<ResourceDiff> {
    let planned: HashSet<&str> = plan.ordered_ids().collect();
    compute_diffs(desired, previous)
        .into_iter()
        .filter(|d| d.is_removal() || planned.contains(d.resource_id.as_str()))
        .collect()
}

/// The executor skips the whole change set when confirmation is refused
fn was_declined(summary: &ExecuteSummary, changes: usize) -> bool {
    summary.skipped == changes && summary.total_changes() == 0 && summary.failed == 0
}

fn finish(summary: &ExecuteSummary) -> Result<()> {
    if summary.is_success() {
        Ok(())
    } else {
        anyhow::bail!("{} resource(s) failed", summary.failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::StackAssets;
    use crate::stack::{self, StackInputs, queue};
    use declarative::Resolver;

    fn graph_and_template() -> (declarative::ResourceGraph, Template) {
        let assets = StackAssets::unscanned();
        let graph = stack::build(&StackInputs {
            parameters: &BTreeMap::new(),
            assets: &assets,
        })
        .unwrap();
        let template = Template::synthesize(&graph, &Resolver::symbolic());
        (graph, template)
    }

    #[test]
    fn test_target_limits_additions_but_keeps_removals() {
        let (graph, desired) = graph_and_template();
        let mut previous = Template::default();
        let stale = desired.resources[queue::QUEUE_ID].clone();
        previous.resources.insert("OldQueue".to_string(), stale);

        let plan = ExecutionPlan::from_graph(&graph)
            .unwrap()
            .filter_by_target(&graph, Some("sqs"));
        let diffs = planned_diffs(&plan, &desired, &previous);

        assert!(diffs.iter().any(|d| d.resource_id == queue::QUEUE_ID && d.is_addition()));
        assert!(diffs.iter().any(|d| d.resource_id == "OldQueue" && d.is_removal()));
        assert!(diffs.iter().all(|d| d.resource_type.contains("SQS")));
    }

    #[test]
    fn test_declined_summary() {
        let declined = ExecuteSummary {
            skipped: 3,
            ..Default::default()
        };
        assert!(was_declined(&declined, 3));

        let partial = ExecuteSummary {
            skipped: 2,
            failed: 1,
            ..Default::default()
        };
        assert!(!was_declined(&partial, 3));
        assert!(finish(&partial).is_err());
    }
}
