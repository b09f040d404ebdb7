//! Execution engine - applies a change set wave by wave
//!
//! Resources inside one wave are independent and are handed to the
//! provisioner in parallel. A resource whose dependency failed or was skipped
//! is skipped as well, so a failed barrier keeps everything behind it from
//! being created. Removals run last, dependents before their dependencies.

use crate::context::{ApplyContext, ConfirmCallback, ProgressCallback, ProvisionRequest, Provisioner};
use crate::diff::{Change, compute_diffs};
use crate::planner::ExecutionPlan;
use crate::template::{Template, TemplateResource};
use crate::types::{ApplyResult, ExecuteOptions, ExecuteSummary};
use anyhow::Result;
use rayon::prelude::*;
use std::collections::{BTreeSet, HashMap, HashSet};

/// Execute the difference between `desired` and `previous`
///
/// # Arguments
/// * `plan` - Waves of the desired graph
/// * `desired` - Template to converge to
/// * `previous` - Template that was last applied
/// * `opts` - Execution options (dry_run, jobs, verbose)
/// * `provisioner` - Engine that performs each change
/// * `progress` - Progress callback
/// * `confirm` - Confirmation callback
pub fn execute<P, G, C>(
    plan: &ExecutionPlan,
    desired: &Template,
    previous: &Template,
    opts: &ExecuteOptions,
    provisioner: &P,
    progress: &mut G,
    confirm: &mut C,
) -> Result<ExecuteSummary>
where
    P: Provisioner,
    G: ProgressCallback,
    C: ConfirmCallback,
{
    let planned: HashSet<&str> = plan.ordered_ids().collect();
    let diffs: Vec<_> = compute_diffs(desired, previous)
        .into_iter()
        .filter(|d| d.is_removal() || planned.contains(d.resource_id.as_str()))
        .collect();

    if diffs.is_empty() {
        log::info!("Nothing to apply");
        return Ok(ExecuteSummary::default());
    }

    // Confirm before proceeding (unless dry_run)
    if !opts.dry_run && !confirm.confirm("Apply changes?")? {
        return Ok(ExecuteSummary {
            skipped: diffs.len(),
            ..Default::default()
        });
    }

    if opts.dry_run {
        return Ok(ExecuteSummary::default());
    }

    let changes: HashMap<&str, &Change> = diffs
        .iter()
        .filter(|d| !d.is_removal())
        .map(|d| (d.resource_id.as_str(), &d.change))
        .collect();

    let mut summary = ExecuteSummary::default();
    let mut blocked: HashSet<String> = HashSet::new();

    for (index, wave) in plan.waves.iter().enumerate() {
        let mut work: Vec<ProvisionRequest<'_>> = Vec::new();
        for id in wave {
            let Some(resource) = desired.resources.get(id) else {
                continue;
            };
            let Some(&change) = changes.get(id.as_str()) else {
                summary.no_change += 1;
                continue;
            };
            if let Some(dep) = resource.dependencies().into_iter().find(|d| blocked.contains(d)) {
                let result = ApplyResult::Skipped {
                    reason: format!("dependency '{dep}' did not complete"),
                };
                log::warn!("Skipping {id}: dependency '{dep}' did not complete");
                progress.on_resource_complete(id, &result);
                summary.add_result(&result);
                blocked.insert(id.clone());
                continue;
            }
            work.push(ProvisionRequest {
                id,
                resource,
                change,
            });
        }

        if work.is_empty() {
            continue;
        }

        progress.on_wave_start(index, work.len());
        let results = execute_wave(&work, opts, provisioner, progress)?;
        for (id, result) in results {
            summary.add_result(&result);
            if !result.unblocks_dependents() {
                blocked.insert(id);
            }
        }
        progress.on_wave_complete();
    }

    let removals: Vec<&str> = diffs
        .iter()
        .filter(|d| d.is_removal())
        .map(|d| d.resource_id.as_str())
        .collect();
    if !removals.is_empty() {
        let ordered = removal_order(previous, &removals);
        progress.on_wave_start(plan.waves.len(), ordered.len());
        for id in ordered {
            let Some(resource) = previous.resources.get(id) else {
                continue;
            };
            progress.on_resource_start(id, &format!("remove {}", resource.kind));
            let ctx = ApplyContext {
                verbose: opts.verbose,
                wait_ceiling_seconds: None,
            };
            let result = provisioner
                .remove(id, resource, &ctx)
                .unwrap_or_else(|e| ApplyResult::Failed {
                    error: e.to_string(),
                });
            progress.on_resource_complete(id, &result);
            summary.add_result(&result);
        }
        progress.on_wave_complete();
    }

    Ok(summary)
}

/// Apply one wave, in parallel when more than one job is allowed
fn execute_wave<P: Provisioner, G: ProgressCallback>(
    work: &[ProvisionRequest<'_>],
    opts: &ExecuteOptions,
    provisioner: &P,
    progress: &mut G,
) -> Result<Vec<(String, ApplyResult)>> {
    if opts.jobs <= 1 || work.len() == 1 {
        let mut results = Vec::with_capacity(work.len());
        for request in work {
            progress.on_resource_start(request.id, &describe(request));
            let result = apply_resource(request, opts.verbose, provisioner);
            progress.on_resource_complete(request.id, &result);
            results.push((request.id.to_string(), result));
        }
        return Ok(results);
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(opts.jobs)
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to create thread pool: {}", e))?;

    // The progress callback is not thread-safe; report once the wave is done.
    let results: Vec<(String, ApplyResult)> = pool.install(|| {
        work.par_iter()
            .map(|request| {
                (
                    request.id.to_string(),
                    apply_resource(request, opts.verbose, provisioner),
                )
            })
            .collect()
    });

    for (id, result) in &results {
        progress.on_resource_complete(id, result);
    }

    Ok(results)
}

fn apply_resource<P: Provisioner>(
    request: &ProvisionRequest<'_>,
    verbose: bool,
    provisioner: &P,
) -> ApplyResult {
    let ctx = ApplyContext {
        verbose,
        wait_ceiling_seconds: request
            .resource
            .metadata
            .barrier
            .as_ref()
            .map(|b| b.wait_ceiling_seconds),
    };

    match provisioner.provision(request, &ctx) {
        Ok(result) => result,
        Err(e) => ApplyResult::Failed {
            error: e.to_string(),
        },
    }
}

fn describe(request: &ProvisionRequest<'_>) -> String {
    let verb = match request.change {
        Change::Add => "create",
        Change::Modify { .. } => "update",
        Change::Replace { .. } => "replace",
        Change::Remove => "remove",
    };
    format!("{verb} {}", request.resource.kind)
}

/// Order removals so that a resource goes before anything it depended on
fn removal_order<'a>(previous: &Template, ids: &[&'a str]) -> Vec<&'a str> {
    let deps: HashMap<&str, BTreeSet<String>> = ids
        .iter()
        .map(|&id| {
            let deps = previous
                .resources
                .get(id)
                .map(TemplateResource::dependencies)
                .unwrap_or_default();
            (id, deps)
        })
        .collect();

    let mut remaining: Vec<&'a str> = ids.to_vec();
    let mut ordered = Vec::with_capacity(ids.len());
    while !remaining.is_empty() {
        let still: BTreeSet<&str> = remaining.iter().copied().collect();
        // Removable once no other pending resource still depends on it
        let next = remaining
            .iter()
            .position(|candidate| {
                !still.iter().any(|other| {
                    other != candidate
                        && deps
                            .get(other)
                            .is_some_and(|d| d.contains(*candidate))
                })
            })
            .unwrap_or(0);
        ordered.push(remaining.remove(next));
    }
    ordered
}
