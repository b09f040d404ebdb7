//! Command implementations
//!
//! Every command starts from a [`Session`]: the loaded configuration and the
//! stack graph built from it.

pub mod audit;
pub mod deploy;
pub mod graph;
pub mod outputs;
pub mod plan;
pub mod synth;

use anyhow::{Context as AnyhowContext, Result};
use declarative::{Environment, ResourceGraph, Resolver, Severity, Template};
use std::collections::BTreeMap;

use crate::Context;
use crate::assets::StackAssets;
use crate::config::StackConfig;
use crate::stack::{self, StackInputs};
use crate::ui;

pub struct Session {
    pub config: StackConfig,
    pub graph: ResourceGraph,
    environment: Environment,
}

impl Session {
    /// Load configuration and build the stack graph
    pub fn open(ctx: &Context) -> Result<Self> {
        let (config, path) = StackConfig::load(ctx.config.as_deref())?;
        match &path {
            Some(p) => log::info!("Using config {}", p.display()),
            None => log::info!("Using default configuration"),
        }

        let supplied = config.supplied_parameters(&ctx.parameters)?;
        let assets = StackAssets::locate(&config.assets_root())?;
        let graph = stack::build(&StackInputs {
            parameters: &supplied,
            assets: &assets,
        })
        .context("Failed to build the stack graph")?;
        log::debug!(
            "Built {} resources and {} edges",
            graph.len(),
            graph.edges().len()
        );

        let environment = config.environment();
        Ok(Self {
            config,
            graph,
            environment,
        })
    }

    pub fn stack_name(&self) -> &str {
        &self.config.stack.name
    }

    /// Resolver substituting parameter values and the configured environment
    pub fn resolver(&self) -> Resolver<'_> {
        Resolver::with_environment(self.graph.values(), &self.environment)
    }

    /// The template that `apply` converges to
    pub fn desired(&self) -> Template {
        Template::synthesize(&self.graph, &self.resolver())
    }

    /// Output values, limited to outputs whose source is in `provisioned`
    pub fn outputs_for<F>(&self, provisioned: F) -> BTreeMap<String, String>
    where
        F: Fn(&str) -> bool,
    {
        let resolved = Template::resolve_outputs(&self.graph, &self.resolver());
        self.graph
            .outputs()
            .iter()
            .filter(|o| provisioned(&o.source))
            .filter_map(|o| resolved.get(&o.name).map(|v| (o.name.clone(), v.clone())))
            .collect()
    }

    /// Print warning annotations, unless quiet
    pub fn flag_warnings(&self, ctx: &Context) {
        if ctx.quiet {
            return;
        }
        for node in self.graph.nodes() {
            for annotation in node
                .annotations
                .iter()
                .filter(|a| a.severity == Severity::Warning)
            {
                ui::warn(&format!("{}: {}", node.id, annotation.message));
            }
        }
    }
}
