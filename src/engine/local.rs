//! Provisioner backed by the local deployment ledger
//!
//! Records what the external engine is asked to reconcile. Barrier nodes are
//! logged with their wait ceiling since the external engine is what blocks.

use anyhow::Result;
use declarative::{
    ApplyContext, ApplyResult, Change, DeletionPolicy, ProvisionRequest, Provisioner, Template,
    TemplateResource,
};
use std::collections::BTreeMap;
use std::sync::Mutex;

pub struct LocalProvisioner {
    resources: Mutex<BTreeMap<String, TemplateResource>>,
}

impl LocalProvisioner {
    /// Start from the resources of the last applied template
    pub fn new(previous: &Template) -> Self {
        Self {
            resources: Mutex::new(previous.resources.clone()),
        }
    }

    /// Resources recorded once execution is over
    pub fn into_resources(self) -> BTreeMap<String, TemplateResource> {
        match self.resources.into_inner() {
            Ok(resources) => resources,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn with_ledger<T>(&self, f: impl FnOnce(&mut BTreeMap<String, TemplateResource>) -> T) -> T {
        match self.resources.lock() {
            Ok(mut locked) => f(&mut locked),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }
}

impl Provisioner for LocalProvisioner {
    fn provision(&self, request: &ProvisionRequest<'_>, ctx: &ApplyContext) -> Result<ApplyResult> {
        if let Some(ceiling) = ctx.wait_ceiling_seconds {
            log::info!(
                "{} blocks its dependents for up to {}s",
                request.id,
                ceiling
            );
        }
        if ctx.verbose {
            log::debug!("Recording {} ({})", request.id, request.resource.kind);
        }

        let result = match request.change {
            Change::Add => ApplyResult::Created,
            Change::Modify { .. } | Change::Replace { .. } => ApplyResult::Modified,
            Change::Remove => anyhow::bail!("{} is scheduled for removal, not provisioning", request.id),
        };

        self.with_ledger(|ledger| {
            ledger.insert(request.id.to_string(), request.resource.clone());
        });
        Ok(result)
    }

    fn remove(
        &self,
        id: &str,
        resource: &TemplateResource,
        _ctx: &ApplyContext,
    ) -> Result<ApplyResult> {
        self.with_ledger(|ledger| ledger.remove(id));

        if resource.deletion_policy == Some(DeletionPolicy::Retain) {
            log::info!("{id} is retained and left in place");
            return Ok(ApplyResult::Retained);
        }
        Ok(ApplyResult::Removed)
    }
}
