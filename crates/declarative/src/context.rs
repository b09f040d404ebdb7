//! Provider traits for execution
//!
//! These traits let the executor run without depending on a specific
//! provisioning engine, UI framework or prompt implementation.

use crate::diff::Change;
use crate::template::TemplateResource;
use crate::types::ApplyResult;
use anyhow::Result;

/// One resource handed to the provisioning engine
#[derive(Debug, Clone, Copy)]
pub struct ProvisionRequest<'a> {
    pub id: &'a str,
    pub resource: &'a TemplateResource,
    pub change: &'a Change,
}

/// Seam to the engine that reconciles declarations against live state
///
/// Implementations are called from a thread pool and must be `Sync`.
pub trait Provisioner: Send + Sync {
    /// Create, update or replace a resource
    fn provision(&self, request: &ProvisionRequest<'_>, ctx: &ApplyContext) -> Result<ApplyResult>;

    /// Remove a resource that is no longer declared
    fn remove(&self, id: &str, resource: &TemplateResource, ctx: &ApplyContext)
    -> Result<ApplyResult>;
}

/// Progress callback for execution operations
pub trait ProgressCallback: Send {
    /// Called when starting a wave of independent resources
    fn on_wave_start(&mut self, wave: usize, count: usize);

    /// Called when starting to apply a single resource
    fn on_resource_start(&mut self, id: &str, description: &str);

    /// Called when a resource application completes
    fn on_resource_complete(&mut self, id: &str, result: &ApplyResult);

    /// Called when a wave completes
    fn on_wave_complete(&mut self);
}

/// Confirmation callback for user interaction
pub trait ConfirmCallback: Send {
    /// Ask the user to confirm an action
    ///
    /// Returns `true` if the user confirmed.
    fn confirm(&mut self, prompt: &str) -> Result<bool>;
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_wave_start(&mut self, _wave: usize, _count: usize) {}
    fn on_resource_start(&mut self, _id: &str, _description: &str) {}
    fn on_resource_complete(&mut self, _id: &str, _result: &ApplyResult) {}
    fn on_wave_complete(&mut self) {}
}

/// Auto-confirm callback (always returns true)
pub struct AutoConfirm;

impl ConfirmCallback for AutoConfirm {
    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        Ok(true)
    }
}

/// Auto-decline callback (always returns false)
pub struct AutoDecline;

impl ConfirmCallback for AutoDecline {
    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        Ok(false)
    }
}

/// Context passed to provisioner operations
#[derive(Debug, Clone, Copy, Default)]
pub struct ApplyContext {
    /// Whether to output verbose information
    pub verbose: bool,
    /// Wait ceiling of the resource being applied, when it is a barrier
    pub wait_ceiling_seconds: Option<u64>,
}
