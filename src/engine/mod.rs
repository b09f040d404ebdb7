//! Execution engine for vfstack
//!
//! The engine ties the wave executor to:
//! 1. Display - change sets and property diffs
//! 2. Progress - a terminal progress bar and confirmation prompt
//! 3. Provisioning - the local deployment ledger

pub mod differ;
pub mod executor;
pub mod local;

pub use executor::{DialoguerConfirm, UiProgress, print_summary};
pub use local::LocalProvisioner;
