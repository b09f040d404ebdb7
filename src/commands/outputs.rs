//! `vfstack outputs`

use anyhow::Result;

use super::Session;
use crate::Context;
use crate::state::DeployState;
use crate::ui;

pub fn run(ctx: &Context) -> Result<()> {
    let session = Session::open(ctx)?;
    let state = DeployState::load(session.stack_name())?;

    let (values, title) = if state.is_deployed() {
        let title = match state.last_applied {
            Some(at) => format!("{} (applied {})", session.stack_name(), at.format("%Y-%m-%d %H:%M UTC")),
            None => session.stack_name().to_string(),
        };
        (state.outputs.clone(), title)
    } else {
        ui::warn("Stack is not applied; showing the values it would produce");
        (
            session.outputs_for(|_| true),
            format!("{} (expected)", session.stack_name()),
        )
    };

    ui::header(&title);
    for binding in session.graph.outputs() {
        let Some(value) = values.get(&binding.name) else {
            continue;
        };
        ui::kv(&binding.name, value);
        if ctx.verbose > 0 {
            let export = binding
                .export_name
                .as_deref()
                .map(|e| format!(" [export {e}]"))
                .unwrap_or_default();
            ui::dim(&format!("  {}{export}", binding.description));
        }
    }
    Ok(())
}
