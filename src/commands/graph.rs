//! `vfstack graph` - Graphviz rendering of the dependency graph

use anyhow::Result;

use super::Session;
use crate::Context;

pub fn run(ctx: &Context) -> Result<()> {
    let session = Session::open(ctx)?;
    print!("{}", session.graph.to_dot());
    Ok(())
}
