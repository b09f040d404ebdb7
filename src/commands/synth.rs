//! `vfstack synth` - render the template handed to the provisioning engine

use anyhow::{Context as AnyhowContext, Result};
use declarative::{Resolver, Template};
use std::fs;
use std::path::{Path, PathBuf};

use super::Session;
use crate::Context;
use crate::cli::SynthArgs;
use crate::ui;

pub fn run(ctx: &Context, args: SynthArgs) -> Result<()> {
    let session = Session::open(ctx)?;

    let template = if args.resolved {
        session.desired()
    } else {
        Template::synthesize(&session.graph, &Resolver::symbolic())
    };
    let json = template
        .to_json_pretty()
        .context("Failed to render template")?;

    if args.stdout {
        println!("{json}");
        return Ok(());
    }

    session.flag_warnings(ctx);
    let dir = args.out.unwrap_or_else(|| session.config.output_dir());
    let path = write_template(&dir, session.stack_name(), &json)?;

    if !ctx.quiet {
        ui::success(&format!(
            "Synthesized {} resources to {}",
            template.resources.len(),
            path.display()
        ));
    }
    Ok(())
}

fn write_template(dir: &Path, stack: &str, json: &str) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory: {}", dir.display()))?;
    let path = dir.join(format!("{stack}.template.json"));
    fs::write(&path, json)
        .with_context(|| format!("Failed to write template: {}", path.display()))?;
    log::info!("Wrote {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_template_creates_directory() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("cdk.out");

        let path = write_template(&dir, "VfAmiCdkStack", "{}").unwrap();

        assert_eq!(path, dir.join("VfAmiCdkStack.template.json"));
        assert_eq!(fs::read_to_string(path).unwrap(), "{}");
    }
}
