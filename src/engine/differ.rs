//! Change-set display

use colored::Colorize;
use declarative::{Change, DiffSummary, ResourceDiff, Template, group_by_type};

/// Display a list of diffs in a user-friendly format
pub fn display_diff(diffs: &[ResourceDiff]) {
    if diffs.is_empty() {
        println!();
        println!("  {} No changes needed", "✓".green());
        return;
    }

    let by_type = group_by_type(diffs);
    let mut kinds: Vec<&String> = by_type.keys().collect();
    kinds.sort();

    println!();
    println!(
        "┌─ {} ─────────────────────────────────────────┐",
        "Stack Diff".bold()
    );
    println!("│");

    for kind in kinds {
        println!("│ {}", kind.bold());

        for diff in &by_type[kind] {
            let symbol = match &diff.change {
                Change::Add => "+".green(),
                Change::Remove => "-".red(),
                Change::Modify { .. } => "~".yellow(),
                Change::Replace { .. } => "±".magenta(),
            };

            let detail = match &diff.change {
                Change::Add => "(new)".to_string(),
                Change::Remove => "(will remove)".to_string(),
                Change::Modify { changed_keys } => changed_keys.join(", "),
                Change::Replace { from_kind } => format!("(replaces {from_kind})"),
            };

            println!(
                "│   {} {:<36} {}",
                symbol,
                diff.resource_id,
                detail.dimmed()
            );
        }
        println!("│");
    }

    let summary = DiffSummary::from_diffs(diffs);
    println!("├─────────────────────────────────────────────────────┤");
    println!(
        "│ Summary: {} changes ({} to add, {} to change, {} to remove)",
        summary.total().to_string().bold(),
        summary.additions.to_string().green(),
        summary.modifications.to_string().yellow(),
        summary.removals.to_string().red()
    );
    println!("└─────────────────────────────────────────────────────┘");
}

/// Show property-level changes of modified resources
pub fn display_property_diffs(diffs: &[ResourceDiff], desired: &Template, previous: &Template) {
    for diff in diffs.iter().filter(|d| d.is_modification()) {
        let before = render_properties(previous, &diff.resource_id);
        let after = render_properties(desired, &diff.resource_id);

        println!();
        println!("  {}", diff.resource_id.bold());
        let text = similar::TextDiff::from_lines(&before, &after);
        for change in text.iter_all_changes() {
            match change.tag() {
                similar::ChangeTag::Delete => print!("    {}", format!("- {change}").red()),
                similar::ChangeTag::Insert => print!("    {}", format!("+ {change}").green()),
                similar::ChangeTag::Equal => {}
            }
        }
    }
}

fn render_properties(template: &Template, id: &str) -> String {
    let Some(resource) = template.resources.get(id) else {
        return String::new();
    };
    let mut text = serde_json::to_string_pretty(&resource.properties).unwrap_or_default();
    text.push('\n');
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::TemplateResource;
    use declarative::template::ResourceMetadata;
    use serde_json::json;

    fn resource(props: serde_json::Value) -> TemplateResource {
        TemplateResource {
            kind: "AWS::SQS::Queue".to_string(),
            properties: props.as_object().cloned().unwrap_or_default(),
            depends_on: Vec::new(),
            deletion_policy: None,
            metadata: ResourceMetadata::default(),
        }
    }

    #[test]
    fn test_render_properties_is_line_oriented() {
        let mut template = Template::default();
        template.resources.insert(
            "Queue".to_string(),
            resource(json!({ "VisibilityTimeout": 3600 })),
        );

        let text = render_properties(&template, "Queue");
        assert!(text.contains("\"VisibilityTimeout\": 3600"));
        assert!(text.ends_with('\n'));
        assert!(render_properties(&template, "Missing").is_empty());
    }
}
