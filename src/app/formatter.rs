use crate::app::models::{EntryState, Origin, Plan};
use anyhow::{Context, Result};

pub struct OutputGenerator;

impl OutputGenerator {
    pub fn status(plan: &Plan) -> String {
        let mut sections = vec![
            format!(
                "Default Synchronizer\n{} -> {}",
                plan.default_src.display(),
                plan.default_dest.display()
            ),
            Self::items(plan),
            Self::sync_list(plan),
        ];

        let excluded = Self::excluded(plan);
        if !excluded.is_empty() {
            sections.push(excluded);
        }

        sections.join("\n\n")
    }

    fn items(plan: &Plan) -> String {
        let mut output = String::from("Items");

        for entry in &plan.entries {
            let origin = match entry.origin {
                Origin::Implicit => "implicit",
                Origin::Declared => "declared",
            };
            let status = match &entry.state {
                EntryState::Enabled => "Enabled".to_string(),
                EntryState::Disabled => "Disabled".to_string(),
                EntryState::Excluded(pattern) => format!("Excluded by '{}'", pattern),
            };

            output.push_str(&format!("\n{}", entry.source.display()));
            output.push_str(&format!("\n    Destination  {}", entry.destination.display()));
            if let Some(anchor) = &entry.anchor {
                output.push_str(&format!("\n    Inherited    {}", anchor.display()));
            }
            output.push_str(&format!("\n    Origin       {}", origin));
            output.push_str(&format!("\n    Status       {}", status));
        }

        output
    }

    fn sync_list(plan: &Plan) -> String {
        let mut output = String::from("Sync List");
        if plan.tasks.is_empty() {
            output.push_str("\n(nothing to sync)");
        }

        for task in &plan.tasks {
            output.push_str(&format!(
                "\n{} -> {}",
                task.source.display(),
                task.destination.display()
            ));
            if !task.skip.is_empty() {
                let skip: Vec<String> = task
                    .skip
                    .iter()
                    .map(|p| p.to_string_lossy().into_owned())
                    .collect();
                output.push_str(&format!(" (skip: {})", skip.join(", ")));
            }
        }

        output
    }

    fn excluded(plan: &Plan) -> String {
        let lines: Vec<String> = plan
            .entries
            .iter()
            .filter_map(|entry| match &entry.state {
                EntryState::Enabled => None,
                EntryState::Disabled => Some(format!("{} (disabled)", entry.source.display())),
                EntryState::Excluded(pattern) => {
                    Some(format!("{} ({})", entry.source.display(), pattern))
                }
            })
            .collect();

        if lines.is_empty() {
            return String::new();
        }
        format!("Excluded\n{}", lines.join("\n"))
    }

    pub fn json(plan: &Plan) -> Result<String> {
        serde_json::to_string_pretty(plan).context("Failed to serialize plan")
    }
}
