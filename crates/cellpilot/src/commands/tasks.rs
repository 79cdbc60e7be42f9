//! Tasks command

use anyhow::Result;
use camino::Utf8Path;
use cellpilot_core::types::TaskSpec;
use std::collections::BTreeMap;

use crate::cli::TasksArgs;
use crate::output;

pub fn run(args: TasksArgs, config_path: Option<&Utf8Path>) -> Result<()> {
    let config = super::load_config(config_path)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&config.tasks)?);
        return Ok(());
    }

    for (group, tasks) in group_tasks(&config.tasks) {
        output::header(group);
        for (name, task) in tasks {
            let description = task.description.as_deref().unwrap_or("");
            output::kv(
                name,
                &format!(
                    "{} ({:.1}s, {:.0}% transient failures)",
                    description,
                    task.duration().as_secs_f64(),
                    task.failure_rate * 100.0
                ),
            );
        }
    }

    Ok(())
}

/// Tasks keyed by group, each group in name order
fn group_tasks(tasks: &BTreeMap<String, TaskSpec>) -> BTreeMap<&str, Vec<(&str, &TaskSpec)>> {
    let mut groups: BTreeMap<&str, Vec<(&str, &TaskSpec)>> = BTreeMap::new();
    for (name, task) in tasks {
        groups
            .entry(task.group.as_str())
            .or_default()
            .push((name.as_str(), task));
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellpilot_core::types::CellpilotConfig;

    #[test]
    fn test_default_catalog_groups() {
        let config = CellpilotConfig::default();
        let groups = group_tasks(&config.tasks);

        let market: Vec<&str> = groups["Market"].iter().map(|(name, _)| *name).collect();
        let portfolio: Vec<&str> = groups["Portfolio"].iter().map(|(name, _)| *name).collect();

        assert_eq!(groups.len(), 2);
        assert_eq!(market, vec!["correl", "risk", "stocks"]);
        assert_eq!(portfolio, vec!["optim", "perf", "report", "scenario"]);
    }
}
