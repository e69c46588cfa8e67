use anyhow::{Context, Result};

use crate::core::config::Settings;
use crate::core::hooks::{Hook, HookSet, matcher};
use crate::core::process::{ProcessStore, ProcessTypeLookup, SqliteProcessStore};
use crate::core::terminal::{print_hook, print_info, print_success, print_warn};

pub async fn run_validate(args: &[String], start: usize) -> Result<()> {
    let (mut settings, _) = Settings::from_env();
    settings.apply_flags(args, start);
    let check_db = args[start.min(args.len())..].iter().any(|a| a == "--db");

    let hooks = HookSet::load(&settings.webhooks).await?;
    hooks.validate().with_context(|| {
        format!(
            "{} is not a valid webhook configuration",
            settings.webhooks.display()
        )
    })?;

    print_success(&format!(
        "{} webhook(s) in {} are valid",
        hooks.len(),
        settings.webhooks.display()
    ));
    for hook in hooks.iter() {
        print_hook(&hook.description, &summarize(hook));
    }

    if check_db {
        let store = SqliteProcessStore::open(&settings.database)?;
        let lookup = store
            .process_types()
            .await
            .context("Failed to load process types")?;
        let unknown = unknown_process_types(&hooks, &lookup);
        if unknown.is_empty() {
            print_info(&format!(
                "All process types resolve against {} ({} known)",
                settings.database.display(),
                lookup.len()
            ));
        }
        for (description, code) in unknown {
            print_warn(&format!(
                "Webhook '{}' names process type '{}', which {} does not know",
                description,
                code,
                settings.database.display()
            ));
        }
    }
    Ok(())
}

fn summarize(hook: &Hook) -> String {
    format!(
        "{} {} on {}",
        hook.method,
        hook.url,
        matcher::set_criteria(&hook.triggers).join(" + ")
    )
}

/// (description, code) for every hook whose process type code is not in `lookup`.
fn unknown_process_types(hooks: &HookSet, lookup: &ProcessTypeLookup) -> Vec<(String, String)> {
    hooks
        .iter()
        .filter(|h| {
            !h.triggers.process_type.is_empty()
                && lookup.name_for(&h.triggers.process_type).is_none()
        })
        .map(|h| (h.description.clone(), h.triggers.process_type.clone()))
        .collect()
}
