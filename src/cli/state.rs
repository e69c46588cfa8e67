use anyhow::Result;

use crate::core::config::Settings;
use crate::core::state::{PollState, StateStore};
use crate::core::terminal::{print_info, print_status};

pub fn run_state(args: &[String], start: usize) -> Result<()> {
    let (mut settings, _) = Settings::from_env();
    settings.apply_flags(args, start);

    let store = StateStore::new(&settings.state);
    if !store.exists() {
        print_info(&format!(
            "No state at {}, the next run starts from the newest process",
            store.path().display()
        ));
        return Ok(());
    }

    let state = store.load()?;
    print_status("State file", &store.path().display().to_string());
    for (label, value) in describe(&state) {
        print_status(label, &value);
    }
    Ok(())
}

fn describe(state: &PollState) -> Vec<(&'static str, String)> {
    let last_poll = state
        .last_poll_timestamp
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "never".to_string());
    let in_flight = if state.executing_processes.is_empty() {
        "none".to_string()
    } else {
        state
            .executing_processes
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    };
    vec![
        ("Last process id", state.last_poll_process_id.to_string()),
        ("Last poll", last_poll),
        ("In flight", in_flight),
    ]
}
