mod run;
mod state;
mod validate;

use anyhow::Result;
use console::style;

use crate::core::terminal::{self, GuideSection, print_error};

pub(crate) const VERSION: &str = env!("CARGO_PKG_VERSION");

fn print_help() {
    terminal::print_banner();

    GuideSection::new("Commands")
        .command("run", "Watch the process table and fire webhooks (default)")
        .command("validate", "Check the webhook configuration and exit")
        .command("state", "Show the saved poll cursor and in-flight processes")
        .command("version", "Print the version")
        .command("help", "Show this message")
        .print();

    GuideSection::new("Options")
        .text("--config, -c <file>   Webhook configuration (default: webhook.yaml)")
        .text("--db <file>           Process database (default: processes.db)")
        .text("--state <file>        Poll state file (default: dozer.state)")
        .text("--interval <secs>     Seconds between polls (default: 5)")
        .text("--log-file <file>     Also append logs to this file")
        .print();

    GuideSection::new("Environment")
        .text("POLL_INTERVAL_SECONDS  DOZER_DATABASE  DOZER_WEBHOOKS  DOZER_STATE")
        .text("WEBHOOK_TIMEOUT_SECONDS  DISPATCH_CONCURRENCY  LOG_LEVEL")
        .blank()
        .text("Flags take precedence over the environment.")
        .print();

    println!(
        "\n {} {} <command> [options]\n",
        style("Usage:").bold(),
        style("dozer").green()
    );
}

/// The command to run and the index its flags start at. Bare flags with no
/// command mean `run`.
pub(crate) fn parse_command(args: &[String]) -> (&str, usize) {
    match args.get(1).map(String::as_str) {
        None => ("run", 1),
        Some(flag)
            if flag.starts_with('-')
                && !matches!(flag, "-h" | "--help" | "-V" | "--version") =>
        {
            ("run", 1)
        }
        Some(cmd) => (cmd, 2),
    }
}

pub async fn run_main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let (cmd, start) = parse_command(&args);

    match cmd {
        "run" => run::run_watch(&args, start).await,
        "validate" => validate::run_validate(&args, start).await,
        "state" => state::run_state(&args, start),
        "version" | "--version" | "-V" => {
            println!("dozer {}", VERSION);
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_help();
            Ok(())
        }
        _ => {
            print_error(&format!("Unknown command: {}", cmd));
            print_help();
            Ok(())
        }
    }
}
