//! Dialog Player Binary
//!
//! Plays a dialog from the JSON file store in the terminal.
//!
//! ## Configuration
//!
//! Environment variables:
//! - `DIALOG_DATA_DIR`: Root of the file store (default: ./data)
//! - `DIALOG_SAVE_*`: Save policy overrides, see `SavePolicy::from_env`
//! - `RUST_LOG`: Log level filter (default: info)
//! - `LOG_FORMAT`: "json" for structured logs, "pretty" for development (default: pretty)
//!
//! Logs go to stderr; the conversation goes to stdout.
//!
//! ## Usage
//!
//! ```bash
//! DIALOG_DATA_DIR=./data cargo run --bin dialog_player -- <project_id> <dialog_id>
//! ```
//!
//! Enter continues, a number picks a choice, `r` restarts, `q` quits.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use dialog_graph_kernel::{
    DialogEditor, FileBackend, PlayEngine, PlayState, SavePolicy, StepContent,
};

/// Initialize the tracing subscriber with JSON or pretty format
fn init_tracing() {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "dialog_player=info,dialog_graph_kernel=warn".into());

    if log_format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_writer(std::io::stderr)
                    .flatten_event(true),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}

/// Print visible steps from `shown` on; returns the new count.
fn render(engine: &PlayEngine, shown: usize) -> usize {
    let steps = engine.visible_steps();
    for step in steps.iter().skip(shown) {
        match &step.content {
            StepContent::Dialog { content, speaker } => {
                println!("{}: {}", speaker.unwrap_or("???"), content);
            }
            StepContent::Choice { choices, selected } => {
                for (i, choice) in choices.iter().enumerate() {
                    let marker = if Some(choice.id.as_str()) == *selected { ">" } else { " " };
                    println!("  {marker} {}. {}", i + 1, choice.content);
                }
            }
        }
    }
    if engine.is_ended() {
        println!("[end]  r: restart, q: quit");
    }
    steps.len()
}

/// Apply one line of player input. Returns false to quit.
fn handle_input(engine: &mut PlayEngine, input: &str, shown: &mut usize) -> bool {
    match input {
        "q" => return false,
        "r" => {
            engine.restart();
            *shown = 0;
            println!("--- restart ---");
        }
        "" => {
            if let Err(e) = engine.advance() {
                println!("({e})");
            }
        }
        number => {
            let PlayState::AwaitingChoice { node, history_index } = engine.state().clone() else {
                println!("(nothing to choose)");
                return true;
            };
            let choice_id = number
                .parse::<usize>()
                .ok()
                .and_then(|n| n.checked_sub(1))
                .and_then(|i| {
                    engine
                        .graph()
                        .node(&node)
                        .and_then(|n| n.as_choices())
                        .and_then(|set| set.choices.get(i))
                        .map(|c| c.id.clone())
                });
            match choice_id {
                Some(choice_id) => {
                    // The prompt was already printed; reprint it with the marker.
                    *shown = shown.saturating_sub(1);
                    if let Err(e) = engine.select_choice(history_index, &choice_id) {
                        println!("({e})");
                    }
                }
                None => println!("(pick a number from the list)"),
            }
        }
    }
    true
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let mut args = std::env::args().skip(1);
    let (Some(project_id), Some(dialog_id)) = (args.next(), args.next()) else {
        eprintln!("usage: dialog_player <project_id> <dialog_id>");
        return Err("missing arguments".into());
    };

    let data_dir = std::env::var("DIALOG_DATA_DIR").unwrap_or_else(|_| "./data".to_string());
    let policy = SavePolicy::from_env();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        data_dir = %data_dir,
        project_id = %project_id,
        dialog_id = %dialog_id,
        "Starting dialog player"
    );

    let backend = Arc::new(FileBackend::new(&data_dir));
    let editor = DialogEditor::open(backend, project_id, &dialog_id, policy).await?;
    let mut engine = editor.start_play().await?;
    info!(nodes = engine.graph().num_nodes(), "Playing");

    let mut shown = render(&engine, 0);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                if !handle_input(&mut engine, line.trim(), &mut shown) {
                    break;
                }
                shown = render(&engine, shown);
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, closing");
                break;
            }
        }
    }

    editor.close().await?;
    info!("Dialog player shutdown complete");
    Ok(())
}
