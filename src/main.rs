use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};

use scholar_wizard::api::{HttpSyncClient, SyncClient};
use scholar_wizard::config::Config;
use scholar_wizard::logging;
use scholar_wizard::profile::{FieldName, FieldValue};
use scholar_wizard::rest::{self, ApiState};
use scholar_wizard::state::PersistenceAdapter;
use scholar_wizard::steps::{StepKind, StepRegistry};
use scholar_wizard::wizard::{
    FinalizationHandler, LoadingPhase, ResultView, ReturnIntent, Transition, Wizard,
    WizardHandle, WizardSnapshot,
};

#[derive(Parser)]
#[command(name = "scholar-wizard")]
#[command(about = "Find scholarships that fit you, one question at a time")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file path
    #[arg(short, long)]
    config: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the questionnaire (default), resuming saved progress
    Run,

    /// Show saved progress
    Status,

    /// Discard saved progress
    Reset {
        /// Skip confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Run a local stub of the scoring service
    ServeStub {
        /// Port to listen on (default: 7010)
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref())?;

    // The questionnaire owns the terminal, everything else logs to stderr
    let interactive = matches!(cli.command, None | Some(Commands::Run));
    let logging_handle = logging::init_logging(&config, interactive, cli.debug)?;

    match cli.command {
        None | Some(Commands::Run) => {
            run_wizard(config, logging_handle.log_file_path).await?;
        }
        Some(Commands::Status) => {
            cmd_status(&config)?;
        }
        Some(Commands::Reset { yes }) => {
            cmd_reset(&config, yes).await?;
        }
        Some(Commands::ServeStub { port }) => {
            let port = port.unwrap_or(config.stub.port);
            rest::serve(ApiState::new(), port).await?;
        }
    }

    Ok(())
}

/// A line typed at a prompt
enum Input {
    Back,
    Quit,
    Line(String),
}

struct Terminal {
    lines: Lines<BufReader<Stdin>>,
}

impl Terminal {
    fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }

    async fn prompt(&mut self, text: &str) -> Result<Input> {
        let mut stdout = tokio::io::stdout();
        stdout.write_all(text.as_bytes()).await?;
        stdout.flush().await?;

        let Some(line) = self.lines.next_line().await? else {
            return Ok(Input::Quit);
        };
        let line = line.trim().to_string();
        Ok(match line.to_lowercase().as_str() {
            "b" | "back" => Input::Back,
            "q" | "quit" => Input::Quit,
            _ => Input::Line(line),
        })
    }
}

async fn run_wizard(config: Config, log_file_path: Option<PathBuf>) -> Result<()> {
    let client: Arc<dyn SyncClient> = Arc::new(
        HttpSyncClient::from_config(&config.remote).context("Failed to set up scoring client")?,
    );
    let finalizer = FinalizationHandler::new(Arc::clone(&client), &config.finalize);
    let mut phases = finalizer.subscribe();

    let wizard = Wizard::mount(
        StepRegistry::standard(),
        client,
        PersistenceAdapter::from_config(&config),
        finalizer,
        ReturnIntent::new(),
    );
    match wizard.return_intent().take() {
        Some(target) if wizard.step_index() > 0 => println!("{}", target.greeting()),
        _ => {}
    }
    let (handle, task) = WizardHandle::spawn(wizard);

    tokio::spawn(async move {
        while phases.changed().await.is_ok() {
            if *phases.borrow_and_update() == LoadingPhase::Resolving {
                println!("Preparing your recommendations...");
            }
        }
    });

    let mut terminal = Terminal::new();
    let result = drive(&handle, &mut terminal).await;

    drop(handle);
    let _ = task.await;

    if let Some(log_path) = log_file_path {
        if log_path.metadata().map(|m| m.len() > 0).unwrap_or(false) {
            eprintln!("Session log: {}", log_path.display());
        }
    }

    result
}

async fn drive(handle: &WizardHandle, terminal: &mut Terminal) -> Result<()> {
    loop {
        let snapshot = handle.snapshot().await?;
        render(&snapshot);

        let action = match snapshot.step.kind {
            StepKind::Entry => terminal.prompt("Press Enter to start (q to quit) ").await?,
            StepKind::Result => {
                terminal
                    .prompt("Enter to continue, b to go back, q to quit ")
                    .await?
            }
            StepKind::Collect => match ask_fields(handle, terminal, &snapshot).await? {
                Some(action) => action,
                None => Input::Line(String::new()),
            },
        };

        let outcome = match action {
            Input::Quit => {
                println!("Progress saved. Run again to continue.");
                return Ok(());
            }
            Input::Back => handle.retreat().await,
            Input::Line(_) => handle.advance().await,
        };

        match outcome {
            Ok(Transition::Finished(redirect)) => {
                println!();
                println!("Your recommendations are ready: {}", redirect.target);
                return Ok(());
            }
            Ok(_) => {}
            Err(e) if e.is_retryable() => println!("! {}", e.user_message()),
            Err(e) => return Err(e.into()),
        }
    }
}

/// Ask every owned field of a collect step. Returns an action that interrupts the step.
async fn ask_fields(
    handle: &WizardHandle,
    terminal: &mut Terminal,
    snapshot: &WizardSnapshot,
) -> Result<Option<Input>> {
    for field in &snapshot.step.owned_fields {
        loop {
            let current = snapshot.profile.get(*field);
            let text = match current {
                Some(value) => format!("{} [{}]: ", field.prompt(), value),
                None => format!("{}{}: ", field.prompt(), choices_hint(*field)),
            };

            let line = match terminal.prompt(&text).await? {
                Input::Line(line) => line,
                other => return Ok(Some(other)),
            };
            if line.is_empty() && current.is_some() {
                break;
            }

            match FieldValue::parse_input(*field, &line) {
                Ok(value) => match handle.set_field(*field, value).await {
                    Ok(()) => break,
                    Err(e) => println!("! {}", e.user_message()),
                },
                Err(message) => println!("! {}", message),
            }
        }
    }
    Ok(None)
}

fn choices_hint(field: FieldName) -> String {
    match field.kind() {
        scholar_wizard::profile::FieldKind::Choice(options) => format!(" ({})", options.join("/")),
        scholar_wizard::profile::FieldKind::Flag => " (y/n)".to_string(),
        _ => String::new(),
    }
}

fn render(snapshot: &WizardSnapshot) {
    println!();
    println!("{} ({}%)", snapshot.progress, snapshot.percentage);
    println!("{}", "─".repeat(60));
    println!("{}", snapshot.step.title);

    match &snapshot.results {
        ResultView::Fresh(results) if results.is_empty() => {
            println!("No scholarships match your answers yet.");
        }
        ResultView::Fresh(results) => {
            for (rank, r) in results.iter().enumerate() {
                let deadline = r
                    .deadline
                    .map(|d| format!(", deadline {}", d))
                    .unwrap_or_default();
                println!(
                    "  {}. {} - {} (score {:.2}{})",
                    rank + 1,
                    r.name,
                    r.provider,
                    r.score,
                    deadline
                );
            }
        }
        ResultView::Stale => {
            println!("These matches are out of date. Continue to refresh them on the next step.");
        }
        ResultView::NotResultStep => {}
    }
}

fn cmd_status(config: &Config) -> Result<()> {
    let persistence = PersistenceAdapter::from_config(config);
    let Some(saved) = persistence.load() else {
        println!("No saved progress");
        return Ok(());
    };

    let registry = StepRegistry::standard();
    match registry.describe(saved.step_index) {
        Ok(step) => println!(
            "Step {}/{}: {}",
            saved.step_index,
            registry.last_index(),
            step.title
        ),
        Err(e) => println!("Saved progress is unusable: {}", e),
    }
    println!(
        "Session: {}",
        saved.profile.session_id.as_deref().unwrap_or("(none)")
    );
    println!("{}", "─".repeat(60));
    for (field, value) in &saved.profile.fields {
        println!("  {:<45} {}", field.prompt(), value);
    }

    Ok(())
}

async fn cmd_reset(config: &Config, skip_confirm: bool) -> Result<()> {
    if !skip_confirm {
        let mut terminal = Terminal::new();
        match terminal.prompt("Discard saved progress? [y/N] ").await? {
            Input::Line(line) if line.eq_ignore_ascii_case("y") => {}
            _ => {
                println!("Cancelled");
                return Ok(());
            }
        }
    }

    PersistenceAdapter::from_config(config)
        .clear()
        .context("Failed to clear saved progress")?;
    println!("Saved progress discarded");
    Ok(())
}
