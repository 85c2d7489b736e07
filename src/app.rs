//! Binary entry logic: wires the CLI onto a [`Workspace`].

use std::io::{self, IsTerminal, Write};
use std::path::Path;

use anyhow::{Context, Result};

use crate::cli::{Cli, Commands, ConfigAction, ReportFormat, ScanArgs};
use crate::config::Config;
use crate::control::OperationState;
use crate::error::ExitCode;
use crate::logging;
use crate::progress::ProgressDisplay;
use crate::registry::FileState;
use crate::report::{write_batch_report, write_text_report, JsonReport};
use crate::signal;
use crate::workspace::{RunSummary, Workspace, WorkspaceError};

/// Run the parsed command line and return the process exit code.
///
/// # Errors
///
/// Returns an error for configuration problems, invalid folders, or a scan
/// that ends in the `error` state.
pub fn run_app(cli: Cli) -> Result<ExitCode> {
    let Cli {
        verbose,
        quiet,
        no_color,
        config,
        command,
        ..
    } = cli;
    logging::init_logging(verbose, quiet);

    match command {
        Commands::Scan(args) => {
            let mut settings = Config::load(config.as_deref())?;
            args.apply_to(&mut settings);
            let ui = Ui { quiet, no_color };
            run_scan(&args, &settings, &ui)
        }
        Commands::Config(args) => run_config(args.action, config.as_deref()),
    }
}

struct Ui {
    quiet: bool,
    no_color: bool,
}

fn run_scan(args: &ScanArgs, settings: &Config, ui: &Ui) -> Result<ExitCode> {
    let workspace =
        Workspace::new(settings.workspace_config()).context("failed to set up workspace")?;
    for folder in &args.folders {
        workspace
            .add_folder(folder)
            .with_context(|| format!("cannot scan {}", folder.display()))?;
    }

    let shutdown = match signal::install_handler() {
        Ok(handler) => {
            handler.attach(workspace.controller());
            Some(handler)
        }
        Err(e) => {
            log::warn!("{e}; Ctrl+C will terminate immediately");
            None
        }
    };
    let code = scan_and_act(&workspace, args, ui);
    if let Some(handler) = shutdown {
        handler.detach();
    }
    code
}

fn scan_and_act(workspace: &Workspace, args: &ScanArgs, ui: &Ui) -> Result<ExitCode> {
    let json = args.report == ReportFormat::Json;
    let progress = Ui {
        quiet: ui.quiet || json,
        no_color: ui.no_color,
    };

    let summary = drive(workspace, &progress, |ws| ws.start_scan())?;
    match summary.outcome {
        OperationState::Cancelled => {
            log::warn!("Scan cancelled");
            return Ok(ExitCode::Interrupted);
        }
        OperationState::Error => anyhow::bail!(
            "scan failed: {}",
            summary.error.as_deref().unwrap_or("unknown error")
        ),
        _ => {}
    }
    let scan = summary.scan.as_ref().context("scan produced no summary")?;

    let groups = workspace.groups();
    let mut code = if summary.failed_items() > 0 {
        ExitCode::PartialSuccess
    } else if groups.is_empty() {
        ExitCode::NoDuplicates
    } else {
        ExitCode::Success
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    if json {
        JsonReport::new(&groups, scan, workspace.statistics(), code).write_to(&mut out)?;
    } else if !ui.quiet {
        let color = !ui.no_color && io::stdout().is_terminal();
        write_text_report(&mut out, &groups, scan, &workspace.statistics(), color)?;
    }
    drop(out);

    let action = if args.delete {
        let selection = workspace.entries_in(FileState::Delete);
        if selection.is_empty() {
            None
        } else {
            Some(("Deleted", drive(workspace, &progress, |ws| ws.start_delete(selection))?))
        }
    } else if let Some(destination) = &args.copy_to {
        let mut selection = workspace.entries_in(FileState::Keep);
        selection.extend(workspace.entries_in(FileState::Unique));
        let destination = destination.clone();
        Some((
            "Copied",
            drive(workspace, &progress, |ws| ws.start_copy(destination, selection))?,
        ))
    } else {
        None
    };

    if let Some((verb, result)) = action {
        if let Some(batch) = &result.batch {
            if !ui.quiet {
                // Keep stdout parseable when it carries the JSON report.
                let mut sink: Box<dyn Write> = if json {
                    Box::new(io::stderr())
                } else {
                    Box::new(io::stdout())
                };
                write_batch_report(&mut sink, verb, batch)?;
            }
        }
        code = match result.outcome {
            OperationState::Cancelled => ExitCode::Interrupted,
            OperationState::Error => anyhow::bail!(
                "{} failed: {}",
                result.kind,
                result.error.as_deref().unwrap_or("unknown error")
            ),
            _ if result.failed_items() > 0 => ExitCode::PartialSuccess,
            _ => ExitCode::Success,
        };
    }
    Ok(code)
}

/// Start an operation, render its progress until it ends, and collect the summary.
fn drive<F>(workspace: &Workspace, ui: &Ui, start: F) -> Result<RunSummary>
where
    F: FnOnce(&Workspace) -> Result<(), WorkspaceError>,
{
    let display = ProgressDisplay::new(ui.quiet, ui.no_color);
    start(workspace)?;
    display.watch(workspace.controller());
    display.clear();
    workspace
        .wait()
        .context("background operation ended without a summary")
}

fn run_config(action: ConfigAction, explicit: Option<&Path>) -> Result<ExitCode> {
    match action {
        ConfigAction::Show => {
            let config = Config::load(explicit)?;
            print!("{}", toml::to_string_pretty(&config)?);
        }
        ConfigAction::Save => {
            let config = Config::load(explicit.filter(|p| p.exists()))?;
            let path = config.save(explicit)?;
            println!("{}", path.display());
        }
        ConfigAction::Path => {
            let path = explicit
                .map(Path::to_path_buf)
                .or_else(Config::config_path)
                .context("Failed to determine project directories")?;
            println!("{}", path.display());
        }
    }
    Ok(ExitCode::Success)
}
