use anyhow::Context as _;
use tokio_util::sync::CancellationToken;

use crate::auth::Authenticator;
use crate::browser::{BrowserSession, ChromiumSession};
use crate::cli::RunArgs;
use crate::config::Config;
use crate::error::RunError;
use crate::formats::{PageLayout, ProcessingStats};
use crate::prompt::{self, Console, OutputAction, StdConsole};
use crate::viewer::{Navigator, SelectionOutcome};
use crate::{catalog, image_store, output};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    /// The user backed out or interrupted the session; not a failure.
    Cancelled,
}

/// Entry point of the `run` subcommand: a full interactive session against Chromium.
pub async fn run(args: RunArgs, cancel: CancellationToken) -> anyhow::Result<RunOutcome> {
    let config = args.to_config().context("load config")?;
    tracing::debug!(?config, "resolved config");

    let mut session = ChromiumSession::launch(&config.browser)
        .await
        .context("launch browser")?;
    let mut console = StdConsole::stdio();

    run_session(&mut session, &config, args.layout, &mut console, &cancel).await
}

/// Drive one session on an already launched browser. The browser is shut
/// down before returning, whatever the outcome.
pub async fn run_session<S>(
    session: &mut S,
    config: &Config,
    layout: Option<PageLayout>,
    console: &mut dyn Console,
    cancel: &CancellationToken,
) -> anyhow::Result<RunOutcome>
where
    S: BrowserSession + ?Sized,
{
    let result = drive(session, config, layout, console, cancel).await;

    match session.shutdown().await {
        Ok(()) => tracing::info!("browser closed"),
        Err(err) => tracing::warn!("could not close browser: {err:#}"),
    }

    result
}

async fn drive<S>(
    session: &mut S,
    config: &Config,
    layout: Option<PageLayout>,
    console: &mut dyn Console,
    cancel: &CancellationToken,
) -> anyhow::Result<RunOutcome>
where
    S: BrowserSession + ?Sized,
{
    console.say("iPlus Interactif Backup Utility")?;
    console.say(&"=".repeat(50))?;

    if !Authenticator::new(config)
        .login(session, &config.credentials)
        .await
    {
        return Err(RunError::Authentication.into());
    }

    let entries = catalog::discover(session, config).await;
    if entries.is_empty() {
        return Err(RunError::EmptyCatalog.into());
    }

    let Some(entry) = prompt::select_title(console, &entries)? else {
        console.say("No book selected. Goodbye!")?;
        return Ok(RunOutcome::Cancelled);
    };
    tracing::info!(title = %entry.title, index = entry.index, "book chosen");

    if !prompt::confirm(
        console,
        &format!("Do you want to back up '{}'?", entry.title),
    )? {
        console.say("Operation cancelled. Goodbye!")?;
        return Ok(RunOutcome::Cancelled);
    }

    let mut navigator = Navigator::new(config);
    let selection = match navigator
        .select_title(session, entry, console)
        .await
        .map_err(RunError::Selection)?
    {
        SelectionOutcome::Selected(selection) => selection,
        SelectionOutcome::Cancelled => {
            console.say("No volume selected. Goodbye!")?;
            return Ok(RunOutcome::Cancelled);
        }
    };
    let book_name = selection.book_name(&entry.title).to_owned();

    let layout = match layout {
        Some(layout) => layout,
        None => {
            if prompt::confirm(console, "Use double page mode?")? {
                PageLayout::Double
            } else {
                PageLayout::Single
            }
        }
    };

    navigator
        .open_viewer(session)
        .await
        .map_err(RunError::ViewerUnavailable)?;
    navigator
        .set_layout(session, layout)
        .await
        .map_err(|source| RunError::Layout {
            layout: layout.as_str(),
            source,
        })?;

    if let Some(backup) = output::stash_leftover_pages(&config.output)
        .context("set aside pages from an earlier session")?
    {
        console.say(&format!(
            "Pages from an earlier session were moved to '{}'.",
            backup.display()
        ))?;
    }
    image_store::ensure_work_dir(&config.output.work_dir)?;
    let stats = navigator
        .traverse(session, layout, cancel)
        .await
        .context("capture pages")?;
    report(console, &stats)?;

    if stats.interrupted {
        console.say("Operation cancelled by user.")?;
        if stats.pages_processed > 0 {
            match output::backup_and_quit(&config.output, &book_name) {
                Ok(Some(path)) => console.say(&format!("Backup created: {}", path.display()))?,
                Ok(None) => {}
                Err(err) => tracing::warn!("backup of interrupted session failed: {err:#}"),
            }
        }
        return Ok(RunOutcome::Cancelled);
    }
    if stats.pages_processed == 0 {
        return Err(RunError::NoPagesCaptured.into());
    }

    let action = prompt::choose_output_action(console)?;
    apply_output(console, config, action, &book_name)?;

    console.say("Backup operation completed successfully!")?;
    Ok(RunOutcome::Completed)
}

fn report(console: &mut dyn Console, stats: &ProcessingStats) -> anyhow::Result<()> {
    console.say(&format!(
        "\nProcessing complete: {} pages processed in {:.2} seconds",
        stats.pages_processed,
        stats.duration().as_secs_f64()
    ))?;
    if stats.errors_encountered > 0 {
        console.say(&format!(
            "Warnings: {} pages had issues",
            stats.errors_encountered
        ))?;
    }
    Ok(())
}

fn apply_output(
    console: &mut dyn Console,
    config: &Config,
    action: OutputAction,
    book_name: &str,
) -> anyhow::Result<()> {
    tracing::info!(?action, book = book_name, "applying output action");
    match action {
        OutputAction::AssemblePdf => {
            let outcome = output::assemble_pdf(&config.output, book_name)
                .map_err(|err| err.context(RunError::Output("pdf assembly")))?;
            console.say(&format!(
                "PDF '{}' created with {} pages.",
                outcome.pdf_path.display(),
                outcome.pages
            ))?;
        }
        OutputAction::PreserveImages => {
            let dir = output::preserve_images(&config.output, book_name)
                .map_err(|err| err.context(RunError::Output("image preservation")))?;
            console.say(&format!("Images preserved in '{}'.", dir.display()))?;
        }
        OutputAction::BackupAndQuit => {
            let backup = output::backup_and_quit(&config.output, book_name)
                .map_err(|err| err.context(RunError::Output("backup")))?;
            if let Some(path) = backup {
                console.say(&format!("Backup created: {}", path.display()))?;
            }
        }
    }
    Ok(())
}
