use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;
use tokio_util::sync::CancellationToken;

use iplus_backup::run::RunOutcome;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    let cli = iplus_backup::cli::Cli::parse();
    iplus_backup::logging::init(cli.verbose).context("init logging")?;
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        iplus_backup::cli::Command::Run(args) => {
            let cancel = CancellationToken::new();
            let listener = tokio::spawn(cancel_on_ctrl_c(cancel.clone()));

            let outcome = iplus_backup::run::run(args, cancel).await;
            listener.abort();

            if outcome.context("run")? == RunOutcome::Cancelled {
                tracing::info!("session ended without output");
            }
        }
        iplus_backup::cli::Command::Assemble(args) => {
            let pages = iplus_backup::image_store::list_pages(&args.images)
                .context("list page images")?;
            let written =
                iplus_backup::pdf::assemble(&pages, args.page_size(), &args.out, args.force)
                    .context("assemble")?;
            println!("{} ({written} pages)", args.out.display());
        }
    }

    Ok(())
}

async fn cancel_on_ctrl_c(cancel: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::warn!("interrupt received; finishing current page");
            cancel.cancel();
        }
        Err(err) => tracing::warn!(?err, "could not listen for ctrl-c"),
    }
}
