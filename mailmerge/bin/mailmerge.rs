//! Send a personalised email to every row of a CSV or TSV roster.
//!
//! - `check`: validate a roster
//! - `preview`: render the message for one row and list likely mistakes
//! - `send`: send to every row, with Ctrl-C cancelling the run

use std::{
    path::{Path, PathBuf},
    process::ExitCode,
};

use clap::{Parser, Subcommand};
use mailmerge::{Mailmerge, SHUTDOWN_BROADCAST, find_config_file, preview, shutdown};
use mailmerge_common::{
    Attachment, AttachmentLimits, RosterError, Template, logging,
    recipient::{Roster, load_roster},
};
use mailmerge_dispatch::RunState;

#[cfg(not(any(target_os = "macos", unix)))]
compile_error!("Only macos and unix are currently supported");

/// Exit status of a run interrupted with Ctrl-C
const EXIT_CANCELLED: u8 = 130;

#[derive(Parser, Debug)]
#[command(name = "mailmerge")]
#[command(about = "Send a personalised email to every row of a CSV", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (otherwise `MAILMERGE_CONFIG`, then the default locations)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args, Debug)]
struct Message {
    /// Subject template
    #[arg(short, long)]
    subject: String,

    /// File holding the body template
    #[arg(short, long)]
    body: PathBuf,

    /// File to attach to every message (repeatable)
    #[arg(short, long = "attach")]
    attachments: Vec<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Parse a roster and report its columns and size
    Check {
        /// CSV or TSV file; the first column holds the email address
        roster: PathBuf,
    },
    /// Render the message for one recipient
    Preview {
        roster: PathBuf,

        #[command(flatten)]
        message: Message,

        /// Zero-based row to render
        #[arg(short, long, default_value_t = 0)]
        row: usize,
    },
    /// Send the message to every recipient
    Send {
        roster: PathBuf,

        #[command(flatten)]
        message: Message,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    logging::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Check { roster } => check(&roster),
        Commands::Preview {
            roster,
            message,
            row,
        } => show_preview(cli.config.as_deref(), &roster, &message, row),
        Commands::Send { roster, message } => send(cli.config.as_deref(), &roster, &message).await,
    }
}

fn read_roster(path: &Path) -> anyhow::Result<Option<Roster>> {
    let err = match load_roster(path) {
        Ok(roster) => return Ok(Some(roster)),
        Err(err) => err,
    };

    let RosterError::InvalidEmails(rows) = &err else {
        anyhow::bail!("{}: {err}", path.display());
    };

    eprintln!("{err}");
    for (index, recipient) in rows {
        eprintln!("  row {index}: {:?}", recipient.email());
    }

    Ok(None)
}

fn read_template(message: &Message) -> anyhow::Result<Template> {
    let body = std::fs::read_to_string(&message.body).map_err(|e| {
        anyhow::anyhow!("Failed to read body from {}: {}", message.body.display(), e)
    })?;

    let attachments = message
        .attachments
        .iter()
        .map(|path| Attachment::from_path(path))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Template::new(message.subject.as_str(), body).with_attachments(attachments))
}

fn check(path: &Path) -> anyhow::Result<ExitCode> {
    let Some(roster) = read_roster(path)? else {
        return Ok(ExitCode::FAILURE);
    };

    println!("{} recipient(s)", roster.len());
    println!("Columns: {}", roster.columns.join(", "));

    Ok(ExitCode::SUCCESS)
}

fn show_preview(
    config: Option<&Path>,
    path: &Path,
    message: &Message,
    row: usize,
) -> anyhow::Result<ExitCode> {
    let Some(roster) = read_roster(path)? else {
        return Ok(ExitCode::FAILURE);
    };

    let limits = match find_config_file(config) {
        Ok(path) => Mailmerge::from_file(&path)?.attachments,
        Err(_) => AttachmentLimits::default(),
    };

    let template = read_template(message)?;
    limits.check(&template.attachments)?;

    let Some(recipient) = roster.rows.get(row) else {
        anyhow::bail!("Row {row} is out of range, the roster has {} row(s)", roster.len());
    };

    let rendered = preview(&template, recipient);

    println!("To: {}", rendered.message.to);
    println!("Subject: {}", rendered.message.subject);
    for attachment in rendered.message.attachments.iter() {
        println!("Attachment: {} ({})", attachment.filename, attachment.content_type);
    }
    println!();
    println!("{}", rendered.message.text_body);

    if !rendered.warnings.is_empty() {
        println!();
        for warning in &rendered.warnings {
            println!("warning: {warning}");
        }
    }

    Ok(ExitCode::SUCCESS)
}

async fn send(config: Option<&Path>, path: &Path, message: &Message) -> anyhow::Result<ExitCode> {
    let mailmerge = Mailmerge::from_file(&find_config_file(config)?)?;

    let Some(roster) = read_roster(path)? else {
        return Ok(ExitCode::FAILURE);
    };
    let template = read_template(message)?;
    let transport = mailmerge.transport()?;

    let signals = SHUTDOWN_BROADCAST.subscribe();
    let _shutdown = tokio::spawn(shutdown());

    let state = mailmerge
        .send(transport, roster.rows, template, signals, |progress, total| {
            println!(
                "{}/{total} sent ({} succeeded, {} failed)",
                progress.settled(),
                progress.succeeded,
                progress.failed
            );
        })
        .await?;

    println!("{state}");

    Ok(match state {
        RunState::Finished { failed: 0, .. } => ExitCode::SUCCESS,
        RunState::Cancelled { .. } => ExitCode::from(EXIT_CANCELLED),
        _ => ExitCode::FAILURE,
    })
}
