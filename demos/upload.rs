//! Example: Upload local files or directories into a repository directory
//!
//! Usage:
//!   cargo run --example upload -- --server URL --repository NAME [--token TOKEN] [--plain] <REMOTE_DIR> <LOCAL_PATH>...
//!
//! Directories are staged with their content and recreated on the server.
//! `--plain` prints a simple text bar instead of the animated one.

mod cli;

use std::path::Path;
use std::process;

use cli::{init_tracing, parse_connection, usage_and_exit};
use indicatif::{ProgressBar, ProgressStyle};
use reposfs::{make_progress_bar, BatchOutcome, RepositorySession, UploadEvent};

const USAGE: &str = "Usage: cargo run --example upload -- (--config FILE | --server URL --repository NAME) [--token TOKEN] [--plain] <REMOTE_DIR> <LOCAL_PATH>...";

fn animated_progress() -> impl FnMut(&UploadEvent) + Send + 'static {
    let progress_bar = ProgressBar::new(1);
    progress_bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta}) {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-"),
    );

    move |event: &UploadEvent| match event {
        UploadEvent::Progress(progress) => {
            progress_bar.set_length(progress.bytes_total.max(1));
            progress_bar.set_position(progress.bytes_sent.min(progress.bytes_total));
            progress_bar.set_message(format!(
                "{} ({}/{})",
                progress.file_name,
                progress.files_sent + 1,
                progress.files_total
            ));
        }
        UploadEvent::FileUploaded(item) => progress_bar.println(format!("uploaded {}", item.name())),
        UploadEvent::Stopped { finished: true } => progress_bar.finish_with_message("complete"),
        UploadEvent::Stopped { finished: false } => progress_bar.abandon_with_message("stopped"),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let connection = parse_connection(USAGE, &["--plain"], &[]).await;
    let plain = connection.switch("--plain");
    if connection.positionals.len() < 2 {
        usage_and_exit(USAGE);
    }
    let remote_dir = &connection.positionals[0];
    let local_paths = &connection.positionals[1..];

    let mut session = RepositorySession::new(connection.config)?;
    session.load_content().await?;
    if !session.enter_path(remote_dir) {
        eprintln!("No directory at {remote_dir}");
        process::exit(1);
    }

    for local in local_paths {
        if Path::new(local).is_dir() {
            let count = session.stage_tree(local).await?;
            println!("Staged {count} files from {local}");
        } else if session.stage_path(local, "/").await?.is_none() {
            println!("Skipping empty file {local}");
        }
    }

    if plain {
        session.uploader_mut().on_event(make_progress_bar());
    } else {
        session.uploader_mut().on_event(animated_progress());
    }

    println!("Uploading into {}...", session.current_path());
    match session.upload().await {
        BatchOutcome::Finished => println!("Upload complete!"),
        BatchOutcome::Paused => println!("Upload paused."),
        BatchOutcome::Aborted(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }

    Ok(())
}
