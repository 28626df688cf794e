//! Example: List a repository directory
//!
//! Usage:
//!   cargo run --example ls -- --server URL --repository NAME [--token TOKEN] [--trash] [--sort name|size|date|type] [PATH]

mod cli;

use cli::{init_tracing, parse_connection, usage_and_exit};
use reposfs::progress::human_size;
use reposfs::{RepositorySession, SortKey};

const USAGE: &str = "Usage: cargo run --example ls -- (--config FILE | --server URL --repository NAME) [--token TOKEN] [--trash] [--sort name|size|date|type] [PATH]";

#[tokio::main]
async fn main() {
    init_tracing();
    let connection = parse_connection(USAGE, &["--trash"], &["--sort"]).await;
    let trash = connection.switch("--trash");
    let sort = match connection.value("--sort") {
        None | Some("name") => SortKey::Name,
        Some("size") => SortKey::Size,
        Some("date") => SortKey::Date,
        Some("type") => SortKey::Type,
        Some(_) => usage_and_exit(USAGE),
    };
    if connection.positionals.len() > 1 {
        usage_and_exit(USAGE);
    }
    let path = connection.positionals.first().cloned().unwrap_or_else(|| "/".to_string());

    let mut session = match RepositorySession::new(connection.config) {
        Ok(session) => session,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };
    let loaded = if trash {
        session.load_trash().await
    } else {
        session.load_content().await
    };
    if let Err(e) = loaded {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
    *session.filter_mut() = reposfs::DirectoryFilter::new().sorted_by(sort);

    if !session.enter_path(&path) {
        eprintln!("No directory at {path}");
        std::process::exit(1);
    }

    println!("Listing: {}\n", session.current_path());
    let listing = session.listing();
    for id in listing.ids() {
        let Some(object) = session.filesystem().get_object_data(id) else {
            continue;
        };
        if object.is_regular_file() {
            println!("  {:>10}  {}", human_size(object.size()), object.name);
        } else {
            let stats = session
                .filesystem()
                .get_object_content_stats(Some(id))
                .unwrap_or_default();
            println!("  {:>10}  {}/ ({} files)", human_size(stats.size), object.name, stats.count);
        }
    }

    let total = session
        .filesystem()
        .get_object_content_stats(session.navigator().current_directory())
        .unwrap_or_default();
    println!("\n{} entries, {} files, {}", listing.len(), total.count, human_size(total.size));
}
