use std::env;
use std::process;

use reposfs::ClientConfig;
use tracing_subscriber::{fmt, EnvFilter};

pub fn usage_and_exit(usage: &str) -> ! {
    eprintln!("{usage}");
    process::exit(1);
}

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("reposfs=info"));
    fmt().with_env_filter(filter).with_target(false).init();
}

/// Connection settings plus whatever the demo asked to recognise.
pub struct Connection {
    pub config: ClientConfig,
    pub positionals: Vec<String>,
    switches: Vec<&'static str>,
    values: Vec<(&'static str, String)>,
}

impl Connection {
    pub fn switch(&self, name: &str) -> bool {
        self.switches.contains(&name)
    }

    pub fn value(&self, name: &str) -> Option<&str> {
        self.values
            .iter()
            .rev()
            .find(|(option, _)| *option == name)
            .map(|(_, value)| value.as_str())
    }
}

fn connection_option(arg: &str) -> Option<&'static str> {
    match arg {
        "--config" | "-c" => Some("--config"),
        "--server" | "-s" => Some("--server"),
        "--repository" | "-r" => Some("--repository"),
        "--token" | "-t" => Some("--token"),
        "--proxy" => Some("--proxy"),
        _ => None,
    }
}

/// Read `--config FILE` or `--server URL --repository NAME [--token T] [--proxy P]`.
///
/// `switches` are the demo's boolean flags and `options` its flags taking a value.
pub async fn parse_connection(
    usage: &'static str,
    switches: &[&'static str],
    options: &[&'static str],
) -> Connection {
    let mut args = env::args().skip(1);
    let mut connection = Connection {
        config: ClientConfig::default(),
        positionals: Vec::new(),
        switches: Vec::new(),
        values: Vec::new(),
    };

    while let Some(arg) = args.next() {
        if arg == "--help" || arg == "-h" {
            println!("{usage}");
            process::exit(0);
        }
        if let Some(switch) = switches.iter().copied().find(|switch| *switch == arg) {
            connection.switches.push(switch);
            continue;
        }
        let option = connection_option(&arg).or_else(|| options.iter().copied().find(|option| *option == arg));
        let Some(option) = option else {
            connection.positionals.push(arg);
            continue;
        };
        let value = args.next().unwrap_or_else(|| usage_and_exit(usage));
        connection.values.push((option, value));
    }

    let server = connection.value("--server").map(str::to_string);
    let repository = connection.value("--repository").map(str::to_string);
    let mut config = match connection.value("--config") {
        Some(path) => ClientConfig::load(path).await.unwrap_or_else(|e| {
            eprintln!("Cannot read {path}: {e}");
            process::exit(1);
        }),
        None => ClientConfig::new(
            server.clone().unwrap_or_else(|| usage_and_exit(usage)),
            repository.clone().unwrap_or_else(|| usage_and_exit(usage)),
        ),
    };
    if let Some(server) = server {
        config.server_url = server;
    }
    if let Some(repository) = repository {
        config.repository = repository;
    }
    if let Some(token) = connection.value("--token") {
        config.auth_token = Some(token.to_string());
    }
    if let Some(proxy) = connection.value("--proxy") {
        config.proxy = Some(proxy.to_string());
    }

    connection.config = config;
    connection
}
