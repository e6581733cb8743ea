use jml_lsp::server::Backend;
use std::fs::{File, OpenOptions};
use tower_lsp_server::{LspService, Server};
use tracing_subscriber::EnvFilter;

const LOG_FILE_NAME: &str = ".jml-lsp.log";

fn log_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

fn open_log_file() -> Option<File> {
    let path = dirs::home_dir()?.join(LOG_FILE_NAME);
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .ok()
}

/// Logs to `~/.jml-lsp.log`, or to stderr when it cannot be opened.
/// Never to stdout, which carries the protocol.
fn init_logging() {
    let builder = tracing_subscriber::fmt().with_env_filter(log_filter());
    match open_log_file() {
        Some(file) => builder.with_writer(file).with_ansi(false).init(),
        None => builder.with_writer(std::io::stderr).init(),
    }
}

#[tokio::main]
async fn main() {
    init_logging();
    tracing::info!("starting jml-lsp {}", env!("CARGO_PKG_VERSION"));

    let (service, socket) = LspService::new(Backend::new);
    Server::new(tokio::io::stdin(), tokio::io::stdout(), socket)
        .serve(service)
        .await;

    tracing::info!("jml-lsp stopped");
}
