//! Rowguard administrative statement renderer.
//!
//! Validates names and options the same way the orchestration engine
//! does, renders the administrative statements, and prints them for
//! review — the safe way to prepare change scripts for a dialect that
//! cannot bind identifiers.

mod commands;

use clap::Parser;

use commands::Command;

/// Rowguard statement renderer.
#[derive(Parser, Debug)]
#[command(name = "rowguard")]
#[command(version, about = "Render validated security-administration statements")]
pub struct Args {
    /// Emit statements as JSON instead of plain text.
    #[arg(long)]
    pub json: bool,

    /// Maximum identifier length accepted by the validator.
    #[arg(long, default_value_t = 30)]
    pub max_identifier_len: usize,

    #[command(subcommand)]
    pub command: Command,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("rowguard_cli=info".parse().expect("valid directive")),
        )
        .init();

    let args = Args::parse();
    if let Err(e) = commands::run(&args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
