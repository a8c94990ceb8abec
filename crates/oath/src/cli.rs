//! Command-line interface.

use clap::{Args, Parser, Subcommand};

/// oath token service.
#[derive(Debug, Parser)]
#[command(name = "oath", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run as an http server.
    Serve(ServeArgs),
    /// Print the service version.
    Version,
}

/// Flags of the `serve` command. Unset flags fall back to `OATH_*`
/// environment variables, then to built-in defaults.
#[derive(Debug, Default, Clone, Args)]
pub struct ServeArgs {
    /// Server port [default: 8080]
    #[arg(long)]
    pub port: Option<String>,

    /// AWS region to access resources [default: ap-northeast-1]
    #[arg(long = "aws-region")]
    pub aws_region: Option<String>,

    /// S3 bucket that contains our key files [default: oath-store]
    #[arg(long = "token-bucket")]
    pub token_bucket: Option<String>,
}
