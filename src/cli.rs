//! Code related to CLI things
//!

use clap::{Parser, Subcommand};

#[derive(Parser, Clone)]
pub struct SharedOpts {
    #[clap(short, long, help = "Configuration file")]
    pub config: Option<String>,
    #[clap(short, long, help = "Log at debug level")]
    pub debug: bool,
}

#[derive(Parser)]
#[clap(name = "authns", about = "Authoritative DNS server")]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the server (the default)
    Server {
        #[clap(flatten)]
        sopt: SharedOpts,
    },
    /// Validate the configuration and exit
    ConfigCheck {
        #[clap(flatten)]
        sopt: SharedOpts,
    },
    /// Parse a master file and report what it holds
    ImportZones {
        #[clap(flatten)]
        sopt: SharedOpts,
        filename: String,
        #[clap(short, long, help = "Origin to resolve relative names against")]
        zone: Option<String>,
    },
}

impl Default for Commands {
    fn default() -> Self {
        Commands::Server {
            sopt: SharedOpts {
                config: None,
                debug: false,
            },
        }
    }
}
