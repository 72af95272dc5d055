use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "avrofilter")]
#[command(about = "Role-based field redaction for Avro objects", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Config file (default: platform config dir, created on first run)
    #[arg(long, global = true, env = "AVROFILTER_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the filtering reverse proxy in front of an object store
    Serve {
        #[arg(long)]
        host: Option<String>,

        #[arg(long)]
        port: Option<u16>,

        /// Object store base URL (e.g. http://127.0.0.1:8080)
        #[arg(long)]
        upstream: Option<String>,
    },

    /// Validate the policy and show what each datatype protects
    Check,

    /// Show which fields a set of roles may not see
    Resolve {
        /// Datatype, as in application/vnd.caida.<datatype>.avro
        #[arg(long)]
        datatype: String,

        /// Caller role (repeatable)
        #[arg(long = "role")]
        roles: Vec<String>,
    },

    /// Redact a local Avro container file
    Redact {
        /// Input container file
        input: PathBuf,

        /// Where to write the redacted container
        output: PathBuf,

        #[arg(long)]
        datatype: String,

        /// Caller role (repeatable)
        #[arg(long = "role")]
        roles: Vec<String>,
    },
}
