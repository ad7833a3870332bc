use clap::{Parser, Subcommand};

#[derive(Parser, Clone)]
#[clap(
    name = "taskmon",
    about = "Process monitor and control",
    version,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Path to a TOML config file
    #[clap(long, global = true)]
    pub config: Option<String>,
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// One-shot listing of live processes
    List {
        /// Case-insensitive filter on name, pid or category
        #[clap(short, long)]
        filter: Option<String>,

        /// Output in JSON format
        #[clap(long)]
        json: bool,
    },

    /// Continuously re-render the process table until Ctrl-C
    Watch {
        /// Case-insensitive filter on name, pid or category
        #[clap(short, long)]
        filter: Option<String>,
    },

    /// Forcefully terminate a process
    Kill {
        pid: u32,

        /// Also terminate every descendant, children first
        #[clap(long)]
        tree: bool,
    },

    /// Change a process scheduling priority
    Priority {
        pid: u32,

        /// One of: idle, below-normal, normal, above-normal, high, realtime
        level: String,

        /// Skip the confirmation prompt for realtime
        #[clap(short, long)]
        yes: bool,
    },

    /// Show detail for a single process
    Info {
        pid: u32,

        /// Output in JSON format
        #[clap(long)]
        json: bool,
    },
}
