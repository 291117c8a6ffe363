use clap::Subcommand;

#[derive(Subcommand)]
pub enum Commands {
    /// Load and validate importer settings, then print them with defaults applied
    Check {
        #[arg(long, help = "Settings file path (JSON)")]
        config: String,
    },
    /// Stream generated changes through an in-process importer and report progress
    Simulate {
        #[arg(long, help = "Settings file path (JSON)")]
        config: String,

        #[arg(long, default_value_t = 2, help = "Number of source channels")]
        channels: usize,

        #[arg(long, default_value_t = 1000, help = "Data changes emitted per channel")]
        changes: u64,

        #[arg(
            long,
            default_value_t = 5,
            help = "Delay before the downstream consumer acknowledges a batch"
        )]
        ack_latency_ms: u64,

        #[arg(
            long,
            help = "If specified, writes the JSON report to this file instead of stdout"
        )]
        output: Option<String>,
    },
}
