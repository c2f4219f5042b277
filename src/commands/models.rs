use std::path::PathBuf;

/// Arguments for the rebuild command
///
/// **Public** - used by main.rs to construct from CLI args
#[derive(Debug, Clone)]
pub struct RebuildArgs {
    /// Trace file written by the instrumented VM
    pub trace: PathBuf,

    /// Symbols file (JSON or TOML) written next to the trace
    pub symbols: PathBuf,

    /// Output path for the binary heap snapshot (optional)
    pub snapshot: Option<PathBuf>,

    /// Output path for the JSON heap summary (optional)
    pub summary_json: Option<PathBuf>,

    /// Decoder worker count; defaults to the available parallelism
    pub threads: Option<usize>,

    /// Print text summary to stdout
    pub print_summary: bool,
}

impl Default for RebuildArgs {
    fn default() -> Self {
        Self {
            trace: PathBuf::from("trace.bin"),
            symbols: PathBuf::from("symbols.json"),
            snapshot: None,
            summary_json: None,
            threads: None,
            print_summary: false,
        }
    }
}
