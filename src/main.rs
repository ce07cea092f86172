//! Binary entrypoint that runs one memory-extraction pass over an exported log.

use std::process::ExitCode;

use roleplay_memory::start_memory_extraction;

/// Extract memories for the entity described by the log file argument.
fn main() -> ExitCode {
    start_memory_extraction::run()
}
