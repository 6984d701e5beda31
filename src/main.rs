//! sandboxd: a multi-tenant code-execution sandbox service for
//! untrusted Python and Node.js code, fronted by an MCP-style tool
//! surface over stdio or HTTP.
use anyhow::Result;

mod config;
mod dependency_ticker;
mod dispatcher;
mod language_runner;
mod mcp;
mod namespace;
mod output_capture;
mod prelude;
mod process_runner;
mod stager;
mod syscall_policy;
mod types;
mod cli;

fn main() -> Result<()> {
    env_logger::init();

    if !cfg!(unix) {
        eprintln!("Error: sandboxd currently only supports Unix-like systems");
        std::process::exit(1);
    }

    cli::run()
}
