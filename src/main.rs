//! gct - Git Control Tower
//!
//! Main entry point for the `gct` binary.

use git_control_tower::cli;

#[tokio::main]
async fn main() {
    if let Err(e) = cli::run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
