//! Chatbox CLI Entry Point
//!
//! This binary provides the command-line interface for the chatbox.

use std::process;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    if let Err(e) = chatbox_interface::run_cli().await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
