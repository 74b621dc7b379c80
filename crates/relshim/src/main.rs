//! relshim binary entry point.

// Startup and panic reporting write to stderr before tracing is usable.
#![allow(clippy::print_stderr)]

use std::backtrace::Backtrace;
use std::panic::AssertUnwindSafe;

use relshim::cli::{self, Cli, EXIT_FAILURE, in_github_actions, render_error};
use relshim::tracing::init_tracing;
use relshim::{Shim, shutdown};
use relshim_core::{CancellationToken, Config, ProcessEnv, Result};
use tracing::instrument;

fn main() {
    std::panic::set_hook(Box::new(|panic_info| {
        let backtrace = Backtrace::force_capture();
        tracing::error!(panic = %panic_info, %backtrace, "relshim panicked");
        if in_github_actions(&ProcessEnv) {
            println_annotation(&format!("relshim panicked: {panic_info}\n\n{backtrace}"));
        }
        eprintln!("relshim panicked: {panic_info}");
        eprintln!("Internal error occurred. Run with RUST_LOG=debug for more information.");
    }));

    let cli = cli::parse();
    let exit_code =
        std::panic::catch_unwind(AssertUnwindSafe(|| run_with_tokio(cli))).unwrap_or(EXIT_FAILURE);
    std::process::exit(exit_code);
}

#[allow(clippy::print_stdout)]
fn println_annotation(message: &str) {
    println!("{}", cli::actions_error(message));
}

/// Create tokio runtime and run async path
fn run_with_tokio(cli: Cli) -> i32 {
    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Fatal error: Failed to create tokio runtime: {e}");
            return EXIT_FAILURE;
        }
    };

    rt.block_on(run(cli))
}

/// Run the shim and map the outcome to an exit code
async fn run(cli: Cli) -> i32 {
    if let Err(e) = init_tracing(cli.tracing_config()) {
        eprintln!("Warning: {e}");
    }

    let cancel = CancellationToken::new();
    shutdown::install_signal_handlers(cancel.clone());

    match real_main(&cli, &cancel).await {
        Ok(code) => code,
        Err(err) => {
            render_error(err, cli.json, in_github_actions(&ProcessEnv));
            EXIT_FAILURE
        }
    }
}

#[instrument(name = "relshim", skip_all)]
async fn real_main(cli: &Cli, cancel: &CancellationToken) -> Result<i32> {
    let config = Config::load(&ProcessEnv, cli.overrides())?;
    tracing::debug!(?config, "Loaded configuration");

    let shim = Shim::from_config(config)?;
    shim.run(cancel, &cli.args).await
}
