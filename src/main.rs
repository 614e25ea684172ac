//! CLI entry point: parses arguments, wires up logging and the
//! cancellation token, runs the pipeline, and maps the result onto a
//! process exit code (spec §6: 0 on success or clean cancellation,
//! nonzero on unrecoverable error).

use clap::Parser;
use dpsolve::cancel::CancelToken;
use dpsolve::cli::Cli;
use dpsolve::config::Config;
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();
    let log_dir = Config::from_file(&cli.general.config).ok().and_then(|c| c.logging.directory);

    // keep the non-blocking writer's flush guard alive for the process lifetime
    let _appender_guard;
    let filter = EnvFilter::new(cli.general.log_level.filter_directive());
    match log_dir {
        Some(dir) => {
            let file_appender = tracing_appender::rolling::daily(dir, "dpsolve.log");
            let (writer, guard) = tracing_appender::non_blocking(file_appender);
            _appender_guard = Some(guard);
            tracing_subscriber::fmt().with_env_filter(filter).with_writer(writer).with_ansi(false).init();
        }
        None => {
            _appender_guard = None;
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }

    let cancel = CancelToken::new();
    if let Err(e) = dpsolve::cancel::install_sigint_handler(cancel.clone()) {
        eprintln!("warning: failed to install signal handler: {e}");
    }

    match dpsolve::cli::run(cli, cancel.clone()) {
        Ok(count) => {
            println!("{count}");
            std::process::exit(0);
        }
        Err(e) => {
            if cancel.is_cancelled() {
                eprintln!("interrupted");
                std::process::exit(0);
            }
            eprintln!("error: {e:#}");
            std::process::exit(1);
        }
    }
}
