use clap::Parser;
use regimetrader::cli::{init_tracing, run, Cli};

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    if let Err(e) = init_tracing(cli.verbose) {
        eprintln!("warning: logging not initialised: {e}");
    }
    run(cli)
}
