use clap::Parser;
use revdesk::cli::{Cli, init_tracing, log_dir, run};

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    let dir = log_dir(cli.command.config_path());
    let _guard = match init_tracing(&cli.log_level, &cli.log_format, dir.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("error: {e}");
            return std::process::ExitCode::from(2);
        }
    };
    run(cli)
}
