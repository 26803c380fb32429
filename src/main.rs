use anyhow::Result;
use clap::Parser;
use calltree::{cli::Cli, config::TracerConfig, driver};
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber for debug output
fn init_tracing(debug: bool) {
    if debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::TRACE.into()),
            )
            .with_writer(std::io::stderr)
            .init();
    }
}

/// Merge the config file with command-line overrides
fn load_config(args: &Cli) -> Result<TracerConfig> {
    let mut config = TracerConfig::discover(args.config.as_deref())?;
    if let Some(root) = &args.project_root {
        config.project_root = root.clone();
    }
    if let Some(pattern) = &args.test_pattern {
        config.test_pattern = pattern.clone();
        config.test_regex()?;
    }
    config.add_trace_packages(args.trace_packages.iter().cloned());
    if args.no_hook {
        config.install_hook = false;
    }
    Ok(config)
}

/// Either replay a recorded stream or trace a command (mutually exclusive)
fn run(args: Cli, config: TracerConfig) -> Result<i32> {
    match (args.replay, args.command) {
        (Some(path), None) => driver::replay_file(&path, &config, args.format),
        (None, Some(command)) => {
            driver::trace_command(&command, &config, args.format, args.events.as_deref())
        }
        (Some(_), Some(_)) => {
            anyhow::bail!("Cannot specify both --replay and a command. Choose one.");
        }
        (None, None) => {
            anyhow::bail!("Must specify either --replay FILE or a command. Usage: calltree --replay FILE or calltree -- COMMAND [ARGS...]");
        }
    }
}

fn main() -> Result<()> {
    let args = Cli::parse();

    // Initialize tracing if --debug flag is set
    init_tracing(args.debug);

    let config = load_config(&args)?;
    let exit_code = run(args, config)?;

    // Exit with the traced command's exit code
    std::process::exit(exit_code);
}
