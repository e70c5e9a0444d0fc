//! gradle-runner CLI - forwards its arguments to `./gradlew`.

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use gradle_runner::gradle::{property, GradleInvocation};

#[derive(Parser)]
#[command(
    name = "gradle-runner",
    version,
    about = "Run a project's Gradle wrapper with CI-friendly defaults"
)]
struct Cli {
    /// Extra JVM options passed to Gradle via GRADLE_OPTS
    #[arg(long, value_name = "OPTS", default_value = "")]
    gradle_opts: String,

    /// Directory containing the gradlew script; defaults to the current directory
    #[arg(long, value_name = "DIR")]
    workdir: Option<PathBuf>,

    /// Project property to inject, as NAME=VALUE (repeatable)
    #[arg(short = 'P', long = "property", value_name = "NAME=VALUE")]
    properties: Vec<String>,

    /// Do not treat a non-zero Gradle exit code as an error
    #[arg(long)]
    no_check: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Arguments forwarded to gradlew verbatim
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "ARGS")]
    args: Vec<String>,
}

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("gradle_runner=debug")
    } else {
        EnvFilter::new("gradle_runner=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();

    let mut args = Vec::with_capacity(cli.properties.len() + cli.args.len());
    for pair in &cli.properties {
        let Some((name, value)) = pair.split_once('=') else {
            bail!("invalid property '{pair}'; expected NAME=VALUE");
        };
        args.push(property(name, value));
    }
    args.extend(cli.args.iter().cloned());

    let mut invocation = GradleInvocation::new(args)
        .gradle_opts(cli.gradle_opts)
        .check(!cli.no_check);
    if let Some(dir) = cli.workdir {
        invocation = invocation.workdir(dir);
    }

    let completed = invocation.run()?;

    // Mirror the child's exit code so --no-check still reports it.
    std::process::exit(completed.code)
}
