use std::path::{Path, PathBuf};
use std::process::{Command, ExitCode};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use dc_core::{Config, ENV_ENABLE, ENV_FILE};
use dc_store::{OutputFormat, load_state};

#[derive(Parser)]
#[command(
    name = "duecredit",
    version,
    about = "Collect and report citations for the software a program uses"
)]
struct Cli {
    /// Enable verbose debug output
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a program with citation collection enabled
    Run {
        /// State file the program should write to
        #[arg(long)]
        file: Option<PathBuf>,

        /// Program to run
        program: String,

        /// Arguments passed through to the program
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Print a report of the collected citations
    Summary {
        /// Report format
        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,

        /// State file to read (defaults to $DUECREDIT_FILE or .duecredit.json)
        #[arg(long)]
        file: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Bibtex,
}

impl From<Format> for OutputFormat {
    fn from(f: Format) -> Self {
        match f {
            Format::Text => OutputFormat::Text,
            Format::Bibtex => OutputFormat::BibTeX,
        }
    }
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match &cli.command {
        Commands::Run {
            file,
            program,
            args,
        } => cmd_run(program, args, file.as_deref()),
        Commands::Summary { format, file } => {
            cmd_summary((*format).into(), file.as_deref()).map(|()| ExitCode::SUCCESS)
        }
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn cmd_run(program: &str, args: &[String], file: Option<&Path>) -> Result<ExitCode> {
    let mut command = Command::new(program);
    command.args(args).env(ENV_ENABLE, "yes");
    if let Some(file) = file {
        command.env(ENV_FILE, file);
    }
    tracing::debug!(program, ?args, "running with duecredit enabled");

    let status = command
        .status()
        .with_context(|| format!("failed to run {program}"))?;

    Ok(match status.code() {
        Some(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        None => {
            tracing::warn!("{program} terminated by signal");
            ExitCode::FAILURE
        }
    })
}

fn cmd_summary(format: OutputFormat, file: Option<&Path>) -> Result<()> {
    let path = match file {
        Some(p) => p.to_path_buf(),
        None => Config::from_env().state_file,
    };

    let state = load_state(&path).with_context(|| format!("failed to read {}", path.display()))?;
    match state {
        Some(state) if !state.is_empty() => print!("{}", format.render(&state)),
        _ => println!("no citations recorded"),
    }
    Ok(())
}
