use clap::{CommandFactory, Parser as ClapParser, Subcommand};
use olc::parser::Parser;
use olc::{VerifierConfig, check_program};
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// OLC - correlation-safety checker for service programs
#[derive(ClapParser)]
#[command(name = "olc")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify a program and check its correlation safety
    Check {
        /// Input source file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Service to check when the file declares several
        #[arg(short, long, value_name = "SERVICE")]
        service: Option<String>,

        /// Do not require a main procedure
        #[arg(long)]
        no_main_check: bool,

        /// Log pass progress
        #[arg(long)]
        verbose: bool,
    },

    /// Generate shell completions for bash, zsh, fish, or powershell
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Check {
            file,
            service,
            no_main_check,
            verbose,
        } => {
            init_logging(verbose);
            let mut config = VerifierConfig::new().with_check_for_main(!no_main_check);
            if let Some(service) = service {
                config = config.with_execution_target(service);
            }
            check_command(&file, &config)
        }
        Commands::Completions { shell } => {
            generate_completions(shell);
            Ok(())
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn check_command(file: &PathBuf, config: &VerifierConfig) -> Result<(), Box<dyn std::error::Error>> {
    let filename = file.display().to_string();
    let source = fs::read_to_string(file)
        .map_err(|e| format!("Failed to read {}: {}", filename, e))?;

    let mut parser = Parser::new_with_filename(&source, &filename);
    let program = parser.parse().map_err(|e| format!("Parse error: {}", e))?;

    let analysis = match check_program(&program, config) {
        Ok(analysis) => analysis,
        Err(error) => {
            for diagnostic in &error.diagnostics {
                eprintln!("{}", diagnostic);
            }
            eprintln!(
                "\n{} failed with {} error(s)",
                filename,
                error.diagnostics.len()
            );
            std::process::exit(1);
        }
    };

    for warning in &analysis.warnings {
        eprintln!("warning: {}", warning);
    }

    let info = &analysis.correlation_function_info;
    println!("{}: correlation safe ({} execution)", filename, analysis.execution_mode);
    for (operation, _) in info.operations() {
        for pair in info.operation_correlation_pairs(operation) {
            println!("  {}: {} <- {}", operation, pair.variable_path, pair.alias_path);
        }
    }

    Ok(())
}

fn generate_completions(shell: clap_complete::Shell) {
    let mut cmd = Cli::command();
    let bin_name = cmd.get_name().to_string();
    clap_complete::generate(shell, &mut cmd, bin_name, &mut std::io::stdout());
}
