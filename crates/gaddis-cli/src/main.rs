use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod config;
mod debugger;

/// Gaddis pseudocode virtual machine and debugger.
///
/// Runs, disassembles and debugs program images produced by the Gaddis
/// code generator. Images are JSON files holding one assembled program.
///
/// EXAMPLES:
///     gaddis run sum.json                   Run a program
///     gaddis run sum.json --seed 7          Run with a fixed random seed
///     gaddis disasm sum.json --source sum.gad
///     gaddis debug sum.json -b 5            Debug, breaking on line 5
///     gaddis test sum.json                  Check output against sum.out
///
/// ENVIRONMENT VARIABLES:
///     GADDIS_LOG          Log filter (e.g. 'debug', 'gaddis_runtime=trace')
///     GADDIS_CONFIG       Explicit gaddis.toml to load
///     GADDIS_NO_HISTORY   Set to disable debugger history
#[derive(Parser)]
#[command(name = "gaddis")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file to use instead of searching for gaddis.toml
    #[arg(long, global = true, env = "GADDIS_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a program image
    ///
    /// Executes the image with standard input and output. A runtime error
    /// prints the error and stack trace to stderr and exits with status 1.
    ///
    /// EXAMPLES:
    ///     gaddis run sum.json
    ///     gaddis run dice.json --seed 42
    #[command(visible_alias = "r")]
    Run {
        /// Path to the program image
        image: PathBuf,
        /// Fixed seed for `random`
        #[arg(long)]
        seed: Option<u64>,
        /// Instruction ceiling before the run is treated as an infinite loop
        #[arg(long)]
        max_instructions: Option<u64>,
        /// Name used for the program in stack traces
        #[arg(long)]
        file_name: Option<String>,
    },

    /// Disassemble a program image
    ///
    /// EXAMPLES:
    ///     gaddis disasm sum.json
    ///     gaddis disasm sum.json --source sum.gad
    Disasm {
        /// Path to the program image
        image: PathBuf,
        /// Source file to interleave with the instructions
        #[arg(long, short = 's')]
        source: Option<PathBuf>,
    },

    /// Check a program image against its recorded output
    ///
    /// Feeds `<image>.in` (if present) as standard input and compares the
    /// output with `<image>.out`. Without `<image>.out` the program runs
    /// interactively and its input and output are recorded.
    ///
    /// EXAMPLES:
    ///     gaddis test sum.json
    ///     gaddis test dice.json --seed 1
    #[command(visible_alias = "t")]
    Test {
        /// Path to the program image
        image: PathBuf,
        /// Fixed seed for `random`
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Debug a program image interactively
    ///
    /// EXAMPLES:
    ///     gaddis debug sum.json --source sum.gad
    ///     gaddis debug sum.json -b 3 -b 5
    #[command(visible_alias = "d")]
    Debug {
        /// Path to the program image
        image: PathBuf,
        /// Source file for listings
        #[arg(long, short = 's')]
        source: Option<PathBuf>,
        /// Line breakpoints to set before starting (repeatable)
        #[arg(long = "break", short = 'b')]
        breakpoints: Vec<usize>,
        /// Pause before the first instruction
        #[arg(long)]
        stop_on_entry: bool,
        /// Fixed seed for `random`
        #[arg(long)]
        seed: Option<u64>,
        /// Disable history persistence (also GADDIS_NO_HISTORY)
        #[arg(long)]
        no_history: bool,
    },
}

fn init_logging(default_level: &str) {
    use tracing_subscriber::{fmt, EnvFilter};

    // GADDIS_LOG wins over the configured level
    let filter = EnvFilter::try_from_env("GADDIS_LOG")
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let cwd = std::env::current_dir()?;
    let config = config::Config::load(&cwd, cli.config.as_deref())?;
    init_logging(&config.settings.log.level);
    tracing::debug!(project_root = ?config.project_root, "configuration loaded");

    match cli.command {
        Commands::Run {
            image,
            seed,
            max_instructions,
            file_name,
        } => {
            let mut vm = config.settings.vm;
            if let Some(seed) = seed {
                vm.seed = Some(seed);
            }
            if let Some(n) = max_instructions {
                vm.max_instructions = n;
            }
            let args = commands::run::RunArgs {
                image,
                vm,
                file_name,
            };
            let code = commands::run::run(&args)?;
            if code != 0 {
                std::process::exit(code);
            }
        }
        Commands::Disasm { image, source } => {
            print!("{}", commands::disasm::run(&image, source.as_deref())?);
        }
        Commands::Test { image, seed } => {
            let mut vm = config.settings.vm;
            if let Some(seed) = seed {
                vm.seed = Some(seed);
            }
            let outcome = commands::test::run(&commands::test::TestArgs { image, vm })?;
            if outcome.exit_code() != 0 {
                std::process::exit(outcome.exit_code());
            }
        }
        Commands::Debug {
            image,
            source,
            breakpoints,
            stop_on_entry,
            seed,
            no_history,
        } => {
            let mut vm = config.settings.vm;
            if let Some(seed) = seed {
                vm.seed = Some(seed);
            }
            let args = commands::debug::DebugArgs {
                image,
                source,
                breakpoints,
                stop_on_entry: stop_on_entry || config.settings.debug.stop_on_entry,
                vm,
                history: if no_history || config.no_history {
                    None
                } else {
                    config.history_path()
                },
            };
            commands::debug::run(args)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_flags() {
        let cli = Cli::parse_from(["gaddis", "run", "p.json", "--seed", "9", "--max-instructions", "100"]);
        match cli.command {
            Commands::Run {
                image,
                seed,
                max_instructions,
                ..
            } => {
                assert_eq!(image, PathBuf::from("p.json"));
                assert_eq!(seed, Some(9));
                assert_eq!(max_instructions, Some(100));
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_repeated_breakpoints() {
        let cli = Cli::parse_from(["gaddis", "debug", "p.json", "-b", "3", "--break", "5"]);
        match cli.command {
            Commands::Debug { breakpoints, .. } => assert_eq!(breakpoints, vec![3, 5]),
            _ => panic!("Expected Debug command"),
        }
    }

    #[test]
    fn test_alias_r_for_run() {
        let cli = Cli::parse_from(["gaddis", "r", "p.json"]);
        assert!(matches!(cli.command, Commands::Run { .. }));
    }

    #[test]
    fn test_alias_d_for_debug() {
        let cli = Cli::parse_from(["gaddis", "d", "p.json"]);
        assert!(matches!(cli.command, Commands::Debug { .. }));
    }

    #[test]
    fn test_golden_test_command() {
        let cli = Cli::parse_from(["gaddis", "test", "p.json", "--seed", "3"]);
        match cli.command {
            Commands::Test { image, seed } => {
                assert_eq!(image, PathBuf::from("p.json"));
                assert_eq!(seed, Some(3));
            }
            _ => panic!("Expected Test command"),
        }
    }

    #[test]
    fn test_no_history_flag() {
        let cli = Cli::parse_from(["gaddis", "debug", "p.json", "--no-history"]);
        match cli.command {
            Commands::Debug { no_history, .. } => assert!(no_history),
            _ => panic!("Expected Debug command"),
        }
    }

    #[test]
    fn test_global_config_flag() {
        let cli = Cli::parse_from(["gaddis", "disasm", "p.json", "--config", "alt.toml"]);
        assert_eq!(cli.config, Some(PathBuf::from("alt.toml")));
    }
}
