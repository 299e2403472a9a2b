//! Clinical logic command-line interface

use clap::{Parser, Subcommand};
use clinlogic::cli::loader::SessionFiles;
use clinlogic::cli::output::{self, OutputFormat};
use clinlogic::cli::{eval, parse, tokens};
use std::path::PathBuf;

/// Clinical logic command-line tool
#[derive(Parser)]
#[command(name = "logic")]
#[command(author, version, about = "Clinical decision-support logic tools", long_about = None)]
struct Cli {
    /// Verbose output (debug logging)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format (json, pretty)
    #[arg(short = 'f', long, global = true, default_value = "pretty")]
    format: String,

    /// Color output (auto, always, never)
    #[arg(long, default_value = "auto", global = true)]
    color: String,

    /// Engine configuration file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate an expression against a data set
    Eval {
        /// Criteria expression
        expression: String,

        /// Data set file (JSON)
        #[arg(short, long)]
        data: PathBuf,

        /// Patients to evaluate (default: everyone in the data set)
        #[arg(short, long, value_delimiter = ',')]
        patients: Vec<i64>,

        /// Index date (YYYY-MM-DD, default: now)
        #[arg(short, long)]
        index_date: Option<String>,

        /// Rules file (JSON)
        #[arg(short, long)]
        rules: Option<PathBuf>,
    },

    /// Parse an expression and print its canonical form
    Parse {
        /// Criteria expression
        expression: String,
    },

    /// List registered tokens and their tags
    Tokens {
        /// Partial token name
        partial: Option<String>,

        /// Data set file (JSON)
        #[arg(short, long)]
        data: Option<PathBuf>,

        /// Rules file (JSON)
        #[arg(short, long)]
        rules: Option<PathBuf>,
    },
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level));
    if verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.init();
}

fn main() {
    human_panic::setup_panic!();

    let cli = Cli::parse();
    output::setup_colors(&cli.color);
    init_logging(cli.verbose);
    let format = OutputFormat::parse(&cli.format);

    let result = match cli.command {
        Commands::Eval {
            expression,
            data,
            patients,
            index_date,
            rules,
        } => eval::run(eval::EvalConfig {
            expression,
            files: SessionFiles {
                data: Some(data),
                rules,
                config: cli.config,
            },
            patients,
            index_date,
            format,
        }),

        Commands::Parse { expression } => parse::run(&expression, format),

        Commands::Tokens {
            partial,
            data,
            rules,
        } => tokens::run(
            partial.as_deref(),
            &SessionFiles {
                data,
                rules,
                config: cli.config,
            },
            format,
        ),
    };

    if let Err(e) = result {
        eprintln!("{}", output::format_error(&e));
        std::process::exit(1);
    }
}
