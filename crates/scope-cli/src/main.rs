use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use scope_cli::trace::TraceEmitter;
use scope_cli::{run_program, Evaluator, RunOptions};
use scope_parse::parse_str;

/// Maximum source file size in bytes (1MB)
const MAX_SOURCE_SIZE: usize = 1_000_000;

#[derive(Parser, Debug)]
#[command(name = "scope")]
#[command(about = "ScopeLang: environments, stores, and the stack/heap split")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Execute a ScopeLang program
    Run {
        /// Path to .scope source file
        file: String,

        /// Show the program and result (-v), or every evaluation step (-vv)
        #[arg(short, long, action = ArgAction::Count)]
        verbose: u8,

        /// Write a JSONL step trace to file
        #[arg(long)]
        trace: Option<String>,
    },

    /// Parse a source file and dump the AST
    Parse {
        /// Path to .scope source file
        file: String,

        /// Output format
        #[arg(long, value_enum, default_value_t = Format::Pretty)]
        format: Format,
    },
}

#[derive(ValueEnum, Clone, Debug)]
enum Format {
    Pretty,
    Json,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            file,
            verbose,
            trace,
        } => cmd_run(&file, verbose, trace),

        Commands::Parse { file, format } => cmd_parse(&file, format),
    }
}

/// Diagnostics go to stderr at `warn` unless `RUST_LOG` says otherwise,
/// e.g. `RUST_LOG=scope_cli=trace` to see every stack push and pop.
fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
        .with(filter)
        .init();
}

fn load_source(path: &str) -> Result<String> {
    let src =
        std::fs::read_to_string(path).with_context(|| format!("failed to read '{}'", path))?;

    if src.len() > MAX_SOURCE_SIZE {
        anyhow::bail!(
            "source file exceeds {}MB limit ({} bytes)",
            MAX_SOURCE_SIZE / 1_000_000,
            src.len()
        );
    }
    Ok(src)
}

fn cmd_run(file: &str, verbose: u8, trace: Option<String>) -> Result<()> {
    let src = load_source(file)?;
    if verbose >= 1 {
        println!("source:\n{}", src.trim_end());
    }
    let program = parse_str(file, &src)?;

    let options = RunOptions { verbosity: verbose };
    let result = match &trace {
        None => run_program(&program, options)?,
        Some(trace_path) => {
            let writer = std::fs::File::create(trace_path)
                .with_context(|| format!("failed to create trace file '{}'", trace_path))?;
            let tracer = TraceEmitter::new(Box::new(std::io::BufWriter::new(writer)))?;
            Evaluator::new(options).with_tracer(tracer).run(&program)?
        }
    };
    println!("result = {}", result);

    if let Some(trace_path) = trace {
        eprintln!("Trace written to {}", trace_path);
    }
    Ok(())
}

fn cmd_parse(file: &str, format: Format) -> Result<()> {
    let src = load_source(file)?;
    let program = parse_str(file, &src)?;

    match format {
        Format::Pretty => println!("{:#?}", program),
        Format::Json => println!("{}", serde_json::to_string_pretty(&program)?),
    }
    Ok(())
}
