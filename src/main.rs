use clap::Parser;
use tracing::{error, Level};
use tracing_subscriber::FmtSubscriber;

use lamina::{analysis, error::LaminaError, input, post_processor};

/// Static finite element analysis of rectangular plates and plane bodies
#[derive(Parser)]
#[command(name = "lamina")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "2D plane stress/strain and Mindlin plate solver", long_about = None)]
struct Cli {
    /// Path to the analysis input json
    input_json: String,

    /// Where to write nodal results
    #[arg(short, long, default_value = "nodes.csv")]
    output: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

fn run(cli: &Cli) -> Result<(), LaminaError> {
    let metadata = input::load_input_file(&cli.input_json)?;
    let result = analysis::run(&metadata)?;
    post_processor::csv_output(&result, &cli.output)
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("failed to initialise logging: {err}");
    }

    if let Err(err) = run(&cli) {
        error!("{err}");
        std::process::exit(1)
    }
}
