use std::path::PathBuf;
use std::process;

use anyhow::{Context, anyhow};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use extsort_rs::common::sys::default_threads;
use extsort_rs::sort::{SortConfig, check_sorted, parse_buffer_size, sort_file};

#[derive(Parser)]
#[command(
    name = "fextsort",
    version,
    about = "Sort a file of fixed-width 100-byte records by their 10-byte key"
)]
struct Cli {
    /// Input file
    input: PathBuf,

    /// Output file (may be the input file)
    #[arg(required_unless_present = "check")]
    output: Option<PathBuf>,

    /// Directory for temporary fragment files
    #[arg(default_value = ".")]
    temp_dir: PathBuf,

    /// Maximum number of worker threads
    num_threads: Option<usize>,

    /// Use SIZE bytes of memory instead of the available physical memory
    #[arg(short = 'S', long = "buffer-size", value_name = "SIZE")]
    buffer_size: Option<String>,

    /// Check whether INPUT is sorted; do not sort
    #[arg(short = 'c', long = "check")]
    check: bool,

    /// Log progress to stderr (-v info, -vv debug)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn try_main(cli: Cli) -> anyhow::Result<i32> {
    if cli.check {
        return Ok(match check_sorted(&cli.input)? {
            None => 0,
            Some(record) => {
                eprintln!("fextsort: {}:{}: disorder", cli.input.display(), record);
                1
            }
        });
    }

    let output = cli.output.context("missing output file")?;

    let buffer_size = cli
        .buffer_size
        .as_deref()
        .map(parse_buffer_size)
        .transpose()
        .map_err(|e| anyhow!("invalid buffer size: {}", e))?;

    let config = SortConfig {
        num_threads: cli.num_threads.unwrap_or_else(default_threads).max(1),
        temp_dir: cli.temp_dir,
        buffer_size,
        ..SortConfig::default()
    };

    sort_file(&cli.input, &output, &config)?;
    Ok(0)
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match try_main(cli) {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("fextsort: {}", e);
            process::exit(2);
        }
    }
}
