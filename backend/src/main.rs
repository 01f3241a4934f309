//! ITBI CLI - Banca d'Italia auction results to DATA/META workbooks
//!
//! # Main Commands
//!
//! ```bash
//! itbi run                          # Download, unpack and process the latest file
//! itbi process aste.xls             # Process a local spreadsheet
//! itbi verify ./output              # Check every artifact set in a directory
//! ```
//!
//! # Debug Commands
//!
//! ```bash
//! itbi unpack aste_corrente.zip     # Extract and print the spreadsheet path
//! itbi parse aste.xls --format csv  # Print classified auction records
//! itbi config                       # Print the effective configuration
//! ```

use clap::{Args, Parser, Subcommand, ValueEnum};
use itbi::logs::{log_error, log_info, log_success, log_warning, LOG_SINK};
use itbi::{
    detect_columns, filter_identifiers, into_records, process_file, project_rows, read_sheet,
    verify_dir, Diagnostics, Fetcher, HttpFetcher, MetricKind, MonthSelection, PipelineReport,
    RunConfig, Unpacker, ZipUnpacker,
};
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "itbi")]
#[command(about = "Extract Italian government bond auction results into DATA/META workbooks", long_about = None)]
struct Cli {
    /// Only print warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Mirror log entries to FILE as JSON lines
    #[arg(long, global = true, value_name = "FILE")]
    log_json: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ProcessArgs {
    /// Month to process: auto, all, or YYYY-MM
    #[arg(short, long)]
    month: Option<String>,

    /// Output directory
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Write loose .xls files only, no zip
    #[arg(long)]
    no_archive: bool,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write into a timestamped subdirectory of the output directory
    #[arg(long)]
    stamp_dir: bool,

    /// Exit with an error when the requested scope has no data
    #[arg(long)]
    fail_on_empty: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum ParseFormat {
    Json,
    Csv,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the published archive, unpack it and process the spreadsheet
    Run {
        #[command(flatten)]
        args: ProcessArgs,

        /// Auction index page to scan for the archive link
        #[arg(long)]
        index_url: Option<String>,
    },

    /// Process a local spreadsheet
    Process {
        /// Input .xls/.xlsx file
        input: PathBuf,

        #[command(flatten)]
        args: ProcessArgs,
    },

    /// Extract an archive and print the spreadsheet path
    Unpack {
        /// Input .zip file
        archive: PathBuf,

        /// Extraction directory (default: fetch.extract_dir)
        #[arg(short, long)]
        dest: Option<PathBuf>,
    },

    /// Print classified auction records
    Parse {
        /// Input .xls/.xlsx file
        input: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value = "json")]
        format: ParseFormat,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// JSON configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Verify every artifact set in a directory
    Verify {
        /// Directory holding DATA/META/zip files
        dir: PathBuf,
    },

    /// Print the effective configuration as JSON
    Config {
        /// JSON configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    LOG_SINK.set_quiet(cli.quiet);
    if let Some(path) = &cli.log_json {
        if let Err(e) = LOG_SINK.mirror_to(path) {
            eprintln!("❌ Error: cannot open {}: {}", path.display(), e);
            std::process::exit(1);
        }
    }

    let result = match cli.command {
        Commands::Run { args, index_url } => cmd_run(args, index_url).await,
        Commands::Process { input, args } => cmd_process(input, args).await,
        Commands::Unpack { archive, dest } => cmd_unpack(&archive, dest),
        Commands::Parse {
            input,
            format,
            output,
            config,
        } => cmd_parse(&input, format, output.as_deref(), config.as_deref()),
        Commands::Verify { dir } => cmd_verify(&dir),
        Commands::Config { config } => cmd_config(config.as_deref()),
    };

    if let Err(e) = result {
        log_error(format!("Error: {}", e));
        std::process::exit(1);
    }
}

/// Defaults, then the config file, then command-line overrides.
fn build_config(args: &ProcessArgs) -> Result<RunConfig, Box<dyn std::error::Error>> {
    let mut config = RunConfig::load(args.config.as_deref())?;

    if let Some(month) = &args.month {
        config.month = month.parse::<MonthSelection>()?;
    }
    if let Some(dir) = &args.output {
        config.output.dir = dir.clone();
    }
    if args.no_archive {
        config.output.archive = false;
    }
    if args.stamp_dir {
        config.output.stamp_dir = true;
    }

    config.validate()?;
    Ok(config)
}

async fn cmd_run(
    args: ProcessArgs,
    index_url: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = build_config(&args)?;
    if let Some(url) = index_url {
        config.fetch.index_url = url;
    }

    let fetcher = HttpFetcher::new(config.fetch.clone())?;
    let archive = fetcher.fetch().await?;

    let extract_dir = config.fetch.extract_dir.clone();
    let spreadsheet =
        tokio::task::spawn_blocking(move || ZipUnpacker::new(extract_dir).unpack(&archive))
            .await??;

    run_pipeline(spreadsheet, config, args.fail_on_empty).await
}

async fn cmd_process(input: PathBuf, args: ProcessArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = build_config(&args)?;
    run_pipeline(input, config, args.fail_on_empty).await
}

async fn run_pipeline(
    input: PathBuf,
    config: RunConfig,
    fail_on_empty: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let report: PipelineReport =
        tokio::task::spawn_blocking(move || process_file(&input, &config)).await??;

    if report.outcome.is_empty() && fail_on_empty {
        return Err("no data for requested scope".into());
    }

    for bundle in &report.bundles {
        let path = bundle.archive_path.as_ref().unwrap_or(&bundle.data_path);
        println!("{}", path.display());
    }
    Ok(())
}

fn cmd_unpack(archive: &Path, dest: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let dest = match dest {
        Some(dir) => dir,
        None => RunConfig::load(None)?.fetch.extract_dir,
    };
    let spreadsheet = ZipUnpacker::new(dest).unpack(archive)?;
    println!("{}", spreadsheet.display());
    Ok(())
}

fn cmd_parse(
    input: &Path,
    format: ParseFormat,
    output: Option<&Path>,
    config_path: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = RunConfig::load(config_path)?;
    log_info(format!("Parsing {}", input.display()));

    let table = read_sheet(input, &config.layout)?;
    let mut diags = Diagnostics::new();
    let columns = detect_columns(&table, &config, &mut diags)?;
    let filtered = filter_identifiers(project_rows(&table, &columns), &mut diags);
    let records = into_records(filtered, &config.dates, &mut diags);
    log_success(format!("{} auction records", records.len()));

    let content = match format {
        ParseFormat::Json => serde_json::to_string_pretty(&json!({
            "columns": columns,
            "records": records,
            "diagnostics": diags,
        }))?,
        ParseFormat::Csv => {
            let mut writer = csv::Writer::from_writer(Vec::new());

            let mut header = vec!["source_row", "identifier", "auction_date", "description"];
            header.extend(MetricKind::ALL.iter().map(|k| k.as_str()));
            writer.write_record(&header)?;

            for record in &records {
                let mut row = vec![
                    record.source_row.to_string(),
                    record.identifier.clone(),
                    record.auction_date.format(&config.dates.output).to_string(),
                    record.description.clone(),
                ];
                row.extend(
                    record
                        .metrics
                        .iter()
                        .map(|m| m.map(|v| v.to_string()).unwrap_or_default()),
                );
                writer.write_record(&row)?;
            }
            String::from_utf8(writer.into_inner().map_err(|e| e.to_string())?)?
        }
    };

    write_output(&content, output)
}

fn cmd_verify(dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    log_info(format!("Verifying {}", dir.display()));
    let reports = verify_dir(dir)?;

    let failed = reports.iter().filter(|r| !r.is_ok()).count();
    if reports.is_empty() {
        log_warning("No artifacts found");
    } else if failed == 0 {
        log_success(format!("{} artifact sets verified", reports.len()));
    }

    if failed > 0 {
        return Err(format!("{} of {} artifact sets have issues", failed, reports.len()).into());
    }
    Ok(())
}

fn cmd_config(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = RunConfig::load(config_path)?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn write_output(content: &str, output: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    match output {
        Some(path) => {
            fs::write(path, content)?;
            log_success(format!("Saved to {}", path.display()));
        }
        None => println!("{}", content),
    }
    Ok(())
}
