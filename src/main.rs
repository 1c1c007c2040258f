//! ocrsegment - Binarize, normalize and segment scanned books
//!
//! CLI entry point

use clap::Parser;
use indicatif::ProgressBar;
use log::warn;
use std::path::Path;
use std::sync::Mutex;
use std::time::Instant;

use ocrsegment::{
    // CLI
    create_progress_bar, Cli, Commands, ExitCode, FixArgs, IngestArgs, NlbinArgs, SegmentArgs,
    // Config
    Config,
    // Stages
    fix_books, AdapterReport, BookLayout, FixOptions, IngestOptions, Ingestor, KrakenSegmenter,
    OcropyNlbin, ReadingOrderMode, SegmentOptions,
    // Progress
    ProgressCallback,
    // Tools
    format_duration, is_available, version_line,
};

fn main() -> std::process::ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            // --help and --version also arrive here
            return if e.use_stderr() {
                ExitCode::InvalidArgs.into()
            } else {
                ExitCode::Success.into()
            };
        }
    };
    init_logging(&cli);

    let result = match &cli.command {
        Commands::Ingest(args) => run_ingest(&cli, args),
        Commands::Nlbin(args) => run_nlbin(&cli, args),
        Commands::Segment(args) => run_segment(&cli, args),
        Commands::Fix(args) => run_fix(&cli, args),
        Commands::Info => run_info(),
    };

    match result {
        Ok(()) => ExitCode::Success.into(),
        Err(e) => {
            println!("Error: {}", e);
            ExitCode::GeneralError.into()
        }
    }
}

/// Install the logger on stdout; `RUST_LOG` overrides `-v`/`-q`
fn init_logging(cli: &Cli) {
    env_logger::Builder::new()
        .filter_level(cli.log_level())
        .parse_default_env()
        .target(env_logger::Target::Stdout)
        .format_timestamp(None)
        .init();
}

/// Load the config file if specified, otherwise search the default locations
fn load_config(cli: &Cli) -> Config {
    match &cli.config {
        Some(config_path) => match Config::load_from_path(config_path) {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!("Failed to load config file: {}", e);
                Config::default()
            }
        },
        None => Config::load().unwrap_or_default(),
    }
}

// ============ Progress Callback Implementation ============

/// Progress callback for CLI output
///
/// Step messages are printed with `-v`; per-unit progress is drawn as a
/// progress bar unless `-q` is given.
struct CliProgress {
    verbose_level: u8,
    quiet: bool,
    bar: Mutex<Option<ProgressBar>>,
}

impl CliProgress {
    fn new(cli: &Cli) -> Self {
        Self {
            verbose_level: cli.verbose,
            quiet: cli.quiet,
            bar: Mutex::new(None),
        }
    }

    fn finish_bar(&self) {
        if let Ok(mut bar) = self.bar.lock() {
            if let Some(pb) = bar.take() {
                pb.finish_and_clear();
            }
        }
    }
}

impl ProgressCallback for CliProgress {
    fn on_step_start(&self, step: &str) {
        self.finish_bar();
        if self.verbose_level > 0 {
            println!("  {}", step);
        }
    }

    fn on_step_progress(&self, current: usize, total: usize) {
        if self.quiet || total < 2 {
            return;
        }
        if let Ok(mut bar) = self.bar.lock() {
            let pb = bar.get_or_insert_with(|| create_progress_bar(total as u64));
            pb.set_position(current as u64);
        }
    }

    fn on_step_complete(&self, step: &str, message: &str) {
        self.finish_bar();
        if !self.quiet {
            println!("{}: {}", step, message);
        }
    }

    fn on_debug(&self, message: &str) {
        if self.verbose_level > 1 {
            println!("    [DEBUG] {}", message);
        }
    }
}

// ============ Ingest Command ============

fn run_ingest(cli: &Cli, args: &IngestArgs) -> Result<(), Box<dyn std::error::Error>> {
    if !args.pdf && !args.images {
        warn!("Nothing to ingest, pass -p for PDFs and/or -i for images");
        return Ok(());
    }

    let options = IngestOptions::builder()
        .pdf(args.pdf)
        .images(args.images)
        .dpi(args.dpi)
        .height(args.size)
        .orig_suffix(args.orig.clone().unwrap_or_default())
        .build();
    let layout = BookLayout::new(&args.books_path).with_orig_dir(&args.orig_dir);

    let start_time = Instant::now();
    let progress = CliProgress::new(cli);
    let summary = Ingestor::new(options).run(&args.input_path, &layout, &progress)?;

    if !cli.quiet {
        println!(
            "Ingested {} PDFs ({} skipped) and {} images, {} pages written in {}",
            summary.pdfs,
            summary.pdfs_skipped,
            summary.images,
            summary.pages_written,
            format_duration(start_time.elapsed())
        );
    }
    Ok(())
}

// ============ Adapter Commands ============

fn run_nlbin(cli: &Cli, args: &NlbinArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(cli);
    let layout = BookLayout::new(&args.books_path)
        .with_orig_dir(&args.orig_dir)
        .with_processed_dir(&args.processed_dir);

    let progress = CliProgress::new(cli);
    let report = OcropyNlbin::new(config.ocropy).run(&layout, &progress)?;
    print_adapter_report(cli, &report);
    Ok(())
}

fn run_segment(cli: &Cli, args: &SegmentArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(cli);
    let layout = BookLayout::new(&args.books_path).with_processed_dir(&args.processed_dir);
    let options = SegmentOptions::new(&args.kraken_model)
        .with_variant(args.variant())
        .with_baseline(args.bl)
        .with_xml_suffix(&args.suffix);

    let progress = CliProgress::new(cli);
    let report = KrakenSegmenter::new(config.kraken).run(&layout, &options, &progress)?;
    print_adapter_report(cli, &report);
    Ok(())
}

fn print_adapter_report(cli: &Cli, report: &AdapterReport) {
    if cli.verbose > 0 {
        for name in &report.processed {
            println!("  Done: {}", name);
        }
    }
    if !cli.quiet {
        for (name, reason) in &report.skipped {
            println!("  Skipped: {}: {}", name, reason);
        }
    }
}

// ============ Fix Command ============

fn run_fix(cli: &Cli, args: &FixArgs) -> Result<(), Box<dyn std::error::Error>> {
    let layout = BookLayout::new(&args.books_path).with_processed_dir(&args.processed_dir);
    let reading_order = if args.keep_reading_order {
        ReadingOrderMode::Prepend
    } else {
        ReadingOrderMode::Replace
    };
    let options = FixOptions::builder()
        .scheme(args.scheme)
        .filename(args.filename)
        .xml_suffix(&args.suffix)
        .orig_suffix(args.orig.clone().unwrap_or_default())
        .reading_order(reading_order)
        .threads(args.thread_count())
        .build();

    let progress = CliProgress::new(cli);
    let summary = fix_books(&layout, &options, &progress)?;

    if cli.verbose > 0 && options.scheme {
        println!(
            "  Regions: {}, types: {}, lines: {}, reading orders replaced: {}",
            summary.scheme.regions,
            summary.scheme.types_reclassified,
            summary.scheme.lines_repaired,
            summary.scheme.reading_orders_replaced
        );
    }

    if let Some(report_path) = &args.report {
        summary.write_json(report_path)?;
        if !cli.quiet {
            println!("Report written to {}", report_path.display());
        }
    }
    Ok(())
}

// ============ Info Command ============

fn run_info() -> Result<(), Box<dyn std::error::Error>> {
    println!("ocrsegment v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("System Information:");
    println!("  Platform: {}", std::env::consts::OS);
    println!("  Arch: {}", std::env::consts::ARCH);
    println!("  CPUs: {}", num_cpus::get());

    let config = Config::load().unwrap_or_default();

    println!();
    println!("PDF Extraction Tools:");
    check_tool_with_version("pdftoppm", "Poppler", "-v");

    println!();
    println!("Segmentation Tools:");
    match config.ocropy.python_command() {
        Ok(python) => match python.first() {
            Some(program) => check_tool_with_version(program, "Python", "--version"),
            None => println!("  Python: Not configured"),
        },
        Err(e) => println!("  Python: {}", e),
    }
    let nlbin = OcropyNlbin::new(config.ocropy.clone()).script_path();
    check_path(&nlbin, "ocropus-nlbin");
    check_tool_with_version("kraken", "Kraken", "--version");
    if !config.kraken.environment.is_empty() {
        println!("  Kraken environment: {}", config.kraken.environment);
    }

    println!();
    println!("Config File Locations:");
    for path in Config::search_paths() {
        let marker = if path.exists() { " (found)" } else { "" };
        println!("  {}{}", path.display(), marker);
    }

    Ok(())
}

fn check_path(path: &Path, name: &str) {
    if path.components().count() > 1 {
        if path.exists() {
            println!("  {}: {} (found)", name, path.display());
        } else {
            println!("  {}: Not found at {}", name, path.display());
        }
    } else {
        check_tool(&path.to_string_lossy(), name);
    }
}

fn check_tool(cmd: &str, name: &str) {
    match which::which(cmd) {
        Ok(path) => println!("  {}: {} (found)", name, path.display()),
        Err(_) => println!("  {}: Not found", name),
    }
}

fn check_tool_with_version(cmd: &str, name: &str, version_arg: &str) {
    if !is_available(cmd) {
        println!("  {}: Not found", name);
        return;
    }
    match version_line(cmd, version_arg) {
        Some(line) if line.len() < 80 => println!("  {}: {}", name, line),
        _ => check_tool(cmd, name),
    }
}
