//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments
//! - resolves the session directories and clears staging on exit
//! - lists catalogs and writes sample datasets
//! - runs select -> fit -> export and prints summaries
//! - launches the TUI

use clap::Parser;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use crate::cli::{Command, FitArgs, ListArgs, SampleArgs, TuiArgs, rewrite_args};
use crate::data::{SampleConfig, write_sample};
use crate::error::AppError;
use crate::io::DatasetResolver;
use crate::session::{SessionConfig, SessionGuard, SessionStorage};

pub mod pipeline;

use pipeline::Session;

/// Entry point for the `alps` binary.
pub fn run() -> Result<(), AppError> {
    // We want a bare `alps` to behave like `alps tui`.
    //
    // Clap requires a subcommand name, so we do a small, explicit rewrite of the
    // argv list before parsing.
    let argv = rewrite_args(std::env::args().collect());
    let cli = crate::cli::Cli::parse_from(argv);

    // The TUI owns the terminal; log lines would tear the frame.
    if !matches!(cli.command, Command::Tui(_)) {
        setup_logging(cli.verbose);
    }

    let config = SessionConfig::resolve(&cli.data_dir);
    let storage = SessionStorage::new(config);

    match cli.command {
        // Sample generation only writes into the sample directory.
        Command::Sample(args) => handle_sample(&storage, args),
        command => {
            let mut session = Session::open(&storage)?;
            let _guard = SessionGuard::new(&storage);
            match command {
                Command::List(args) => handle_list(&mut session, args),
                Command::Fit(args) => handle_fit(&mut session, args),
                Command::Tui(args) => handle_tui(&mut session, args),
                Command::Sample(_) => Ok(()),
            }
        }
    }
}

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::WARN };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();
    // A second install (tests, embedding) keeps the first subscriber.
    tracing::subscriber::set_global_default(subscriber).ok();
}

fn handle_list(session: &mut Session, args: ListArgs) -> Result<(), AppError> {
    let entries = session.selector.show_catalog(args.catalog);
    print!("{}", crate::report::format_catalog(args.catalog, entries));
    Ok(())
}

fn handle_fit(session: &mut Session, args: FitArgs) -> Result<(), AppError> {
    if !args.upload.files.is_empty() {
        let report = session.selector.upload_paths(&args.upload.files);
        print!("{}", crate::report::format_upload_report(&report));
    }

    // Validate every flag before prompting for a dataset.
    let params = pipeline::params_from_args(&args)?;
    let requests = pipeline::requested_exports(&args);

    let dataset = session.select_dataset(
        args.catalog,
        args.file.as_deref(),
        crate::cli::picker::prompt_for_entry,
    )?;
    println!("{}", crate::report::format_dataset_summary(&dataset, args.head));

    let mut form = pipeline::new_form(dataset, params.clone());
    let result = form.submit()?;
    println!("{}", crate::report::format_result_summary(&params, result));

    for path in pipeline::write_exports(&session.exporter, result, &requests)? {
        println!("exported  {}", path.display());
    }
    Ok(())
}

fn handle_sample(storage: &SessionStorage, args: SampleArgs) -> Result<(), AppError> {
    let config = SampleConfig {
        rows: args.rows,
        seed: args.seed,
        noise_sd: args.noise,
        jump_prob: args.jump_prob,
        ..SampleConfig::default()
    };
    let path = write_sample(
        &storage.config().sample_dir,
        &args.name,
        &config,
        &DatasetResolver::default(),
    )?;
    println!("wrote     {}", path.display());
    Ok(())
}

fn handle_tui(session: &mut Session, args: TuiArgs) -> Result<(), AppError> {
    crate::tui::run(session, args)
}
