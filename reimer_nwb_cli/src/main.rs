use clap::{Arg, ArgAction, Command};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use indicatif_log_bridge::LogWrapper;
use std::path::{Path, PathBuf};
use std::sync::mpsc::channel;
use std::sync::Arc;

use libreimer_nwb::config::Config;
use libreimer_nwb::process::process;
use libreimer_nwb::worker_status::WorkerStatus;

const LOG_FILE: &str = "./reimer_nwb.log";

/// Library output goes to a log file, the terminal only gets the CLI's own messages
fn init_file_logger() -> Result<(), spdlog::Error> {
    let file_sink = Arc::new(
        spdlog::sink::FileSink::builder()
            .path(PathBuf::from(LOG_FILE))
            .formatter(Box::new(spdlog::formatter::PatternFormatter::new(
                spdlog::formatter::pattern!(
                    "[{date_short} {time_short}] - [thread: {tid}] - [{^{level}}] - {payload}{eol}"
                ),
            )))
            .truncate(true)
            .build()?,
    );
    let logger = Arc::new(
        spdlog::Logger::builder()
            .flush_level_filter(spdlog::LevelFilter::All)
            .sink(file_sink)
            .build()?,
    );
    spdlog::set_default_logger(logger);
    Ok(())
}

fn make_template_config(path: &Path) {
    match Config::default().write_config_file(path) {
        Ok(()) => log::info!("Done."),
        Err(e) => log::error!("Could not write template config: {e}"),
    }
}

/// Position of the bar in percent of one session
fn bar_position(status: &WorkerStatus) -> u64 {
    (status.session_number as u64) * 100 + (status.progress * 100.0) as u64
}

fn main() {
    // Create a cli
    let matches = Command::new("reimer_nwb_cli")
        .about("Convert Reimer lab pipeline sessions to NWB")
        .arg_required_else_help(true)
        .subcommand(Command::new("new").about("Make a template configuration yaml file"))
        .arg(
            Arg::new("path")
                .short('p')
                .long("path")
                .required(true)
                .global(true)
                .help("Path to the configuration file"),
        )
        .arg(
            Arg::new("stub")
                .long("stub")
                .action(ArgAction::SetTrue)
                .help("Only convert the first frames of each field (see stub_frames)"),
        )
        .get_matches();

    // Initialize feedback
    let logger = simplelog::TermLogger::new(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    );

    let pb_manager = MultiProgress::new();

    if let Err(e) = LogWrapper::new(pb_manager.clone(), logger).try_init() {
        eprintln!("Could not create logging/progress: {e}");
        return;
    }
    if let Err(e) = init_file_logger() {
        log::warn!("Could not create log file {LOG_FILE}: {e}");
    }

    // Parse the cli
    let config_path = match matches.get_one::<String>("path") {
        Some(path) => PathBuf::from(path),
        None => {
            log::error!("A configuration path is required (-p/--path)");
            return;
        }
    };

    if let Some(("new", _)) = matches.subcommand() {
        log::info!(
            "Making a template config at {}...",
            config_path.to_string_lossy()
        );
        make_template_config(&config_path);
        return;
    }

    // Load our config
    log::info!("Loading config from {}...", config_path.to_string_lossy());
    let mut config = match Config::read_config_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            log::error!("{e}");
            return;
        }
    };
    if matches.get_flag("stub") {
        config.stub_test = true;
    }
    if !config.is_compression_valid() {
        log::error!("Compression level must be between 0 and 9");
        return;
    }
    log::info!("Config successfully loaded.");
    log::info!("Export Path: {}", config.export_path.to_string_lossy());
    log::info!("Raw Data Path: {}", config.data_path.to_string_lossy());
    log::info!("Output Path: {}", config.output_path.to_string_lossy());
    if let Some(path) = &config.metadata_path {
        log::info!("Metadata Path: {}", path.to_string_lossy());
    }
    log::info!(
        "Stub: {} ({} frames)",
        config.stub_test,
        config.stub_frames
    );

    // Setup the progress bar
    let pb = pb_manager.add(ProgressBar::new(100));
    if let Ok(style) = ProgressStyle::with_template("{msg} [{bar:40.cyan/blue}] {percent}%") {
        pb.set_style(style);
    }
    let (tx, rx) = channel::<WorkerStatus>();
    // Spawn the task!
    let handle = std::thread::spawn(move || process(config, tx));

    loop {
        // drain every pending status before checking on the task
        if let Ok(status) = rx.try_recv() {
            pb.set_length((status.total_sessions.max(1) as u64) * 100);
            pb.set_position(bar_position(&status));
            pb.set_message(format!(
                "Session {}/{} ({})",
                status.session_number + 1,
                status.total_sessions,
                status.label
            ));
            continue;
        }

        if handle.is_finished() {
            match handle.join() {
                Ok(result) => match result {
                    Ok(summary) => {
                        log::info!("Converted {} sessions.", summary.converted.len());
                        for (key, reason) in summary.failed.iter() {
                            log::error!("Conversion of {key} failed: {reason}");
                        }
                        if !summary.failed.is_empty() {
                            log::warn!("Some sessions failed, check {LOG_FILE} for details.");
                        }
                    }
                    Err(e) => log::error!("Conversion failed with error: {e}"),
                },
                Err(_) => log::error!("Failed to join conversion task!"),
            }
            break;
        }
        std::thread::sleep(std::time::Duration::from_millis(100));
    }

    pb.finish();

    log::info!("Done.");
}
