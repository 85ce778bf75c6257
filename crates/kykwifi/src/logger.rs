use colored::Colorize;
use log::{Level, LevelFilter};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

pub const LOG_FILE_NAME: &str = "kyk_login.log";

/// The log file always keeps debug detail, whatever the console shows.
const FILE_LEVEL: LevelFilter = LevelFilter::Debug;

/// Installs the global logger: coloured level tags on stderr at `level` and,
/// when `log_file` is given, a plain copy of every record down to debug
/// appended to that file.
pub fn init_logger(level: LevelFilter, log_file: Option<&Path>) {
    let file = log_file.and_then(|path| match open_log_file(path) {
        Ok(f) => Some(Arc::new(Mutex::new(f))),
        Err(e) => {
            eprintln!(
                "{} could not open log file {}: {}",
                "WARN".yellow(),
                path.display(),
                e
            );
            None
        }
    });

    env_logger::Builder::new()
        .filter(None, capture_level(level, file.is_some()))
        // Keep third-party chatter (reqwest, html5ever) out of the console.
        .filter_module("reqwest", LevelFilter::Warn)
        .filter_module("html5ever", LevelFilter::Warn)
        .filter_module("selectors", LevelFilter::Warn)
        .format(move |buf, record| {
            if let Some(file) = &file {
                if let Ok(mut f) = file.lock() {
                    let _ = writeln!(
                        f,
                        "{} - {} - {}",
                        buf.timestamp_seconds(),
                        record.level(),
                        record.args()
                    );
                }
            }
            if record.level() > level {
                return Ok(());
            }
            let tag = match record.level() {
                Level::Error => "ERROR".red(),
                Level::Warn => "WARN".yellow(),
                Level::Info => "INFO".green(),
                Level::Debug => "DEBUG".blue(),
                Level::Trace => "TRACE".purple(),
            };
            writeln!(buf, "[{}] - {}", tag, record.args())
        })
        .init();
}

/// Most verbose level any sink wants.
fn capture_level(console: LevelFilter, has_file: bool) -> LevelFilter {
    if has_file {
        console.max(FILE_LEVEL)
    } else {
        console
    }
}

fn open_log_file(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}
