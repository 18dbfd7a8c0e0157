use std::path::{Path, PathBuf};

/// Initializes process-wide structured logging to a file, matching the
/// `[timestamp level target] message` format this crate's teacher used.
/// Library code always logs through the `log` facade so the same dispatch
/// serves both the bundled binary and an embedding host.
pub fn setup_logging(log_path: &Path) -> Result<(), fern::InitError> {
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} {} {}] {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(log::LevelFilter::Info)
        .chain(std::io::stderr())
        .chain(fern::log_file(log_path)?)
        .apply()?;

    Ok(())
}

pub fn default_log_path() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|p| p.to_path_buf()))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("rolling-capture-engine.log")
}
