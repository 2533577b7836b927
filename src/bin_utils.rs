use csv::Writer;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

pub fn write_records(
    output: &Path,
    records: impl IntoIterator<Item = impl Serialize>,
) -> csv::Result<()> {
    if let Some(parent) = output.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent)
                .expect(format!("Could not create dir {}", parent.display()).as_str());
        }
    }

    let mut writer = Writer::from_path(output)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn default_output_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("output")
}

pub fn init_logging(verbose: bool) {
    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} {} {}] {}",
                chrono::Local::now().format("%H:%M:%S"),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level)
        .chain(std::io::stdout())
        .apply()
        .expect("Logging was already initialized");
}
