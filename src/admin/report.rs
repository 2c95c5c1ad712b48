// graphdb-backup/src/admin/report.rs
use flate2::Compression;
use flate2::write::GzEncoder;
use std::fs::{self, File};
use std::path::Path;
use tar::Builder;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::errors::Result;

/// Turns whatever the consistency checker left at `<output_dir>/<report_name>` into a
/// single uploadable file and returns its name.
///
/// A report directory is packed into `<report_name>.tar.gz` and removed, a plain report
/// file is returned as is, and a missing report yields an empty string.
pub fn collect_report(output_dir: &Path, report_name: &str) -> Result<String> {
    let report_path = output_dir.join(report_name);

    if report_path.is_dir() {
        let archive_name = format!("{}.tar.gz", report_name);
        create_tar_gz_archive(&report_path, &output_dir.join(&archive_name))?;
        fs::remove_dir_all(&report_path)?;
        return Ok(archive_name);
    }

    if report_path.is_file() {
        return Ok(report_name.to_string());
    }

    debug!(report = %report_path.display(), "Consistency check produced no report");
    Ok(String::new())
}

/// Creates a GZipped TAR archive of `source_dir`; entry paths are relative to it.
fn create_tar_gz_archive(source_dir: &Path, archive_dest_path: &Path) -> Result<()> {
    info!(
        source = %source_dir.display(),
        archive = %archive_dest_path.display(),
        "Archiving consistency check report"
    );

    let archive_file = File::create(archive_dest_path)?;
    let enc = GzEncoder::new(archive_file, Compression::default());
    let mut tar_builder = Builder::new(enc);

    for entry in WalkDir::new(source_dir).min_depth(1) {
        let entry = entry.map_err(std::io::Error::from)?;
        let path = entry.path();
        let name = path
            .strip_prefix(source_dir)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

        if path.is_dir() {
            tar_builder.append_dir(name, path)?;
        } else if path.is_file() {
            tar_builder.append_path_with_name(path, name)?;
        }
    }

    tar_builder.into_inner()?.finish()?;
    Ok(())
}
