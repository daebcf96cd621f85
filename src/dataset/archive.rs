use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::ArchiveError;

/// Extract every entry of `zip_path` under `dest`. Returns the extracted paths
/// in archive order. Entries that would land outside `dest` are skipped.
pub fn extract_zip(zip_path: &Path, dest: &Path) -> Result<Vec<PathBuf>, ArchiveError> {
    log::info!("Extracting {} to {}", zip_path.display(), dest.display());

    let extract_err = |entry: &str, e: &dyn std::fmt::Display| ArchiveError::Extract {
        path: zip_path.to_path_buf(),
        entry: entry.to_string(),
        message: e.to_string(),
    };

    let file = fs::File::open(zip_path).map_err(|e| ArchiveError::Open {
        path: zip_path.to_path_buf(),
        source: zip::result::ZipError::Io(e),
    })?;
    let mut archive = zip::ZipArchive::new(file).map_err(|source| ArchiveError::Open {
        path: zip_path.to_path_buf(),
        source,
    })?;

    fs::create_dir_all(dest).map_err(|e| extract_err("<root>", &e))?;

    let mut extracted = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|e| extract_err(&format!("#{i}"), &e))?;
        let name = entry.name().to_string();

        let Some(relative) = entry.enclosed_name() else {
            log::warn!("Skipping unsafe archive entry: {}", name);
            continue;
        };
        let out_path = dest.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&out_path).map_err(|e| extract_err(&name, &e))?;
        } else {
            if let Some(parent) = out_path.parent() {
                fs::create_dir_all(parent).map_err(|e| extract_err(&name, &e))?;
            }
            let mut out = fs::File::create(&out_path).map_err(|e| extract_err(&name, &e))?;
            io::copy(&mut entry, &mut out).map_err(|e| extract_err(&name, &e))?;
        }
        extracted.push(out_path);
    }

    log::info!("Extracted {} entries", extracted.len());
    Ok(extracted)
}

/// All `.csv` files (any case) below `dir`, sorted.
pub fn find_csv_files(dir: &Path) -> Result<Vec<PathBuf>, ArchiveError> {
    let mut out = Vec::new();
    for entry in WalkDir::new(dir) {
        let entry = entry.map_err(|e| ArchiveError::Scan {
            path: dir.to_path_buf(),
            message: e.to_string(),
        })?;
        if entry.file_type().is_file() && has_csv_extension(entry.path()) {
            out.push(entry.into_path());
        }
    }
    out.sort();
    Ok(out)
}

/// CSV files among freshly extracted paths: files are kept when they end in
/// `.csv`, directories are scanned recursively. Duplicates are dropped.
pub fn collect_csv_paths(extracted: &[PathBuf]) -> Result<Vec<PathBuf>, ArchiveError> {
    let mut out: Vec<PathBuf> = Vec::new();
    for p in extracted {
        let found = if p.is_dir() {
            find_csv_files(p)?
        } else if has_csv_extension(p) {
            vec![p.clone()]
        } else {
            continue;
        };
        for f in found {
            if !out.contains(&f) {
                out.push(f);
            }
        }
    }
    Ok(out)
}

fn has_csv_extension(p: &Path) -> bool {
    p.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("csv"))
        .unwrap_or(false)
}

#[cfg(test)]
pub(crate) fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
    use std::io::Write;

    let file = fs::File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default();
    for (name, bytes) in entries {
        if name.ends_with('/') {
            zip.add_directory(name.trim_end_matches('/'), options).unwrap();
        } else {
            zip.start_file(*name, options).unwrap();
            zip.write_all(bytes).unwrap();
        }
    }
    zip.finish().unwrap();
}
