// download.rs — Model file download with SHA256 reporting/verification.
//
// Downloads model files on first use and caches them in the configured model directory.
// The SHA256 of every file is logged; when a pin is configured the file must match it.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use sha2::{Digest, Sha256};

use crate::config::{self, Settings};

fn required_files(settings: &Settings) -> [(&'static str, Option<&str>); 3] {
    let pins = &settings.model_pins;
    [
        (config::embedding::WEIGHTS_FILE, pins.safetensors.as_deref()),
        (config::embedding::TOKENIZER_FILE, pins.tokenizer.as_deref()),
        (config::embedding::CONFIG_FILE, pins.config.as_deref()),
    ]
}

/// Check if all required model files exist locally.
pub fn model_files_exist(model_dir: &Path) -> bool {
    [
        config::embedding::WEIGHTS_FILE,
        config::embedding::TOKENIZER_FILE,
        config::embedding::CONFIG_FILE,
    ]
    .iter()
    .all(|f| model_dir.join(f).exists())
}

/// Download all model files if not already cached. Returns the model directory path.
pub fn ensure_model_files(settings: &Settings) -> anyhow::Result<PathBuf> {
    let dir = settings.model_dir.clone();

    if model_files_exist(&dir) {
        log::info!("Model files already cached at {}", dir.display());
        validate_weights(&dir.join(config::embedding::WEIGHTS_FILE))?;
        return Ok(dir);
    }

    log::info!(
        "Downloading embedding model {} to {}",
        config::embedding::EMBEDDING_MODEL_NAME,
        dir.display()
    );
    fs::create_dir_all(&dir).with_context(|| format!("failed to create model dir {}", dir.display()))?;

    let base = settings.model_base_url.trim_end_matches('/');
    for (file, pin) in required_files(settings) {
        let dest = dir.join(file);
        if dest.exists() {
            continue;
        }
        download_and_verify(&format!("{base}/{file}"), &dest, pin)?;
    }

    validate_weights(&dir.join(config::embedding::WEIGHTS_FILE))?;
    log::info!("Model download complete");
    Ok(dir)
}

/// Download a file from URL and write it atomically, checking the SHA256 pin if any.
fn download_and_verify(url: &str, dest: &Path, expected_sha256: Option<&str>) -> anyhow::Result<()> {
    let filename = dest.file_name().unwrap_or_default().to_string_lossy();
    log::info!("Downloading {} from {}", filename, url);

    let resp = ureq::get(url)
        .timeout(std::time::Duration::from_secs(config::embedding::DOWNLOAD_TIMEOUT_SECS))
        .call()
        .with_context(|| format!("failed to download {url}"))?;

    let status = resp.status();
    if status != 200 {
        bail!("HTTP {status} downloading {url}");
    }

    let mut body = Vec::new();
    resp.into_reader()
        .read_to_end(&mut body)
        .with_context(|| format!("failed to read response body for {url}"))?;

    let actual_hash = sha256_hex(&body);
    match expected_sha256 {
        Some(expected) if !actual_hash.eq_ignore_ascii_case(expected) => {
            bail!(
                "SHA256 mismatch for {}: expected {}, got {}",
                filename,
                expected,
                actual_hash
            );
        }
        Some(_) => log::info!("SHA256 verified for {} ({})", filename, &actual_hash[..12]),
        None => log::info!("SHA256 of {} is {} (no pin configured)", filename, actual_hash),
    }

    write_atomic(dest, &body)
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Write to `<dest>.tmp`, then rename over `dest`.
fn write_atomic(dest: &Path, body: &[u8]) -> anyhow::Result<()> {
    let tmp_path = dest.with_extension("tmp");
    let mut file = fs::File::create(&tmp_path)
        .with_context(|| format!("failed to create {}", tmp_path.display()))?;
    file.write_all(body)?;
    file.flush()?;
    drop(file);

    fs::rename(&tmp_path, dest)
        .with_context(|| format!("failed to rename {} -> {}", tmp_path.display(), dest.display()))?;
    Ok(())
}

/// Parse the safetensors header so a truncated download fails here rather than
/// deep inside the model loader.
fn validate_weights(path: &Path) -> anyhow::Result<()> {
    let bytes = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    let (_, metadata) = safetensors::SafeTensors::read_metadata(&bytes)
        .map_err(|e| anyhow::anyhow!("invalid safetensors file {}: {e:?}", path.display()))?;
    let tensors = metadata.tensors();
    if tensors.is_empty() {
        bail!("safetensors file {} contains no tensors", path.display());
    }
    log::info!("Validated {} ({} tensors)", path.display(), tensors.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_hex() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_write_atomic_replaces_and_cleans_tmp() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("config.json");
        fs::write(&dest, "old").unwrap();
        write_atomic(&dest, b"new").unwrap();
        assert_eq!(fs::read_to_string(&dest).unwrap(), "new");
        assert!(!dir.path().join("config.tmp").exists());
    }

    #[test]
    fn test_model_files_exist() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!model_files_exist(dir.path()));
        for f in ["model.safetensors", "tokenizer.json", "config.json"] {
            fs::write(dir.path().join(f), "x").unwrap();
        }
        assert!(model_files_exist(dir.path()));
    }

    #[test]
    fn test_validate_weights_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("model.safetensors");
        fs::write(&p, b"definitely not safetensors").unwrap();
        assert!(validate_weights(&p).is_err());
    }
}
