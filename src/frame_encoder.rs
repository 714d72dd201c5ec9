//! Turns frame files into the base64 text embedded in model requests.

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use std::fs;
use std::path::Path;

/// Reads the whole file and returns its standard base64 encoding.
pub fn encode_file(path: &Path) -> Result<String> {
    let bytes = fs::read(path)
        .with_context(|| format!("Failed to read frame file {:?}", path))?;
    Ok(STANDARD.encode(bytes))
}

pub fn jpeg_data_uri(encoded: &str) -> String {
    format!("data:image/jpeg;base64,{}", encoded)
}
