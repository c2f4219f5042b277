//! Symbols file loading (JSON or TOML).

use super::model::Symbols;
use crate::utils::error::SymbolsError;
use log::{debug, info};
use std::fs;
use std::path::Path;

/// Load a symbols file, picking the format from the extension
///
/// **Public** - main entry point for symbols
///
/// # Errors
/// * `SymbolsError::Io` - If file cannot be read
/// * `SymbolsError::Json` / `SymbolsError::Toml` - If the content is invalid
/// * `SymbolsError::UnknownFormat` - If the extension is neither `json` nor `toml`
///
/// # Example
/// ```ignore
/// let symbols = load_symbols("trace.symbols.json")?;
/// ```
pub fn load_symbols(path: impl AsRef<Path>) -> Result<Symbols, SymbolsError> {
    let path = path.as_ref();
    info!("Loading symbols from: {}", path.display());

    let contents = fs::read_to_string(path)?;
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    let symbols = match extension.as_deref() {
        Some("json") => parse_symbols_json(&contents)?,
        Some("toml") => parse_symbols_toml(&contents)?,
        other => {
            return Err(SymbolsError::UnknownFormat(
                other.unwrap_or("<none>").to_string(),
            ))
        }
    };

    debug!(
        "Symbols loaded: {} types, {} sites, heap word size {}",
        symbols.types.len(),
        symbols.sites.len(),
        symbols.heap_word_size
    );

    Ok(symbols)
}

/// Parse symbols from a JSON string
pub fn parse_symbols_json(contents: &str) -> Result<Symbols, SymbolsError> {
    let symbols: Symbols = serde_json::from_str(contents)?;
    symbols.finalize()
}

/// Parse symbols from a TOML string
pub fn parse_symbols_toml(contents: &str) -> Result<Symbols, SymbolsError> {
    let symbols: Symbols = toml::from_str(contents)?;
    symbols.finalize()
}
