//! Engine options file.

use std::path::Path;

use popup_core::EngineOptions;

/// Reads engine tunables from a TOML file. A missing file means defaults.
pub fn load_options(path: Option<&Path>) -> Result<EngineOptions, String> {
    let Some(path) = path else {
        return Ok(EngineOptions::default());
    };

    if !path.exists() {
        return Ok(EngineOptions::default());
    }

    let content = fs_err::read_to_string(path)
        .map_err(|err| format!("Failed to read options {}: {}", path.display(), err))?;
    toml::from_str::<EngineOptions>(&content)
        .map_err(|err| format!("Failed to parse options {}: {}", path.display(), err))
}

/// Like [`load_options`], but a broken file is logged and replaced by
/// defaults.
pub fn load_options_or_default(path: Option<&Path>) -> EngineOptions {
    match load_options(path) {
        Ok(options) => options,
        Err(err) => {
            tracing::warn!(error = %err, "Using default engine options");
            EngineOptions::default()
        }
    }
}
