use std::path::Path;

use crate::settings::types::SinkSettings;
use crate::sink::error::{Result, SinkError};

/// Load sink settings from a JSON file, returning defaults on a missing file.
///
/// Environment overrides are not applied here; call
/// [`SinkSettings::apply_env_overrides`] on the result.
pub fn load_settings(path: &Path) -> Result<SinkSettings> {
    if !path.exists() {
        return Ok(SinkSettings::default());
    }
    let contents = std::fs::read_to_string(path)
        .map_err(|e| SinkError::Settings(format!("{}: {e}", path.display())))?;
    serde_json::from_str(&contents)
        .map_err(|e| SinkError::Settings(format!("{}: {e}", path.display())))
}
