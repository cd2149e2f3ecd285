//! Generic parameters functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::de::DeserializeOwned;
use std::fs::read_to_string;
use std::path::{Path, PathBuf};
use thiserror::Error;
use toml;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// An error that occurs during loading of a parameter file.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Cannot load the parameter file {0:?}: {1}")]
    FileLoadError(PathBuf, std::io::Error),

    #[error("Cannot read the parameter file {0:?}: {1}")]
    DeserialiseError(PathBuf, toml::de::Error)
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Load a parameter file from the given path.
pub fn load<P, T>(param_file_path: T) -> Result<P, LoadError> 
where
    P: DeserializeOwned,
    T: AsRef<Path>
{
    let path = param_file_path.as_ref();

    // Load the file into a string
    let params_str = match read_to_string(path) {
        Ok(s) => s,
        Err(e) => return Err(LoadError::FileLoadError(path.to_path_buf(), e))
    };

    from_str(path, params_str.as_str())
}

/// Parse parameters from a TOML string, `origin` is only used in error
/// messages.
pub fn from_str<P, T>(origin: T, params_str: &str) -> Result<P, LoadError>
where
    P: DeserializeOwned,
    T: AsRef<Path>
{
    toml::from_str(params_str)
        .map_err(|e| LoadError::DeserialiseError(origin.as_ref().to_path_buf(), e))
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
