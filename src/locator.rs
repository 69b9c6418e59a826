//! Resolution of the storage helper executable.
//!
//! Resolution order:
//! 1. `$MONGOSHIM`, used verbatim when non-empty
//! 2. `mongoshim` (plus the platform executable suffix) next to the
//!    running executable
//!
//! The resolved path must exist; a missing helper is reported as
//! [`ShimError::HelperNotFound`] so callers can point the user at the
//! override variable instead of printing a bare I/O error.

use std::ffi::OsStr;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Result, ShimError};

/// Environment variable overriding the helper path.
pub const HELPER_ENV: &str = "MONGOSHIM";

/// File stem of the helper binary.
pub const HELPER_NAME: &str = "mongoshim";

/// Locate the helper using the process environment.
pub fn locate_helper() -> Result<PathBuf> {
    let override_path = std::env::var_os(HELPER_ENV);
    locate_with(override_path.as_deref())
}

/// Locate the helper given an explicit override value.
pub fn locate_with(override_path: Option<&OsStr>) -> Result<PathBuf> {
    let path = match override_path.filter(|p| !p.is_empty()) {
        Some(path) => PathBuf::from(path),
        None => beside_current_exe()?,
    };

    match std::fs::metadata(&path) {
        Ok(_) => {
            debug!(helper = %path.display(), "located storage helper");
            Ok(path)
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Err(ShimError::HelperNotFound { path }),
        Err(e) => Err(ShimError::Locate(e)),
    }
}

/// The helper path in the directory holding the running executable.
fn beside_current_exe() -> Result<PathBuf> {
    let exe = std::env::current_exe().map_err(ShimError::Locate)?;
    let dir = exe.parent().unwrap_or_else(|| Path::new("."));
    Ok(dir.join(helper_file_name()))
}

/// Platform file name of the helper binary.
pub fn helper_file_name() -> String {
    format!("{}{}", HELPER_NAME, std::env::consts::EXE_SUFFIX)
}
