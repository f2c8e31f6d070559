//! Transient MySQL option files.

use crate::error::{RefreshError, Result};
use crate::profile::ConnectionProfile;
use std::ffi::OsString;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

/// A `[client]` option file holding one profile's credentials.
///
/// The file is created with owner-only permissions and deleted on
/// [`CredentialsFile::remove`] or when dropped.
#[derive(Debug)]
pub struct CredentialsFile {
    file: NamedTempFile,
}

impl CredentialsFile {
    /// Write the option file into the system temp directory
    pub fn write(profile: &ConnectionProfile) -> Result<Self> {
        Self::write_in(&std::env::temp_dir(), profile)
    }

    pub fn write_in(dir: &Path, profile: &ConnectionProfile) -> Result<Self> {
        let contents = render_option_file(profile)?;
        let mut file = tempfile::Builder::new()
            .prefix("dbrefresh-")
            .suffix(".cnf")
            .tempfile_in(dir)?;
        file.write_all(contents.as_bytes())?;
        file.flush()?;
        debug!(path = %file.path().display(), env = %profile.env, "Wrote credentials file");
        Ok(Self { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// `--defaults-file=<path>`; must be the first argument of the client
    pub fn defaults_arg(&self) -> OsString {
        let mut arg = OsString::from("--defaults-file=");
        arg.push(self.path().as_os_str());
        arg
    }

    pub fn remove(self) -> Result<()> {
        let path = self.path().to_path_buf();
        self.file.close()?;
        debug!(path = %path.display(), "Removed credentials file");
        Ok(())
    }
}

/// Render the `[client]` group for a profile
pub fn render_option_file(profile: &ConnectionProfile) -> Result<String> {
    Ok(format!(
        "[client]\nuser={}\npassword={}\nhost={}\nport={}\n",
        option_value("user", &profile.user)?,
        option_value("password", &profile.password)?,
        option_value("host", &profile.host)?,
        profile.port
    ))
}

// Option files treat backslash as an escape and `#` as a comment start outside quotes.
fn option_value(key: &str, value: &str) -> Result<String> {
    if value.contains(['\n', '\r']) {
        return Err(RefreshError::config(format!(
            "Database {} must not contain line breaks",
            key
        )));
    }
    Ok(format!("\"{}\"", value.replace('\\', "\\\\")))
}
