//! Installation checks

use std::env;
use std::path::{Path, PathBuf};

/// Answers "is the executable for this hop present"
pub trait InstallationProbe: Send + Sync {
    fn is_installed(&self) -> bool;

    /// What was looked for, used in `NotInstalled` errors
    fn describe(&self) -> String;
}

/// Present when a file exists at a fixed path
#[derive(Debug, Clone)]
pub struct ExecutableProbe {
    path: PathBuf,
}

impl ExecutableProbe {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl InstallationProbe for ExecutableProbe {
    fn is_installed(&self) -> bool {
        self.path.is_file()
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Present when a command resolves: a path must exist, a bare name must be
/// found on `PATH`
#[derive(Debug, Clone)]
pub struct CommandProbe {
    command: String,
}

impl CommandProbe {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    /// Full path the command resolves to, if any
    pub fn resolve(&self) -> Option<PathBuf> {
        let command = Path::new(&self.command);
        if command.components().count() > 1 {
            return command.is_file().then(|| command.to_path_buf());
        }

        let paths = env::var_os("PATH")?;
        env::split_paths(&paths)
            .map(|dir| dir.join(command))
            .find(|candidate| candidate.is_file())
    }
}

impl InstallationProbe for CommandProbe {
    fn is_installed(&self) -> bool {
        self.resolve().is_some()
    }

    fn describe(&self) -> String {
        self.command.clone()
    }
}

impl<F> InstallationProbe for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn is_installed(&self) -> bool {
        self()
    }

    fn describe(&self) -> String {
        "custom installation check".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_executable_probe_tracks_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("toolbridge");
        let probe = ExecutableProbe::new(&path);
        assert!(!probe.is_installed());

        std::fs::write(&path, b"#!/bin/sh\n").unwrap();
        assert!(probe.is_installed());

        std::fs::remove_file(&path).unwrap();
        assert!(!probe.is_installed());
        assert_eq!(probe.describe(), path.display().to_string());
    }

    #[test]
    fn test_executable_probe_rejects_directory() {
        let dir = TempDir::new().unwrap();
        assert!(!ExecutableProbe::new(dir.path()).is_installed());
    }

    #[test]
    fn test_command_probe_with_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("host");
        std::fs::write(&path, b"").unwrap();

        let probe = CommandProbe::new(path.to_string_lossy());
        assert_eq!(probe.resolve(), Some(path));
        assert!(!CommandProbe::new("/no/such/dir/host").is_installed());
    }

    #[cfg(unix)]
    #[test]
    fn test_command_probe_searches_path() {
        assert!(CommandProbe::new("sh").is_installed());
        assert!(!CommandProbe::new("toolbridge-definitely-missing-7f3a").is_installed());
    }

    #[test]
    fn test_closure_probe() {
        let probe = || true;
        assert!(probe.is_installed());
    }
}
