use std::process::Command;
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, warn};

use super::{run_stdout, spawn_error, InfoSource};
use crate::errors::AppError;

const FASTFETCH_REMEDIATION: &str = "You probably forgot to install it. You can install it from https://github.com/fastfetch-cli/fastfetch?tab=readme-ov-file#installation";
const NEOFETCH_REMEDIATION: &str = "Please install Neofetch or use Fastfetch (the default).";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NeofetchStatus {
    Installed,
    /// `neofetch` on PATH is really fastfetch's compatibility shim.
    Wrapper,
    Uninstalled,
}

impl NeofetchStatus {
    pub fn from_version_output(output: &str) -> Self {
        if output.to_lowercase().contains("fastfetch") {
            Self::Wrapper
        } else {
            Self::Installed
        }
    }
}

pub fn neofetch_status() -> NeofetchStatus {
    match Command::new("neofetch").arg("--version").output() {
        Ok(output) => {
            let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
            text.push_str(&String::from_utf8_lossy(&output.stderr));
            NeofetchStatus::from_version_output(&text)
        }
        Err(error) => {
            debug!(%error, "neofetch --version failed");
            NeofetchStatus::Uninstalled
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Fastfetch;

impl InfoSource for Fastfetch {
    fn info_lines(&self) -> Result<Vec<String>> {
        let mut command = Command::new("fastfetch");
        command.args(["--logo", "none", "--pipe", "false"]);
        let stdout = run_stdout(&mut command, "Fastfetch", FASTFETCH_REMEDIATION)?;
        Ok(split_lines(&stdout))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Neofetch;

impl InfoSource for Neofetch {
    fn info_lines(&self) -> Result<Vec<String>> {
        let mut command = Command::new("neofetch");
        command.arg("--off");
        let stdout = run_stdout(&mut command, "Neofetch", NEOFETCH_REMEDIATION)?;
        Ok(split_lines(&stdout))
    }
}

/// Fastfetch unless `use_neofetch`. A neofetch that is only a fastfetch
/// wrapper is refused unless `force` is set.
pub fn select_info_source(use_neofetch: bool, force: bool) -> Result<Arc<dyn InfoSource>> {
    if !use_neofetch {
        return Ok(Arc::new(Fastfetch));
    }
    match neofetch_status() {
        NeofetchStatus::Installed => Ok(Arc::new(Neofetch)),
        NeofetchStatus::Wrapper if force => {
            warn!("neofetch is a fastfetch wrapper; running it anyway");
            Ok(Arc::new(Neofetch))
        }
        NeofetchStatus::Wrapper => Err(AppError::config(
            "E_NEOFETCH_DEPRECATED",
            "Neofetch is deprecated. Try fastfetch (the default) or force neofetch to run using '--force' argument.",
        )
        .into()),
        NeofetchStatus::Uninstalled => Err(spawn_error(
            std::io::Error::from(std::io::ErrorKind::NotFound),
            "Neofetch",
            NEOFETCH_REMEDIATION,
        )),
    }
}

fn split_lines(stdout: &str) -> Vec<String> {
    stdout.lines().map(str::to_owned).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapper_is_detected_case_insensitively() {
        assert_eq!(
            NeofetchStatus::from_version_output("FastFetch 2.8.0 (neofetch compat)"),
            NeofetchStatus::Wrapper
        );
        assert_eq!(
            NeofetchStatus::from_version_output("Neofetch 7.1.0"),
            NeofetchStatus::Installed
        );
    }

    #[test]
    fn lines_keep_escapes_and_drop_newlines() {
        let lines = split_lines("\x1b[1mOS\x1b[0m: Linux\r\nHost: box\n");
        assert_eq!(lines, vec!["\x1b[1mOS\x1b[0m: Linux", "Host: box"]);
    }
}
