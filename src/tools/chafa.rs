use std::ffi::OsString;
use std::path::Path;
use std::process::Command;

use anyhow::{bail, Result};

use super::{run_stdout, FrameRenderer, CHAFA_REMEDIATION};

/// Text-art rendering through `chafa`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Chafa;

impl FrameRenderer for Chafa {
    fn render(&self, image: &Path, width: u32, height: u32, style_args: &[String]) -> Result<String> {
        if !image.exists() {
            bail!("chafa input does not exist: {}", image.display());
        }
        let mut command = Command::new("chafa");
        command.args(render_args(image, width, height, style_args));
        run_stdout(&mut command, "chafa", CHAFA_REMEDIATION)
    }
}

/// User style arguments first, then the fixed output format and size.
pub fn render_args(image: &Path, width: u32, height: u32, style_args: &[String]) -> Vec<OsString> {
    let mut args = style_args.iter().map(OsString::from).collect::<Vec<_>>();
    args.push("--format".into());
    args.push("symbols".into());
    args.push(format!("--size={}x{}", width.max(1), height.max(1)).into());
    args.push(image.as_os_str().to_owned());
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn style_args_precede_size_and_image() {
        let args = render_args(
            Path::new("/tmp/00001.png"),
            40,
            0,
            &["--symbols".to_owned(), "ascii".to_owned()],
        );
        let args = args
            .iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect::<Vec<_>>();
        assert_eq!(
            args,
            vec!["--symbols", "ascii", "--format", "symbols", "--size=40x1", "/tmp/00001.png"]
        );
    }
}
