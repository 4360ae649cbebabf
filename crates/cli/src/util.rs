mod launch;
mod logging;

use std::path::Path;

use nu_ansi_term::{AnsiGenericString, Style};
use tpsbench_core::CancellationToken;
use tracing::{info, warn};

use crate::commands::ArgsError;

pub use launch::{wait_for_launch, LaunchOutcome};
pub use logging::init_tracing;

pub fn bold<'a>(msg: impl AsRef<str> + 'a) -> AnsiGenericString<'a, str> {
    Style::new().bold().paint(msg.as_ref().to_owned())
}

/// Token cancelled by the first CTRL-C; every long-running call watches it.
pub fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::task::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("CTRL-C received, finishing in-flight work...");
                token.cancel();
            }
            Err(e) => warn!("failed to listen for CTRL-C: {e}"),
        }
    });
    cancel
}

pub fn read_mnemonic(path: &Path) -> Result<String, ArgsError> {
    let phrase = std::fs::read_to_string(path).map_err(|source| ArgsError::MnemonicFile {
        path: path.to_path_buf(),
        source,
    })?;
    let phrase = phrase.trim();
    if phrase.is_empty() {
        return Err(ArgsError::EmptyMnemonic {
            path: path.to_path_buf(),
        });
    }
    Ok(phrase.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mnemonic_is_trimmed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mnemonic.txt");
        std::fs::write(&path, "  test test junk\n").unwrap();
        assert_eq!(read_mnemonic(&path).unwrap(), "test test junk");
    }

    #[test]
    fn empty_or_missing_mnemonic_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mnemonic.txt");
        assert!(matches!(
            read_mnemonic(&path),
            Err(ArgsError::MnemonicFile { .. })
        ));
        std::fs::write(&path, "\n\n").unwrap();
        assert!(matches!(
            read_mnemonic(&path),
            Err(ArgsError::EmptyMnemonic { .. })
        ));
    }
}
