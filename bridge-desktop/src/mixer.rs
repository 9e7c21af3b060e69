//! Output gain through ALSA's `amixer`.

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    mixer::MixerControl,
};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Runs `<program> <args...> <delta>dB` for every gain change.
#[derive(Debug, Clone)]
pub struct AmixerControl {
    program: String,
    args: Vec<String>,
}

impl AmixerControl {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// The mixer argument for a signed change, e.g. `-3dB` or `+2dB`.
    pub fn gain_argument(delta_db: i32) -> String {
        format!("{delta_db:+}dB")
    }
}

impl Default for AmixerControl {
    fn default() -> Self {
        Self::new(
            "amixer",
            ["-c", "0", "--", "sset", "PCM", "playback"]
                .into_iter()
                .map(String::from)
                .collect(),
        )
    }
}

#[async_trait]
impl MixerControl for AmixerControl {
    async fn adjust_gain(&self, delta_db: i32) -> Result<()> {
        let gain = Self::gain_argument(delta_db);
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(&gain)
            .stdin(Stdio::null())
            .output()
            .await?;

        if !output.status.success() {
            return Err(BridgeError::OperationFailed(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        debug!(program = %self.program, %gain, "Gain adjusted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gain_argument() {
        assert_eq!(AmixerControl::gain_argument(-3), "-3dB");
        assert_eq!(AmixerControl::gain_argument(-1), "-1dB");
        assert_eq!(AmixerControl::gain_argument(2), "+2dB");
    }

    #[tokio::test]
    async fn test_missing_program_is_local_io_failure() {
        let mixer = AmixerControl::new("/nonexistent/amixer", Vec::new());
        let err = mixer.adjust_gain(-3).await.unwrap_err();
        assert!(err.is_local_io());
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_operation_failure() {
        let mixer = AmixerControl::new("false", Vec::new());
        let err = mixer.adjust_gain(-3).await.unwrap_err();
        assert!(matches!(err, BridgeError::OperationFailed(_)));
    }

    #[tokio::test]
    async fn test_successful_run() {
        let mixer = AmixerControl::new("true", vec!["sset".into(), "PCM".into()]);
        assert!(mixer.adjust_gain(-1).await.is_ok());
    }
}
