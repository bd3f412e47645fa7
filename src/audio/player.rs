use std::{path::Path, process::Stdio, sync::Arc};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::{AudioConfig, CommandSpec, PlayerKind};

use super::AudioError;

pub const SUPPORTED_EXTENSIONS: [&str; 3] = ["wav", "mp3", "ogg"];

/// Output device for short sound effects.
#[mockall::automock]
#[async_trait]
pub trait AudioPlayer: Send + Sync {
    fn kind(&self) -> PlayerKind;
    fn is_available(&self) -> bool;
    /// Plays `path` at `volume` (0.0-1.0) and returns once playback ended.
    async fn play_sound(&self, path: &Path, volume: f32) -> bool;
}

/// Accepts every sound and produces no output.
#[derive(Debug, Default)]
pub struct SilentPlayer;

#[async_trait]
impl AudioPlayer for SilentPlayer {
    fn kind(&self) -> PlayerKind {
        PlayerKind::Silent
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn play_sound(&self, path: &Path, volume: f32) -> bool {
        debug!(target: "audio", path = %path.display(), volume, "Silent playback");
        true
    }
}

/// Plays sounds through an external program, e.g. `ffplay` or `aplay`.
///
/// Placeholders: `{path}`, `{volume}` (0.0-1.0) and `{volume_percent}`.
#[derive(Debug)]
pub struct CommandPlayer {
    spec: CommandSpec,
}

impl CommandPlayer {
    pub fn new(spec: CommandSpec) -> Self {
        Self { spec }
    }

    pub async fn probe(&self) -> Result<(), AudioError> {
        Command::new(&self.spec.program)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|_| ())
            .map_err(|e| AudioError::PlayerUnavailable {
                player: self.spec.program.clone(),
                message: e.to_string(),
            })
    }
}

#[async_trait]
impl AudioPlayer for CommandPlayer {
    fn kind(&self) -> PlayerKind {
        PlayerKind::Command
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn play_sound(&self, path: &Path, volume: f32) -> bool {
        let path_arg = path.to_string_lossy();
        let volume_arg = format!("{:.2}", volume);
        let percent_arg = ((volume * 100.0).round() as u32).to_string();
        let args = self.spec.render_args(&[
            ("path", path_arg.as_ref()),
            ("volume", volume_arg.as_str()),
            ("volume_percent", percent_arg.as_str()),
        ]);
        match Command::new(&self.spec.program)
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await
        {
            Ok(status) if status.success() => true,
            Ok(status) => {
                warn!(target: "audio", program = %self.spec.program, "Player exited with {}", status);
                false
            }
            Err(e) => {
                warn!(target: "audio", program = %self.spec.program, "Player failed: {}", e);
                false
            }
        }
    }
}

pub async fn create_player(config: &AudioConfig) -> Result<Arc<dyn AudioPlayer>, AudioError> {
    match config.player {
        PlayerKind::Silent => Ok(Arc::new(SilentPlayer)),
        PlayerKind::Command => {
            let player = CommandPlayer::new(config.player_command.clone());
            player.probe().await?;
            Ok(Arc::new(player))
        }
    }
}

pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SUPPORTED_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_extensions() {
        assert!(is_supported(Path::new("a/follow.WAV")));
        assert!(is_supported(Path::new("gift.ogg")));
        assert!(!is_supported(Path::new("readme.txt")));
        assert!(!is_supported(Path::new("noext")));
    }

    #[tokio::test]
    async fn test_unavailable_command_player() {
        let config = AudioConfig {
            player: PlayerKind::Command,
            player_command: CommandSpec {
                program: "no-such-audio-player".into(),
                args: vec!["{path}".into()],
            },
            ..Default::default()
        };
        assert!(matches!(
            create_player(&config).await,
            Err(AudioError::PlayerUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_silent_player() {
        let player = create_player(&AudioConfig::default()).await.unwrap();
        assert_eq!(player.kind(), PlayerKind::Silent);
        assert!(player.play_sound(Path::new("x.wav"), 0.5).await);
    }
}
