use std::{process::Stdio, sync::Arc};

use async_trait::async_trait;
use tokio::{process::Command, sync::RwLock};
use tracing::{debug, info, warn};

use crate::config::{CommandSpec, EngineKind, TtsConfig};

use super::TtsError;

/// A voice backend. `speak` returns once the utterance has finished.
#[mockall::automock]
#[async_trait]
pub trait TtsEngine: Send + Sync {
    fn kind(&self) -> EngineKind;
    async fn speak(&self, text: &str) -> bool;
    async fn set_voice_rate(&self, rate: u32);
    async fn set_voice_volume(&self, volume: f32);
}

#[derive(Debug, Clone, Copy)]
struct Voice {
    rate: u32,
    volume: f32,
}

/// Logs each utterance instead of producing sound.
#[derive(Debug)]
pub struct ConsoleEngine {
    voice: RwLock<Voice>,
}

impl ConsoleEngine {
    pub fn new(rate: u32, volume: f32) -> Self {
        Self {
            voice: RwLock::new(Voice { rate, volume }),
        }
    }
}

#[async_trait]
impl TtsEngine for ConsoleEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Console
    }

    async fn speak(&self, text: &str) -> bool {
        let voice = *self.voice.read().await;
        info!(target: "tts", rate = voice.rate, volume = voice.volume, "🔊 {}", text);
        true
    }

    async fn set_voice_rate(&self, rate: u32) {
        self.voice.write().await.rate = rate;
    }

    async fn set_voice_volume(&self, volume: f32) {
        self.voice.write().await.volume = volume;
    }
}

/// Runs an external speech program once per utterance.
///
/// Placeholders: `{text}`, `{rate}`, `{volume}` (0.0-1.0), `{amplitude}`
/// (0-200, espeak scale) and `{language}`.
#[derive(Debug)]
pub struct CommandEngine {
    spec: CommandSpec,
    language: String,
    voice: RwLock<Voice>,
}

impl CommandEngine {
    pub fn new(spec: CommandSpec, language: &str, rate: u32, volume: f32) -> Self {
        Self {
            spec,
            language: language.to_string(),
            voice: RwLock::new(Voice { rate, volume }),
        }
    }

    /// Checks that the program can be spawned at all.
    pub async fn probe(&self) -> Result<(), TtsError> {
        Command::new(&self.spec.program)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|_| ())
            .map_err(|e| TtsError::EngineUnavailable {
                engine: self.spec.program.clone(),
                message: e.to_string(),
            })
    }
}

#[async_trait]
impl TtsEngine for CommandEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Command
    }

    async fn speak(&self, text: &str) -> bool {
        let voice = *self.voice.read().await;
        let rate = voice.rate.to_string();
        let volume = format!("{:.2}", voice.volume);
        let amplitude = ((voice.volume * 200.0).round() as u32).to_string();
        let args = self.spec.render_args(&[
            ("rate", rate.as_str()),
            ("volume", volume.as_str()),
            ("amplitude", amplitude.as_str()),
            ("language", self.language.as_str()),
            ("text", text),
        ]);
        debug!(target: "tts", program = %self.spec.program, ?args, "Spawning speech command");

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
                warn!(target: "tts", program = %self.spec.program, "Speech command exited with {}", status);
                false
            }
            Err(e) => {
                warn!(target: "tts", program = %self.spec.program, "Speech command failed: {}", e);
                false
            }
        }
    }

    async fn set_voice_rate(&self, rate: u32) {
        self.voice.write().await.rate = rate;
    }

    async fn set_voice_volume(&self, volume: f32) {
        self.voice.write().await.volume = volume;
    }
}

/// Builds the backend selected by `config.engine`.
pub async fn create_engine(config: &TtsConfig) -> Result<Arc<dyn TtsEngine>, TtsError> {
    match config.engine {
        EngineKind::Console => Ok(Arc::new(ConsoleEngine::new(
            config.voice_rate,
            config.voice_volume,
        ))),
        EngineKind::Command => {
            let engine = CommandEngine::new(
                config.command.clone(),
                &config.language,
                config.voice_rate,
                config.voice_volume,
            );
            engine.probe().await?;
            Ok(Arc::new(engine))
        }
    }
}
