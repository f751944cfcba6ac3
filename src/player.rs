use std::{fmt, time::Duration};

use tracing::{debug, info, warn};

use crate::{
    error::{ConfigurationError, PlayerError},
    radio::{self, Info, KaRadio},
};

/// How often a front end should call [`Player::refresh`].
pub(crate) const SCAN_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Playback {
    Playing,
    Paused,
}

/// What the player shows. Fields stay `None` until the radio reports them.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct PlayerState {
    pub(crate) available: bool,
    pub(crate) playback: Option<Playback>,
    pub(crate) volume_level: Option<f64>,
    pub(crate) media_title: Option<String>,
    pub(crate) source: Option<String>,
}

impl fmt::Display for PlayerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.available {
            f.write_str("unavailable, ")?;
        }
        match self.playback {
            Some(Playback::Playing) => f.write_str("playing")?,
            Some(Playback::Paused) => f.write_str("stopped")?,
            None => f.write_str("unknown")?,
        }
        if let Some(source) = &self.source {
            write!(f, " {source}")?;
        }
        if let Some(title) = self.media_title.as_deref().filter(|t| !t.is_empty()) {
            write!(f, " - {title}")?;
        }
        if let Some(level) = self.volume_level {
            write!(f, " (volume {:.0}%)", level * 100.0)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PlayerCommand {
    /// Resume the current source, or whatever the radio last played.
    Play,
    Start,
    Stop,
    SelectSource(String),
    SetVolume(f64),
}

/// Media player view of one radio.
///
/// Calls take `&mut self`, so a player has at most one request in flight.
/// Share it between tasks behind a `tokio::sync::Mutex`.
pub(crate) struct Player {
    radio: KaRadio,
    source_list: Vec<String>,
    sw_version: Option<String>,
    state: PlayerState,
}

impl Player {
    pub(crate) fn new(
        radio: KaRadio,
        source_list: Vec<String>,
        sw_version: Option<String>,
    ) -> Self {
        Self {
            radio,
            source_list,
            sw_version,
            state: PlayerState::default(),
        }
    }

    /// Checks that the radio answers and reads its version and stations.
    pub(crate) async fn setup(radio: KaRadio) -> Result<Self, ConfigurationError> {
        radio
            .probe()
            .await
            .map_err(|err| ConfigurationError::new(radio.url(), err))?;
        let mut player = Self::new(radio, Vec::new(), None);
        player.update_info().await?;
        Ok(player)
    }

    /// Reads version and station list again.
    pub(crate) async fn update_info(&mut self) -> Result<(), ConfigurationError> {
        let version = self
            .radio
            .version()
            .await
            .map_err(|err| ConfigurationError::new(self.radio.url(), err))?;
        self.source_list = self.radio.source_list().await;
        info!(
            url = self.radio.url(),
            %version,
            sources = self.source_list.len(),
            "radio configured"
        );
        self.sw_version = Some(version);
        Ok(())
    }

    pub(crate) fn radio(&self) -> &KaRadio {
        &self.radio
    }

    pub(crate) fn source_list(&self) -> &[String] {
        &self.source_list
    }

    pub(crate) fn sw_version(&self) -> Option<&str> {
        self.sw_version.as_deref()
    }

    pub(crate) fn state(&self) -> &PlayerState {
        &self.state
    }

    pub(crate) async fn refresh(&mut self) -> &PlayerState {
        match self.radio.info().await {
            Ok(Some(info)) => {
                self.apply_info(&info);
                self.state.available = true;
            }
            Ok(None) => self.state.available = false,
            Err(err) => {
                warn!(url = self.radio.url(), %err, "ignoring unreadable radio state");
                self.state.available = false;
            }
        }
        &self.state
    }

    fn apply_info(&mut self, info: &Info) {
        debug!(?info, "radio state");
        if let Some(volume) = info.volume() {
            self.state.volume_level = Some(f64::from(volume) / 255.0);
        }
        if let Some(title) = info.title() {
            self.state.media_title = Some(title.to_owned());
        }
        if let Some(playing) = info.is_playing() {
            self.state.playback = Some(if playing {
                Playback::Playing
            } else {
                Playback::Paused
            });
        }
        if let Some(source) = info.station().and_then(|num| self.source_list.get(num)) {
            self.state.source = Some(source.clone());
        }
    }

    fn station_id(&self, source: &str) -> Option<u32> {
        let index = self.source_list.iter().position(|name| name == source)?;
        u32::try_from(index).ok()
    }

    /// Sends `command` and updates the state without waiting for the next poll.
    pub(crate) async fn apply_command(
        &mut self,
        command: PlayerCommand,
    ) -> Result<(), PlayerError> {
        match command {
            PlayerCommand::Play => {
                let current = self
                    .state
                    .source
                    .as_deref()
                    .and_then(|source| self.station_id(source));
                match current {
                    Some(station_id) => self.radio.play(station_id).await,
                    None => self.radio.start().await,
                }
                self.state.playback = Some(Playback::Playing);
            }
            PlayerCommand::Start => {
                self.radio.start().await;
                self.state.playback = Some(Playback::Playing);
            }
            PlayerCommand::Stop => {
                self.radio.stop().await;
                self.state.playback = Some(Playback::Paused);
            }
            PlayerCommand::SelectSource(source) => {
                let station_id = self
                    .station_id(&source)
                    .ok_or_else(|| PlayerError::UnknownSource(source.clone()))?;
                self.radio.play(station_id).await;
                self.state.source = Some(source);
                self.state.playback = Some(Playback::Playing);
            }
            PlayerCommand::SetVolume(level) => {
                self.radio.set_volume(level).await;
                self.state.volume_level = Some(radio::clamp_level(level));
            }
        }
        Ok(())
    }
}
