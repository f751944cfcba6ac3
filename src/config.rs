use std::{
    fs, io,
    path::{Path, PathBuf},
};

use color_eyre::{eyre::WrapErr, Result};
use serde::{Deserialize, Serialize};

use crate::{player::Player, radio::KaRadio};

/// What `setup` learned about the radio, reused without probing it again.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub(crate) struct Config {
    pub(crate) url: String,
    #[serde(default)]
    pub(crate) source_list: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) sw_version: Option<String>,
}

impl Config {
    pub(crate) fn default_path() -> Option<PathBuf> {
        Some(dirs::config_dir()?.join("karadio").join("config.json"))
    }

    /// `Ok(None)` if nothing was set up yet.
    pub(crate) fn load(path: &Path) -> Result<Option<Self>> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err).wrap_err_with(|| format!("reading {}", path.display()))
            }
        };
        serde_json::from_str(&text)
            .map(Some)
            .wrap_err_with(|| format!("parsing {}", path.display()))
    }

    pub(crate) fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).wrap_err_with(|| format!("creating {}", dir.display()))?;
        }
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text).wrap_err_with(|| format!("writing {}", path.display()))
    }

    pub(crate) fn from_player(player: &Player) -> Self {
        Self {
            url: player.radio().url().to_owned(),
            source_list: player.source_list().to_vec(),
            sw_version: player.sw_version().map(str::to_owned),
        }
    }

    pub(crate) fn into_player(self) -> Player {
        Player::new(KaRadio::new(&self.url), self.source_list, self.sw_version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = Config {
            url: "http://radio.local".into(),
            source_list: vec!["Jazz".into(), "News".into()],
            sw_version: Some("2.3".into()),
        };

        config.save(&path).unwrap();
        assert_eq!(Config::load(&path).unwrap(), Some(config));
    }

    #[test]
    fn missing_file_means_not_configured() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(Config::load(&dir.path().join("config.json")).unwrap(), None);
    }

    #[test]
    fn optional_fields_default() {
        let config: Config = serde_json::from_str(r#"{"url": "http://radio.local"}"#).unwrap();
        assert!(config.source_list.is_empty());
        assert_eq!(config.sw_version, None);

        let player = config.into_player();
        assert_eq!(player.radio().url(), "http://radio.local");
        assert_eq!(player.sw_version(), None);
    }

    #[test]
    fn rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "url = radio").unwrap();
        assert!(Config::load(&path).is_err());
    }
}
