//! HTTP client for the speaker-control REST service.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

use crate::dispatch::DeviceApi;

pub struct HttpDeviceApi {
    http: reqwest::Client,
    base_url: String,
}

impl HttpDeviceApi {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get(&self, path: &str) -> anyhow::Result<Value> {
        let response = self.http.get(self.url(path)).send().await?;
        Ok(response.error_for_status()?.json().await?)
    }

    async fn post(&self, path: &str) -> anyhow::Result<Value> {
        let response = self.http.post(self.url(path)).send().await?;
        Ok(response.error_for_status()?.json().await?)
    }

    async fn post_json(&self, path: &str, body: &Value) -> anyhow::Result<Value> {
        let response = self.http.post(self.url(path)).json(body).send().await?;
        Ok(response.error_for_status()?.json().await?)
    }

    async fn delete(&self, path: &str) -> anyhow::Result<Value> {
        let response = self.http.delete(self.url(path)).send().await?;
        Ok(response.error_for_status()?.json().await?)
    }
}

#[async_trait]
impl DeviceApi for HttpDeviceApi {
    async fn list_speakers(&self) -> anyhow::Result<Value> {
        self.get("/api/sonos/speakers").await
    }

    async fn rediscover_speakers(&self) -> anyhow::Result<Value> {
        self.post("/api/sonos/rediscover").await
    }

    async fn speaker_info(&self, speaker: &str) -> anyhow::Result<Value> {
        self.get(&format!("/api/sonos/speakers/{}", speaker)).await
    }

    async fn play_pause(&self, speaker: &str) -> anyhow::Result<Value> {
        self.post(&format!("/api/sonos/speakers/{}/playpause", speaker))
            .await
    }

    async fn next_track(&self, speaker: &str) -> anyhow::Result<Value> {
        self.post(&format!("/api/sonos/speakers/{}/next", speaker))
            .await
    }

    async fn previous_track(&self, speaker: &str) -> anyhow::Result<Value> {
        self.post(&format!("/api/sonos/speakers/{}/previous", speaker))
            .await
    }

    async fn current_track(&self, speaker: &str) -> anyhow::Result<Value> {
        self.get(&format!("/api/sonos/speakers/{}/track", speaker))
            .await
    }

    async fn get_volume(&self, speaker: &str) -> anyhow::Result<Value> {
        self.get(&format!("/api/sonos/speakers/{}/volume", speaker))
            .await
    }

    async fn set_volume(&self, speaker: &str, volume: u8) -> anyhow::Result<Value> {
        self.post(&format!("/api/sonos/speakers/{}/volume/{}", speaker, volume))
            .await
    }

    async fn toggle_mute(&self, speaker: &str) -> anyhow::Result<Value> {
        self.post(&format!("/api/sonos/speakers/{}/mute", speaker))
            .await
    }

    async fn get_groups(&self) -> anyhow::Result<Value> {
        self.get("/api/sonos/groups").await
    }

    async fn group_speakers(&self, speaker: &str, coordinator: &str) -> anyhow::Result<Value> {
        self.post(&format!(
            "/api/sonos/speakers/{}/group/{}",
            speaker, coordinator
        ))
        .await
    }

    async fn ungroup_speaker(&self, speaker: &str) -> anyhow::Result<Value> {
        self.post(&format!("/api/sonos/speakers/{}/ungroup", speaker))
            .await
    }

    async fn party_mode(&self, speaker: &str) -> anyhow::Result<Value> {
        self.post(&format!("/api/sonos/speakers/{}/party", speaker))
            .await
    }

    async fn ungroup_all(&self, speaker: &str) -> anyhow::Result<Value> {
        self.post(&format!("/api/sonos/speakers/{}/ungroup-all", speaker))
            .await
    }

    async fn set_group_volume(&self, speaker: &str, volume: u8) -> anyhow::Result<Value> {
        self.post(&format!(
            "/api/sonos/speakers/{}/group-volume/{}",
            speaker, volume
        ))
        .await
    }

    async fn set_shuffle(&self, speaker: &str, state: &str) -> anyhow::Result<Value> {
        self.post(&format!("/api/sonos/speakers/{}/shuffle/{}", speaker, state))
            .await
    }

    async fn set_repeat(&self, speaker: &str, mode: &str) -> anyhow::Result<Value> {
        self.post(&format!("/api/sonos/speakers/{}/repeat/{}", speaker, mode))
            .await
    }

    async fn set_sleep_timer(&self, speaker: &str, duration: &str) -> anyhow::Result<Value> {
        self.post(&format!("/api/sonos/speakers/{}/sleep/{}", speaker, duration))
            .await
    }

    async fn cancel_sleep_timer(&self, speaker: &str) -> anyhow::Result<Value> {
        self.delete(&format!("/api/sonos/speakers/{}/sleep", speaker))
            .await
    }

    async fn list_favorites(&self) -> anyhow::Result<Value> {
        self.get("/api/sonos/favorites").await
    }

    async fn play_favorite(&self, speaker: &str, favorite: &str) -> anyhow::Result<Value> {
        self.post(&format!(
            "/api/sonos/speakers/{}/play-favorite/{}",
            speaker, favorite
        ))
        .await
    }

    async fn list_playlists(&self) -> anyhow::Result<Value> {
        self.get("/api/sonos/playlists").await
    }

    async fn list_radio_stations(&self) -> anyhow::Result<Value> {
        self.get("/api/sonos/radio-stations").await
    }

    async fn play_radio(&self, speaker: &str, station: &str) -> anyhow::Result<Value> {
        self.post(&format!(
            "/api/sonos/speakers/{}/play-radio/{}",
            speaker, station
        ))
        .await
    }

    async fn get_queue(&self, speaker: &str) -> anyhow::Result<Value> {
        self.get(&format!("/api/sonos/speakers/{}/queue", speaker))
            .await
    }

    async fn clear_queue(&self, speaker: &str) -> anyhow::Result<Value> {
        self.delete(&format!("/api/sonos/speakers/{}/queue", speaker))
            .await
    }

    async fn play_from_queue(&self, speaker: &str, track_number: u32) -> anyhow::Result<Value> {
        self.post(&format!(
            "/api/sonos/speakers/{}/queue/play/{}",
            speaker, track_number
        ))
        .await
    }

    async fn add_favorite_to_queue(&self, speaker: &str, favorite: &str) -> anyhow::Result<Value> {
        self.post(&format!(
            "/api/sonos/speakers/{}/queue/add-favorite/{}",
            speaker, favorite
        ))
        .await
    }

    async fn add_playlist_to_queue(&self, speaker: &str, playlist: &str) -> anyhow::Result<Value> {
        self.post(&format!(
            "/api/sonos/speakers/{}/queue/add-playlist/{}",
            speaker, playlist
        ))
        .await
    }

    async fn list_macros(&self) -> anyhow::Result<Value> {
        self.get("/api/macro").await
    }

    async fn get_macro(&self, name: &str) -> anyhow::Result<Value> {
        self.get(&format!("/api/macro/{}", name)).await
    }

    async fn run_macro(&self, name: &str, arguments: Vec<String>) -> anyhow::Result<Value> {
        self.post_json(
            "/api/macro/execute",
            &json!({ "macroName": name, "arguments": arguments }),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_is_normalized() {
        let api = HttpDeviceApi::new("http://localhost:8000/").unwrap();
        assert_eq!(
            api.url("/api/sonos/speakers"),
            "http://localhost:8000/api/sonos/speakers"
        );
    }
}
