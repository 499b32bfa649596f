//! Maps assistant function calls onto the speaker-control API.
//!
//! The assistant picks a function name and JSON arguments; the dispatcher
//! validates the arguments, invokes the corresponding API call, and returns
//! a JSON value suitable for a `function_call_output` item. Failures never
//! escape as errors: unknown names, missing arguments, and API faults all
//! come back as `{"error": ...}` objects so the assistant can recover in
//! conversation.

use async_trait::async_trait;
use serde_json::{json, Value};
use sndctl_voice_types::tools::Tool;
use std::sync::Arc;

/// The speaker-control surface, one method per remote operation.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeviceApi: Send + Sync {
    async fn list_speakers(&self) -> anyhow::Result<Value>;
    async fn rediscover_speakers(&self) -> anyhow::Result<Value>;
    async fn speaker_info(&self, speaker: &str) -> anyhow::Result<Value>;

    async fn play_pause(&self, speaker: &str) -> anyhow::Result<Value>;
    async fn next_track(&self, speaker: &str) -> anyhow::Result<Value>;
    async fn previous_track(&self, speaker: &str) -> anyhow::Result<Value>;
    async fn current_track(&self, speaker: &str) -> anyhow::Result<Value>;

    async fn get_volume(&self, speaker: &str) -> anyhow::Result<Value>;
    async fn set_volume(&self, speaker: &str, volume: u8) -> anyhow::Result<Value>;
    async fn toggle_mute(&self, speaker: &str) -> anyhow::Result<Value>;

    async fn get_groups(&self) -> anyhow::Result<Value>;
    async fn group_speakers(&self, speaker: &str, coordinator: &str) -> anyhow::Result<Value>;
    async fn ungroup_speaker(&self, speaker: &str) -> anyhow::Result<Value>;
    async fn party_mode(&self, speaker: &str) -> anyhow::Result<Value>;
    async fn ungroup_all(&self, speaker: &str) -> anyhow::Result<Value>;
    async fn set_group_volume(&self, speaker: &str, volume: u8) -> anyhow::Result<Value>;

    async fn set_shuffle(&self, speaker: &str, state: &str) -> anyhow::Result<Value>;
    async fn set_repeat(&self, speaker: &str, mode: &str) -> anyhow::Result<Value>;
    async fn set_sleep_timer(&self, speaker: &str, duration: &str) -> anyhow::Result<Value>;
    async fn cancel_sleep_timer(&self, speaker: &str) -> anyhow::Result<Value>;

    async fn list_favorites(&self) -> anyhow::Result<Value>;
    async fn play_favorite(&self, speaker: &str, favorite: &str) -> anyhow::Result<Value>;
    async fn list_playlists(&self) -> anyhow::Result<Value>;
    async fn list_radio_stations(&self) -> anyhow::Result<Value>;
    async fn play_radio(&self, speaker: &str, station: &str) -> anyhow::Result<Value>;

    async fn get_queue(&self, speaker: &str) -> anyhow::Result<Value>;
    async fn clear_queue(&self, speaker: &str) -> anyhow::Result<Value>;
    async fn play_from_queue(&self, speaker: &str, track_number: u32) -> anyhow::Result<Value>;
    async fn add_favorite_to_queue(&self, speaker: &str, favorite: &str) -> anyhow::Result<Value>;
    async fn add_playlist_to_queue(&self, speaker: &str, playlist: &str) -> anyhow::Result<Value>;

    async fn list_macros(&self) -> anyhow::Result<Value>;
    async fn get_macro(&self, name: &str) -> anyhow::Result<Value>;
    async fn run_macro(&self, name: &str, arguments: Vec<String>) -> anyhow::Result<Value>;
}

fn str_arg<'a>(args: &'a Value, key: &str) -> Result<&'a str, Value> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| json!({ "error": format!("missing argument: {}", key) }))
}

fn int_arg(args: &Value, key: &str) -> Result<u64, Value> {
    args.get(key)
        .and_then(Value::as_u64)
        .ok_or_else(|| json!({ "error": format!("missing argument: {}", key) }))
}

fn bool_arg(args: &Value, key: &str) -> Result<bool, Value> {
    args.get(key)
        .and_then(Value::as_bool)
        .ok_or_else(|| json!({ "error": format!("missing argument: {}", key) }))
}

pub struct FunctionDispatcher {
    api: Arc<dyn DeviceApi>,
}

impl FunctionDispatcher {
    pub fn new(api: Arc<dyn DeviceApi>) -> Self {
        Self { api }
    }

    /// Runs one function call. Always yields a JSON value to hand back to
    /// the assistant.
    pub async fn dispatch(&self, name: &str, arguments: &Value) -> Value {
        tracing::info!("calling function {} with {}", name, arguments);
        match self.call(name, arguments).await {
            Ok(result) => result,
            Err(response) => response,
        }
    }

    async fn call(&self, name: &str, args: &Value) -> Result<Value, Value> {
        let api = &self.api;
        let outcome = match name {
            "list_speakers" => api.list_speakers().await,
            "rediscover_speakers" => api.rediscover_speakers().await,
            "get_speaker_info" => api.speaker_info(str_arg(args, "speaker")?).await,

            "play_pause" => api.play_pause(str_arg(args, "speaker")?).await,
            "next_track" => api.next_track(str_arg(args, "speaker")?).await,
            "previous_track" => api.previous_track(str_arg(args, "speaker")?).await,
            "get_current_track" => api.current_track(str_arg(args, "speaker")?).await,

            "get_volume" => api.get_volume(str_arg(args, "speaker")?).await,
            "set_volume" => {
                let volume = int_arg(args, "volume")?.min(100) as u8;
                api.set_volume(str_arg(args, "speaker")?, volume).await
            }
            "toggle_mute" => api.toggle_mute(str_arg(args, "speaker")?).await,

            "get_groups" => api.get_groups().await,
            "group_speakers" => {
                api.group_speakers(str_arg(args, "speaker")?, str_arg(args, "coordinator")?)
                    .await
            }
            "ungroup_speaker" => api.ungroup_speaker(str_arg(args, "speaker")?).await,
            "party_mode" => api.party_mode(str_arg(args, "speaker")?).await,
            "ungroup_all" => api.ungroup_all(str_arg(args, "speaker")?).await,
            "set_group_volume" => {
                let volume = int_arg(args, "volume")?.min(100) as u8;
                api.set_group_volume(str_arg(args, "speaker")?, volume).await
            }

            "set_shuffle" => {
                let state = if bool_arg(args, "enabled")? { "on" } else { "off" };
                api.set_shuffle(str_arg(args, "speaker")?, state).await
            }
            "set_repeat" => {
                api.set_repeat(str_arg(args, "speaker")?, str_arg(args, "mode")?)
                    .await
            }
            "set_sleep_timer" => {
                let speaker = str_arg(args, "speaker")?;
                let minutes = int_arg(args, "minutes")?;
                if minutes == 0 {
                    api.cancel_sleep_timer(speaker).await
                } else {
                    api.set_sleep_timer(speaker, &format!("{}m", minutes)).await
                }
            }

            "list_favorites" => api.list_favorites().await,
            "play_favorite" => {
                api.play_favorite(str_arg(args, "speaker")?, str_arg(args, "favorite_name")?)
                    .await
            }
            "list_playlists" => api.list_playlists().await,
            "list_radio_stations" => api.list_radio_stations().await,
            "play_radio" => {
                api.play_radio(str_arg(args, "speaker")?, str_arg(args, "station_name")?)
                    .await
            }

            "get_queue" => api.get_queue(str_arg(args, "speaker")?).await,
            "clear_queue" => api.clear_queue(str_arg(args, "speaker")?).await,
            "play_from_queue" => {
                let track = int_arg(args, "track_number")? as u32;
                api.play_from_queue(str_arg(args, "speaker")?, track).await
            }
            "add_favorite_to_queue" => {
                api.add_favorite_to_queue(str_arg(args, "speaker")?, str_arg(args, "favorite_name")?)
                    .await
            }
            "add_playlist_to_queue" => {
                api.add_playlist_to_queue(str_arg(args, "speaker")?, str_arg(args, "playlist_name")?)
                    .await
            }

            "list_macros" => api.list_macros().await,
            "get_macro" => api.get_macro(str_arg(args, "name")?).await,
            "run_macro" => {
                let macro_args = args
                    .get("arguments")
                    .and_then(Value::as_array)
                    .map(|a| {
                        a.iter()
                            .filter_map(Value::as_str)
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default();
                api.run_macro(str_arg(args, "name")?, macro_args).await
            }

            other => {
                tracing::warn!("unknown function requested: {}", other);
                return Err(json!({ "error": format!("Unknown function: {}", other) }));
            }
        };

        outcome.map_err(|e| {
            tracing::error!("function {} failed: {:#}", name, e);
            json!({ "error": e.to_string() })
        })
    }
}

fn no_args() -> Value {
    json!({ "type": "object", "properties": {}, "required": [] })
}

fn speaker_only() -> Value {
    json!({
        "type": "object",
        "properties": {
            "speaker": { "type": "string", "description": "Name of the speaker" }
        },
        "required": ["speaker"]
    })
}

fn speaker_and(key: &str, schema: Value) -> Value {
    let mut properties = serde_json::Map::new();
    properties.insert(
        "speaker".to_string(),
        json!({ "type": "string", "description": "Name of the speaker" }),
    );
    properties.insert(key.to_string(), schema);
    json!({
        "type": "object",
        "properties": properties,
        "required": ["speaker", key]
    })
}

/// Declarations for every dispatchable function, in the shape the assistant
/// service expects inside `session.update`.
pub fn tool_declarations() -> Vec<Tool> {
    let volume = || json!({ "type": "integer", "minimum": 0, "maximum": 100 });
    vec![
        Tool::function("list_speakers", "List all discovered speakers", no_args()),
        Tool::function(
            "rediscover_speakers",
            "Trigger a fresh discovery of speakers on the network",
            no_args(),
        ),
        Tool::function(
            "get_speaker_info",
            "Get detailed information about a speaker including volume, playback state, and current track",
            speaker_only(),
        ),
        Tool::function("play_pause", "Toggle play/pause on a speaker", speaker_only()),
        Tool::function("next_track", "Skip to the next track", speaker_only()),
        Tool::function("previous_track", "Go back to the previous track", speaker_only()),
        Tool::function(
            "get_current_track",
            "Get information about the currently playing track",
            speaker_only(),
        ),
        Tool::function("get_volume", "Get the current volume (0-100)", speaker_only()),
        Tool::function(
            "set_volume",
            "Set the volume of a speaker (0-100)",
            speaker_and("volume", volume()),
        ),
        Tool::function("toggle_mute", "Toggle mute on a speaker", speaker_only()),
        Tool::function("get_groups", "Get all current speaker groups", no_args()),
        Tool::function(
            "group_speakers",
            "Group a speaker with another speaker acting as coordinator",
            speaker_and("coordinator", json!({ "type": "string" })),
        ),
        Tool::function(
            "ungroup_speaker",
            "Remove a speaker from its current group",
            speaker_only(),
        ),
        Tool::function(
            "party_mode",
            "Group all speakers together with the given speaker as coordinator",
            speaker_only(),
        ),
        Tool::function(
            "ungroup_all",
            "Ungroup all speakers so each plays independently",
            speaker_only(),
        ),
        Tool::function(
            "set_group_volume",
            "Set the volume for all speakers in a group",
            speaker_and("volume", volume()),
        ),
        Tool::function(
            "set_shuffle",
            "Enable or disable shuffle mode",
            speaker_and("enabled", json!({ "type": "boolean" })),
        ),
        Tool::function(
            "set_repeat",
            "Set the repeat mode",
            speaker_and("mode", json!({ "type": "string", "enum": ["off", "one", "all"] })),
        ),
        Tool::function(
            "set_sleep_timer",
            "Stop playback after a number of minutes, 0 cancels the timer",
            speaker_and("minutes", json!({ "type": "integer", "minimum": 0 })),
        ),
        Tool::function("list_favorites", "Get all favorites", no_args()),
        Tool::function(
            "play_favorite",
            "Play a favorite by name",
            speaker_and("favorite_name", json!({ "type": "string" })),
        ),
        Tool::function("list_playlists", "Get all playlists", no_args()),
        Tool::function("list_radio_stations", "Get favorite radio stations", no_args()),
        Tool::function(
            "play_radio",
            "Play a radio station by name",
            speaker_and("station_name", json!({ "type": "string" })),
        ),
        Tool::function("get_queue", "Get the current playback queue", speaker_only()),
        Tool::function("clear_queue", "Clear all tracks from the queue", speaker_only()),
        Tool::function(
            "play_from_queue",
            "Play a specific track from the queue by its 1-based position",
            speaker_and("track_number", json!({ "type": "integer", "minimum": 1 })),
        ),
        Tool::function(
            "add_favorite_to_queue",
            "Add a favorite to the end of the queue",
            speaker_and("favorite_name", json!({ "type": "string" })),
        ),
        Tool::function(
            "add_playlist_to_queue",
            "Add a playlist to the end of the queue",
            speaker_and("playlist_name", json!({ "type": "string" })),
        ),
        Tool::function("list_macros", "Get all available macros", no_args()),
        Tool::function(
            "get_macro",
            "Get a macro's definition and parameters",
            json!({
                "type": "object",
                "properties": { "name": { "type": "string" } },
                "required": ["name"]
            }),
        ),
        Tool::function(
            "run_macro",
            "Execute a macro, a predefined sequence of speaker commands",
            json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string" },
                    "arguments": { "type": "array", "items": { "type": "string" } }
                },
                "required": ["name"]
            }),
        ),
    ]
}
