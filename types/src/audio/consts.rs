use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::str::FromStr;

/// The voice the assistant answers with. Cannot be changed once the session
/// has produced audio at least once.
#[derive(Debug, Clone, PartialEq)]
pub enum Voice {
    Alloy,
    Ash,
    Ballad,
    Coral,
    Echo,
    Sage,
    Shimmer,
    Verse,
    Custom(String),
}

impl Voice {
    pub fn as_str(&self) -> &str {
        match self {
            Voice::Alloy => "alloy",
            Voice::Ash => "ash",
            Voice::Ballad => "ballad",
            Voice::Coral => "coral",
            Voice::Echo => "echo",
            Voice::Sage => "sage",
            Voice::Shimmer => "shimmer",
            Voice::Verse => "verse",
            Voice::Custom(s) => s.as_str(),
        }
    }
}

impl Serialize for Voice {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl FromStr for Voice {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "alloy" => Voice::Alloy,
            "ash" => Voice::Ash,
            "ballad" => Voice::Ballad,
            "coral" => Voice::Coral,
            "echo" => Voice::Echo,
            "sage" => Voice::Sage,
            "shimmer" => Voice::Shimmer,
            "verse" => Voice::Verse,
            _ => Voice::Custom(s.to_string()),
        })
    }
}

impl<'de> Deserialize<'de> for Voice {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Voice::from_str(&s).unwrap())
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub enum AudioFormat {
    #[serde(rename = "pcm16")]
    Pcm16,
    #[serde(rename = "g711_ulaw")]
    Mulaw,
    #[serde(rename = "g711_alaw")]
    Alaw,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TranscriptionModel {
    Whisper,
    Custom(String),
}

impl Serialize for TranscriptionModel {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            TranscriptionModel::Whisper => serializer.serialize_str("whisper-1"),
            TranscriptionModel::Custom(s) => serializer.serialize_str(s),
        }
    }
}

impl FromStr for TranscriptionModel {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "whisper-1" => TranscriptionModel::Whisper,
            _ => TranscriptionModel::Custom(s.to_string()),
        })
    }
}

impl<'de> Deserialize<'de> for TranscriptionModel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(TranscriptionModel::from_str(&s).unwrap())
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    #[derive(Debug, serde::Serialize, serde::Deserialize)]
    struct AudioConsts {
        #[serde(skip_serializing_if = "Option::is_none")]
        voice: Option<super::Voice>,
        #[serde(skip_serializing_if = "Option::is_none")]
        audio_format: Option<super::AudioFormat>,
    }

    #[test]
    fn serialize_known_and_custom_voice() {
        let consts = AudioConsts {
            voice: Some(super::Voice::Coral),
            audio_format: Some(super::AudioFormat::Pcm16),
        };
        let json = serde_json::to_string(&consts).unwrap();
        assert_eq!(json, r#"{"voice":"coral","audio_format":"pcm16"}"#);

        let consts = AudioConsts {
            voice: Some(super::Voice::Custom("marin".to_string())),
            audio_format: None,
        };
        let json = serde_json::to_string(&consts).unwrap();
        assert_eq!(json, r#"{"voice":"marin"}"#);
    }

    #[test]
    fn deserialize_voice() {
        let consts: AudioConsts = serde_json::from_str(r#"{"voice":"sage"}"#).unwrap();
        assert_eq!(consts.voice, Some(super::Voice::Sage));

        let consts: AudioConsts = serde_json::from_str(r#"{"voice":"marin"}"#).unwrap();
        assert_eq!(consts.voice, Some(super::Voice::Custom("marin".to_string())));
    }

    #[test]
    fn voice_from_str_round_trips() {
        let v = super::Voice::from_str("shimmer").unwrap();
        assert_eq!(v.as_str(), "shimmer");
    }
}
