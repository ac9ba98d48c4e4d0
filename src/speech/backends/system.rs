//! System speech handle built on the `tts` crate
//!
//! The `tts` crate gives one interface to the platform synthesizers:
//! - Speech Dispatcher on Linux
//! - AVFoundation on macOS/iOS
//! - WinRT / SAPI on Windows
//!
//! It has no pause primitive and no word boundary callbacks, so the native
//! engine on top of it estimates word boundaries and pauses by stopping
//! the handle.

use super::native::{DriverEvent, DriverEventKind, DriverFeatures, SpeechDriver, VoiceToken};
use crate::{Result, SpeechError};
use log::{debug, warn};
use std::sync::mpsc::{self, Receiver, Sender};
use tts::{Features, Gender as TtsGender, Tts as TtsCrate, UtteranceId};

/// Token id used when the platform cannot enumerate voices
const DEFAULT_TOKEN: &str = "default";

#[derive(Debug, Clone, Copy)]
enum Callback {
    Begin,
    End,
}

/// Native handle backed by the `tts` crate
pub struct SystemDriver {
    tts: TtsCrate,
    features: Features,
    /// Utterance callbacks forwarded from the platform's thread
    callbacks: Receiver<(UtteranceId, Callback)>,
    /// Utterance ids we handed out, with their stream numbers
    utterances: Vec<(UtteranceId, u64)>,
    next_stream: u64,
    /// Token chosen through `set_voice_token`, for platforms that
    /// cannot report the current voice
    selected: Option<String>,
    /// Set between `speak` and end/stop, for platforms without `is_speaking`
    in_flight: bool,
}

impl SystemDriver {
    /// Open the platform synthesizer
    pub fn new() -> Result<Self> {
        debug!("Creating system speech handle");

        let tts = TtsCrate::default()
            .map_err(|e| SpeechError::Backend(format!("Failed to initialize TTS: {}", e)))?;
        let features = tts.supported_features();
        let (tx, rx) = mpsc::channel();

        if features.utterance_callbacks {
            Self::register_callbacks(&tts, tx);
        }

        debug!("System speech handle created");
        Ok(Self {
            tts,
            features,
            callbacks: rx,
            utterances: Vec::new(),
            next_stream: 0,
            selected: None,
            in_flight: false,
        })
    }

    fn register_callbacks(tts: &TtsCrate, tx: Sender<(UtteranceId, Callback)>) {
        let begin = tx.clone();
        let end = tx.clone();
        let stopped = tx;

        let results = [
            tts.on_utterance_begin(Some(Box::new(move |id: UtteranceId| {
                let _ = begin.send((id, Callback::Begin));
            }))),
            tts.on_utterance_end(Some(Box::new(move |id: UtteranceId| {
                let _ = end.send((id, Callback::End));
            }))),
            tts.on_utterance_stop(Some(Box::new(move |id: UtteranceId| {
                let _ = stopped.send((id, Callback::End));
            }))),
        ];
        for result in results {
            if let Err(e) = result {
                warn!("Failed to register utterance callback: {}", e);
            }
        }
    }

    /// Map [-1, 1] onto the platform range around its normal value
    fn scale(value: f64, min: f32, normal: f32, max: f32) -> f32 {
        let value = value as f32;
        if value < 0.0 {
            normal + value * (normal - min)
        } else {
            normal + value * (max - normal)
        }
    }

    fn default_token() -> VoiceToken {
        // LANG looks like en_US.UTF-8
        let locale = std::env::var("LANG")
            .ok()
            .and_then(|lang| lang.split('.').next().map(str::to_string))
            .filter(|tag| tag.len() >= 2 && tag != "C" && tag != "POSIX")
            .unwrap_or_else(|| "en-US".to_string());
        VoiceToken::new(DEFAULT_TOKEN)
            .with("Name", "Default")
            .with("Locale", &locale)
    }
}

impl SpeechDriver for SystemDriver {
    fn features(&self) -> DriverFeatures {
        DriverFeatures {
            pause: false,
            utterance_events: self.features.utterance_callbacks,
            word_boundaries: false,
            inline_pitch_markup: false,
        }
    }

    fn voice_tokens(&self) -> Result<Vec<VoiceToken>> {
        if !self.features.voice {
            return Ok(vec![Self::default_token()]);
        }

        let voices = self
            .tts
            .voices()
            .map_err(|e| SpeechError::Backend(format!("Failed to get voices: {}", e)))?;

        Ok(voices
            .iter()
            .map(|voice| {
                let gender = match voice.gender() {
                    Some(TtsGender::Male) => "Male",
                    Some(TtsGender::Female) => "Female",
                    None => "",
                };
                VoiceToken::new(&voice.id())
                    .with("Name", &voice.name())
                    .with("Gender", gender)
                    .with("Locale", &voice.language().to_string())
            })
            .collect())
    }

    fn current_voice_token(&self) -> Option<String> {
        if !self.features.voice {
            return Some(DEFAULT_TOKEN.to_string());
        }
        if self.features.get_voice {
            if let Ok(Some(voice)) = self.tts.voice() {
                return Some(voice.id());
            }
        }
        self.selected.clone().or_else(|| {
            self.tts
                .voices()
                .ok()
                .and_then(|voices| voices.first().map(|v| v.id()))
        })
    }

    fn set_voice_token(&mut self, id: &str) -> Result<()> {
        if !self.features.voice {
            return if id == DEFAULT_TOKEN {
                Ok(())
            } else {
                Err(SpeechError::Backend(format!("Unknown voice {}", id)))
            };
        }

        let voices = self
            .tts
            .voices()
            .map_err(|e| SpeechError::Backend(format!("Failed to get voices: {}", e)))?;
        let voice = voices
            .iter()
            .find(|v| v.id() == id)
            .ok_or_else(|| SpeechError::Backend(format!("Unknown voice {}", id)))?;

        debug!("Selecting voice: {:?}", voice);
        self.tts
            .set_voice(voice)
            .map_err(|e| SpeechError::Backend(format!("Failed to set voice: {}", e)))?;
        self.selected = Some(id.to_string());
        Ok(())
    }

    fn speak(&mut self, text: &str) -> Result<u64> {
        let utterance = self
            .tts
            .speak(text, false)
            .map_err(|e| SpeechError::Backend(format!("Speak failed: {}", e)))?;

        self.next_stream += 1;
        if let Some(id) = utterance {
            self.utterances.push((id, self.next_stream));
        }
        self.in_flight = true;
        Ok(self.next_stream)
    }

    fn purge(&mut self) -> Result<()> {
        self.in_flight = false;
        if !self.features.stop {
            warn!("Stop not supported on this platform");
            return Ok(());
        }
        self.tts
            .stop()
            .map_err(|e| SpeechError::Backend(format!("Cancel failed: {}", e)))?;
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        Err(SpeechError::Backend("Pause not supported".to_string()))
    }

    fn resume(&mut self) -> Result<()> {
        Err(SpeechError::Backend("Resume not supported".to_string()))
    }

    fn is_speaking(&self) -> bool {
        if self.features.is_speaking {
            self.tts.is_speaking().unwrap_or(false)
        } else {
            self.in_flight
        }
    }

    fn set_rate(&mut self, rate: f64) -> Result<()> {
        if !self.features.rate {
            warn!("Rate control not supported on this platform");
            return Ok(());
        }
        let value = Self::scale(
            rate,
            self.tts.min_rate(),
            self.tts.normal_rate(),
            self.tts.max_rate(),
        );
        self.tts
            .set_rate(value)
            .map_err(|e| SpeechError::Backend(format!("Failed to set rate: {}", e)))?;
        Ok(())
    }

    fn set_pitch(&mut self, pitch: f64) -> Result<()> {
        if !self.features.pitch {
            warn!("Pitch control not supported on this platform");
            return Ok(());
        }
        let value = Self::scale(
            pitch,
            self.tts.min_pitch(),
            self.tts.normal_pitch(),
            self.tts.max_pitch(),
        );
        self.tts
            .set_pitch(value)
            .map_err(|e| SpeechError::Backend(format!("Failed to set pitch: {}", e)))?;
        Ok(())
    }

    fn set_volume(&mut self, volume: f64) -> Result<()> {
        if !self.features.volume {
            warn!("Volume control not supported on this platform");
            return Ok(());
        }
        let min = self.tts.min_volume();
        let max = self.tts.max_volume();
        let value = min + volume as f32 * (max - min);
        self.tts
            .set_volume(value)
            .map_err(|e| SpeechError::Backend(format!("Failed to set volume: {}", e)))?;
        Ok(())
    }

    fn poll_event(&mut self) -> Option<DriverEvent> {
        while let Ok((id, callback)) = self.callbacks.try_recv() {
            let Some(index) = self.utterances.iter().position(|(known, _)| *known == id) else {
                continue;
            };
            let stream = self.utterances[index].1;
            let kind = match callback {
                Callback::Begin => DriverEventKind::StreamStart,
                Callback::End => {
                    self.utterances.remove(index);
                    if self.utterances.is_empty() {
                        self.in_flight = false;
                    }
                    DriverEventKind::StreamEnd
                }
            };
            return Some(DriverEvent { stream, kind });
        }
        None
    }
}

impl Drop for SystemDriver {
    fn drop(&mut self) {
        if self.features.utterance_callbacks {
            let _ = self.tts.on_utterance_begin(None);
            let _ = self.tts.on_utterance_end(None);
            let _ = self.tts.on_utterance_stop(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_around_normal() {
        assert_eq!(SystemDriver::scale(0.0, 0.1, 1.0, 10.0), 1.0);
        assert_eq!(SystemDriver::scale(1.0, 0.1, 1.0, 10.0), 10.0);
        assert_eq!(SystemDriver::scale(-1.0, 0.0, 1.0, 10.0), 0.0);
        assert_eq!(SystemDriver::scale(0.5, 0.0, 1.0, 3.0), 2.0);
    }

    #[test]
    fn test_default_token_has_locale() {
        let token = SystemDriver::default_token();
        assert_eq!(token.id, DEFAULT_TOKEN);
        assert!(token.attributes.contains_key("Locale"));
    }

    #[test]
    fn test_create_system_driver() {
        // May fail without a system synthesizer (CI, headless)
        match SystemDriver::new() {
            Ok(driver) => println!("✓ System speech handle created: {:?}", driver.features()),
            Err(e) => println!("⚠ System speech handle unavailable (may be expected): {}", e),
        }
    }
}
