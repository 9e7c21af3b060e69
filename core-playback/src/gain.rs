//! Per-track output level rule.
//!
//! Advertising spots are mastered hotter than music, so every track start
//! nudges the mixer by a fixed delta chosen from the track's display name.

use bridge_traits::playback::Track;
use core_runtime::config::MixerSettings;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GainRule {
    spot_marker: String,
    spot_delta_db: i32,
    normal_delta_db: i32,
}

impl GainRule {
    pub fn new(spot_marker: impl Into<String>, spot_delta_db: i32, normal_delta_db: i32) -> Self {
        Self {
            spot_marker: spot_marker.into(),
            spot_delta_db,
            normal_delta_db,
        }
    }

    pub fn from_settings(settings: &MixerSettings) -> Self {
        Self::new(
            settings.spot_marker.clone(),
            settings.spot_delta_db,
            settings.normal_delta_db,
        )
    }

    /// Case-sensitive substring match on the display name.
    pub fn is_spot(&self, track: &Track) -> bool {
        track.display_name().contains(&self.spot_marker)
    }

    /// Gain change in dB to apply when `track` starts.
    pub fn delta_for(&self, track: &Track) -> i32 {
        if self.is_spot(track) {
            self.spot_delta_db
        } else {
            self.normal_delta_db
        }
    }
}

impl Default for GainRule {
    fn default() -> Self {
        Self::new("Spot", -1, -3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spot_tracks_get_smaller_cut() {
        let rule = GainRule::default();
        assert_eq!(rule.delta_for(&Track::remote("http://h/m/42/Spot_Farmacia.mp3")), -1);
        assert_eq!(rule.delta_for(&Track::remote("http://h/m/42/song.mp3")), -3);
    }

    #[test]
    fn test_marker_is_case_sensitive() {
        let rule = GainRule::default();
        assert_eq!(rule.delta_for(&Track::local("/cache/42/spot.mp3")), -3);
    }

    #[test]
    fn test_rule_from_settings() {
        let settings = MixerSettings {
            spot_marker: "AD_".into(),
            spot_delta_db: 0,
            normal_delta_db: -6,
            ..MixerSettings::default()
        };
        let rule = GainRule::from_settings(&settings);
        assert_eq!(rule.delta_for(&Track::local("/x/AD_one.mp3")), 0);
        assert_eq!(rule.delta_for(&Track::local("/x/one.mp3")), -6);
    }
}
