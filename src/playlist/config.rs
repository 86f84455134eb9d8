// src/playlist/config.rs

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::effects::EqParams;
use crate::engine::{FadeShape, InteractionMode};
use crate::session::AeneasInput;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ControlWidgets {
    pub mute_or_solo: bool,
    pub volume: bool,
    pub stereo_pan: bool,
    pub collapse: bool,
    pub remove: bool,
}

impl Default for ControlWidgets {
    fn default() -> Self {
        Self { mute_or_solo: true, volume: true, stereo_pan: true, collapse: true, remove: true }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Controls {
    pub show: bool,
    pub width: f64,
    pub widgets: ControlWidgets,
}

impl Default for Controls {
    fn default() -> Self {
        Self { show: false, width: 150.0, widgets: ControlWidgets::default() }
    }
}

impl Controls {
    /// Horizontal space the controls take, zero when hidden.
    pub fn visible_width(&self) -> f64 {
        if self.show { self.width } else { 0.0 }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Colors {
    pub wave_outline_color: String,
    pub time_color: String,
    pub fade_color: String,
}

impl Default for Colors {
    fn default() -> Self {
        Self {
            wave_outline_color: "white".to_string(),
            time_color: "grey".to_string(),
            fade_color: "black".to_string(),
        }
    }
}

/// Whether the playhead is drawn as a line or as filled progress.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeekStyle {
    #[default]
    Line,
    Fill,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AnnotationConfig {
    pub annotations: Vec<AeneasInput>,
    pub editable: bool,
    pub link_endpoints: bool,
    pub is_continuous_play: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PlaylistConfig {
    pub samples_per_pixel: usize,
    pub mono: bool,
    pub fade_type: FadeShape,
    pub excl_solo: bool,
    pub timescale: bool,
    pub controls: Controls,
    pub colors: Colors,
    pub seek_style: SeekStyle,
    pub wave_height: f64,
    pub collapsed_wave_height: f64,
    pub bar_width: usize,
    pub bar_gap: usize,
    pub state: InteractionMode,
    pub zoom_levels: Vec<usize>,
    pub annotation_list: AnnotationConfig,
    pub is_automatic_scroll: bool,
    /// Overrides the audio context's rate when set.
    pub sample_rate: Option<u32>,
    /// Width of the view in pixels.
    pub container_width: f64,
    /// Master chain inserted after the master gain.
    pub effects: Vec<EqParams>,
}

impl Default for PlaylistConfig {
    fn default() -> Self {
        Self {
            samples_per_pixel: 4096,
            mono: true,
            fade_type: FadeShape::Logarithmic,
            excl_solo: false,
            timescale: false,
            controls: Controls::default(),
            colors: Colors::default(),
            seek_style: SeekStyle::Line,
            wave_height: 128.0,
            collapsed_wave_height: 30.0,
            bar_width: 1,
            bar_gap: 0,
            state: InteractionMode::Cursor,
            zoom_levels: vec![512, 1024, 2048, 4096],
            annotation_list: AnnotationConfig::default(),
            is_automatic_scroll: false,
            sample_rate: None,
            container_width: 1000.0,
            effects: Vec::new(),
        }
    }
}

impl PlaylistConfig {
    pub fn load_from_disk(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).with_context(|| format!("opening config {}", path.display()))?;
        let config = serde_json::from_reader(BufReader::new(file)).with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    pub fn zoom_index(&self) -> Option<usize> {
        self.zoom_levels.iter().position(|&z| z == self.samples_per_pixel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_nested_defaults() {
        let json = r##"{
            "samplesPerPixel": 1024,
            "controls": {"show": true, "widgets": {"volume": false}},
            "colors": {"waveOutlineColor": "#E0EFF1"},
            "seekStyle": "fill",
            "state": "select"
        }"##;
        let c: PlaylistConfig = serde_json::from_str(json).unwrap();
        assert_eq!(c.zoom_index(), Some(1));
        assert_eq!(c.controls.visible_width(), 150.0);
        assert!(!c.controls.widgets.volume && c.controls.widgets.remove);
        assert_eq!(c.colors.wave_outline_color, "#E0EFF1");
        assert_eq!(c.colors.time_color, "grey");
        assert_eq!(c.seek_style, SeekStyle::Fill);
        assert_eq!(c.state, InteractionMode::Select);
        assert_eq!(c.fade_type, FadeShape::Logarithmic);
        assert_eq!(c.wave_height, 128.0);
    }

    #[test]
    fn unknown_zoom_has_no_index() {
        let c = PlaylistConfig { samples_per_pixel: 3000, ..Default::default() };
        assert_eq!(c.zoom_index(), None);
        assert_eq!(Controls::default().visible_width(), 0.0);
    }
}
