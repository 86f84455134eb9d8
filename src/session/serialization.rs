// src/session/serialization.rs

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::effects::EqParams;
use crate::engine::{EnabledStates, FadeInfo, TrackDetails};
use crate::loader::AudioSource;

/// A `{start, end}` pair in playlist seconds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeSelection {
    pub start: f64,
    pub end: f64,
}

impl TimeSelection {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn is_segment(&self) -> bool {
        self.start != self.end
    }
}

/// How a track's waveform peaks are computed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeakMode {
    #[serde(rename = "type")]
    pub kind: String,
    pub mono: bool,
}

impl Default for PeakMode {
    fn default() -> Self {
        Self { kind: "WebAudio".to_string(), mono: true }
    }
}

/// One entry of a track list. Absent fields take the track defaults.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrackInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub src: Option<AudioSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cuein: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cueout: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gain: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stereo_pan: Option<f32>,
    pub muted: bool,
    pub soloed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fade_in: Option<FadeInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fade_out: Option<FadeInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected: Option<TimeSelection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peaks: Option<PeakMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wave_outline_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub states: Option<EnabledStates>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub effects: Vec<EqParams>,
}

impl TrackInfo {
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        Self { src: Some(AudioSource::Path(path.as_ref().to_path_buf())), ..Default::default() }
    }
}

impl From<TrackDetails> for TrackInfo {
    fn from(d: TrackDetails) -> Self {
        Self {
            src: d.src.map(|s| AudioSource::Path(s.into())),
            name: Some(d.name),
            start: Some(d.start),
            cuein: Some(d.cuein),
            cueout: Some(d.cueout),
            gain: Some(d.gain),
            stereo_pan: Some(d.stereo_pan),
            fade_in: d.fade_in,
            fade_out: d.fade_out,
            custom_class: d.custom_class,
            effects: d.effects,
            ..Default::default()
        }
    }
}

/// Reads a JSON array of track list entries. Relative paths resolve against
/// the list's own directory.
pub fn load_track_list(path: impl AsRef<Path>) -> Result<Vec<TrackInfo>> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("opening track list {}", path.display()))?;
    let mut tracks: Vec<TrackInfo> =
        serde_json::from_reader(BufReader::new(file)).with_context(|| format!("parsing {}", path.display()))?;

    if let Some(dir) = path.parent() {
        for info in &mut tracks {
            if let Some(AudioSource::Path(src)) = &mut info.src {
                if src.is_relative() {
                    *src = dir.join(&*src);
                }
            }
        }
    }
    Ok(tracks)
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectManifest {
    pub version: u32,
    pub master_gain: f32,
    pub sample_rate: u32,
    pub samples_per_pixel: usize,
    pub tracks: Vec<TrackInfo>,
}

impl ProjectManifest {
    pub const VERSION: u32 = 1;

    pub fn save_to_disk(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        log::info!("saved project with {} tracks to {}", self.tracks.len(), path.display());
        Ok(())
    }

    pub fn load_from_disk(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
        let reader = BufReader::new(file);
        let manifest: Self = serde_json::from_reader(reader).with_context(|| format!("parsing {}", path.display()))?;
        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::FadeShape;
    use std::path::PathBuf;

    #[test]
    fn track_list_entries_use_camel_case() {
        let json = r#"[{
            "src": "media/drums.wav",
            "name": "Drums",
            "start": 2.5,
            "stereoPan": -0.5,
            "fadeIn": {"shape": "sCurve", "duration": 1.0},
            "peaks": {"type": "WebAudio", "mono": false},
            "soloed": true
        }]"#;
        let list: Vec<TrackInfo> = serde_json::from_str(json).unwrap();
        let t = &list[0];
        assert_eq!(t.src, Some(AudioSource::Path(PathBuf::from("media/drums.wav"))));
        assert_eq!(t.stereo_pan, Some(-0.5));
        assert_eq!(t.fade_in, Some(FadeInfo { shape: FadeShape::SCurve, duration: 1.0 }));
        assert_eq!(t.peaks.as_ref().map(|p| p.mono), Some(false));
        assert!(t.soloed && !t.muted);
        assert_eq!(t.cueout, None);
    }

    #[test]
    fn relative_sources_resolve_next_to_the_list() {
        let dir = tempfile::tempdir().unwrap();
        let list = dir.path().join("tracks.json");
        std::fs::write(&list, r#"[{"src": "a.wav"}, {"src": "/abs/b.wav"}]"#).unwrap();
        let tracks = load_track_list(&list).unwrap();
        assert_eq!(tracks[0].src.as_ref().and_then(AudioSource::path), Some(&dir.path().join("a.wav")));
        assert_eq!(tracks[1].src.as_ref().and_then(AudioSource::path), Some(&PathBuf::from("/abs/b.wav")));
    }

    #[test]
    fn missing_files_carry_context() {
        let err = ProjectManifest::load_from_disk("/definitely/not/here.json").unwrap_err();
        assert!(err.to_string().contains("/definitely/not/here.json"));
    }
}
