// src/session/mod.rs

pub mod annotations;
pub mod export;
pub mod serialization;

pub use annotations::{AeneasInput, AeneasOutput, Annotation, AnnotationList, AnnotationView};
pub use export::{ExportWorker, buffer_to_wav, encode_wav, interleave, write_wav_file};
pub use serialization::{PeakMode, ProjectManifest, TimeSelection, TrackInfo, load_track_list};

use std::path::Path;

use anyhow::Result;

use crate::playlist::Playlist;

/// Writes the playlist's tracks and view settings as a project file.
pub fn save_project(playlist: &Playlist, path: impl AsRef<Path>) -> Result<()> {
    let manifest = ProjectManifest {
        version: ProjectManifest::VERSION,
        master_gain: playlist.master_gain(),
        sample_rate: playlist.sample_rate(),
        samples_per_pixel: playlist.samples_per_pixel(),
        tracks: playlist.get_info().into_iter().map(TrackInfo::from).collect(),
    };
    manifest.save_to_disk(path)
}

/// Replaces the playlist's contents with a saved project.
pub fn load_project(playlist: &mut Playlist, path: impl AsRef<Path>) -> Result<()> {
    let manifest = ProjectManifest::load_from_disk(path)?;
    if manifest.version > ProjectManifest::VERSION {
        log::warn!("project version {} is newer than {}", manifest.version, ProjectManifest::VERSION);
    }

    playlist.clear();
    if playlist.zoom_levels().contains(&manifest.samples_per_pixel) {
        playlist.set_zoom(manifest.samples_per_pixel)?;
    }
    playlist.set_master_gain(manifest.master_gain);
    playlist.load(manifest.tracks)?;
    Ok(())
}
