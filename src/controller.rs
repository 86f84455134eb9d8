// src/controller.rs

use std::cell::RefCell;
use std::fmt::Write as FmtWrite;
use std::io::{Write, stdout};
use std::rc::Rc;

use crossterm::event::{KeyCode, KeyModifiers};
use crossterm::{
    cursor::MoveTo,
    execute,
    terminal::{BeginSynchronizedUpdate, Clear, ClearType, EndSynchronizedUpdate},
};

use crate::engine::time::seconds_to_pixels;
use crate::playlist::{Playlist, PlaylistEvent, RenderOutput, RenderType};
use crate::render::terminal::{draw_playhead, render_ascii};
use crate::session::write_wav_file;

const GRID_WIDTH: usize = 100;
const GRID_HEIGHT: usize = 16;

/// Drives a [`Playlist`] from the keyboard and paints it to the terminal.
pub struct PlaylistController {
    playlist: Playlist,
    export_path: String,

    // last frame, for the dirty check
    cached_time_ms: u64,
    cached_spp: usize,
    cached_status: String,
    force_redraw: bool,

    // rendered wav waiting to be written
    rendered: Rc<RefCell<Option<Vec<u8>>>>,
    // last notification worth showing
    message: Rc<RefCell<String>>,

    ascii_grid: Vec<String>,
    draw_buffer: String,
}

impl PlaylistController {
    pub fn new(mut playlist: Playlist, export_path: impl Into<String>) -> Self {
        let rendered = Rc::new(RefCell::new(None));
        let message = Rc::new(RefCell::new(String::new()));

        let rendered_sink = Rc::clone(&rendered);
        let message_sink = Rc::clone(&message);
        playlist.subscribe(move |event| match event {
            PlaylistEvent::AudioRenderingFinished(RenderOutput::Wav(bytes)) => {
                *rendered_sink.borrow_mut() = Some(bytes.clone());
            }
            PlaylistEvent::AudioSourcesError(err) => *message_sink.borrow_mut() = format!("load error: {err}"),
            PlaylistEvent::Finished => *message_sink.borrow_mut() = "finished".to_string(),
            PlaylistEvent::AudioRenderingStarting => *message_sink.borrow_mut() = "rendering...".to_string(),
            _ => {}
        });

        Self {
            playlist,
            export_path: export_path.into(),
            cached_time_ms: u64::MAX,
            cached_spp: 0,
            cached_status: String::new(),
            force_redraw: true,
            rendered,
            message,
            ascii_grid: Vec::new(),
            draw_buffer: String::with_capacity(4096),
        }
    }

    pub fn playlist(&self) -> &Playlist {
        &self.playlist
    }

    pub fn run_tick(&mut self) -> Result<(), anyhow::Error> {
        self.playlist.tick()?;
        self.flush_export()?;
        if self.playlist.is_recording() {
            self.force_redraw = true;
        }

        let seconds = self.current_seconds();
        let time_ms = (seconds * 1000.0) as u64;
        let spp = self.playlist.samples_per_pixel();
        let status = self.status_line();

        if time_ms == self.cached_time_ms && spp == self.cached_spp && status == self.cached_status && !self.force_redraw {
            return Ok(());
        }

        if spp != self.cached_spp || self.force_redraw {
            self.update_ascii_grid();
        }
        self.cached_time_ms = time_ms;
        self.cached_spp = spp;
        self.cached_status = status;
        self.force_redraw = false;

        self.draw_buffer.clear();
        let _ = write!(self.draw_buffer, "{}", MoveTo(0, 0));

        let mut lines = self.ascii_grid.clone();
        let x = seconds_to_pixels(seconds, spp, self.playlist.sample_rate()) - self.playlist.scroll_left();
        if x >= 0.0 {
            draw_playhead(&mut lines, x as usize);
        }
        for line in &lines {
            let _ = write!(self.draw_buffer, "{line}\x1b[K\r\n");
        }

        let _ = write!(self.draw_buffer, "{}", MoveTo(0, GRID_HEIGHT as u16 + 1));
        let _ = write!(self.draw_buffer, "{}", Clear(ClearType::UntilNewLine));
        let format = self.playlist.duration_format();
        let _ = write!(
            self.draw_buffer,
            "{} / {} | {}",
            format.format(seconds),
            format.format(self.playlist.duration()),
            self.cached_status
        );

        let mut stdout = stdout();
        execute!(stdout, BeginSynchronizedUpdate)?;
        stdout.write_all(self.draw_buffer.as_bytes())?;
        execute!(stdout, EndSynchronizedUpdate)?;
        stdout.flush()?;

        Ok(())
    }

    fn current_seconds(&self) -> f64 {
        if self.playlist.is_playing() {
            self.playlist.playback_seconds()
        } else {
            self.playlist.paused_at().unwrap_or_else(|| self.playlist.cursor())
        }
    }

    fn status_line(&self) -> String {
        let mut status = format!("zoom {} spp", self.playlist.samples_per_pixel());
        if let Some(first) = self.playlist.tracks().first() {
            let id = first.id();
            if self.playlist.is_muted(id) {
                status.push_str(" | MUTE");
            }
            if self.playlist.is_soloed(id) {
                status.push_str(" | SOLO");
            }
        }
        if self.playlist.is_recording() {
            status.push_str(" | REC");
        }
        let message = self.message.borrow();
        if !message.is_empty() {
            let _ = write!(status, " | {message}");
        }
        status
    }

    fn update_ascii_grid(&mut self) {
        let offset = self.playlist.scroll_left().max(0.0) as usize;
        self.ascii_grid = match self.playlist.tracks().first() {
            Some(track) => render_ascii(track.peaks(), 0, offset, GRID_WIDTH, GRID_HEIGHT),
            None => vec![" ".repeat(GRID_WIDTH); GRID_HEIGHT],
        };
    }

    fn flush_export(&mut self) -> Result<(), anyhow::Error> {
        let Some(bytes) = self.rendered.borrow_mut().take() else {
            return Ok(());
        };
        write_wav_file(&self.export_path, &bytes)?;
        *self.message.borrow_mut() = format!("exported {}", self.export_path);
        Ok(())
    }

    fn send(&mut self, event: PlaylistEvent) {
        if let Err(e) = self.playlist.dispatch(event) {
            log::error!("{e}");
            *self.message.borrow_mut() = e.to_string();
        }
    }

    pub fn handle_key(&mut self, code: KeyCode, _mods: KeyModifiers) {
        match code {
            KeyCode::Char(' ') => {
                if self.playlist.is_playing() {
                    self.send(PlaylistEvent::Pause);
                } else {
                    self.send(PlaylistEvent::Play { start: None, end: None });
                }
            }
            KeyCode::Char('s') => self.send(PlaylistEvent::Stop),
            KeyCode::Char('r') => self.send(PlaylistEvent::Rewind),
            KeyCode::Char('f') => self.send(PlaylistEvent::FastForward),
            KeyCode::Char('+') | KeyCode::Char('=') => {
                self.send(PlaylistEvent::ZoomIn);
                self.force_redraw = true;
            }
            KeyCode::Char('-') => {
                self.send(PlaylistEvent::ZoomOut);
                self.force_redraw = true;
            }
            KeyCode::Char('m') => {
                if let Some(id) = self.playlist.tracks().first().map(|t| t.id()) {
                    self.send(PlaylistEvent::Mute(id));
                }
            }
            KeyCode::Char('o') => {
                if let Some(id) = self.playlist.tracks().first().map(|t| t.id()) {
                    self.send(PlaylistEvent::Solo(id));
                }
            }
            KeyCode::Char('e') => self.send(PlaylistEvent::StartAudioRendering(RenderType::Wav)),
            KeyCode::Char('c') => {
                if self.playlist.is_recording() {
                    self.send(PlaylistEvent::Stop);
                } else {
                    self.send(PlaylistEvent::Record);
                }
                self.force_redraw = true;
            }
            _ => {}
        }
    }

    pub fn should_quit(&self, code: KeyCode) -> bool {
        matches!(code, KeyCode::Char('q') | KeyCode::Esc)
    }
}
