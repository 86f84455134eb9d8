// src/main.rs

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use anyhow::{Context, bail};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    terminal::{disable_raw_mode, enable_raw_mode},
};

use dawsome::audio_runtime::AudioRuntime;
use dawsome::controller::PlaylistController;
use dawsome::engine::AudioContext;
use dawsome::playlist::{Playlist, PlaylistConfig, PlaylistEvent, RenderOutput, RenderType};
use dawsome::recorder::MicRecorder;
use dawsome::session::{load_track_list, write_wav_file};

const USAGE: &str = "usage: dawsome <tracks.json> [--config cfg.json] [--export out.wav]";
const EXPORT_TIMEOUT: Duration = Duration::from_secs(120);

struct Args {
    tracks: String,
    config: Option<String>,
    export: Option<String>,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut args = std::env::args().skip(1);
    let mut tracks = None;
    let mut config = None;
    let mut export = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => config = Some(args.next().context(USAGE)?),
            "--export" => export = Some(args.next().context(USAGE)?),
            "-h" | "--help" => bail!(USAGE),
            _ if tracks.is_none() => tracks = Some(arg),
            _ => bail!("unexpected argument {arg}\n{USAGE}"),
        }
    }

    Ok(Args { tracks: tracks.context(USAGE)?, config, export })
}

fn main() -> Result<(), anyhow::Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = parse_args()?;
    let config = match &args.config {
        Some(path) => PlaylistConfig::load_from_disk(path)?,
        None => PlaylistConfig::default(),
    };
    let tracks = load_track_list(&args.tracks)?;

    if let Some(out) = &args.export {
        return export(tracks, config, out);
    }

    let runtime = AudioRuntime::new()?;
    let mut playlist = Playlist::new(runtime.context().clone(), config)?;
    playlist.load(tracks)?;
    playlist.set_recorder(Box::new(MicRecorder::new()));

    let mut daw = PlaylistController::new(playlist, "export.wav");

    println!(
        "[SPACE] Play/Pause | [S] Stop | [R]/[F] Rewind/Forward | [+]/[-] Zoom | [M] Mute | [O] Solo | [C] Record | [E] Export | [Q] Quit"
    );

    enable_raw_mode()?;
    let result = run(&mut daw);
    disable_raw_mode()?;
    println!("\nExiting.");
    result
}

fn run(daw: &mut PlaylistController) -> Result<(), anyhow::Error> {
    // 20 fps
    let frame = Duration::from_millis(50);
    daw.run_tick()?;

    loop {
        if event::poll(frame)? {
            if let Event::Key(ev) = event::read()? {
                if ev.kind == KeyEventKind::Press {
                    if ev.code == KeyCode::Char('c') && ev.modifiers.contains(KeyModifiers::CONTROL) {
                        break;
                    }
                    if daw.should_quit(ev.code) {
                        break;
                    }
                    daw.handle_key(ev.code, ev.modifiers);
                }
            }
        }
        daw.run_tick()?;
    }
    Ok(())
}

/// Renders the mix to `out` without opening an audio device.
fn export(tracks: Vec<dawsome::session::TrackInfo>, config: PlaylistConfig, out: &str) -> anyhow::Result<()> {
    let ctx = AudioContext::new(config.sample_rate.unwrap_or(44_100));
    let mut playlist = Playlist::new(ctx, config)?;

    let rendered: Rc<RefCell<Option<Vec<u8>>>> = Rc::new(RefCell::new(None));
    let failed: Rc<RefCell<Option<String>>> = Rc::new(RefCell::new(None));
    {
        let rendered = Rc::clone(&rendered);
        let failed = Rc::clone(&failed);
        playlist.subscribe(move |event| match event {
            PlaylistEvent::AudioRenderingFinished(RenderOutput::Wav(bytes)) => {
                *rendered.borrow_mut() = Some(bytes.clone());
            }
            PlaylistEvent::AudioSourcesError(err) => *failed.borrow_mut() = Some(err.clone()),
            _ => {}
        });
    }

    playlist.load(tracks)?;
    if let Some(err) = failed.borrow_mut().take() {
        bail!("loading tracks failed: {err}");
    }

    playlist.dispatch(PlaylistEvent::StartAudioRendering(RenderType::Wav))?;
    let started = Instant::now();
    loop {
        playlist.tick()?;
        if let Some(bytes) = rendered.borrow_mut().take() {
            write_wav_file(out, &bytes)?;
            return Ok(());
        }
        if started.elapsed() > EXPORT_TIMEOUT {
            bail!("timed out waiting for the wav encoder");
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}
