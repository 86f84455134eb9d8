// src/render/track.rs

use std::rc::Rc;

use super::hooks::{CanvasHook, FadeCanvasHook, StereoPanSliderHook, VolumeSliderHook};
use crate::engine::time::seconds_to_pixels;
use crate::engine::{Fade, Intent, Track, TrackId};
use crate::playlist::config::{Colors, Controls};
use crate::playlist::events::{EventQueue, PlaylistEvent};
use crate::session::TimeSelection;
use crate::vdom::{DomEvent, VTree, VdomError, format_number, h, props};

/// Widest single canvas a channel is drawn on; longer channels are tiled.
pub const MAX_CANVAS_WIDTH: usize = 1000;

/// Playlist state a track needs to draw itself.
#[derive(Clone, Debug)]
pub struct TrackRenderData<'a> {
    pub height: f64,
    pub samples_per_pixel: usize,
    pub sample_rate: u32,
    pub controls: Controls,
    pub is_active: bool,
    pub time_selection: TimeSelection,
    pub playlist_length: f64,
    pub playback_seconds: f64,
    pub colors: &'a Colors,
    pub bar_width: usize,
    pub bar_gap: usize,
    pub should_play: bool,
    pub soloed: bool,
    pub muted: bool,
    pub collapsed: bool,
}

impl TrackRenderData<'_> {
    fn px(&self, seconds: f64) -> f64 {
        seconds_to_pixels(seconds, self.samples_per_pixel, self.sample_rate)
    }
}

fn intent_event(intent: Intent, track: TrackId) -> PlaylistEvent {
    match intent {
        Intent::Select { start, end } => PlaylistEvent::Select { start, end, track: Some(track) },
        Intent::Shift { delta } => PlaylistEvent::Shift { delta, track },
        Intent::FadeIn { duration } => PlaylistEvent::FadeIn { duration, track },
        Intent::FadeOut { duration } => PlaylistEvent::FadeOut { duration, track },
    }
}

fn render_overlay(track: &Track, data: &TrackRenderData, queue: &EventQueue) -> Result<VTree, VdomError> {
    let channel_pixels = data.px(data.playlist_length);
    let mut p = props().attr(
        "style",
        format!(
            "position: absolute; top: 0; right: 0; bottom: 0; left: 0; width: {}px; z-index: 9;",
            format_number(channel_pixels)
        ),
    );
    let mut selector = "div.playlist-overlay".to_string();

    if let Some(interaction) = track.interaction() {
        let mode = {
            let mut i = interaction.borrow_mut();
            i.setup(data.samples_per_pixel, data.sample_rate);
            i.mode()
        };
        let span = (track.start_time(), track.end_time());
        for &kind in mode.events() {
            let (interaction, queue, id) = (interaction.clone(), queue.clone(), track.id());
            p = p.on(kind.event_name(), move |e: &DomEvent| {
                let handled = interaction.borrow_mut().handle(kind, e.offset_x, span);
                if handled.prevent_default {
                    e.prevent_default();
                }
                if let Some(intent) = handled.intent {
                    queue.push(intent_event(intent, id));
                }
            });
        }
        selector.push('.');
        selector.push_str(&mode.class_name());
    }
    h(&selector, p, ())
}

fn render_controls(track: &Track, data: &TrackRenderData, queue: &EventQueue) -> Result<VTree, VdomError> {
    let id = track.id();
    let widgets = data.controls.widgets;
    let num_chan = track.peaks().channels() as f64;

    let mut header = Vec::new();
    if widgets.remove {
        let q = queue.clone();
        header.push(h(
            "button.btn.btn-danger.btn-xs.track-remove",
            props()
                .attr("type", "button")
                .attr("title", "Remove track")
                .on("click", move |_| q.push(PlaylistEvent::RemoveTrack(id))),
            h("i.fas.fa-times", props(), ())?,
        )?);
    }
    header.push(h("span", props(), track.name.as_str())?);
    if widgets.collapse {
        let q = queue.clone();
        let collapsed = data.collapsed;
        let (title, caret) =
            if collapsed { ("Expand track", "i.fas.fa-caret-down") } else { ("Collapse track", "i.fas.fa-caret-up") };
        header.push(h(
            "button.btn.btn-info.btn-xs.track-collapse",
            props()
                .attr("type", "button")
                .attr("title", title)
                .on("click", move |_| q.push(PlaylistEvent::ChangeTrackView { track: id, collapsed: !collapsed })),
            h(caret, props(), ())?,
        )?);
    }

    let mut controls = vec![h("div.track-header", props(), header)?];

    if !data.collapsed {
        if widgets.mute_or_solo {
            let (qm, qs) = (queue.clone(), queue.clone());
            let mute = if data.muted { "button.btn.btn-outline-dark.btn-xs.btn-mute.active" } else { "button.btn.btn-outline-dark.btn-xs.btn-mute" };
            let solo = if data.soloed { "button.btn.btn-outline-dark.btn-xs.btn-solo.active" } else { "button.btn.btn-outline-dark.btn-xs.btn-solo" };
            controls.push(h(
                "div.btn-group",
                props(),
                vec![
                    h(mute, props().attr("type", "button").on("click", move |_| qm.push(PlaylistEvent::Mute(id))), "Mute")?,
                    h(solo, props().on("click", move |_| qs.push(PlaylistEvent::Solo(id))), "Solo")?,
                ],
            )?);
        }

        if widgets.volume {
            let q = queue.clone();
            let slider = h(
                "input.volume-slider",
                props()
                    .attr("aria-label", "Track volume control")
                    .attr("type", "range")
                    .attr("min", 0i64)
                    .attr("max", 100i64)
                    .attr("value", 100i64)
                    .hook("hook", Rc::new(VolumeSliderHook { gain: track.gain() }))
                    .on("input", move |e: &DomEvent| {
                        if let Some(volume) = e.value.as_deref().and_then(|v| v.parse::<f32>().ok()) {
                            q.push(PlaylistEvent::VolumeChange { volume, track: id });
                        }
                    }),
                (),
            )?;
            controls.push(h("label.volume", props(), slider)?);
        }

        if widgets.stereo_pan {
            let q = queue.clone();
            let slider = h(
                "input.stereopan-slider",
                props()
                    .attr("aria-label", "Track stereo pan control")
                    .attr("type", "range")
                    .attr("min", -100i64)
                    .attr("max", 100i64)
                    .attr("value", 100i64)
                    .hook("hook", Rc::new(StereoPanSliderHook { stereo_pan: track.stereo_pan() }))
                    .on("input", move |e: &DomEvent| {
                        if let Some(v) = e.value.as_deref().and_then(|v| v.parse::<f32>().ok()) {
                            q.push(PlaylistEvent::StereoPan { pan: v / 100.0, track: id });
                        }
                    }),
                (),
            )?;
            controls.push(h("label.stereopan", props(), slider)?);
        }
    }

    h(
        "div.controls",
        props().attr(
            "style",
            format!(
                "height: {}px; width: {}px; position: absolute; left: 0; z-index: 10;",
                format_number(num_chan * data.height),
                format_number(data.controls.width)
            ),
        ),
        controls,
    )
}

fn render_fade(fade: &Fade, side: &str, data: &TrackRenderData) -> Result<VTree, VdomError> {
    let width = data.px(fade.duration());
    let (selector, anchor) = match side {
        "in" => ("div.wp-fade.wp-fadein", "left"),
        _ => ("div.wp-fade.wp-fadeout", "right"),
    };
    let canvas = h(
        "canvas",
        props()
            .attr("width", width)
            .attr("height", data.height)
            .hook(
                "hook",
                Rc::new(FadeCanvasHook {
                    fade_type: fade.fade_type,
                    shape: fade.shape,
                    duration: fade.duration(),
                    samples_per_pixel: data.samples_per_pixel,
                    color: data.colors.fade_color.clone(),
                }),
            ),
        (),
    )?;
    h(
        selector,
        props().attr(
            "style",
            format!(
                "position: absolute; height: {}px; width: {}px; top: 0; {anchor}: 0; z-index: 4;",
                format_number(data.height),
                format_number(width)
            ),
        ),
        canvas,
    )
}

/// The full tree for one track: optional controls beside its waveform.
pub fn render_track(track: &Track, data: &TrackRenderData, queue: &EventQueue) -> Result<VTree, VdomError> {
    let peaks = track.peaks();
    let width = peaks.length;
    let playback_x = data.px(data.playback_seconds);
    let start_x = data.px(track.start_time());
    let end_x = data.px(track.end_time());
    let num_chan = peaks.channels();

    let mut progress_width = 0.0;
    if playback_x > 0.0 && playback_x > start_x {
        progress_width = if playback_x < end_x { playback_x - start_x } else { width as f64 };
    }

    let mut waveform_children = vec![h(
        "div.cursor",
        props().attr(
            "style",
            format!(
                "position: absolute; width: 1px; margin: 0; padding: 0; top: 0; left: {}px; bottom: 0; z-index: 5;",
                format_number(playback_x)
            ),
        ),
        (),
    )?];

    let color = track.wave_outline_color.clone().unwrap_or_else(|| data.colors.wave_outline_color.clone());

    for channel in 0..num_chan {
        let mut channel_children = vec![h(
            "div.channel-progress",
            props().attr(
                "style",
                format!(
                    "position: absolute; width: {}px; height: {}px; z-index: 2;",
                    format_number(progress_width),
                    format_number(data.height)
                ),
            ),
            (),
        )?];

        let mut offset = 0;
        let mut remaining = width;
        while remaining > 0 {
            let current = remaining.min(MAX_CANVAS_WIDTH);
            channel_children.push(h(
                "canvas",
                props()
                    .attr("width", current)
                    .attr("height", data.height)
                    .attr(
                        "style",
                        format!(
                            "float: left; position: relative; margin: 0; padding: 0; z-index: 3; width: {current}px; height: {}px;",
                            format_number(data.height)
                        ),
                    )
                    .hook(
                        "hook",
                        Rc::new(CanvasHook {
                            peaks: peaks.clone(),
                            channel,
                            offset,
                            color: color.clone(),
                            height: data.height as usize,
                            bar_width: data.bar_width,
                            bar_gap: data.bar_gap,
                        }),
                    ),
                (),
            )?);
            remaining -= current;
            offset += MAX_CANVAS_WIDTH;
        }

        if let Some(fade) = track.fade_in() {
            channel_children.push(render_fade(fade, "in", data)?);
        }
        if let Some(fade) = track.fade_out() {
            channel_children.push(render_fade(fade, "out", data)?);
        }

        waveform_children.push(h(
            &format!("div.channel.channel-{channel}"),
            props().attr(
                "style",
                format!(
                    "height: {h}px; width: {width}px; top: {}px; left: {}px; position: absolute; margin: 0; padding: 0; z-index: 1;",
                    format_number(channel as f64 * data.height),
                    format_number(start_x),
                    h = format_number(data.height),
                ),
            ),
            channel_children,
        )?);
    }

    waveform_children.push(render_overlay(track, data, queue)?);

    if data.is_active {
        let c_start_x = data.px(data.time_selection.start);
        let c_end_x = data.px(data.time_selection.end);
        let c_width = c_end_x - c_start_x + 1.0;
        let selector = if c_width > 1.0 { "div.selection.segment" } else { "div.selection.point" };
        waveform_children.push(h(
            selector,
            props().attr(
                "style",
                format!(
                    "position: absolute; width: {}px; bottom: 0; top: 0; left: {}px; z-index: 4;",
                    format_number(c_width),
                    format_number(c_start_x)
                ),
            ),
            (),
        )?);
    }

    let total_height = format_number(num_chan as f64 * data.height);
    let waveform = h(
        "div.waveform",
        props().attr("style", format!("height: {total_height}px; position: relative;")),
        waveform_children,
    )?;

    let mut children = Vec::with_capacity(2);
    let mut margin = 0.0;
    if data.controls.show {
        children.push(render_controls(track, data, queue)?);
        margin = data.controls.width;
    }
    children.push(waveform);

    let mut selector = "div.channel-wrapper".to_string();
    if !data.should_play {
        selector.push_str(".silent");
    }
    if let Some(class) = &track.custom_class {
        selector.push('.');
        selector.push_str(class);
    }

    h(
        &selector,
        props()
            .key(format!("track-{}", track.id().0))
            .attr("style", format!("margin-left: {}px; height: {total_height}px;", format_number(margin))),
        children,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::AudioBuffer;
    use crate::engine::{FadeShape, InteractionMode};
    use crate::vdom::{Document, create_element};
    use std::sync::Arc;

    fn track() -> Track {
        // 3 s at 1000 Hz, 100 samples per pixel: 30 px
        let mut t = Track::new(TrackId(7));
        t.name = "Vox".into();
        t.set_buffer(Arc::new(AudioBuffer::new(1000, vec![vec![0.5; 3000]])));
        t.set_cues(0.0, 3.0).unwrap();
        t.set_start_time(1.0);
        t.calculate_peaks(100, 1000).unwrap();
        t.set_state(Some(InteractionMode::Cursor));
        t
    }

    fn data(colors: &Colors) -> TrackRenderData<'_> {
        TrackRenderData {
            height: 50.0,
            samples_per_pixel: 100,
            sample_rate: 1000,
            controls: Controls { show: true, ..Default::default() },
            is_active: true,
            time_selection: TimeSelection::new(1.5, 2.5),
            playlist_length: 4.0,
            playback_seconds: 2.0,
            colors,
            bar_width: 1,
            bar_gap: 0,
            should_play: false,
            soloed: true,
            muted: false,
            collapsed: false,
        }
    }

    #[test]
    fn structure_follows_track_state() {
        let mut t = track();
        t.set_fade_in(1.0, FadeShape::Linear).unwrap();
        t.custom_class = Some("lead".into());
        let colors = Colors::default();
        let queue = EventQueue::new();
        let tree = render_track(&t, &data(&colors), &queue).unwrap();

        let mut doc = Document::new();
        let root = create_element(&mut doc, &tree).unwrap();
        assert!(doc.has_class(root, "silent") && doc.has_class(root, "lead"));

        let progress = doc.find_by_class(root, "channel-progress")[0];
        assert!(doc.attribute(progress, "style").unwrap().contains("width: 10px"));
        assert_eq!(doc.find_by_class(root, "wp-fadein").len(), 1);
        assert_eq!(doc.find_by_class(root, "wp-fadeout").len(), 0);
        assert_eq!(doc.find_by_class(root, "segment").len(), 1);
        assert_eq!(doc.find_by_class(root, "btn-solo").iter().filter(|&&n| doc.has_class(n, "active")).count(), 1);
        assert_eq!(doc.find_by_class(root, "state-cursor").len(), 1);

        let slider = doc.find_by_class(root, "volume-slider")[0];
        assert_eq!(doc.property(slider, "title").and_then(|v| v.as_str()), Some("100% volume"));
    }

    #[test]
    fn long_channels_are_tiled() {
        let mut t = Track::new(TrackId(1));
        t.set_buffer(Arc::new(AudioBuffer::new(1000, vec![vec![0.1; 2500], vec![0.1; 2500]])));
        t.set_cues(0.0, 2.5).unwrap();
        t.calculate_peaks(1, 1000).unwrap();
        let colors = Colors::default();
        let tree = render_track(&t, &data(&colors), &EventQueue::new()).unwrap();

        let mut doc = Document::new();
        let root = create_element(&mut doc, &tree).unwrap();
        let channel = doc.find_by_class(root, "channel-1")[0];
        let widths: Vec<_> = doc
            .children(channel)
            .iter()
            .filter(|&&n| doc.tag_name(n) == Some("CANVAS"))
            .map(|&n| doc.attribute(n, "width").unwrap_or_default().to_string())
            .collect();
        assert_eq!(widths, ["1000", "1000", "500"]);
    }

    #[test]
    fn overlay_and_controls_push_events() {
        let t = track();
        let colors = Colors::default();
        let queue = EventQueue::new();
        let tree = render_track(&t, &data(&colors), &queue).unwrap();
        let mut doc = Document::new();
        let root = create_element(&mut doc, &tree).unwrap();

        let overlay = doc.find_by_class(root, "playlist-overlay")[0];
        let click = DomEvent::new("click", overlay).at(25.0);
        doc.dispatch(&click);
        assert!(click.default_prevented());
        assert!(matches!(
            queue.pop(),
            Some(PlaylistEvent::Select { start, end, track: Some(TrackId(7)) }) if start == 2.5 && end == 2.5
        ));

        let pan = doc.find_by_class(root, "stereopan-slider")[0];
        doc.dispatch(&DomEvent::new("input", pan).with_value("-50"));
        assert!(matches!(queue.pop(), Some(PlaylistEvent::StereoPan { pan, .. }) if pan == -0.5));

        let collapse = doc.find_by_class(root, "track-collapse")[0];
        doc.dispatch(&DomEvent::new("click", collapse));
        assert!(matches!(queue.pop(), Some(PlaylistEvent::ChangeTrackView { collapsed: true, .. })));
    }
}
