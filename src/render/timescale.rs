// src/render/timescale.rs

use std::collections::BTreeMap;
use std::rc::Rc;

use super::hooks::TimeScaleHook;
use crate::engine::time::seconds_to_pixels;
use crate::vdom::{VTree, VdomError, format_number, h, props};

/// Tick spacing for one zoom bracket. Steps are in milliseconds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScaleInfo {
    pub marker: u64,
    pub big_step: u64,
    pub small_step: u64,
    pub second_step: f64,
}

/// Brackets keyed by the largest samples-per-pixel they serve, ascending.
const TIME_INFO: [(usize, ScaleInfo); 7] = [
    (700, ScaleInfo { marker: 1000, big_step: 500, small_step: 100, second_step: 0.1 }),
    (1500, ScaleInfo { marker: 2000, big_step: 1000, small_step: 200, second_step: 0.2 }),
    (2500, ScaleInfo { marker: 2000, big_step: 1000, small_step: 500, second_step: 0.5 }),
    (5000, ScaleInfo { marker: 5000, big_step: 1000, small_step: 500, second_step: 0.5 }),
    (10000, ScaleInfo { marker: 10000, big_step: 5000, small_step: 1000, second_step: 1.0 }),
    (12000, ScaleInfo { marker: 15000, big_step: 5000, small_step: 1000, second_step: 1.0 }),
    (20000, ScaleInfo { marker: 30000, big_step: 10000, small_step: 5000, second_step: 5.0 }),
];

const SCALE_HEIGHT: usize = 30;

pub fn scale_info(samples_per_pixel: usize) -> ScaleInfo {
    TIME_INFO
        .iter()
        .find(|(max, _)| samples_per_pixel <= *max)
        .unwrap_or(&TIME_INFO[0])
        .1
}

/// `m:ss` for a marker position.
pub fn format_time(milliseconds: u64) -> String {
    let seconds = milliseconds as f64 / 1000.0;
    let s = seconds % 60.0;
    let m = (seconds - s) / 60.0;
    let pad = if s < 10.0 { "0" } else { "" };
    format!("{}:{pad}{}", format_number(m), format_number(s))
}

pub struct TimeScale {
    pub duration: f64,
    pub offset: f64,
    pub samples_per_pixel: usize,
    pub sample_rate: u32,
    pub margin_left: f64,
    pub time_color: String,
}

impl TimeScale {
    /// Marker labels and the tick table for the visible range.
    pub fn ticks(&self) -> (Vec<(i64, String)>, BTreeMap<i64, usize>) {
        let width_x = seconds_to_pixels(self.duration, self.samples_per_pixel, self.sample_rate);
        let pix_per_sec = self.sample_rate as f64 / self.samples_per_pixel as f64;
        let pix_offset = seconds_to_pixels(self.offset, self.samples_per_pixel, self.sample_rate);
        let info = scale_info(self.samples_per_pixel);
        let step_px = pix_per_sec * info.second_step;
        let step_ms = (1000.0 * info.second_step).round() as u64;
        let end = width_x + pix_offset;

        let mut markers = Vec::new();
        let mut ticks = BTreeMap::new();
        let mut counter = 0u64;
        let mut i = 0.0;

        while i < end && step_px > 0.0 {
            let pix_index = i.floor();
            let pix = (pix_index - pix_offset) as i64;

            if pix_index >= pix_offset {
                if counter % info.marker == 0 {
                    markers.push((pix, format_time(counter)));
                    ticks.insert(pix, 10);
                } else if counter % info.big_step == 0 {
                    ticks.insert(pix, 5);
                } else if counter % info.small_step == 0 {
                    ticks.insert(pix, 2);
                }
            }

            counter += step_ms;
            i += step_px;
        }
        (markers, ticks)
    }

    pub fn render(&self) -> Result<VTree, VdomError> {
        let width_x = seconds_to_pixels(self.duration, self.samples_per_pixel, self.sample_rate);
        let (markers, ticks) = self.ticks();

        let mut children = Vec::with_capacity(markers.len() + 1);
        for (pix, label) in markers {
            children.push(h(
                "div.time",
                props().attr("style", format!("position: absolute; left: {pix}px;")),
                label,
            )?);
        }

        let hook = TimeScaleHook {
            ticks,
            offset: self.offset,
            samples_per_pixel: self.samples_per_pixel,
            duration: self.duration,
            color: self.time_color.clone(),
        };
        children.push(h(
            "canvas",
            props()
                .attr("width", width_x)
                .attr("height", SCALE_HEIGHT)
                .attr("style", "position: absolute; left: 0; right: 0; top: 0; bottom: 0;")
                .hook("hook", Rc::new(hook)),
            (),
        )?);

        h(
            "div.playlist-time-scale",
            props().attr(
                "style",
                format!("position: relative; left: 0; right: 0; margin-left: {}px;", format_number(self.margin_left)),
            ),
            children,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn brackets_pick_the_first_large_enough() {
        assert_eq!(scale_info(512).marker, 1000);
        assert_eq!(scale_info(4096).marker, 5000);
        assert_eq!(scale_info(10000).marker, 10000);
        // past the largest bracket falls back to the finest one
        assert_eq!(scale_info(50000).marker, 1000);
    }

    #[test]
    fn marker_text() {
        assert_eq!(format_time(0), "0:00");
        assert_eq!(format_time(5000), "0:05");
        assert_eq!(format_time(75000), "1:15");
    }

    #[test]
    fn ticks_for_ten_seconds() {
        // 10 px per second, half-second steps
        let scale = TimeScale {
            duration: 10.0,
            offset: 0.0,
            samples_per_pixel: 4410,
            sample_rate: 44100,
            margin_left: 0.0,
            time_color: "grey".into(),
        };
        let (markers, ticks) = scale.ticks();
        assert_eq!(markers.first(), Some(&(0, "0:00".to_string())));
        assert_eq!(markers.get(1), Some(&(50, "0:05".to_string())));
        assert_eq!(ticks.get(&10), Some(&5));
        assert_eq!(ticks.get(&5), Some(&2));
        assert_eq!(ticks.len(), 20);
    }

    #[test]
    fn offset_shifts_columns() {
        let scale = TimeScale {
            duration: 10.0,
            offset: 2.0,
            samples_per_pixel: 4410,
            sample_rate: 44100,
            margin_left: 150.0,
            time_color: "grey".into(),
        };
        let (_, ticks) = scale.ticks();
        assert_eq!(ticks.keys().next(), Some(&0));
        assert_eq!(ticks.get(&30), Some(&10));
        let tree = scale.render().unwrap();
        assert_eq!(tree.as_node().unwrap().tag_name, "DIV");
    }
}
