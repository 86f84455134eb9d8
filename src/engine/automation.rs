// src/engine/automation.rs

//! Scheduled parameter changes evaluated against the audio clock.
//!
//! Mirrors the event model of an audio parameter: instantaneous sets,
//! linear and exponential ramps that end at a given time, and value
//! curves spread over an interval. Ramps start from the previous event,
//! or from the parameter's value at the moment the ramp was scheduled.

use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum AutomationError {
    #[error("automation event at {time}s falls inside a value curve")]
    CurveOverlap { time: f64 },
    #[error("value curve duration must be positive, got {0}")]
    NonPositiveDuration(f64),
}

#[derive(Clone, Debug)]
enum Event {
    Set { value: f32, time: f64 },
    Linear { value: f32, time: f64 },
    Exponential { value: f32, time: f64 },
    Curve { values: Arc<[f32]>, start: f64, duration: f64 },
}

impl Event {
    fn time(&self) -> f64 {
        match self {
            Event::Set { time, .. } | Event::Linear { time, .. } | Event::Exponential { time, .. } => *time,
            Event::Curve { start, .. } => *start,
        }
    }
}

#[derive(Clone, Debug)]
pub struct AudioParam {
    value: f32,
    events: Vec<Event>,
    /// Clock time of the first scheduled event, where a leading ramp begins.
    anchor: Option<f64>,
}

impl AudioParam {
    pub fn new(value: f32) -> Self {
        Self { value, events: Vec::new(), anchor: None }
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn set_value(&mut self, value: f32) {
        self.value = value;
    }

    pub fn has_events(&self) -> bool {
        !self.events.is_empty()
    }

    fn check_curves(&self, time: f64) -> Result<(), AutomationError> {
        for e in &self.events {
            if let Event::Curve { start, duration, .. } = e {
                if time >= *start && time < start + duration {
                    return Err(AutomationError::CurveOverlap { time });
                }
            }
        }
        Ok(())
    }

    fn insert(&mut self, event: Event, now: f64) {
        self.anchor.get_or_insert(now);
        let t = event.time();
        // Later events with equal time keep insertion order.
        let at = self.events.partition_point(|e| e.time() <= t);
        self.events.insert(at, event);
    }

    pub fn set_value_at_time(&mut self, value: f32, time: f64, now: f64) -> Result<(), AutomationError> {
        self.check_curves(time)?;
        self.insert(Event::Set { value, time }, now);
        Ok(())
    }

    pub fn linear_ramp_to_value_at_time(&mut self, value: f32, time: f64, now: f64) -> Result<(), AutomationError> {
        self.check_curves(time)?;
        self.insert(Event::Linear { value, time }, now);
        Ok(())
    }

    pub fn exponential_ramp_to_value_at_time(
        &mut self,
        value: f32,
        time: f64,
        now: f64,
    ) -> Result<(), AutomationError> {
        self.check_curves(time)?;
        self.insert(Event::Exponential { value, time }, now);
        Ok(())
    }

    pub fn set_value_curve_at_time(
        &mut self,
        values: Arc<[f32]>,
        start: f64,
        duration: f64,
        now: f64,
    ) -> Result<(), AutomationError> {
        if duration <= 0.0 {
            return Err(AutomationError::NonPositiveDuration(duration));
        }
        let end = start + duration;
        for e in &self.events {
            let clash = match e {
                Event::Curve { start: s, duration: d, .. } => start < s + d && *s < end,
                other => other.time() > start && other.time() < end,
            };
            if clash {
                return Err(AutomationError::CurveOverlap { time: e.time() });
            }
        }
        self.insert(Event::Curve { values, start, duration }, now);
        Ok(())
    }

    pub fn cancel_scheduled_values(&mut self) {
        self.events.clear();
        self.anchor = None;
    }

    /// Value of the parameter at clock time `t`.
    pub fn value_at(&self, t: f64) -> f32 {
        let Some(anchor) = self.anchor else {
            return self.value;
        };
        let mut prev_time = anchor;
        let mut prev_value = self.value;

        for event in &self.events {
            match event {
                Event::Set { value, time } => {
                    if t < *time {
                        return prev_value;
                    }
                    prev_time = *time;
                    prev_value = *value;
                }
                Event::Linear { value, time } => {
                    if t < *time {
                        if t <= prev_time || *time <= prev_time {
                            return prev_value;
                        }
                        let k = ((t - prev_time) / (time - prev_time)) as f32;
                        return prev_value + (value - prev_value) * k;
                    }
                    prev_time = *time;
                    prev_value = *value;
                }
                Event::Exponential { value, time } => {
                    if t < *time {
                        if t <= prev_time || *time <= prev_time {
                            return prev_value;
                        }
                        // Undefined across zero or a sign change; the value holds.
                        if prev_value == 0.0 || prev_value.signum() != value.signum() {
                            return prev_value;
                        }
                        let k = (t - prev_time) / (time - prev_time);
                        return (prev_value as f64 * ((*value / prev_value) as f64).powf(k)) as f32;
                    }
                    prev_time = *time;
                    prev_value = *value;
                }
                Event::Curve { values, start, duration } => {
                    if t < *start {
                        return prev_value;
                    }
                    let last = values.last().copied().unwrap_or(prev_value);
                    if t < start + duration {
                        return curve_value(values, (t - start) / duration).unwrap_or(last);
                    }
                    prev_time = start + duration;
                    prev_value = last;
                }
            }
        }

        prev_value
    }
}

fn curve_value(values: &[f32], progress: f64) -> Option<f32> {
    let n = values.len();
    if n == 0 {
        return None;
    }
    if n == 1 {
        return Some(values[0]);
    }
    let k = progress.clamp(0.0, 1.0) * (n - 1) as f64;
    let i = k.floor() as usize;
    let frac = (k - i as f64) as f32;
    let a = values[i];
    let b = values[(i + 1).min(n - 1)];
    Some(a + (b - a) * frac)
}
