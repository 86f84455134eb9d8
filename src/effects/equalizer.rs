// src/effects/equalizer.rs

use biquad::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EqFilterType {
    LowPass,
    HighPass,
    BandPass,
    Notch,
    Peaking,
    LowShelf,
    HighShelf,
}

/// One band as it appears in a track list's `effects` array.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EqParams {
    #[serde(rename = "type")]
    pub filter_type: EqFilterType,
    pub freq: f32, // Hz
    pub q: f32,
    pub gain: f32, // dB
    pub active: bool,
}

impl Default for EqParams {
    fn default() -> Self {
        Self {
            filter_type: EqFilterType::Peaking,
            freq: 1000.0,
            q: 0.707,
            gain: 0.0,
            active: true,
        }
    }
}

const PASSTHROUGH: Coefficients<f32> = Coefficients { a1: 0.0, a2: 0.0, b0: 1.0, b1: 0.0, b2: 0.0 };

fn coefficients(params: &EqParams, sr: u32) -> Option<Coefficients<f32>> {
    // Freq must stay below Nyquist, Q above zero.
    let safe_freq = params.freq.clamp(20.0, (sr as f32 / 2.0) - 1.0);
    let safe_q = params.q.max(0.1);

    let biquad_type = match params.filter_type {
        EqFilterType::LowPass => Type::LowPass,
        EqFilterType::HighPass => Type::HighPass,
        EqFilterType::BandPass => Type::BandPass,
        EqFilterType::Notch => Type::Notch,
        EqFilterType::Peaking => Type::PeakingEQ(params.gain),
        EqFilterType::LowShelf => Type::LowShelf(params.gain),
        EqFilterType::HighShelf => Type::HighShelf(params.gain),
    };

    Coefficients::<f32>::from_params(biquad_type, sr.hz(), safe_freq.hz(), safe_q).ok()
}

/// A stereo biquad band.
pub struct EqBand {
    filters: [DirectForm2Transposed<f32>; 2],
    pub params: EqParams,
    sr: u32,
}

impl EqBand {
    pub fn new(sr: u32, params: EqParams) -> Self {
        let coeffs = coefficients(&params, sr).unwrap_or_else(|| {
            log::warn!("eq band at {} Hz has no valid coefficients, bypassing", params.freq);
            PASSTHROUGH
        });
        Self {
            filters: [DirectForm2Transposed::<f32>::new(coeffs), DirectForm2Transposed::<f32>::new(coeffs)],
            params,
            sr,
        }
    }

    pub fn update(&mut self, new_params: EqParams) {
        let type_changed = self.params.filter_type != new_params.filter_type;
        self.params = new_params;
        match coefficients(&self.params, self.sr) {
            Some(coeffs) => {
                for filter in &mut self.filters {
                    if type_changed {
                        filter.reset_state();
                    }
                    filter.update_coefficients(coeffs);
                }
            }
            None => log::warn!("failed to calculate coefficients for freq {}", self.params.freq),
        }
    }

    #[inline]
    pub fn process(&mut self, sample: f32, channel_idx: usize) -> f32 {
        if !self.params.active {
            return sample;
        }
        match self.filters.get_mut(channel_idx) {
            Some(filter) => {
                let out = filter.run(sample);
                // denormals
                if out.abs() < 1e-20 { 0.0 } else { out }
            }
            None => sample,
        }
    }
}

/// Bands applied in series to a stereo signal.
pub struct EqChain {
    bands: Vec<EqBand>,
}

impl EqChain {
    pub fn new(sr: u32, params: &[EqParams]) -> Self {
        Self { bands: params.iter().map(|p| EqBand::new(sr, *p)).collect() }
    }

    /// `None` for an empty list, so the voice skips the stage.
    pub fn from_spec(sr: u32, params: &[EqParams]) -> Option<Self> {
        (!params.is_empty()).then(|| Self::new(sr, params))
    }

    pub fn update_band(&mut self, index: usize, params: EqParams) {
        if let Some(band) = self.bands.get_mut(index) {
            band.update(params);
        }
    }

    #[inline]
    pub fn process_frame(&mut self, left: f32, right: f32) -> (f32, f32) {
        let (mut l, mut r) = (left, right);
        for band in &mut self.bands {
            l = band.process(l, 0);
            r = band.process(r, 1);
        }
        (l, r)
    }

    pub fn get_state(&self) -> Vec<EqParams> {
        self.bands.iter().map(|b| b.params).collect()
    }
}
