// src/buffer.rs

/// Decoded audio held as planar f32 channels.
///
/// Every channel has the same length. Tracks share buffers through `Arc`
/// so a playout never copies sample data.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioBuffer {
    sample_rate: u32,
    channels: Vec<Vec<f32>>,
}

impl AudioBuffer {
    pub fn new(sample_rate: u32, mut channels: Vec<Vec<f32>>) -> Self {
        if channels.is_empty() {
            channels.push(Vec::new());
        }
        // Ragged input is cut to the shortest channel.
        let len = channels.iter().map(|c| c.len()).min().unwrap_or(0);
        for c in &mut channels {
            c.truncate(len);
        }
        Self { sample_rate, channels }
    }

    pub fn silent(number_of_channels: usize, length: usize, sample_rate: u32) -> Self {
        Self::new(sample_rate, vec![vec![0.0; length]; number_of_channels.max(1)])
    }

    pub fn from_interleaved(samples: &[f32], number_of_channels: usize, sample_rate: u32) -> Self {
        let ch = number_of_channels.max(1);
        let frames = samples.len() / ch;
        let mut planar = vec![Vec::with_capacity(frames); ch];
        for frame in samples.chunks_exact(ch) {
            for (c, &s) in frame.iter().enumerate() {
                planar[c].push(s);
            }
        }
        Self::new(sample_rate, planar)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn number_of_channels(&self) -> usize {
        self.channels.len()
    }

    /// Frames per channel.
    pub fn length(&self) -> usize {
        self.channels[0].len()
    }

    pub fn duration(&self) -> f64 {
        self.length() as f64 / self.sample_rate as f64
    }

    pub fn channel(&self, index: usize) -> &[f32] {
        self.channels.get(index).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn channel_mut(&mut self, index: usize) -> Option<&mut [f32]> {
        self.channels.get_mut(index).map(Vec::as_mut_slice)
    }

    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }

    pub fn into_channels(self) -> Vec<Vec<f32>> {
        self.channels
    }

    pub fn to_interleaved(&self) -> Vec<f32> {
        let ch = self.number_of_channels();
        let frames = self.length();
        let mut out = vec![0.0f32; frames * ch];
        for f in 0..frames {
            for c in 0..ch {
                out[f * ch + c] = self.channels[c][f];
            }
        }
        out
    }

    /// Appends the frames of `other`, mapping channels by index.
    /// Missing channels in `other` are padded with silence.
    pub fn append(&mut self, other: &AudioBuffer) {
        let frames = other.length();
        for (c, dst) in self.channels.iter_mut().enumerate() {
            match other.channels.get(c) {
                Some(src) => dst.extend_from_slice(src),
                None => dst.extend(std::iter::repeat_n(0.0, frames)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interleaved_input_is_split_per_channel() {
        let buf = AudioBuffer::from_interleaved(&[0.1, -0.1, 0.2, -0.2, 0.3, -0.3], 2, 8000);
        assert_eq!(buf.number_of_channels(), 2);
        assert_eq!(buf.length(), 3);
        assert_eq!(buf.channel(1), &[-0.1, -0.2, -0.3]);
        assert_eq!(buf.to_interleaved(), vec![0.1, -0.1, 0.2, -0.2, 0.3, -0.3]);
    }

    #[test]
    fn ragged_channels_are_truncated() {
        let buf = AudioBuffer::new(100, vec![vec![0.0; 10], vec![0.0; 7]]);
        assert_eq!(buf.length(), 7);
        assert!((buf.duration() - 0.07).abs() < 1e-12);
    }

    #[test]
    fn append_pads_missing_channels() {
        let mut a = AudioBuffer::silent(2, 2, 100);
        let b = AudioBuffer::new(100, vec![vec![1.0, 1.0, 1.0]]);
        a.append(&b);
        assert_eq!(a.length(), 5);
        assert_eq!(a.channel(0)[4], 1.0);
        assert_eq!(a.channel(1)[4], 0.0);
    }
}
