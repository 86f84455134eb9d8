// src/engine/mixer.rs

/// Interleaved block mixer shared by every voice of a graph.
pub struct Mixer {
    channels: usize,
    mix_buffer: Vec<f32>,
    scratch_buffer: Vec<f32>,
}

impl Mixer {
    pub fn new(channels: usize) -> Self {
        let initial_capacity = 2048 * channels;
        Self {
            channels,
            mix_buffer: Vec::with_capacity(initial_capacity),
            scratch_buffer: Vec::with_capacity(initial_capacity),
        }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn begin_block(&mut self, frames: usize) {
        let needed = frames * self.channels;
        if self.mix_buffer.len() != needed {
            self.mix_buffer.resize(needed, 0.0);
        }
        if self.scratch_buffer.len() != needed {
            self.scratch_buffer.resize(needed, 0.0);
        }
        self.mix_buffer.fill(0.0);
    }

    /// Cleared scratch space for one voice's contribution to the block.
    pub fn scratch(&mut self) -> &mut [f32] {
        self.scratch_buffer.fill(0.0);
        &mut self.scratch_buffer
    }

    /// Sums the scratch buffer into the mix.
    pub fn accumulate(&mut self) {
        for (m, s) in self.mix_buffer.iter_mut().zip(&self.scratch_buffer) {
            *m += *s;
        }
    }

    /// The summed block, for master processing before it leaves the graph.
    pub fn mix_mut(&mut self) -> &mut [f32] {
        &mut self.mix_buffer
    }

    pub fn mix_into(&self, out: &mut [f32]) {
        let len = out.len().min(self.mix_buffer.len());
        for (o, &sample) in out[..len].iter_mut().zip(&self.mix_buffer[..len]) {
            // denormals
            *o = if sample.abs() < 1e-10 { 0.0 } else { sample };
        }
        out[len..].fill(0.0);
    }
}
