//! Sample types and audio buffer definitions

/// Type alias for audio samples (single precision, as delivered by hosts)
pub type Sample = f32;

/// Audio buffer trait for generic buffer operations
pub trait AudioBuffer {
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    fn clear(&mut self);
}

/// Planar multichannel audio buffer (one `Vec` per channel)
#[derive(Debug, Clone)]
pub struct MultiChannelBuffer {
    channels: Vec<Vec<Sample>>,
    len: usize,
}

impl MultiChannelBuffer {
    pub fn new(num_channels: usize, len: usize) -> Self {
        Self {
            channels: vec![vec![0.0; len]; num_channels],
            len,
        }
    }

    #[inline]
    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    #[inline]
    pub fn channel(&self, index: usize) -> &[Sample] {
        &self.channels[index]
    }

    #[inline]
    pub fn channel_mut(&mut self, index: usize) -> &mut [Sample] {
        &mut self.channels[index]
    }

    /// Mutable views of every channel, in the shape block processors expect
    pub fn channels_mut(&mut self) -> Vec<&mut [Sample]> {
        self.channels.iter_mut().map(|ch| ch.as_mut_slice()).collect()
    }

    /// Interleave into frames (`[ch0, ch1, ..., ch0, ch1, ...]`)
    pub fn interleaved(&self) -> Vec<Sample> {
        let mut out = Vec::with_capacity(self.len * self.channels.len());
        for n in 0..self.len {
            for ch in &self.channels {
                out.push(ch[n]);
            }
        }
        out
    }
}

impl AudioBuffer for MultiChannelBuffer {
    fn len(&self) -> usize {
        self.len
    }

    fn clear(&mut self) {
        for ch in &mut self.channels {
            ch.fill(0.0);
        }
    }
}
