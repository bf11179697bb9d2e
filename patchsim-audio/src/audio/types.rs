//! Core audio data types
//!
//! Defines the four-channel float block passed between source, block
//! processor and sink.

/// Logical channels in every block: two independent stereo pairs
pub const LOGICAL_CHANNELS: usize = 4;

/// Physical channels written to the output device
pub const OUTPUT_CHANNELS: usize = 2;

/// Four parallel channels of `f32` samples, each of the same fixed length.
///
/// Channels 0/1 form the first stereo pair and channels 2/3 the second.
/// The sink mixes 0+1 into the left output and 2+3 into the right output.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBlock {
    channels: [Vec<f32>; LOGICAL_CHANNELS],
}

impl SampleBlock {
    /// Create a silent block holding `block_size` samples per channel
    pub fn new(block_size: usize) -> Self {
        Self {
            channels: std::array::from_fn(|_| vec![0.0; block_size]),
        }
    }

    /// Samples per channel
    pub fn len(&self) -> usize {
        self.channels[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrow one channel.
    ///
    /// # Panics
    /// Panics if `index >= LOGICAL_CHANNELS`.
    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index]
    }

    /// Mutably borrow one channel.
    ///
    /// # Panics
    /// Panics if `index >= LOGICAL_CHANNELS`.
    pub fn channel_mut(&mut self, index: usize) -> &mut [f32] {
        &mut self.channels[index]
    }

    /// Mutably borrow channels 0 and 1 together
    pub fn first_pair_mut(&mut self) -> (&mut [f32], &mut [f32]) {
        let (left, rest) = self.channels.split_at_mut(1);
        (left[0].as_mut_slice(), rest[0].as_mut_slice())
    }

    /// Zero the first `count` samples of every channel
    pub fn silence(&mut self, count: usize) {
        for channel in &mut self.channels {
            channel[..count].fill(0.0);
        }
    }

    /// Copy the first `count` samples of channel 0 into channel 1
    pub fn duplicate_first_channel(&mut self, count: usize) {
        let (first, second) = self.first_pair_mut();
        second[..count].copy_from_slice(&first[..count]);
    }

    /// Copy channels 0/1 onto channels 2/3 for the first `count` samples
    pub fn mirror_pair(&mut self, count: usize) {
        let (front, back) = self.channels.split_at_mut(2);
        back[0][..count].copy_from_slice(&front[0][..count]);
        back[1][..count].copy_from_slice(&front[1][..count]);
    }

    /// Copy the first `count` samples of every channel from `other`
    pub fn copy_from(&mut self, other: &SampleBlock, count: usize) {
        for (dst, src) in self.channels.iter_mut().zip(other.channels.iter()) {
            dst[..count].copy_from_slice(&src[..count]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_block_is_silent() {
        let block = SampleBlock::new(8);
        assert_eq!(block.len(), 8);
        for c in 0..LOGICAL_CHANNELS {
            assert!(block.channel(c).iter().all(|&s| s == 0.0));
        }
    }

    #[test]
    fn test_mirror_pair_copies_front_to_back() {
        let mut block = SampleBlock::new(4);
        block.channel_mut(0).copy_from_slice(&[0.1, 0.2, 0.3, 0.4]);
        block.channel_mut(1).copy_from_slice(&[-0.1, -0.2, -0.3, -0.4]);

        block.mirror_pair(4);

        assert_eq!(block.channel(2), block.channel(0));
        assert_eq!(block.channel(3), block.channel(1));
    }

    #[test]
    fn test_partial_operations_leave_tail_untouched() {
        let mut block = SampleBlock::new(4);
        block.channel_mut(0).fill(0.5);
        block.channel_mut(1).fill(0.25);

        block.duplicate_first_channel(2);
        assert_eq!(block.channel(1), &[0.5, 0.5, 0.25, 0.25]);

        block.silence(1);
        assert_eq!(block.channel(0), &[0.0, 0.5, 0.5, 0.5]);
    }
}
