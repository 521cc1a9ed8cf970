// SampleWindow - fixed-length look-back buffer of normalized audio
//
// Holds the most recent `block_count` blocks. Logically the buffer behaves
// like shift-and-append (index 0 is the oldest sample, the newest block sits
// at the end); physically it is a ring indexed from a modulo write pointer so
// appending a block never moves the older samples.

/// Full-scale divisor for signed 16-bit PCM
pub const FULL_SCALE: f32 = 32768.0;

pub struct SampleWindow {
    samples: Vec<f32>,
    block_size: usize,
    // Physical index of the oldest sample, which is also where the next
    // block is written
    write_pos: usize,
}

impl SampleWindow {
    pub fn new(block_size: usize, block_count: usize) -> Self {
        Self {
            samples: vec![0.0; block_size * block_count],
            block_size,
            write_pos: 0,
        }
    }

    /// Replace the oldest block with `block`, normalized to [-1, 1]
    ///
    /// The caller guarantees `block.len() == block_size`.
    pub fn append(&mut self, block: &[i16]) {
        debug_assert_eq!(block.len(), self.block_size);

        let len = self.samples.len();
        for (offset, &sample) in block.iter().enumerate() {
            self.samples[(self.write_pos + offset) % len] = sample as f32 / FULL_SCALE;
        }
        self.write_pos = (self.write_pos + self.block_size) % len;
    }

    /// Sample at logical index `index` (0 = oldest)
    #[inline]
    pub fn get(&self, index: usize) -> f32 {
        self.samples[(self.write_pos + index) % self.samples.len()]
    }

    /// Iterate `len` samples starting at logical index `start`
    pub fn segment(&self, start: usize, len: usize) -> impl Iterator<Item = f32> + '_ {
        debug_assert!(start + len <= self.samples.len());
        (start..start + len).map(move |index| self.get(index))
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
