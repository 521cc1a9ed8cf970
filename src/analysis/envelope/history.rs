// EnvelopeHistory - rolling buffer of smoothed envelope values
//
// Same discipline as SampleWindow: logical index 0 is the oldest value and
// each append pushes one block of hops onto the end, dropping the oldest
// block. Backed by a ring with a modulo write pointer.

pub struct EnvelopeHistory {
    values: Vec<f32>,
    hops_per_block: usize,
    write_pos: usize,
}

impl EnvelopeHistory {
    pub fn new(hops_per_block: usize, block_count: usize) -> Self {
        Self {
            values: vec![0.0; hops_per_block * block_count],
            hops_per_block,
            write_pos: 0,
        }
    }

    /// Append one block's worth of smoothed values
    pub fn append(&mut self, values: &[f32]) {
        debug_assert_eq!(values.len(), self.hops_per_block);

        let len = self.values.len();
        for (offset, &value) in values.iter().enumerate() {
            self.values[(self.write_pos + offset) % len] = value;
        }
        self.write_pos = (self.write_pos + values.len()) % len;
    }

    /// Value at logical index `index` (0 = oldest)
    #[inline]
    pub fn get(&self, index: usize) -> f32 {
        self.values[(self.write_pos + index) % self.values.len()]
    }

    /// Mean of the `count` values immediately preceding `index`
    pub fn trailing_mean(&self, index: usize, count: usize) -> f32 {
        debug_assert!(count > 0 && count <= index);
        let sum: f32 = (index - count..index).map(|i| self.get(i)).sum();
        sum / count as f32
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn hops_per_block(&self) -> usize {
        self.hops_per_block
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_shifts_oldest_block_out() {
        let mut history = EnvelopeHistory::new(2, 3);
        history.append(&[1.0, 2.0]);
        history.append(&[3.0, 4.0]);
        history.append(&[5.0, 6.0]);
        history.append(&[7.0, 8.0]);

        let logical: Vec<f32> = (0..history.len()).map(|i| history.get(i)).collect();
        assert_eq!(logical, vec![3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
    }

    #[test]
    fn test_trailing_mean_excludes_candidate() {
        let mut history = EnvelopeHistory::new(4, 2);
        history.append(&[1.0, 2.0, 3.0, 4.0]);
        history.append(&[100.0, 0.0, 0.0, 0.0]);

        // Values at indices 1..4 are 2, 3, 4
        assert!((history.trailing_mean(4, 3) - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_fresh_history_is_zeroed() {
        let history = EnvelopeHistory::new(16, 5);
        assert_eq!(history.len(), 80);
        assert_eq!(history.hops_per_block(), 16);
        assert!((0..80).all(|i| history.get(i) == 0.0));
    }
}
