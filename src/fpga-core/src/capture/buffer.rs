// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::collections::VecDeque;

/// Bounded sample history. Appends past capacity evict the oldest samples.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    samples: VecDeque<f32>,
    max_len: usize,
}

impl SampleBuffer {
    pub fn new(max_len: usize) -> Self {
        let max_len = max_len.max(1);
        Self {
            samples: VecDeque::with_capacity(max_len),
            max_len,
        }
    }

    pub fn extend<I: IntoIterator<Item = f32>>(&mut self, samples: I) {
        for sample in samples {
            if self.samples.len() == self.max_len {
                self.samples.pop_front();
            }
            self.samples.push_back(sample);
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// The newest `n` samples in arrival order, if that many are buffered.
    pub fn latest(&self, n: usize) -> Option<Vec<f32>> {
        if n > self.samples.len() {
            return None;
        }
        Some(self.samples.iter().skip(self.samples.len() - n).copied().collect())
    }

    pub fn iter(&self) -> impl Iterator<Item = f32> + '_ {
        self.samples.iter().copied()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eviction_keeps_newest() {
        let mut buf = SampleBuffer::new(4);
        buf.extend([1.0, 2.0, 3.0]);
        buf.extend([4.0, 5.0, 6.0]);
        assert_eq!(buf.len(), 4);
        assert_eq!(buf.iter().collect::<Vec<_>>(), vec![3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_latest() {
        let mut buf = SampleBuffer::new(8);
        buf.extend([1.0, 2.0, 3.0]);
        assert_eq!(buf.latest(2), Some(vec![2.0, 3.0]));
        assert_eq!(buf.latest(3), Some(vec![1.0, 2.0, 3.0]));
        assert_eq!(buf.latest(4), None);
    }

    #[test]
    fn test_zero_capacity_holds_one() {
        let mut buf = SampleBuffer::new(0);
        buf.extend([1.0, 2.0]);
        assert_eq!(buf.iter().collect::<Vec<_>>(), vec![2.0]);
    }
}
