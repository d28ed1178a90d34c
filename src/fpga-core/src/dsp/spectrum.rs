// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use serde::Serialize;

/// Power spectrum of one FFT window.
///
/// Holds all `N` bins; for real input only `0..=N/2` carry information.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Spectrum {
    magnitudes: Vec<f32>,
}

impl Spectrum {
    pub fn new(magnitudes: Vec<f32>) -> Self {
        Self { magnitudes }
    }

    pub fn len(&self) -> usize {
        self.magnitudes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.magnitudes.is_empty()
    }

    pub fn magnitudes(&self) -> &[f32] {
        &self.magnitudes
    }

    /// Bins from DC up to and including Nyquist.
    pub fn nyquist_bins(&self) -> &[f32] {
        if self.magnitudes.is_empty() {
            return &[];
        }
        let end = (self.magnitudes.len() / 2).min(self.magnitudes.len() - 1);
        &self.magnitudes[..=end]
    }

    /// Centre frequency of bin `index` in Hz.
    pub fn bin_frequency(&self, index: usize, sample_rate: f32) -> f32 {
        if self.magnitudes.is_empty() {
            return 0.0;
        }
        index as f32 * sample_rate / self.magnitudes.len() as f32
    }

    /// Index of the strongest bin in `0..=N/2`.
    pub fn peak_bin(&self) -> Option<usize> {
        self.nyquist_bins()
            .iter()
            .enumerate()
            .fold(None, |best: Option<(usize, f32)>, (i, &v)| match best {
                Some((_, max)) if max >= v => best,
                _ => Some((i, v)),
            })
            .map(|(i, _)| i)
    }
}
