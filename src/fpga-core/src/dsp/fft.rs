// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Iterative radix-2 Cooley-Tukey FFT (decimation in time).
//!
//! A plan is built once per transform size: the bit-reversal permutation and
//! the twiddle factors are precomputed in [`Fft::new`] and reused by every
//! call to [`Fft::calculate`]. Construction is the expensive step.

use std::f32::consts::PI;
use std::sync::OnceLock;

use num_complex::Complex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::spectrum::Spectrum;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FftError {
    #[error("FFT size must be a non-zero power of two (got {0})")]
    InvalidSize(usize),

    #[error("signal length must be {expected} (got {actual})")]
    LengthMismatch { expected: usize, actual: usize },
}

/// Window applied to the samples before the transform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Window {
    #[default]
    Rectangular,
    Hann,
}

impl Window {
    fn coefficients(self, size: usize) -> Vec<f32> {
        match self {
            Window::Rectangular => vec![1.0; size],
            Window::Hann if size < 2 => vec![1.0; size],
            Window::Hann => (0..size)
                .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / (size - 1) as f32).cos()))
                .collect(),
        }
    }
}

/// Precomputed FFT plan for one power-of-two size.
#[derive(Debug, Clone)]
pub struct Fft {
    size: usize,
    stages: u32,
    reversed: Vec<usize>,
    twiddles: Vec<Complex<f32>>,
    /// Built on first Hann-windowed transform.
    hann: OnceLock<Vec<f32>>,
}

impl Fft {
    pub fn new(size: usize) -> Result<Self, FftError> {
        if !size.is_power_of_two() {
            return Err(FftError::InvalidSize(size));
        }

        Ok(Self {
            size,
            stages: size.trailing_zeros(),
            reversed: bit_reversal_table(size),
            twiddles: (0..size / 2)
                .map(|k| Complex::from_polar(1.0, -2.0 * PI * k as f32 / size as f32))
                .collect(),
            hann: OnceLock::new(),
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    fn hann(&self) -> &[f32] {
        self.hann.get_or_init(|| Window::Hann.coefficients(self.size))
    }

    /// Power spectrum `(re² + im²) / N` of a real signal of exactly `N` samples.
    pub fn calculate(&self, samples: &[f32]) -> Result<Vec<f32>, FftError> {
        let bins = self.transform(samples)?;
        let n = self.size as f32;
        Ok(bins.iter().map(|bin| bin.norm_sqr() / n).collect())
    }

    /// Like [`Fft::calculate`], with the given window applied first.
    pub fn calculate_windowed(&self, samples: &[f32], window: Window) -> Result<Vec<f32>, FftError> {
        match window {
            Window::Rectangular => self.calculate(samples),
            Window::Hann => {
                self.check_len(samples)?;
                let windowed: Vec<f32> = samples
                    .iter()
                    .zip(self.hann())
                    .map(|(sample, w)| sample * w)
                    .collect();
                self.calculate(&windowed)
            }
        }
    }

    pub fn spectrum(&self, samples: &[f32], window: Window) -> Result<Spectrum, FftError> {
        self.calculate_windowed(samples, window).map(Spectrum::new)
    }

    /// Complex transform of a real signal of exactly `N` samples.
    pub fn transform(&self, samples: &[f32]) -> Result<Vec<Complex<f32>>, FftError> {
        self.check_len(samples)?;

        let mut buf: Vec<Complex<f32>> = self
            .reversed
            .iter()
            .map(|&src| Complex::new(samples[src], 0.0))
            .collect();

        for stage in 1..=self.stages {
            let m = 1usize << stage;
            let half = m / 2;
            let twiddle_step = self.size / m;
            for k in (0..self.size).step_by(m) {
                for j in 0..half {
                    let t = self.twiddles[j * twiddle_step] * buf[k + j + half];
                    let u = buf[k + j];
                    buf[k + j + half] = u - t;
                    buf[k + j] = u + t;
                }
            }
        }

        Ok(buf)
    }

    fn check_len(&self, samples: &[f32]) -> Result<(), FftError> {
        if samples.len() != self.size {
            return Err(FftError::LengthMismatch {
                expected: self.size,
                actual: samples.len(),
            });
        }
        Ok(())
    }
}

/// `table[i]` is `i` with its `log2(size)` low bits reversed.
fn bit_reversal_table(size: usize) -> Vec<usize> {
    let mut table = vec![0usize; size];
    let mut limit = 1;
    let mut bit = size >> 1;
    while limit < size {
        for i in 0..limit {
            table[i + limit] = table[i] + bit;
        }
        limit <<= 1;
        bit >>= 1;
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, sample_rate: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * PI * freq * i as f32 / sample_rate).sin())
            .collect()
    }

    fn peak(bins: &[f32], size: usize) -> usize {
        bins[..=size / 2]
            .iter()
            .enumerate()
            .fold((0, f32::MIN), |best, (i, &v)| if v > best.1 { (i, v) } else { best })
            .0
    }

    #[test]
    fn test_rejects_non_power_of_two_sizes() {
        for size in [0, 3, 100, 1000] {
            assert_eq!(Fft::new(size).unwrap_err(), FftError::InvalidSize(size));
        }
    }

    #[test]
    fn test_accepts_power_of_two_sizes() {
        for shift in 0..=12 {
            let size = 1usize << shift;
            let fft = Fft::new(size).unwrap();
            assert_eq!(fft.size(), size);
        }
    }

    #[test]
    fn test_length_mismatch() {
        let fft = Fft::new(8).unwrap();
        assert_eq!(
            fft.calculate(&[0.0; 7]).unwrap_err(),
            FftError::LengthMismatch {
                expected: 8,
                actual: 7
            }
        );
    }

    #[test]
    fn test_bit_reversal_table() {
        assert_eq!(bit_reversal_table(1), vec![0]);
        assert_eq!(bit_reversal_table(8), vec![0, 4, 2, 6, 1, 5, 3, 7]);
    }

    #[test]
    fn test_single_point() {
        let fft = Fft::new(1).unwrap();
        assert_eq!(fft.calculate(&[3.0]).unwrap(), vec![9.0]);
    }

    #[test]
    fn test_dc_signal() {
        let fft = Fft::new(8).unwrap();
        let bins = fft.calculate(&[1.0; 8]).unwrap();
        assert!((bins[0] - 8.0).abs() < 1e-4);
        for bin in &bins[1..] {
            assert!(bin.abs() < 1e-4);
        }
    }

    #[test]
    fn test_sine_peak_lands_on_expected_bin() {
        let sample_rate = 1000.0;
        for size in [64, 128, 256, 1024] {
            let fft = Fft::new(size).unwrap();
            for freq in [31.25, 50.0, 123.4, 300.0, 470.0] {
                let bins = fft.calculate(&sine(freq, sample_rate, size)).unwrap();
                let expected = (freq * size as f32 / sample_rate).round() as i64;
                let got = peak(&bins, size) as i64;
                assert!(
                    (got - expected).abs() <= 1,
                    "size {} freq {}: peak at {}, expected {}",
                    size,
                    freq,
                    got,
                    expected
                );
            }
        }
    }

    #[test]
    fn test_on_bin_sine_power() {
        // Amplitude 1 on bin k: |X[k]| = N/2, so power is N/4.
        let size = 64;
        let fft = Fft::new(size).unwrap();
        let bins = fft.calculate(&sine(8.0, 64.0, size)).unwrap();
        assert!((bins[8] - size as f32 / 4.0).abs() < 1e-2);
        assert!((bins[size - 8] - size as f32 / 4.0).abs() < 1e-2);
    }

    #[test]
    fn test_hann_window_keeps_peak() {
        let size = 256;
        let fft = Fft::new(size).unwrap();
        let bins = fft
            .calculate_windowed(&sine(100.0, 1000.0, size), Window::Hann)
            .unwrap();
        let expected = (100.0_f32 * size as f32 / 1000.0).round() as i64;
        assert!((peak(&bins, size) as i64 - expected).abs() <= 1);
    }

    #[test]
    fn test_plan_reuse_is_stable() {
        let fft = Fft::new(128).unwrap();
        let signal = sine(200.0, 1000.0, 128);
        let first = fft.calculate(&signal).unwrap();
        let second = fft.calculate(&signal).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_hann_table_built_on_first_use() {
        let size = 64;
        let fft = Fft::new(size).unwrap();
        let signal = sine(100.0, 1000.0, size);

        fft.spectrum(&signal, Window::Rectangular).unwrap();
        assert!(fft.hann.get().is_none());

        fft.spectrum(&signal, Window::Hann).unwrap();
        let table = fft.hann.get().unwrap();
        assert_eq!(table.len(), size);
        assert_eq!(table[0], 0.0);
    }
}
