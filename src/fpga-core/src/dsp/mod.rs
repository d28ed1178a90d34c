// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

pub mod fft;
pub mod spectrum;

pub use fft::{Fft, FftError, Window};
pub use spectrum::Spectrum;
