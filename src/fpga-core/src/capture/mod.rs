// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Signal capture: turns RX payloads into a sample stream and, optionally,
//! a power spectrum of the newest samples.
//!
//! Every payload byte is one sample in `0..=255`. Messages are identified by
//! their id and each one contributes at most once.

use std::collections::{HashSet, VecDeque};
use std::io::{self, Write};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::dsp::fft::{Fft, FftError, Window};
use crate::dsp::spectrum::Spectrum;
use crate::message::{MessageLog, RxDirection, RxMessage};

pub mod buffer;

pub use buffer::SampleBuffer;

/// Ids remembered for de-duplication. Older ids are forgotten, so a
/// [`MessageLog`] passed to [`SignalCapture::ingest_log`] must not hold more.
pub const SEEN_CAPACITY: usize = 4096;

/// Insertion-ordered id set that forgets the oldest id past its capacity.
#[derive(Debug, Clone)]
struct RecentIds {
    ids: HashSet<Uuid>,
    order: VecDeque<Uuid>,
    capacity: usize,
}

impl RecentIds {
    fn new(capacity: usize) -> Self {
        Self {
            ids: HashSet::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Returns false if `id` is already remembered.
    fn insert(&mut self, id: Uuid) -> bool {
        if !self.ids.insert(id) {
            return false;
        }
        self.order.push_back(id);
        while self.order.len() > self.capacity {
            if let Some(old) = self.order.pop_front() {
                self.ids.remove(&old);
            }
        }
        true
    }

    fn reset<I: IntoIterator<Item = Uuid>>(&mut self, ids: I) {
        self.ids.clear();
        self.order.clear();
        for id in ids {
            self.insert(id);
        }
    }

    fn len(&self) -> usize {
        self.order.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Samples kept in the buffer.
    pub max_samples: usize,
    /// Transform size, power of two.
    pub fft_size: usize,
    /// Used to label spectrum bins in Hz.
    pub sample_rate: f32,
    pub window: Window,
    /// Compute the spectrum from the start.
    pub spectrum: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            max_samples: 2048,
            fft_size: 128,
            sample_rate: 44100.0,
            window: Window::Rectangular,
            spectrum: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SignalCapture {
    config: CaptureConfig,
    running: bool,
    show_spectrum: bool,
    seen: RecentIds,
    buffer: SampleBuffer,
    fft: Fft,
    spectrum: Option<Spectrum>,
}

impl SignalCapture {
    pub fn new(config: CaptureConfig) -> Result<Self, FftError> {
        let fft = Fft::new(config.fft_size)?;
        Ok(Self {
            running: false,
            show_spectrum: config.spectrum,
            seen: RecentIds::new(SEEN_CAPACITY),
            buffer: SampleBuffer::new(config.max_samples),
            fft,
            spectrum: None,
            config,
        })
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Start capturing. Ids in `baseline` are treated as already processed.
    pub fn start<I: IntoIterator<Item = Uuid>>(&mut self, baseline: I) {
        if self.running {
            return;
        }
        for id in baseline {
            self.seen.insert(id);
        }
        self.running = true;
        debug!("Capture started ({} ids in baseline)", self.seen.len());
    }

    pub fn stop(&mut self) {
        if self.running {
            self.running = false;
            debug!("Capture stopped with {} samples", self.buffer.len());
        }
    }

    pub fn toggle<I: IntoIterator<Item = Uuid>>(&mut self, baseline: I) {
        if self.running {
            self.stop();
        } else {
            self.start(baseline);
        }
    }

    /// Process one message. Returns the number of samples appended.
    pub fn ingest(&mut self, message: &RxMessage) -> usize {
        if !self.running || !self.seen.insert(message.id) {
            return 0;
        }
        if message.direction != RxDirection::Rx || message.data.is_empty() {
            return 0;
        }
        self.append(&message.data);
        message.data.len()
    }

    /// Process a message whose payload is hex text, e.g. `"[ch0] 0x01 0x7F"`.
    pub fn ingest_hex(&mut self, id: Uuid, text: &str) -> usize {
        if !self.running || !self.seen.insert(id) {
            return 0;
        }
        let (samples, dropped) = decode_hex_samples(text);
        if dropped > 0 {
            warn!("Dropped {} malformed hex token(s) in payload", dropped);
        }
        if samples.is_empty() {
            return 0;
        }
        self.append(&samples);
        samples.len()
    }

    /// Process every not yet seen message of `log`.
    pub fn ingest_log(&mut self, log: &MessageLog) -> usize {
        log.iter().map(|message| self.ingest(message)).sum()
    }

    /// Drop all samples and the spectrum; `current_ids` become the new baseline.
    pub fn clear<I: IntoIterator<Item = Uuid>>(&mut self, current_ids: I) {
        self.buffer.clear();
        self.spectrum = None;
        self.seen.reset(current_ids);
    }

    /// Flip spectrum display. Turning it on recomputes from the current buffer.
    pub fn toggle_spectrum(&mut self) -> bool {
        self.show_spectrum = !self.show_spectrum;
        if self.show_spectrum {
            self.recompute_spectrum();
        } else {
            self.spectrum = None;
        }
        self.show_spectrum
    }

    pub fn spectrum_enabled(&self) -> bool {
        self.show_spectrum
    }

    /// Latest spectrum; `None` while disabled or fewer than `fft_size` samples exist.
    pub fn spectrum(&self) -> Option<&Spectrum> {
        self.spectrum.as_ref()
    }

    pub fn buffer(&self) -> &SampleBuffer {
        &self.buffer
    }

    /// Write the buffer as `Index,Value` rows.
    pub fn export_csv<W: Write>(&self, mut out: W) -> io::Result<()> {
        writeln!(out, "Index,Value")?;
        for (i, sample) in self.buffer.iter().enumerate() {
            writeln!(out, "{},{}", i, sample)?;
        }
        out.flush()
    }

    fn append(&mut self, samples: &[u8]) {
        self.buffer.extend(samples.iter().map(|&b| f32::from(b)));
        if self.show_spectrum {
            self.recompute_spectrum();
        }
    }

    fn recompute_spectrum(&mut self) {
        self.spectrum = self
            .buffer
            .latest(self.config.fft_size)
            .and_then(|window| match self.fft.spectrum(&window, self.config.window) {
                Ok(spectrum) => Some(spectrum),
                Err(err) => {
                    warn!("Spectrum computation failed: {}", err);
                    None
                }
            });
    }
}

/// Strip a leading `[tag]` label.
fn strip_tag(text: &str) -> &str {
    let trimmed = text.trim_start();
    if let Some(rest) = trimmed.strip_prefix('[') {
        if let Some(end) = rest.find(']') {
            if end > 0 {
                return rest[end + 1..].trim_start();
            }
        }
    }
    text
}

/// Decode hex text into byte samples.
///
/// `0x`/`\x` prefixes and `,`/`;`/whitespace separators are removed, then
/// the text is read two digits at a time. Returns the samples and the number
/// of chunks that were not valid hex.
pub fn decode_hex_samples(text: &str) -> (Vec<u8>, usize) {
    let mut cleaned = strip_tag(text).to_string();
    for prefix in ["0x", "0X", "\\x", "\\X"] {
        cleaned = cleaned.replace(prefix, "");
    }
    let digits: Vec<char> = cleaned
        .chars()
        .filter(|c| !(c.is_whitespace() || *c == ',' || *c == ';'))
        .collect();

    let mut samples = Vec::with_capacity(digits.len() / 2 + 1);
    let mut dropped = 0;
    for chunk in digits.chunks(2) {
        let value = chunk
            .iter()
            .try_fold(0u8, |acc, c| c.to_digit(16).map(|d| acc * 16 + d as u8));
        match value {
            Some(value) => samples.push(value),
            None => dropped += 1,
        }
    }
    (samples, dropped)
}
