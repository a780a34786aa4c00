use rodio::source::Source;
use std::time::Duration;

/// Length of the crossfade window.
const WINDOW: Duration = Duration::from_millis(30);

/// Shifts pitch by a fixed number of cents without changing duration.
///
/// Each channel runs through a delay line read by two heads half a window
/// apart. The heads' delay sweeps at `1 - ratio` samples per sample, which
/// resamples the signal by `ratio`, and a triangular crossfade hides the jump
/// when a head wraps. The two gains always sum to 1.
pub struct PitchShift<S> {
    inner: S,
    ratio: f32,
    window: usize,
    lines: Vec<DelayLine>,
    phase: f32,
    phase_step: f32,
    channel: usize,
}

struct DelayLine {
    buf: Vec<f32>,
    write: usize,
}

impl DelayLine {
    fn new(len: usize) -> Self {
        Self {
            buf: vec![0.0; len],
            write: 0,
        }
    }

    fn push(&mut self, sample: f32) {
        self.buf[self.write] = sample;
        self.write = (self.write + 1) % self.buf.len();
    }

    /// Sample `delay` positions behind the newest one, linearly interpolated.
    fn read(&self, delay: f32) -> f32 {
        let len = self.buf.len();
        let whole = delay.floor();
        let frac = delay - whole;
        let d = (whole as usize).min(len - 2);
        let newest = (self.write + len - 1) % len;
        let a = self.buf[(newest + len - d) % len];
        let b = self.buf[(newest + len - d - 1) % len];
        a + (b - a) * frac
    }
}

fn crossfade_gain(phase: f32) -> f32 {
    1.0 - (2.0 * phase - 1.0).abs()
}

impl<S: Source> PitchShift<S> {
    pub fn new(inner: S, detune_cents: f32) -> Self {
        let ratio = 2f32.powf(detune_cents / 1200.0);
        let channels = usize::from(inner.channels()).max(1);
        let window = ((inner.sample_rate() as f32 * WINDOW.as_secs_f32()) as usize).max(2);
        Self {
            inner,
            ratio,
            window,
            lines: (0..channels).map(|_| DelayLine::new(window + 2)).collect(),
            phase: 0.0,
            phase_step: (1.0 - ratio) / window as f32,
            channel: 0,
        }
    }

    fn bypassed(&self) -> bool {
        (self.ratio - 1.0).abs() < f32::EPSILON
    }
}

impl<S: Source> Iterator for PitchShift<S> {
    type Item = f32;

    fn next(&mut self) -> Option<Self::Item> {
        let x = self.inner.next()?;
        if self.bypassed() {
            return Some(x);
        }

        let window = self.window as f32;
        let second = (self.phase + 0.5).rem_euclid(1.0);
        let line = &mut self.lines[self.channel];
        line.push(x);
        let y = line.read(self.phase * window) * crossfade_gain(self.phase)
            + line.read(second * window) * crossfade_gain(second);

        self.channel += 1;
        if self.channel == self.lines.len() {
            self.channel = 0;
            self.phase = (self.phase + self.phase_step).rem_euclid(1.0);
        }
        Some(y)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<S: Source> Source for PitchShift<S> {
    fn current_span_len(&self) -> Option<usize> {
        self.inner.current_span_len()
    }

    fn channels(&self) -> u16 {
        self.inner.channels()
    }

    fn sample_rate(&self) -> u32 {
        self.inner.sample_rate()
    }

    fn total_duration(&self) -> Option<Duration> {
        self.inner.total_duration()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rodio::buffer::SamplesBuffer;

    fn tone(len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (i as f32 * 2.0 * std::f32::consts::PI * 220.0 / 24_000.0).sin() * 0.8)
            .collect()
    }

    #[test]
    fn zero_cents_is_a_pass_through() {
        let input = tone(2_400);
        let out: Vec<f32> = PitchShift::new(SamplesBuffer::new(1, 24_000, input.clone()), 0.0).collect();
        assert_eq!(out, input);
    }

    #[test]
    fn shifting_preserves_length_and_channel_layout() {
        for cents in [-350.0, 350.0] {
            let input = tone(4_800);
            let shifted = PitchShift::new(SamplesBuffer::new(2, 24_000, input.clone()), cents);
            assert_eq!(shifted.channels(), 2);
            assert_eq!(shifted.sample_rate(), 24_000);
            let out: Vec<f32> = shifted.collect();
            assert_eq!(out.len(), input.len());
            assert!(out.iter().all(|s| s.abs() <= 0.8 + 1e-4));
            assert_ne!(out, input);
        }
    }

    #[test]
    fn constant_signal_survives_the_crossfade() {
        let input = vec![0.5f32; 6_000];
        let out: Vec<f32> = PitchShift::new(SamplesBuffer::new(1, 24_000, input), 350.0).collect();
        // The delay line is primed after one window plus interpolation slack.
        for s in &out[1_000..] {
            assert!((s - 0.5).abs() < 1e-4, "{s}");
        }
    }
}
