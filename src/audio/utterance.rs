//! Bounded utterance recording
//!
//! After the wake word, the controller feeds input frames into an
//! [`UtteranceRecorder`] until it reports [`Capture::Done`]: either the
//! maximum duration has been captured, or speech was heard and then
//! followed by enough silence.

use std::time::Duration;

use super::capture::peak;

/// Limits for one utterance capture
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureLimits {
    /// Hard cap on captured audio
    pub max_duration: Duration,
    /// Trailing silence that ends the capture once speech was heard
    pub silence_duration: Duration,
    /// Peak amplitude below which a frame counts as silent
    pub silence_threshold: u16,
}

impl Default for CaptureLimits {
    fn default() -> Self {
        Self {
            max_duration: Duration::from_secs(5),
            silence_duration: Duration::from_millis(1500),
            silence_threshold: 300,
        }
    }
}

/// Whether the recorder wants more frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capture {
    Continue,
    Done,
}

/// Accumulates frames of one utterance
#[derive(Debug)]
pub struct UtteranceRecorder {
    samples: Vec<i16>,
    max_samples: usize,
    silence_samples: usize,
    silence_threshold: u16,
    trailing_silence: usize,
    heard_speech: bool,
}

impl UtteranceRecorder {
    #[must_use]
    pub fn new(limits: &CaptureLimits, sample_rate: u32) -> Self {
        let max_samples = samples_for(limits.max_duration, sample_rate);
        Self {
            samples: Vec::with_capacity(max_samples),
            max_samples,
            silence_samples: samples_for(limits.silence_duration, sample_rate),
            silence_threshold: limits.silence_threshold,
            trailing_silence: 0,
            heard_speech: false,
        }
    }

    /// Append a frame, truncating at the duration cap
    pub fn push(&mut self, frame: &[i16]) -> Capture {
        let room = self.max_samples.saturating_sub(self.samples.len());
        let frame = &frame[..frame.len().min(room)];
        self.samples.extend_from_slice(frame);

        if peak(frame) < self.silence_threshold {
            self.trailing_silence += frame.len();
        } else {
            self.heard_speech = true;
            self.trailing_silence = 0;
        }

        if self.samples.len() >= self.max_samples
            || (self.heard_speech && self.trailing_silence >= self.silence_samples)
        {
            Capture::Done
        } else {
            Capture::Continue
        }
    }

    /// Whether any frame rose above the silence threshold
    #[must_use]
    pub const fn heard_speech(&self) -> bool {
        self.heard_speech
    }

    /// Number of samples captured so far
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Finish recording and hand over the samples
    #[must_use]
    pub fn finish(self) -> Vec<i16> {
        self.samples
    }
}

/// Number of samples covering `duration` at `sample_rate`
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
pub(crate) fn samples_for(duration: Duration, sample_rate: u32) -> usize {
    (duration.as_secs_f64() * f64::from(sample_rate)).round() as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 1000;

    fn limits() -> CaptureLimits {
        CaptureLimits {
            max_duration: Duration::from_secs(5),
            silence_duration: Duration::from_millis(300),
            silence_threshold: 300,
        }
    }

    fn loud(len: usize) -> Vec<i16> {
        vec![2000; len]
    }

    fn quiet(len: usize) -> Vec<i16> {
        vec![10; len]
    }

    #[test]
    fn stops_at_max_duration() {
        let mut rec = UtteranceRecorder::new(&limits(), RATE);
        let mut pushes = 0;
        while rec.push(&loud(100)) == Capture::Continue {
            pushes += 1;
        }
        assert_eq!(pushes, 49);
        assert_eq!(rec.len(), 5000);
    }

    #[test]
    fn truncates_last_frame_at_cap() {
        let mut rec = UtteranceRecorder::new(&limits(), RATE);
        for _ in 0..16 {
            rec.push(&loud(300));
        }
        assert_eq!(rec.push(&loud(300)), Capture::Done);
        assert_eq!(rec.finish().len(), 5000);
    }

    #[test]
    fn trailing_silence_after_speech_ends_capture() {
        let mut rec = UtteranceRecorder::new(&limits(), RATE);
        assert_eq!(rec.push(&loud(100)), Capture::Continue);
        assert_eq!(rec.push(&quiet(100)), Capture::Continue);
        assert_eq!(rec.push(&quiet(100)), Capture::Continue);
        assert_eq!(rec.push(&quiet(100)), Capture::Done);
        assert!(rec.heard_speech());
    }

    #[test]
    fn speech_resets_silence_counter() {
        let mut rec = UtteranceRecorder::new(&limits(), RATE);
        rec.push(&loud(100));
        rec.push(&quiet(200));
        rec.push(&loud(100));
        assert_eq!(rec.push(&quiet(200)), Capture::Continue);
    }

    #[test]
    fn leading_silence_does_not_end_capture() {
        let mut rec = UtteranceRecorder::new(&limits(), RATE);
        for _ in 0..10 {
            assert_eq!(rec.push(&quiet(100)), Capture::Continue);
        }
        assert!(!rec.heard_speech());
    }
}
