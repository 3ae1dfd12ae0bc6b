//! Faster-than-real-time rendering of a practice session to a WAV file.
//!
//! The same render graph the live backends drive is stepped here buffer by
//! buffer while the playback segments flip the radio gates, so the file
//! sounds exactly like the live session would.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use cwtrainer_engine::{
    BandConditionsProcessor, PlaybackSequencer, RadioStateMachine, RenderPipeline, Segment,
    ToneParameters,
};
use cwtrainer_messages::{AudioConfig, BandConditionsConfig, Hertz, Wpm};
use hound::{SampleFormat, WavSpec, WavWriter};
use log::info;

/// What to render.
#[derive(Debug, Clone)]
pub struct OfflineSession {
    pub audio: AudioConfig,
    pub frequency: Hertz,
    pub effective_speed: Wpm,
    pub band: BandConditionsConfig,
    /// Render as clean transmit sidetone instead of received signal.
    pub transmit: bool,
    /// Silence before the first and after the last character.
    pub padding: Duration,
}

impl OfflineSession {
    pub fn render(&self, text: &str) -> Result<Vec<f32>> {
        let radio = Arc::new(RadioStateMachine::new());
        if self.transmit {
            radio.start_transmitting()?;
        } else {
            radio.start_receiving()?;
        }

        let tone = Arc::new(Mutex::new(ToneParameters::new(self.frequency.0)));
        let band = BandConditionsProcessor::new(self.band, self.audio.sample_rate, self.audio.seed);
        let mut pipeline = RenderPipeline::new(radio.clone(), tone, band, self.audio.sample_rate);

        let segments = PlaybackSequencer::new(self.effective_speed).group_segments(text);
        let mut samples = Vec::new();
        self.render_for(&mut pipeline, self.padding, &mut samples);

        for segment in &segments {
            if segment.is_tone() {
                self.gate(&radio, true)?;
            }
            self.render_for(&mut pipeline, segment.duration(), &mut samples);
            if let Segment::Tone(_) = segment {
                self.gate(&radio, false)?;
            }
        }

        self.render_for(&mut pipeline, self.padding, &mut samples);
        Ok(samples)
    }

    fn gate(&self, radio: &RadioStateMachine, on: bool) -> Result<()> {
        match (self.transmit, on) {
            (true, true) => radio.key()?,
            (true, false) => radio.unkey()?,
            (false, true) => radio.activate_tone()?,
            (false, false) => radio.deactivate_tone()?,
        }
        Ok(())
    }

    fn render_for(&self, pipeline: &mut RenderPipeline, duration: Duration, out: &mut Vec<f32>) {
        let total = (duration.as_secs_f64() * self.audio.sample_rate as f64).round() as usize;
        let chunk = self.audio.buffer_size.max(1);
        let mut buffer = vec![0.0f32; chunk];
        let mut remaining = total;
        while remaining > 0 {
            let n = remaining.min(chunk);
            pipeline.render(&mut buffer[..n]);
            out.extend_from_slice(&buffer[..n]);
            remaining -= n;
        }
    }
}

/// Write mono samples as 16-bit PCM.
pub fn write_wav(path: &Path, samples: &[f32], sample_rate: u32) -> Result<()> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)?;
    for &sample in samples {
        writer.write_sample((sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)?;
    }
    writer.finalize()?;

    info!(
        "wrote {} samples ({:.2} s) to {}",
        samples.len(),
        samples.len() as f64 / sample_rate as f64,
        path.display()
    );
    Ok(())
}
