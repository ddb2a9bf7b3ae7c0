//! Decoding of description audio into mono PCM.

use crate::description::DescriptionAudio;
use crate::error::{Result, SightError};

/// Decoded mono PCM.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl DecodedAudio {
    #[must_use]
    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }
}

/// Decode compressed audio (MP3, AAC/M4A, WAV) to mono `f32`.
///
/// # Errors
///
/// Returns [`SightError::Audio`] if the container or codec is not recognised.
pub fn decode_to_mono(audio: &DescriptionAudio) -> Result<DecodedAudio> {
    use symphonia::core::audio::SampleBuffer;
    use symphonia::core::codecs::DecoderOptions;
    use symphonia::core::errors::Error as SymphError;
    use symphonia::core::formats::FormatOptions;
    use symphonia::core::io::MediaSourceStream;
    use symphonia::core::meta::MetadataOptions;
    use symphonia::core::probe::Hint;

    let cursor = std::io::Cursor::new(audio.bytes.to_vec());
    let mss = MediaSourceStream::new(Box::new(cursor), Default::default());

    let mut hint = Hint::new();
    hint.mime_type(&audio.mime_type);
    if let Some(ext) = extension_for_mime(&audio.mime_type) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| SightError::Audio(format!("failed to probe audio: {e}")))?;

    let mut format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| SightError::Audio("no default audio track".into()))?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();

    let sample_rate = codec_params
        .sample_rate
        .ok_or_else(|| SightError::Audio("unknown sample rate".into()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| SightError::Audio(format!("failed to create decoder: {e}")))?;

    let mut samples: Vec<f32> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(SightError::Audio(format!("audio read error: {e}"))),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            // Corrupt frames are skipped; the rest of the clip still plays.
            Err(SymphError::DecodeError(_)) => continue,
            Err(e) => return Err(SightError::Audio(format!("audio decode error: {e}"))),
        };

        let spec = *decoded.spec();
        let channels = spec.channels.count();
        let frames = decoded.frames() as u64;
        let required = usize::try_from(frames)
            .unwrap_or(usize::MAX)
            .saturating_mul(channels);

        if sample_buf.as_ref().is_none_or(|b| b.capacity() < required) {
            sample_buf = Some(SampleBuffer::<f32>::new(frames, spec));
        }

        let Some(buf) = sample_buf.as_mut() else {
            continue;
        };
        buf.copy_interleaved_ref(decoded);
        let data = buf.samples();

        if channels <= 1 {
            samples.extend_from_slice(data);
        } else {
            samples.extend(
                data.chunks_exact(channels)
                    .map(|frame| frame.iter().sum::<f32>() / channels as f32),
            );
        }
    }

    if samples.is_empty() {
        return Err(SightError::Audio("audio contains no samples".into()));
    }

    Ok(DecodedAudio {
        samples,
        sample_rate,
    })
}

/// Linear-interpolation resampler, adequate for speech.
#[must_use]
pub fn resample(samples: &[f32], src_rate: u32, dst_rate: u32) -> Vec<f32> {
    if src_rate == dst_rate || samples.is_empty() || src_rate == 0 || dst_rate == 0 {
        return samples.to_vec();
    }

    let ratio = f64::from(src_rate) / f64::from(dst_rate);
    let out_len = (samples.len() as f64 / ratio) as usize;
    let mut output = Vec::with_capacity(out_len);

    for i in 0..out_len {
        let src_pos = i as f64 * ratio;
        let idx = src_pos as usize;
        let frac = src_pos - idx as f64;

        let sample = if idx + 1 < samples.len() {
            f64::from(samples[idx]) * (1.0 - frac) + f64::from(samples[idx + 1]) * frac
        } else {
            f64::from(samples[idx.min(samples.len() - 1)])
        };
        output.push(sample as f32);
    }

    output
}

fn extension_for_mime(mime: &str) -> Option<&'static str> {
    match mime {
        "audio/mpeg" | "audio/mp3" => Some("mp3"),
        "audio/wav" | "audio/x-wav" | "audio/wave" => Some("wav"),
        "audio/mp4" | "audio/m4a" | "audio/x-m4a" => Some("m4a"),
        "audio/aac" => Some("aac"),
        _ => None,
    }
}
