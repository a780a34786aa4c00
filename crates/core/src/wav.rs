//! Wraps raw 16-bit PCM into a RIFF/WAVE container for export.

use crate::decode::{PcmFormat, BYTES_PER_SAMPLE};
use hound::{SampleFormat, WavSpec, WavWriter};
use std::io::Cursor;

/// RIFF header + `fmt ` chunk + `data` chunk header for 16-bit PCM.
pub const WAV_HEADER_BYTES: usize = 44;
pub const WAV_MIME_TYPE: &str = "audio/wav";
pub const WAV_EXTENSION: &str = "wav";

#[derive(thiserror::Error, Debug)]
pub enum WavError {
    #[error("pcm byte length {len} is not a whole number of {frame_bytes}-byte frames")]
    PartialFrame { len: usize, frame_bytes: usize },

    #[error("invalid pcm format: sample_rate={sample_rate} channels={channels}")]
    InvalidFormat { sample_rate: u32, channels: u16 },

    #[error("wav encoding failed: {0}")]
    Encode(#[from] hound::Error),
}

/// Encodes little-endian 16-bit PCM bytes as a WAV file. Empty input yields a
/// header-only file with a zero-length data chunk.
pub fn pcm_to_wav(pcm: &[u8], format: PcmFormat) -> Result<Vec<u8>, WavError> {
    if format.sample_rate == 0 || format.channels == 0 {
        return Err(WavError::InvalidFormat {
            sample_rate: format.sample_rate,
            channels: format.channels,
        });
    }
    let frame_bytes = format.frame_bytes();
    if pcm.len() % frame_bytes != 0 {
        return Err(WavError::PartialFrame {
            len: pcm.len(),
            frame_bytes,
        });
    }

    let spec = WavSpec {
        channels: format.channels,
        sample_rate: format.sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::with_capacity(WAV_HEADER_BYTES + pcm.len()));
    {
        let mut writer = WavWriter::new(&mut cursor, spec)?;
        for chunk in pcm.chunks_exact(BYTES_PER_SAMPLE) {
            writer.write_sample(i16::from_le_bytes([chunk[0], chunk[1]]))?;
        }
        writer.finalize()?;
    }

    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u32_at(bytes: &[u8], offset: usize) -> u32 {
        u32::from_le_bytes([
            bytes[offset],
            bytes[offset + 1],
            bytes[offset + 2],
            bytes[offset + 3],
        ])
    }

    fn u16_at(bytes: &[u8], offset: usize) -> u16 {
        u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
    }

    #[test]
    fn header_lengths_follow_input_size() {
        for n in [0usize, 2, 480, 48_000] {
            let pcm = vec![0x11u8; n];
            let wav = pcm_to_wav(&pcm, PcmFormat::tts_mono_24khz()).unwrap();
            assert_eq!(wav.len(), WAV_HEADER_BYTES + n, "n={n}");
            assert_eq!(&wav[0..4], b"RIFF");
            assert_eq!(u32_at(&wav, 4) as usize, 36 + n);
            assert_eq!(&wav[8..12], b"WAVE");
            assert_eq!(&wav[36..40], b"data");
            assert_eq!(u32_at(&wav, 40) as usize, n);
            assert_eq!(&wav[WAV_HEADER_BYTES..], pcm.as_slice());
        }
    }

    #[test]
    fn fmt_chunk_describes_mono_24k_16bit() {
        let wav = pcm_to_wav(&[0u8; 8], PcmFormat::tts_mono_24khz()).unwrap();
        assert_eq!(&wav[12..16], b"fmt ");
        assert_eq!(u16_at(&wav, 20), 1, "format tag");
        assert_eq!(u16_at(&wav, 22), 1, "channels");
        assert_eq!(u32_at(&wav, 24), 24_000, "sample rate");
        assert_eq!(u32_at(&wav, 28), 48_000, "byte rate");
        assert_eq!(u16_at(&wav, 32), 2, "block align");
        assert_eq!(u16_at(&wav, 34), 16, "bits per sample");
    }

    #[test]
    fn stereo_output_reads_back_with_hound() {
        let samples: [i16; 4] = [100, -100, 2000, -2000];
        let pcm: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        let wav = pcm_to_wav(&pcm, PcmFormat::new(24_000, 2)).unwrap();

        let mut reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 2);
        assert_eq!(spec.sample_rate, 24_000);
        assert_eq!(reader.duration(), 2);
        let back: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(back, samples);
    }

    #[test]
    fn partial_frames_are_rejected() {
        let err = pcm_to_wav(&[0u8; 3], PcmFormat::tts_mono_24khz()).unwrap_err();
        assert!(matches!(err, WavError::PartialFrame { len: 3, .. }));
    }
}
