// Minimal RIFF/WAVE reader for PCM16 output of CLI synthesizers
use super::pcm::PcmFormat;
use crate::{Result, VoxlineError};

/// Extract format and samples from a PCM16 WAV image.
///
/// Streams written to a pipe often carry placeholder sizes (0 or 0xFFFFFFFF)
/// in the RIFF and data headers, so the data chunk is read to the end of the
/// buffer when its declared size does not fit.
pub fn decode_pcm16(buf: &[u8]) -> Result<(PcmFormat, Vec<i16>)> {
    if buf.len() < 12 || &buf[0..4] != b"RIFF" || &buf[8..12] != b"WAVE" {
        return Err(VoxlineError::Audio("not a RIFF/WAVE stream".into()));
    }

    let mut idx = 12;
    let mut format = None;
    while idx + 8 <= buf.len() {
        let chunk_id = &buf[idx..idx + 4];
        let sz =
            u32::from_le_bytes([buf[idx + 4], buf[idx + 5], buf[idx + 6], buf[idx + 7]]) as usize;
        let body = idx + 8;
        match chunk_id {
            b"fmt " => {
                if body + 16 > buf.len() {
                    break;
                }
                let audio_format = u16::from_le_bytes([buf[body], buf[body + 1]]);
                let channels = u16::from_le_bytes([buf[body + 2], buf[body + 3]]);
                let sample_rate = u32::from_le_bytes([
                    buf[body + 4],
                    buf[body + 5],
                    buf[body + 6],
                    buf[body + 7],
                ]);
                let bits = u16::from_le_bytes([buf[body + 14], buf[body + 15]]);
                if audio_format != 1 || bits != 16 {
                    return Err(VoxlineError::Audio(format!(
                        "unsupported WAV encoding (format {}, {} bits)",
                        audio_format, bits
                    )));
                }
                format = Some(PcmFormat::new(sample_rate, channels));
            }
            b"data" => {
                let format = format
                    .ok_or_else(|| VoxlineError::Audio("WAV data before fmt chunk".into()))?;
                let end = body
                    .checked_add(sz)
                    .filter(|end| *end <= buf.len())
                    .unwrap_or(buf.len());
                let samples = buf[body..end]
                    .chunks_exact(2)
                    .map(|c| i16::from_le_bytes([c[0], c[1]]))
                    .collect();
                return Ok((format, samples));
            }
            _ => {}
        }
        // Chunks are word aligned.
        idx = body.saturating_add(sz).saturating_add(sz & 1);
    }
    Err(VoxlineError::Audio("WAV stream has no data chunk".into()))
}

/// Little-endian PCM16 bytes to samples; a trailing odd byte is dropped.
pub fn pcm16_from_le_bytes(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]))
        .collect()
}
