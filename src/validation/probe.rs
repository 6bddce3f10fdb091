use std::time::Duration;
use async_trait::async_trait;
use thiserror::Error;
use crate::core::MediaPayload;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("malformed {container} header: {reason}")]
    Malformed {
        container: &'static str,
        reason: String,
    },

    #[error("probe failed: {0}")]
    Failed(String),
}

impl ProbeError {
    fn wav(reason: impl Into<String>) -> Self {
        Self::Malformed {
            container: "WAV",
            reason: reason.into(),
        }
    }
}

/// Best-effort media duration inspection
///
/// `Ok(None)` means no probe is available for this container, which is not
/// a failure. Errors are turned into advisories by the policy.
#[async_trait]
pub trait DurationProbe: Send + Sync {
    async fn probe(&self, payload: &MediaPayload) -> Result<Option<Duration>, ProbeError>;
}

/// Reads durations straight out of container headers.
///
/// Only RIFF/WAVE is understood today.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeaderDurationProbe;

#[async_trait]
impl DurationProbe for HeaderDurationProbe {
    async fn probe(&self, payload: &MediaPayload) -> Result<Option<Duration>, ProbeError> {
        let declared_wav = matches!(
            payload.essence().as_str(),
            "audio/wav" | "audio/x-wav" | "audio/wave" | "audio/vnd.wave"
        );
        if !declared_wav && !is_riff_wave(&payload.data) {
            return Ok(None);
        }

        wav_duration(&payload.data).map(Some)
    }
}

fn is_riff_wave(data: &[u8]) -> bool {
    data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WAVE"
}

fn read_u32(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset + 4)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Duration = data chunk length / fmt byte rate
pub fn wav_duration(data: &[u8]) -> Result<Duration, ProbeError> {
    if !is_riff_wave(data) {
        return Err(ProbeError::wav("missing RIFF/WAVE signature"));
    }

    let mut offset = 12;
    let mut byte_rate = None;
    let mut data_len = None;

    while offset + 8 <= data.len() {
        let chunk_id = &data[offset..offset + 4];
        let chunk_size = read_u32(data, offset + 4).unwrap_or(0) as usize;
        let body = offset + 8;

        match chunk_id {
            b"fmt " => {
                byte_rate = Some(
                    read_u32(data, body + 8).ok_or_else(|| ProbeError::wav("truncated fmt chunk"))?,
                );
            }
            b"data" => {
                // streamed recordings leave the size unset
                let available = data.len() - body;
                data_len = Some(if chunk_size == u32::MAX as usize || chunk_size > available {
                    available
                } else {
                    chunk_size
                });
                break;
            }
            _ => {}
        }

        // chunks are word aligned
        offset = body.saturating_add(chunk_size + (chunk_size & 1));
    }

    let byte_rate = byte_rate.ok_or_else(|| ProbeError::wav("no fmt chunk"))?;
    let data_len = data_len.ok_or_else(|| ProbeError::wav("no data chunk"))?;
    if byte_rate == 0 {
        return Err(ProbeError::wav("byte rate is zero"));
    }

    Ok(Duration::from_secs_f64(data_len as f64 / byte_rate as f64))
}

#[cfg(test)]
pub(crate) fn wav_bytes(seconds: u32) -> Vec<u8> {
    // 8 kHz mono 8-bit PCM, byte rate 8000
    let data_len = seconds * 8000;
    let mut wav = Vec::with_capacity(44 + data_len as usize);
    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&(36 + data_len).to_le_bytes());
    wav.extend_from_slice(b"WAVE");
    wav.extend_from_slice(b"fmt ");
    wav.extend_from_slice(&16u32.to_le_bytes());
    wav.extend_from_slice(&1u16.to_le_bytes());
    wav.extend_from_slice(&1u16.to_le_bytes());
    wav.extend_from_slice(&8000u32.to_le_bytes());
    wav.extend_from_slice(&8000u32.to_le_bytes());
    wav.extend_from_slice(&1u16.to_le_bytes());
    wav.extend_from_slice(&8u16.to_le_bytes());
    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&data_len.to_le_bytes());
    wav.resize(44 + data_len as usize, 0x80);
    wav
}
