use base64::Engine;
use ringbuf::HeapRb;
use rubato::{FastFixedIn, PolynomialDegree};

/// Sample rate the assistant service consumes and produces PCM16 at.
pub const SERVICE_PCM16_SAMPLE_RATE: f64 = 24000.0;

/// Resamples a float buffer by linear interpolation.
///
/// With `r = source_rate / target_rate` the output has
/// `round(input.len() / r)` samples, and
/// `output[i] = input[floor(i*r)] * (1 - t) + input[ceil(i*r)] * t`
/// where `t` is the fractional part of `i * r`. Equal rates yield the
/// input unchanged.
pub fn resample_linear(input: &[f32], source_rate: f64, target_rate: f64) -> Vec<f32> {
    if input.is_empty() {
        return Vec::new();
    }
    if source_rate == target_rate {
        return input.to_vec();
    }

    let ratio = source_rate / target_rate;
    let out_len = (input.len() as f64 / ratio).round() as usize;
    let last = input.len() - 1;

    let mut output = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let pos = i as f64 * ratio;
        let lo = (pos.floor() as usize).min(last);
        let hi = (pos.ceil() as usize).min(last);
        let t = (pos - pos.floor()) as f32;
        output.push(input[lo] * (1.0 - t) + input[hi] * t);
    }
    output
}

/// Converts float samples in `[-1, 1]` to little-endian signed 16-bit PCM.
/// Values are clamped first; negatives scale by 32768 and positives by
/// 32767 so both extremes are representable.
pub fn encode_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let s = sample.clamp(-1.0, 1.0);
        let v = if s < 0.0 { s * 32768.0 } else { s * 32767.0 };
        bytes.extend_from_slice(&(v.round() as i16).to_le_bytes());
    }
    bytes
}

/// Converts little-endian PCM16 bytes back to float samples, scaled by
/// `1/32768`. A trailing odd byte is ignored.
pub fn decode_pcm16(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|chunk| {
            let v = i16::from_le_bytes([chunk[0], chunk[1]]);
            (v as f32 / 32768.0).clamp(-1.0, 1.0)
        })
        .collect()
}

/// Encodes a float sample buffer as a base64 PCM16 transport frame.
pub fn encode_frame(samples: &[f32]) -> String {
    base64::engine::general_purpose::STANDARD.encode(encode_pcm16(samples))
}

/// Decodes a base64 PCM16 transport frame into float samples. A malformed
/// frame decodes to an empty buffer rather than failing the stream.
pub fn decode_frame(frame: &str) -> Vec<f32> {
    match base64::engine::general_purpose::STANDARD.decode(frame) {
        Ok(pcm16) => decode_pcm16(&pcm16),
        Err(e) => {
            tracing::error!("failed to decode base64 audio frame: {}", e);
            Vec::new()
        }
    }
}

/// Splits a slice of audio samples into fixed-size chunks, zero-padding the
/// final chunk.
pub fn split_for_chunks(samples: &[f32], chunk_size: usize) -> Vec<Vec<f32>> {
    samples
        .chunks(chunk_size)
        .map(|chunk| {
            let mut chunk = chunk.to_vec();
            chunk.resize(chunk_size, 0.0);
            chunk
        })
        .collect()
}

/// Creates a new ring buffer on the heap for shared audio data.
pub fn shared_buffer(size: usize) -> HeapRb<f32> {
    HeapRb::new(size)
}

/// Creates a resampler for the playback path, converting the service rate to
/// the output device rate.
pub fn create_resampler(
    in_sampling_rate: f64,
    out_sampling_rate: f64,
    chunk_size: usize,
) -> anyhow::Result<FastFixedIn<f32>> {
    let resampler = FastFixedIn::<f32>::new(
        out_sampling_rate / in_sampling_rate,
        1.0,
        PolynomialDegree::Cubic,
        chunk_size,
        1,
    )?;
    Ok(resampler)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resample_output_length_matches_rate_ratio() {
        let input = vec![0.0f32; 4096];
        let cases = [
            (48000.0, 24000.0),
            (44100.0, 24000.0),
            (24000.0, 48000.0),
            (22050.0, 24000.0),
        ];
        for (src, dst) in cases {
            let out = resample_linear(&input, src, dst);
            let expected = (input.len() as f64 / (src / dst)).round() as usize;
            assert_eq!(out.len(), expected, "rates {}->{}", src, dst);
        }
    }

    #[test]
    fn resample_at_equal_rates_is_identity() {
        let input: Vec<f32> = (0..512).map(|i| (i as f32 / 512.0).sin()).collect();
        assert_eq!(resample_linear(&input, 24000.0, 24000.0), input);
    }

    #[test]
    fn resample_interpolates_between_neighbours() {
        // Halving the rate picks every second sample; doubling it lands the
        // odd outputs exactly between neighbours.
        let input = vec![0.0, 1.0, 0.0, 1.0];
        let down = resample_linear(&input, 48000.0, 24000.0);
        assert_eq!(down, vec![0.0, 0.0]);

        let up = resample_linear(&[0.0, 1.0], 24000.0, 48000.0);
        assert_eq!(up.len(), 4);
        assert!((up[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn resample_empty_input_is_empty() {
        assert!(resample_linear(&[], 48000.0, 24000.0).is_empty());
    }

    #[test]
    fn pcm16_round_trip_stays_within_one_step() {
        let samples = [-1.0f32, -0.5, -0.1, 0.0, 0.1, 0.25, 0.5, 1.0];
        let decoded = decode_pcm16(&encode_pcm16(&samples));
        assert_eq!(decoded.len(), samples.len());
        for (orig, got) in samples.iter().zip(decoded.iter()) {
            assert!(
                (orig - got).abs() <= 1.0 / 32768.0 + f32::EPSILON,
                "sample {} decoded as {}",
                orig,
                got
            );
        }
    }

    #[test]
    fn pcm16_encode_clamps_out_of_range_input() {
        let bytes = encode_pcm16(&[2.0, -2.0]);
        assert_eq!(bytes.len(), 4);
        let decoded = decode_pcm16(&bytes);
        assert!((decoded[0] - 32767.0 / 32768.0).abs() < 1e-6);
        assert_eq!(decoded[1], -1.0);
    }

    #[test]
    fn frame_round_trip() {
        let samples = vec![0.0f32, 0.25, -0.25, 0.5];
        let frame = encode_frame(&samples);
        let decoded = decode_frame(&frame);
        assert_eq!(decoded.len(), samples.len());
        for (orig, got) in samples.iter().zip(decoded.iter()) {
            assert!((orig - got).abs() <= 1.0 / 32768.0 + f32::EPSILON);
        }
    }

    #[test]
    fn malformed_frame_decodes_empty() {
        assert!(decode_frame("not base64!!!").is_empty());
    }

    #[test]
    fn split_pads_final_chunk() {
        let chunks = split_for_chunks(&[1.0, 2.0, 3.0], 2);
        assert_eq!(chunks, vec![vec![1.0, 2.0], vec![3.0, 0.0]]);
    }
}
