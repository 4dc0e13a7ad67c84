//! Integer PCM decoding shared by the platform backends
//!
//! Payload bytes never change representation inside the engine; devices that
//! need numeric samples (rodio wants `f32`, hound wants integers) decode here.

use crate::format::SampleResolution;

/// Decode one sample to a signed integer in its native range
///
/// 8-bit unsigned input is re-centred, so `128` becomes `0` and the result
/// lies in `-128..=127`. `bytes` must hold exactly one sample.
pub fn sample_to_i32(resolution: SampleResolution, bytes: &[u8]) -> i32 {
    match resolution {
        SampleResolution::Bits8 => i32::from(bytes[0]) - 128,
        SampleResolution::Bits16 => i32::from(i16::from_le_bytes([bytes[0], bytes[1]])),
        // Place the 24 bits in the top of an i32 and shift back to sign-extend
        SampleResolution::Bits24 => i32::from_le_bytes([0, bytes[0], bytes[1], bytes[2]]) >> 8,
        SampleResolution::Bits32 => i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
    }
}

/// Decode one sample to `[-1.0, 1.0)`
pub fn sample_to_f32(resolution: SampleResolution, bytes: &[u8]) -> f32 {
    let full_scale = (1u64 << (resolution.bits() - 1)) as f64;
    (f64::from(sample_to_i32(resolution, bytes)) / full_scale) as f32
}

/// Iterate the whole samples in `bytes`; trailing bytes that do not form a
/// complete sample are skipped
pub fn samples_i32(resolution: SampleResolution, bytes: &[u8]) -> impl Iterator<Item = i32> + '_ {
    bytes
        .chunks_exact(resolution.bytes())
        .map(move |sample| sample_to_i32(resolution, sample))
}

/// Append the decoded `f32` samples of `bytes` to `out`
///
/// Returns the number of samples appended.
pub fn decode_f32_into(resolution: SampleResolution, bytes: &[u8], out: &mut Vec<f32>) -> usize {
    let before = out.len();
    out.extend(
        bytes
            .chunks_exact(resolution.bytes())
            .map(|sample| sample_to_f32(resolution, sample)),
    );
    out.len() - before
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_8bit_is_unsigned() {
        assert_eq!(sample_to_i32(SampleResolution::Bits8, &[128]), 0);
        assert_eq!(sample_to_i32(SampleResolution::Bits8, &[0]), -128);
        assert_eq!(sample_to_i32(SampleResolution::Bits8, &[255]), 127);
        assert_relative_eq!(sample_to_f32(SampleResolution::Bits8, &[0]), -1.0);
    }

    #[test]
    fn test_16bit_little_endian() {
        assert_eq!(sample_to_i32(SampleResolution::Bits16, &[0x00, 0x80]), -32768);
        assert_eq!(sample_to_i32(SampleResolution::Bits16, &[0x34, 0x12]), 0x1234);
        assert_relative_eq!(
            sample_to_f32(SampleResolution::Bits16, &[0x00, 0x40]),
            0.5
        );
    }

    #[test]
    fn test_24bit_sign_extension() {
        assert_eq!(sample_to_i32(SampleResolution::Bits24, &[0xFF, 0xFF, 0xFF]), -1);
        assert_eq!(
            sample_to_i32(SampleResolution::Bits24, &[0x00, 0x00, 0x80]),
            -8_388_608
        );
        assert_eq!(
            sample_to_i32(SampleResolution::Bits24, &[0xFF, 0xFF, 0x7F]),
            8_388_607
        );
    }

    #[test]
    fn test_32bit_full_scale() {
        let min = i32::MIN.to_le_bytes();
        assert_relative_eq!(sample_to_f32(SampleResolution::Bits32, &min), -1.0);
    }

    #[test]
    fn test_partial_trailing_sample_is_skipped() {
        let bytes = [0x00, 0x40, 0x00, 0xC0, 0x7F];
        let decoded: Vec<i32> = samples_i32(SampleResolution::Bits16, &bytes).collect();
        assert_eq!(decoded, vec![0x4000, -0x4000]);

        let mut out = vec![1.0];
        assert_eq!(decode_f32_into(SampleResolution::Bits16, &bytes, &mut out), 2);
        assert_eq!(out.len(), 3);
        assert_relative_eq!(out[2], -0.5);
    }
}
