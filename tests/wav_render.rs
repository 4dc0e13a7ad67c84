#![cfg(feature = "export-wav")]

use anyhow::Result;
use hearnow_audio::platform::wav::WavPlatform;
use hearnow_audio::{AudioFormat, AudioOutput, EngineConfig};
use std::thread;
use std::time::{Duration, Instant};

fn wait_until_drained(output: &AudioOutput) -> bool {
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        if output.samples_pending() == 0 {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    false
}

#[test]
fn renders_8bit_payload_across_refills() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("ramp.wav");
    let platform = WavPlatform::new(&path);

    let output = AudioOutput::open_with(
        &platform,
        AudioFormat::mono_8bit(8_000),
        EngineConfig::default(),
    )?;
    assert_eq!(output.platform(), "wav");

    // More than the pool holds, so the drain thread refills buffers.
    let payload: Vec<u8> = (0..30_000u32).map(|i| (i % 256) as u8).collect();
    output.write(payload.clone())?;
    assert!(wait_until_drained(&output), "payload never drained");
    output.close();

    let mut reader = hound::WavReader::open(&path)?;
    let spec = reader.spec();
    assert_eq!(spec.sample_rate, 8_000);
    assert_eq!(spec.channels, 1);
    assert_eq!(spec.bits_per_sample, 8);

    let samples = reader.samples::<i32>().collect::<Result<Vec<_>, _>>()?;
    let expected: Vec<i32> = payload.iter().map(|&b| i32::from(b) - 128).collect();
    assert_eq!(samples, expected);
    Ok(())
}

#[test]
fn renders_16bit_stereo() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("stereo.wav");

    let output = AudioOutput::open_with(
        &WavPlatform::new(&path),
        AudioFormat::stereo_16bit(44_100),
        EngineConfig::low_latency(),
    )?;

    let frames: Vec<(i16, i16)> = (0..3000i16).map(|i| (i * 7, -i * 3)).collect();
    let mut payload = Vec::with_capacity(frames.len() * 4);
    for &(left, right) in &frames {
        payload.extend_from_slice(&left.to_le_bytes());
        payload.extend_from_slice(&right.to_le_bytes());
    }

    output.write(payload)?;
    assert!(wait_until_drained(&output), "payload never drained");
    output.close();

    let mut reader = hound::WavReader::open(&path)?;
    assert_eq!(reader.spec().channels, 2);
    assert_eq!(reader.spec().bits_per_sample, 16);
    let samples = reader.samples::<i16>().collect::<Result<Vec<_>, _>>()?;
    let expected: Vec<i16> = frames.iter().flat_map(|&(l, r)| [l, r]).collect();
    assert_eq!(samples, expected);
    Ok(())
}

#[test]
fn close_mid_stream_leaves_valid_file() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("partial.wav");

    let output = AudioOutput::open_with(
        &WavPlatform::new(&path),
        AudioFormat::mono_8bit(22_050),
        EngineConfig::default(),
    )?;
    output.write(vec![200; 1_000_000])?;
    output.close();

    let reader = hound::WavReader::open(&path)?;
    assert!(reader.len() <= 1_000_000);
    Ok(())
}
