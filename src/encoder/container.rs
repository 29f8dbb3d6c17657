//! Interleaved media container
//!
//! Layout, all integers little-endian:
//!
//! ```text
//! header  : "CSMX" version:u16 width:u32 height:u32 fps:u32 quality:u32 flags:u8
//! record  : tag:u8 timestamp_ms:u64 len:u32 payload[len]
//! trailer : 0xFF video_count:u64 audio_count:u64 last_timestamp_ms:u64
//! ```
//!
//! Video payloads are the frame bytes. Audio payloads are
//! `sample_rate:u32 channels:u16` followed by the i16 samples. The file is
//! written as `<output>.part` and renamed into place on finalize. Audio is
//! also written to a `<stem>.audio.wav` stem.

use super::backend::MediaEncoder;
use crate::media::{AudioBatch, MediaUnit, VideoFrame};
use crate::session::SessionConfig;
use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const MAGIC: &[u8; 4] = b"CSMX";
const VERSION: u16 = 1;
const TAG_VIDEO: u8 = 1;
const TAG_AUDIO: u8 = 2;
const TAG_TRAILER: u8 = 0xFF;
const FLAG_AUDIO: u8 = 0b1;

/// Path of the audio stem written next to `output`
pub fn audio_stem_path(output: &Path) -> PathBuf {
    output.with_extension("audio.wav")
}

fn part_path(output: &Path) -> PathBuf {
    let mut name = output.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

/// Writes the audio stem as a 16-bit WAV file
struct StemWriter {
    writer: Option<hound::WavWriter<BufWriter<File>>>,
    path: PathBuf,
    sample_rate: u32,
    channels: u16,
}

impl StemWriter {
    fn create(path: PathBuf, sample_rate: u32, channels: u16) -> Result<Self> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let writer = hound::WavWriter::create(&path, spec)
            .with_context(|| format!("Failed to create WAV stem: {:?}", path))?;

        Ok(Self {
            writer: Some(writer),
            path,
            sample_rate,
            channels,
        })
    }

    fn write_batch(&mut self, batch: &AudioBatch) -> Result<()> {
        if batch.sample_rate != self.sample_rate || batch.channels != self.channels {
            anyhow::bail!(
                "Audio format changed mid-recording: {}Hz/{}ch, expected {}Hz/{}ch",
                batch.sample_rate,
                batch.channels,
                self.sample_rate,
                self.channels
            );
        }

        if let Some(writer) = &mut self.writer {
            for &sample in &batch.samples {
                writer
                    .write_sample(sample)
                    .context("Failed to write sample to WAV stem")?;
            }
        }
        Ok(())
    }

    fn finish(mut self) -> Result<PathBuf> {
        if let Some(writer) = self.writer.take() {
            writer.finalize().context("Failed to finalize WAV stem")?;
        }
        Ok(self.path.clone())
    }
}

impl Drop for StemWriter {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            if let Err(e) = writer.finalize() {
                warn!("Failed to finalize WAV stem on drop: {}", e);
            }
        }
    }
}

struct OpenContainer {
    output: PathBuf,
    part: PathBuf,
    writer: BufWriter<File>,
    capture_audio: bool,
    stem: Option<StemWriter>,
    video_count: u64,
    audio_count: u64,
    last_timestamp_ms: u64,
}

impl OpenContainer {
    fn create(config: &SessionConfig) -> Result<Self> {
        let output = config.output_path.clone();
        let part = part_path(&output);
        let file = File::create(&part)
            .with_context(|| format!("Failed to create {}", part.display()))?;
        let mut writer = BufWriter::new(file);

        let flags = if config.capture_audio { FLAG_AUDIO } else { 0 };
        writer.write_all(MAGIC)?;
        writer.write_all(&VERSION.to_le_bytes())?;
        writer.write_all(&config.width.to_le_bytes())?;
        writer.write_all(&config.height.to_le_bytes())?;
        writer.write_all(&config.fps.to_le_bytes())?;
        writer.write_all(&config.quality.to_le_bytes())?;
        writer.write_all(&[flags])?;

        Ok(Self {
            output,
            part,
            writer,
            capture_audio: config.capture_audio,
            stem: None,
            video_count: 0,
            audio_count: 0,
            last_timestamp_ms: 0,
        })
    }

    fn write_record(&mut self, tag: u8, timestamp_ms: u64, payload: &[u8]) -> Result<()> {
        let len = u32::try_from(payload.len()).context("Record payload too large")?;
        self.writer.write_all(&[tag])?;
        self.writer.write_all(&timestamp_ms.to_le_bytes())?;
        self.writer.write_all(&len.to_le_bytes())?;
        self.writer.write_all(payload)?;
        self.last_timestamp_ms = self.last_timestamp_ms.max(timestamp_ms);
        Ok(())
    }

    fn write_unit(&mut self, unit: MediaUnit) -> Result<()> {
        match unit {
            MediaUnit::Video(frame) => self.write_video(frame),
            MediaUnit::Audio(batch) => {
                if !self.capture_audio {
                    anyhow::bail!("Audio unit received but audio capture is disabled");
                }
                self.write_audio(batch)
            }
        }
    }

    fn write_video(&mut self, frame: VideoFrame) -> Result<()> {
        self.write_record(TAG_VIDEO, frame.timestamp_ms, &frame.data)
            .context("Failed to write video record")?;
        self.video_count += 1;
        Ok(())
    }

    fn write_audio(&mut self, batch: AudioBatch) -> Result<()> {
        let mut payload = Vec::with_capacity(6 + batch.samples.len() * 2);
        payload.extend_from_slice(&batch.sample_rate.to_le_bytes());
        payload.extend_from_slice(&batch.channels.to_le_bytes());
        for sample in &batch.samples {
            payload.extend_from_slice(&sample.to_le_bytes());
        }
        self.write_record(TAG_AUDIO, batch.timestamp_ms, &payload)
            .context("Failed to write audio record")?;

        if self.stem.is_none() {
            let path = audio_stem_path(&self.output);
            self.stem = Some(StemWriter::create(path, batch.sample_rate, batch.channels)?);
        }
        if let Some(stem) = &mut self.stem {
            stem.write_batch(&batch)?;
        }

        self.audio_count += 1;
        Ok(())
    }

    /// Write the trailer, sync and move the file into place
    fn finish(mut self) -> Result<Vec<PathBuf>> {
        self.writer.write_all(&[TAG_TRAILER])?;
        self.writer.write_all(&self.video_count.to_le_bytes())?;
        self.writer.write_all(&self.audio_count.to_le_bytes())?;
        self.writer.write_all(&self.last_timestamp_ms.to_le_bytes())?;

        let file = self
            .writer
            .into_inner()
            .map_err(|e| e.into_error())
            .context("Failed to flush container")?;
        file.sync_all().context("Failed to sync container")?;
        drop(file);

        fs::rename(&self.part, &self.output).with_context(|| {
            format!(
                "Failed to move {} into place at {}",
                self.part.display(),
                self.output.display()
            )
        })?;

        let mut files = vec![self.output.clone()];
        if let Some(stem) = self.stem.take() {
            files.push(stem.finish()?);
        }

        info!(
            "Container finalized: {} ({} video frames, {} audio batches, {:.1}s)",
            self.output.display(),
            self.video_count,
            self.audio_count,
            self.last_timestamp_ms as f64 / 1000.0
        );
        Ok(files)
    }

    /// Remove the partial file and any audio stem
    fn discard(mut self) -> Result<()> {
        drop(self.writer);
        fs::remove_file(&self.part)
            .with_context(|| format!("Failed to remove {}", self.part.display()))?;

        if let Some(stem) = self.stem.take() {
            let path = stem.path.clone();
            drop(stem);
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove {}", path.display()))?;
        }

        info!("Container discarded: {}", self.output.display());
        Ok(())
    }
}

/// Encoder writing the interleaved container
///
/// File I/O runs on tokio's blocking pool so a slow disk never stalls the
/// runtime workers.
#[derive(Default)]
pub struct ContainerWriter {
    open: Option<OpenContainer>,
    finalized: bool,
}

impl ContainerWriter {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl MediaEncoder for ContainerWriter {
    async fn open(&mut self, config: &SessionConfig) -> Result<()> {
        if self.open.is_some() || self.finalized {
            anyhow::bail!("Container writer already used");
        }

        let owned = config.clone();
        let open = tokio::task::spawn_blocking(move || OpenContainer::create(&owned))
            .await
            .context("Container open task failed")??;

        info!(
            "Container opened: {} ({}x{} @ {} fps, quality {})",
            open.output.display(),
            config.width,
            config.height,
            config.fps,
            config.quality
        );
        self.open = Some(open);
        Ok(())
    }

    async fn write(&mut self, unit: MediaUnit) -> Result<()> {
        let mut open = self.open.take().context("Container is not open")?;
        let (open, result) = tokio::task::spawn_blocking(move || {
            let result = open.write_unit(unit);
            (open, result)
        })
        .await
        .context("Container write task failed")?;

        self.open = Some(open);
        result
    }

    async fn finalize(&mut self) -> Result<Vec<PathBuf>> {
        let open = self.open.take().context("Container is not open")?;
        self.finalized = true;

        tokio::task::spawn_blocking(move || open.finish())
            .await
            .context("Container finalize task failed")?
    }

    async fn abort(&mut self) -> Result<()> {
        let Some(open) = self.open.take() else {
            return Ok(());
        };
        self.finalized = true;

        tokio::task::spawn_blocking(move || open.discard())
            .await
            .context("Container discard task failed")?
    }

    fn name(&self) -> &str {
        "container"
    }
}

/// What a finalized container holds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSummary {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub quality: u32,
    pub has_audio: bool,
    /// Video timestamps in file order
    pub video_timestamps: Vec<u64>,
    /// Audio timestamps in file order
    pub audio_timestamps: Vec<u64>,
    /// Total audio samples across all batches
    pub audio_samples: u64,
    pub last_timestamp_ms: u64,
}

fn read_array<const N: usize>(reader: &mut impl Read) -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

fn read_u16(reader: &mut impl Read) -> Result<u16> {
    Ok(u16::from_le_bytes(read_array(reader)?))
}

fn read_u32(reader: &mut impl Read) -> Result<u32> {
    Ok(u32::from_le_bytes(read_array(reader)?))
}

fn read_u64(reader: &mut impl Read) -> Result<u64> {
    Ok(u64::from_le_bytes(read_array(reader)?))
}

/// Read back a finalized container
pub fn inspect(path: impl AsRef<Path>) -> Result<ContainerSummary> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut reader = BufReader::new(file);

    let magic: [u8; 4] = read_array(&mut reader).context("Missing header")?;
    if &magic != MAGIC {
        anyhow::bail!("Not a container file: {}", path.display());
    }
    let version = read_u16(&mut reader)?;
    if version != VERSION {
        anyhow::bail!("Unsupported container version {}", version);
    }

    let mut summary = ContainerSummary {
        width: read_u32(&mut reader)?,
        height: read_u32(&mut reader)?,
        fps: read_u32(&mut reader)?,
        quality: read_u32(&mut reader)?,
        has_audio: read_array::<1>(&mut reader)?[0] & FLAG_AUDIO != 0,
        video_timestamps: Vec::new(),
        audio_timestamps: Vec::new(),
        audio_samples: 0,
        last_timestamp_ms: 0,
    };

    loop {
        let [tag] = read_array::<1>(&mut reader).context("Container is truncated (no trailer)")?;
        match tag {
            TAG_VIDEO | TAG_AUDIO => {
                let timestamp_ms = read_u64(&mut reader)?;
                let len = read_u32(&mut reader)? as usize;
                let mut payload = vec![0u8; len];
                reader
                    .read_exact(&mut payload)
                    .context("Record payload is truncated")?;

                if tag == TAG_VIDEO {
                    summary.video_timestamps.push(timestamp_ms);
                } else {
                    if len < 6 {
                        anyhow::bail!("Audio record too short");
                    }
                    summary.audio_samples += ((len - 6) / 2) as u64;
                    summary.audio_timestamps.push(timestamp_ms);
                }
            }
            TAG_TRAILER => {
                let video_count = read_u64(&mut reader)?;
                let audio_count = read_u64(&mut reader)?;
                summary.last_timestamp_ms = read_u64(&mut reader)?;
                if video_count != summary.video_timestamps.len() as u64
                    || audio_count != summary.audio_timestamps.len() as u64
                {
                    anyhow::bail!(
                        "Trailer counts {}/{} do not match records {}/{}",
                        video_count,
                        audio_count,
                        summary.video_timestamps.len(),
                        summary.audio_timestamps.len()
                    );
                }
                return Ok(summary);
            }
            other => anyhow::bail!("Unknown record tag {:#x}", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config(dir: &TempDir, capture_audio: bool) -> SessionConfig {
        SessionConfig {
            output_path: dir.path().join("clip.mp4"),
            width: 640,
            height: 360,
            capture_audio,
            ..Default::default()
        }
    }

    fn frame(ts: u64) -> MediaUnit {
        MediaUnit::Video(VideoFrame {
            data: vec![1, 2, 3],
            width: 640,
            height: 360,
            timestamp_ms: ts,
        })
    }

    fn batch(ts: u64) -> MediaUnit {
        MediaUnit::Audio(AudioBatch {
            samples: vec![0; 960],
            sample_rate: 48000,
            channels: 2,
            timestamp_ms: ts,
        })
    }

    #[tokio::test]
    async fn test_finalize_renames_and_writes_stem() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir, true);
        let mut writer = ContainerWriter::new();

        writer.open(&config).await.unwrap();
        assert!(part_path(&config.output_path).exists());
        assert!(!config.output_path.exists());

        writer.write(frame(0)).await.unwrap();
        writer.write(batch(5)).await.unwrap();
        writer.write(frame(33)).await.unwrap();
        let files = writer.finalize().await.unwrap();

        assert_eq!(files, vec![config.output_path.clone(), dir.path().join("clip.audio.wav")]);
        assert!(!part_path(&config.output_path).exists());

        let summary = inspect(&config.output_path).unwrap();
        assert_eq!((summary.width, summary.height), (640, 360));
        assert!(summary.has_audio);
        assert_eq!(summary.video_timestamps, vec![0, 33]);
        assert_eq!(summary.audio_timestamps, vec![5]);
        assert_eq!(summary.audio_samples, 960);
        assert_eq!(summary.last_timestamp_ms, 33);

        let stem = hound::WavReader::open(dir.path().join("clip.audio.wav")).unwrap();
        assert_eq!(stem.spec().sample_rate, 48000);
        assert_eq!(stem.len(), 960);
    }

    #[tokio::test]
    async fn test_audio_rejected_when_disabled() {
        let dir = TempDir::new().unwrap();
        let mut writer = ContainerWriter::new();
        writer.open(&config(&dir, false)).await.unwrap();
        assert!(writer.write(batch(0)).await.is_err());
    }

    #[tokio::test]
    async fn test_unfinalized_container_is_not_readable() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir, false);
        let mut writer = ContainerWriter::new();
        writer.open(&config).await.unwrap();
        writer.write(frame(0)).await.unwrap();

        assert!(inspect(part_path(&config.output_path)).is_err());
    }

    #[tokio::test]
    async fn test_abort_removes_partial_output() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir, true);
        let mut writer = ContainerWriter::new();

        writer.open(&config).await.unwrap();
        writer.write(batch(0)).await.unwrap();
        writer.abort().await.unwrap();

        assert!(!part_path(&config.output_path).exists());
        assert!(!config.output_path.exists());
        assert!(!audio_stem_path(&config.output_path).exists());
        // A discarded writer cannot be finalized afterwards
        assert!(writer.finalize().await.is_err());
    }

    #[tokio::test]
    async fn test_abort_before_open_is_a_no_op() {
        let mut writer = ContainerWriter::new();
        writer.abort().await.unwrap();
    }

    #[tokio::test]
    async fn test_write_before_open_fails() {
        let mut writer = ContainerWriter::new();
        assert!(writer.write(frame(0)).await.is_err());
        assert!(writer.finalize().await.is_err());
    }
}
