use std::fs;
use std::path::Path;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, Rgba, RgbaImage};
use serde_json::json;
use souschef_contracts::errors::ProviderError;
use souschef_contracts::events::EventWriter;
use souschef_contracts::preferences::ImagePayload;

use crate::event_fields;
use crate::providers::{ContentProvider, MediaBytes};

pub const MAX_PANTRY_IMAGE_DIM: u32 = 1024;
pub const DEFAULT_MEDIA_ATTEMPTS: usize = 3;
pub const DEFAULT_PCM_SAMPLE_RATE: u32 = 24_000;

/// Decoded media attached to an artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaAsset {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl MediaAsset {
    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, BASE64.encode(&self.bytes))
    }

    pub fn extension(&self) -> &'static str {
        let mime = self.mime_type.to_ascii_lowercase();
        match mime.split(';').next().unwrap_or_default().trim() {
            "image/png" => "png",
            "image/jpeg" | "image/jpg" => "jpg",
            "image/webp" => "webp",
            "audio/wav" | "audio/x-wav" | "audio/wave" => "wav",
            "audio/mpeg" | "audio/mp3" => "mp3",
            _ => "bin",
        }
    }
}

pub fn decode_data_uri(uri: &str) -> Result<MediaAsset> {
    let Some(rest) = uri.trim().strip_prefix("data:") else {
        bail!("not a data URI");
    };
    let Some((header, data)) = rest.split_once(',') else {
        bail!("data URI has no payload");
    };
    let Some(mime_type) = header.strip_suffix(";base64") else {
        bail!("only base64 data URIs are supported");
    };
    let bytes = BASE64
        .decode(data.as_bytes())
        .context("data URI payload is not valid base64")?;
    Ok(MediaAsset {
        mime_type: mime_type.to_string(),
        bytes,
    })
}

/// Sample rate of a raw PCM mime type such as `audio/L16;codec=pcm;rate=24000`,
/// or `None` when the mime type is already a container format.
fn pcm_sample_rate(mime_type: &str) -> Option<u32> {
    let lowered = mime_type.to_ascii_lowercase();
    let mut parts = lowered.split(';').map(str::trim);
    let base = parts.next().unwrap_or_default();
    if base != "audio/l16" && base != "audio/pcm" {
        return None;
    }
    let rate = parts
        .filter_map(|part| part.strip_prefix("rate="))
        .find_map(|value| value.parse::<u32>().ok())
        .unwrap_or(DEFAULT_PCM_SAMPLE_RATE);
    Some(rate)
}

/// Wraps 16-bit little-endian mono PCM in a RIFF/WAVE container.
pub fn pcm_to_wav(pcm: &[u8], sample_rate: u32) -> Vec<u8> {
    let channels: u16 = 1;
    let bits_per_sample: u16 = 16;
    let block_align = channels * bits_per_sample / 8;
    let byte_rate = sample_rate * u32::from(block_align);
    let data_len = pcm.len() as u32;

    let mut wav = Vec::with_capacity(44 + pcm.len());
    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&(36 + data_len).to_le_bytes());
    wav.extend_from_slice(b"WAVE");
    wav.extend_from_slice(b"fmt ");
    wav.extend_from_slice(&16u32.to_le_bytes());
    wav.extend_from_slice(&1u16.to_le_bytes());
    wav.extend_from_slice(&channels.to_le_bytes());
    wav.extend_from_slice(&sample_rate.to_le_bytes());
    wav.extend_from_slice(&byte_rate.to_le_bytes());
    wav.extend_from_slice(&block_align.to_le_bytes());
    wav.extend_from_slice(&bits_per_sample.to_le_bytes());
    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&data_len.to_le_bytes());
    wav.extend_from_slice(pcm);
    wav
}

/// Loads a pantry photo for upload: transparent pixels are flattened onto
/// white, the image is bounded to `MAX_PANTRY_IMAGE_DIM` and re-encoded as
/// JPEG. Files the decoder cannot read are sent as-is.
pub fn prepare_pantry_image(path: &Path) -> Result<ImagePayload> {
    if let Ok(image) = image::open(path) {
        let rgba = image.to_rgba8();
        let mut flattened = RgbaImage::new(rgba.width(), rgba.height());
        for (x, y, pixel) in rgba.enumerate_pixels() {
            let alpha = u16::from(pixel[3]);
            let over_white =
                |channel: u8| -> u8 {
                    ((u16::from(channel) * alpha + 255 * (255 - alpha)) / 255) as u8
                };
            flattened.put_pixel(
                x,
                y,
                Rgba([over_white(pixel[0]), over_white(pixel[1]), over_white(pixel[2]), 255]),
            );
        }
        let mut image = DynamicImage::ImageRgba8(flattened);
        if image.width() > MAX_PANTRY_IMAGE_DIM || image.height() > MAX_PANTRY_IMAGE_DIM {
            image = image.resize(MAX_PANTRY_IMAGE_DIM, MAX_PANTRY_IMAGE_DIM, FilterType::Triangle);
        }
        let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
        let mut bytes = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut bytes, 90);
        if encoder.encode_image(&rgb).is_ok() {
            return Ok(ImagePayload {
                mime_type: "image/jpeg".to_string(),
                base64_data: BASE64.encode(bytes),
            });
        }
    }

    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    if bytes.is_empty() {
        bail!("{} is empty", path.display());
    }
    Ok(ImagePayload {
        mime_type: guess_image_mime(path).to_string(),
        base64_data: BASE64.encode(bytes),
    })
}

fn guess_image_mime(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "heic" | "heif" => "image/heic",
        _ => "image/png",
    }
}

/// Bounded-retry media rendering. Failures never propagate: after the last
/// attempt the caller receives `None`.
pub struct MediaAugmenter<'a> {
    provider: &'a dyn ContentProvider,
    image_model: &'a str,
    audio_model: &'a str,
    attempts: usize,
    backoff: Duration,
    events: &'a EventWriter,
}

impl<'a> MediaAugmenter<'a> {
    pub fn new(
        provider: &'a dyn ContentProvider,
        image_model: &'a str,
        audio_model: &'a str,
        events: &'a EventWriter,
    ) -> Self {
        Self {
            provider,
            image_model,
            audio_model,
            attempts: DEFAULT_MEDIA_ATTEMPTS,
            backoff: Duration::from_millis(500),
            events,
        }
    }

    pub fn with_retry_policy(mut self, attempts: usize, backoff: Duration) -> Self {
        self.attempts = attempts.max(1);
        self.backoff = backoff;
        self
    }

    fn with_retries<F>(&self, kind: &str, label: &str, call: F) -> Option<MediaBytes>
    where
        F: Fn() -> Result<MediaBytes, ProviderError>,
    {
        for attempt in 1..=self.attempts {
            match call() {
                Ok(media) if !media.bytes.is_empty() => return Some(media),
                Ok(_) => self.note_failure(kind, label, attempt, "empty media payload"),
                Err(err) => {
                    self.note_failure(kind, label, attempt, &err.to_string());
                    // Retrying cannot fix a blocked prompt or a bad key.
                    if !err.is_retryable() {
                        return None;
                    }
                }
            }
            if attempt < self.attempts {
                thread::sleep(self.backoff * attempt as u32);
            }
        }
        None
    }

    fn note_failure(&self, kind: &str, label: &str, attempt: usize, error: &str) {
        self.events.note(
            "media_attempt_failed",
            event_fields(json!({
                "kind": kind,
                "label": label,
                "attempt": attempt,
                "max_attempts": self.attempts,
                "error": error,
            })),
        );
    }

    pub fn render_image(&self, label: &str, prompt: &str) -> Option<MediaAsset> {
        let media = self.with_retries("image", label, || {
            self.provider.generate_image(self.image_model, prompt)
        })?;
        self.events.note(
            "media_ready",
            event_fields(json!({ "kind": "image", "label": label, "mime_type": media.mime_type })),
        );
        Some(MediaAsset {
            mime_type: media.mime_type,
            bytes: media.bytes,
        })
    }

    /// Speech for `text`; raw PCM answers come back as WAV.
    pub fn render_speech(&self, label: &str, text: &str) -> Option<MediaAsset> {
        let media = self.with_retries("audio", label, || {
            self.provider.synthesize_speech(self.audio_model, text)
        })?;
        let asset = match pcm_sample_rate(&media.mime_type) {
            Some(rate) => MediaAsset {
                mime_type: "audio/wav".to_string(),
                bytes: pcm_to_wav(&media.bytes, rate),
            },
            None => MediaAsset {
                mime_type: media.mime_type,
                bytes: media.bytes,
            },
        };
        self.events.note(
            "media_ready",
            event_fields(json!({ "kind": "audio", "label": label, "mime_type": asset.mime_type })),
        );
        Some(asset)
    }

    /// Renders every image prompt on its own thread, with the optional speech
    /// request running alongside the batch. Output order follows `images`.
    pub fn render_batch(
        &self,
        images: &[(String, String)],
        speech: Option<(&str, &str)>,
    ) -> (Vec<Option<MediaAsset>>, Option<MediaAsset>) {
        thread::scope(|scope| {
            let image_handles: Vec<_> = images
                .iter()
                .map(|(label, prompt)| scope.spawn(move || self.render_image(label, prompt)))
                .collect();
            let speech_handle =
                speech.map(|(label, text)| scope.spawn(move || self.render_speech(label, text)));

            let rendered = image_handles
                .into_iter()
                .map(|handle| handle.join().ok().flatten())
                .collect();
            let audio = speech_handle.and_then(|handle| handle.join().ok().flatten());
            (rendered, audio)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use image::RgbaImage;
    use souschef_contracts::errors::ProviderError;

    use super::*;
    use crate::providers::{DryrunProvider, TextRequest};

    struct FlakyMedia {
        calls: AtomicUsize,
        failure: ProviderError,
    }

    impl FlakyMedia {
        fn new(failure: ProviderError) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                failure,
            }
        }
    }

    impl ContentProvider for FlakyMedia {
        fn name(&self) -> &str {
            "flaky"
        }

        fn generate_text(&self, _request: &TextRequest<'_>) -> Result<String, ProviderError> {
            Err(self.failure.clone())
        }

        fn generate_image(&self, _model: &str, _prompt: &str) -> Result<MediaBytes, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(self.failure.clone())
        }

        fn synthesize_speech(
            &self,
            _model: &str,
            _text: &str,
        ) -> Result<MediaBytes, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(self.failure.clone())
        }

        fn embed(&self, _model: &str, _text: &str) -> Result<Vec<f32>, ProviderError> {
            Err(self.failure.clone())
        }
    }

    fn events(temp: &tempfile::TempDir) -> EventWriter {
        EventWriter::new(temp.path().join("events.jsonl"), "test-session")
    }

    #[test]
    fn three_failed_attempts_leave_media_empty() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let events = events(&temp);
        let provider = FlakyMedia::new(ProviderError::Transient("503".to_string()));
        let augmenter = MediaAugmenter::new(&provider, "img", "tts", &events)
            .with_retry_policy(3, Duration::ZERO);
        assert_eq!(augmenter.render_image("recipe", "soup"), None);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);

        let log = fs::read_to_string(events.path())?;
        assert_eq!(log.matches("\"media_attempt_failed\"").count(), 3);
        Ok(())
    }

    #[test]
    fn unsafe_media_is_not_retried() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let events = events(&temp);
        let provider = FlakyMedia::new(ProviderError::Unsafe("SAFETY".to_string()));
        let augmenter = MediaAugmenter::new(&provider, "img", "tts", &events)
            .with_retry_policy(3, Duration::ZERO);
        assert_eq!(augmenter.render_speech("chef_card", "hello"), None);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[test]
    fn batch_keeps_order_and_wraps_pcm_audio() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let events = events(&temp);
        let augmenter =
            MediaAugmenter::new(&DryrunProvider, "dryrun-image-1", "dryrun-audio-1", &events);
        let prompts = vec![
            ("dish-0".to_string(), "dumplings".to_string()),
            ("dish-1".to_string(), "skewers".to_string()),
            ("dish-2".to_string(), "flatbread".to_string()),
        ];
        let (images, audio) = augmenter.render_batch(&prompts, Some(("chef_card", "Sem glúten")));
        assert_eq!(images.len(), 3);
        assert!(images
            .iter()
            .all(|image| image.as_ref().map(MediaAsset::extension) == Some("png")));
        let audio = audio.ok_or_else(|| anyhow::anyhow!("missing audio"))?;
        assert_eq!(audio.mime_type, "audio/wav");
        assert_eq!(&audio.bytes[..4], b"RIFF");
        assert_eq!(&audio.bytes[8..12], b"WAVE");
        Ok(())
    }

    #[test]
    fn wav_header_describes_pcm_payload() {
        let wav = pcm_to_wav(&[0u8; 480], 24_000);
        assert_eq!(wav.len(), 44 + 480);
        assert_eq!(u32::from_le_bytes([wav[24], wav[25], wav[26], wav[27]]), 24_000);
        assert_eq!(u32::from_le_bytes([wav[40], wav[41], wav[42], wav[43]]), 480);
        assert_eq!(pcm_sample_rate("audio/L16;codec=pcm;rate=16000"), Some(16_000));
        assert_eq!(pcm_sample_rate("audio/mpeg"), None);
    }

    #[test]
    fn data_uri_decodes_back_to_asset() -> Result<()> {
        let asset = MediaAsset {
            mime_type: "image/png".to_string(),
            bytes: vec![1, 2, 3],
        };
        let uri = asset.data_uri();
        assert!(uri.starts_with("data:image/png;base64,"));
        assert_eq!(decode_data_uri(&uri)?, asset);
        assert!(decode_data_uri("https://example.test/a.png").is_err());
        Ok(())
    }

    #[test]
    fn pantry_photo_is_flattened_bounded_and_jpeg() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("pantry.png");
        RgbaImage::from_pixel(2048, 512, Rgba([10, 200, 30, 0])).save(&path)?;
        let payload = prepare_pantry_image(&path)?;
        assert_eq!(payload.mime_type, "image/jpeg");
        let decoded = image::load_from_memory(&BASE64.decode(payload.base64_data)?)?;
        assert_eq!(decoded.width(), 1024);
        assert_eq!(decoded.height(), 256);
        Ok(())
    }

    #[test]
    fn unreadable_photo_is_sent_raw() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("pantry.webp");
        fs::write(&path, b"not really an image")?;
        let payload = prepare_pantry_image(&path)?;
        assert_eq!(payload.mime_type, "image/webp");
        assert_eq!(BASE64.decode(payload.base64_data)?, b"not really an image".to_vec());
        Ok(())
    }
}
