//! Sample transformation: waveform features from clips, label ids from
//! transcripts.

use crate::corpus::SampleRecord;
use crate::error::{TrainingError, TrainingResult};
use std::collections::HashMap;
use std::path::Path;

pub const PAD_ID: i64 = 0;
pub const UNK_ID: i64 = 1;
pub const WORD_SEP_ID: i64 = 2;

/// Character-level label tokenizer.
///
/// Vocabulary layout follows the usual CTC convention: `<pad>` at 0,
/// `<unk>` at 1, the word separator `|` at 2, then the character inventory.
#[derive(Debug, Clone)]
pub struct Tokenizer {
    id_by_char: HashMap<char, i64>,
    char_by_id: HashMap<i64, char>,
}

impl Tokenizer {
    fn from_chars(chars: impl IntoIterator<Item = char>) -> Self {
        let mut id_by_char = HashMap::new();
        let mut char_by_id = HashMap::new();
        let mut next_id = WORD_SEP_ID + 1;
        for c in chars {
            if id_by_char.contains_key(&c) {
                continue;
            }
            id_by_char.insert(c, next_id);
            char_by_id.insert(next_id, c);
            next_id += 1;
        }
        Self { id_by_char, char_by_id }
    }

    /// Lowercase English letters plus apostrophe.
    #[must_use]
    pub fn english() -> Self {
        Self::from_chars(('a'..='z').chain(std::iter::once('\'')))
    }

    /// Load a `vocab.json` token-to-id map.
    ///
    /// Multi-character entries other than the reserved `<pad>`/`<unk>`
    /// specials are rejected; `|` keeps its role as word separator.
    pub fn from_vocab_file(path: &Path) -> TrainingResult<Self> {
        let data = std::fs::read_to_string(path)?;
        let raw: HashMap<String, i64> = serde_json::from_str(&data)?;

        let mut id_by_char = HashMap::new();
        let mut char_by_id = HashMap::new();
        for (token, id) in raw {
            match token.as_str() {
                "<pad>" | "<unk>" | "<s>" | "</s>" | "|" => continue,
                _ => {}
            }
            let mut chars = token.chars();
            let (Some(c), None) = (chars.next(), chars.next()) else {
                return Err(TrainingError::Transform(format!(
                    "vocab token is not a single character: {token:?}"
                )));
            };
            if id <= WORD_SEP_ID {
                return Err(TrainingError::Transform(format!(
                    "vocab id {id} for {token:?} collides with reserved ids"
                )));
            }
            id_by_char.insert(c, id);
            char_by_id.insert(id, c);
        }

        Ok(Self { id_by_char, char_by_id })
    }

    #[must_use]
    pub fn pad_id(&self) -> i64 {
        PAD_ID
    }

    /// Encode a transcript to label ids, `|` between words.
    #[must_use]
    pub fn encode(&self, text: &str) -> Vec<i64> {
        let lowered = text.to_lowercase();
        let mut ids = Vec::new();
        for (word_idx, word) in lowered.split_whitespace().enumerate() {
            if word_idx > 0 {
                ids.push(WORD_SEP_ID);
            }
            for c in word.chars() {
                ids.push(self.id_by_char.get(&c).copied().unwrap_or(UNK_ID));
            }
        }
        ids
    }

    /// Decode label ids back to text. Pad and unk ids are skipped.
    #[must_use]
    pub fn decode(&self, ids: &[i64]) -> String {
        let mut text = String::new();
        for &id in ids {
            match id {
                PAD_ID | UNK_ID => {}
                WORD_SEP_ID => text.push(' '),
                _ => {
                    if let Some(&c) = self.char_by_id.get(&id) {
                        text.push(c);
                    }
                }
            }
        }
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

/// Idempotent per-record transform: derived fields already present are
/// kept as-is, missing ones are computed.
pub trait SampleTransform: Send + Sync {
    fn transform(&self, record: &SampleRecord) -> TrainingResult<SampleRecord>;
}

/// Default transform: hound-decoded mono waveform features plus
/// character-level labels.
#[derive(Debug, Clone)]
pub struct AudioTransform {
    tokenizer: Tokenizer,
}

impl AudioTransform {
    #[must_use]
    pub fn new(tokenizer: Tokenizer) -> Self {
        Self { tokenizer }
    }
}

impl SampleTransform for AudioTransform {
    fn transform(&self, record: &SampleRecord) -> TrainingResult<SampleRecord> {
        let mut out = record.clone();
        if out.features.is_none() {
            out.features = Some(read_waveform(&record.audio_path)?);
        }
        if out.labels.is_none() {
            out.labels = Some(self.tokenizer.encode(&record.transcript));
        }
        Ok(out)
    }
}

/// Decode a WAV clip to a peak-normalized mono f32 waveform.
pub fn read_waveform(path: &Path) -> TrainingResult<Vec<f32>> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => {
            reader.samples::<f32>().collect::<Result<_, _>>()?
        }
        hound::SampleFormat::Int => {
            let scale = f64::from(1u32 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()?
        }
    };

    let channels = usize::from(spec.channels.max(1));
    let mut mono = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    };

    let peak = mono.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
    if peak > 0.0 {
        for s in &mut mono {
            *s /= peak;
        }
    }
    Ok(mono)
}

#[cfg(test)]
pub(crate) fn write_test_wav(path: &Path, samples: &[i16]) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 16_000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for &s in samples {
        writer.write_sample(s).unwrap();
    }
    writer.finalize().unwrap();
}
