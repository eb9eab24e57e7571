//! Dataset loading and normalization.
//!
//! Raw sources are parsed once, normalized into labeled conversations, and
//! cached under `<results>/data/<split>.json`. Subsequent sweeps reload the
//! normalized form instead of re-parsing the source.

use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use lt_cache::ArtifactStore;
use lt_types::{ChatHistory, ChatMessage, DataError, LatticeResult};

use crate::backend::TaskInput;

/// One normalized example: the conversation context and its reference
/// label (the expected reply).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledExample {
    pub history: ChatHistory,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DataFormat {
    /// A top-level JSON array of records.
    Json,
    /// One JSON record per line.
    JsonLines,
    /// Delimited text with a header row.
    Csv,
    /// Deterministic generated arithmetic questions, for offline sweeps
    /// and tests.
    Synthetic { seed: u64, examples: usize },
}

/// Where a dataset comes from and how to read it. `data_column` holds
/// either a plain string (a single user turn) or a list of role/content
/// messages; `label_column` holds the reference reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSpec {
    pub source: PathBuf,
    pub split: String,
    pub data_column: String,
    pub label_column: String,
    pub format: DataFormat,
}

/// Load a dataset through the normalized cache. The precomputation is
/// idempotent: once `<results>/data/<split>.json` exists, the source file
/// is not consulted again.
pub fn load_dataset(
    store: &dyn ArtifactStore,
    results_dir: &Path,
    spec: &DatasetSpec,
) -> LatticeResult<Vec<LabeledExample>> {
    let cache_path = results_dir.join("data").join(format!("{}.json", spec.split));
    if store.exists(&cache_path) {
        let text = store.read_to_string(&cache_path)?;
        let examples: Vec<LabeledExample> = serde_json::from_str(&text).map_err(|e| {
            DataError::ParseError {
                message: format!("cached dataset {}: {e}", cache_path.display()),
            }
        })?;
        debug!(split = %spec.split, examples = examples.len(), "loaded normalized dataset");
        return Ok(examples);
    }

    let examples = match &spec.format {
        DataFormat::Json => load_json(spec)?,
        DataFormat::JsonLines => load_json_lines(spec)?,
        DataFormat::Csv => load_csv(spec)?,
        DataFormat::Synthetic { seed, examples } => synthesize(*seed, *examples),
    };
    if examples.is_empty() {
        return Err(DataError::EmptyDataset {
            path: spec.source.display().to_string(),
        }
        .into());
    }

    store.write_atomic(&cache_path, serde_json::to_string(&examples)?.as_bytes())?;
    info!(split = %spec.split, examples = examples.len(), "normalized dataset cached");
    Ok(examples)
}

fn read_source(path: &Path) -> LatticeResult<String> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(text),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(DataError::SourceNotFound {
            path: path.display().to_string(),
        }
        .into()),
        Err(e) => Err(e.into()),
    }
}

fn record_to_example(record: &Value, spec: &DatasetSpec) -> LatticeResult<LabeledExample> {
    let data = record.get(&spec.data_column).ok_or_else(|| DataError::InvalidFormat {
        message: format!("record is missing column {}", spec.data_column),
    })?;
    let history = match data {
        Value::String(text) => ChatHistory::new(vec![ChatMessage::user(text.clone())]),
        Value::Array(_) => {
            let messages: Vec<ChatMessage> =
                serde_json::from_value(data.clone()).map_err(|e| DataError::ParseError {
                    message: format!("bad message list in {}: {e}", spec.data_column),
                })?;
            ChatHistory::new(messages)
        }
        other => {
            return Err(DataError::InvalidFormat {
                message: format!("column {} is neither text nor messages: {other}", spec.data_column),
            }
            .into())
        }
    };

    let label = match record.get(&spec.label_column) {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Number(number)) => number.to_string(),
        Some(other) => {
            return Err(DataError::InvalidFormat {
                message: format!("column {} is not a label: {other}", spec.label_column),
            }
            .into())
        }
        None => {
            return Err(DataError::InvalidFormat {
                message: format!("record is missing column {}", spec.label_column),
            }
            .into())
        }
    };

    Ok(LabeledExample { history, label })
}

fn load_json(spec: &DatasetSpec) -> LatticeResult<Vec<LabeledExample>> {
    let text = read_source(&spec.source)?;
    let records: Vec<Value> = serde_json::from_str(&text).map_err(|e| DataError::ParseError {
        message: format!("{}: {e}", spec.source.display()),
    })?;
    records
        .iter()
        .map(|record| record_to_example(record, spec))
        .collect()
}

fn load_json_lines(spec: &DatasetSpec) -> LatticeResult<Vec<LabeledExample>> {
    let text = read_source(&spec.source)?;
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let record: Value = serde_json::from_str(line).map_err(|e| DataError::ParseError {
                message: format!("{}: {e}", spec.source.display()),
            })?;
            record_to_example(&record, spec)
        })
        .collect()
}

fn load_csv(spec: &DatasetSpec) -> LatticeResult<Vec<LabeledExample>> {
    let text = read_source(&spec.source)?;
    let mut reader = csv::Reader::from_reader(text.as_bytes());
    let headers = reader
        .headers()
        .map_err(|e| DataError::ParseError {
            message: format!("{}: {e}", spec.source.display()),
        })?
        .clone();
    let data_index = headers
        .iter()
        .position(|h| h == spec.data_column)
        .ok_or_else(|| DataError::InvalidFormat {
            message: format!("CSV has no column {}", spec.data_column),
        })?;
    let label_index = headers
        .iter()
        .position(|h| h == spec.label_column)
        .ok_or_else(|| DataError::InvalidFormat {
            message: format!("CSV has no column {}", spec.label_column),
        })?;

    let mut examples = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| DataError::ParseError {
            message: format!("{}: {e}", spec.source.display()),
        })?;
        let data = record.get(data_index).unwrap_or_default();
        let label = record.get(label_index).unwrap_or_default();
        examples.push(LabeledExample {
            history: ChatHistory::new(vec![ChatMessage::user(data)]),
            label: label.to_string(),
        });
    }
    Ok(examples)
}

fn synthesize(seed: u64, count: usize) -> Vec<LabeledExample> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            let a: i64 = rng.random_range(0..100);
            let b: i64 = rng.random_range(0..100);
            LabeledExample {
                history: ChatHistory::new(vec![ChatMessage::user(format!(
                    "What is {a} plus {b}?"
                ))]),
                label: (a + b).to_string(),
            }
        })
        .collect()
}

// ---- audio inventories ----

pub const AUDIO_EXTENSIONS: &[&str] = &["flac", "m4a", "mp3", "ogg", "wav"];

/// All audio files directly under `dir`, sorted by path.
pub fn list_audio_files(dir: &Path) -> LatticeResult<Vec<PathBuf>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(DataError::SourceNotFound {
                path: dir.display().to_string(),
            }
            .into())
        }
        Err(e) => return Err(e.into()),
    };

    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let is_audio = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| AUDIO_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        if is_audio {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Audio files paired with their reference transcripts, read from a
/// `<stem>.txt` sidecar next to each file. A missing sidecar yields an
/// empty label rather than an error.
pub fn load_transcription_examples(dir: &Path) -> LatticeResult<Vec<(PathBuf, String)>> {
    list_audio_files(dir)?
        .into_iter()
        .map(|path| {
            let sidecar = path.with_extension("txt");
            let label = match std::fs::read_to_string(&sidecar) {
                Ok(text) => text.trim().to_string(),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
                Err(e) => return Err(e.into()),
            };
            Ok((path, label))
        })
        .collect()
}

// ---- sweep-facing views ----

pub fn chat_inputs(examples: &[LabeledExample]) -> Vec<TaskInput> {
    examples
        .iter()
        .map(|example| TaskInput::Chat(example.history.clone()))
        .collect()
}

pub fn contexts(examples: &[LabeledExample]) -> Vec<String> {
    examples
        .iter()
        .map(|example| example.history.render())
        .collect()
}

pub fn labels(examples: &[LabeledExample]) -> Vec<String> {
    examples.iter().map(|example| example.label.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lt_cache::MemoryStore;
    use std::io::Write;

    fn spec(source: PathBuf, format: DataFormat) -> DatasetSpec {
        DatasetSpec {
            source,
            split: "dev".to_string(),
            data_column: "question".to_string(),
            label_column: "answer".to_string(),
            format,
        }
    }

    #[test]
    fn json_lines_parse_into_single_turn_examples() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("dev.jsonl");
        let mut file = std::fs::File::create(&source).unwrap();
        writeln!(file, r#"{{"question": "2+2?", "answer": "4"}}"#).unwrap();
        writeln!(file).unwrap();
        writeln!(file, r#"{{"question": "3+3?", "answer": 6}}"#).unwrap();

        let store = MemoryStore::new();
        let examples =
            load_dataset(&store, dir.path(), &spec(source, DataFormat::JsonLines)).unwrap();
        assert_eq!(examples.len(), 2);
        assert_eq!(examples[0].history.render(), "user: 2+2?");
        assert_eq!(examples[1].label, "6");
    }

    #[test]
    fn json_arrays_become_multi_turn_histories() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("dev.json");
        std::fs::write(
            &source,
            r#"[{"question": [{"role": "user", "content": "hi"},
                             {"role": "assistant", "content": "hello"},
                             {"role": "user", "content": "how are you?"}],
                "answer": "fine"}]"#,
        )
        .unwrap();

        let store = MemoryStore::new();
        let examples = load_dataset(&store, dir.path(), &spec(source, DataFormat::Json)).unwrap();
        assert_eq!(examples.len(), 1);
        assert_eq!(examples[0].history.len(), 3);
        assert_eq!(examples[0].label, "fine");
    }

    #[test]
    fn csv_rows_parse_by_header_name() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("dev.csv");
        std::fs::write(&source, "answer,question\n4,2+2?\n6,3+3?\n").unwrap();

        let store = MemoryStore::new();
        let examples = load_dataset(&store, dir.path(), &spec(source, DataFormat::Csv)).unwrap();
        assert_eq!(examples.len(), 2);
        assert_eq!(examples[0].history.render(), "user: 2+2?");
        assert_eq!(examples[0].label, "4");
    }

    #[test]
    fn normalized_cache_shadows_the_source() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("dev.jsonl");
        std::fs::write(&source, r#"{"question": "q", "answer": "a"}"#).unwrap();

        let store = MemoryStore::new();
        let spec = spec(source.clone(), DataFormat::JsonLines);
        let first = load_dataset(&store, dir.path(), &spec).unwrap();

        // Corrupting the source no longer matters once normalized
        std::fs::write(&source, "not json at all").unwrap();
        let second = load_dataset(&store, dir.path(), &spec).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn synthetic_data_is_seed_deterministic() {
        let a = synthesize(7, 5);
        let b = synthesize(7, 5);
        let c = synthesize(8, 5);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 5);

        // Labels really answer the generated question
        for example in &a {
            let text = example.history.render();
            let numbers: Vec<i64> = text
                .split(|c: char| !c.is_ascii_digit())
                .filter(|part| !part.is_empty())
                .map(|part| part.parse().unwrap())
                .collect();
            assert_eq!(numbers.len(), 2);
            assert_eq!(example.label, (numbers[0] + numbers[1]).to_string());
        }
    }

    #[test]
    fn empty_dataset_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("dev.jsonl");
        std::fs::write(&source, "\n\n").unwrap();

        let store = MemoryStore::new();
        let err = load_dataset(&store, dir.path(), &spec(source, DataFormat::JsonLines))
            .unwrap_err();
        match err {
            lt_types::LatticeError::Data(DataError::EmptyDataset { .. }) => {}
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn audio_listing_is_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.wav", "a.mp3", "notes.txt", "c.FLAC"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }

        let files = list_audio_files(dir.path()).unwrap();
        let names: Vec<&str> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, vec!["a.mp3", "b.wav", "c.FLAC"]);

        let err = list_audio_files(&dir.path().join("missing")).unwrap_err();
        match err {
            lt_types::LatticeError::Data(DataError::SourceNotFound { .. }) => {}
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn transcription_examples_read_sidecar_labels() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.wav"), b"x").unwrap();
        std::fs::write(dir.path().join("a.txt"), "hello world\n").unwrap();
        std::fs::write(dir.path().join("b.wav"), b"x").unwrap();

        let examples = load_transcription_examples(dir.path()).unwrap();
        assert_eq!(examples.len(), 2);
        assert_eq!(examples[0].1, "hello world");
        assert_eq!(examples[1].1, "");
    }
}
