//! Dataset resolver: file path + format tag -> in-memory dataset.
//!
//! Formats are dispatched through an explicit table (`FormatCodec`) keyed by
//! `FormatTag`. The tag is derived from the file extension, and an extension
//! that is not in the table is rejected *before* any I/O happens.
//!
//! Supported encodings:
//! - `.p`: a binary-serialized `NumericArray` (shape + row-major data)
//! - `.csv` / `.txt`: comma-separated numbers with an optional header row

use std::fs;
use std::path::Path;

use csv::StringRecord;
use tracing::{debug, info};

use crate::domain::{DataTable, DatasetHandle, FormatTag, NumericArray, Payload, extension_of};
use crate::error::PipelineError;

type DecodeFn = fn(&[u8]) -> Result<Payload, String>;
type EncodeFn = fn(&Payload) -> Result<Vec<u8>, String>;

/// One row of the format dispatch table.
#[derive(Clone, Copy)]
pub struct FormatCodec {
    pub tag: FormatTag,
    decode: DecodeFn,
    encode: EncodeFn,
}

impl std::fmt::Debug for FormatCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormatCodec").field("tag", &self.tag).finish()
    }
}

/// What to store when saving a dataset.
#[derive(Debug, Clone, Copy)]
pub enum SavePayload<'a> {
    /// An already-decoded payload; encoded as-is.
    Decoded(&'a Payload),
    /// Raw bytes (e.g. an upload). Decoded first, then re-encoded canonically,
    /// so whatever lands in staging is guaranteed to load back.
    Raw(&'a [u8]),
}

/// Maps paths to datasets using the format dispatch table.
#[derive(Debug, Clone)]
pub struct DatasetResolver {
    codecs: Vec<FormatCodec>,
}

impl Default for DatasetResolver {
    fn default() -> Self {
        Self {
            codecs: vec![
                FormatCodec {
                    tag: FormatTag::PickledArray,
                    decode: decode_pickled,
                    encode: encode_pickled,
                },
                FormatCodec {
                    tag: FormatTag::DelimitedTable,
                    decode: decode_delimited,
                    encode: encode_delimited,
                },
            ],
        }
    }
}

impl DatasetResolver {
    /// Tags present in the dispatch table.
    pub fn supported_formats(&self) -> Vec<FormatTag> {
        self.codecs.iter().map(|c| c.tag).collect()
    }

    /// Resolve the format tag for `path` from its extension.
    pub fn format_for(&self, path: &Path) -> Result<FormatTag, PipelineError> {
        let ext = extension_of(path);
        self.codecs
            .iter()
            .find(|c| c.tag.extensions().contains(&ext.as_str()))
            .map(|c| c.tag)
            .ok_or(PipelineError::UnsupportedFormat { extension: ext })
    }

    /// Whether `path` has an extension this resolver can handle.
    pub fn supports(&self, path: &Path) -> bool {
        self.format_for(path).is_ok()
    }

    fn codec(&self, tag: FormatTag) -> Result<&FormatCodec, PipelineError> {
        self.codecs
            .iter()
            .find(|c| c.tag == tag)
            .ok_or_else(|| PipelineError::UnsupportedFormat {
                extension: tag.extensions().first().copied().unwrap_or_default().to_string(),
            })
    }

    /// Load and decode the dataset at `path`.
    pub fn load(&self, path: &Path) -> Result<DatasetHandle, PipelineError> {
        let tag = self.format_for(path)?;
        let codec = self.codec(tag)?;

        let bytes = fs::read(path)
            .map_err(|e| PipelineError::io(format!("Failed to read dataset '{}'", path.display()), e))?;
        let payload = (codec.decode)(&bytes).map_err(|reason| PipelineError::corrupt(path, reason))?;

        info!(
            path = %path.display(),
            format = tag.display_name(),
            rows = payload.n_rows(),
            cols = payload.n_cols(),
            "dataset loaded"
        );

        Ok(DatasetHandle {
            source_path: path.to_path_buf(),
            format_tag: tag,
            payload,
        })
    }

    /// Encode and write a dataset to `path`, returning the stored dataset.
    pub fn save(&self, path: &Path, payload: SavePayload<'_>) -> Result<DatasetHandle, PipelineError> {
        let tag = self.format_for(path)?;
        let codec = self.codec(tag)?;

        let payload = match payload {
            SavePayload::Decoded(p) => p.clone(),
            SavePayload::Raw(bytes) => {
                (codec.decode)(bytes).map_err(|reason| PipelineError::corrupt(path, reason))?
            }
        };
        let bytes = (codec.encode)(&payload).map_err(|reason| PipelineError::corrupt(path, reason))?;

        fs::write(path, &bytes)
            .map_err(|e| PipelineError::io(format!("Failed to write dataset '{}'", path.display()), e))?;
        debug!(path = %path.display(), bytes = bytes.len(), "dataset saved");

        Ok(DatasetHandle {
            source_path: path.to_path_buf(),
            format_tag: tag,
            payload,
        })
    }

    /// Decode raw bytes with the codec for `tag` (no I/O).
    pub fn decode(&self, tag: FormatTag, bytes: &[u8]) -> Result<Payload, String> {
        let codec = self.codec(tag).map_err(|e| e.to_string())?;
        (codec.decode)(bytes)
    }

    /// Encode a payload with the codec for `tag` (no I/O).
    pub fn encode(&self, tag: FormatTag, payload: &Payload) -> Result<Vec<u8>, String> {
        let codec = self.codec(tag).map_err(|e| e.to_string())?;
        (codec.encode)(payload)
    }
}

fn decode_pickled(bytes: &[u8]) -> Result<Payload, String> {
    let raw: NumericArray =
        bincode::deserialize(bytes).map_err(|e| format!("not a serialized numeric array: {e}"))?;
    // Deserialization bypasses the constructor; re-check the shape invariant.
    let array = NumericArray::new(raw.shape().to_vec(), raw.data().to_vec())?;
    Ok(Payload::Array(array))
}

fn encode_pickled(payload: &Payload) -> Result<Vec<u8>, String> {
    let array = match payload {
        Payload::Array(a) => a.clone(),
        Payload::Table(t) => {
            let data = (0..t.n_rows()).filter_map(|i| t.row(i)).flatten().collect();
            NumericArray::new(vec![t.n_rows(), t.n_cols()], data)?
        }
    };
    bincode::serialize(&array).map_err(|e| format!("serialization failed: {e}"))
}

fn decode_delimited(bytes: &[u8]) -> Result<Payload, String> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let mut records = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let record = result.map_err(|e| format!("line {}: {e}", idx + 1))?;
        records.push(record);
    }

    let Some(first) = records.first() else {
        return Err("file is empty".to_string());
    };

    // A header row is any first row that isn't entirely numeric.
    let has_header = first.iter().any(|field| parse_cell(field).is_none());
    let (headers, data_rows): (Vec<String>, &[StringRecord]) = if has_header {
        (first.iter().map(normalize_header_name).collect(), &records[1..])
    } else {
        ((0..first.len()).map(|i| format!("col{i}")).collect(), &records[..])
    };

    let mut columns = vec![Vec::with_capacity(data_rows.len()); headers.len()];
    for (offset, record) in data_rows.iter().enumerate() {
        let line = offset + 1 + usize::from(has_header);
        parse_record(record, line, &mut columns)?;
    }

    DataTable::new(headers, columns).map(Payload::Table)
}

fn parse_record(record: &StringRecord, line: usize, columns: &mut [Vec<f64>]) -> Result<(), String> {
    if record.len() != columns.len() {
        return Err(format!(
            "line {line}: expected {} fields, found {}",
            columns.len(),
            record.len()
        ));
    }
    for (col, field) in record.iter().enumerate() {
        let value = parse_cell(field)
            .ok_or_else(|| format!("line {line}, column {}: non-numeric value '{field}'", col + 1))?;
        columns[col].push(value);
    }
    Ok(())
}

fn parse_cell(field: &str) -> Option<f64> {
    field.trim().parse::<f64>().ok()
}

fn normalize_header_name(name: &str) -> String {
    // Spreadsheet exports sometimes prefix the first header with a BOM.
    name.trim().trim_start_matches('\u{feff}').to_string()
}

fn encode_delimited(payload: &Payload) -> Result<Vec<u8>, String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    let write_err = |e: csv::Error| format!("failed to encode table: {e}");

    match payload {
        Payload::Table(t) => {
            writer.write_record(t.headers()).map_err(write_err)?;
            for i in 0..t.n_rows() {
                let row = t.row(i).unwrap_or_default();
                writer
                    .write_record(row.iter().map(|v| v.to_string()))
                    .map_err(write_err)?;
            }
        }
        Payload::Array(a) => {
            let cols = a.n_cols();
            writer
                .write_record((0..cols).map(|i| format!("col{i}")))
                .map_err(write_err)?;
            for row in a.data().chunks(cols.max(1)) {
                writer
                    .write_record(row.iter().map(|v| v.to_string()))
                    .map_err(write_err)?;
            }
        }
    }

    writer.into_inner().map_err(|e| format!("failed to flush table: {e}"))
}
