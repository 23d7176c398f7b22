use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::{self, Deserializer, SeqAccess, Visitor};
use serde_json::Value;
use serde_json::ser::Formatter;
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// Default upper bound for one part, in bytes of single-line JSON
pub const DEFAULT_MAX_BYTES: usize = 20_000_000;

/// Outcome of slicing one file
#[derive(Debug)]
pub struct SliceReport {
    pub parts: Vec<PathBuf>,
    pub items: usize,
}

/// Split a file holding one JSON array into `<stem>_part<N>.json` files
///
/// Items are streamed; only the part being filled is held in memory. Key
/// order and number text are kept as they appear in the input.
pub fn slice_json_array(input: &Path, output_dir: &Path, max_bytes: usize) -> Result<SliceReport> {
    let file = File::open(input).with_context(|| format!("Failed to open: {}", input.display()))?;
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create directory: {}", output_dir.display()))?;

    let base_name = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "slice".to_string());
    let mut writer = PartWriter::new(base_name, output_dir, max_bytes);

    let mut deserializer = serde_json::Deserializer::from_reader(BufReader::new(file));
    (&mut deserializer)
        .deserialize_seq(ItemVisitor(&mut writer))
        .with_context(|| format!("Failed to stream JSON array: {}", input.display()))?;
    deserializer
        .end()
        .with_context(|| format!("Trailing data after JSON array: {}", input.display()))?;

    writer.flush()?;
    info!(
        "Sliced {} into {} parts ({} total entries)",
        input.display(),
        writer.parts.len(),
        writer.items
    );

    Ok(SliceReport {
        parts: writer.parts,
        items: writer.items,
    })
}

struct PartWriter<'a> {
    base_name: String,
    output_dir: &'a Path,
    max_bytes: usize,
    batch: Vec<Value>,
    batch_bytes: usize,
    parts: Vec<PathBuf>,
    items: usize,
}

impl<'a> PartWriter<'a> {
    fn new(base_name: String, output_dir: &'a Path, max_bytes: usize) -> Self {
        Self {
            base_name,
            output_dir,
            max_bytes,
            batch: Vec::new(),
            batch_bytes: 0,
            parts: Vec::new(),
            items: 0,
        }
    }

    fn push(&mut self, item: Value) -> Result<()> {
        let size = encoded_len(&item)?;
        if !self.batch.is_empty() && self.batch_bytes + size > self.max_bytes {
            self.flush()?;
        }
        self.batch.push(item);
        self.batch_bytes += size;
        self.items += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if self.batch.is_empty() {
            return Ok(());
        }

        let path = self
            .output_dir
            .join(format!("{}_part{}.json", self.base_name, self.parts.len() + 1));
        let file = File::create(&path)
            .with_context(|| format!("Failed to create: {}", path.display()))?;
        let mut out = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut out, &self.batch)
            .with_context(|| format!("Failed to write: {}", path.display()))?;
        out.flush()
            .with_context(|| format!("Failed to write: {}", path.display()))?;

        info!(
            "Saved {} ({} items, ~{:.2} MB)",
            path.display(),
            self.batch.len(),
            self.batch_bytes as f64 / 1e6
        );

        self.parts.push(path);
        self.batch.clear();
        self.batch_bytes = 0;
        Ok(())
    }
}

/// Single-line encoding with `", "` and `": "` separators
struct SpacedFormatter;

impl Formatter for SpacedFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first { Ok(()) } else { writer.write_all(b", ") }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first { Ok(()) } else { writer.write_all(b", ") }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }
}

/// UTF-8 byte length of one item in its single-line form
fn encoded_len(item: &Value) -> Result<usize> {
    let mut buf = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, SpacedFormatter);
    item.serialize(&mut serializer)
        .context("Failed to measure JSON item")?;
    Ok(buf.len())
}

struct ItemVisitor<'w, 'a>(&'w mut PartWriter<'a>);

impl<'de> Visitor<'de> for ItemVisitor<'_, '_> {
    type Value = ();

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a JSON array")
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<(), A::Error>
    where
        A: SeqAccess<'de>,
    {
        while let Some(item) = seq.next_element::<Value>()? {
            self.0
                .push(item)
                .map_err(|e| de::Error::custom(format!("{:#}", e)))?;
        }
        Ok(())
    }
}
