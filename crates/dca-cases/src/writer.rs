use std::collections::HashSet;
use std::hash::Hash;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use dca_crawler::{Sink, SinkError, SinkReport};
use serde::{Deserialize, Serialize};

use crate::record::CaseRecord;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";
const FILE_TIMESTAMP: &str = "%Y%m%d-%H%M%S";

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CsvWriterConfig {
    #[serde(default = "default_csv_delimiter")]
    pub delimiter: char,
    #[serde(default)]
    pub escape: Option<char>,
    #[serde(default)]
    pub flexible: bool,
    #[serde(default = "default_csv_terminator")]
    pub terminator: CsvTerminator,
}

impl Default for CsvWriterConfig {
    fn default() -> Self {
        Self {
            delimiter: ',',
            escape: None,
            flexible: false,
            terminator: CsvTerminator::CRLF,
        }
    }
}

fn default_csv_delimiter() -> char {
    CsvWriterConfig::default().delimiter
}

fn default_csv_terminator() -> CsvTerminator {
    CsvWriterConfig::default().terminator
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CsvTerminator {
    CRLF,
    Any(char),
}

impl From<CsvTerminator> for csv::Terminator {
    fn from(source: CsvTerminator) -> Self {
        match source {
            CsvTerminator::CRLF => Self::CRLF,
            CsvTerminator::Any(c) => Self::Any(c as u8),
        }
    }
}

impl From<&CsvWriterConfig> for csv::WriterBuilder {
    fn from(c: &CsvWriterConfig) -> Self {
        let mut builder = csv::WriterBuilder::new();
        builder.delimiter(c.delimiter as u8);
        builder.terminator(c.terminator.into());
        builder.flexible(c.flexible);
        if let Some(escape) = c.escape {
            builder.double_quote(false);
            builder.escape(escape as u8);
        } else {
            builder.double_quote(true);
        }
        builder
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CsvSinkConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
    /// Starts files with a UTF-8 byte order mark, for spreadsheet software.
    #[serde(default = "default_bom")]
    pub bom: bool,
    #[serde(default)]
    pub writer: CsvWriterConfig,
}

impl Default for CsvSinkConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            file_prefix: String::from("euvsdisinfo"),
            bom: true,
            writer: CsvWriterConfig::default(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    CsvSinkConfig::default().output_dir
}

fn default_file_prefix() -> String {
    CsvSinkConfig::default().file_prefix
}

fn default_bom() -> bool {
    CsvSinkConfig::default().bom
}

pub enum CsvWriter {
    File(csv::Writer<fs_err::File>),
    Stdout(csv::Writer<io::Stdout>),
}

impl CsvWriter {
    pub fn stdout(config: &CsvWriterConfig) -> Self {
        Self::Stdout(csv::WriterBuilder::from(config).from_writer(io::stdout()))
    }

    /// Creates `path`, which must not exist yet.
    pub fn create_new(path: &Path, config: &CsvSinkConfig) -> io::Result<Self> {
        let mut file = fs_err::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)?;
        if config.bom {
            file.write_all(UTF8_BOM)?;
        }
        let wtr = csv::WriterBuilder::from(&config.writer).from_writer(file);
        Ok(Self::File(wtr))
    }

    pub fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::File(wtr) => wtr.flush(),
            Self::Stdout(wtr) => wtr.flush(),
        }
    }

    pub fn serialize<S: Serialize>(&mut self, record: S) -> csv::Result<()> {
        match self {
            Self::File(wtr) => wtr.serialize(record),
            Self::Stdout(wtr) => wtr.serialize(record),
        }
    }
}

fn csv_err(e: csv::Error) -> SinkError {
    SinkError::Csv(e.to_string())
}

/// Picks a file name that no earlier run used.
///
/// Fails with [`io::ErrorKind::AlreadyExists`] only once every numbered
/// fallback is taken too.
fn create_output(config: &CsvSinkConfig) -> io::Result<(PathBuf, CsvWriter)> {
    let stamp = chrono::Local::now().format(FILE_TIMESTAMP);
    let base = format!("{}_{stamp}", config.file_prefix);

    let mut last_err = None;
    for n in 0..100 {
        let name = match n {
            0 => format!("{base}.csv"),
            n => format!("{base}-{n}.csv"),
        };
        let path = config.output_dir.join(name);
        match CsvWriter::create_new(&path, config) {
            Ok(wtr) => return Ok((path, wtr)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => last_err = Some(e),
            Err(e) => return Err(e),
        }
    }
    Err(last_err.unwrap_or_else(|| io::Error::from(io::ErrorKind::AlreadyExists)))
}

/// Buffers records and writes them, de-duplicated, to a fresh CSV file on flush.
pub struct CsvSink<R> {
    config: CsvSinkConfig,
    records: Vec<R>,
}

impl<R> CsvSink<R>
where
    R: Serialize + Eq + Hash + Send,
{
    pub fn new(config: CsvSinkConfig) -> Self {
        Self {
            config,
            records: vec![],
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn push(&mut self, record: R) {
        self.records.push(record);
    }

    fn write(&mut self) -> Result<SinkReport, SinkError> {
        if self.records.is_empty() {
            return Ok(SinkReport::Empty);
        }

        fs_err::create_dir_all(&self.config.output_dir)?;
        let (path, mut wtr) = create_output(&self.config)?;

        let mut seen = HashSet::new();
        let mut rows = 0;
        for record in &self.records {
            if seen.insert(record) {
                wtr.serialize(record).map_err(csv_err)?;
                rows += 1;
            }
        }
        wtr.flush()?;

        let duplicates = self.records.len() - rows;
        self.records.clear();
        let path = fs_err::canonicalize(&path).unwrap_or(path);
        Ok(SinkReport::Written {
            path,
            rows,
            duplicates,
        })
    }
}

impl<R> Sink<R> for CsvSink<R>
where
    R: Serialize + Eq + Hash + Clone + Send,
{
    type Config = CsvSinkConfig;

    fn open(config: &CsvSinkConfig) -> anyhow::Result<Self> {
        Ok(Self::new(config.clone()))
    }

    fn append(&mut self, record: &R) -> Result<(), SinkError> {
        self.push(record.clone());
        Ok(())
    }

    fn flush(&mut self) -> Result<SinkReport, SinkError> {
        self.write()
    }
}

/// Reads case records back from a file written by [`CsvSink`].
pub fn read_cases(path: &Path, config: &CsvWriterConfig) -> anyhow::Result<Vec<CaseRecord>> {
    let content = fs_err::read_to_string(path)?;
    let content = content.strip_prefix('\u{feff}').unwrap_or(&content);

    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(config.delimiter as u8)
        .terminator(config.terminator.into())
        .flexible(config.flexible)
        .double_quote(config.escape.is_none())
        .escape(config.escape.map(|c| c as u8))
        .from_reader(content.as_bytes());

    let mut cases = vec![];
    for (i, row) in rdr.deserialize().enumerate() {
        let case: CaseRecord =
            row.map_err(|e| anyhow::anyhow!("{}: row {}: {e}", path.display(), i + 1))?;
        cases.push(case);
    }
    Ok(cases)
}

/// Concatenates earlier outputs into one de-duplicated file.
pub fn merge_csv<P: AsRef<Path>>(
    inputs: &[P],
    config: &CsvSinkConfig,
) -> anyhow::Result<SinkReport> {
    let mut sink = CsvSink::new(config.clone());
    for input in inputs {
        let cases = read_cases(input.as_ref(), &config.writer)?;
        log::info!("Read {} rows from {}", cases.len(), input.as_ref().display());
        for case in cases {
            sink.push(case);
        }
    }
    Ok(sink.write()?)
}
