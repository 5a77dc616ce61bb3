//! Image folder dataset source
//!
//! Lists a directory of image files, decodes every accepted file into a
//! rank-3 `UInt8` array and, when a label CSV is configured, attaches the
//! integer-encoded and textual label of each image.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use colstream_core::{
    ArrayData, DatasetSource, ElementKind, Field, NdArray, Record, RecordReader, Schema,
};
use tracing::debug;

use crate::error::{Error, Result};
use crate::labels::{load_label_csv, LabelDictionary};

/// Decodes image files into `[height, width, channels]` pixel arrays
pub trait ImageDecoder: Send + Sync {
    /// Whether this decoder handles the file at `path`
    fn accepts(&self, path: &Path) -> bool;

    /// Decode the file at `path`
    fn decode(&self, path: &Path) -> Result<NdArray>;

    /// Fixed shape of every decoded image, if known
    fn shape(&self) -> Option<Vec<usize>> {
        None
    }
}

/// Decoder for headerless 8-bit pixel dumps of a fixed shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawImageDecoder {
    /// Image height in pixels
    pub height: usize,

    /// Image width in pixels
    pub width: usize,

    /// Number of interleaved channels
    pub channels: usize,
}

impl RawImageDecoder {
    /// Create a decoder for images of the given shape
    pub fn new(height: usize, width: usize, channels: usize) -> Self {
        Self {
            height,
            width,
            channels,
        }
    }

    /// Number of bytes in one image file
    pub fn frame_len(&self) -> usize {
        self.height * self.width * self.channels
    }
}

impl ImageDecoder for RawImageDecoder {
    fn accepts(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("raw"))
    }

    fn decode(&self, path: &Path) -> Result<NdArray> {
        let shape = vec![self.height, self.width, self.channels];
        let pixels = fs::read(path)?;
        if pixels.len() != self.frame_len() {
            return Err(Error::Format(format!(
                "{} holds {} bytes, expected {} for shape {shape:?}",
                path.display(),
                pixels.len(),
                self.frame_len()
            )));
        }
        Ok(NdArray::from_parts(shape, ArrayData::UInt8(pixels))?)
    }

    fn shape(&self) -> Option<Vec<usize>> {
        Some(vec![self.height, self.width, self.channels])
    }
}

/// Options for an image folder source
#[derive(Debug, Clone)]
pub struct ImageFolderOptions {
    /// Directory holding the image files
    pub directory: PathBuf,

    /// CSV mapping file stems to labels
    pub label_csv: Option<PathBuf>,

    /// Whether the label CSV starts with a header row
    pub has_header: bool,

    /// Column of the label CSV holding the label text
    pub label_column: usize,

    /// Image height in pixels
    pub height: usize,

    /// Image width in pixels
    pub width: usize,

    /// Number of channels
    pub channels: usize,
}

impl ImageFolderOptions {
    /// Options for an unlabeled folder of 28x28 RGB images
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            label_csv: None,
            has_header: true,
            label_column: 1,
            height: 28,
            width: 28,
            channels: 3,
        }
    }

    /// Attach labels from a CSV file
    #[must_use]
    pub fn with_labels(mut self, label_csv: impl Into<PathBuf>) -> Self {
        self.label_csv = Some(label_csv.into());
        self
    }

    /// Set whether the label CSV has a header row
    #[must_use]
    pub fn with_header(mut self, has_header: bool) -> Self {
        self.has_header = has_header;
        self
    }

    /// Set the label CSV column holding the label text
    #[must_use]
    pub fn with_label_column(mut self, label_column: usize) -> Self {
        self.label_column = label_column;
        self
    }

    /// Set the shape of every image
    #[must_use]
    pub fn with_shape(mut self, height: usize, width: usize, channels: usize) -> Self {
        self.height = height;
        self.width = width;
        self.channels = channels;
        self
    }

    /// Raw decoder matching the configured shape
    pub fn decoder(&self) -> RawImageDecoder {
        RawImageDecoder::new(self.height, self.width, self.channels)
    }
}

/// Labels of a labeled folder
#[derive(Debug)]
struct LabelAssignment {
    by_stem: HashMap<String, String>,
    dictionary: LabelDictionary,
}

impl LabelAssignment {
    fn lookup(&self, path: &Path) -> Result<(i32, &str)> {
        let stem = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .ok_or_else(|| Error::Label(format!("{} has no file stem", path.display())))?;
        let label = self
            .by_stem
            .get(stem)
            .ok_or_else(|| Error::Label(format!("no label for {stem:?}")))?;
        Ok((self.dictionary.encode(label)?, label))
    }
}

/// A dataset source over the images of one directory
///
/// Files are visited in file-name order, so every epoch yields the same
/// sequence of records.
pub struct ImageFolderSource {
    /// Schema of the emitted records
    schema: Arc<Schema>,

    /// Decoder shared by every reader
    decoder: Arc<dyn ImageDecoder>,

    /// Accepted files, sorted
    paths: Arc<[PathBuf]>,

    labels: Option<Arc<LabelAssignment>>,
}

impl ImageFolderSource {
    /// Create a source decoding raw images of the configured shape
    pub fn new(options: &ImageFolderOptions) -> Result<Self> {
        Self::with_decoder(options, Arc::new(options.decoder()))
    }

    /// Create a source using a custom decoder
    pub fn with_decoder(options: &ImageFolderOptions, decoder: Arc<dyn ImageDecoder>) -> Result<Self> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(&options.directory)? {
            let path = entry?.path();
            if path.is_file() && decoder.accepts(&path) {
                paths.push(path);
            }
        }
        paths.sort();

        let labels = match &options.label_csv {
            Some(csv) => {
                let by_stem = load_label_csv(csv, options.has_header, options.label_column)?;
                let dictionary = LabelDictionary::from_labels(by_stem.values().map(String::as_str))?;
                Some(Arc::new(LabelAssignment {
                    by_stem,
                    dictionary,
                }))
            }
            None => None,
        };

        let mut images = Field::new("images", ElementKind::UInt8);
        if let Some(shape) = decoder.shape() {
            images = images.with_shape(shape);
        }
        let mut fields = vec![images, Field::new("fpaths", ElementKind::Str)];
        if labels.is_some() {
            fields.push(Field::new("labels", ElementKind::Int32));
            fields.push(Field::new("str_labels", ElementKind::Str));
        }
        let schema = Arc::new(Schema::new(fields)?);

        debug!(
            directory = %options.directory.display(),
            images = paths.len(),
            labeled = labels.is_some(),
            "opened image folder"
        );

        Ok(Self {
            schema,
            decoder,
            paths: paths.into(),
            labels,
        })
    }

    /// Files visited by every epoch, in order
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Label encoding, when the folder is labeled
    pub fn label_dictionary(&self) -> Option<&LabelDictionary> {
        self.labels.as_ref().map(|labels| &labels.dictionary)
    }
}

impl DatasetSource for ImageFolderSource {
    fn schema(&self) -> Arc<Schema> {
        Arc::clone(&self.schema)
    }

    fn open(&self) -> colstream_core::Result<Box<dyn RecordReader>> {
        debug!(images = self.paths.len(), "opening image folder reader");
        Ok(Box::new(ImageFolderReader {
            decoder: Arc::clone(&self.decoder),
            paths: Arc::clone(&self.paths),
            labels: self.labels.clone(),
            position: 0,
        }))
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.paths.len())
    }
}

/// Reader over an [`ImageFolderSource`]
struct ImageFolderReader {
    decoder: Arc<dyn ImageDecoder>,
    paths: Arc<[PathBuf]>,
    labels: Option<Arc<LabelAssignment>>,
    position: usize,
}

impl ImageFolderReader {
    fn read(&self, path: &Path) -> Result<Record> {
        let mut record = Record::new()
            .with("images", self.decoder.decode(path)?)
            .with("fpaths", path.to_string_lossy().into_owned());
        if let Some(labels) = &self.labels {
            let (label, text) = labels.lookup(path)?;
            record.insert("labels", label);
            record.insert("str_labels", text);
        }
        Ok(record)
    }
}

impl RecordReader for ImageFolderReader {
    fn next_record(&mut self) -> colstream_core::Result<Option<Record>> {
        let Some(path) = self.paths.get(self.position) else {
            return Ok(None);
        };
        let record = self.read(path)?;
        self.position += 1;
        Ok(Some(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use colstream_core::{create_stream, StreamConfig};
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;
    use test_case::test_case;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    }

    /// Folder with three 2x2 grayscale images, a stray text file and a label CSV
    fn image_folder() -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (name, fill) in [("3.raw", 3u8), ("1.raw", 1), ("2.raw", 2)] {
            fs::write(dir.path().join(name), [fill; 4]).unwrap();
        }
        fs::write(dir.path().join("README.txt"), "not an image").unwrap();

        let mut csv = File::create(dir.path().join("labels.csv")).unwrap();
        writeln!(csv, "id,label").unwrap();
        writeln!(csv, "1,frog").unwrap();
        writeln!(csv, "2,cat").unwrap();
        writeln!(csv, "3,frog").unwrap();
        dir
    }

    fn options(dir: &TempDir) -> ImageFolderOptions {
        ImageFolderOptions::new(dir.path()).with_shape(2, 2, 1)
    }

    #[test_case("image.raw", true)]
    #[test_case("IMAGE.RAW", true)]
    #[test_case("image.png", false)]
    #[test_case("raw", false)]
    fn test_raw_decoder_accepts(name: &str, accepted: bool) {
        assert_eq!(RawImageDecoder::new(2, 2, 1).accepts(Path::new(name)), accepted);
    }

    #[test]
    fn test_raw_decoder_checks_size() {
        let dir = image_folder();
        let decoder = RawImageDecoder::new(2, 2, 1);
        let image = decoder.decode(&dir.path().join("2.raw")).unwrap();
        assert_eq!(image.shape(), &[2, 2, 1]);
        assert_eq!(image.as_slice::<u8>().unwrap(), &[2, 2, 2, 2]);

        let wrong = RawImageDecoder::new(3, 3, 1);
        assert!(matches!(wrong.decode(&dir.path().join("2.raw")), Err(Error::Format(_))));

        fs::write(dir.path().join("blank.raw"), b"").unwrap();
        let blank = RawImageDecoder::new(0, 4, 3).decode(&dir.path().join("blank.raw")).unwrap();
        assert_eq!(blank.shape(), &[0, 4, 3]);
        assert_eq!(blank.size(), 0);
        assert!(matches!(decoder.decode(&dir.path().join("blank.raw")), Err(Error::Format(_))));
    }

    #[test]
    fn test_unlabeled_folder() {
        init_tracing();
        let dir = image_folder();
        let source = ImageFolderSource::new(&options(&dir)).unwrap();
        assert_eq!(source.schema().names().collect::<Vec<_>>(), vec!["images", "fpaths"]);
        assert_eq!(source.size_hint(), Some(3));
        assert!(source.label_dictionary().is_none());

        let names: Vec<_> = source
            .paths()
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, vec!["1.raw", "2.raw", "3.raw"]);
    }

    #[test]
    fn test_labeled_stream() {
        init_tracing();
        let dir = image_folder();
        let options = options(&dir).with_labels(dir.path().join("labels.csv"));
        let source = Arc::new(ImageFolderSource::new(&options).unwrap());
        assert_eq!(source.label_dictionary().unwrap().values().collect::<Vec<_>>(), vec!["cat", "frog"]);

        let stream = create_stream(source, StreamConfig::new(2)).unwrap();
        let batches = stream.collect_vec().unwrap();
        assert_eq!(batches.len(), 2);

        let first = &batches[0];
        assert_eq!(first.keys().collect::<Vec<_>>(), vec!["images", "fpaths", "labels", "str_labels"]);
        let images = first.column_by_name("images").unwrap().array();
        assert_eq!(images.shape(), &[2, 2, 2, 1]);
        assert_eq!(images.as_slice::<u8>().unwrap(), &[1, 1, 1, 1, 2, 2, 2, 2]);
        assert_eq!(first.column_by_name("labels").unwrap().array().as_slice::<i32>().unwrap(), &[1, 0]);
        assert_eq!(
            first.column_by_name("str_labels").unwrap().array().as_slice::<String>().unwrap(),
            &["frog".to_string(), "cat".to_string()]
        );
        assert_eq!(batches[1].row_count(), 1);
    }

    #[test]
    fn test_missing_label_is_source_error() {
        let dir = image_folder();
        fs::write(dir.path().join("4.raw"), [4u8; 4]).unwrap();
        let options = options(&dir).with_labels(dir.path().join("labels.csv"));
        let source = Arc::new(ImageFolderSource::new(&options).unwrap());

        let stream = create_stream(source, StreamConfig::new(4)).unwrap();
        let mut cursor = stream.create();
        assert!(matches!(cursor.next(), Some(Err(colstream_core::Error::Source(_)))));
        assert!(cursor.next().is_none());
    }

    #[test]
    fn test_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let options = ImageFolderOptions::new(dir.path().join("nope"));
        assert!(matches!(ImageFolderSource::new(&options), Err(Error::Io(_))));
    }
}
