//! Label tables and dictionary encoding of string labels

use std::collections::HashMap;
use std::path::Path;

use csv::ReaderBuilder;
use tracing::debug;

use crate::error::{Error, Result};

/// Dictionary assigning dense integer ids to string labels
///
/// Ids follow the sorted order of the unique labels, so the same label set
/// always encodes the same way regardless of the order it was read in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelDictionary {
    /// Map from label to id
    value_to_index: HashMap<String, i32>,

    /// Labels in id order
    index_to_value: Vec<String>,
}

impl LabelDictionary {
    /// Build a dictionary over the unique values of `labels`
    pub fn from_labels<'a, I>(labels: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut values: Vec<String> = labels.into_iter().map(str::to_string).collect();
        values.sort_unstable();
        values.dedup();

        let mut value_to_index = HashMap::with_capacity(values.len());
        for (index, value) in values.iter().enumerate() {
            let index = i32::try_from(index)
                .map_err(|_| Error::Label(format!("too many distinct labels: {}", values.len())))?;
            value_to_index.insert(value.clone(), index);
        }

        Ok(Self {
            value_to_index,
            index_to_value: values,
        })
    }

    /// Get the id of a label
    pub fn get_index(&self, value: &str) -> Option<i32> {
        self.value_to_index.get(value).copied()
    }

    /// Get the id of a label, failing for labels outside the dictionary
    pub fn encode(&self, value: &str) -> Result<i32> {
        self.get_index(value)
            .ok_or_else(|| Error::Label(format!("unknown label {value:?}")))
    }

    /// Get the label for an id
    pub fn get_value(&self, index: i32) -> Option<&str> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.index_to_value.get(i))
            .map(String::as_str)
    }

    /// Decode ids back to labels, skipping unknown ids
    pub fn decode_indices(&self, indices: &[i32]) -> Vec<String> {
        indices
            .iter()
            .filter_map(|&idx| self.get_value(idx).map(str::to_string))
            .collect()
    }

    /// Get the number of labels in the dictionary
    pub fn len(&self) -> usize {
        self.index_to_value.len()
    }

    /// Check if the dictionary is empty
    pub fn is_empty(&self) -> bool {
        self.index_to_value.is_empty()
    }

    /// Labels in id order
    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.index_to_value.iter().map(String::as_str)
    }

    /// Get the estimated memory usage of the dictionary
    pub fn memory_usage(&self) -> usize {
        self.index_to_value.iter().map(|s| 2 * s.len()).sum::<usize>()
            + self.index_to_value.len() * std::mem::size_of::<i32>()
    }
}

/// Load a label CSV into a map from the first column to `label_column`
///
/// The first column holds the file stem an image is matched by.
pub fn load_label_csv(path: &Path, has_header: bool, label_column: usize) -> Result<HashMap<String, String>> {
    if label_column == 0 {
        return Err(Error::Schema("label column 0 holds the file stems".into()));
    }

    let mut reader = ReaderBuilder::new()
        .has_headers(has_header)
        .flexible(true)
        .from_path(path)?;

    let mut table = HashMap::new();
    for row in reader.records() {
        let row = row?;
        let key = row
            .get(0)
            .ok_or_else(|| Error::Format("empty row in label file".into()))?;
        let label = row.get(label_column).ok_or_else(|| {
            Error::Format(format!("row {key:?} has no column {label_column}"))
        })?;
        table.insert(key.to_string(), label.to_string());
    }

    debug!(path = %path.display(), labels = table.len(), "loaded label table");
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_dictionary_is_sorted() {
        let dictionary = LabelDictionary::from_labels(["frog", "cat", "frog", "automobile"]).unwrap();
        assert_eq!(dictionary.len(), 3);
        assert_eq!(dictionary.values().collect::<Vec<_>>(), vec!["automobile", "cat", "frog"]);
        assert_eq!(dictionary.encode("cat").unwrap(), 1);
        assert!(matches!(dictionary.encode("ship"), Err(Error::Label(_))));
        assert_eq!(dictionary.get_value(2), Some("frog"));
        assert_eq!(dictionary.get_value(-1), None);
        assert_eq!(dictionary.decode_indices(&[2, 0, 7]), vec!["frog", "automobile"]);
    }

    #[test]
    fn test_load_label_csv() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "id,label").unwrap();
        writeln!(file, "1,frog").unwrap();
        writeln!(file, "2,truck").unwrap();
        file.flush().unwrap();

        let table = load_label_csv(file.path(), true, 1).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table["2"], "truck");

        let headerless = load_label_csv(file.path(), false, 1).unwrap();
        assert_eq!(headerless["id"], "label");

        assert!(matches!(load_label_csv(file.path(), true, 2), Err(Error::Format(_))));
        assert!(matches!(load_label_csv(file.path(), true, 0), Err(Error::Schema(_))));
    }
}
