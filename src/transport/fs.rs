use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use serde::Serialize;
use walkdir::WalkDir;

use crate::constants::selection::GZIP_SUFFIX;
use crate::errors::PipelineError;
use crate::source::{ObjectLister, ObjectMeta};

/// Filesystem transport that lists objects under a prefix.
#[derive(Clone, Debug, Default)]
pub struct FileStream {
    follow_links: bool,
}

impl FileStream {
    /// Stream that does not follow symlinks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure symlink traversal.
    pub fn with_follow_symlinks(mut self, follow_links: bool) -> Self {
        self.follow_links = follow_links;
        self
    }
}

impl ObjectLister for FileStream {
    fn list(&self, prefix: &Path) -> Result<Vec<ObjectMeta>, PipelineError> {
        if !prefix.exists() {
            return Ok(Vec::new());
        }
        let mut objects = Vec::new();
        for entry in WalkDir::new(prefix).follow_links(self.follow_links) {
            let entry = entry.map_err(|err| PipelineError::Listing {
                prefix: prefix.display().to_string(),
                reason: err.to_string(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let size = entry.metadata().map(|meta| meta.len()).unwrap_or(0);
            objects.push(ObjectMeta::new(
                entry.path().to_string_lossy().into_owned(),
                size,
            ));
        }
        Ok(objects)
    }
}

/// True if the path ends in `.gz`.
pub fn is_gzip_path(path: &Path) -> bool {
    path.to_string_lossy().ends_with(GZIP_SUFFIX)
}

/// Open `path` for buffered reading, decompressing `.gz` files.
pub fn open_reader(path: &Path) -> Result<Box<dyn BufRead>, PipelineError> {
    let file = File::open(path)?;
    let reader: Box<dyn Read> = if is_gzip_path(path) {
        Box::new(MultiGzDecoder::new(file))
    } else {
        Box::new(file)
    };
    Ok(Box::new(BufReader::new(reader)))
}

/// All non-blank lines of `path`.
pub fn read_lines(path: &Path) -> Result<Vec<String>, PipelineError> {
    let mut lines = Vec::new();
    for line in open_reader(path)?.lines() {
        let line = line?;
        if !line.trim().is_empty() {
            lines.push(line);
        }
    }
    Ok(lines)
}

/// Write `items` as gzip-compressed JSON lines to `path`, creating parent directories.
pub fn write_json_lines_gz<'a, T, I>(path: &Path, items: I) -> Result<usize, PipelineError>
where
    T: Serialize + 'a,
    I: IntoIterator<Item = &'a T>,
{
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    let mut writer = BufWriter::new(GzEncoder::new(file, Compression::default()));
    let mut written = 0usize;
    for item in items {
        serde_json::to_writer(&mut writer, item)?;
        writer.write_all(b"\n")?;
        written += 1;
    }
    let encoder = writer.into_inner().map_err(|err| err.into_error())?;
    encoder.finish()?;
    Ok(written)
}

/// Every file under `root` whose name satisfies `keep`, sorted.
pub fn files_under(root: &Path, keep: impl Fn(&Path) -> bool) -> Result<Vec<PathBuf>, PipelineError> {
    if !root.exists() {
        return Ok(Vec::new());
    }
    let mut files: Vec<PathBuf> = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry.map_err(|err| PipelineError::Listing {
            prefix: root.display().to_string(),
            reason: err.to_string(),
        })?;
        if entry.file_type().is_file() && keep(entry.path()) {
            files.push(entry.path().to_path_buf());
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn lists_files_with_sizes() {
        let temp = tempdir().unwrap();
        let nested = temp.path().join("echo").join("CP_Quack-echo-2020-08-23");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("results.json"), b"0123456789").unwrap();
        fs::write(temp.path().join("echo").join("top.json"), b"").unwrap();

        let mut listing = FileStream::new().list(&temp.path().join("echo")).unwrap();
        listing.sort_by(|a, b| a.path.cmp(&b.path));
        assert_eq!(listing.len(), 2);
        let results = listing
            .iter()
            .find(|object| object.path.ends_with("results.json"))
            .unwrap();
        assert_eq!(results.size, 10);

        let missing = FileStream::new().list(&temp.path().join("http")).unwrap();
        assert!(missing.is_empty());
    }

    #[test]
    fn gzip_lines_round_trip_and_skip_blank_lines() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("out").join("rows.json.gz");
        let values = vec![serde_json::json!({"a": 1}), serde_json::json!({"a": 2})];
        assert_eq!(write_json_lines_gz(&path, &values).unwrap(), 2);
        let lines = read_lines(&path).unwrap();
        assert_eq!(lines, vec!["{\"a\":1}".to_string(), "{\"a\":2}".to_string()]);

        let plain = temp.path().join("plain.json");
        fs::write(&plain, "{\"b\":1}\n\n{\"b\":2}\n").unwrap();
        assert_eq!(read_lines(&plain).unwrap().len(), 2);
    }
}
