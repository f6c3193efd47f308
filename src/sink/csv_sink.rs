//! Local CSV file backend, same columns as the spreadsheet.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use fs2::FileExt;

use super::row::{SheetRow, COLUMNS};
use crate::Result;

#[derive(Debug, Clone)]
pub struct CsvAppender {
    path: PathBuf,
}

impl CsvAppender {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one row. A header row is written first when the file is new
    /// or empty.
    pub fn append_row(&self, row: SheetRow) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.lock_exclusive()?;

        let result = (|| -> Result<()> {
            let needs_header = file.metadata()?.len() == 0;
            let mut writer = csv::Writer::from_writer(&file);
            if needs_header {
                writer.write_record(COLUMNS)?;
            }
            writer.write_record(row.into_values())?;
            writer.flush()?;
            Ok(())
        })();

        file.unlock()?;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(action: &str, extra: &str) -> SheetRow {
        SheetRow {
            date: "2024-01-01T00:00:00.000Z".into(),
            user_id: "1".into(),
            username: "bob".into(),
            country: "ru-RU".into(),
            device: "Linux".into(),
            action: action.into(),
            source: "mini_app".into(),
            additional_data: extra.into(),
        }
    }

    #[test]
    fn writes_header_once() {
        let dir = tempfile::tempdir().unwrap();
        let appender = CsvAppender::new(dir.path().join("nested/events.csv"));

        appender.append_row(row("app_opened", "")).unwrap();
        appender
            .append_row(row("user_action:choice", r#"{"stageId":"stage1"}"#))
            .unwrap();

        let mut reader = csv::Reader::from_path(appender.path()).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(headers.iter().collect::<Vec<_>>(), COLUMNS.to_vec());

        let records: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(records.len(), 2);
        assert_eq!(&records[0][5], "app_opened");
        assert_eq!(&records[1][7], r#"{"stageId":"stage1"}"#);
    }
}
