use crate::cell::CellValue;
use calamine::{Reader, open_workbook_auto_from_rs};
use std::fs;
use std::io::Cursor;
use std::path::Path;
use thiserror::Error;

/// A worksheet flattened into rows of cells
pub type Rows = Vec<Vec<CellValue>>;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Unsupported or corrupt spreadsheet: {0}")]
    Workbook(#[from] calamine::Error),

    #[error("Spreadsheet has no worksheets")]
    NoWorksheet,

    #[error("Failed to read spreadsheet file: {0}")]
    Io(#[from] std::io::Error),
}

/// Read the first worksheet of an uploaded workbook
///
/// The container format is sniffed from the bytes, so both the legacy binary
/// `.xls` format and the XML-based `.xlsx` format are accepted regardless of
/// the file name supplied by the client.
///
/// # Arguments
/// * `bytes` - Raw workbook content
///
/// # Returns
/// * `Result<Rows, LoadError>` - One entry per sheet row, cells in column order
///
/// # Examples
/// ```no_run
/// use port_inventory::loader::from_bytes;
///
/// let bytes = std::fs::read("inventory.xlsx").unwrap();
/// match from_bytes(&bytes) {
///     Ok(rows) => println!("Read {} rows", rows.len()),
///     Err(e) => eprintln!("Error loading workbook: {}", e),
/// }
/// ```
pub fn from_bytes(bytes: &[u8]) -> Result<Rows, LoadError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or(LoadError::NoWorksheet)??;

    let rows = range
        .rows()
        .map(|row| row.iter().map(CellValue::from).collect())
        .collect();

    Ok(rows)
}

/// Read the first worksheet of a workbook on disk
pub fn from_path(path: impl AsRef<Path>) -> Result<Rows, LoadError> {
    let bytes = fs::read(path)?;
    from_bytes(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_xlsxwriter::Workbook;

    #[test]
    fn reads_first_worksheet_of_xlsx() {
        let mut workbook = Workbook::new();
        let first = workbook.add_worksheet();
        first.write_string(0, 0, "CHENNAI").unwrap();
        first.write_string(1, 0, "GOODRICH").unwrap();
        first.write_number(1, 1, 31).unwrap();
        first.write_number(1, 2, 28.0).unwrap();
        let second = workbook.add_worksheet();
        second.write_string(0, 0, "IGNORED").unwrap();
        let bytes = workbook.save_to_buffer().unwrap();

        let rows = from_bytes(&bytes).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][0], CellValue::Text("CHENNAI".into()));
        assert_eq!(rows[0][1], CellValue::Empty);
        assert_eq!(rows[1][0], CellValue::Text("GOODRICH".into()));
        assert_eq!(rows[1][1].as_count(), 31);
        assert_eq!(rows[1][2].as_count(), 28);
    }

    #[test]
    fn rejects_non_spreadsheet_bytes() {
        let result = from_bytes(b"city,agent\nCHENNAI,GOODRICH\n");
        assert!(result.is_err());
    }

    #[test]
    fn reads_workbook_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ports.xlsx");
        let mut workbook = Workbook::new();
        workbook.add_worksheet().write_string(0, 0, "KOLKATA").unwrap();
        workbook.save(&path).unwrap();

        let rows = from_path(&path).unwrap();
        assert_eq!(rows, vec![vec![CellValue::Text("KOLKATA".into())]]);
    }
}
