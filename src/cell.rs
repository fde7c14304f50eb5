use calamine::Data;
use std::fmt;

/// A single spreadsheet cell as seen by the importer.
///
/// Workbooks mix strings, numbers and booleans freely in the same column, so
/// every cell is reduced to one of three shapes before row classification.
#[derive(Clone, Debug, PartialEq)]
pub enum CellValue {
    Text(String),
    Number(f64),
    Empty,
}

impl CellValue {
    /// Best-effort numeric reading of the cell.
    ///
    /// Numbers are returned when finite, text is trimmed and parsed as `f64`.
    /// Empty cells and blank text have no numeric value.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) if n.is_finite() => Some(*n),
            CellValue::Number(_) => None,
            CellValue::Text(s) => {
                let s = s.trim();
                if s.is_empty() {
                    return None;
                }
                s.parse::<f64>().ok().filter(|n| n.is_finite())
            }
            CellValue::Empty => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.as_number().is_some()
    }

    /// Container count held by the cell, defaulting to 0.
    ///
    /// Fractions truncate toward zero, negative values clamp to 0 and values
    /// above `u32::MAX` clamp to `u32::MAX`.
    pub fn as_count(&self) -> u32 {
        match self.as_number() {
            Some(n) if n >= f64::from(u32::MAX) => u32::MAX,
            Some(n) if n > 0.0 => n.trunc() as u32,
            _ => 0,
        }
    }

    /// Trimmed text rendering, `None` for empty or blank cells
    pub fn as_label(&self) -> Option<String> {
        let text = self.to_string();
        let text = text.trim();
        if text.is_empty() {
            None
        } else {
            Some(text.to_string())
        }
    }

    pub fn is_empty(&self) -> bool {
        self.as_label().is_none()
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Text(s) => f.write_str(s),
            // Whole numbers print without a trailing ".0" so a numeric label
            // such as 1001 reads the same as it does in the sheet.
            CellValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                write!(f, "{}", *n as i64)
            }
            CellValue::Number(n) => write!(f, "{}", n),
            CellValue::Empty => Ok(()),
        }
    }
}

impl From<&Data> for CellValue {
    fn from(data: &Data) -> Self {
        match data {
            Data::Int(i) => CellValue::Number(*i as f64),
            Data::Float(f) => CellValue::Number(*f),
            Data::Bool(b) => CellValue::Number(if *b { 1.0 } else { 0.0 }),
            Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => {
                CellValue::Text(s.clone())
            }
            Data::DateTime(dt) => CellValue::Number(dt.as_f64()),
            Data::Error(_) | Data::Empty => CellValue::Empty,
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Text(s)
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

impl From<i64> for CellValue {
    fn from(n: i64) -> Self {
        CellValue::Number(n as f64)
    }
}
