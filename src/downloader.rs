use crate::port::{ContainerType, PortRecord};
use rust_xlsxwriter::{Format, Workbook, XlsxError};

const AGENT_HEADING: &str = "AGENTS";
const TOTAL_HEADING: &str = "TOTAL";

/// Convert port records to CSV format
///
/// The output uses the same block layout the importer reads: a city row, a
/// heading row, one row per agent, and a blank separator line. Feeding the
/// result back through a spreadsheet and the importer reproduces the data.
///
/// # Arguments
/// * `ports` - Records to export, in output order
///
/// # Returns
/// * `String` - CSV content
///
/// # Examples
/// ```
/// use port_inventory::port::PortRecord;
/// use port_inventory::downloader::to_csv;
///
/// let csv = to_csv(&[PortRecord::new("chennai")]);
/// assert!(csv.starts_with("CHENNAI\n"));
/// ```
pub fn to_csv(ports: &[PortRecord]) -> String {
    let mut csv_content = String::new();

    for port in ports {
        csv_content.push_str(&escape(&port.city));
        csv_content.push('\n');
        csv_content.push_str(&heading_row().join(","));
        csv_content.push('\n');

        for agent in &port.agents {
            csv_content.push_str(&escape(&agent.name));
            for kind in ContainerType::ALL {
                csv_content.push(',');
                csv_content.push_str(&agent.counts.get(kind).to_string());
            }
            csv_content.push(',');
            csv_content.push_str(&agent.total.to_string());
            csv_content.push('\n');
        }
        csv_content.push('\n');
    }

    csv_content
}

/// Convert port records to XLSX format
///
/// Writes a single worksheet in the importer's block layout using the
/// rust_xlsxwriter library. City and heading rows are bold.
///
/// # Arguments
/// * `ports` - Records to export, in output order
///
/// # Returns
/// * `Result<Vec<u8>, XlsxError>` - XLSX file content as bytes or an error
pub fn to_xlsx(ports: &[PortRecord]) -> Result<Vec<u8>, XlsxError> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name("Inventory")?;
    let bold = Format::new().set_bold();

    let mut row: u32 = 0;
    for port in ports {
        worksheet.write_string_with_format(row, 0, &port.city, &bold)?;
        row += 1;

        for (col, heading) in heading_row().iter().enumerate() {
            worksheet.write_string_with_format(row, col as u16, *heading, &bold)?;
        }
        row += 1;

        for agent in &port.agents {
            worksheet.write_string(row, 0, &agent.name)?;
            for kind in ContainerType::ALL {
                let col = (kind.index() + 1) as u16;
                worksheet.write_number(row, col, agent.counts.get(kind) as f64)?;
            }
            let total_col = (ContainerType::ALL.len() + 1) as u16;
            worksheet.write_number(row, total_col, agent.total as f64)?;
            row += 1;
        }
        row += 1;
    }

    workbook.save_to_buffer()
}

fn heading_row() -> Vec<&'static str> {
    let mut headings = vec![AGENT_HEADING];
    headings.extend(ContainerType::ALL.iter().map(|t| t.sheet_heading()));
    headings.push(TOTAL_HEADING);
    headings
}

// Quote fields containing commas, quotes or newlines
fn escape(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
