use crate::error::Result;
use crate::subset::TempBuffer;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use tracing::{info, warn};

/// Above this buffered size the formatter copies the buffer through
/// verbatim instead of loading it for delimiter translation.
const PASS_THROUGH_THRESHOLD: u64 = 200 * 1_000_000;

/// Body written when an extraction succeeds but matches nothing.
const NO_DATA_MESSAGE: &str = "Your extraction request has run successfully, but no data have been found matching your request.\n\nPlease use the MIDAS station search pages on the CEDA website (http://archive.ceda.ac.uk/midas_stations/) to check your station reporting periods and message types to ensure that your selected stations report message types containing the data elements you require within your selected period.\n\nAdditional information about data outages/known issues/instrument failure can also be found on station records.\n\nIf you have completed these checks and believe the data should be available please contact the CEDA helpdesk for further assistance (support@ceda.ac.uk), providing full details of the extractions you are trying to submit.";

/// Writes the final output file from an extraction temp buffer, returning
/// the number of data records written. Consumes the buffer; its backing
/// file is removed on drop whether or not formatting succeeds.
///
/// Small results are loaded, given a header line and delimiter-translated.
/// Results over the pass-through threshold are streamed verbatim under a
/// comma header; delimiter translation is skipped for those (a known
/// product decision carried from the original service).
pub fn finalize(
    buffer: TempBuffer,
    headers: &[String],
    output_path: &Path,
    delimiter: &str,
) -> Result<usize> {
    let size = fs::metadata(buffer.path())?.len();

    if size > PASS_THROUGH_THRESHOLD {
        warn!(
            "Buffer is {} bytes (> {}): copying through without delimiter translation",
            size, PASS_THROUGH_THRESHOLD
        );
        let records = pass_through(buffer.path(), headers, output_path)?;
        info!("{} records written to: {}", records, output_path.display());
        return Ok(records);
    }

    let data = fs::read_to_string(buffer.path())?;
    let mut rows: Vec<String> = data.lines().map(str::to_string).collect();
    rows.insert(0, headers.join(", "));

    if rows.len() == 1 {
        info!("No data found.");
        fs::write(output_path, NO_DATA_MESSAGE)?;
        return Ok(0);
    }

    let rows = reformat_delimiters(rows, delimiter);
    let mut out = BufWriter::new(File::create(output_path)?);
    for row in &rows {
        out.write_all(row.as_bytes())?;
        out.write_all(b"\n")?;
    }
    out.flush()?;

    let records = rows.len() - 1;
    info!("{} records written to: {}", records, output_path.display());
    Ok(records)
}

fn pass_through(temp_path: &Path, headers: &[String], output_path: &Path) -> Result<usize> {
    let mut out = BufWriter::new(File::create(output_path)?);
    out.write_all(headers.join(", ").as_bytes())?;
    out.write_all(b"\n")?;

    let reader = BufReader::new(File::open(temp_path)?);
    let mut records = 0;
    for line in reader.lines() {
        let line = line?;
        out.write_all(line.as_bytes())?;
        out.write_all(b"\n")?;
        records += 1;
    }
    out.flush()?;
    Ok(records)
}

/// Rewrites each row's cell separator. Comma is the on-disk format and a
/// no-op; "tab" maps to the tab character; anything else joins literally.
fn reformat_delimiters(rows: Vec<String>, delimiter: &str) -> Vec<String> {
    let delimiter = match delimiter {
        "default" | "comma" | "," => return rows,
        "tab" => "\t",
        other => other,
    };

    rows.into_iter()
        .map(|row| {
            row.split(',')
                .map(str::trim)
                .collect::<Vec<_>>()
                .join(delimiter)
        })
        .collect()
}
