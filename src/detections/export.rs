use time::{macros::format_description, OffsetDateTime};

use super::repo_types::Detection;

const HEADER: [&str; 5] = ["S.N.", "Plate Number", "Detected At", "Source", "Image URL"];

/// `Jan 5, 2024, 03:07 PM` in UTC.
pub fn format_detected_at(ts: OffsetDateTime) -> String {
    let fmt = format_description!(
        "[month repr:short] [day padding:none], [year], [hour repr:12]:[minute] [period]"
    );
    ts.format(fmt).unwrap_or_else(|_| ts.to_string())
}

fn quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

fn line<I, S>(fields: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    fields
        .into_iter()
        .map(|f| quote(f.as_ref()))
        .collect::<Vec<_>>()
        .join(",")
}

/// Header plus one line per detection, every field double-quoted.
pub fn render_csv(rows: &[Detection]) -> String {
    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(line(HEADER));
    for (i, d) in rows.iter().enumerate() {
        lines.push(line([
            (i + 1).to_string(),
            d.plate_number.clone(),
            format_detected_at(d.detected_at),
            d.source.to_string(),
            d.image_url.clone().unwrap_or_else(|| "N/A".into()),
        ]));
    }
    lines.join("\n")
}

/// `detections-<epoch-millis>.csv`
pub fn export_file_name(now: OffsetDateTime) -> String {
    format!("detections-{}.csv", now.unix_timestamp_nanos() / 1_000_000)
}
