//! Structured workbook export.
//!
//! One sheet per non-empty facet, then a final `Metadata` sheet. Category
//! rows are ordered by count descending, ties by category key.

use super::{Artifact, ArtifactKind};
use crate::analysis::ranked;
use crate::error::PipelineError;
use crate::models::{AggregateData, Facet, ReportRequest};
use rust_xlsxwriter::{Format, Workbook, Worksheet, XlsxError};
use serde_json::Value;

pub const METADATA_SHEET: &str = "Metadata";

/// Characters per cell; Excel refuses strings above 32,767.
const MAX_CELL_CHARS: usize = 32_000;

/// Render the export artifact.
pub fn render(request: &ReportRequest, aggregate: &AggregateData) -> Result<Artifact, PipelineError> {
    let bytes = build_workbook(request, aggregate).map_err(|e| PipelineError::Render {
        kind: ArtifactKind::Export.slug(),
        message: e.to_string(),
    })?;

    Ok(Artifact {
        kind: ArtifactKind::Export,
        bytes,
    })
}

fn build_workbook(request: &ReportRequest, aggregate: &AggregateData) -> Result<Vec<u8>, XlsxError> {
    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();

    for facet in aggregate.present_facets() {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(facet.title())?;
        if facet == Facet::Upstream {
            write_upstream_sheet(worksheet, aggregate, &bold)?;
        } else {
            write_facet_sheet(worksheet, facet, aggregate, &bold)?;
        }
    }

    let worksheet = workbook.add_worksheet();
    worksheet.set_name(METADATA_SHEET)?;
    write_metadata_sheet(worksheet, request, aggregate, &bold)?;

    workbook.save_to_buffer()
}

fn write_facet_sheet(
    worksheet: &mut Worksheet,
    facet: Facet,
    aggregate: &AggregateData,
    header: &Format,
) -> Result<(), XlsxError> {
    for (col, title) in ["Dimension", "Category", "Count"].iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, *title, header)?;
    }

    let mut row: u32 = 1;
    for dimension in facet.dimensions() {
        for (category, count) in ranked(aggregate.counters.counter(*dimension)) {
            worksheet.write_string(row, 0, dimension.label())?;
            worksheet.write_string(row, 1, clip(category))?;
            worksheet.write_number(row, 2, count as f64)?;
            row += 1;
        }
    }

    worksheet.set_column_width(0, 18)?;
    worksheet.set_column_width(1, 32)?;
    Ok(())
}

fn write_upstream_sheet(
    worksheet: &mut Worksheet,
    aggregate: &AggregateData,
    header: &Format,
) -> Result<(), XlsxError> {
    for (col, title) in ["Source", "Note", "Key", "Part", "Value"].iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, *title, header)?;
    }

    let mut row: u32 = 1;
    for block in &aggregate.upstream {
        worksheet.write_string(row, 1, clip(&block.note))?;
        for (key, value) in payload_entries(&block.payload) {
            for (part, chunk) in split_chars(&value, MAX_CELL_CHARS).into_iter().enumerate() {
                worksheet.write_string(row, 0, clip(&block.source_id))?;
                worksheet.write_string(row, 2, clip(&key))?;
                worksheet.write_number(row, 3, (part + 1) as f64)?;
                worksheet.write_string(row, 4, chunk)?;
                row += 1;
            }
        }
    }

    worksheet.set_column_width(1, 60)?;
    worksheet.set_column_width(4, 80)?;
    Ok(())
}

/// One entry per top-level key of the payload, values as JSON text.
fn payload_entries(payload: &Value) -> Vec<(String, String)> {
    match payload {
        Value::Object(map) if !map.is_empty() => map
            .iter()
            .map(|(key, value)| (key.clone(), value.to_string()))
            .collect(),
        other => vec![("payload".to_string(), other.to_string())],
    }
}

/// Splits on char boundaries into pieces of at most `max` chars.
fn split_chars(text: &str, max: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut count = 0;
    for (index, _) in text.char_indices() {
        if count == max {
            pieces.push(&text[start..index]);
            start = index;
            count = 0;
        }
        count += 1;
    }
    pieces.push(&text[start..]);
    pieces
}

fn clip(text: &str) -> &str {
    split_chars(text, MAX_CELL_CHARS)[0]
}

fn write_metadata_sheet(
    worksheet: &mut Worksheet,
    request: &ReportRequest,
    aggregate: &AggregateData,
    header: &Format,
) -> Result<(), XlsxError> {
    let meta = &aggregate.metadata;
    let period = meta.period.unwrap_or(request.period);

    worksheet.write_string_with_format(0, 0, "Field", header)?;
    worksheet.write_string_with_format(0, 1, "Value", header)?;

    let unavailable = meta
        .unavailable
        .iter()
        .map(|u| format!("{} ({})", u.source_id, u.reason))
        .collect::<Vec<_>>()
        .join(", ");
    let generated_at = meta
        .generated_at
        .map(|at| at.to_rfc3339())
        .unwrap_or_default();

    let text_rows: [(&str, String); 7] = [
        ("Request", request.id.clone()),
        ("Period start", period.start.format("%Y-%m-%d").to_string()),
        ("Period end", period.end.format("%Y-%m-%d").to_string()),
        ("Sources", meta.sources.join(", ")),
        ("Unavailable sources", unavailable),
        ("Validation status", meta.validation_status.to_string()),
        ("Generated at", generated_at),
    ];
    let number_rows: [(&str, u64); 2] = [
        ("Total records", meta.total_records),
        ("Total interactions", aggregate.counters.total_interactions()),
    ];

    let mut row: u32 = 1;
    for (field, value) in &text_rows {
        worksheet.write_string(row, 0, *field)?;
        worksheet.write_string(row, 1, clip(value))?;
        row += 1;
    }
    for (field, value) in &number_rows {
        worksheet.write_string(row, 0, *field)?;
        worksheet.write_number(row, 1, *value as f64)?;
        row += 1;
    }

    worksheet.set_column_width(0, 22)?;
    worksheet.set_column_width(1, 48)?;
    Ok(())
}
