//! Explanatory document rendering.
//!
//! The narrative is a paginated Markdown document with a fixed section
//! order: header, data attestation, executive summary, one section per
//! non-empty facet, and a closing methodology section. Every page ends with
//! a running footer carrying the page number and provenance text.

use super::{Artifact, ArtifactKind, RenderSettings};
use crate::analysis::top_n;
use crate::models::{AggregateData, Counter, Facet, ReportRequest};

/// Render the narrative artifact.
pub fn render(request: &ReportRequest, aggregate: &AggregateData, settings: &RenderSettings) -> Artifact {
    let document = generate_document(request, aggregate, settings);
    Artifact {
        kind: ArtifactKind::Narrative,
        bytes: document.into_bytes(),
    }
}

/// Generate the full paginated document.
pub fn generate_document(
    request: &ReportRequest,
    aggregate: &AggregateData,
    settings: &RenderSettings,
) -> String {
    let mut body = String::new();

    body.push_str(&generate_header(request, aggregate));
    body.push_str(&generate_attestation());
    body.push_str(&generate_summary_section(aggregate));

    for facet in aggregate.present_facets() {
        body.push_str(&generate_facet_section(facet, aggregate, settings.top_n));
    }

    body.push_str(&generate_methodology_section(aggregate, settings.threshold));

    paginate(&body, settings.lines_per_page, &settings.provenance)
}

fn generate_header(request: &ReportRequest, aggregate: &AggregateData) -> String {
    let mut section = String::new();

    section.push_str("# Tourism Data Report\n\n");
    section.push_str(&format!("- **Request:** `{}`\n", inline(&request.id)));
    section.push_str(&format!(
        "- **Requester:** {} <{}>\n",
        inline(&request.requester.name),
        inline(&request.requester.email)
    ));
    if let Some(ref city) = request.requester.city {
        section.push_str(&format!("- **Requester City:** {}\n", inline(city)));
    }
    section.push_str(&format!("- **Period:** {}\n", request.period));
    if let Some(ref geo) = request.geo {
        section.push_str(&format!("- **Region:** {}\n", inline(&geo.to_string())));
    }
    match aggregate.metadata.generated_at {
        Some(at) => section.push_str(&format!(
            "- **Generated:** {}\n",
            at.format("%Y-%m-%d %H:%M:%S UTC")
        )),
        None => section.push_str("- **Generated:** not recorded\n"),
    }
    section.push('\n');

    section
}

fn generate_attestation() -> String {
    let mut section = String::new();

    section.push_str("> **Verified real data.** Every figure below was counted from records whose\n");
    section.push_str("> owners hold an active data-sharing consent, or taken from an integrated\n");
    section.push_str("> provider. No figure is estimated or simulated.\n\n");

    section
}

fn generate_summary_section(aggregate: &AggregateData) -> String {
    let meta = &aggregate.metadata;
    let mut section = String::new();

    section.push_str("## Executive Summary\n\n");
    section.push_str(&format!("- **Total records:** {}\n", meta.total_records));
    section.push_str(&format!(
        "- **Total interactions:** {}\n",
        aggregate.counters.total_interactions()
    ));
    if meta.sources.is_empty() {
        section.push_str("- **Sources:** none\n");
    } else {
        section.push_str(&format!("- **Sources:** {}\n", meta.sources.join(", ")));
    }
    section.push('\n');

    section
}

fn generate_facet_section(facet: Facet, aggregate: &AggregateData, top: usize) -> String {
    let mut section = String::new();

    section.push_str(&format!("## {}\n\n", facet.title()));

    if facet == Facet::Upstream {
        for block in &aggregate.upstream {
            section.push_str(&format!(
                "**{}:** {}\n\n",
                inline(&block.source_id),
                inline(&block.note)
            ));
        }
        section.push_str("The raw provider payload is included in the data export.\n\n");
        return section;
    }

    for dimension in facet.dimensions() {
        let counter = aggregate.counters.counter(*dimension);
        if counter.is_empty() {
            continue;
        }
        section.push_str(&format!("### {}\n\n", dimension.label()));
        section.push_str(&generate_ranked_table(counter, top));
    }

    section
}

/// Top-N table, count descending, ties in canonical key order.
fn generate_ranked_table(counter: &Counter, top: usize) -> String {
    let total = counter.values().fold(0u64, |sum, count| sum.saturating_add(*count));
    let mut table = String::new();

    table.push_str("| # | Category | Count | Share |\n");
    table.push_str("|:---:|:---|:---:|:---:|\n");
    for (rank, (category, count)) in top_n(counter, top).into_iter().enumerate() {
        let share = if total == 0 {
            0.0
        } else {
            count as f64 * 100.0 / total as f64
        };
        table.push_str(&format!(
            "| {} | {} | {} | {:.1}% |\n",
            rank + 1,
            inline(category),
            count,
            share
        ));
    }
    if counter.len() > top {
        table.push_str(&format!(
            "\n*{} further categories are listed in the data export.*\n",
            counter.len() - top
        ));
    }
    table.push('\n');

    table
}

fn generate_methodology_section(aggregate: &AggregateData, threshold: u64) -> String {
    let meta = &aggregate.metadata;
    let mut section = String::new();

    section.push_str("## Methodology\n\n");
    section.push_str(
        "Subject records were used only when their owner held an active, non-revoked\n",
    );
    section.push_str("data-sharing consent at the time of aggregation. Counts were merged per\n");
    section.push_str("category across sources without any subject-level data leaving its source.\n\n");
    section.push_str(&format!(
        "A report is published only when at least **{}** records are aggregated.\n\n",
        threshold
    ));

    section.push_str("### Sources\n\n");
    if meta.source_records.is_empty() {
        section.push_str("- none\n");
    }
    for (source, records) in &meta.source_records {
        section.push_str(&format!("- `{}`: {} records\n", inline(source), records));
    }
    for missing in &meta.unavailable {
        section.push_str(&format!(
            "- `{}`: 0 records ({})\n",
            inline(&missing.source_id),
            missing.reason
        ));
    }
    section.push('\n');

    section
}

/// Split `body` into pages of at most `lines_per_page` lines, each closed by
/// a running footer.
fn paginate(body: &str, lines_per_page: usize, provenance: &str) -> String {
    let lines: Vec<&str> = body.lines().collect();
    let pages: Vec<&[&str]> = lines.chunks(lines_per_page.max(1)).collect();
    let total = pages.len().max(1);

    let mut output = String::new();
    for (index, page) in pages.iter().enumerate() {
        for line in page.iter() {
            output.push_str(line);
            output.push('\n');
        }
        output.push_str(&generate_footer(index + 1, total, provenance));
    }
    if pages.is_empty() {
        output.push_str(&generate_footer(1, 1, provenance));
    }

    output
}

fn generate_footer(page: usize, total: usize, provenance: &str) -> String {
    format!("\n---\n*Page {} of {} | {}*\n\n", page, total, inline(provenance))
}

/// Keeps a value on one line and inside its table cell.
fn inline(text: &str) -> String {
    text.replace('|', "\\|").replace(['\r', '\n'], " ")
}
