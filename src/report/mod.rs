//! Report rendering.
//!
//! Both renderers are stateless and read the same approved aggregate. They
//! format counts; they never derive new ones.

pub mod export;
pub mod narrative;

use crate::analysis::MIN_DISCLOSURE_THRESHOLD;
use crate::error::PipelineError;
use crate::models::{AggregateData, ReportRequest};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The two deliverables a request can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Narrative,
    Export,
}

impl ArtifactKind {
    pub fn slug(&self) -> &'static str {
        match self {
            ArtifactKind::Narrative => "narrative",
            ArtifactKind::Export => "export",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ArtifactKind::Narrative => "md",
            ArtifactKind::Export => "xlsx",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ArtifactKind::Narrative => "text/markdown; charset=utf-8",
            ArtifactKind::Export => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.slug())
    }
}

/// A rendered, opaque deliverable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub bytes: Vec<u8>,
}

impl Artifact {
    pub fn content_type(&self) -> &'static str {
        self.kind.content_type()
    }

    pub fn extension(&self) -> &'static str {
        self.kind.extension()
    }
}

/// Presentation knobs shared by the renderers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderSettings {
    /// Rows per ranked table in the narrative.
    pub top_n: usize,
    /// Line budget of one narrative page, footer excluded.
    pub lines_per_page: usize,
    /// Threshold restated in the methodology section.
    pub threshold: u64,
    /// Running footer text identifying the publisher.
    pub provenance: String,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            top_n: 10,
            lines_per_page: 60,
            threshold: MIN_DISCLOSURE_THRESHOLD,
            provenance: "Aggregated tourism statistics from consented records".to_string(),
        }
    }
}

/// Render one artifact of the given kind.
pub fn render(
    kind: ArtifactKind,
    request: &ReportRequest,
    aggregate: &AggregateData,
    settings: &RenderSettings,
) -> Result<Artifact, PipelineError> {
    match kind {
        ArtifactKind::Narrative => Ok(narrative::render(request, aggregate, settings)),
        ArtifactKind::Export => export::render(request, aggregate),
    }
}

/// The artifact kinds a request asks for, narrative first.
pub fn requested_kinds(request: &ReportRequest) -> Vec<ArtifactKind> {
    let mut kinds = Vec::with_capacity(2);
    if request.kind.wants_narrative() {
        kinds.push(ArtifactKind::Narrative);
    }
    if request.kind.wants_export() {
        kinds.push(ArtifactKind::Export);
    }
    kinds
}
