//! Classification of free text by the heading markers the agents emit.

use serde::{Deserialize, Serialize};

use super::diagram::first_box_drawing;

/// Kind of content a piece of agent text carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ContentKind {
    Domain,
    BoundedContext,
    AsciiDiagram,
}

impl ContentKind {
    /// Result field the content is stored under.
    pub fn field(&self) -> &'static str {
        match self {
            ContentKind::Domain => "domainAnalysis",
            ContentKind::BoundedContext => "boundedContextAnalysis",
            ContentKind::AsciiDiagram => "asciiDiagram",
        }
    }
}

/// Heading markers, matched case-insensitively.
const TEXT_MARKERS: &[(ContentKind, &str)] = &[
    (ContentKind::BoundedContext, "bounded context"),
    (ContentKind::BoundedContext, "business context"),
    (ContentKind::Domain, "domain analysis"),
    (ContentKind::Domain, "domain model"),
];

/// Classify `text` by whichever marker occurs first.
///
/// A diagram counts as a marker at the position of its first box-drawing
/// character. Text with no marker is `None`.
pub fn classify_text(text: &str) -> Option<ContentKind> {
    let lower = text.to_lowercase();
    let mut best: Option<(usize, ContentKind)> = None;

    let mut consider = |pos: usize, kind: ContentKind| {
        if best.map_or(true, |(current, _)| pos < current) {
            best = Some((pos, kind));
        }
    };

    for (kind, marker) in TEXT_MARKERS {
        if let Some(pos) = lower.find(marker) {
            consider(pos, *kind);
        }
    }
    if let Some(pos) = first_box_drawing(&lower) {
        consider(pos, ContentKind::AsciiDiagram);
    }

    best.map(|(_, kind)| kind)
}
