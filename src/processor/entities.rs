//! Legal entity extraction

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::LazyLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Reference to a numbered statute, e.g. `Lei nº 8.078/1990`
    Statute,
    Article,
    /// Numbered appellate decision (acórdão)
    CourtDecision,
    /// Unified CNJ process number
    ProcessNumber,
    /// Rapporteur citation, e.g. `REsp 1, Rel. Min. Fux`
    Citation,
    Court,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Statute => "statute",
            Self::Article => "article",
            Self::CourtDecision => "court_decision",
            Self::ProcessNumber => "process_number",
            Self::Citation => "citation",
            Self::Court => "court",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed reference found in document text
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Entity {
    pub kind: EntityKind,
    pub value: String,
}

struct EntityPattern {
    kind: EntityKind,
    regex: Regex,
    render: fn(&Captures) -> String,
}

fn pattern(kind: EntityKind, regex: &str, render: fn(&Captures) -> String) -> EntityPattern {
    EntityPattern {
        kind,
        regex: Regex::new(regex).unwrap(),
        render,
    }
}

static PATTERNS: LazyLock<Vec<EntityPattern>> = LazyLock::new(|| {
    vec![
        pattern(
            EntityKind::Statute,
            r"(?i)\bLei\s+n[º°o.]?\s*(\d+(?:\.\d+)*)\s*[/-]\s*(\d{4})",
            |c| format!("Lei nº {}/{}", &c[1], &c[2]),
        ),
        pattern(
            EntityKind::Article,
            r"(?i)\bart(?:igo)?\s*\.?\s*(\d+)",
            |c| format!("Artigo {}", &c[1]),
        ),
        pattern(
            EntityKind::CourtDecision,
            r"(?i)\bAC(?:ÓRDÃO)?\s*n[º°]\s*(\d+)",
            |c| format!("Acórdão nº {}", &c[1]),
        ),
        pattern(
            EntityKind::ProcessNumber,
            r"\b\d{7}-\d{2}\.\d{4}\.\d\.\d{2}\.\d{4}\b",
            |c| c[0].to_string(),
        ),
        pattern(
            EntityKind::Citation,
            r"(?i)\b\w+\s*,\s*(?:Rel\.|Relator)\s*Min\.\s*\w+",
            |c| c[0].to_string(),
        ),
        pattern(
            EntityKind::Court,
            r"\b(?:STF|STJ|TST|TSE|STM|TRF[1-6]?|TRT\d{0,2}|TJ[A-Z]{2})\b",
            |c| c[0].to_string(),
        ),
        pattern(
            EntityKind::Court,
            r"(?i)\b(?:supremo tribunal federal|superior tribunal de justiça|tribunal superior do trabalho|tribunal superior eleitoral|superior tribunal militar)\b",
            |c| court_acronym(&c[0]).to_string(),
        ),
    ]
});

fn court_acronym(name: &str) -> &'static str {
    match name.to_lowercase().as_str() {
        "supremo tribunal federal" => "STF",
        "superior tribunal de justiça" => "STJ",
        "tribunal superior do trabalho" => "TST",
        "tribunal superior eleitoral" => "TSE",
        _ => "STM",
    }
}

/// Extracts legal entities in order of first appearance
///
/// Each distinct (kind, value) pair appears once. Text that matches no
/// pattern is simply ignored.
pub fn extract_entities(text: &str) -> Vec<Entity> {
    let mut found: Vec<(usize, usize, Entity)> = Vec::new();

    for (rank, p) in PATTERNS.iter().enumerate() {
        for caps in p.regex.captures_iter(text) {
            let start = caps.get(0).map(|m| m.start()).unwrap_or(0);
            found.push((
                start,
                rank,
                Entity {
                    kind: p.kind,
                    value: (p.render)(&caps),
                },
            ));
        }
    }

    found.sort_by_key(|(start, rank, _)| (*start, *rank));

    let mut seen = HashSet::new();
    found
        .into_iter()
        .filter_map(|(_, _, entity)| seen.insert(entity.clone()).then_some(entity))
        .collect()
}
