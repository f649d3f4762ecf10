//! Card Templates - Note-Type Kinds and Field References
//!
//! Template text is parsed into literal text and `{{...}}` field references so the
//! reversed card can be derived by renaming references, never by raw text replacement.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::SourceLayout;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Failed to read template {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Card layout variant. Decides field names and how many card templates exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoteTypeKind {
    Standard,
    Reversible,
    Cloze,
}

impl NoteTypeKind {
    /// Kind for a template directory name; unknown names are standard front/back.
    pub fn from_dir_name(name: &str) -> Self {
        match name {
            "basic_reverse" => Self::Reversible,
            "cloze" => Self::Cloze,
            _ => Self::Standard,
        }
    }

    pub fn field_names(&self) -> [&'static str; 2] {
        match self {
            Self::Cloze => ["Text", "Back Extra"],
            Self::Standard | Self::Reversible => ["Front", "Back"],
        }
    }
}

/// A note-type as found on disk: directory name plus the kind it maps to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteKind {
    pub name: String,
    pub kind: NoteTypeKind,
}

impl NoteKind {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let kind = NoteTypeKind::from_dir_name(&name);
        Self { name, kind }
    }

    /// Human label used in the note-type name.
    pub fn label(&self) -> &str {
        match self.name.as_str() {
            "basic" => "Basic",
            "basic_reverse" => "Reverse",
            "cloze" => "Cloze",
            other => other,
        }
    }

    /// Deck path segment: `basic_reverse` -> `Basic reverse`.
    pub fn deck_segment(&self) -> String {
        capitalize(&self.name).replace('_', " ")
    }
}

/// First character upper-cased, the rest lower-cased.
pub fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// `{{...}}` tag naming a field, e.g. `{{Front}}`, `{{edit:Front}}`, `{{#Back}}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRef {
    /// Sigil and filter chain up to the field name, e.g. `edit:`.
    pub prefix: String,
    pub field: String,
    /// Whitespace between the field name and `}}`.
    pub suffix: String,
}

impl FieldRef {
    fn parse(inner: &str) -> Self {
        let trimmed = inner.trim_end();
        let suffix = inner[trimmed.len()..].to_string();
        let split = match trimmed.rfind(':') {
            Some(i) => i + 1,
            None => {
                let lead = trimmed.len() - trimmed.trim_start().len();
                let sigil = trimmed[lead..].starts_with(&['#', '/', '^'][..]) as usize;
                lead + sigil
            }
        };
        Self {
            prefix: trimmed[..split].to_string(),
            field: trimmed[split..].to_string(),
            suffix,
        }
    }

    /// Filter chain without the trailing colon, e.g. `edit` for `{{edit:Front}}`.
    pub fn filters(&self) -> &str {
        self.prefix.trim().trim_start_matches(&['#', '/', '^'][..]).trim_end_matches(':')
    }

    pub fn is_display(&self) -> bool {
        self.prefix.trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    Field(FieldRef),
}

/// Template text split into literal text and field references.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TemplateText {
    pub segments: Vec<Segment>,
}

impl TemplateText {
    pub fn parse(source: &str) -> Self {
        let mut segments = vec![];
        let mut rest = source;
        while let Some(open) = rest.find("{{") {
            let after = &rest[open + 2..];
            let Some(close) = after.find("}}") else { break };
            let inner = &after[..close];
            if open > 0 {
                segments.push(Segment::Text(rest[..open].to_string()));
            }
            if inner.trim_start().starts_with('!') || inner.contains("{{") {
                segments.push(Segment::Text(format!("{{{{{}}}}}", inner)));
            } else {
                segments.push(Segment::Field(FieldRef::parse(inner)));
            }
            rest = &after[close + 2..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Text(rest.to_string()));
        }
        Self { segments }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Field(r) => {
                    out.push_str("{{");
                    out.push_str(&r.prefix);
                    out.push_str(&r.field);
                    out.push_str(&r.suffix);
                    out.push_str("}}");
                }
            }
        }
        out
    }

    pub fn field_refs(&self) -> impl Iterator<Item = &FieldRef> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Field(r) => Some(r),
            Segment::Text(_) => None,
        })
    }

    /// Exchange every reference to `a` with `b` and vice versa, in one pass.
    pub fn swap_fields(&self, a: &str, b: &str) -> Self {
        let segments = self
            .segments
            .iter()
            .map(|segment| match segment {
                Segment::Field(r) if r.field == a || r.field == b => {
                    let field = if r.field == a { b } else { a };
                    Segment::Field(FieldRef { field: field.to_string(), ..r.clone() })
                }
                other => other.clone(),
            })
            .collect();
        Self { segments }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardTemplate {
    pub name: String,
    pub qfmt: String,
    pub afmt: String,
}

impl CardTemplate {
    /// Same card with the front and back fields trading places.
    pub fn reversed(&self, name: impl Into<String>) -> Self {
        let [front, back] = NoteTypeKind::Reversible.field_names();
        Self {
            name: name.into(),
            qfmt: TemplateText::parse(&self.qfmt).swap_fields(front, back).render(),
            afmt: TemplateText::parse(&self.afmt).swap_fields(front, back).render(),
        }
    }
}

/// Front/back template text of one note-type, shared by every theme.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateSource {
    pub front: String,
    pub back: String,
}

impl TemplateSource {
    pub fn load(layout: &SourceLayout, kind: &str) -> Result<Self, TemplateError> {
        Ok(Self {
            front: read(&layout.front_template(kind))?,
            back: read(&layout.back_template(kind))?,
        })
    }

    /// One card for standard and cloze note-types, a second reversed card for reversible ones.
    pub fn card_templates(&self, kind: NoteTypeKind) -> Vec<CardTemplate> {
        let first = CardTemplate {
            name: "Card 1".to_string(),
            qfmt: self.front.clone(),
            afmt: self.back.clone(),
        };
        match kind {
            NoteTypeKind::Reversible => {
                let second = first.reversed("Card 2");
                vec![first, second]
            }
            NoteTypeKind::Standard | NoteTypeKind::Cloze => vec![first],
        }
    }
}

fn read(path: &Path) -> Result<String, TemplateError> {
    fs::read_to_string(path).map_err(|source| TemplateError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Note-type directory names under `templates_dir`, sorted.
pub fn discover_kinds(templates_dir: &Path) -> Result<Vec<String>, TemplateError> {
    let err = |source| TemplateError::Read { path: templates_dir.to_path_buf(), source };
    let mut kinds = vec![];
    if !templates_dir.is_dir() {
        return Ok(kinds);
    }
    for entry in fs::read_dir(templates_dir).map_err(err)? {
        let path = entry.map_err(err)?.path();
        if path.is_dir() {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                kinds.push(name.to_string());
            }
        }
    }
    kinds.sort();
    Ok(kinds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_render_is_lossless() {
        let src = "<div>{{edit:Front}}</div>{{#Back}}{{ Back }}{{/Back}}{{! note }}{{FrontSide}} {{ dangling";
        assert_eq!(TemplateText::parse(src).render(), src);
    }

    #[test]
    fn test_field_ref_parts() {
        let t = TemplateText::parse("{{edit:Front}}{{#Back}}{{cloze:Text}}{{Back}}");
        let refs: Vec<_> = t.field_refs().collect();
        assert_eq!(refs[0].filters(), "edit");
        assert_eq!(refs[0].field, "Front");
        assert_eq!(refs[1].field, "Back");
        assert!(!refs[1].is_display());
        assert_eq!(refs[2].filters(), "cloze");
        assert!(refs[3].is_display());
    }

    #[test]
    fn test_reversed_card_swaps_direction() {
        let card = CardTemplate {
            name: "Card 1".to_string(),
            qfmt: "<div class=q>{{edit:Front}}</div>".to_string(),
            afmt: "<div class=q>{{edit:Front}}</div><hr id=answer>{{Back}}".to_string(),
        };
        let reversed = card.reversed("Card 2");
        assert_eq!(reversed.name, "Card 2");
        assert_eq!(reversed.qfmt, "<div class=q>{{edit:Back}}</div>");
        assert_eq!(reversed.afmt, "<div class=q>{{edit:Back}}</div><hr id=answer>{{Front}}");
    }

    #[test]
    fn test_swap_has_no_double_substitution() {
        let t = TemplateText::parse("{{Front}}|{{Back}}|{{edit:Back}}|{{FrontSide}}");
        assert_eq!(
            t.swap_fields("Front", "Back").render(),
            "{{Back}}|{{Front}}|{{edit:Front}}|{{FrontSide}}"
        );
    }

    #[test]
    fn test_card_template_counts() {
        let source = TemplateSource {
            front: "{{edit:Front}}".to_string(),
            back: "{{edit:Front}}{{Back}}".to_string(),
        };
        assert_eq!(source.card_templates(NoteTypeKind::Standard).len(), 1);
        assert_eq!(source.card_templates(NoteTypeKind::Cloze).len(), 1);
        let cards = source.card_templates(NoteTypeKind::Reversible);
        assert_eq!(cards.len(), 2);
        assert_eq!(cards[0].qfmt, source.front);
        assert_eq!(cards[0].afmt, source.back);
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(NoteKind::new("basic_reverse").kind, NoteTypeKind::Reversible);
        assert_eq!(NoteKind::new("basic_reverse").label(), "Reverse");
        assert_eq!(NoteKind::new("basic_reverse").deck_segment(), "Basic reverse");
        assert_eq!(NoteKind::new("image_occlusion").label(), "image_occlusion");
        assert_eq!(NoteKind::new("image_occlusion").kind, NoteTypeKind::Standard);
        assert_eq!(NoteTypeKind::Cloze.field_names(), ["Text", "Back Extra"]);
        assert_eq!(capitalize("nORD"), "Nord");
    }
}
