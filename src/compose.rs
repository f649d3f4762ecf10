//! Note-Type Composition
//!
//! One (theme, note-type) unit becomes a deck holding the note-type definition
//! and a single demonstration note.

use serde::Serialize;

use crate::config::BuildConfig;
use crate::ids::IdentifierTriple;
use crate::style::Theme;
use crate::templates::{capitalize, CardTemplate, NoteKind, NoteTypeKind, TemplateSource};

const SAMPLE_QUESTION: &str = "What is <b>Anki</b>?";

const SAMPLE_ANSWER: &str = "<b>Anki</b>&nbsp;is a <u>free and open-source</u>&nbsp;flashcard&nbsp;program using&nbsp;<i>spaced repetition</i>, a technique from&nbsp;cognitive science&nbsp;for fast and long-lasting memorization.<br><br><img src='https://upload.wikimedia.org/wikipedia/commons/9/9a/Anki_2.1.6_screenshot.png'><br>Anki 2.1.6 screenshot (<a href='https://en.wikipedia.org/wiki/Anki_(software)'>https://en.wikipedia.org/wiki/Anki_(software)</a>)";

const SAMPLE_CLOZE_TEXT: &str = "<b>Anki</b>&nbsp;is a <u>free and open-source</u>&nbsp;{{c1::flashcard}}&nbsp;program using&nbsp;<i>spaced repetition</i>, a technique from&nbsp;cognitive science&nbsp;for fast and long-lasting memorization.<br><br><img src='https://upload.wikimedia.org/wikipedia/commons/9/9a/Anki_2.1.6_screenshot.png'>";

const SAMPLE_CLOZE_EXTRA: &str = "Anki 2.1.6 screenshot (<a href='https://en.wikipedia.org/wiki/Anki_(software)'>https://en.wikipedia.org/wiki/Anki_(software)</a>)";

/// Demonstration field contents for a kind.
pub fn sample_fields(kind: NoteTypeKind) -> [&'static str; 2] {
    match kind {
        NoteTypeKind::Cloze => [SAMPLE_CLOZE_TEXT, SAMPLE_CLOZE_EXTRA],
        NoteTypeKind::Standard | NoteTypeKind::Reversible => [SAMPLE_QUESTION, SAMPLE_ANSWER],
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ModelType {
    FrontBack,
    Cloze,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub font: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NoteTypeDefinition {
    pub model_id: i64,
    pub name: String,
    pub theme: String,
    pub kind: NoteKind,
    pub model_type: ModelType,
    pub fields: Vec<FieldDescriptor>,
    pub templates: Vec<CardTemplate>,
    pub css: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Note {
    pub guid: String,
    pub fields: Vec<String>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Deck {
    pub id: i64,
    pub name: String,
    pub model: NoteTypeDefinition,
    pub note: Note,
}

impl Deck {
    pub fn theme(&self) -> &str {
        &self.model.theme
    }

    pub fn kind(&self) -> &NoteKind {
        &self.model.kind
    }
}

/// Builds decks for one build version.
pub struct Composer<'a> {
    config: &'a BuildConfig,
    version: &'a str,
}

impl<'a> Composer<'a> {
    pub fn new(config: &'a BuildConfig, version: &'a str) -> Self {
        Self { config, version }
    }

    pub fn model_name(&self, kind: &NoteKind) -> String {
        format!(
            "{} {} v{} {}",
            self.config.namespace,
            kind.label(),
            self.version,
            self.config.attribution
        )
    }

    pub fn deck_name(&self, theme: &str, kind: &NoteKind) -> String {
        format!("{}::{}::{}", self.config.namespace, capitalize(theme), kind.deck_segment())
    }

    pub fn tags(&self, theme: &str, kind: &NoteKind) -> Vec<String> {
        let root = self.config.slug();
        vec![
            root.clone(),
            format!("{}::{}", root, theme),
            format!("{}::{}::{}", root, theme, kind.name),
        ]
    }

    pub fn note_type(
        &self,
        theme: &Theme,
        kind: &NoteKind,
        source: &TemplateSource,
        model_id: i64,
    ) -> NoteTypeDefinition {
        let fields = kind
            .kind
            .field_names()
            .iter()
            .map(|name| FieldDescriptor {
                name: name.to_string(),
                font: theme.font.clone(),
            })
            .collect();

        NoteTypeDefinition {
            model_id,
            name: self.model_name(kind),
            theme: theme.name.clone(),
            kind: kind.clone(),
            model_type: match kind.kind {
                NoteTypeKind::Cloze => ModelType::Cloze,
                NoteTypeKind::Standard | NoteTypeKind::Reversible => ModelType::FrontBack,
            },
            fields,
            templates: source.card_templates(kind.kind),
            css: theme.css.clone(),
        }
    }

    pub fn compose(
        &self,
        theme: &Theme,
        kind: &NoteKind,
        source: &TemplateSource,
        ids: IdentifierTriple,
    ) -> Deck {
        let note = Note {
            guid: ids.note_id.to_string(),
            fields: sample_fields(kind.kind).iter().map(|f| f.to_string()).collect(),
            tags: self.tags(&theme.name, kind),
        };

        Deck {
            id: ids.deck_id,
            name: self.deck_name(&theme.name, kind),
            model: self.note_type(theme, kind, source, ids.model_id),
            note,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn nord() -> Theme {
        Theme {
            name: "nord".to_string(),
            font: "Rubik".to_string(),
            css: ".card { color: #2e3440; }".to_string(),
        }
    }

    fn source() -> TemplateSource {
        TemplateSource {
            front: "<!-- Version: 1.1.0 -->{{edit:Front}}".to_string(),
            back: "{{edit:Front}}<hr id=answer>{{Back}}".to_string(),
        }
    }

    const IDS: IdentifierTriple = IdentifierTriple {
        model_id: 1607392319,
        deck_id: 1846325178,
        note_id: 1391265849,
    };

    #[test]
    fn test_compose_basic() {
        let config = BuildConfig::default();
        let composer = Composer::new(&config, "1.1.0");
        let deck = composer.compose(&nord(), &NoteKind::new("basic"), &source(), IDS);

        assert_eq!(deck.id, 1846325178);
        assert_eq!(deck.name, "Prettify::Nord::Basic");
        assert_eq!(deck.model.model_id, 1607392319);
        assert_eq!(deck.model.name, "Prettify Basic v1.1.0 (h0tp's mod)");
        assert_eq!(deck.model.model_type, ModelType::FrontBack);
        assert_eq!(deck.model.templates.len(), 1);
        assert_eq!(deck.model.css, ".card { color: #2e3440; }");
        assert_eq!(
            deck.model.fields,
            vec![
                FieldDescriptor { name: "Front".to_string(), font: "Rubik".to_string() },
                FieldDescriptor { name: "Back".to_string(), font: "Rubik".to_string() },
            ]
        );
        assert_eq!(deck.note.guid, "1391265849");
        assert_eq!(deck.note.tags, vec!["prettify", "prettify::nord", "prettify::nord::basic"]);
        assert_eq!(deck.note.fields[0], SAMPLE_QUESTION);
    }

    #[test]
    fn test_compose_reverse_has_two_cards() {
        let config = BuildConfig::default();
        let composer = Composer::new(&config, "1.1.0");
        let deck = composer.compose(&nord(), &NoteKind::new("basic_reverse"), &source(), IDS);

        assert_eq!(deck.name, "Prettify::Nord::Basic reverse");
        assert_eq!(deck.model.name, "Prettify Reverse v1.1.0 (h0tp's mod)");
        let names: Vec<_> = deck.model.templates.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Card 1", "Card 2"]);
        assert_eq!(deck.model.templates[1].afmt, "{{edit:Back}}<hr id=answer>{{Front}}");
    }

    #[test]
    fn test_compose_cloze_fields() {
        let config = BuildConfig::default();
        let composer = Composer::new(&config, "1.0");
        let deck = composer.compose(&nord(), &NoteKind::new("cloze"), &source(), IDS);

        assert_eq!(deck.model.model_type, ModelType::Cloze);
        let names: Vec<_> = deck.model.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["Text", "Back Extra"]);
        assert!(deck.note.fields[0].contains("{{c1::flashcard}}"));
    }

    #[test]
    fn test_unknown_kind_uses_raw_label() {
        let config = BuildConfig::default();
        let composer = Composer::new(&config, "1.0");
        let deck = composer.compose(&nord(), &NoteKind::new("typing"), &source(), IDS);
        assert_eq!(deck.model.name, "Prettify typing v1.0 (h0tp's mod)");
        assert_eq!(deck.note.fields.len(), 2);
    }
}
