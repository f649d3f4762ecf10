//! Package Assembly and Serialization
//!
//! Decks are written at three granularities: one note-type, one theme, and the
//! master package. Each package is an Anki `.apkg`: a zip holding a schema-11
//! SQLite collection and an empty media map.

use regex::Regex;
use rusqlite::{params, Connection};
use serde::Serialize;
use serde_json::{json, Map, Value};
use sha1::{Digest, Sha1};
use sha2::Sha256;
use std::collections::BTreeSet;
use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use crate::compose::{Deck, ModelType};
use crate::config::SourceLayout;
use crate::templates::TemplateText;

#[derive(Debug, Error)]
pub enum PackageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Collection error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Archive write error: {0}")]
    Encode(std::io::Error),
}

/// Serializes decks into an importable package file.
pub trait PackageWriter {
    /// Writes the package to `path` and returns the lowercase hex sha256 of its bytes.
    fn write(&self, decks: &[Deck], path: &Path) -> Result<String, PackageError>;
}

const SCHEMA: &str = r#"
CREATE TABLE col (
    id      integer primary key,
    crt     integer not null,
    mod     integer not null,
    scm     integer not null,
    ver     integer not null,
    dty     integer not null,
    usn     integer not null,
    ls      integer not null,
    conf    text not null,
    models  text not null,
    decks   text not null,
    dconf   text not null,
    tags    text not null
);
CREATE TABLE notes (
    id      integer primary key,
    guid    text not null,
    mid     integer not null,
    mod     integer not null,
    usn     integer not null,
    tags    text not null,
    flds    text not null,
    sfld    integer not null,
    csum    integer not null,
    flags   integer not null,
    data    text not null
);
CREATE TABLE cards (
    id      integer primary key,
    nid     integer not null,
    did     integer not null,
    ord     integer not null,
    mod     integer not null,
    usn     integer not null,
    type    integer not null,
    queue   integer not null,
    due     integer not null,
    ivl     integer not null,
    factor  integer not null,
    reps    integer not null,
    lapses  integer not null,
    left    integer not null,
    odue    integer not null,
    odid    integer not null,
    flags   integer not null,
    data    text not null
);
CREATE TABLE revlog (
    id      integer primary key,
    cid     integer not null,
    usn     integer not null,
    ease    integer not null,
    ivl     integer not null,
    lastIvl integer not null,
    factor  integer not null,
    time    integer not null,
    type    integer not null
);
CREATE TABLE graves (
    usn     integer not null,
    oid     integer not null,
    type    integer not null
);
CREATE INDEX ix_notes_usn on notes (usn);
CREATE INDEX ix_cards_usn on cards (usn);
CREATE INDEX ix_revlog_usn on revlog (usn);
CREATE INDEX ix_cards_nid on cards (nid);
CREATE INDEX ix_cards_sched on cards (did, queue, due);
CREATE INDEX ix_revlog_cid on revlog (cid);
CREATE INDEX ix_notes_csum on notes (csum);
"#;

const LATEX_PRE: &str = "\\documentclass[12pt]{article}\n\\special{papersize=3in,5in}\n\\usepackage[utf8]{inputenc}\n\\usepackage{amssymb,amsmath}\n\\pagestyle{empty}\n\\setlength{\\parindent}{0in}\n\\begin{document}\n";
const LATEX_POST: &str = "\\end{document}";
const FIELD_SEPARATOR: &str = "\x1f";
const DEFAULT_DECK_ID: i64 = 1;

/// Writes `.apkg` files.
#[derive(Debug, Default, Clone, Copy)]
pub struct ApkgWriter;

impl PackageWriter for ApkgWriter {
    fn write(&self, decks: &[Deck], path: &Path) -> Result<String, PackageError> {
        let bytes = self.encode(decks)?;
        let io_err = |source| PackageError::Io { path: path.to_path_buf(), source };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        fs::write(path, &bytes).map_err(io_err)?;
        Ok(sha256_hex(&bytes))
    }
}

impl ApkgWriter {
    /// The `.apkg` archive for `decks`, built in memory.
    pub fn encode(&self, decks: &[Deck]) -> Result<Vec<u8>, PackageError> {
        let scratch = tempfile::tempdir().map_err(|source| PackageError::Io {
            path: std::env::temp_dir(),
            source,
        })?;
        let collection_path = scratch.path().join("collection.anki2");

        let conn = Connection::open(&collection_path)?;
        write_collection(&conn, decks)?;
        conn.close().map_err(|(_, e)| e)?;

        let collection = fs::read(&collection_path).map_err(|source| PackageError::Io {
            path: collection_path.clone(),
            source,
        })?;

        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
        zip.start_file("collection.anki2", options)?;
        zip.write_all(&collection).map_err(PackageError::Encode)?;
        zip.start_file("media", options)?;
        zip.write_all(b"{}").map_err(PackageError::Encode)?;
        Ok(zip.finish()?.into_inner())
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

fn write_collection(conn: &Connection, decks: &[Deck]) -> Result<(), PackageError> {
    conn.execute_batch(SCHEMA)?;

    let now_ms = chrono::Utc::now().timestamp_millis();
    let now = now_ms / 1000;

    let mut models = Map::new();
    let mut deck_map = Map::new();
    deck_map.insert(DEFAULT_DECK_ID.to_string(), deck_json(DEFAULT_DECK_ID, "Default", now));
    for deck in decks {
        models.insert(deck.model.model_id.to_string(), model_json(deck, now));
        deck_map.insert(deck.id.to_string(), deck_json(deck.id, &deck.name, now));
    }

    let current_model = decks.first().map_or(Value::Null, |d| json!(d.model.model_id.to_string()));
    let conf = json!({
        "activeDecks": [DEFAULT_DECK_ID],
        "addToCur": true,
        "collapseTime": 1200,
        "curDeck": DEFAULT_DECK_ID,
        "curModel": current_model,
        "dueCounts": true,
        "estTimes": true,
        "newBury": true,
        "newSpread": 0,
        "nextPos": 1,
        "sortBackwards": false,
        "sortType": "noteFld",
        "timeLim": 0,
    });

    conn.execute(
        "INSERT INTO col VALUES (1, ?1, ?2, ?2, 11, 0, 0, 0, ?3, ?4, ?5, ?6, '{}')",
        params![
            now,
            now_ms,
            conf.to_string(),
            Value::Object(models).to_string(),
            Value::Object(deck_map).to_string(),
            deck_config_json().to_string(),
        ],
    )?;

    let mut next_id = now_ms;
    let mut due = 0i64;
    for deck in decks {
        let note = &deck.note;
        next_id += 1;
        let note_id = next_id;
        let first_field = note.fields.first().map(String::as_str).unwrap_or_default();
        let sort_field = strip_html(first_field);
        conn.execute(
            "INSERT INTO notes VALUES (?1, ?2, ?3, ?4, -1, ?5, ?6, ?7, ?8, 0, '')",
            params![
                note_id,
                note.guid,
                deck.model.model_id,
                now,
                format!(" {} ", note.tags.join(" ")),
                note.fields.join(FIELD_SEPARATOR),
                sort_field,
                field_checksum(&sort_field),
            ],
        )?;

        let ords = card_ords(deck);
        if ords.is_empty() {
            tracing::warn!("Note in deck '{}' generates no cards", deck.name);
        }
        for ord in ords {
            next_id += 1;
            due += 1;
            conn.execute(
                "INSERT INTO cards VALUES (?1, ?2, ?3, ?4, ?5, -1, 0, 0, ?6, 0, 0, 0, 0, 0, 0, 0, 0, '')",
                params![next_id, note_id, deck.id, ord, now, due],
            )?;
        }
    }
    Ok(())
}

/// Card ordinals a deck's note produces: one per template, or one per cloze number.
pub fn card_ords(deck: &Deck) -> Vec<i64> {
    match deck.model.model_type {
        ModelType::FrontBack => (0..deck.model.templates.len() as i64).collect(),
        ModelType::Cloze => {
            static RE: OnceLock<Regex> = OnceLock::new();
            let re = RE.get_or_init(|| Regex::new(r"\{\{c(\d+)::").expect("cloze pattern is valid"));
            let numbers: BTreeSet<i64> = deck
                .note
                .fields
                .iter()
                .flat_map(|f| re.captures_iter(f))
                .filter_map(|c| c[1].parse::<i64>().ok())
                .filter(|n| *n > 0)
                .collect();
            numbers.into_iter().map(|n| n - 1).collect()
        }
    }
}

fn model_json(deck: &Deck, now: i64) -> Value {
    let model = &deck.model;
    let field_names: Vec<&str> = model.fields.iter().map(|f| f.name.as_str()).collect();

    let tmpls: Vec<Value> = model
        .templates
        .iter()
        .enumerate()
        .map(|(ord, t)| {
            json!({
                "name": t.name,
                "ord": ord,
                "qfmt": t.qfmt,
                "afmt": t.afmt,
                "bqfmt": "",
                "bafmt": "",
                "bfont": "",
                "bsize": 0,
                "did": Value::Null,
            })
        })
        .collect();

    let flds: Vec<Value> = model
        .fields
        .iter()
        .enumerate()
        .map(|(ord, f)| {
            json!({
                "name": f.name,
                "ord": ord,
                "font": f.font,
                "size": 20,
                "sticky": false,
                "rtl": false,
                "media": [],
            })
        })
        .collect();

    // Fields referenced on each question side; Anki generates the card when any is non-empty.
    let req: Vec<Value> = model
        .templates
        .iter()
        .enumerate()
        .map(|(ord, t)| {
            let mut used: Vec<usize> = TemplateText::parse(&t.qfmt)
                .field_refs()
                .filter_map(|r| field_names.iter().position(|name| *name == r.field))
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            if used.is_empty() {
                used = (0..field_names.len()).collect();
            }
            json!([ord, "any", used])
        })
        .collect();

    let model_type = match model.model_type {
        ModelType::FrontBack => 0,
        ModelType::Cloze => 1,
    };

    json!({
        "id": model.model_id,
        "name": model.name,
        "type": model_type,
        "mod": now,
        "usn": -1,
        "sortf": 0,
        "did": deck.id,
        "tmpls": tmpls,
        "flds": flds,
        "css": model.css,
        "latexPre": LATEX_PRE,
        "latexPost": LATEX_POST,
        "latexsvg": false,
        "req": req,
        "tags": [],
        "vers": [],
    })
}

fn deck_json(id: i64, name: &str, now: i64) -> Value {
    json!({
        "id": id,
        "name": name,
        "desc": "",
        "collapsed": false,
        "browserCollapsed": false,
        "conf": 1,
        "dyn": 0,
        "extendNew": 10,
        "extendRev": 50,
        "lrnToday": [0, 0],
        "newToday": [0, 0],
        "revToday": [0, 0],
        "timeToday": [0, 0],
        "mod": now,
        "usn": -1,
    })
}

fn deck_config_json() -> Value {
    json!({
        "1": {
            "id": 1,
            "name": "Default",
            "autoplay": true,
            "dyn": false,
            "maxTaken": 60,
            "mod": 0,
            "usn": 0,
            "replayq": true,
            "timer": 0,
            "new": {
                "bury": true,
                "delays": [1, 10],
                "initialFactor": 2500,
                "ints": [1, 4, 7],
                "order": 1,
                "perDay": 20,
                "separate": true,
            },
            "rev": {
                "bury": true,
                "ease4": 1.3,
                "fuzz": 0.05,
                "ivlFct": 1,
                "maxIvl": 36500,
                "minSpace": 1,
                "perDay": 100,
            },
            "lapse": {
                "delays": [10],
                "leechAction": 0,
                "leechFails": 8,
                "minInt": 1,
                "mult": 0,
            },
        }
    })
}

fn strip_html(html: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"(?s)<.*?>").expect("tag pattern is valid"));
    re.replace_all(html, "").replace("&nbsp;", " ").trim().to_string()
}

/// First 8 hex digits of the SHA-1 of the sort field, as Anki's duplicate check expects.
fn field_checksum(text: &str) -> i64 {
    let digest = Sha1::digest(text.as_bytes());
    i64::from(u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "scope", rename_all = "camelCase")]
pub enum PackageScope {
    NoteType { theme: String, kind: String },
    Theme { theme: String },
    Master,
}

#[derive(Debug, Clone, Serialize)]
pub struct WrittenPackage {
    #[serde(flatten)]
    pub scope: PackageScope,
    pub path: PathBuf,
    pub decks: Vec<String>,
    /// sha256 of the package file as written.
    pub sha256: String,
}

/// Writes each aggregation level to its conventional path, in the order asked.
pub struct PackageAssembler<'a> {
    layout: &'a SourceLayout,
    slug: String,
    writer: &'a dyn PackageWriter,
    written: Vec<WrittenPackage>,
}

impl<'a> PackageAssembler<'a> {
    pub fn new(layout: &'a SourceLayout, slug: impl Into<String>, writer: &'a dyn PackageWriter) -> Self {
        Self {
            layout,
            slug: slug.into(),
            writer,
            written: vec![],
        }
    }

    pub fn write_note_type(&mut self, deck: &Deck) -> Result<(), PackageError> {
        let path = self.layout.note_type_package(&self.slug, deck.theme(), &deck.kind().name);
        let scope = PackageScope::NoteType {
            theme: deck.theme().to_string(),
            kind: deck.kind().name.clone(),
        };
        self.write(scope, std::slice::from_ref(deck), path)
    }

    pub fn write_theme(&mut self, theme: &str, decks: &[Deck]) -> Result<(), PackageError> {
        let path = self.layout.theme_package(&self.slug, theme);
        self.write(PackageScope::Theme { theme: theme.to_string() }, decks, path)
    }

    pub fn write_master(&mut self, decks: &[Deck]) -> Result<(), PackageError> {
        let path = self.layout.master_package(&self.slug);
        self.write(PackageScope::Master, decks, path)
    }

    pub fn finish(self) -> Vec<WrittenPackage> {
        self.written
    }

    fn write(&mut self, scope: PackageScope, decks: &[Deck], path: PathBuf) -> Result<(), PackageError> {
        let sha256 = self.writer.write(decks, &path)?;
        tracing::debug!("Wrote {} deck(s) to {} ({})", decks.len(), path.display(), sha256);
        self.written.push(WrittenPackage {
            scope,
            path,
            decks: decks.iter().map(|d| d.name.clone()).collect(),
            sha256,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::Composer;
    use crate::config::BuildConfig;
    use crate::ids::IdentifierTriple;
    use crate::style::Theme;
    use crate::templates::{NoteKind, TemplateSource};
    use std::fs::File;
    use std::io::Read;

    fn deck(kind: &str, n: i64) -> Deck {
        let config = BuildConfig::default();
        let theme = Theme {
            name: "nord".to_string(),
            font: "Rubik".to_string(),
            css: ".card {}".to_string(),
        };
        let source = TemplateSource {
            front: "{{edit:Front}}".to_string(),
            back: "{{edit:Front}}<hr>{{Back}}".to_string(),
        };
        let ids = IdentifierTriple {
            model_id: (1 << 30) + n,
            deck_id: (1 << 30) + 100 + n,
            note_id: (1 << 30) + 200 + n,
        };
        Composer::new(&config, "1.1.0").compose(&theme, &NoteKind::new(kind), &source, ids)
    }

    #[test]
    fn test_card_ords() {
        assert_eq!(card_ords(&deck("basic", 0)), vec![0]);
        assert_eq!(card_ords(&deck("basic_reverse", 1)), vec![0, 1]);
        assert_eq!(card_ords(&deck("cloze", 2)), vec![0]);
    }

    #[test]
    fn test_strip_html() {
        assert_eq!(strip_html("What is <b>Anki</b>?"), "What is Anki?");
        assert_eq!(strip_html("a&nbsp;<br>\nb"), "a \nb");
    }

    #[test]
    fn test_apkg_contains_populated_collection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("prettify-nord.apkg");
        let decks = vec![deck("basic", 0), deck("basic_reverse", 1), deck("cloze", 2)];
        let digest = ApkgWriter.write(&decks, &path).unwrap();
        assert_eq!(digest, sha256_hex(&fs::read(&path).unwrap()));

        let mut archive = zip::ZipArchive::new(File::open(&path).unwrap()).unwrap();
        let mut media = String::new();
        archive.by_name("media").unwrap().read_to_string(&mut media).unwrap();
        assert_eq!(media, "{}");

        let mut collection = Vec::new();
        archive.by_name("collection.anki2").unwrap().read_to_end(&mut collection).unwrap();
        let db_path = dir.path().join("collection.anki2");
        fs::write(&db_path, collection).unwrap();

        let conn = Connection::open(&db_path).unwrap();
        let notes: i64 = conn.query_row("SELECT count(*) FROM notes", [], |r| r.get(0)).unwrap();
        let cards: i64 = conn.query_row("SELECT count(*) FROM cards", [], |r| r.get(0)).unwrap();
        assert_eq!(notes, 3);
        assert_eq!(cards, 4);

        let guid: String = conn
            .query_row("SELECT guid FROM notes WHERE mid = ?1", [(1i64 << 30) + 1], |r| r.get(0))
            .unwrap();
        assert_eq!(guid, ((1i64 << 30) + 201).to_string());

        let decks_json: String = conn.query_row("SELECT decks FROM col", [], |r| r.get(0)).unwrap();
        let decks_json: Value = serde_json::from_str(&decks_json).unwrap();
        assert_eq!(
            decks_json[((1i64 << 30) + 102).to_string()]["name"],
            "Prettify::Nord::Cloze"
        );
    }

    #[test]
    fn test_sha256_hex() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    /// Reports the deck count as its digest so tests can see what reached each path.
    #[derive(Default)]
    struct NullWriter;

    impl PackageWriter for NullWriter {
        fn write(&self, decks: &[Deck], _path: &Path) -> Result<String, PackageError> {
            Ok(format!("{:064x}", decks.len()))
        }
    }

    #[test]
    fn test_assembler_paths_and_order() {
        let layout = SourceLayout::new(Path::new("/p"));
        let writer = NullWriter;
        let mut assembler = PackageAssembler::new(&layout, "prettify", &writer);
        let decks = vec![deck("basic", 0), deck("cloze", 2)];
        for d in &decks {
            assembler.write_note_type(d).unwrap();
        }
        assembler.write_theme("nord", &decks).unwrap();
        assembler.write_master(&decks).unwrap();

        let written = assembler.finish();
        let paths: Vec<_> = written.iter().map(|w| w.path.clone()).collect();
        assert_eq!(
            paths,
            vec![
                PathBuf::from("/p/themes/nord/notetypes/prettify-nord-basic.apkg"),
                PathBuf::from("/p/themes/nord/notetypes/prettify-nord-cloze.apkg"),
                PathBuf::from("/p/themes/nord/prettify-nord.apkg"),
                PathBuf::from("/p/prettify.apkg"),
            ]
        );
        assert_eq!(written[2].decks, vec!["Prettify::Nord::Basic", "Prettify::Nord::Cloze"]);
        assert_eq!(written[3].scope, PackageScope::Master);
        assert_eq!(written[0].sha256, format!("{:064x}", 1));
        assert_eq!(written[3].sha256, format!("{:064x}", 2));
    }
}
