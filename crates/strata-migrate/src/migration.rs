//! The migration record and its on-disk format.
//!
//! A migration file is a plain-text record of named sections in a fixed
//! order:
//!
//! ```text
//! Description: add the widgets table
//! Created: 2026-08-01 12:00:00 UTC
//! Depends: root users
//! Apply:
//!   CREATE TABLE widgets (id INTEGER PRIMARY KEY);
//! Revert:
//!   DROP TABLE widgets;
//! ```
//!
//! `Description:`, `Created:` and `Depends:` are single-line. `Apply:` and
//! `Revert:` bodies are the following lines, each blank or indented by two
//! spaces, terminated by the next field or end of file. `Revert:` may be
//! absent entirely, making the migration one-way. Duplicate fields, unknown
//! fields and unindented trailing content are parse errors.
//!
//! The migration id is the file stem; it never appears inside the file.

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::path::Path;

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::error::{MigrateError, Result};

/// File extension for migrations in a store, without the leading dot.
pub const MIGRATION_EXTENSION: &str = "yml";

/// Id of the internal bootstrap migration that creates the ledger.
///
/// Every user-authored migration ultimately depends on this id. It does not
/// need to exist as a file in the store; the coordinator injects a synthetic
/// migration for it when absent.
pub const BOOTSTRAP_ID: &str = "root";

/// Timestamp format of the `Created:` field.
const CREATED_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

/// A named unit of schema change: forward and backward SQL plus declared
/// dependencies on other migrations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    /// Unique id within a store; doubles as the filename stem.
    pub id: String,
    /// Ids of migrations that must be applied before this one.
    pub depends: BTreeSet<String>,
    /// Free-text description, informational.
    pub description: String,
    /// Creation timestamp, informational.
    pub created: DateTime<Utc>,
    /// SQL executed to install the migration.
    pub apply: String,
    /// SQL executed to uninstall the migration; `None` makes it one-way.
    pub revert: Option<String>,
}

impl Migration {
    /// Parses a migration file's contents. `id` is the file stem and `path`
    /// is used for error reporting only.
    pub fn parse(id: &str, contents: &str, path: &Path) -> Result<Self> {
        if !is_valid_id(id) {
            return Err(MigrateError::InvalidId(id.to_string()));
        }

        let mut parser = FileParser {
            path,
            lines: contents.lines().collect(),
            pos: 0,
        };

        let description = parser.header("Description")?;
        let created_raw = parser.header("Created")?;
        let created = NaiveDateTime::parse_from_str(&created_raw, CREATED_FORMAT)
            .map(|dt| dt.and_utc())
            .map_err(|e| MigrateError::ParseError {
                path: path.to_path_buf(),
                line: parser.pos,
                message: format!("invalid Created timestamp '{created_raw}': {e}"),
            })?;
        let depends = parser
            .header("Depends")?
            .split_whitespace()
            .map(str::to_string)
            .collect();
        let apply = parser.body("Apply")?;
        let revert = if parser.pos < parser.lines.len() {
            Some(parser.body("Revert")?)
        } else {
            None
        };
        if parser.pos < parser.lines.len() {
            return Err(parser.error("unexpected content after the Revert section".to_string()));
        }

        Ok(Self {
            id: id.to_string(),
            depends,
            description,
            created,
            apply,
            revert,
        })
    }

    /// Renders the migration back into its file representation.
    #[must_use]
    pub fn to_file_string(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Description: {}", self.description);
        let _ = writeln!(out, "Created: {}", self.created.format(CREATED_FORMAT));
        if self.depends.is_empty() {
            out.push_str("Depends:\n");
        } else {
            let depends: Vec<&str> = self.depends.iter().map(String::as_str).collect();
            let _ = writeln!(out, "Depends: {}", depends.join(" "));
        }
        out.push_str("Apply:\n");
        render_body(&mut out, &self.apply);
        if let Some(revert) = &self.revert {
            out.push_str("Revert:\n");
            render_body(&mut out, revert);
        }
        out
    }

    /// An empty migration skeleton for `new`, timestamped now.
    #[must_use]
    pub fn template(id: &str) -> Self {
        Self {
            id: id.to_string(),
            depends: BTreeSet::new(),
            description: "(no description)".to_string(),
            created: Utc::now(),
            apply: String::new(),
            revert: Some(String::new()),
        }
    }

    /// Whether this migration can be reverted.
    #[must_use]
    pub fn is_reversible(&self) -> bool {
        self.revert.is_some()
    }
}

/// The hard-coded internal migration that stands for ledger creation.
///
/// Its SQL is empty: the backend's `bootstrap` owns the ledger DDL and
/// records [`BOOTSTRAP_ID`] in the same breath, so this migration is never
/// executed through `apply_migration`. It exists so that `Depends: root`
/// always resolves in the graph.
#[must_use]
pub fn bootstrap() -> Migration {
    Migration {
        id: BOOTSTRAP_ID.to_string(),
        depends: BTreeSet::new(),
        description: "create the migration ledger".to_string(),
        created: DateTime::UNIX_EPOCH,
        apply: String::new(),
        revert: None,
    }
}

/// Writes a body string back in its indented on-disk form, the inverse of
/// [`FileParser::body`].
fn render_body(out: &mut String, body: &str) {
    if body.is_empty() {
        return;
    }
    for line in body.split('\n') {
        if line.is_empty() {
            out.push('\n');
        } else {
            out.push_str("  ");
            out.push_str(line);
            out.push('\n');
        }
    }
}

/// Whether `id` is acceptable as a migration id and filename stem.
#[must_use]
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && !id.starts_with('.')
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

/// Line-oriented cursor over a migration file.
struct FileParser<'a> {
    path: &'a Path,
    lines: Vec<&'a str>,
    pos: usize,
}

impl FileParser<'_> {
    fn error(&self, message: String) -> MigrateError {
        MigrateError::ParseError {
            path: self.path.to_path_buf(),
            line: self.pos + 1,
            message,
        }
    }

    /// Consumes a single-line `Field: value` header and returns the value.
    fn header(&mut self, field: &str) -> Result<String> {
        let Some(line) = self.lines.get(self.pos) else {
            return Err(self.error(format!("expected field '{field}:'")));
        };
        let value = line
            .strip_prefix(field)
            .and_then(|rest| rest.strip_prefix(':'))
            .ok_or_else(|| self.error(format!("expected field '{field}:', found '{line}'")))?;
        self.pos += 1;
        Ok(value.trim().to_string())
    }

    /// Consumes a `Field:` marker line and the indented body that follows.
    fn body(&mut self, field: &str) -> Result<String> {
        let Some(line) = self.lines.get(self.pos) else {
            return Err(self.error(format!("expected field '{field}:'")));
        };
        if line.trim_end() != format!("{field}:") {
            return Err(self.error(format!("expected field '{field}:', found '{line}'")));
        }
        self.pos += 1;

        let mut body: Vec<&str> = Vec::new();
        while let Some(line) = self.lines.get(self.pos) {
            if line.trim().is_empty() {
                body.push("");
            } else if let Some(stripped) = line.strip_prefix("  ") {
                body.push(stripped);
            } else {
                break;
            }
            self.pos += 1;
        }
        while body.last() == Some(&"") {
            body.pop();
        }
        Ok(body.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(contents: &str) -> Result<Migration> {
        Migration::parse("widgets", contents, Path::new("widgets.yml"))
    }

    #[test]
    fn test_parse_full_migration() {
        let m = parse(
            "Description: add the widgets table\n\
             Created: 2026-08-01 12:00:00 UTC\n\
             Depends: root users\n\
             Apply:\n\
             \x20 CREATE TABLE widgets (id INTEGER PRIMARY KEY);\n\
             Revert:\n\
             \x20 DROP TABLE widgets;\n",
        )
        .unwrap();

        assert_eq!(m.id, "widgets");
        assert_eq!(m.description, "add the widgets table");
        assert_eq!(
            m.depends,
            ["root", "users"].iter().map(|s| s.to_string()).collect()
        );
        assert_eq!(m.apply, "CREATE TABLE widgets (id INTEGER PRIMARY KEY);");
        assert_eq!(m.revert.as_deref(), Some("DROP TABLE widgets;"));
    }

    #[test]
    fn test_parse_missing_revert_is_one_way() {
        let m = parse(
            "Description: one way\n\
             Created: 2026-08-01 12:00:00 UTC\n\
             Depends:\n\
             Apply:\n\
             \x20 CREATE TABLE widgets (id INTEGER PRIMARY KEY);\n",
        )
        .unwrap();

        assert!(m.depends.is_empty());
        assert!(!m.is_reversible());
    }

    #[test]
    fn test_parse_multiline_body_preserves_blank_lines() {
        let m = parse(
            "Description: two statements\n\
             Created: 2026-08-01 12:00:00 UTC\n\
             Depends:\n\
             Apply:\n\
             \x20 CREATE TABLE a (id INTEGER);\n\
             \n\
             \x20 CREATE TABLE b (id INTEGER);\n",
        )
        .unwrap();

        assert_eq!(
            m.apply,
            "CREATE TABLE a (id INTEGER);\n\nCREATE TABLE b (id INTEGER);"
        );
    }

    #[test]
    fn test_parse_rejects_fields_out_of_order() {
        let err = parse(
            "Created: 2026-08-01 12:00:00 UTC\n\
             Description: swapped\n\
             Depends:\n\
             Apply:\n",
        )
        .unwrap_err();
        assert!(matches!(err, MigrateError::ParseError { line: 1, .. }));
    }

    #[test]
    fn test_parse_rejects_duplicate_field() {
        let err = parse(
            "Description: first\n\
             Description: second\n\
             Created: 2026-08-01 12:00:00 UTC\n\
             Depends:\n\
             Apply:\n",
        )
        .unwrap_err();
        assert!(matches!(err, MigrateError::ParseError { line: 2, .. }));
    }

    #[test]
    fn test_parse_rejects_unknown_field() {
        let err = parse(
            "Description: d\n\
             Created: 2026-08-01 12:00:00 UTC\n\
             Depends:\n\
             Apply:\n\
             \x20 SELECT 1;\n\
             Notes: not a field\n",
        )
        .unwrap_err();
        assert!(matches!(err, MigrateError::ParseError { line: 6, .. }));
    }

    #[test]
    fn test_parse_rejects_trailing_garbage() {
        let err = parse(
            "Description: d\n\
             Created: 2026-08-01 12:00:00 UTC\n\
             Depends:\n\
             Apply:\n\
             \x20 SELECT 1;\n\
             Revert:\n\
             \x20 SELECT 1;\n\
             garbage\n",
        )
        .unwrap_err();
        assert!(matches!(err, MigrateError::ParseError { .. }));
    }

    #[test]
    fn test_parse_rejects_bad_timestamp() {
        let err = parse(
            "Description: d\n\
             Created: yesterday\n\
             Depends:\n\
             Apply:\n",
        )
        .unwrap_err();
        assert!(matches!(err, MigrateError::ParseError { line: 2, .. }));
    }

    #[test]
    fn test_render_round_trip() {
        let original = parse(
            "Description: add the widgets table\n\
             Created: 2026-08-01 12:00:00 UTC\n\
             Depends: root\n\
             Apply:\n\
             \x20 CREATE TABLE widgets (id INTEGER PRIMARY KEY);\n\
             \n\
             \x20 CREATE INDEX widgets_id ON widgets (id);\n\
             Revert:\n\
             \x20 DROP TABLE widgets;\n",
        )
        .unwrap();

        let reparsed = parse(&original.to_file_string()).unwrap();
        assert_eq!(original, reparsed);
    }

    #[test]
    fn test_template_round_trips() {
        let template = Migration::template("widgets");
        let reparsed = parse(&template.to_file_string()).unwrap();
        assert_eq!(reparsed.apply, "");
        assert_eq!(reparsed.revert.as_deref(), Some(""));
        assert!(reparsed.depends.is_empty());
    }

    #[test]
    fn test_id_validation() {
        assert!(is_valid_id("add_widgets"));
        assert!(is_valid_id("2026-08-01.widgets"));
        assert!(!is_valid_id(""));
        assert!(!is_valid_id(".hidden"));
        assert!(!is_valid_id("a/b"));
        assert!(!is_valid_id("a b"));
    }

    #[test]
    fn test_bootstrap_shape() {
        let root = bootstrap();
        assert_eq!(root.id, BOOTSTRAP_ID);
        assert!(root.depends.is_empty());
        assert!(!root.is_reversible());
    }
}
