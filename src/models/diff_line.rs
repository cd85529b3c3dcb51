//! Line-level view of a unified diff.
//!
//! A [`DiffFile`] owns its [`DiffLine`]s. Each line keeps a weak link back to
//! the file so that asking one line for its rendered text renders the whole
//! file in a single batch through the file's [`LineRenderer`].

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use std::sync::{Arc, OnceLock, Weak};

/// Change tag of a diff line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineType {
    /// Context line, serialized as `null`.
    Unchanged,
    Added,
    AddedNoNewline,
    Removed,
    RemovedNoNewline,
    /// Hunk header (`@@ -a,b +c,d @@`).
    Match,
}

impl LineType {
    /// Wire tag of the type; `None` for unchanged lines.
    pub fn as_tag(&self) -> Option<&'static str> {
        match self {
            Self::Unchanged => None,
            Self::Added => Some("new"),
            Self::AddedNoNewline => Some("new-nonewline"),
            Self::Removed => Some("old"),
            Self::RemovedNoNewline => Some("old-nonewline"),
            Self::Match => Some("match"),
        }
    }

}

impl Serialize for LineType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.as_tag() {
            Some(tag) => serializer.serialize_str(tag),
            None => serializer.serialize_none(),
        }
    }
}

/// Produces rendered (for example highlighted) text for the lines of a file.
pub trait LineRenderer: Send + Sync {
    /// Render `lines` of the file at `path`, one output per input line.
    fn render(&self, path: &str, lines: &[&str]) -> Vec<String>;
}

/// Renderer that HTML-escapes line text and nothing else.
#[derive(Debug, Default, Clone, Copy)]
pub struct EscapeRenderer;

impl LineRenderer for EscapeRenderer {
    fn render(&self, _path: &str, lines: &[&str]) -> Vec<String> {
        lines.iter().map(|line| escape_html(line)).collect()
    }
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// One line of a unified diff.
#[derive(Debug, Clone)]
pub struct DiffLine {
    pub text: String,
    pub line_type: LineType,

    /// Position of the line within its file.
    pub index: usize,

    pub old_pos: u32,
    pub new_pos: u32,

    rich_text: OnceLock<String>,
    parent_file: Weak<DiffFile>,
}

impl DiffLine {
    /// A standalone line with no rendering context.
    pub fn new(
        text: impl Into<String>,
        line_type: LineType,
        index: usize,
        old_pos: u32,
        new_pos: u32,
    ) -> Self {
        Self {
            text: text.into(),
            line_type,
            index,
            old_pos,
            new_pos,
            rich_text: OnceLock::new(),
            parent_file: Weak::new(),
        }
    }

    /// Line number in the old file, absent for added and meta lines.
    pub fn old_line(&self) -> Option<u32> {
        if self.added() || self.meta() {
            None
        } else {
            Some(self.old_pos)
        }
    }

    /// Line number in the new file, absent for removed and meta lines.
    pub fn new_line(&self) -> Option<u32> {
        if self.removed() || self.meta() {
            None
        } else {
            Some(self.new_pos)
        }
    }

    pub fn unchanged(&self) -> bool {
        self.line_type == LineType::Unchanged
    }

    pub fn added(&self) -> bool {
        matches!(self.line_type, LineType::Added | LineType::AddedNoNewline)
    }

    pub fn removed(&self) -> bool {
        matches!(self.line_type, LineType::Removed | LineType::RemovedNoNewline)
    }

    pub fn meta(&self) -> bool {
        self.line_type == LineType::Match
    }

    /// Set rendered text explicitly. Returns false if already rendered.
    pub fn set_rich_text(&self, rich_text: String) -> bool {
        self.rich_text.set(rich_text).is_ok()
    }

    /// Ask the owning file to render all of its lines if this one isn't yet.
    pub fn ensure_rendered(&self) {
        if self.rich_text.get().is_some() {
            return;
        }
        if let Some(file) = self.parent_file.upgrade() {
            file.highlight_lines();
        }
    }

    /// Rendered text, materialized on first access.
    ///
    /// Lines without a rendering context return `None` forever.
    pub fn rich_text(&self) -> Option<&str> {
        self.ensure_rendered();
        self.rich_text.get().map(String::as_str)
    }

    /// Rendered text, or the raw text when nothing could render it.
    pub fn rendered_text(&self) -> &str {
        self.rich_text().unwrap_or(&self.text)
    }
}

impl Serialize for DiffLine {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let rich_text = self.rendered_text();

        let mut state = serializer.serialize_struct("DiffLine", 5)?;
        state.serialize_field("type", &self.line_type)?;
        state.serialize_field("old_line", &self.old_line())?;
        state.serialize_field("new_line", &self.new_line())?;
        state.serialize_field("text", &self.text)?;
        state.serialize_field("rich_text", rich_text)?;
        state.end()
    }
}

/// A file of a diff together with its lines and rendering context.
pub struct DiffFile {
    pub path: String,
    lines: Vec<DiffLine>,
    renderer: Option<Arc<dyn LineRenderer>>,
}

impl std::fmt::Debug for DiffFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiffFile")
            .field("path", &self.path)
            .field("lines", &self.lines.len())
            .field("renderer", &self.renderer.is_some())
            .finish()
    }
}

impl DiffFile {
    /// Parse a unified patch into a file whose lines link back to it.
    pub fn parse(
        path: &str,
        patch: &str,
        renderer: Option<Arc<dyn LineRenderer>>,
    ) -> Arc<Self> {
        let parsed = parse_lines(patch);
        Self::from_lines(path, parsed, renderer)
    }

    /// Build a file from already-parsed lines (e.g. loaded records).
    pub fn from_lines(
        path: &str,
        lines: Vec<DiffLine>,
        renderer: Option<Arc<dyn LineRenderer>>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            path: path.to_string(),
            lines: lines
                .into_iter()
                .map(|mut line| {
                    line.parent_file = weak.clone();
                    line
                })
                .collect(),
            renderer,
        })
    }

    pub fn lines(&self) -> &[DiffLine] {
        &self.lines
    }

    /// Render every line in one batch. Lines already rendered keep their text.
    pub fn highlight_lines(&self) {
        let Some(renderer) = &self.renderer else {
            return;
        };

        let texts: Vec<&str> = self.lines.iter().map(|line| line.text.as_str()).collect();
        let rendered = renderer.render(&self.path, &texts);

        if rendered.len() != self.lines.len() {
            log::warn!(
                "Renderer returned {} lines for {} lines of {}",
                rendered.len(),
                self.lines.len(),
                self.path
            );
        }

        let mut rendered = rendered.into_iter();
        for line in &self.lines {
            let text = rendered.next().unwrap_or_else(|| line.text.clone());
            let _ = line.rich_text.set(text);
        }
    }
}

fn is_file_header(line: &str) -> bool {
    line.starts_with("--- /dev/null")
        || line.starts_with("+++ /dev/null")
        || line.starts_with("--- a")
        || line.starts_with("+++ b")
        || line.starts_with("diff --git")
        || line.starts_with("index ")
}

/// Start positions from a hunk header such as `@@ -10,4 +12,6 @@ fn x`.
fn hunk_starts(header: &str) -> (u32, u32) {
    let mut old_start = 0;
    let mut new_start = 0;

    for token in header.split_whitespace().skip(1) {
        let start = |range: &str| {
            range
                .split(',')
                .next()
                .and_then(|n| n.parse::<u32>().ok())
                .unwrap_or(0)
        };
        if let Some(range) = token.strip_prefix('-') {
            old_start = start(range);
        } else if let Some(range) = token.strip_prefix('+') {
            new_start = start(range);
            break;
        }
    }

    (old_start, new_start)
}

/// Parse unified patch text into standalone lines.
pub fn parse_lines(patch: &str) -> Vec<DiffLine> {
    let mut lines = Vec::new();
    let mut index = 0usize;
    let mut old_pos = 1u32;
    let mut new_pos = 1u32;
    let mut previous = LineType::Unchanged;

    for raw in patch.lines() {
        if is_file_header(raw) {
            continue;
        }

        if raw.starts_with("@@ -") {
            let (old_start, new_start) = hunk_starts(raw);
            old_pos = old_start;
            new_pos = new_start;
            previous = LineType::Match;

            // A hunk at the top of the file needs no header line
            if old_pos <= 1 && new_pos <= 1 {
                continue;
            }

            lines.push(DiffLine::new(raw, LineType::Match, index, old_pos, new_pos));
            index += 1;
            continue;
        }

        let line_type = match raw.chars().next() {
            Some('\\') => {
                if matches!(previous, LineType::Removed | LineType::RemovedNoNewline) {
                    LineType::RemovedNoNewline
                } else {
                    LineType::AddedNoNewline
                }
            }
            Some('+') => LineType::Added,
            Some('-') => LineType::Removed,
            _ => LineType::Unchanged,
        };

        lines.push(DiffLine::new(raw, line_type, index, old_pos, new_pos));
        index += 1;
        previous = line_type;

        match line_type {
            LineType::Added => new_pos += 1,
            LineType::Removed => old_pos += 1,
            LineType::AddedNoNewline | LineType::RemovedNoNewline | LineType::Match => {}
            LineType::Unchanged => {
                old_pos += 1;
                new_pos += 1;
            }
        }
    }

    lines
}
