//! Rich text to Markdown conversion
//!
//! Rich clipboard content is first parsed into a flat list of [`StyledRun`]s
//! (spans sharing one style), then each run is rendered on its own and the
//! concatenation is normalized. Parsing happens on a dedicated
//! [`ParserWorker`] thread; the rendering in [`runs_to_markdown`] is pure.

pub mod html;
pub mod worker;

pub use html::HtmlParser;
pub use worker::ParserWorker;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Font size assumed when the source gives none
pub const DEFAULT_FONT_SIZE: f32 = 12.0;

static ORDERED_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\t(\d+\.)\t").unwrap());
static EXCESS_NEWLINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());
static EMPTY_EMPHASIS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*{2,3}\s*\*{2,3}").unwrap());
static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());

/// Rich-text parse errors
#[derive(Debug, Error)]
pub enum ParseError {
    /// Input could not be parsed
    #[error("Malformed rich text: {0}")]
    Malformed(String),

    /// The parser worker thread is gone
    #[error("Rich-text parser worker unavailable")]
    WorkerUnavailable,

    /// A parse was requested from the worker thread itself
    #[error("Rich-text parser called from its own worker thread")]
    Reentrant,

    /// The worker thread could not be started
    #[error("Failed to start rich-text parser worker: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Formatting shared by every character of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStyle {
    pub bold: bool,
    pub italic: bool,
    pub monospace: bool,
    pub strikethrough: bool,
    /// Link target, if the run is a hyperlink
    pub link: Option<String>,
    /// Point size
    pub font_size: f32,
}

impl Default for RunStyle {
    fn default() -> Self {
        Self {
            bold: false,
            italic: false,
            monospace: false,
            strikethrough: false,
            link: None,
            font_size: DEFAULT_FONT_SIZE,
        }
    }
}

impl RunStyle {
    /// Markdown heading level implied by this style; 0 for body text.
    ///
    /// Only bold text can be a heading. Thresholds follow typical browser
    /// sizes (h1 32pt, h2 24pt, h3 18.72pt, h4 16pt).
    pub fn heading_level(&self) -> usize {
        if !self.bold {
            return 0;
        }
        match self.font_size {
            s if s >= 28.0 => 1,
            s if s >= 22.0 => 2,
            s if s >= 18.0 => 3,
            s if s >= 16.0 => 4,
            _ => 0,
        }
    }
}

/// A contiguous span of text with one style
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyledRun {
    pub text: String,
    pub style: RunStyle,
}

impl StyledRun {
    pub fn new(text: impl Into<String>, style: RunStyle) -> Self {
        Self {
            text: text.into(),
            style,
        }
    }

    pub fn plain(text: impl Into<String>) -> Self {
        Self::new(text, RunStyle::default())
    }
}

/// Source of styled runs for some rich-text format
pub trait RichTextParser: Send + 'static {
    /// Split `input` into styled runs, in document order
    fn parse(&mut self, input: &str) -> Result<Vec<StyledRun>, ParseError>;

    /// Text content of `input` with all markup removed
    fn plain_text(&mut self, input: &str) -> Result<String, ParseError> {
        Ok(self.parse(input)?.into_iter().map(|run| run.text).collect())
    }
}

/// Render styled runs as Markdown
pub fn runs_to_markdown(runs: &[StyledRun]) -> String {
    let mut out = String::new();
    for run in runs {
        render_run(run, &mut out);
    }
    normalize(&out)
}

fn render_run(run: &StyledRun, out: &mut String) {
    let text = run.text.as_str();
    if text.is_empty() {
        return;
    }

    let (leading, rest) = match text.strip_prefix('\n') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let (interior, trailing) = match rest.strip_suffix('\n') {
        Some(interior) => (interior, true),
        None => (rest, false),
    };

    // Pure line breaks pass through untouched.
    if interior.is_empty() {
        out.push_str(text);
        return;
    }

    let style = &run.style;
    let heading = style.heading_level();
    let mut processed = interior.to_string();

    if let Some(url) = &style.link {
        processed = format!("[{}]({})", processed, url);
    }

    if style.monospace && !processed.contains('\n') {
        processed = format!("`{}`", processed);
    }

    if style.strikethrough {
        processed = format!("~~{}~~", processed);
    }

    // A heading marker already implies weight, so bold alone adds nothing.
    match (style.bold, style.italic) {
        (true, true) => processed = format!("***{}***", processed),
        (true, false) if heading == 0 => processed = format!("**{}**", processed),
        (false, true) => processed = format!("*{}*", processed),
        _ => {}
    }

    if heading > 0 {
        processed = format!("{} {}", "#".repeat(heading), processed);
    }

    if leading {
        out.push('\n');
    }
    out.push_str(&processed);
    if trailing {
        out.push('\n');
    }
}

/// List-marker, blank-line and emphasis cleanup applied to rendered output
fn normalize(markdown: &str) -> String {
    let result = markdown.replace("\t•\t", "- ");
    let result = ORDERED_MARKER.replace_all(&result, "${1} ");
    let result = EXCESS_NEWLINES.replace_all(&result, "\n\n");
    let result = EMPTY_EMPHASIS.replace_all(&result, "");
    result.trim().to_string()
}

/// Remove anything that looks like a tag.
///
/// Display-quality only: literal angle brackets in the text are lost too.
pub fn strip_tags(input: &str) -> String {
    TAG.replace_all(input, "").into_owned()
}

/// Converts rich text to Markdown or plain text using a parser worker
#[derive(Clone)]
pub struct MarkdownConverter {
    worker: ParserWorker,
}

impl MarkdownConverter {
    pub fn new(worker: ParserWorker) -> Self {
        Self { worker }
    }

    /// Converter backed by a fresh [`HtmlParser`] worker
    pub fn html() -> Result<Self, ParseError> {
        Ok(Self::new(ParserWorker::spawn(HtmlParser)?))
    }

    /// Parse `input` on the worker and render it, blocking until done
    pub fn convert(&self, input: &str) -> Result<String, ParseError> {
        let runs = self.worker.parse_blocking(input)?;
        Ok(runs_to_markdown(&runs))
    }

    /// Async variant of [`MarkdownConverter::convert`]
    pub async fn convert_async(&self, input: &str) -> Result<String, ParseError> {
        let runs = self.worker.parse(input).await?;
        Ok(runs_to_markdown(&runs))
    }

    /// Like [`MarkdownConverter::convert`], returning `input` unchanged when
    /// it cannot be parsed
    pub fn convert_or_raw(&self, input: &str) -> String {
        match self.convert(input) {
            Ok(markdown) => markdown,
            Err(e) => {
                debug!("Markdown conversion fell back to raw text: {}", e);
                input.to_string()
            }
        }
    }

    /// Async variant of [`MarkdownConverter::convert_or_raw`]
    pub async fn convert_or_raw_async(&self, input: &str) -> String {
        match self.convert_async(input).await {
            Ok(markdown) => markdown,
            Err(e) => {
                debug!("Markdown conversion fell back to raw text: {}", e);
                input.to_string()
            }
        }
    }

    /// Plain text of `input`, falling back to tag stripping on parse failure
    pub fn strip_to_plain_text(&self, input: &str) -> String {
        match self.worker.plain_text_blocking(input) {
            Ok(text) => text,
            Err(e) => {
                debug!("Plain-text extraction fell back to tag stripping: {}", e);
                strip_tags(input)
            }
        }
    }

    /// Async variant of [`MarkdownConverter::strip_to_plain_text`]
    pub async fn strip_to_plain_text_async(&self, input: &str) -> String {
        match self.worker.plain_text(input).await {
            Ok(text) => text,
            Err(e) => {
                debug!("Plain-text extraction fell back to tag stripping: {}", e);
                strip_tags(input)
            }
        }
    }
}
