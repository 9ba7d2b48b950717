//! HTML fragment parser producing styled runs
//!
//! Covers what shows up in copied web and editor content: inline emphasis,
//! code, strikethrough, links, headings, paragraphs and lists. Layout that
//! Markdown cannot express is flattened to text. List items come out as
//! `\t•\t` / `\tN.\t` prefixed lines, the same markers a system text view
//! produces, so the Markdown renderer normalizes both alike.

use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::Regex;

use super::{ParseError, RichTextParser, RunStyle, StyledRun, DEFAULT_FONT_SIZE};

static HREF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\bhref\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#).unwrap()
});

/// Browser default point sizes for h1..h6
const HEADING_SIZES: [f32; 6] = [32.0, 24.0, 18.72, 16.0, 13.28, 10.72];

/// Stateless HTML parser
#[derive(Debug, Default, Clone, Copy)]
pub struct HtmlParser;

impl RichTextParser for HtmlParser {
    fn parse(&mut self, input: &str) -> Result<Vec<StyledRun>, ParseError> {
        RunBuilder::default().build(input)
    }
}

#[derive(Debug, Clone, Copy)]
enum ListKind {
    Unordered,
    Ordered(u32),
}

#[derive(Default)]
struct RunBuilder {
    runs: Vec<StyledRun>,
    bold: usize,
    italic: usize,
    mono: usize,
    strike: usize,
    pre: usize,
    hidden: usize,
    links: Vec<Option<String>>,
    headings: Vec<f32>,
    lists: Vec<ListKind>,
}

impl RunBuilder {
    fn build(mut self, input: &str) -> Result<Vec<StyledRun>, ParseError> {
        let mut rest = input;

        while let Some(pos) = rest.find('<') {
            self.text(&rest[..pos]);
            let tail = &rest[pos + 1..];
            let offset = input.len() - tail.len() - 1;

            if !tail.starts_with(|c: char| c.is_ascii_alphabetic() || matches!(c, '/' | '!' | '?')) {
                // A bare '<' is just text.
                self.text("<");
                rest = tail;
                continue;
            }

            if let Some(comment) = tail.strip_prefix("!--") {
                let end = comment.find("-->").ok_or_else(|| {
                    ParseError::Malformed(format!("unterminated comment at byte {}", offset))
                })?;
                rest = &comment[end + 3..];
                continue;
            }

            let end = tail.find('>').ok_or_else(|| {
                ParseError::Malformed(format!("unterminated tag at byte {}", offset))
            })?;
            self.tag(&tail[..end]);
            rest = &tail[end + 1..];
        }

        self.text(rest);
        self.runs.retain(|run| !run.text.is_empty());
        Ok(self.runs)
    }

    fn tag(&mut self, body: &str) {
        let body = body.trim();
        if body.starts_with('!') || body.starts_with('?') {
            return;
        }

        let (closing, body) = match body.strip_prefix('/') {
            Some(body) => (true, body),
            None => (false, body),
        };
        let self_closing = body.ends_with('/');
        let body = body.trim_end_matches('/');
        let name_end = body
            .find(|c: char| c.is_whitespace())
            .unwrap_or(body.len());
        let name = body[..name_end].to_ascii_lowercase();
        let attrs = &body[name_end..];

        if closing {
            self.close(&name);
        } else {
            self.open(&name, attrs);
            if self_closing && !is_void(&name) {
                self.close(&name);
            }
        }
    }

    fn open(&mut self, name: &str, attrs: &str) {
        match name {
            "b" | "strong" => self.bold += 1,
            "i" | "em" | "cite" | "var" => self.italic += 1,
            "code" | "kbd" | "tt" | "samp" => self.mono += 1,
            "s" | "del" | "strike" => self.strike += 1,
            "pre" => {
                self.line_break();
                self.mono += 1;
                self.pre += 1;
            }
            "a" => self.links.push(href(attrs)),
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                self.line_break();
                self.headings.push(heading_size(name));
            }
            "ul" => {
                self.line_break();
                self.lists.push(ListKind::Unordered);
            }
            "ol" => {
                self.line_break();
                self.lists.push(ListKind::Ordered(0));
            }
            "li" => {
                self.line_break();
                self.list_marker();
            }
            "br" => self.push_break(),
            "p" | "div" | "tr" | "hr" | "blockquote" | "table" | "section" | "article"
            | "header" | "footer" => self.line_break(),
            "script" | "style" | "head" | "title" => self.hidden += 1,
            _ => {}
        }
    }

    fn close(&mut self, name: &str) {
        match name {
            "b" | "strong" => self.bold = self.bold.saturating_sub(1),
            "i" | "em" | "cite" | "var" => self.italic = self.italic.saturating_sub(1),
            "code" | "kbd" | "tt" | "samp" => self.mono = self.mono.saturating_sub(1),
            "s" | "del" | "strike" => self.strike = self.strike.saturating_sub(1),
            "pre" => {
                self.mono = self.mono.saturating_sub(1);
                self.pre = self.pre.saturating_sub(1);
                self.line_break();
            }
            "a" => {
                self.links.pop();
            }
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                self.headings.pop();
                self.line_break();
            }
            "ul" | "ol" => {
                self.lists.pop();
                self.line_break();
            }
            "li" | "p" | "div" | "tr" | "blockquote" | "table" | "section" | "article"
            | "header" | "footer" => self.line_break(),
            "script" | "style" | "head" | "title" => self.hidden = self.hidden.saturating_sub(1),
            _ => {}
        }
    }

    fn style(&self) -> RunStyle {
        RunStyle {
            bold: self.bold > 0 || !self.headings.is_empty(),
            italic: self.italic > 0,
            monospace: self.mono > 0,
            strikethrough: self.strike > 0,
            link: self.links.iter().rev().find_map(|link| link.clone()),
            font_size: self.headings.last().copied().unwrap_or(DEFAULT_FONT_SIZE),
        }
    }

    fn text(&mut self, raw: &str) {
        if self.hidden > 0 || raw.is_empty() {
            return;
        }

        let decoded = decode_entities(raw);
        if self.pre > 0 {
            let style = self.style();
            self.push(&decoded, style);
            return;
        }

        let mut collapsed = String::with_capacity(decoded.len());
        let mut in_space = false;
        for ch in decoded.chars() {
            if ch.is_ascii_whitespace() {
                if !in_space {
                    collapsed.push(' ');
                }
                in_space = true;
            } else {
                collapsed.push(ch);
                in_space = false;
            }
        }

        let text = if self.at_line_start() || self.ends_with_space() {
            collapsed.trim_start_matches(' ')
        } else {
            collapsed.as_str()
        };
        let style = self.style();
        self.push(text, style);
    }

    fn push(&mut self, text: &str, style: RunStyle) {
        if text.is_empty() {
            return;
        }
        if let Some(last) = self.runs.last_mut() {
            if last.style == style {
                last.text.push_str(text);
                return;
            }
        }
        self.runs.push(StyledRun::new(text, style));
    }

    /// End the current line unless already at the start of one
    fn line_break(&mut self) {
        if !self.at_line_start() {
            self.push_break();
        }
    }

    fn push_break(&mut self) {
        self.trim_trailing_spaces();
        self.push("\n", RunStyle::default());
    }

    fn list_marker(&mut self) {
        let marker = match self.lists.last_mut() {
            Some(ListKind::Ordered(n)) => {
                *n += 1;
                format!("\t{}.\t", n)
            }
            Some(ListKind::Unordered) | None => "\t•\t".to_string(),
        };
        self.push(&marker, RunStyle::default());
    }

    fn at_line_start(&self) -> bool {
        self.runs.last().map_or(true, |run| run.text.ends_with('\n'))
    }

    fn ends_with_space(&self) -> bool {
        self.runs
            .last()
            .is_some_and(|run| run.text.ends_with(' ') || run.text.ends_with('\t'))
    }

    fn trim_trailing_spaces(&mut self) {
        if self.pre > 0 {
            return;
        }
        while let Some(last) = self.runs.last_mut() {
            let trimmed_len = last.text.trim_end_matches(' ').len();
            last.text.truncate(trimmed_len);
            if !last.text.is_empty() {
                break;
            }
            self.runs.pop();
        }
    }
}

fn is_void(name: &str) -> bool {
    matches!(
        name,
        "br" | "hr" | "img" | "input" | "meta" | "link" | "area" | "base" | "col" | "wbr"
    )
}

fn heading_size(name: &str) -> f32 {
    name[1..]
        .parse::<usize>()
        .ok()
        .and_then(|level| HEADING_SIZES.get(level.wrapping_sub(1)))
        .copied()
        .unwrap_or(DEFAULT_FONT_SIZE)
}

fn href(attrs: &str) -> Option<String> {
    let caps = HREF.captures(attrs)?;
    let value = caps.get(1).or_else(|| caps.get(2)).or_else(|| caps.get(3))?;
    Some(decode_entities(value.as_str()).into_owned())
}

fn decode_entities(input: &str) -> Cow<'_, str> {
    if !input.contains('&') {
        return Cow::Borrowed(input);
    }

    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        let decoded = tail
            .find(';')
            .filter(|&end| end <= 10)
            .and_then(|end| decode_entity(&tail[1..end]).map(|ch| (ch, end)));
        match decoded {
            Some((ch, end)) => {
                out.push(ch);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => {
            let code = if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok()?
            } else {
                name.strip_prefix('#')?.parse::<u32>().ok()?
            };
            char::from_u32(code)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markdown::runs_to_markdown;
    use pretty_assertions::assert_eq;

    fn parse(html: &str) -> Vec<StyledRun> {
        HtmlParser.parse(html).unwrap()
    }

    fn markdown(html: &str) -> String {
        runs_to_markdown(&parse(html))
    }

    #[test]
    fn test_inline_styles_become_runs() {
        let runs = parse("<b>hi</b> there");
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].text, "hi");
        assert!(runs[0].style.bold);
        assert_eq!(runs[1], StyledRun::plain(" there"));
    }

    #[test]
    fn test_headings_carry_size() {
        let runs = parse("<h2>Section</h2><p>Body</p>");
        assert_eq!(runs[0].text, "Section");
        assert!(runs[0].style.bold);
        assert_eq!(runs[0].style.heading_level(), 2);
        assert_eq!(markdown("<h2>Section</h2><p>Body</p>"), "## Section\nBody");
    }

    #[test]
    fn test_links_and_code() {
        assert_eq!(
            markdown(r#"See <a href="https://example.com/?a=1&amp;b=2">the docs</a> and <code>cargo run</code>."#),
            "See [the docs](https://example.com/?a=1&b=2) and `cargo run`."
        );
    }

    #[test]
    fn test_lists() {
        let html = "<ul>\n  <li>One</li>\n  <li>Two</li>\n</ul><ol><li>First</li><li>Second</li></ol>";
        assert_eq!(markdown(html), "- One\n- Two\n1. First\n2. Second");
    }

    #[test]
    fn test_whitespace_collapsing() {
        assert_eq!(markdown("<p>  lots   of\n\n spaces  </p><p>next</p>"), "lots of spaces\nnext");
    }

    #[test]
    fn test_pre_preserves_layout() {
        let runs = parse("<pre>fn main() {\n    run();\n}</pre>");
        assert_eq!(runs[0].text, "fn main() {\n    run();\n}");
        assert!(runs[0].style.monospace);
    }

    #[test]
    fn test_hidden_elements_and_comments_skipped() {
        let html = "<html><head><title>T</title><style>p{}</style></head>\
                    <body><!-- note --><p>Visible &lt;3</p><script>alert(1)</script></body></html>";
        assert_eq!(markdown(html), "Visible <3");
    }

    #[test]
    fn test_strikethrough_and_nested_emphasis() {
        assert_eq!(markdown("<del>old</del> <b><i>both</i></b>"), "~~old~~ ***both***");
    }

    #[test]
    fn test_line_breaks() {
        assert_eq!(markdown("one<br>two<br/>three"), "one\ntwo\nthree");
    }

    #[test]
    fn test_bare_angle_bracket_is_text() {
        assert_eq!(markdown("a < b"), "a < b");
    }

    #[test]
    fn test_unterminated_tag_is_malformed() {
        assert!(matches!(
            HtmlParser.parse("<b>text</b"),
            Err(ParseError::Malformed(_))
        ));
        assert!(HtmlParser.parse("<!-- open comment").is_err());
    }

    #[test]
    fn test_entities() {
        assert_eq!(decode_entities("&amp;&#65;&#x42;&unknown;&"), "&AB&unknown;&");
        assert_eq!(decode_entities("plain"), "plain");
    }

    #[test]
    fn test_plain_text() {
        assert_eq!(HtmlParser.plain_text("<b>hi</b> there").unwrap(), "hi there");
    }
}
