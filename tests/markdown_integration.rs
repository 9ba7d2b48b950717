//! Integration tests for rich text to Markdown conversion

use clipstash::markdown::{
    runs_to_markdown, MarkdownConverter, ParseError, ParserWorker, RichTextParser, RunStyle,
    StyledRun,
};
use pretty_assertions::assert_eq;
use rstest::rstest;

#[test]
fn test_plain_then_bold_run() {
    let runs = vec![
        StyledRun::plain("Hello "),
        StyledRun::new(
            "world",
            RunStyle {
                bold: true,
                ..RunStyle::default()
            },
        ),
    ];
    assert_eq!(runs_to_markdown(&runs), "Hello **world**");
}

#[rstest]
#[case("<h1>Release notes</h1><p>Version <code>0.2</code> is out.</p>", "# Release notes\nVersion `0.2` is out.")]
#[case("<h3>Setup</h3><ol><li>Install</li><li>Run</li></ol>", "### Setup\n1. Install\n2. Run")]
#[case("<ul><li><a href='https://docs.rs'>docs</a></li><li><em>notes</em></li></ul>", "- [docs](https://docs.rs)\n- *notes*")]
#[case("<p>one</p><p></p><p></p><p>two</p>", "one\ntwo")]
#[case("<p>keep <s>old</s> <strong>new</strong></p>", "keep ~~old~~ **new**")]
#[case("no markup at all", "no markup at all")]
fn test_html_to_markdown(#[case] html: &str, #[case] expected: &str) {
    let converter = MarkdownConverter::html().unwrap();
    assert_eq!(converter.convert(html).unwrap(), expected);
}

#[test]
fn test_strip_to_plain_text() {
    let converter = MarkdownConverter::html().unwrap();
    assert_eq!(
        converter.strip_to_plain_text("<p>Tom &amp; <b>Jerry</b></p>"),
        "Tom & Jerry\n"
    );
}

#[test]
fn test_malformed_html_falls_back() {
    let converter = MarkdownConverter::html().unwrap();
    let broken = "<b>bold</b> and <i unterminated";

    assert!(matches!(converter.convert(broken), Err(ParseError::Malformed(_))));
    assert_eq!(converter.convert_or_raw(broken), broken);
    assert_eq!(converter.strip_to_plain_text(broken), "bold and <i unterminated");
}

/// Parser that reports everything as one monospace block
struct CodeBlockParser;

impl RichTextParser for CodeBlockParser {
    fn parse(&mut self, input: &str) -> Result<Vec<StyledRun>, ParseError> {
        let style = RunStyle {
            monospace: true,
            ..RunStyle::default()
        };
        Ok(vec![StyledRun::new(input, style)])
    }
}

#[test]
fn test_custom_parser_on_worker() {
    let converter = MarkdownConverter::new(ParserWorker::spawn(CodeBlockParser).unwrap());

    assert_eq!(converter.convert("let x = 1;").unwrap(), "`let x = 1;`");
    // Multi-line code is not wrapped in inline backticks.
    assert_eq!(converter.convert("a\nb").unwrap(), "a\nb");
}

#[tokio::test]
async fn test_concurrent_conversions_share_one_worker() {
    let converter = MarkdownConverter::html().unwrap();

    let tasks: Vec<_> = (0..8)
        .map(|i| {
            let converter = converter.clone();
            tokio::spawn(async move {
                converter
                    .convert_async(&format!("<b>item {}</b>", i))
                    .await
                    .unwrap()
            })
        })
        .collect();

    for (i, task) in tasks.into_iter().enumerate() {
        assert_eq!(task.await.unwrap(), format!("**item {}**", i));
    }
}
