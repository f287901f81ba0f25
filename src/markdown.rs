//! Markdown AST adapter (ambient, SPEC_FULL §1 item 11). Parses with
//! `pulldown-cmark`, rewrites link/image destinations through a
//! caller-supplied callback mid-stream, and re-serializes back to Markdown
//! text by hand -- the rewrite has to happen event-by-event, so a
//! post-process crate like `pulldown-cmark-to-cmark` doesn't fit and isn't a
//! dependency here.
//!
//! The re-renderer covers the common block/inline constructs (paragraphs,
//! headings, emphasis/strong/strikethrough, code spans, fenced/indented code
//! blocks, links, images, lists, blockquotes, rules, line/soft breaks, task
//! list markers). It is not a full CommonMark round-trip -- exotic
//! constructs (footnotes, raw HTML blocks) pass their text through verbatim
//! rather than being reformatted.

use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag};

use crate::types::FrontMatter;
use crate::yaml_json::yaml_to_json;

/// Splits a leading `---\n<yaml>\n---\n` front-matter block off the top of
/// a document, if present. `pulldown-cmark` 0.9 has no front-matter
/// extension, so this is a raw text scan done before the remainder is ever
/// handed to the parser.
pub fn split_front_matter(text: &str) -> (FrontMatter, &str) {
    let fm = FrontMatter::new();

    let Some(after_open) = text.strip_prefix("---\n").or_else(|| text.strip_prefix("---\r\n")) else {
        return (fm, text);
    };

    let Some(fence_pos) = after_open.find("\n---") else {
        return (fm, text);
    };

    let yaml_block = &after_open[..fence_pos];
    let rest = &after_open[fence_pos + "\n---".len()..];
    let body = rest.strip_prefix("\r\n").or_else(|| rest.strip_prefix('\n')).unwrap_or(rest);

    let mut fm = fm;
    if let Ok(serde_yaml::Value::Mapping(map)) = serde_yaml::from_str::<serde_yaml::Value>(yaml_block) {
        for (k, v) in &map {
            if let serde_yaml::Value::String(key) = k {
                fm.insert(key.clone(), yaml_to_json(v));
            }
        }
    }

    (fm, body)
}

/// Serializes `fm` back to a `---\n<yaml>\n---\n` block, or an empty string
/// if there's nothing to emit.
pub fn render_front_matter(fm: &FrontMatter) -> String {
    if fm.is_empty() {
        return String::new();
    }
    let mut mapping = serde_yaml::Mapping::new();
    for (k, v) in fm.iter() {
        mapping.insert(
            serde_yaml::Value::String(k.to_string()),
            crate::yaml_json::json_to_yaml(v),
        );
    }
    let yaml = serde_yaml::to_string(&serde_yaml::Value::Mapping(mapping))
        .unwrap_or_default();
    format!("---\n{yaml}---\n")
}

/// Collects every link/image destination appearing in `markdown`, paired
/// with whether it's an embed (`Tag::Image`) or a document link
/// (`Tag::Link`). Used to resolve destinations asynchronously up front,
/// since [`rewrite_links`]'s callback has to be synchronous.
pub fn collect_links(markdown: &str) -> Vec<(String, bool)> {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_TASKLISTS);

    let mut out = Vec::new();
    for event in Parser::new_ext(markdown, options) {
        match event {
            Event::Start(Tag::Link(_, dest, _)) => out.push((dest.to_string(), false)),
            Event::Start(Tag::Image(_, dest, _)) => out.push((dest.to_string(), true)),
            _ => {}
        }
    }
    out
}

/// Rewrites every link/image destination in `markdown` through `rewrite`,
/// which receives `(destination, is_embed)` and returns the replacement
/// destination. Embeds (`Tag::Image`) are distinguished from document links
/// (`Tag::Link`) so the caller can route them through `ResolveEmbeddedLink`
/// versus `ResolveResourceLink` (design §4.7).
pub fn rewrite_links(markdown: &str, mut rewrite: impl FnMut(&str, bool) -> String) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_TASKLISTS);

    let parser = Parser::new_ext(markdown, options);
    let mut renderer = Renderer::default();

    for event in parser {
        let event = match event {
            Event::Start(Tag::Link(kind, dest, title)) => {
                let new_dest = rewrite(&dest, false);
                Event::Start(Tag::Link(kind, new_dest.into(), title))
            }
            Event::Start(Tag::Image(kind, dest, title)) => {
                let new_dest = rewrite(&dest, true);
                Event::Start(Tag::Image(kind, new_dest.into(), title))
            }
            other => other,
        };
        renderer.push(event);
    }

    renderer.finish()
}

#[derive(Default)]
struct Renderer {
    out: String,
    list_stack: Vec<Option<u64>>,
    link_title_stack: Vec<(String, String)>,
    in_code_block: bool,
}

impl Renderer {
    fn push(&mut self, event: Event<'_>) {
        match event {
            Event::Start(tag) => self.start_tag(tag),
            Event::End(tag) => self.end_tag(tag),
            Event::Text(text) => self.out.push_str(&text),
            Event::Code(text) => {
                self.out.push('`');
                self.out.push_str(&text);
                self.out.push('`');
            }
            Event::Html(html) => self.out.push_str(&html),
            Event::FootnoteReference(name) => {
                self.out.push_str(&format!("[^{name}]"));
            }
            Event::SoftBreak => self.out.push('\n'),
            Event::HardBreak => self.out.push_str("  \n"),
            Event::Rule => self.out.push_str("\n---\n\n"),
            Event::TaskListMarker(checked) => {
                self.out.push_str(if checked { "[x] " } else { "[ ] " });
            }
        }
    }

    fn start_tag(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Paragraph => {}
            Tag::Heading(level, _, _) => {
                self.out.push_str(heading_prefix(level));
                self.out.push(' ');
            }
            Tag::BlockQuote => self.out.push_str("> "),
            Tag::CodeBlock(kind) => {
                self.in_code_block = true;
                match kind {
                    CodeBlockKind::Fenced(lang) => {
                        self.out.push_str("```");
                        self.out.push_str(&lang);
                        self.out.push('\n');
                    }
                    CodeBlockKind::Indented => self.out.push_str("```\n"),
                }
            }
            Tag::List(start) => self.list_stack.push(start),
            Tag::Item => {
                let indent = "  ".repeat(self.list_stack.len().saturating_sub(1));
                self.out.push_str(&indent);
                match self.list_stack.last_mut() {
                    Some(Some(n)) => {
                        self.out.push_str(&format!("{n}. "));
                        *n += 1;
                    }
                    _ => self.out.push_str("- "),
                }
            }
            Tag::Emphasis => self.out.push('*'),
            Tag::Strong => self.out.push_str("**"),
            Tag::Strikethrough => self.out.push_str("~~"),
            Tag::Link(_, dest, title) => {
                self.link_title_stack.push((dest.to_string(), title.to_string()));
                self.out.push('[');
            }
            Tag::Image(_, dest, title) => {
                self.link_title_stack.push((dest.to_string(), title.to_string()));
                self.out.push_str("![");
            }
            Tag::Table(_) | Tag::TableHead | Tag::TableRow | Tag::TableCell => {}
            Tag::FootnoteDefinition(name) => {
                self.out.push_str(&format!("[^{name}]: "));
            }
        }
    }

    fn end_tag(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Paragraph => self.out.push_str("\n\n"),
            Tag::Heading(..) => self.out.push_str("\n\n"),
            Tag::BlockQuote => self.out.push('\n'),
            Tag::CodeBlock(_) => {
                self.in_code_block = false;
                self.out.push_str("```\n\n");
            }
            Tag::List(_) => {
                self.list_stack.pop();
                self.out.push('\n');
            }
            Tag::Item => self.out.push('\n'),
            Tag::Emphasis => self.out.push('*'),
            Tag::Strong => self.out.push_str("**"),
            Tag::Strikethrough => self.out.push_str("~~"),
            Tag::Link(..) => {
                if let Some((dest, title)) = self.link_title_stack.pop() {
                    self.out.push(']');
                    self.out.push('(');
                    self.out.push_str(&dest);
                    if !title.is_empty() {
                        self.out.push_str(&format!(" \"{title}\""));
                    }
                    self.out.push(')');
                }
            }
            Tag::Image(..) => {
                if let Some((dest, title)) = self.link_title_stack.pop() {
                    self.out.push(']');
                    self.out.push('(');
                    self.out.push_str(&dest);
                    if !title.is_empty() {
                        self.out.push_str(&format!(" \"{title}\""));
                    }
                    self.out.push(')');
                }
            }
            Tag::Table(_) | Tag::TableHead | Tag::TableRow | Tag::TableCell => {}
            Tag::FootnoteDefinition(_) => self.out.push_str("\n\n"),
        }
    }

    fn finish(self) -> String {
        let mut out = self.out;
        while out.ends_with('\n') {
            out.pop();
        }
        out.push('\n');
        out
    }
}

fn heading_prefix(level: HeadingLevel) -> &'static str {
    match level {
        HeadingLevel::H1 => "#",
        HeadingLevel::H2 => "##",
        HeadingLevel::H3 => "###",
        HeadingLevel::H4 => "####",
        HeadingLevel::H5 => "#####",
        HeadingLevel::H6 => "######",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_front_matter_and_body() {
        let doc = "---\ntitle: Hello\nweight: 3\n---\n# Heading\n\nbody text\n";
        let (fm, body) = split_front_matter(doc);
        assert_eq!(fm.get("title").and_then(|v| v.as_str()), Some("Hello"));
        assert!(body.starts_with("# Heading"));
    }

    #[test]
    fn no_front_matter_returns_whole_document() {
        let doc = "# Heading\n\nno front matter here\n";
        let (fm, body) = split_front_matter(doc);
        assert!(fm.is_empty());
        assert_eq!(body, doc);
    }

    #[test]
    fn rewrites_link_destination() {
        let doc = "see [the guide](./guide.md) for details\n";
        let rewritten = rewrite_links(doc, |dest, is_embed| {
            assert!(!is_embed);
            assert_eq!(dest, "./guide.md");
            "/guides/guide/".to_string()
        });
        assert!(rewritten.contains("[the guide](/guides/guide/)"));
    }

    #[test]
    fn rewrites_image_destination_as_embed() {
        let doc = "![alt text](./diagram.png)\n";
        let rewritten = rewrite_links(doc, |_dest, is_embed| {
            assert!(is_embed);
            "https://raw.githubusercontent.com/o/r/main/diagram.png".to_string()
        });
        assert!(rewritten.contains("![alt text](https://raw.githubusercontent.com/o/r/main/diagram.png)"));
    }
}
