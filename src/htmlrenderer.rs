//! Implements a custom [`push_html`] so that code blocks can be run through
//! the syntax highlighter ([`crate::highlight`]).
//! [`pulldown_cmark::html::push_html`] writes code blocks out as escaped text
//! as it streams, but the highlighter needs the whole block at once, so this
//! renderer buffers code blocks (and image alt text) before writing them.

use crate::highlight::highlight;
use pulldown_cmark::escape::{escape_href, escape_html, StrWrite};
use pulldown_cmark::{Alignment, CodeBlockKind, CowStr, Event, LinkType, Tag};
use std::fmt::{self, Display};
use std::io;

struct Adaptor<'a, T> {
    formatter: &'a mut T,
    result: fmt::Result,
}

impl<T> Adaptor<'_, T> {
    fn handle_result(&mut self, result: fmt::Result) -> io::Result<()> {
        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                self.result = result;
                Err(io::Error::new(io::ErrorKind::Other, e))
            }
        }
    }
}

impl<T: fmt::Write> StrWrite for Adaptor<'_, T> {
    fn write_str(&mut self, s: &str) -> io::Result<()> {
        let result = self.formatter.write_str(s);
        self.handle_result(result)
    }

    fn write_fmt(&mut self, args: fmt::Arguments) -> io::Result<()> {
        let result = self.formatter.write_fmt(args);
        self.handle_result(result)
    }
}

struct EscapeHref<'a>(&'a str);

impl Display for EscapeHref<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut adaptor = Adaptor {
            formatter: f,
            result: Ok(()),
        };
        let _ = escape_href(&mut adaptor, self.0);
        adaptor.result
    }
}

struct EscapeHtml<'a>(&'a str);

impl Display for EscapeHtml<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut adaptor = Adaptor {
            formatter: f,
            result: Ok(()),
        };
        let _ = escape_html(&mut adaptor, self.0);
        adaptor.result
    }
}

enum TableState {
    Head,
    Body,
}

/// A code block whose contents are still being collected.
struct CodeBlock {
    lang: Option<String>,
    code: String,
}

/// An image whose alt text is still being collected.
struct Image<'a> {
    dest: CowStr<'a>,
    title: CowStr<'a>,
    alt: String,
}

/// Renders markdown [`Event`]s into HTML. This is largely modeled after
/// [`pulldown_cmark`]'s private [`HtmlWriter`
/// struct](https://github.com/raphlinus/pulldown-cmark/blob/bf0a1a4938dbd2ec41c3add069b3d361d11731f4/src/html.rs#L36-L50).
pub struct HtmlRenderer<'a> {
    /// The alignments of the columns of the current table.
    table_alignments: Vec<Alignment>,

    /// Whether we're in the head or body of the current table.
    table_state: TableState,

    /// The index of the current cell in the current table row.
    table_cell_index: usize,

    /// The code block being collected, if any.
    code_block: Option<CodeBlock>,

    /// The image whose alt text is being collected, if any. Images can nest
    /// inside alt text, so this counts the nesting depth too.
    image: Option<(Image<'a>, usize)>,
}

impl<'a> HtmlRenderer<'a> {
    pub fn new() -> Self {
        HtmlRenderer {
            table_alignments: Vec::default(),
            table_state: TableState::Head,
            table_cell_index: usize::default(),
            code_block: None,
            image: None,
        }
    }

    pub fn on_event<W: StrWrite>(
        &mut self,
        w: &mut W,
        event: Event<'a>,
    ) -> io::Result<()> {
        if self.image.is_some() {
            return self.on_image_event(w, event);
        }
        if let Some(block) = &mut self.code_block {
            match event {
                Event::Text(text) => {
                    block.code.push_str(&text);
                    return Ok(());
                }
                Event::End(Tag::CodeBlock(_)) => {
                    return self.on_code_block_end(w)
                }
                _ => {}
            }
        }

        match event {
            Event::Start(tag) => self.on_start(w, tag),
            Event::End(tag) => self.on_end(w, tag),
            Event::Code(code) => self.on_code(w, code),
            Event::FootnoteReference(name) => write!(
                w,
                "<sup class=\"footnote-reference\"><a href=\"#{}\">{}</a></sup>",
                EscapeHtml(&name),
                EscapeHtml(&name),
            ),
            Event::HardBreak => self.on_hard_break(w),
            Event::Html(html) => self.on_html(w, html),
            Event::Rule => self.on_rule(w),
            Event::SoftBreak => self.on_soft_break(w),
            Event::TaskListMarker(checked) => {
                self.on_task_list_marker(w, checked)
            }
            Event::Text(text) => self.on_text(w, text),
        }
    }

    fn on_start<W: StrWrite>(
        &mut self,
        w: &mut W,
        tag: Tag<'a>,
    ) -> io::Result<()> {
        match tag {
            Tag::BlockQuote => w.write_str("<blockquote>"),
            Tag::CodeBlock(kind) => {
                self.code_block = Some(CodeBlock {
                    lang: match kind {
                        CodeBlockKind::Fenced(info) => info
                            .split_whitespace()
                            .next()
                            .map(str::to_owned),
                        CodeBlockKind::Indented => None,
                    },
                    code: String::new(),
                });
                Ok(())
            }
            Tag::Emphasis => w.write_str("<em>"),
            Tag::FootnoteDefinition(name) => write!(
                w,
                "<div class=\"footnote-definition\" id=\"{}\"><sup class=\"footnote-definition-label\">{}</sup>",
                EscapeHtml(&name),
                EscapeHtml(&name),
            ),
            Tag::Heading(level) => write!(w, "<h{}>", level),
            Tag::Image(_link_type, dest, title) => {
                self.image = Some((
                    Image {
                        dest,
                        title,
                        alt: String::new(),
                    },
                    0,
                ));
                Ok(())
            }
            Tag::Item => w.write_str("<li>"),
            Tag::Link(link_type, dest, title) => {
                let scheme = match link_type {
                    LinkType::Email => "mailto:",
                    _ => "",
                };
                write!(w, "<a href=\"{}{}\"", scheme, EscapeHref(&dest))?;
                if !title.is_empty() {
                    write!(w, " title=\"{}\"", EscapeHtml(&title))?;
                }
                w.write_str(">")
            }
            Tag::List(None) => w.write_str("<ul>"),
            Tag::List(Some(1)) => w.write_str("<ol>"),
            Tag::List(Some(start)) => write!(w, "<ol start=\"{}\">", start),
            Tag::Paragraph => w.write_str("<p>"),
            Tag::Strikethrough => w.write_str("<del>"),
            Tag::Strong => w.write_str("<strong>"),
            Tag::Table(alignments) => {
                self.table_alignments = alignments;
                w.write_str("<table>")
            }
            Tag::TableHead => {
                self.table_state = TableState::Head;
                self.table_cell_index = 0;
                w.write_str("<thead><tr>")
            }
            Tag::TableRow => {
                self.table_cell_index = 0;
                w.write_str("<tr>")
            }
            Tag::TableCell => write!(
                w,
                "<{}{}>",
                match self.table_state {
                    TableState::Head => "th",
                    TableState::Body => "td",
                },
                match self.table_alignments.get(self.table_cell_index) {
                    Some(Alignment::Left) => " align=\"left\"",
                    Some(Alignment::Right) => " align=\"right\"",
                    Some(Alignment::Center) => " align=\"center\"",
                    _ => "",
                }
            ),
        }
    }

    fn on_end<W: StrWrite>(&mut self, w: &mut W, tag: Tag) -> io::Result<()> {
        match tag {
            Tag::BlockQuote => w.write_str("</blockquote>"),
            Tag::CodeBlock(_) => Ok(()), // handled in on_code_block_end
            Tag::Emphasis => w.write_str("</em>"),
            Tag::FootnoteDefinition(_) => w.write_str("</div>"),
            Tag::Heading(level) => write!(w, "</h{}>", level),
            Tag::Image(_, _, _) => Ok(()), // handled in on_image_event
            Tag::Item => w.write_str("</li>"),
            Tag::Link(_, _, _) => w.write_str("</a>"),
            Tag::List(Some(_)) => w.write_str("</ol>"),
            Tag::List(None) => w.write_str("</ul>"),
            Tag::Paragraph => w.write_str("</p>"),
            Tag::Strikethrough => w.write_str("</del>"),
            Tag::Strong => w.write_str("</strong>"),
            Tag::Table(_) => w.write_str("</tbody></table>"),
            Tag::TableHead => {
                self.table_state = TableState::Body;
                w.write_str("</tr></thead><tbody>")
            }
            Tag::TableRow => w.write_str("</tr>"),
            Tag::TableCell => {
                self.table_cell_index += 1;
                w.write_str(match self.table_state {
                    TableState::Head => "</th>",
                    TableState::Body => "</td>",
                })
            }
        }
    }

    fn on_code_block_end<W: StrWrite>(&mut self, w: &mut W) -> io::Result<()> {
        let block = match self.code_block.take() {
            Some(block) => block,
            None => return Ok(()),
        };
        w.write_str("<div class=\"highlight\"><pre><code")?;
        if let Some(lang) = &block.lang {
            write!(w, " class=\"language-{}\"", EscapeHtml(lang))?;
        }
        w.write_str(">")?;
        w.write_str(&highlight(&block.code, block.lang.as_deref()))?;
        w.write_str("</code></pre></div>")
    }

    fn on_image_event<W: StrWrite>(
        &mut self,
        w: &mut W,
        event: Event<'a>,
    ) -> io::Result<()> {
        let (image, depth) = match &mut self.image {
            Some(state) => state,
            None => return Ok(()),
        };
        match event {
            Event::Start(Tag::Image(..)) => *depth += 1,
            Event::End(Tag::Image(..)) if *depth > 0 => *depth -= 1,
            Event::End(Tag::Image(..)) => {
                let image = match self.image.take() {
                    Some((image, _)) => image,
                    None => return Ok(()),
                };
                write!(
                    w,
                    "<img src=\"{}\" alt=\"{}\"",
                    EscapeHref(&image.dest),
                    EscapeHtml(&image.alt),
                )?;
                if !image.title.is_empty() {
                    write!(w, " title=\"{}\"", EscapeHtml(&image.title))?;
                }
                return w.write_str(" />");
            }
            Event::Text(text) | Event::Code(text) => image.alt.push_str(&text),
            Event::SoftBreak | Event::HardBreak => image.alt.push(' '),
            _ => {}
        }
        Ok(())
    }

    fn on_text<W: StrWrite>(&mut self, w: &mut W, s: CowStr) -> io::Result<()> {
        escape_html(w, &s)
    }

    fn on_code<W: StrWrite>(&mut self, w: &mut W, s: CowStr) -> io::Result<()> {
        write!(w, "<code class=\"highlight\">{}</code>", EscapeHtml(&s))
    }

    fn on_html<W: StrWrite>(&mut self, w: &mut W, s: CowStr) -> io::Result<()> {
        w.write_str(&s)
    }

    fn on_soft_break<W: StrWrite>(&mut self, w: &mut W) -> io::Result<()> {
        w.write_str("\n")
    }

    fn on_hard_break<W: StrWrite>(&mut self, w: &mut W) -> io::Result<()> {
        w.write_str("<br />")
    }

    fn on_rule<W: StrWrite>(&mut self, w: &mut W) -> io::Result<()> {
        w.write_str("<hr />")
    }

    fn on_task_list_marker<W: StrWrite>(
        &mut self,
        w: &mut W,
        checked: bool,
    ) -> io::Result<()> {
        write!(
            w,
            "<input disabled=\"\" type=\"checkbox\" {}/>",
            match checked {
                true => "checked=\"\" ",
                false => "",
            }
        )
    }

    /// Flushes anything still buffered at the end of the input. Unterminated
    /// code blocks are written out as if they had been closed.
    pub fn finish<W: StrWrite>(&mut self, w: &mut W) -> io::Result<()> {
        self.on_code_block_end(w)
    }
}

impl Default for HtmlRenderer<'_> {
    fn default() -> Self {
        Self::new()
    }
}

/// Converts [`Event`]s into an HTML string much like
/// `pulldown_cmark::html::push_html` except that code blocks are syntax
/// highlighted. See the module description for more details.
pub fn push_html<'a, I>(out: &mut String, events: I) -> io::Result<()>
where
    I: Iterator<Item = Event<'a>>,
{
    let mut renderer = HtmlRenderer::new();
    for event in events {
        renderer.on_event(out, event)?;
    }
    renderer.finish(out)
}
