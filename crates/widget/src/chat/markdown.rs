use pulldown_cmark::{CowStr, Event, Options, Parser, Tag, html};

/// Turns markdown source into markup that is safe to inject into the panel.
pub trait MarkdownRenderer: Send + Sync {
    fn render(&self, source: &str) -> String;
}

/// CommonMark renderer that escapes raw HTML and neutralizes script links.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommonMarkRenderer;

impl CommonMarkRenderer {
    fn sanitize_destination(destination: CowStr<'_>) -> CowStr<'_> {
        let scheme = destination
            .trim_start()
            .split(':')
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();

        if destination.contains(':') && matches!(scheme.as_str(), "javascript" | "vbscript" | "data")
        {
            CowStr::Borrowed("#")
        } else {
            destination
        }
    }
}

impl MarkdownRenderer for CommonMarkRenderer {
    fn render(&self, source: &str) -> String {
        let options = Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TABLES;
        let events = Parser::new_ext(source, options).map(|event| match event {
            Event::Html(raw) => Event::Text(raw),
            Event::Start(Tag::Link(link_type, destination, title)) => Event::Start(Tag::Link(
                link_type,
                Self::sanitize_destination(destination),
                title,
            )),
            Event::Start(Tag::Image(link_type, destination, title)) => Event::Start(Tag::Image(
                link_type,
                Self::sanitize_destination(destination),
                title,
            )),
            other => other,
        });

        let mut markup = String::with_capacity(source.len() + source.len() / 2);
        html::push_html(&mut markup, events);
        markup
    }
}
