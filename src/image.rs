use pulldown_cmark::{Event, LinkType, Tag, TagEnd};

use crate::attributes::ImageAttributes;

/// Attribute names that apply to markdown images as well as html images
pub const ALT_ATTRIBUTE: &str = "alt";
pub const TITLE_ATTRIBUTE: &str = "title";
pub const SRC_ATTRIBUTE: &str = "src";

/// Serialize attributes into a self closing `<img />` tag.
///
/// Values are written verbatim: a `"` inside a value ends the attribute early.
pub fn render_html_image(attributes: &ImageAttributes) -> String {
    let attributes = attributes
        .iter()
        .map(|(key, value)| format!("{key}=\"{value}\""))
        .collect::<Vec<_>>()
        .join(" ");

    format!("<img {attributes} />")
}

/// Characters that would start inline markdown inside an image's alt text
const MARKDOWN_SPECIAL_CHARACTERS: [char; 8] = ['\\', '[', ']', '*', '_', '`', '<', '>'];

/// Backslash escape inline markdown so text is read back verbatim
pub fn escape_markdown(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if MARKDOWN_SPECIAL_CHARACTERS.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }

    escaped
}

/// What a diagram code block is replaced with
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagramImage {
    Markdown {
        url: String,
        alt: Option<String>,
        title: Option<String>,
    },
    Html(String),
}

impl DiagramImage {
    pub fn markdown(url: String, defaults: &ImageAttributes) -> Self {
        DiagramImage::Markdown {
            url,
            alt: defaults.get(ALT_ATTRIBUTE).cloned(),
            title: defaults.get(TITLE_ATTRIBUTE).cloned(),
        }
    }

    /// Merge our defaults, the block attributes and the image source, in that order
    pub fn html(url: String, defaults: &ImageAttributes, block: ImageAttributes) -> Self {
        let mut attributes = defaults.clone();
        attributes.extend(block);
        attributes.insert(SRC_ATTRIBUTE.to_string(), url);

        DiagramImage::Html(render_html_image(&attributes))
    }

    pub fn into_events(self) -> Vec<Event<'static>> {
        match self {
            DiagramImage::Markdown { url, alt, title } => {
                let mut events = vec![
                    Event::Start(Tag::Paragraph),
                    Event::Start(Tag::Image {
                        link_type: LinkType::Inline,
                        dest_url: url.into(),
                        title: title.unwrap_or_default().into(),
                        id: "".into(),
                    }),
                ];
                if let Some(alt) = alt.filter(|a| !a.is_empty()) {
                    events.push(Event::Text(escape_markdown(&alt).into()));
                }
                events.extend([Event::End(TagEnd::Image), Event::End(TagEnd::Paragraph)]);

                events
            }
            DiagramImage::Html(html) => vec![
                Event::Start(Tag::HtmlBlock),
                Event::Html(format!("{html}\n").into()),
                Event::End(TagEnd::HtmlBlock),
            ],
        }
    }
}

#[cfg(test)]
mod test {
    use scraper::{Html, Selector};

    use super::*;

    fn attributes<const N: usize>(pairs: [(&str, &str); N]) -> ImageAttributes {
        pairs
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn renders_in_order() {
        assert_eq!(
            render_html_image(&attributes([
                ("alt", "d2 diagram"),
                ("width", "30px"),
                ("src", "/d2/0.svg")
            ])),
            r#"<img alt="d2 diagram" width="30px" src="/d2/0.svg" />"#
        );
    }

    #[test]
    fn values_are_not_escaped() {
        assert_eq!(
            render_html_image(&attributes([("alt", "a \"quoted\" <b>")])),
            r#"<img alt="a "quoted" <b>" />"#
        );
    }

    #[test]
    fn html_merges_defaults_block_and_src() {
        let defaults = attributes([("alt", "d2 diagram"), ("src", "ignored"), ("class", "d2")]);
        let block = attributes([("alt", "Custom"), ("width", "10px"), ("src", "nope")]);

        let html = match DiagramImage::html("/d2/3.svg".into(), &defaults, block) {
            DiagramImage::Html(html) => html,
            other => panic!("Expected an html image, got {other:?}"),
        };

        let fragment = Html::parse_fragment(&html);
        let img = fragment
            .select(&Selector::parse("img").unwrap())
            .next()
            .expect("Expected an img tag");

        assert_eq!(img.attr("alt"), Some("Custom"));
        assert_eq!(img.attr("class"), Some("d2"));
        assert_eq!(img.attr("width"), Some("10px"));
        assert_eq!(img.attr("src"), Some("/d2/3.svg"));
        // defaults keep their position, block only attributes are appended
        assert_eq!(
            html,
            r#"<img alt="Custom" src="/d2/3.svg" class="d2" width="10px" />"#
        );
    }

    #[test]
    fn markdown_only_uses_alt_and_title() {
        let defaults = attributes([("alt", "d2 diagram"), ("title", "Diagram"), ("width", "1px")]);

        assert_eq!(
            DiagramImage::markdown("/d2/0.svg".into(), &defaults),
            DiagramImage::Markdown {
                url: "/d2/0.svg".into(),
                alt: Some("d2 diagram".into()),
                title: Some("Diagram".into()),
            }
        );
    }

    #[test]
    fn markdown_events() {
        let image = DiagramImage::Markdown {
            url: "/d2/0.svg".into(),
            alt: Some("d2 diagram".into()),
            title: None,
        };
        let mut events = image.into_events().into_iter();

        assert_eq!(events.next(), Some(Event::Start(Tag::Paragraph)));
        let next = events.next();
        assert!(
            matches!(
                next,
                Some(Event::Start(Tag::Image { ref dest_url, ref title, .. }))
                    if &**dest_url == "/d2/0.svg" && title.is_empty()
            ),
            "Expected Image got {next:#?}"
        );
        assert_eq!(events.next(), Some(Event::Text("d2 diagram".into())));
        assert_eq!(events.next(), Some(Event::End(TagEnd::Image)));
        assert_eq!(events.next(), Some(Event::End(TagEnd::Paragraph)));
        assert_eq!(events.next(), None);
    }

    #[test]
    fn escapes_markdown_in_alt() {
        assert_eq!(escape_markdown("d2 diagram"), "d2 diagram");
        assert_eq!(
            escape_markdown(r"a [b] *c* _d_ `e` <f> \g"),
            r"a \[b\] \*c\* \_d\_ \`e\` \<f\> \\g"
        );

        let image = DiagramImage::Markdown {
            url: "/d2/0.svg".into(),
            alt: Some("a *b*".into()),
            title: None,
        };
        assert!(image
            .into_events()
            .contains(&Event::Text(r"a \*b\*".into())));
    }

    #[test]
    fn html_events() {
        let mut events = DiagramImage::Html("<img src=\"/d2/0.svg\" />".into())
            .into_events()
            .into_iter();

        assert_eq!(events.next(), Some(Event::Start(Tag::HtmlBlock)));
        assert_eq!(
            events.next(),
            Some(Event::Html("<img src=\"/d2/0.svg\" />\n".into()))
        );
        assert_eq!(events.next(), Some(Event::End(TagEnd::HtmlBlock)));
        assert_eq!(events.next(), None);
    }
}
