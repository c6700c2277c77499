use indexmap::IndexMap;

/// Image attributes in insertion order. Rendering follows this order.
pub type ImageAttributes = IndexMap<String, String>;

const TOKEN_SEPARATOR: char = ';';
const VALUE_SEPARATOR: char = '=';

/// Short attribute keys accepted in code block metadata, ex: ```` ```d2 w=30px;h=20px ````
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shorthand {
    Width,
    Height,
    Position,
    Alt,
    Title,
}

impl Shorthand {
    fn from_key(key: &str) -> Option<Self> {
        match key {
            "w" => Some(Shorthand::Width),
            "h" => Some(Shorthand::Height),
            "p" => Some(Shorthand::Position),
            "a" => Some(Shorthand::Alt),
            "t" => Some(Shorthand::Title),
            _ => None,
        }
    }

    fn canonical(self) -> &'static str {
        match self {
            Shorthand::Width => "width",
            Shorthand::Height => "height",
            Shorthand::Position => "position",
            Shorthand::Alt => "alt",
            Shorthand::Title => "title",
        }
    }
}

/// Expand a shorthand key to its full attribute name, other keys are returned as is
fn expand_key(key: &str) -> &str {
    Shorthand::from_key(key)
        .map(Shorthand::canonical)
        .unwrap_or(key)
}

/// Parse the `key=value;key=value` metadata that follows the language of a code block.
///
/// A token without a `=` keeps its key with an empty value. Later duplicates
/// replace the value of earlier ones.
pub fn parse_image_attributes(meta: Option<&str>) -> ImageAttributes {
    let mut attributes = ImageAttributes::new();

    let Some(meta) = meta else {
        return attributes;
    };

    for token in meta.split(TOKEN_SEPARATOR).map(str::trim) {
        if token.is_empty() {
            continue;
        }

        let (key, value) = token.split_once(VALUE_SEPARATOR).unwrap_or((token, ""));
        attributes.insert(expand_key(key.trim()).to_string(), value.trim().to_string());
    }

    attributes
}
