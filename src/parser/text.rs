use scraper::{Html, Node};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Elements whose text never belongs to the visible page.
const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

const BOM: char = '\u{feff}';

/// Fold a token for matching: NBSP → space, strip diacritics, collapse
/// whitespace, trim, lower-case.
pub fn normalize(token: &str) -> String {
    let folded: String = token
        .replace('\u{a0}', " ")
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .collect();
    folded
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Dual-plane token arrays. `norm[i]` is always `normalize(&raw[i])`.
#[derive(Debug, Clone, Default)]
pub struct TokenStream {
    pub raw: Vec<String>,
    pub norm: Vec<String>,
}

impl TokenStream {
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    /// Raw tokens in `[from, to)`, clamped to the stream, joined by spaces.
    pub fn excerpt(&self, from: usize, to: usize) -> String {
        let to = to.min(self.raw.len());
        let from = from.min(to);
        self.raw[from..to].join(" ")
    }
}

pub fn tokenize(text: &str) -> TokenStream {
    let raw: Vec<String> = text.split_whitespace().map(str::to_string).collect();
    let norm = raw.iter().map(|t| normalize(t)).collect();
    TokenStream { raw, norm }
}

/// Flatten fetched content to visible text. Plain text passes through;
/// markup is reduced to its trimmed text nodes joined by single spaces.
pub fn page_text(content: &str) -> String {
    let body = content.trim_start_matches(|c: char| c == BOM || c.is_whitespace());
    if body.starts_with('<') {
        flatten_markup(body)
    } else {
        body.to_string()
    }
}

fn flatten_markup(markup: &str) -> String {
    let doc = Html::parse_document(markup);
    let mut parts: Vec<&str> = Vec::new();

    for node in doc.tree.root().descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|e| SKIPPED_ELEMENTS.contains(&e.name()))
        });
        if hidden {
            continue;
        }
        let t = text.trim();
        if !t.is_empty() {
            parts.push(t);
        }
    }

    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_folds_accents_and_case() {
        assert_eq!(normalize("Équipe"), "equipe");
        assert_eq!(normalize("Mbappé"), "mbappe");
        assert_eq!(normalize("  PD/90m. "), "pd/90m.");
    }

    #[test]
    fn normalize_replaces_nbsp_and_collapses() {
        assert_eq!(normalize("Saint\u{a0}\u{a0}Étienne"), "saint etienne");
    }

    #[test]
    fn tokenize_keeps_planes_aligned() {
        let ts = tokenize("1  Kylian\tMbappé\nBU 12 0,8");
        assert_eq!(ts.len(), 6);
        assert_eq!(ts.raw[2], "Mbappé");
        assert_eq!(ts.norm[2], "mbappe");
        assert_eq!(ts.norm[3], "bu");
        for (raw, norm) in ts.raw.iter().zip(&ts.norm) {
            assert_eq!(&normalize(raw), norm);
        }
    }

    #[test]
    fn tokenize_never_drops_punctuation_tokens() {
        let ts = tokenize("- 3 - -");
        assert_eq!(ts.raw, vec!["-", "3", "-", "-"]);
    }

    #[test]
    fn excerpt_is_clamped() {
        let ts = tokenize("a b c");
        assert_eq!(ts.excerpt(1, 99), "b c");
        assert_eq!(ts.excerpt(10, 20), "");
    }

    #[test]
    fn page_text_passes_plain_text_through() {
        assert_eq!(page_text("Joueur PD 1 John"), "Joueur PD 1 John");
    }

    #[test]
    fn page_text_ignores_leading_bom() {
        let html = "\u{feff}\n<html><body><p>1</p><p>Lens</p></body></html>";
        assert_eq!(page_text(html), "1 Lens");
        assert_eq!(page_text("\u{feff}Joueur PD"), "Joueur PD");
    }

    #[test]
    fn page_text_flattens_markup_and_skips_scripts() {
        let html = "<html><head><script>var x = 1;</script><style>p{}</style></head>\
                    <body><table><tr><td>1</td><td> Lens </td></tr></table></body></html>";
        assert_eq!(page_text(html), "1 Lens");
    }
}
