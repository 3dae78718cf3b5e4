//! Conversion between HTML fragments and document nodes.
//!
//! Parsing is tolerant: malformed markup degrades to whatever text and
//! structure can be recovered, it never fails.

use crate::core::{Document, ElementNode, HeadingTag, LINK_KIND, Node, PARAGRAPH_KIND};

const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];
const DROPPED_TAGS: &[&str] = &["head", "script", "style", "template", "title", "noscript"];
const PARAGRAPH_TAGS: &[&str] = &["p", "div", "li", "blockquote", "pre"];

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Text(String),
    Open {
        name: String,
        attrs: Vec<(String, String)>,
        self_closing: bool,
    },
    Close(String),
}

struct Tokenizer<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Tokenizer<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn next_token(&mut self) -> Option<Token> {
        loop {
            let rest = self.rest();
            if rest.is_empty() {
                return None;
            }

            if !rest.starts_with('<') {
                let end = rest.find('<').unwrap_or(rest.len());
                self.pos += end;
                return Some(Token::Text(decode_entities(&rest[..end])));
            }

            if let Some(comment) = rest.strip_prefix("<!--") {
                self.pos += 4 + comment.find("-->").map_or(comment.len(), |ix| ix + 3);
                continue;
            }
            if rest.starts_with("<!") || rest.starts_with("<?") {
                self.pos += rest.find('>').map_or(rest.len(), |ix| ix + 1);
                continue;
            }

            if let Some(close) = rest.strip_prefix("</") {
                let Some(end) = close.find('>') else {
                    self.pos = self.src.len();
                    return None;
                };
                self.pos += 2 + end + 1;
                let name = close[..end].trim().to_ascii_lowercase();
                if name.is_empty() {
                    continue;
                }
                return Some(Token::Close(name));
            }

            let starts_tag = rest[1..]
                .chars()
                .next()
                .is_some_and(|c| c.is_ascii_alphabetic());
            if !starts_tag {
                self.pos += 1;
                return Some(Token::Text("<".to_string()));
            }

            return Some(self.open_tag());
        }
    }

    fn open_tag(&mut self) -> Token {
        let rest = self.rest();
        let Some(end) = find_tag_end(rest) else {
            // Unterminated tag: the remainder is text.
            self.pos = self.src.len();
            return Token::Text(decode_entities(rest));
        };
        self.pos += end + 1;

        let inner = &rest[1..end];
        let self_closing = inner.trim_end().ends_with('/');
        let inner = inner.trim_end().trim_end_matches('/');
        let name_len = inner
            .find(|c: char| c.is_ascii_whitespace())
            .unwrap_or(inner.len());
        let name = inner[..name_len].to_ascii_lowercase();
        let attrs = parse_attrs(&inner[name_len..]);

        if DROPPED_TAGS.contains(&name.as_str()) && !self_closing {
            self.skip_raw_content(&name);
            return Token::Open {
                name,
                attrs,
                self_closing: true,
            };
        }

        Token::Open {
            name,
            attrs,
            self_closing,
        }
    }

    fn skip_raw_content(&mut self, name: &str) {
        let closing = format!("</{name}");
        let lower = self.rest().to_ascii_lowercase();
        match lower.find(&closing) {
            Some(ix) => {
                let after = &lower[ix..];
                self.pos += ix + after.find('>').map_or(after.len(), |end| end + 1);
            }
            None => self.pos = self.src.len(),
        }
    }
}

fn find_tag_end(tag: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (ix, c) in tag.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '>') => return Some(ix),
            _ => {}
        }
    }
    None
}

fn parse_attrs(mut s: &str) -> Vec<(String, String)> {
    let mut attrs = Vec::new();
    loop {
        s = s.trim_start();
        if s.is_empty() {
            return attrs;
        }
        let name_end = s
            .find(|c: char| c.is_ascii_whitespace() || c == '=')
            .unwrap_or(s.len());
        let name = s[..name_end].to_ascii_lowercase();
        s = s[name_end..].trim_start();

        let value = if let Some(after_eq) = s.strip_prefix('=') {
            let after_eq = after_eq.trim_start();
            match after_eq.chars().next() {
                Some(q @ ('"' | '\'')) => {
                    let body = &after_eq[1..];
                    let end = body.find(q).unwrap_or(body.len());
                    s = body.get(end + 1..).unwrap_or("");
                    decode_entities(&body[..end])
                }
                _ => {
                    let end = after_eq
                        .find(|c: char| c.is_ascii_whitespace())
                        .unwrap_or(after_eq.len());
                    s = &after_eq[end..];
                    decode_entities(&after_eq[..end])
                }
            }
        } else {
            String::new()
        };

        if !name.is_empty() {
            attrs.push((name, value));
        }
    }
}

fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }

    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];

        let decoded = rest.find(';').filter(|&end| end <= 10).and_then(|end| {
            let entity = &rest[1..end];
            let c = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some('\u{a0}'),
                _ => entity.strip_prefix('#').and_then(|num| {
                    let code = match num.strip_prefix(['x', 'X']) {
                        Some(hex) => u32::from_str_radix(hex, 16).ok(),
                        None => num.parse::<u32>().ok(),
                    };
                    code.and_then(char::from_u32)
                }),
            };
            c.map(|c| (c, end))
        });

        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &rest[end + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

struct Frame {
    name: String,
    attrs: Vec<(String, String)>,
    children: Vec<Node>,
}

impl Frame {
    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

fn push_node(children: &mut Vec<Node>, node: Node) {
    if let (Some(Node::Text(prev)), Node::Text(next)) = (children.last_mut(), &node) {
        prev.text.push_str(&next.text);
        return;
    }
    children.push(node);
}

/// Flattens block children so the result only holds text and links.
fn inline_children(children: Vec<Node>) -> Vec<Node> {
    let mut out = Vec::new();
    for child in children {
        if child.is_inline() {
            push_node(&mut out, child);
            continue;
        }
        if let Node::Element(el) = child {
            for grandchild in inline_children(el.children) {
                push_node(&mut out, grandchild);
            }
        }
    }
    out
}

fn close_frame(frame: Frame) -> Vec<Node> {
    let name = frame.name.as_str();

    if name == "a" {
        let text: String = frame.children.iter().map(Node::text_content).collect();
        if text.is_empty() {
            return Vec::new();
        }
        return match frame.attr("href") {
            Some(href) => vec![Node::link(href, text)],
            None => vec![Node::text(text)],
        };
    }

    if let Some(tag) = HeadingTag::parse(name) {
        let mut heading = Node::heading(tag, "");
        if let Node::Element(el) = &mut heading {
            el.children = inline_children(frame.children);
        }
        return vec![heading];
    }

    if PARAGRAPH_TAGS.contains(&name) {
        if name == "div" && frame.children.iter().any(|child| !child.is_inline()) {
            return frame.children;
        }
        return vec![Node::element(PARAGRAPH_KIND, inline_children(frame.children))];
    }

    frame.children
}

/// Parses an HTML fragment (or full document) into top-level nodes.
pub fn nodes_from_html(html: &str) -> Vec<Node> {
    let mut root: Vec<Node> = Vec::new();
    let mut stack: Vec<Frame> = Vec::new();
    let mut tokenizer = Tokenizer::new(html);

    fn emit(stack: &mut [Frame], root: &mut Vec<Node>, nodes: Vec<Node>) {
        let target = match stack.last_mut() {
            Some(frame) => &mut frame.children,
            None => root,
        };
        for node in nodes {
            push_node(target, node);
        }
    }

    while let Some(token) = tokenizer.next_token() {
        match token {
            Token::Text(text) => {
                if text.trim().is_empty() && text.contains('\n') {
                    continue;
                }
                emit(&mut stack, &mut root, vec![Node::text(text)]);
            }
            Token::Open {
                name,
                attrs,
                self_closing,
            } => {
                if self_closing || VOID_TAGS.contains(&name.as_str()) {
                    continue;
                }
                stack.push(Frame {
                    name,
                    attrs,
                    children: Vec::new(),
                });
            }
            Token::Close(name) => {
                let Some(open_ix) = stack.iter().rposition(|frame| frame.name == name) else {
                    continue;
                };
                while stack.len() > open_ix {
                    let Some(frame) = stack.pop() else { break };
                    let nodes = close_frame(frame);
                    emit(&mut stack, &mut root, nodes);
                }
            }
        }
    }

    while let Some(frame) = stack.pop() {
        let nodes = close_frame(frame);
        emit(&mut stack, &mut root, nodes);
    }

    root
}

fn escape_text(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            c => out.push(c),
        }
    }
}

fn write_node(node: &Node, out: &mut String) {
    match node {
        Node::Text(t) => escape_text(&t.text, out),
        Node::Element(el) => write_element(el, out),
    }
}

fn write_element(el: &ElementNode, out: &mut String) {
    let tag = if let Some(heading) = el.heading_tag() {
        heading.as_str()
    } else if el.kind == PARAGRAPH_KIND {
        "p"
    } else if el.kind == LINK_KIND {
        "a"
    } else {
        "div"
    };

    out.push('<');
    out.push_str(tag);
    if let Some(url) = el.url() {
        out.push_str(" href=\"");
        escape_text(url, out);
        out.push('"');
    }
    out.push('>');

    if tag != "a" && el.children.iter().all(|child| child.text_content().is_empty()) {
        out.push_str("<br>");
    } else {
        for child in &el.children {
            write_node(child, out);
        }
    }

    out.push_str("</");
    out.push_str(tag);
    out.push('>');
}

/// Serializes the document as an HTML fragment.
pub fn html_from_document(doc: &Document) -> String {
    let mut out = String::new();
    for node in &doc.children {
        write_node(node, &mut out);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inline_fragment_yields_three_nodes() {
        let nodes = nodes_from_html(r#"test<a href="https://example.com">link</a>tail"#);
        assert_eq!(
            nodes,
            vec![
                Node::text("test"),
                Node::link("https://example.com", "link"),
                Node::text("tail"),
            ]
        );
    }

    #[test]
    fn block_tags_map_to_paragraphs_and_headings() {
        let nodes = nodes_from_html("<h2>Title</h2>\n<p>Body <b>bold</b></p>");
        assert_eq!(
            nodes,
            vec![
                Node::heading(HeadingTag::H2, "Title"),
                Node::paragraph("Body bold"),
            ]
        );
    }

    #[test]
    fn entities_are_decoded() {
        let nodes = nodes_from_html("a &amp; b &lt;c&gt; &#65;&#x42; &bogus;");
        assert_eq!(nodes, vec![Node::text("a & b <c> AB &bogus;")]);
    }

    #[test]
    fn malformed_markup_degrades_without_panicking() {
        assert_eq!(
            nodes_from_html("<p>open <a href='x'>dangling"),
            vec![Node::Element(ElementNode {
                kind: PARAGRAPH_KIND.to_string(),
                attrs: Default::default(),
                children: vec![Node::text("open "), Node::link("x", "dangling")],
            })]
        );
        assert_eq!(nodes_from_html("</p>stray"), vec![Node::text("stray")]);
        assert_eq!(nodes_from_html("a < b"), vec![Node::text("a < b")]);
        assert_eq!(nodes_from_html("<p class=\"x"), vec![Node::text("<p class=\"x")]);
        assert!(nodes_from_html("").is_empty());
    }

    #[test]
    fn head_and_script_content_is_dropped() {
        let nodes = nodes_from_html(
            "<html><head><title>t</title><style>p{}</style></head><body><script>x<y</script><p>ok</p></body></html>",
        );
        assert_eq!(nodes, vec![Node::paragraph("ok")]);
    }

    #[test]
    fn document_exports_as_html() {
        let doc = Document {
            children: vec![
                Node::heading(HeadingTag::H1, "A & B"),
                Node::Element(ElementNode {
                    kind: PARAGRAPH_KIND.to_string(),
                    attrs: Default::default(),
                    children: vec![
                        Node::text("see "),
                        Node::link("https://example.com/?a=1&b=\"2\"", "here"),
                    ],
                }),
                Node::paragraph(""),
            ],
        };
        assert_eq!(
            html_from_document(&doc),
            "<h1>A &amp; B</h1><p>see <a href=\"https://example.com/?a=1&amp;b=&quot;2&quot;\">here</a></p><p><br></p>"
        );
    }
}
