//! Minimal HTML fragment reading and escaping.
//!
//! Good enough for trusted-content insertion into [`SimpleDocument`]
//! (elements, attributes, text, comments, void and raw-text elements). It is
//! not a conforming HTML5 tokenizer.
//!
//! [`SimpleDocument`]: crate::SimpleDocument

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Fragment {
    Element {
        tag: String,
        attributes: Vec<(String, String)>,
        children: Vec<Fragment>,
    },
    Text(String),
    Comment(String),
}

pub(crate) const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "textarea", "title"];

enum Token<'a> {
    Text(&'a str),
    Comment(&'a str),
    Open {
        tag: String,
        attributes: Vec<(String, String)>,
        self_closing: bool,
    },
    Close(String),
}

struct Tokenizer<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Tokenizer<'a> {
    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn next_token(&mut self) -> Option<Token<'a>> {
        let rest = self.rest();
        if rest.is_empty() {
            return None;
        }

        if let Some(after) = rest.strip_prefix("<!--") {
            let (body, consumed) = match after.find("-->") {
                Some(end) => (&after[..end], end + 3),
                None => (after, after.len()),
            };
            self.pos += 4 + consumed;
            return Some(Token::Comment(body));
        }

        if let Some(after) = rest.strip_prefix("</") {
            if let Some(end) = after.find('>') {
                let name = after[..end].trim().to_ascii_lowercase();
                self.pos += 2 + end + 1;
                return Some(Token::Close(name));
            }
        }

        if rest.starts_with('<')
            && rest[1..].starts_with(|c: char| c.is_ascii_alphabetic())
        {
            let start = self.pos;
            if let Some(token) = self.open_tag() {
                return Some(token);
            }
            self.pos = start;
        }

        // A lone `<` that didn't start a tag is ordinary text.
        let skip = usize::from(rest.starts_with('<'));
        let end = rest[skip..].find('<').map_or(rest.len(), |i| i + skip);
        self.pos += end;
        Some(Token::Text(&rest[..end]))
    }

    fn open_tag(&mut self) -> Option<Token<'a>> {
        self.pos += 1;
        let tag = self.take_while(|c| c.is_ascii_alphanumeric() || c == '-' || c == ':');
        let tag = tag.to_ascii_lowercase();
        let mut attributes = Vec::new();

        loop {
            self.take_while(char::is_whitespace);
            let rest = self.rest();
            if rest.is_empty() {
                return None;
            }
            if rest.starts_with("/>") {
                self.pos += 2;
                return Some(Token::Open { tag, attributes, self_closing: true });
            }
            if rest.starts_with('>') {
                self.pos += 1;
                return Some(Token::Open { tag, attributes, self_closing: false });
            }

            let name = self.take_while(|c| !c.is_whitespace() && c != '=' && c != '>' && c != '/');
            if name.is_empty() {
                // stray `/` or `=`
                self.pos += 1;
                continue;
            }
            let name = name.to_ascii_lowercase();

            self.take_while(char::is_whitespace);
            if !self.rest().starts_with('=') {
                attributes.push((name, String::new()));
                continue;
            }
            self.pos += 1;
            self.take_while(char::is_whitespace);

            let value = match self.rest().chars().next() {
                Some(quote @ ('"' | '\'')) => {
                    self.pos += 1;
                    let value = self.take_while(|c| c != quote);
                    if self.rest().is_empty() {
                        return None;
                    }
                    self.pos += 1;
                    value
                }
                _ => self.take_while(|c| !c.is_whitespace() && c != '>'),
            };
            attributes.push((name, decode_entities(value)));
        }
    }

    fn take_while(&mut self, predicate: impl Fn(char) -> bool) -> &'a str {
        let rest = self.rest();
        let end = rest
            .char_indices()
            .find(|&(_, c)| !predicate(c))
            .map_or(rest.len(), |(i, _)| i);
        self.pos += end;
        &rest[..end]
    }

    /// Consumes everything up to the matching close tag of a raw-text element.
    fn raw_text(&mut self, tag: &str) -> &'a str {
        let rest = self.rest();
        let lower = rest.to_ascii_lowercase();
        let close = format!("</{tag}");
        match lower.find(&close) {
            Some(end) => {
                let body = &rest[..end];
                let after = &rest[end..];
                let consumed = after.find('>').map_or(after.len(), |i| i + 1);
                self.pos += end + consumed;
                body
            }
            None => {
                self.pos = self.input.len();
                rest
            }
        }
    }
}

struct OpenFrame {
    tag: String,
    attributes: Vec<(String, String)>,
    children: Vec<Fragment>,
}

fn push_node(stack: &mut [OpenFrame], roots: &mut Vec<Fragment>, node: Fragment) {
    match stack.last_mut() {
        Some(frame) => frame.children.push(node),
        None => roots.push(node),
    }
}

fn close_frame(stack: &mut Vec<OpenFrame>, roots: &mut Vec<Fragment>) {
    if let Some(frame) = stack.pop() {
        let element = Fragment::Element {
            tag: frame.tag,
            attributes: frame.attributes,
            children: frame.children,
        };
        push_node(stack, roots, element);
    }
}

/// Reads an HTML fragment into a forest of nodes. Unclosed elements are
/// closed at the end of input; stray close tags are dropped.
pub(crate) fn parse_fragment(input: &str) -> Vec<Fragment> {
    let mut tokenizer = Tokenizer { input, pos: 0 };
    let mut stack: Vec<OpenFrame> = Vec::new();
    let mut roots = Vec::new();

    while let Some(token) = tokenizer.next_token() {
        match token {
            Token::Text(text) => push_node(&mut stack, &mut roots, Fragment::Text(decode_entities(text))),
            Token::Comment(body) => push_node(&mut stack, &mut roots, Fragment::Comment(body.to_string())),
            Token::Open { tag, attributes, self_closing } => {
                if self_closing || VOID_ELEMENTS.contains(&tag.as_str()) {
                    let element = Fragment::Element { tag, attributes, children: Vec::new() };
                    push_node(&mut stack, &mut roots, element);
                } else if RAW_TEXT_ELEMENTS.contains(&tag.as_str()) {
                    let body = tokenizer.raw_text(&tag);
                    let children = if body.is_empty() {
                        Vec::new()
                    } else {
                        vec![Fragment::Text(body.to_string())]
                    };
                    push_node(&mut stack, &mut roots, Fragment::Element { tag, attributes, children });
                } else {
                    stack.push(OpenFrame { tag, attributes, children: Vec::new() });
                }
            }
            Token::Close(tag) => {
                if let Some(depth) = stack.iter().rposition(|frame| frame.tag == tag) {
                    while stack.len() > depth {
                        close_frame(&mut stack, &mut roots);
                    }
                } else {
                    log::trace!("dropping stray close tag </{tag}>");
                }
            }
        }
    }

    while !stack.is_empty() {
        close_frame(&mut stack, &mut roots);
    }
    roots
}

fn decode_entities(input: &str) -> String {
    if !input.contains('&') {
        return input.to_string();
    }

    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let candidate = &rest[amp..];
        let decoded = candidate
            .find(';')
            .filter(|&semi| semi <= 10)
            .and_then(|semi| decode_entity(&candidate[1..semi]).map(|c| (c, semi + 1)));
        match decoded {
            Some((c, len)) => {
                out.push(c);
                rest = &candidate[len..];
            }
            None => {
                out.push('&');
                rest = &candidate[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "lt" => Some('<'),
        "gt" => Some('>'),
        "amp" => Some('&'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => {
            let digits = name.strip_prefix('#')?;
            let code = match digits.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => digits.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}

/// Escapes character data for inclusion in element content.
pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

/// Escapes a double-quoted attribute value.
pub fn escape_attribute(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            _ => out.push(c),
        }
    }
    out
}
