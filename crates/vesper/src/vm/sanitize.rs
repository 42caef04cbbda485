use std::borrow::Cow;

const URL_ATTRIBUTES: &[&str] = &[
    "href", "src", "action", "formaction", "background", "cite", "poster", "xlink:href",
];

const UNSAFE_PROTOCOLS: &[&str] = &["javascript:", "vbscript:"];

pub(crate) fn is_url_attribute(name: &str) -> bool {
    URL_ATTRIBUTES.iter().any(|attr| attr.eq_ignore_ascii_case(name))
}

/// Prefixes script URLs with `unsafe:`. Whitespace and control characters
/// are ignored when reading the protocol.
pub(crate) fn sanitize_url(value: &str) -> Cow<'_, str> {
    let protocol: String = value
        .chars()
        .filter(|c| !c.is_ascii_whitespace() && !c.is_control())
        .take_while(|&c| c != ':')
        .chain(std::iter::once(':'))
        .collect::<String>()
        .to_ascii_lowercase();
    if UNSAFE_PROTOCOLS.contains(&protocol.as_str()) {
        Cow::Owned(format!("unsafe:{value}"))
    } else {
        Cow::Borrowed(value)
    }
}
