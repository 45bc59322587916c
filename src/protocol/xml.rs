use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bytes::{BufMut, BytesMut};

/// Prolog every payload starts with. The client counts it into the length
/// prefix, so it is part of the wire contract, not decoration.
pub const XML_PROLOG: &str = "<?xml version=\"1.0\" encoding=\"iso-8859-1\"?>\n";

const XMLNS: &str = "urn:debugger_protocol_v1";
const XMLNS_XDEBUG: &str = "https://xdebug.org/dbgp/xdebug";

#[derive(Debug, Clone)]
enum Text {
    Plain(String),
    Base64(Vec<u8>),
}

/// One XML element of a protocol document: ordered attributes, optional
/// text content, child elements.
#[derive(Debug, Clone)]
pub struct Node {
    name: &'static str,
    attributes: Vec<(&'static str, String)>,
    text: Option<Text>,
    children: Vec<Node>,
}

impl Node {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            attributes: vec![],
            text: None,
            children: vec![],
        }
    }

    fn root(name: &'static str) -> Self {
        let mut node = Node::new(name);
        node.attr("xmlns", XMLNS);
        node.attr("xmlns:xdebug", XMLNS_XDEBUG);
        node
    }

    /// `<response>` root with the protocol namespaces.
    pub fn response() -> Self {
        Node::root("response")
    }

    /// `<init>` root, sent once per connection.
    pub fn init() -> Self {
        Node::root("init")
    }

    /// `<notify name="...">` root for out-of-band messages.
    pub fn notify(name: &str) -> Self {
        let mut node = Node::root("notify");
        node.attr("name", name);
        node
    }

    /// `<stream type="...">` root for redirected output.
    pub fn stream(channel: &str) -> Self {
        let mut node = Node::root("stream");
        node.attr("type", channel);
        node
    }

    pub fn name(&self) -> &str {
        self.name
    }

    pub fn attr(&mut self, name: &'static str, value: impl Into<String>) {
        self.attributes.push((name, value.into()));
    }

    pub fn get_attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn add_child(&mut self, child: Node) {
        self.children.push(child);
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = Some(Text::Plain(text.into()));
    }

    /// Binary-safe text content, emitted base64 with an `encoding="base64"`
    /// attribute.
    pub fn set_text_base64(&mut self, raw: &[u8]) {
        self.text = Some(Text::Base64(raw.to_vec()));
    }

    /// Render the element (no prolog, no envelope).
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out);
        out
    }

    fn render_into(&self, out: &mut String) {
        out.push('<');
        out.push_str(self.name);
        for (name, value) in &self.attributes {
            out.push(' ');
            out.push_str(name);
            out.push_str("=\"");
            out.push_str(&escape_attribute(value));
            out.push('"');
        }
        if matches!(self.text, Some(Text::Base64(_))) {
            out.push_str(" encoding=\"base64\"");
        }

        if self.children.is_empty() && self.text.is_none() {
            out.push_str("/>");
            return;
        }

        out.push('>');
        match &self.text {
            Some(Text::Plain(text)) => out.push_str(&escape_text(text)),
            Some(Text::Base64(raw)) => out.push_str(&BASE64.encode(raw)),
            None => {}
        }
        for child in &self.children {
            child.render_into(out);
        }
        out.push_str("</");
        out.push_str(self.name);
        out.push('>');
    }

    /// Wrap the document into the wire envelope:
    /// decimal payload length, NUL, prolog plus body, NUL.
    pub fn into_packet(&self) -> Vec<u8> {
        let body = self.render();
        let payload_len = XML_PROLOG.len() + body.len();

        let mut packet = BytesMut::with_capacity(payload_len + 16);
        packet.put_slice(payload_len.to_string().as_bytes());
        packet.put_u8(0);
        packet.put_slice(XML_PROLOG.as_bytes());
        packet.put_slice(body.as_bytes());
        packet.put_u8(0);
        packet.to_vec()
    }
}

pub fn escape_attribute(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn escape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}
