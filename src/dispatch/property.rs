use super::HandlerResult;
use crate::host::{Host, Value, VarContext};
use crate::protocol::error::ErrorCode;
use crate::protocol::parser::Args;
use crate::protocol::xml::Node;
use crate::session::Session;

/// Truncation limits a property export runs under. Handlers must route
/// every value through these; the `-m` override of one command never leaks
/// into the session defaults.
#[derive(Debug, Clone, Copy)]
pub(super) struct ExportLimits {
    pub max_data: i64,
    pub max_children: i64,
    pub max_depth: i64,
}

impl ExportLimits {
    fn of(session: &Session) -> Self {
        Self {
            max_data: session.features.max_data,
            max_children: session.features.max_children,
            max_depth: session.features.max_depth,
        }
    }

    fn with_max_data(mut self, max_data: Option<i64>) -> Self {
        if let Some(max_data) = max_data {
            self.max_data = max_data;
        }
        self
    }
}

/// Flat `property` element of one value, recursing into container children
/// until `max_depth`.
pub(super) fn property_node(name: Option<&str>, value: &Value, limits: &ExportLimits) -> Node {
    property_node_at(name, value, limits, 0)
}

fn property_node_at(name: Option<&str>, value: &Value, limits: &ExportLimits, depth: i64) -> Node {
    let mut node = Node::new("property");
    if let Some(name) = name {
        node.attr("name", name.to_string());
        node.attr("fullname", name.to_string());
    }
    node.attr("type", value.type_name());
    if let Value::Object { class, .. } = value {
        node.attr("classname", class.clone());
    }

    match value.children() {
        Some(children) => {
            node.attr("children", if children.is_empty() { "0" } else { "1" });
            node.attr("numchildren", children.len().to_string());
            if depth < limits.max_depth {
                for (child_name, child_value) in
                    children.iter().take(limits.max_children.max(0) as usize)
                {
                    node.add_child(property_node_at(
                        Some(child_name),
                        child_value,
                        limits,
                        depth + 1,
                    ));
                }
            }
        }
        None => {
            if let Some(text) = value.display_fragment() {
                node.attr("size", text.len().to_string());
                let truncated = clip_to_max_data(text, limits.max_data);
                node.set_text_base64(truncated.as_bytes());
            }
        }
    }
    node
}

/// Cut a payload down to `max_data` bytes without splitting a character.
pub(super) fn clip_to_max_data(mut text: String, max_data: i64) -> String {
    if max_data >= 0 && text.len() > max_data as usize {
        let mut cut = max_data as usize;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
    }
    text
}

fn uninitialized_node(name: &str) -> Node {
    let mut node = Node::new("property");
    node.attr("name", name.to_string());
    node.attr("fullname", name.to_string());
    node.attr("type", "uninitialized");
    node
}

pub(super) fn context_names(
    _session: &mut Session,
    _host: &mut dyn Host,
    _args: &Args,
    response: &mut Node,
) -> HandlerResult {
    for (name, id) in [
        ("Locals", "0"),
        ("Globals", "1"),
        ("User defined constants", "2"),
    ] {
        let mut child = Node::new("context");
        child.attr("name", name);
        child.attr("id", id);
        response.add_child(child);
    }
    Ok(())
}

pub(super) fn context_get(
    session: &mut Session,
    host: &mut dyn Host,
    args: &Args,
    response: &mut Node,
) -> HandlerResult {
    let context_id = args.get_int('c').unwrap_or(0);
    let depth = args.get_int('d').unwrap_or(0);
    let limits = ExportLimits::of(session);

    match context_id {
        0 => {
            let frame = host.frame(depth).ok_or(ErrorCode::StackDepthInvalid)?;
            for name in &frame.declared_variables {
                match host.read_variable(name, VarContext::Locals { depth }) {
                    Some(value) => response.add_child(property_node(Some(name), &value, &limits)),
                    None => response.add_child(uninitialized_node(name)),
                }
            }
        }
        1 => {
            for name in host.global_names() {
                if let Some(value) = host.read_variable(&name, VarContext::Globals) {
                    response.add_child(property_node(Some(&name), &value, &limits));
                }
            }
        }
        2 => {
            for (name, value) in host.constants() {
                let mut node = property_node(Some(&name), &value, &limits);
                node.attr("facet", "constant");
                response.add_child(node);
            }
        }
        _ => return Err(ErrorCode::ContextInvalid),
    }

    response.attr("context", context_id.to_string());
    Ok(())
}

fn resolve_context(
    host: &dyn Host,
    context_id: i64,
    depth: i64,
) -> Result<VarContext, ErrorCode> {
    let context = VarContext::from_id(context_id, depth).ok_or(ErrorCode::InvalidArguments)?;
    if let VarContext::Locals { depth } = context {
        if host.frame(depth).is_none() {
            return Err(ErrorCode::StackDepthInvalid);
        }
    }
    Ok(context)
}

pub(super) fn property_get(
    session: &mut Session,
    host: &mut dyn Host,
    args: &Args,
    response: &mut Node,
) -> HandlerResult {
    let name = args.get('n').ok_or(ErrorCode::InvalidArguments)?.to_string();
    let depth = args.get_int('d').unwrap_or(0);
    let context_id = args.get_int('c').unwrap_or(0);
    let context = resolve_context(host, context_id, depth)?;
    let limits = ExportLimits::of(session).with_max_data(args.get_int('m'));

    if context == VarContext::Constants {
        let value = host.constant(&name).ok_or(ErrorCode::PropertyNonExistent)?;
        let mut node = property_node(Some(&name), &value, &limits);
        node.attr("facet", "constant");
        response.add_child(node);
        return Ok(());
    }

    // The engine reads symbols on the client's behalf here; runtime notices
    // that pop up during the read are not for the wire.
    session.features.inhibit_notifications = true;
    let value = host.read_variable(&name, context);
    session.features.inhibit_notifications = false;

    let value = value.ok_or(ErrorCode::PropertyNonExistent)?;
    response.add_child(property_node(Some(&name), &value, &limits));
    Ok(())
}

pub(super) fn property_value(
    session: &mut Session,
    host: &mut dyn Host,
    args: &Args,
    response: &mut Node,
) -> HandlerResult {
    let name = args.get('n').ok_or(ErrorCode::InvalidArguments)?.to_string();
    let depth = args.get_int('d').unwrap_or(0);
    let context_id = args.get_int('c').unwrap_or(0);
    let context = resolve_context(host, context_id, depth)?;

    let limits = ExportLimits::of(session).with_max_data(args.get_int('m'));
    if limits.max_data < 0 {
        return Err(ErrorCode::InvalidArguments);
    }

    let value = host
        .read_variable(&name, context)
        .ok_or(ErrorCode::PropertyNonExistent)?;

    // Value only: the payload goes straight into the response element.
    response.attr("type", value.type_name());
    if let Some(text) = value.display_fragment() {
        response.attr("size", text.len().to_string());
        let truncated = clip_to_max_data(text, limits.max_data);
        response.set_text_base64(truncated.as_bytes());
    }
    Ok(())
}

pub(super) fn property_set(
    session: &mut Session,
    host: &mut dyn Host,
    args: &Args,
    response: &mut Node,
) -> HandlerResult {
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine as _;

    let name = args.get('n').ok_or(ErrorCode::InvalidArguments)?.to_string();
    let data = args.get('-').ok_or(ErrorCode::InvalidArguments)?;
    let depth = args.get_int('d').unwrap_or(0);
    let context_id = args.get_int('c').unwrap_or(0);
    let context = resolve_context(host, context_id, depth)?;

    let raw = BASE64.decode(data).map_err(|_| ErrorCode::InvalidArguments)?;
    let value_source = String::from_utf8_lossy(&raw).into_owned();

    let type_hint = match args.get('t') {
        Some(t @ ("bool" | "int" | "float" | "string")) => Some(t),
        _ => None,
    };

    session.features.inhibit_notifications = true;
    let written = host.write_variable(&name, context, &value_source, type_hint);
    session.features.inhibit_notifications = false;

    // A failed assignment is success="0", not a protocol error.
    response.attr("success", if written { "1" } else { "0" });
    Ok(())
}

pub(super) fn typemap_get(
    _session: &mut Session,
    _host: &mut dyn Host,
    _args: &Args,
    response: &mut Node,
) -> HandlerResult {
    response.attr("xmlns:xsi", "http://www.w3.org/2001/XMLSchema-instance");
    response.attr("xmlns:xsd", "http://www.w3.org/2001/XMLSchema");

    const TYPEMAP: &[(&str, &str, Option<&str>)] = &[
        ("bool", "bool", Some("xsd:boolean")),
        ("int", "int", Some("xsd:decimal")),
        ("float", "float", Some("xsd:double")),
        ("string", "string", Some("xsd:string")),
        ("null", "null", None),
        ("hash", "array", None),
        ("object", "object", None),
        ("resource", "resource", None),
    ];

    for (common, lang, schema) in TYPEMAP {
        let mut map = Node::new("map");
        map.attr("name", *lang);
        map.attr("type", *common);
        if let Some(schema) = schema {
            map.attr("xsi:type", *schema);
        }
        response.add_child(map);
    }
    Ok(())
}
