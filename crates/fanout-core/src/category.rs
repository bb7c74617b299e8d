//! Operation categories
//!
//! Fixed table linking each enumeration method to the result field holding
//! its items and to the singular method used for follow-up calls. Lookups
//! for methods outside the table return the method itself.

use serde_json::{json, Value};

pub mod methods {
    pub const LIST_PROMPTS: &str = "prompts/list";
    pub const LIST_TOOLS: &str = "tools/list";
    pub const LIST_RESOURCES: &str = "resources/list";
    pub const LIST_RESOURCE_TEMPLATES: &str = "resources/templates/list";
    pub const GET_PROMPT: &str = "prompts/get";
    pub const CALL_TOOL: &str = "tools/call";
    pub const READ_RESOURCE: &str = "resources/read";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationCategory {
    /// Enumeration method, e.g. `tools/list`
    pub list_method: &'static str,
    /// Result field holding the items, e.g. `tools`
    pub result_field: &'static str,
    /// Singular method that follow-up calls use, e.g. `tools/call`
    pub follow_up_method: &'static str,
    /// Item field that identifies an item for routing
    pub id_field: &'static str,
    /// Item field that receives the `[backend]` origin tag
    pub label_field: &'static str,
}

pub const CATEGORIES: [OperationCategory; 4] = [
    OperationCategory {
        list_method: methods::LIST_PROMPTS,
        result_field: "prompts",
        follow_up_method: methods::GET_PROMPT,
        id_field: "name",
        label_field: "description",
    },
    OperationCategory {
        list_method: methods::LIST_TOOLS,
        result_field: "tools",
        follow_up_method: methods::CALL_TOOL,
        id_field: "name",
        label_field: "description",
    },
    OperationCategory {
        list_method: methods::LIST_RESOURCES,
        result_field: "resources",
        follow_up_method: methods::READ_RESOURCE,
        id_field: "uri",
        label_field: "name",
    },
    OperationCategory {
        list_method: methods::LIST_RESOURCE_TEMPLATES,
        result_field: "resourceTemplates",
        follow_up_method: methods::READ_RESOURCE,
        id_field: "uriTemplate",
        label_field: "name",
    },
];

pub fn lookup(list_method: &str) -> Option<&'static OperationCategory> {
    CATEGORIES.iter().find(|c| c.list_method == list_method)
}

/// `tools/list` → `tools`; unknown methods map to themselves
pub fn result_field(method: &str) -> &str {
    lookup(method).map_or(method, |c| c.result_field)
}

/// `tools/list` → `tools/call`; unknown methods map to themselves
pub fn follow_up_method(method: &str) -> &str {
    lookup(method).map_or(method, |c| c.follow_up_method)
}

/// Identifier of a follow-up call: `name`, else `uri`
pub fn call_identifier(params: &Value) -> Option<&str> {
    params
        .get("name")
        .and_then(Value::as_str)
        .or_else(|| params.get("uri").and_then(Value::as_str))
}

/// Identifier of an enumerated item
pub fn item_identifier<'a>(category: &OperationCategory, item: &'a Value) -> Option<&'a str> {
    item.get(category.id_field).and_then(Value::as_str)
}

/// Protocol-valid empty result for a follow-up method
pub fn empty_result(follow_up_method: &str) -> Value {
    match follow_up_method {
        methods::CALL_TOOL => json!({ "content": [] }),
        methods::GET_PROMPT => json!({ "messages": [] }),
        methods::READ_RESOURCE => json!({ "contents": [] }),
        _ => json!({}),
    }
}

/// Whether a concrete URI falls under a URI template (RFC 6570 style). Only
/// the literal text before the first expression is compared.
pub fn template_matches(template: &str, uri: &str) -> bool {
    let prefix = template.split('{').next().unwrap_or_default();
    !prefix.is_empty() && prefix != template && uri.starts_with(prefix)
}
