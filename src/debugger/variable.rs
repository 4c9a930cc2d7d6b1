//! Variable views surfaced to the UI: simple stack variables (filtered and
//! renamed through the source map) and gdb varobj handles for watch
//! expressions with lazily expanded children.

use crate::mi::Value;

/// One local variable of a stack frame, under its COBOL name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackVariable {
    pub name: String,
    pub value_str: String,
    pub r#type: Option<String>,
    /// The untranslated MI tuple, for UIs that render more than the value.
    pub raw: Value,
}

/// gdb's server-side handle for a live expression (`var-create` result or
/// one element of `var-list-children`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariableObject {
    pub name: String,
    pub exp: String,
    pub numchild: u64,
    pub r#type: String,
    pub value: String,
    pub thread_id: Option<u64>,
    pub frozen: bool,
    pub dynamic: bool,
    pub displayhint: Option<String>,
    pub has_more: bool,
    /// UI-side reference id, assigned by the host; zero until then.
    pub id: u64,
}

impl VariableObject {
    pub fn from_value(value: &Value, fallback_exp: &str) -> Self {
        VariableObject {
            name: value.str_at("name").unwrap_or_default().to_string(),
            exp: value
                .str_at("exp")
                .unwrap_or(fallback_exp)
                .to_string(),
            numchild: value.u64_at("numchild").unwrap_or(0),
            r#type: value.str_at("type").unwrap_or_default().to_string(),
            value: value.str_at("value").unwrap_or_default().to_string(),
            thread_id: value.u64_at("thread-id"),
            frozen: value.u64_at("frozen").unwrap_or(0) != 0,
            dynamic: value.u64_at("dynamic").unwrap_or(0) != 0,
            displayhint: value.str_at("displayhint").map(str::to_string),
            has_more: value.u64_at("has_more").unwrap_or(0) != 0,
            id: 0,
        }
    }

    /// Whether the UI should offer expansion instead of a scalar value.
    pub fn is_compound(&self) -> bool {
        self.numchild > 0
            || self.value == "{...}"
            || (self.dynamic && matches!(self.displayhint.as_deref(), Some("array" | "map")))
    }

    /// Fold one element of a `var-update` changelist into this object.
    pub fn apply_changes(&mut self, change: &Value) {
        if let Some(value) = change.str_at("value") {
            self.value = value.to_string();
        }
        if let Some(type_changed) = change.str_at("type_changed") {
            if type_changed == "true" {
                if let Some(new_type) = change.str_at("new_type") {
                    self.r#type = new_type.to_string();
                }
            }
        }
        if let Some(dynamic) = change.u64_at("dynamic") {
            self.dynamic = dynamic != 0;
        }
        if let Some(displayhint) = change.str_at("displayhint") {
            self.displayhint = Some(displayhint.to_string());
        }
        if let Some(has_more) = change.u64_at("has_more") {
            self.has_more = has_more != 0;
        }
        if let Some(numchild) = change.u64_at("new_num_children") {
            self.numchild = numchild;
        }
    }
}
