use crate::mi::Value;

/// One inferior thread as reported by `thread-info`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thread {
    pub id: u64,
    pub target_id: String,
    pub name: Option<String>,
}

impl Thread {
    pub fn from_value(value: &Value) -> Option<Self> {
        Some(Thread {
            id: value.u64_at("id")?,
            target_id: value.str_at("target-id").unwrap_or_default().to_string(),
            name: value.str_at("name").map(str::to_string),
        })
    }
}
