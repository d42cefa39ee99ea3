use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Attrs {
    #[serde(default)]
    pub ip: Option<String>,
}

/// Authenticated requester. `user_id` is what submission paths embed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Principal {
    pub user_id: u64,
    pub username: String,
    #[serde(default)]
    pub attrs: Attrs,
}

impl Principal {
    /// Compare against a path segment by canonical decimal form.
    pub fn owns_segment(&self, segment: &str) -> bool {
        self.user_id.to_string() == segment
    }
}
