use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Public struct `Project` used across Quorum components.
pub struct Project {
    pub name: String,
    /// Workspace path; the final segment doubles as the repository slug for
    /// issue-URL matching.
    pub path: String,
    /// Chat channel bound to this project, when one exists.
    #[serde(default)]
    pub channel_id: Option<String>,
}

impl Project {
    /// Final path segment, lowercased.
    pub fn repo_slug(&self) -> String {
        self.path
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or(self.path.as_str())
            .to_lowercase()
    }
}
