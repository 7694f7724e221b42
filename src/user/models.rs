use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub created: i64,
}

/// Fields accepted when creating or updating a profile. The id is only
/// honored on creation; when absent one is generated.
#[derive(Debug, Clone, Deserialize)]
pub struct UserProfileInput {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
}
