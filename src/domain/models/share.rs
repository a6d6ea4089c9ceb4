//! Public share records for project templates.

use serde::{Deserialize, Serialize};

use super::object::{fields, Object, ResourceSpec};
use super::Kind;

pub type ThreadShare = Object<ThreadShareSpec>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ThreadShareSpec {
    #[serde(rename = "userID")]
    pub user_id: String,
    pub project_thread_name: String,
    pub template: bool,
    pub featured: bool,
    pub public: bool,
    /// Random, unguessable identifier used in share links.
    #[serde(rename = "publicID")]
    pub public_id: String,
}

impl ResourceSpec for ThreadShareSpec {
    const KIND: Kind = Kind::ThreadShare;
    type Status = ();

    fn index_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            (fields::PUBLIC_ID, self.public_id.clone()),
            (fields::TEMPLATE, self.template.to_string()),
            (fields::PROJECT_THREAD_NAME, self.project_thread_name.clone()),
        ]
    }
}
