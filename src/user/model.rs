use serde::{Deserialize, Serialize};

use super::{Id, Role};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id")]
    pub id: Id,
    pub name: String,
    pub role: Role,
}
