pub mod routes;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// MODELS

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewQuery {
    #[serde(default)]
    pub hide_completed: bool,
}

#[derive(Debug, Serialize)]
pub struct MethodResponse {
    /// Id of the inserted task; `null` for the other methods.
    pub result: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct CountResponse {
    pub count: u64,
}
