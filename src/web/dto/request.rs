//! Request DTOs.

use serde::Deserialize;
use utoipa::IntoParams;

/// Query parameters for `GET /download`.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DownloadQuery {
    /// Access code returned by the upload.
    #[serde(default)]
    pub code: String,
}
