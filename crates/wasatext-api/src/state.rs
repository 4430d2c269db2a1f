use std::sync::Arc;
use std::time::Duration;

use wasatext_db::Database;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    /// Budget for each storage call made on behalf of a request.
    pub request_timeout: Duration,
    /// Prefix for synthetic photo URLs.
    pub photo_base_url: String,
    pub max_upload_bytes: usize,
}
