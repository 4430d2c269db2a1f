use tracing::{error, warn};

use wasatext_db::{Database, Deadline};

use crate::error::ApiError;
use crate::state::AppState;

/// Run a storage call off the async runtime under the request deadline.
///
/// The deadline aborts statements inside SQLite; the outer timeout covers
/// time spent waiting for a connection. Either way the caller gets 503 and
/// the open transaction rolls back.
pub async fn run_db<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> wasatext_db::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let db = state.db.clone();
    let deadline = Deadline::after(state.request_timeout);
    let guard = deadline.clone();

    let task = tokio::task::spawn_blocking(move || db.with_deadline(&deadline, f));

    match tokio::time::timeout(state.request_timeout, task).await {
        Ok(Ok(result)) => Ok(result?),
        Ok(Err(e)) => {
            error!("spawn_blocking join error: {}", e);
            Err(ApiError::Internal("storage task failed".into()))
        }
        Err(_) => {
            guard.cancel();
            warn!("Storage call exceeded {:?}, cancelled", state.request_timeout);
            Err(ApiError::Timeout)
        }
    }
}
