//! Utility helpers shared by the session and synchronizer loops.

use tokio::time::Instant;

/// Sleep until `deadline`, or forever when there is none. Lets a
/// `tokio::select!` branch stay in place while its timer is disarmed.
pub(crate) async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending::<()>().await,
    }
}
