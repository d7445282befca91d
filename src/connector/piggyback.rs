// Piggyback connector: data other hosts delivered for this host.

use tracing::debug;

use crate::error::FetchErrorKind;
use crate::models::RawFetchResult;
use crate::piggyback::PiggybackSpool;

pub async fn fetch(spool: &PiggybackSpool, host: &str) -> RawFetchResult {
    match spool.read_for(host).await {
        Ok(Some(data)) => {
            debug!(host, sources = ?data.sources, "Read piggyback data");
            RawFetchResult::success(data.payload)
        }
        Ok(None) => RawFetchResult::failure(FetchErrorKind::NotFound, "no piggyback data"),
        // An I/O fault is not the same as "nothing delivered".
        Err(e) => RawFetchResult::failure(
            FetchErrorKind::ReadFailed,
            format!("piggyback data unreadable: {}", e),
        ),
    }
}
