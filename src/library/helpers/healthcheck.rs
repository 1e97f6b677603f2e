//! HTTP healthcheck related functions
//!
//! Functions that are used to check if a HTTP endpoint is reachable

use hyper::{Client, Uri};
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, trace};

/// Sends HTTP requests to the specified URL until either a 200 OK response is received
/// or the timeout is reached
pub async fn wait_for(url: &str, timeout_duration: Duration) -> Result<(), ()> {
    let client = Client::new();
    let url = url.parse::<Uri>().map_err(|_| ())?;

    let check_interval = Duration::from_millis(250);
    let request_timeout = Duration::from_millis(1000);
    let mut remaining_duration = timeout_duration;

    debug!("Awaiting 200 OK response from {}", url);

    loop {
        let request = client.get(url.clone());

        trace!("Sending health-check request");
        let response = timeout(request_timeout, request).await;

        if let Ok(Ok(res)) = response {
            if res.status() == 200 {
                return Ok(());
            }

            trace!("Received response with status != 200");
        } else {
            trace!("Unable to send request! {:?}", response);
        }

        if remaining_duration.as_secs() == 0 {
            debug!("Timeout while waiting for {}", url);
            return Err(());
        }

        sleep(check_interval).await;
        remaining_duration = remaining_duration.saturating_sub(check_interval);
    }
}
