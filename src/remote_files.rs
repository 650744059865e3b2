use reqwest::header::{CONTENT_LENGTH, USER_AGENT};
use tracing::warn;
use url::Url;

const PROBE_USER_AGENT: &str = "podcast-service/0.1";

/// HEAD the uploaded audio file and report its size in bytes. Probe
/// failures are logged and yield `None`; the episode save goes ahead
/// without a length.
pub async fn content_length(client: &reqwest::Client, url: &Url) -> Option<u64> {
    let response = match client
        .head(url.clone())
        .header(USER_AGENT, PROBE_USER_AGENT)
        .send()
        .await
    {
        Ok(response) => response,
        Err(err) => {
            warn!("failed to probe {url}: {err}");
            return None;
        }
    };
    if !response.status().is_success() {
        warn!("failed to probe {url}: status {}", response.status());
        return None;
    }
    response
        .headers()
        .get(CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}
