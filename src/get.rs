//! One-shot GET with pre-flight host validation.

use reqwest::Response;

use crate::client::GuardedClient;
use crate::error::Error;

/// Validate the host of `url`, then GET it through a fresh [`GuardedClient`].
///
/// The hostname is resolved and checked once up front. The request then
/// connects to that exact address while keeping the original Host header,
/// so virtual-hosted targets still work. Use a long-lived
/// [`GuardedClient`] instead when issuing many requests.
///
/// # Example
///
/// ```rust,no_run
/// # async fn example() -> Result<(), dial_jail::Error> {
/// let response = dial_jail::get("https://example.com/").await?;
/// println!("{}", response.status());
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// [`Error::InvalidUrl`], [`Error::BadHost`], [`Error::BadIpAddress`] or
/// [`Error::ResolutionFailed`] before anything is sent; transport errors
/// as for [`GuardedClient::execute`].
pub async fn get(url: &str) -> Result<Response, Error> {
    GuardedClient::new()?.get_pinned(url).await
}

/// Synchronous version of [`get`].
///
/// Works both inside and outside of a Tokio runtime. When called from
/// outside a runtime, it creates a temporary one.
pub fn get_sync(url: &str) -> Result<Response, Error> {
    if let Ok(handle) = tokio::runtime::Handle::try_current() {
        tokio::task::block_in_place(|| handle.block_on(get(url)))
    } else {
        let rt = tokio::runtime::Runtime::new().map_err(|e| Error::Http {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        rt.block_on(get(url))
    }
}
