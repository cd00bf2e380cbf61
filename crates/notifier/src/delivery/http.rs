use reqwest::StatusCode;

use crate::error::DeliveryError;

/// 2xx is delivered; 5xx, 408 and 429 are worth retrying; anything else
/// means the endpoint will keep refusing.
pub(crate) fn classify_status(status: StatusCode) -> Result<(), DeliveryError> {
    if status.is_success() {
        return Ok(());
    }
    let reason = format!("HTTP {status}");
    if status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
    {
        Err(DeliveryError::Transient(reason))
    } else {
        Err(DeliveryError::Permanent(reason))
    }
}

/// Builder and redirect-policy errors come from the request itself and
/// will not improve on retry.
pub(crate) fn classify_error(err: &reqwest::Error) -> DeliveryError {
    if err.is_builder() || err.is_redirect() {
        DeliveryError::Permanent(err.to_string())
    } else {
        DeliveryError::Transient(err.to_string())
    }
}

pub(crate) async fn post_json<T: serde::Serialize + ?Sized>(
    client: &reqwest::Client,
    url: &str,
    body: &T,
) -> Result<(), DeliveryError> {
    let response = client
        .post(url)
        .json(body)
        .send()
        .await
        .map_err(|e| classify_error(&e))?;
    classify_status(response.status())
}
