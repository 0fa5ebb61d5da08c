//! OAuth2 session setup for the Gmail API

use google_gmail1::{hyper_rustls, hyper_util, yup_oauth2, Gmail};
use std::path::Path;
use tracing::info;

use crate::client::GmailHub;
use crate::error::{LabelerError, Result};

/// Scopes needed to read messages, move them out of the inbox and manage labels
pub const REQUIRED_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/gmail.modify",
    "https://www.googleapis.com/auth/gmail.labels",
];

/// Build an authenticated Gmail hub
///
/// Uses the installed-app flow: the first call opens a browser for consent,
/// later calls reuse the token cached at `token_cache_path`.
pub async fn initialize_gmail_hub(
    credentials_path: &Path,
    token_cache_path: &Path,
) -> Result<GmailHub> {
    let secret = yup_oauth2::read_application_secret(credentials_path)
        .await
        .map_err(|e| {
            LabelerError::AuthError(format!(
                "Failed to read credentials from {}: {}",
                credentials_path.display(),
                e
            ))
        })?;

    let auth = yup_oauth2::InstalledFlowAuthenticator::builder(
        secret,
        yup_oauth2::InstalledFlowReturnMethod::HTTPRedirect,
    )
    .persist_tokens_to_disk(token_cache_path)
    .build()
    .await
    .map_err(|e| LabelerError::AuthError(format!("Failed to build authenticator: {}", e)))?;

    // Request every scope up front so the cached token covers all later calls
    auth.token(REQUIRED_SCOPES)
        .await
        .map_err(|e| LabelerError::AuthError(format!("Failed to obtain token: {}", e)))?;

    // HTTP/1 only; google-gmail1 is more reliable over it than over HTTP/2
    let client = hyper_util::client::legacy::Client::builder(hyper_util::rt::TokioExecutor::new())
        .build(
            hyper_rustls::HttpsConnectorBuilder::new()
                .with_native_roots()
                .map_err(|e| LabelerError::AuthError(format!("Failed to load TLS roots: {}", e)))?
                .https_or_http()
                .enable_http1()
                .build(),
        );

    Ok(Gmail::new(client, auth))
}

/// Delete the cached token so the next login asks for consent again
pub async fn clear_token_cache(token_cache_path: &Path) -> Result<bool> {
    match tokio::fs::remove_file(token_cache_path).await {
        Ok(()) => {
            info!("Removed cached token at {:?}", token_cache_path);
            Ok(true)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}
