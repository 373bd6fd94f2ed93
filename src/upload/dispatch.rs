//! Destination choice for one upload item.
//!
//! The policy is derived per item, before any network call, from the
//! caller's hint, the item size and whether a fallback credential exists.
//! During dispatch the only thing that moves an item from the primary to
//! the fallback is a primary error of class [`ErrorClass::SizeLimit`];
//! permission, validation and transient errors are surfaced as they are.

use super::{StoredObject, UploadItem, UploadTarget};
use crate::error::{BridgeError, ErrorClass, Provider};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Caller preference carried in the request body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestinationHint {
    /// Let the bridge decide. (default)
    #[default]
    Auto,
    /// Workspace only; never fall back.
    Primary,
    /// Drive only.
    Fallback,
}

/// How one item is routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadPolicy {
    PrimaryOnly,
    PrimaryWithFallback,
    FallbackOnly,
}

impl UploadPolicy {
    /// Pick the policy for an item of `len` bytes.
    pub fn derive(
        hint: DestinationHint,
        len: u64,
        primary_max_bytes: u64,
        fallback_available: bool,
    ) -> Self {
        match hint {
            DestinationHint::Fallback => UploadPolicy::FallbackOnly,
            DestinationHint::Primary => UploadPolicy::PrimaryOnly,
            DestinationHint::Auto if !fallback_available => UploadPolicy::PrimaryOnly,
            DestinationHint::Auto if len > primary_max_bytes => UploadPolicy::FallbackOnly,
            DestinationHint::Auto => UploadPolicy::PrimaryWithFallback,
        }
    }
}

/// Terminal state of one dispatch.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// Stored in the workspace.
    Primary(StoredObject),
    /// Stored in the drive; `primary_error` is set when the primary was
    /// tried first and refused the item.
    Fallback {
        object: StoredObject,
        primary_error: Option<BridgeError>,
    },
    /// Not stored anywhere.
    Failed(BridgeError),
}

enum Step {
    TryPrimary,
    TryFallback { after: Option<BridgeError> },
}

fn missing(provider: Provider) -> BridgeError {
    let hint = match provider {
        Provider::Drive => {
            "provide X-Drive-Authorization: Bearer <google_access_token>".to_string()
        }
        _ => "provide Authorization: Bearer <notion_token> or configure NOTION_TOKEN".to_string(),
    };
    BridgeError::MissingCredential { provider, hint }
}

/// Upload `item` according to `policy`.
///
/// Each destination is attempted at most once.
pub async fn dispatch(
    primary: Option<&dyn UploadTarget>,
    fallback: Option<&dyn UploadTarget>,
    policy: UploadPolicy,
    item: &UploadItem,
) -> DispatchOutcome {
    let mut step = match policy {
        UploadPolicy::FallbackOnly => Step::TryFallback { after: None },
        UploadPolicy::PrimaryOnly | UploadPolicy::PrimaryWithFallback => Step::TryPrimary,
    };

    loop {
        step = match step {
            Step::TryPrimary => {
                let Some(target) = primary else {
                    return DispatchOutcome::Failed(missing(Provider::Workspace));
                };
                match target.upload(item).await {
                    Ok(object) => return DispatchOutcome::Primary(object),
                    Err(e)
                        if policy == UploadPolicy::PrimaryWithFallback
                            && e.class() == ErrorClass::SizeLimit =>
                    {
                        info!("'{}' refused by workspace ({}); trying drive", item.name, e);
                        Step::TryFallback { after: Some(e) }
                    }
                    Err(e) => {
                        warn!("Upload of '{}' failed: {}", item.name, e);
                        return DispatchOutcome::Failed(e);
                    }
                }
            }
            Step::TryFallback { after } => {
                let Some(target) = fallback else {
                    // No drive target: surface the primary's error if there was one.
                    return DispatchOutcome::Failed(after.unwrap_or_else(|| missing(Provider::Drive)));
                };
                debug!("Uploading '{}' to drive", item.name);
                return match target.upload(item).await {
                    Ok(object) => DispatchOutcome::Fallback {
                        object,
                        primary_error: after,
                    },
                    Err(e) => {
                        warn!("Drive upload of '{}' failed: {}", item.name, e);
                        DispatchOutcome::Failed(e)
                    }
                };
            }
        };
    }
}
