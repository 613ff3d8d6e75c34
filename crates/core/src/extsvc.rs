//! External-service kinds and URNs.
//!
//! An external service is a configured connection to a code host. Each
//! service is identified across the system by a URN of the form
//! `extsvc:<lowercase kind>:<id>`, which is also the key of a repository's
//! sources map.

use crate::error::CoreError;
use crate::types::DbId;

pub const KIND_GITHUB: &str = "GITHUB";
pub const KIND_GITLAB: &str = "GITLAB";
pub const KIND_BITBUCKET_SERVER: &str = "BITBUCKETSERVER";
pub const KIND_AWS_CODE_COMMIT: &str = "AWSCODECOMMIT";
pub const KIND_GITOLITE: &str = "GITOLITE";
pub const KIND_PHABRICATOR: &str = "PHABRICATOR";
pub const KIND_OTHER: &str = "OTHER";

/// Kind whose repositories are synced by a dedicated worker and never get
/// sync jobs from the enqueuer.
pub const KIND_EXCLUDED_FROM_SYNC: &str = KIND_PHABRICATOR;

const URN_PREFIX: &str = "extsvc";

/// Map a kind (`GITHUB`) to the service type stored on repos (`github`).
///
/// Unknown kinds are lowercased.
pub fn kind_to_service_type(kind: &str) -> String {
    match kind.to_ascii_uppercase().as_str() {
        KIND_BITBUCKET_SERVER => "bitbucketServer".to_string(),
        KIND_AWS_CODE_COMMIT => "awscodecommit".to_string(),
        _ => kind.to_ascii_lowercase(),
    }
}

/// Build the URN of an external service.
///
/// ```
/// use repoupdater_core::extsvc::urn;
///
/// assert_eq!(urn("GITHUB", 42), "extsvc:github:42");
/// ```
pub fn urn(kind: &str, id: DbId) -> String {
    format!("{URN_PREFIX}:{}:{id}", kind.to_ascii_lowercase())
}

/// Extract the external service ID from a URN.
pub fn parse_urn(urn: &str) -> Result<DbId, CoreError> {
    let mut parts = urn.splitn(3, ':');
    let (Some(prefix), Some(kind), Some(id)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(CoreError::InvalidUrn(urn.to_string()));
    };
    if prefix != URN_PREFIX || kind.is_empty() {
        return Err(CoreError::InvalidUrn(urn.to_string()));
    }
    id.parse::<DbId>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| CoreError::InvalidUrn(urn.to_string()))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn urn_lowercases_kind() {
        assert_eq!(urn(KIND_BITBUCKET_SERVER, 7), "extsvc:bitbucketserver:7");
    }

    #[test]
    fn parse_urn_roundtrip() {
        assert_eq!(parse_urn(&urn(KIND_GITLAB, 12)).unwrap(), 12);
    }

    #[test]
    fn parse_urn_rejects_garbage() {
        assert_matches!(parse_urn("github:12"), Err(CoreError::InvalidUrn(_)));
        assert_matches!(parse_urn("extsvc:github:abc"), Err(CoreError::InvalidUrn(_)));
        assert_matches!(parse_urn("extsvc::3"), Err(CoreError::InvalidUrn(_)));
        assert_matches!(parse_urn("extsvc:github:0"), Err(CoreError::InvalidUrn(_)));
        assert_matches!(parse_urn("other:github:3"), Err(CoreError::InvalidUrn(_)));
    }

    #[test]
    fn service_types() {
        assert_eq!(kind_to_service_type(KIND_GITHUB), "github");
        assert_eq!(kind_to_service_type(KIND_BITBUCKET_SERVER), "bitbucketServer");
        assert_eq!(kind_to_service_type(KIND_AWS_CODE_COMMIT), "awscodecommit");
        assert_eq!(kind_to_service_type("Custom"), "custom");
    }
}
