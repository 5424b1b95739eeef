//! Cache key registry: the deterministic mapping from (entity kind, owner)
//! to key strings, and the bust table tying every write to the set of
//! entries it invalidates.

use uuid::Uuid;

use super::Cache;
use crate::error::Result;

/// Every kind of cached query. The first seven are keyed by a user id, the
/// last two by a group id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKind {
    Groups,
    Requests,
    SentRequests,
    ViewedRequests,
    UnviewedRequests,
    RejectedRequests,
    UnrejectedRequests,
    Memberships,
    Members,
}

/// Build the cache key for one cached query. Total over `CacheKind`.
pub fn make_key(kind: CacheKind, owner: Uuid) -> String {
    match kind {
        CacheKind::Groups => format!("grp_g-{owner}"),
        CacheKind::Requests => format!("grp_r-{owner}"),
        CacheKind::SentRequests => format!("grp_sr-{owner}"),
        CacheKind::ViewedRequests => format!("grp_vr-{owner}"),
        CacheKind::UnviewedRequests => format!("grp_uvr-{owner}"),
        CacheKind::RejectedRequests => format!("grp_rr-{owner}"),
        CacheKind::UnrejectedRequests => format!("grp_urr-{owner}"),
        CacheKind::Memberships => format!("grp_ms-{owner}"),
        CacheKind::Members => format!("grp_mb-{owner}"),
    }
}

/// The entries that must be invalidated together when a write touches a
/// given kind. The request-list kinds are siblings over the same rows, so
/// one bust covers all five; the member list is derived from the
/// membership list and falls with it.
pub fn bust_set(kind: CacheKind) -> &'static [CacheKind] {
    match kind {
        CacheKind::Groups => &[CacheKind::Groups],
        CacheKind::Memberships | CacheKind::Members => {
            &[CacheKind::Memberships, CacheKind::Members]
        }
        CacheKind::Requests
        | CacheKind::ViewedRequests
        | CacheKind::UnviewedRequests
        | CacheKind::RejectedRequests
        | CacheKind::UnrejectedRequests => &[
            CacheKind::Requests,
            CacheKind::ViewedRequests,
            CacheKind::UnviewedRequests,
            CacheKind::RejectedRequests,
            CacheKind::UnrejectedRequests,
        ],
        CacheKind::SentRequests => &[CacheKind::SentRequests],
    }
}

/// Bust the cache for the given (kind, owner) pairs. The key set is
/// computed freshly from the tables above and deleted in one call, before
/// the mutating operation returns.
pub async fn cache_bust(cache: &dyn Cache, entries: &[(CacheKind, Uuid)]) -> Result<()> {
    let mut keys = Vec::new();
    for (kind, owner) in entries {
        for sibling in bust_set(*kind) {
            keys.push(make_key(*sibling, *owner));
        }
    }
    cache.delete_many(&keys).await
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_KINDS: [CacheKind; 9] = [
        CacheKind::Groups,
        CacheKind::Requests,
        CacheKind::SentRequests,
        CacheKind::ViewedRequests,
        CacheKind::UnviewedRequests,
        CacheKind::RejectedRequests,
        CacheKind::UnrejectedRequests,
        CacheKind::Memberships,
        CacheKind::Members,
    ];

    #[test]
    fn keys_are_distinct_per_kind() {
        let owner = Uuid::new_v4();
        let mut keys: Vec<String> = ALL_KINDS.iter().map(|k| make_key(*k, owner)).collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), ALL_KINDS.len());
    }

    #[test]
    fn key_uses_owner_id() {
        let owner = Uuid::new_v4();
        assert_eq!(make_key(CacheKind::Groups, owner), format!("grp_g-{owner}"));
        assert_eq!(
            make_key(CacheKind::UnviewedRequests, owner),
            format!("grp_uvr-{owner}")
        );
    }

    #[test]
    fn request_kinds_bust_the_whole_sibling_set() {
        let siblings = bust_set(CacheKind::Requests);
        assert_eq!(siblings.len(), 5);
        for kind in [
            CacheKind::ViewedRequests,
            CacheKind::UnviewedRequests,
            CacheKind::RejectedRequests,
            CacheKind::UnrejectedRequests,
        ] {
            assert_eq!(bust_set(kind), siblings);
        }
    }

    #[test]
    fn membership_bust_covers_the_member_projection() {
        assert_eq!(
            bust_set(CacheKind::Memberships),
            &[CacheKind::Memberships, CacheKind::Members]
        );
        assert_eq!(bust_set(CacheKind::Members), bust_set(CacheKind::Memberships));
    }

    #[test]
    fn every_kind_busts_itself() {
        for kind in ALL_KINDS {
            assert!(bust_set(kind).contains(&kind));
        }
    }
}
