//! Ownership checks shared by every handler that mutates a resource.

use crate::auth::guards::AuthenticatedPrincipal;
use crate::auth::principal::PrincipalId;
use crate::auth::{AuthError, AuthResult};

/// A resource that records the principal that owns it.
pub trait Owned {
    fn owner_id(&self) -> PrincipalId;
}

impl Owned for PrincipalId {
    fn owner_id(&self) -> PrincipalId {
        *self
    }
}

/// `Ok` iff the authenticated principal is the recorded owner.
pub fn require_owner(principal_id: PrincipalId, owner_id: PrincipalId) -> AuthResult<()> {
    if principal_id == owner_id {
        Ok(())
    } else {
        log::debug!(
            "ownership check failed: principal {} is not owner {}",
            principal_id,
            owner_id
        );
        Err(AuthError::Forbidden)
    }
}

impl AuthenticatedPrincipal {
    pub fn require_owner<R: Owned + ?Sized>(&self, resource: &R) -> AuthResult<()> {
        require_owner(self.id(), resource.owner_id())
    }

    /// Pre-filter for "list my own" queries. Returns the owner id to filter
    /// by, which is always the caller's.
    pub fn scope_to_self(&self, requested_owner: Option<PrincipalId>) -> AuthResult<PrincipalId> {
        match requested_owner {
            Some(owner) => require_owner(self.id(), owner).map(|()| owner),
            None => Ok(self.id()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::principal::Principal;
    use chrono::Utc;

    struct Playlist {
        owner: PrincipalId,
    }

    impl Owned for Playlist {
        fn owner_id(&self) -> PrincipalId {
            self.owner
        }
    }

    fn caller() -> AuthenticatedPrincipal {
        let now = Utc::now();
        AuthenticatedPrincipal(Principal {
            id: PrincipalId::new(),
            handle: "alice".into(),
            email: "alice@x.com".into(),
            display_name: "Alice".into(),
            created_at: now,
            updated_at: now,
        })
    }

    #[test]
    fn equal_ids_pass_and_others_are_forbidden() {
        let p = PrincipalId::new();
        assert!(require_owner(p, p).is_ok());
        for _ in 0..16 {
            let other = PrincipalId::new();
            assert!(matches!(require_owner(p, other), Err(AuthError::Forbidden)));
        }
    }

    #[test]
    fn compares_values_not_instances() {
        let p = PrincipalId::new();
        let copy: PrincipalId = p.to_string().parse().expect("parse id");
        assert!(require_owner(p, copy).is_ok());
    }

    #[test]
    fn guards_owned_resources() {
        let caller = caller();
        let mine = Playlist { owner: caller.id() };
        let theirs = Playlist {
            owner: PrincipalId::new(),
        };
        assert!(caller.require_owner(&mine).is_ok());
        assert!(matches!(
            caller.require_owner(&theirs),
            Err(AuthError::Forbidden)
        ));
    }

    #[test]
    fn scopes_listing_queries_to_the_caller() {
        let caller = caller();
        assert_eq!(caller.scope_to_self(None).expect("scoped"), caller.id());
        assert_eq!(
            caller.scope_to_self(Some(caller.id())).expect("scoped"),
            caller.id()
        );
        assert!(matches!(
            caller.scope_to_self(Some(PrincipalId::new())),
            Err(AuthError::Forbidden)
        ));
    }
}
