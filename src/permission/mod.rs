use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::error::CoreError;
use uuid::Uuid;

/// Role a user principal carries. Only `Admin` can act without further
/// per-service checks; `User` is scoped to whatever downstream checks apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    User,
}

/// The kind of principal bound to a [`Principal`] value. Unlike the ambient
/// `context.Context` key/value carrier this replaces, every call site that
/// needs to know who is acting takes a `Principal` explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrincipalKind {
    System { component: String },
    User { user_id: Uuid, role: Role },
    Service { service_id: Uuid },
    Team { team_id: Uuid },
    None,
}

/// Shared, atomically-incremented authorization check counter. `max == 0`
/// means unlimited. Cloning a `Principal` clones the `Arc`, so every
/// principal derived from one authenticated request shares one counter.
#[derive(Debug, Clone)]
pub struct AuthCounter {
    count: Arc<AtomicU32>,
    max: u32,
}

impl AuthCounter {
    pub fn new(max: u32) -> Self {
        Self {
            count: Arc::new(AtomicU32::new(0)),
            max,
        }
    }

    pub fn unlimited() -> Self {
        Self::new(0)
    }

    /// Increments first, then checks the limit - mirrors the original
    /// increment-then-compare ordering so a counter at exactly `max` still
    /// succeeds on the call that brings it there.
    fn check(&self) -> Result<(), CoreError> {
        let count = self.count.fetch_add(1, Ordering::SeqCst) + 1;
        if self.max > 0 && count > self.max {
            return Err(CoreError::forbidden("authorization check limit exceeded"));
        }
        Ok(())
    }

    pub fn current(&self) -> u32 {
        self.count.load(Ordering::SeqCst)
    }
}

fn valid_system_component(name: &str) -> bool {
    if let Some(inner) = name.strip_prefix("Sudo[").and_then(|s| s.strip_suffix(']')) {
        !inner.is_empty() && inner.chars().all(|c| c.is_ascii_alphanumeric())
    } else {
        !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric())
    }
}

/// Explicit, passed-by-value replacement for GoAlert's ambient authorization
/// context. Carries the principal kind plus a shared [`AuthCounter`].
#[derive(Debug, Clone)]
pub struct Principal {
    kind: PrincipalKind,
    counter: AuthCounter,
}

impl Principal {
    pub fn system(component: impl Into<String>) -> Result<Self, CoreError> {
        let component = component.into();
        if !valid_system_component(&component) {
            return Err(CoreError::validation(
                "component",
                "system component name must be alphanumeric or Sudo[alphanumeric]",
            ));
        }
        Ok(Self {
            kind: PrincipalKind::System { component },
            counter: AuthCounter::unlimited(),
        })
    }

    pub fn user(user_id: Uuid, role: Role) -> Self {
        Self {
            kind: PrincipalKind::User { user_id, role },
            counter: AuthCounter::unlimited(),
        }
    }

    pub fn service(service_id: Uuid) -> Self {
        Self {
            kind: PrincipalKind::Service { service_id },
            counter: AuthCounter::unlimited(),
        }
    }

    pub fn team(team_id: Uuid) -> Self {
        Self {
            kind: PrincipalKind::Team { team_id },
            counter: AuthCounter::unlimited(),
        }
    }

    pub fn without_auth() -> Self {
        Self {
            kind: PrincipalKind::None,
            counter: AuthCounter::unlimited(),
        }
    }

    pub fn kind(&self) -> &PrincipalKind {
        &self.kind
    }

    pub fn user_id(&self) -> Option<Uuid> {
        match &self.kind {
            PrincipalKind::User { user_id, .. } => Some(*user_id),
            _ => None,
        }
    }

    pub fn service_id(&self) -> Option<Uuid> {
        match &self.kind {
            PrincipalKind::Service { service_id } => Some(*service_id),
            _ => None,
        }
    }

    /// Replaces the principal with a `System("Sudo[<outer>]")` one for the
    /// duration of `f`, mirroring `SudoContext`'s auto-revoke-on-return.
    pub async fn with_sudo<F, Fut, T>(&self, f: F) -> Result<T, CoreError>
    where
        F: FnOnce(Principal) -> Fut,
        Fut: std::future::Future<Output = T>,
    {
        let outer_name = match &self.kind {
            PrincipalKind::System { component } => component.clone(),
            PrincipalKind::User { user_id, .. } => format!("User{user_id}"),
            PrincipalKind::Service { service_id } => format!("Service{service_id}"),
            PrincipalKind::Team { team_id } => format!("Team{team_id}"),
            PrincipalKind::None => "None".to_string(),
        };
        let sudo = Self::system(format!("Sudo[{outer_name}]"))?;
        Ok(f(sudo).await)
    }

    /// Clones only the authorization-relevant fields, for moving into a
    /// spawned task that must outlive the originating request.
    pub fn detached(&self) -> Self {
        self.clone()
    }

    /// Fails with `Forbidden` unless the principal matches one of `kinds`;
    /// on success (including the failing branch, per the original) the
    /// shared counter is incremented.
    pub fn limit_check_any(&self, kinds: &[PrincipalMatch]) -> Result<(), CoreError> {
        self.counter.check()?;
        if kinds.iter().any(|k| k.matches(&self.kind)) {
            Ok(())
        } else {
            Err(CoreError::forbidden(
                "principal does not match any allowed kind",
            ))
        }
    }

    pub fn check_count(&self) -> u32 {
        self.counter.current()
    }
}

/// A principal-kind selector, as used by `limit_check_any`.
#[derive(Debug, Clone)]
pub enum PrincipalMatch {
    System,
    User,
    Service,
    Team,
    ExactService(Uuid),
}

impl PrincipalMatch {
    fn matches(&self, kind: &PrincipalKind) -> bool {
        match (self, kind) {
            (PrincipalMatch::System, PrincipalKind::System { .. }) => true,
            (PrincipalMatch::User, PrincipalKind::User { .. }) => true,
            (PrincipalMatch::Service, PrincipalKind::Service { .. }) => true,
            (PrincipalMatch::Team, PrincipalKind::Team { .. }) => true,
            (PrincipalMatch::ExactService(id), PrincipalKind::Service { service_id }) => {
                id == service_id
            }
            _ => false,
        }
    }
}

/// Matches a context bound to exactly the given service.
pub fn match_service(service_id: Uuid) -> PrincipalMatch {
    PrincipalMatch::ExactService(service_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_requires_alphanumeric_component() {
        assert!(Principal::system("Engine").is_ok());
        assert!(Principal::system("Sudo[Engine]").is_ok());
        assert!(Principal::system("bad name").is_err());
        assert!(Principal::system("Sudo[bad name]").is_err());
    }

    #[test]
    fn limit_check_any_increments_counter() {
        let p = Principal::system("Engine").unwrap();
        assert_eq!(p.check_count(), 0);
        p.limit_check_any(&[PrincipalMatch::System]).unwrap();
        assert_eq!(p.check_count(), 1);
        p.limit_check_any(&[PrincipalMatch::System]).unwrap();
        assert_eq!(p.check_count(), 2);
    }

    #[test]
    fn limit_check_any_fails_on_mismatch() {
        let p = Principal::system("Engine").unwrap();
        assert!(p.limit_check_any(&[PrincipalMatch::User]).is_err());
    }

    #[test]
    fn without_auth_always_forbidden() {
        let p = Principal::without_auth();
        assert!(p
            .limit_check_any(&[
                PrincipalMatch::System,
                PrincipalMatch::User,
                PrincipalMatch::Service,
                PrincipalMatch::Team
            ])
            .is_err());
    }

    #[test]
    fn counter_enforces_max() {
        let p = Principal {
            kind: PrincipalKind::System {
                component: "Engine".to_string(),
            },
            counter: AuthCounter::new(1),
        };
        p.limit_check_any(&[PrincipalMatch::System]).unwrap();
        assert!(p.limit_check_any(&[PrincipalMatch::System]).is_err());
    }

    #[test]
    fn detached_shares_counter() {
        let p = Principal::system("Engine").unwrap();
        let d = p.detached();
        p.limit_check_any(&[PrincipalMatch::System]).unwrap();
        assert_eq!(d.check_count(), 1);
    }

    #[tokio::test]
    async fn sudo_wraps_component_name() {
        let p = Principal::system("Engine").unwrap();
        let inner_kind = p
            .with_sudo(|sudo| async move { sudo.kind().clone() })
            .await
            .unwrap();
        match inner_kind {
            PrincipalKind::System { component } => assert_eq!(component, "Sudo[Engine]"),
            other => panic!("expected system principal, got {other:?}"),
        }
    }

    #[test]
    fn match_service_matches_exact_id_only() {
        let id = Uuid::new_v4();
        let other = Uuid::new_v4();
        let p = Principal::service(id);
        p.limit_check_any(&[match_service(id)]).unwrap();
        assert!(p.limit_check_any(&[match_service(other)]).is_err());
    }
}
