use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use gatekeeper_db::models::approval::{ApprovedIdentity, PendingRequest};
use gatekeeper_db::ApprovalStore;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{info, warn};

/// Registers an approved requester with the VPN panel.
#[async_trait]
pub trait ClientRegistrar: Send + Sync {
    /// `false` on any failure; the caller decides whether to retry.
    async fn register_client(&self, requester_id: i64, display_name: &str) -> bool;
}

/// Delivers new-request notices to administrators.
#[async_trait]
pub trait AdminNotifier: Send + Sync {
    async fn notify_new_request(&self, admin_id: i64, request: &PendingRequest) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    AlreadyApproved,
    AlreadyPending,
    Created,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApproveOutcome {
    Unauthorized,
    NotFound,
    /// The request stays pending and can be approved again.
    RegistrationFailed(PendingRequest),
    Approved(ApprovedIdentity),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectOutcome {
    Unauthorized,
    NotFound,
    Rejected(PendingRequest),
}

/// Request → decision → panel registration workflow.
///
/// Every read-modify-write of the collections runs under the `ledger` lock,
/// which is never held across panel calls. Decisions on one requester are
/// serialized by a per-requester lock that does span registration, so the
/// same id is never registered twice. Separate processes sharing the same
/// files still race with last-writer-wins.
#[derive(Clone)]
pub struct ApprovalService {
    store: Arc<dyn ApprovalStore>,
    registrar: Arc<dyn ClientRegistrar>,
    notifier: Arc<dyn AdminNotifier>,
    ledger: Arc<Mutex<()>>,
    decisions: Arc<Mutex<HashMap<i64, Arc<Mutex<()>>>>>,
}

impl ApprovalService {
    pub fn new(
        store: Arc<dyn ApprovalStore>,
        registrar: Arc<dyn ClientRegistrar>,
        notifier: Arc<dyn AdminNotifier>,
    ) -> Self {
        Self {
            store,
            registrar,
            notifier,
            ledger: Arc::new(Mutex::new(())),
            decisions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub async fn submit_request(&self, requester_id: i64, display_name: &str) -> Result<SubmitOutcome> {
        let (request, admins) = {
            let _guard = self.ledger.lock().await;

            if self.find_approved(requester_id).await?.is_some() {
                return Ok(SubmitOutcome::AlreadyApproved);
            }

            let mut pending = self.store.load_pending().await?;
            if pending.iter().any(|r| r.requester_id == requester_id) {
                return Ok(SubmitOutcome::AlreadyPending);
            }

            // Nothing is saved unless the request can be routed to admins.
            let admins = self.administrators().await?;

            let request = PendingRequest::new(requester_id, display_name);
            pending.push(request.clone());
            self.store.save_pending(&pending).await?;
            (request, admins)
        };
        info!("Saved request for user with id={}", requester_id);

        for admin_id in &admins {
            if let Err(e) = self.notifier.notify_new_request(*admin_id, &request).await {
                warn!("Failed to notify admin with id={}: {}", admin_id, e);
            }
        }
        info!("Approval request for id={} sent to {} admins", requester_id, admins.len());

        Ok(SubmitOutcome::Created)
    }

    pub async fn approve(&self, admin_id: i64, requester_id: i64) -> Result<ApproveOutcome> {
        if !self.is_admin(admin_id).await? {
            warn!("Non-admin {} tried to approve {}", admin_id, requester_id);
            return Ok(ApproveOutcome::Unauthorized);
        }

        let decision = self.lock_decision(requester_id).await;
        let outcome = self.approve_pending(admin_id, requester_id).await;
        drop(decision);
        self.release_decision(requester_id).await;
        outcome
    }

    async fn approve_pending(&self, admin_id: i64, requester_id: i64) -> Result<ApproveOutcome> {
        let request = {
            let _guard = self.ledger.lock().await;
            let pending = self.store.load_pending().await?;
            match pending.into_iter().find(|r| r.requester_id == requester_id) {
                Some(request) => request,
                None => return Ok(ApproveOutcome::NotFound),
            }
        };

        if !self
            .registrar
            .register_client(requester_id, &request.display_name)
            .await
        {
            return Ok(ApproveOutcome::RegistrationFailed(request));
        }

        let _guard = self.ledger.lock().await;

        // Save approved before trimming pending.
        let identity = ApprovedIdentity::promote(request, admin_id);
        let mut approved = self.store.load_approved().await?;
        if !approved.iter().any(|a| a.requester_id == requester_id) {
            approved.push(identity.clone());
            self.store.save_approved(&approved).await?;
        }

        let mut pending = self.store.load_pending().await?;
        pending.retain(|r| r.requester_id != requester_id);
        self.store.save_pending(&pending).await?;

        info!("Approved user {} by admin {}", requester_id, admin_id);
        Ok(ApproveOutcome::Approved(identity))
    }

    pub async fn reject(&self, admin_id: i64, requester_id: i64) -> Result<RejectOutcome> {
        if !self.is_admin(admin_id).await? {
            warn!("Non-admin {} tried to reject {}", admin_id, requester_id);
            return Ok(RejectOutcome::Unauthorized);
        }

        let decision = self.lock_decision(requester_id).await;
        let outcome = self.reject_pending(admin_id, requester_id).await;
        drop(decision);
        self.release_decision(requester_id).await;
        outcome
    }

    async fn reject_pending(&self, admin_id: i64, requester_id: i64) -> Result<RejectOutcome> {
        let _guard = self.ledger.lock().await;

        let mut pending = self.store.load_pending().await?;
        let Some(position) = pending.iter().position(|r| r.requester_id == requester_id) else {
            return Ok(RejectOutcome::NotFound);
        };
        let request = pending.remove(position);
        self.store.save_pending(&pending).await?;

        info!("Rejected user {} by admin {}", requester_id, admin_id);
        Ok(RejectOutcome::Rejected(request))
    }

    async fn lock_decision(&self, requester_id: i64) -> OwnedMutexGuard<()> {
        let lock = self
            .decisions
            .lock()
            .await
            .entry(requester_id)
            .or_default()
            .clone();
        lock.lock_owned().await
    }

    // Drops the requester's lock once nobody else holds or awaits it.
    async fn release_decision(&self, requester_id: i64) {
        let mut decisions = self.decisions.lock().await;
        if decisions
            .get(&requester_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            decisions.remove(&requester_id);
        }
    }

    pub async fn is_admin(&self, user_id: i64) -> Result<bool> {
        Ok(self.administrators().await?.contains(&user_id))
    }

    pub async fn administrators(&self) -> Result<Vec<i64>> {
        Ok(self
            .store
            .load_admins()
            .await?
            .into_iter()
            .map(|a| a.user_id)
            .collect())
    }

    pub async fn is_approved(&self, requester_id: i64) -> Result<bool> {
        Ok(self.find_approved(requester_id).await?.is_some())
    }

    pub async fn find_approved(&self, requester_id: i64) -> Result<Option<ApprovedIdentity>> {
        Ok(self
            .store
            .load_approved()
            .await?
            .into_iter()
            .find(|a| a.requester_id == requester_id))
    }

    /// Pending requests and approved identities, for the admin dashboard.
    pub async fn overview(&self) -> Result<(Vec<PendingRequest>, Vec<ApprovedIdentity>)> {
        Ok((self.store.load_pending().await?, self.store.load_approved().await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatekeeper_db::MemoryStore;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex as StdMutex;

    const ADMIN: i64 = 1;
    const OTHER_ADMIN: i64 = 2;
    const REQUESTER: i64 = 42;

    #[derive(Default)]
    struct FakeRegistrar {
        fail: AtomicBool,
        calls: StdMutex<Vec<(i64, String)>>,
    }

    #[async_trait]
    impl ClientRegistrar for FakeRegistrar {
        async fn register_client(&self, requester_id: i64, display_name: &str) -> bool {
            self.calls
                .lock()
                .unwrap()
                .push((requester_id, display_name.to_string()));
            !self.fail.load(Ordering::SeqCst)
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        unreachable_admin: Option<i64>,
        sent: StdMutex<Vec<(i64, i64)>>,
    }

    #[async_trait]
    impl AdminNotifier for RecordingNotifier {
        async fn notify_new_request(&self, admin_id: i64, request: &PendingRequest) -> Result<()> {
            if self.unreachable_admin == Some(admin_id) {
                anyhow::bail!("chat not found");
            }
            self.sent.lock().unwrap().push((admin_id, request.requester_id));
            Ok(())
        }
    }

    struct Fixture {
        store: MemoryStore,
        registrar: Arc<FakeRegistrar>,
        notifier: Arc<RecordingNotifier>,
        service: ApprovalService,
    }

    fn fixture_with(notifier: RecordingNotifier) -> Fixture {
        let store = MemoryStore::with_admins([ADMIN, OTHER_ADMIN]);
        let registrar = Arc::new(FakeRegistrar::default());
        let notifier = Arc::new(notifier);
        let service = ApprovalService::new(
            Arc::new(store.clone()),
            registrar.clone(),
            notifier.clone(),
        );
        Fixture {
            store,
            registrar,
            notifier,
            service,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(RecordingNotifier::default())
    }

    #[tokio::test]
    async fn submit_is_idempotent_while_pending() {
        let f = fixture();

        let first = f.service.submit_request(REQUESTER, "alice").await.unwrap();
        let second = f.service.submit_request(REQUESTER, "alice").await.unwrap();

        assert_eq!(first, SubmitOutcome::Created);
        assert_eq!(second, SubmitOutcome::AlreadyPending);
        let pending = f.store.load_pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].requester_id, REQUESTER);
    }

    #[tokio::test]
    async fn submit_notifies_every_admin() {
        let f = fixture();
        f.service.submit_request(REQUESTER, "alice").await.unwrap();

        let sent = f.notifier.sent.lock().unwrap().clone();
        assert_eq!(sent, vec![(ADMIN, REQUESTER), (OTHER_ADMIN, REQUESTER)]);
    }

    #[tokio::test]
    async fn unreachable_admin_does_not_block_others() {
        let f = fixture_with(RecordingNotifier {
            unreachable_admin: Some(ADMIN),
            ..RecordingNotifier::default()
        });

        let outcome = f.service.submit_request(REQUESTER, "alice").await.unwrap();

        assert_eq!(outcome, SubmitOutcome::Created);
        assert_eq!(*f.notifier.sent.lock().unwrap(), vec![(OTHER_ADMIN, REQUESTER)]);
    }

    #[tokio::test]
    async fn approved_requester_submit_changes_nothing() {
        let f = fixture();
        f.store
            .save_approved(&[ApprovedIdentity::promote(PendingRequest::new(REQUESTER, "alice"), ADMIN)])
            .await
            .unwrap();
        let approved_before = f.store.load_approved().await.unwrap();

        let outcome = f.service.submit_request(REQUESTER, "alice").await.unwrap();

        assert_eq!(outcome, SubmitOutcome::AlreadyApproved);
        assert!(f.store.load_pending().await.unwrap().is_empty());
        assert_eq!(f.store.load_approved().await.unwrap(), approved_before);
        assert!(f.notifier.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn approve_twice_yields_approved_then_not_found() {
        let f = fixture();
        f.service.submit_request(REQUESTER, "alice").await.unwrap();

        let first = f.service.approve(ADMIN, REQUESTER).await.unwrap();
        let second = f.service.approve(ADMIN, REQUESTER).await.unwrap();

        assert!(matches!(first, ApproveOutcome::Approved(ref a) if a.display_name == "alice"));
        assert_eq!(second, ApproveOutcome::NotFound);
        assert_eq!(f.store.load_approved().await.unwrap().len(), 1);
        assert!(f.store.load_pending().await.unwrap().is_empty());
        assert_eq!(
            *f.registrar.calls.lock().unwrap(),
            vec![(REQUESTER, "alice".to_string())]
        );
        assert!(f.service.is_approved(REQUESTER).await.unwrap());
    }

    #[tokio::test]
    async fn reject_after_approve_is_not_found() {
        let f = fixture();
        f.service.submit_request(REQUESTER, "alice").await.unwrap();

        f.service.approve(ADMIN, REQUESTER).await.unwrap();
        let outcome = f.service.reject(OTHER_ADMIN, REQUESTER).await.unwrap();

        assert_eq!(outcome, RejectOutcome::NotFound);
        assert!(f.service.is_approved(REQUESTER).await.unwrap());
    }

    #[tokio::test]
    async fn approve_after_reject_is_not_found_and_registers_nothing() {
        let f = fixture();
        f.service.submit_request(REQUESTER, "alice").await.unwrap();

        let rejected = f.service.reject(ADMIN, REQUESTER).await.unwrap();
        let approved = f.service.approve(OTHER_ADMIN, REQUESTER).await.unwrap();

        assert!(matches!(rejected, RejectOutcome::Rejected(ref r) if r.requester_id == REQUESTER));
        assert_eq!(approved, ApproveOutcome::NotFound);
        assert!(f.registrar.calls.lock().unwrap().is_empty());
        assert!(f.store.load_approved().await.unwrap().is_empty());
        assert!(f.store.load_pending().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn non_admin_decisions_change_nothing() {
        let f = fixture();
        f.service.submit_request(REQUESTER, "alice").await.unwrap();

        assert_eq!(
            f.service.approve(REQUESTER, REQUESTER).await.unwrap(),
            ApproveOutcome::Unauthorized
        );
        assert_eq!(
            f.service.reject(999, REQUESTER).await.unwrap(),
            RejectOutcome::Unauthorized
        );
        assert_eq!(f.store.load_pending().await.unwrap().len(), 1);
        assert!(f.registrar.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_registration_keeps_request_for_retry() {
        let f = fixture();
        f.service.submit_request(REQUESTER, "alice").await.unwrap();
        f.registrar.fail.store(true, Ordering::SeqCst);

        let outcome = f.service.approve(ADMIN, REQUESTER).await.unwrap();
        assert!(matches!(outcome, ApproveOutcome::RegistrationFailed(_)));
        assert_eq!(f.store.load_pending().await.unwrap().len(), 1);
        assert!(f.store.load_approved().await.unwrap().is_empty());

        f.registrar.fail.store(false, Ordering::SeqCst);
        let retry = f.service.approve(ADMIN, REQUESTER).await.unwrap();
        assert!(matches!(retry, ApproveOutcome::Approved(_)));
    }

    #[tokio::test]
    async fn concurrent_decisions_on_same_request_have_one_winner() {
        let f = fixture();
        f.service.submit_request(REQUESTER, "alice").await.unwrap();

        let (approved, rejected) = tokio::join!(
            f.service.approve(ADMIN, REQUESTER),
            f.service.reject(OTHER_ADMIN, REQUESTER)
        );
        let approved = approved.unwrap();
        let rejected = rejected.unwrap();

        let approve_won = matches!(approved, ApproveOutcome::Approved(_));
        let reject_won = matches!(rejected, RejectOutcome::Rejected(_));
        assert!(approve_won ^ reject_won);
        assert!(f.store.load_pending().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn overview_lists_both_collections() {
        let f = fixture();
        f.service.submit_request(REQUESTER, "alice").await.unwrap();
        f.service.submit_request(43, "bob").await.unwrap();
        f.service.approve(ADMIN, 43).await.unwrap();

        let (pending, approved) = f.service.overview().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].requester_id, REQUESTER);
        assert_eq!(approved.len(), 1);
        assert_eq!(approved[0].requester_id, 43);
    }

    /// Holds registration open until the test releases it.
    #[derive(Default)]
    struct GatedRegistrar {
        entered: tokio::sync::Notify,
        release: tokio::sync::Notify,
        calls: StdMutex<Vec<i64>>,
    }

    #[async_trait]
    impl ClientRegistrar for GatedRegistrar {
        async fn register_client(&self, requester_id: i64, _display_name: &str) -> bool {
            self.calls.lock().unwrap().push(requester_id);
            self.entered.notify_one();
            self.release.notified().await;
            true
        }
    }

    fn gated_service(store: &MemoryStore, registrar: &Arc<GatedRegistrar>) -> ApprovalService {
        ApprovalService::new(
            Arc::new(store.clone()),
            registrar.clone(),
            Arc::new(RecordingNotifier::default()),
        )
    }

    #[tokio::test]
    async fn registration_in_flight_does_not_block_other_requesters() {
        let store = MemoryStore::with_admins([ADMIN]);
        let registrar = Arc::new(GatedRegistrar::default());
        let service = gated_service(&store, &registrar);
        service.submit_request(REQUESTER, "alice").await.unwrap();
        service.submit_request(43, "carol").await.unwrap();

        let approving = tokio::spawn({
            let service = service.clone();
            async move { service.approve(ADMIN, REQUESTER).await }
        });
        registrar.entered.notified().await;

        let limit = std::time::Duration::from_secs(1);
        let submitted = tokio::time::timeout(limit, service.submit_request(77, "bob"))
            .await
            .expect("submit waited on registration")
            .unwrap();
        let rejected = tokio::time::timeout(limit, service.reject(ADMIN, 43))
            .await
            .expect("reject waited on registration")
            .unwrap();
        assert_eq!(submitted, SubmitOutcome::Created);
        assert!(matches!(rejected, RejectOutcome::Rejected(_)));

        registrar.release.notify_one();
        let approved = approving.await.unwrap().unwrap();
        assert!(matches!(approved, ApproveOutcome::Approved(_)));

        let pending = store.load_pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].requester_id, 77);
    }

    #[tokio::test]
    async fn decision_during_registration_waits_and_sees_not_found() {
        let store = MemoryStore::with_admins([ADMIN, OTHER_ADMIN]);
        let registrar = Arc::new(GatedRegistrar::default());
        let service = gated_service(&store, &registrar);
        service.submit_request(REQUESTER, "alice").await.unwrap();

        let approving = tokio::spawn({
            let service = service.clone();
            async move { service.approve(ADMIN, REQUESTER).await }
        });
        registrar.entered.notified().await;

        let second_approve = tokio::spawn({
            let service = service.clone();
            async move { service.approve(OTHER_ADMIN, REQUESTER).await }
        });
        let rejecting = tokio::spawn({
            let service = service.clone();
            async move { service.reject(OTHER_ADMIN, REQUESTER).await }
        });
        tokio::task::yield_now().await;
        registrar.release.notify_one();

        assert!(matches!(approving.await.unwrap().unwrap(), ApproveOutcome::Approved(_)));
        assert_eq!(second_approve.await.unwrap().unwrap(), ApproveOutcome::NotFound);
        assert_eq!(rejecting.await.unwrap().unwrap(), RejectOutcome::NotFound);
        assert_eq!(*registrar.calls.lock().unwrap(), vec![REQUESTER]);
        assert_eq!(store.load_approved().await.unwrap().len(), 1);
    }

    /// Delegates to a `MemoryStore` but cannot read the admin list.
    struct BrokenAdminsStore(MemoryStore);

    #[async_trait]
    impl ApprovalStore for BrokenAdminsStore {
        async fn load_pending(&self) -> Result<Vec<PendingRequest>> {
            self.0.load_pending().await
        }
        async fn save_pending(&self, requests: &[PendingRequest]) -> Result<()> {
            self.0.save_pending(requests).await
        }
        async fn load_approved(&self) -> Result<Vec<ApprovedIdentity>> {
            self.0.load_approved().await
        }
        async fn save_approved(&self, users: &[ApprovedIdentity]) -> Result<()> {
            self.0.save_approved(users).await
        }
        async fn load_admins(&self) -> Result<Vec<gatekeeper_db::models::approval::AdminRecord>> {
            anyhow::bail!("admins file is corrupt")
        }
        async fn save_admins(&self, admins: &[gatekeeper_db::models::approval::AdminRecord]) -> Result<()> {
            self.0.save_admins(admins).await
        }
    }

    #[tokio::test]
    async fn unreadable_admins_leave_no_pending_request() {
        let inner = MemoryStore::new();
        let notifier = Arc::new(RecordingNotifier::default());
        let service = ApprovalService::new(
            Arc::new(BrokenAdminsStore(inner.clone())),
            Arc::new(FakeRegistrar::default()),
            notifier.clone(),
        );

        assert!(service.submit_request(REQUESTER, "alice").await.is_err());
        assert!(service.submit_request(REQUESTER, "alice").await.is_err());

        assert!(inner.load_pending().await.unwrap().is_empty());
        assert!(notifier.sent.lock().unwrap().is_empty());
    }
}
