//! Call signaling: the call state machine plus targeted notifications.
//!
//! Each operation first wins its compare-and-swap against the store and only
//! then notifies. A lost race therefore never produces a notification, and
//! authorization failures have no effect at all.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::domain::call::{Call, CallError, CallRole, CallStatus};
use crate::domain::foundation::{CallId, DomainError, ErrorCode, Timestamp, UserId};
use crate::domain::signaling::{Notification, RelayKind};
use crate::ports::{DeliveryError, UserNotifier};

use super::CallStateMachine;

/// Errors surfaced by signaling operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SignalingError {
    #[error(transparent)]
    Call(#[from] CallError),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    /// The callee had no live notification connection; the call was marked missed.
    #[error("Callee is offline; call {0} marked missed")]
    CalleeOffline(CallId),
}

impl From<SignalingError> for DomainError {
    fn from(err: SignalingError) -> Self {
        match err {
            SignalingError::Call(e) => e.into(),
            SignalingError::Delivery(e) => e.into(),
            SignalingError::CalleeOffline(_) => DomainError::new(ErrorCode::NotConnected, err.to_string()),
        }
    }
}

#[derive(Clone)]
pub struct CallSignalingService {
    calls: Arc<CallStateMachine>,
    notifier: Arc<dyn UserNotifier>,
    ring_timeout: Option<Duration>,
}

impl CallSignalingService {
    pub fn new(calls: Arc<CallStateMachine>, notifier: Arc<dyn UserNotifier>) -> Self {
        Self {
            calls,
            notifier,
            ring_timeout: None,
        }
    }

    /// Marks ringing calls missed if nobody answers within `timeout`.
    pub fn with_ring_timeout(mut self, timeout: Duration) -> Self {
        self.ring_timeout = Some(timeout);
        self
    }

    pub fn calls(&self) -> &CallStateMachine {
        &self.calls
    }

    /// Places (or rejoins) a call from `caller` to `callee`.
    ///
    /// A freshly created call moves to `ringing` and then rings the callee.
    /// If the callee is offline the call is marked missed instead. When
    /// another request already moved the call on, its current state is
    /// returned and nobody is notified.
    pub async fn start_call(&self, caller: UserId, callee: UserId) -> Result<(Call, CallRole), SignalingError> {
        let (mut call, role) = self.calls.create_or_join(caller.clone(), callee).await?;

        if call.status != CallStatus::Initiated || call.initiated_id != caller {
            return Ok((call, role));
        }

        match self
            .calls
            .update_status(call.id, CallStatus::Initiated, CallStatus::Ringing, None, None)
            .await
        {
            Ok(()) => call.status = CallStatus::Ringing,
            Err(e) if e.is_invalid_transition() => {
                let current = self.calls.get_by_id(call.id).await?;
                return Ok((current, role));
            }
            Err(e) => return Err(e.into()),
        }

        let ring = Notification::incoming_call(&call).to_text();
        match self.notifier.send_to_user(call.recipient(), &ring).await {
            Ok(_) => {
                self.arm_ring_timeout(call.id);
                Ok((call, role))
            }
            Err(DeliveryError::NotConnected(user_id)) => {
                tracing::info!(call_id = %call.id, user_id = %user_id, "Callee offline; marking call missed");
                self.calls
                    .update_status(call.id, CallStatus::Ringing, CallStatus::Missed, None, Some(Timestamp::now()))
                    .await?;
                Err(SignalingError::CalleeOffline(call.id))
            }
        }
    }

    /// Answers a ringing call. Only the party who did not place it may accept.
    pub async fn accept_call(&self, user: &UserId, call_id: CallId) -> Result<Call, SignalingError> {
        let mut call = self.recipient_call(user, call_id).await?;
        let answered_at = Timestamp::now();
        self.calls
            .update_status(call_id, CallStatus::Ringing, CallStatus::Active, Some(answered_at), None)
            .await?;
        call.status = CallStatus::Active;
        call.answered_at = Some(answered_at);

        self.notify_parties(&call, Notification::call_accepted(&call, answered_at)).await;
        Ok(call)
    }

    /// Rejects a ringing call. Only the party who did not place it may decline.
    pub async fn decline_call(&self, user: &UserId, call_id: CallId) -> Result<Call, SignalingError> {
        let mut call = self.recipient_call(user, call_id).await?;
        let ended_at = Timestamp::now();
        self.calls
            .update_status(call_id, CallStatus::Ringing, CallStatus::Rejected, None, Some(ended_at))
            .await?;
        call.status = CallStatus::Rejected;
        call.ended_at = Some(ended_at);

        self.notify_parties(&call, Notification::call_declined(call_id)).await;
        Ok(call)
    }

    /// Hangs up an active call. Either party may end it.
    pub async fn end_call(&self, user: &UserId, call_id: CallId) -> Result<Call, SignalingError> {
        let mut call = self.party_call(user, call_id).await?;
        let ended_at = Timestamp::now();
        self.calls
            .update_status(call_id, CallStatus::Active, CallStatus::Ended, None, Some(ended_at))
            .await?;
        call.status = CallStatus::Ended;
        call.ended_at = Some(ended_at);

        self.notify_parties(&call, Notification::call_ended(call_id)).await;
        Ok(call)
    }

    /// Ages an unanswered call out to `missed`.
    pub async fn mark_missed(&self, call_id: CallId) -> Result<Call, SignalingError> {
        let mut call = self.calls.get_by_id(call_id).await?;
        let from = call.status;
        if !matches!(from, CallStatus::Initiated | CallStatus::Ringing) {
            return Err(CallError::InvalidTransition {
                call_id,
                from,
                to: CallStatus::Missed,
            }
            .into());
        }

        let ended_at = Timestamp::now();
        self.calls
            .update_status(call_id, from, CallStatus::Missed, None, Some(ended_at))
            .await?;
        call.status = CallStatus::Missed;
        call.ended_at = Some(ended_at);

        self.notify_parties(&call, Notification::call_missed(call_id)).await;
        Ok(call)
    }

    /// Forwards a WebRTC payload verbatim to `target`, tagged with the sender.
    pub async fn relay_signal(
        &self,
        sender: &UserId,
        kind: RelayKind,
        target: &UserId,
        payload: Value,
    ) -> Result<usize, SignalingError> {
        let frame = Notification::relayed(kind, sender, payload).to_text();
        let delivered = self.notifier.send_to_user(target, &frame).await?;
        tracing::debug!(sender = %sender, target = %target, event = kind.event_name(), "Relayed signal");
        Ok(delivered)
    }

    async fn party_call(&self, user: &UserId, call_id: CallId) -> Result<Call, SignalingError> {
        let call = self.calls.get_by_id(call_id).await?;
        if !call.is_party(user) {
            return Err(CallError::Forbidden {
                call_id,
                user_id: user.clone(),
            }
            .into());
        }
        Ok(call)
    }

    async fn recipient_call(&self, user: &UserId, call_id: CallId) -> Result<Call, SignalingError> {
        let call = self.party_call(user, call_id).await?;
        if call.recipient() != user {
            return Err(CallError::Forbidden {
                call_id,
                user_id: user.clone(),
            }
            .into());
        }
        Ok(call)
    }

    async fn notify_parties(&self, call: &Call, notification: Notification) {
        let frame = notification.to_text();
        for user in [&call.caller_id, &call.callee_id] {
            if let Err(e) = self.notifier.send_to_user(user, &frame).await {
                tracing::debug!(call_id = %call.id, event = notification.event, error = %e, "Party not notified");
            }
        }
    }

    fn arm_ring_timeout(&self, call_id: CallId) {
        let Some(timeout) = self.ring_timeout else {
            return;
        };
        let service = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            match service.mark_missed(call_id).await {
                Ok(_) => tracing::info!(call_id = %call_id, "Unanswered call marked missed"),
                // Answered, declined or already missed in the meantime.
                Err(SignalingError::Call(e)) if e.is_invalid_transition() => {}
                Err(e) => tracing::warn!(call_id = %call_id, error = %e, "Ring timeout failed"),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryCallRepository;
    use crate::domain::call::UserPair;
    use crate::ports::CallRepository;
    use async_trait::async_trait;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    /// Records frames per user; only users marked online receive them.
    #[derive(Default)]
    struct RecordingNotifier {
        online: Mutex<HashSet<UserId>>,
        frames: Mutex<HashMap<UserId, Vec<Value>>>,
    }

    impl RecordingNotifier {
        fn online(users: &[&str]) -> Arc<Self> {
            let notifier = Self::default();
            for u in users {
                notifier.online.lock().unwrap().insert(user(u));
            }
            Arc::new(notifier)
        }

        fn events(&self, user_id: &str) -> Vec<String> {
            self.frames
                .lock()
                .unwrap()
                .get(&user(user_id))
                .map(|frames| {
                    frames
                        .iter()
                        .map(|f| f["event"].as_str().unwrap_or_default().to_string())
                        .collect()
                })
                .unwrap_or_default()
        }

        fn last(&self, user_id: &str) -> Value {
            self.frames.lock().unwrap()[&user(user_id)]
                .last()
                .cloned()
                .unwrap()
        }
    }

    #[async_trait]
    impl UserNotifier for RecordingNotifier {
        async fn send_to_user(&self, user_id: &UserId, payload: &str) -> Result<usize, DeliveryError> {
            if !self.online.lock().unwrap().contains(user_id) {
                return Err(DeliveryError::NotConnected(user_id.clone()));
            }
            self.frames
                .lock()
                .unwrap()
                .entry(user_id.clone())
                .or_default()
                .push(serde_json::from_str(payload).unwrap());
            Ok(1)
        }
    }

    fn user(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    /// Lets a competing request move the call out of `initiated` just
    /// before the caller's own `initiated -> ringing` update lands.
    struct PreemptedRepository {
        inner: InMemoryCallRepository,
    }

    #[async_trait]
    impl CallRepository for PreemptedRepository {
        async fn create(&self, call: &Call) -> Result<(), CallError> {
            self.inner.create(call).await
        }

        async fn update_status(
            &self,
            call_id: CallId,
            from: CallStatus,
            to: CallStatus,
            answered_at: Option<Timestamp>,
            ended_at: Option<Timestamp>,
        ) -> Result<(), CallError> {
            if from == CallStatus::Initiated && to == CallStatus::Ringing {
                self.inner
                    .update_status(call_id, CallStatus::Initiated, CallStatus::Missed, None, Some(Timestamp::now()))
                    .await?;
            }
            self.inner.update_status(call_id, from, to, answered_at, ended_at).await
        }

        async fn get_active_by_user_pair(&self, pair: &UserPair) -> Result<Option<Call>, CallError> {
            self.inner.get_active_by_user_pair(pair).await
        }

        async fn get_by_id(&self, id: CallId) -> Result<Call, CallError> {
            self.inner.get_by_id(id).await
        }
    }

    fn service(notifier: Arc<RecordingNotifier>) -> CallSignalingService {
        let calls = Arc::new(CallStateMachine::new(Arc::new(InMemoryCallRepository::new())));
        CallSignalingService::new(calls, notifier)
    }

    #[tokio::test]
    async fn start_call_rings_callee_and_moves_to_ringing() {
        let notifier = RecordingNotifier::online(&["alice", "bob"]);
        let svc = service(notifier.clone());

        let (call, role) = svc.start_call(user("bob"), user("alice")).await.unwrap();

        assert_eq!(call.status, CallStatus::Ringing);
        assert_eq!(role, CallRole::Callee);
        assert_eq!(notifier.events("alice"), vec!["incoming_call"]);
        assert_eq!(notifier.last("alice")["data"]["caller"], "bob");
        assert!(notifier.events("bob").is_empty());
        assert_eq!(svc.calls().get_by_id(call.id).await.unwrap().status, CallStatus::Ringing);
    }

    #[tokio::test]
    async fn start_call_that_loses_the_ringing_update_notifies_nobody() {
        let notifier = RecordingNotifier::online(&["alice", "bob"]);
        let repository = Arc::new(PreemptedRepository {
            inner: InMemoryCallRepository::new(),
        });
        let svc = CallSignalingService::new(Arc::new(CallStateMachine::new(repository)), notifier.clone());

        let (call, role) = svc.start_call(user("alice"), user("bob")).await.unwrap();

        assert_eq!(role, CallRole::Caller);
        assert_eq!(call.status, CallStatus::Missed);
        assert!(notifier.events("bob").is_empty());
        assert!(notifier.events("alice").is_empty());
    }

    #[tokio::test]
    async fn start_call_to_offline_callee_is_missed() {
        let notifier = RecordingNotifier::online(&["alice"]);
        let svc = service(notifier.clone());

        let err = svc.start_call(user("alice"), user("bob")).await.unwrap_err();
        let SignalingError::CalleeOffline(call_id) = err else {
            panic!("expected CalleeOffline, got {err:?}");
        };
        let stored = svc.calls().get_by_id(call_id).await.unwrap();
        assert_eq!(stored.status, CallStatus::Missed);
        assert!(stored.ended_at.is_some());
    }

    #[tokio::test]
    async fn repeated_start_does_not_ring_twice() {
        let notifier = RecordingNotifier::online(&["alice", "bob"]);
        let svc = service(notifier.clone());

        let (first, _) = svc.start_call(user("alice"), user("bob")).await.unwrap();
        let (again, _) = svc.start_call(user("alice"), user("bob")).await.unwrap();

        assert_eq!(first.id, again.id);
        assert_eq!(notifier.events("bob"), vec!["incoming_call"]);
    }

    #[tokio::test]
    async fn full_call_lifecycle_notifies_both_parties() {
        let notifier = RecordingNotifier::online(&["alice", "bob"]);
        let svc = service(notifier.clone());
        let (call, _) = svc.start_call(user("alice"), user("bob")).await.unwrap();

        let active = svc.accept_call(&user("bob"), call.id).await.unwrap();
        assert_eq!(active.status, CallStatus::Active);
        assert!(active.answered_at.is_some());
        assert_eq!(notifier.last("alice")["event"], "call_accepted");
        assert_eq!(notifier.last("bob")["event"], "call_accepted");

        let ended = svc.end_call(&user("alice"), call.id).await.unwrap();
        assert_eq!(ended.status, CallStatus::Ended);
        assert_eq!(notifier.last("bob")["event"], "call_ended");

        let stored = svc.calls().get_by_id(call.id).await.unwrap();
        assert_eq!(stored.status, CallStatus::Ended);
        assert!(stored.ended_at.is_some());
    }

    #[tokio::test]
    async fn initiator_cannot_accept_own_call() {
        let notifier = RecordingNotifier::online(&["alice", "bob"]);
        let svc = service(notifier.clone());
        let (call, _) = svc.start_call(user("alice"), user("bob")).await.unwrap();

        let err = svc.accept_call(&user("alice"), call.id).await.unwrap_err();
        assert!(matches!(err, SignalingError::Call(CallError::Forbidden { .. })));
        assert_eq!(svc.calls().get_by_id(call.id).await.unwrap().status, CallStatus::Ringing);
    }

    #[tokio::test]
    async fn outsider_is_forbidden_without_effect() {
        let notifier = RecordingNotifier::online(&["alice", "bob", "mallory"]);
        let svc = service(notifier.clone());
        let (call, _) = svc.start_call(user("alice"), user("bob")).await.unwrap();

        for result in [
            svc.accept_call(&user("mallory"), call.id).await,
            svc.decline_call(&user("mallory"), call.id).await,
            svc.end_call(&user("mallory"), call.id).await,
        ] {
            assert!(matches!(result, Err(SignalingError::Call(CallError::Forbidden { .. }))));
        }
        assert_eq!(svc.calls().get_by_id(call.id).await.unwrap().status, CallStatus::Ringing);
        assert!(notifier.events("mallory").is_empty());
    }

    #[tokio::test]
    async fn decline_then_accept_loses_the_race() {
        let notifier = RecordingNotifier::online(&["alice", "bob"]);
        let svc = service(notifier.clone());
        let (call, _) = svc.start_call(user("alice"), user("bob")).await.unwrap();

        svc.decline_call(&user("bob"), call.id).await.unwrap();
        assert_eq!(notifier.last("alice")["event"], "call_declined");

        let err = svc.accept_call(&user("bob"), call.id).await.unwrap_err();
        assert!(matches!(err, SignalingError::Call(ref e) if e.is_invalid_transition()));
        assert_eq!(notifier.last("alice")["event"], "call_declined");
    }

    #[tokio::test]
    async fn end_requires_an_active_call() {
        let notifier = RecordingNotifier::online(&["alice", "bob"]);
        let svc = service(notifier);
        let (call, _) = svc.start_call(user("alice"), user("bob")).await.unwrap();

        let err = svc.end_call(&user("bob"), call.id).await.unwrap_err();
        assert!(matches!(err, SignalingError::Call(ref e) if e.is_invalid_transition()));
    }

    #[tokio::test]
    async fn mark_missed_only_applies_to_unanswered_calls() {
        let notifier = RecordingNotifier::online(&["alice", "bob"]);
        let svc = service(notifier.clone());
        let (call, _) = svc.start_call(user("alice"), user("bob")).await.unwrap();

        let missed = svc.mark_missed(call.id).await.unwrap();
        assert_eq!(missed.status, CallStatus::Missed);
        assert_eq!(notifier.last("alice")["event"], "call_missed");
        assert_eq!(notifier.last("bob")["event"], "call_missed");

        assert!(svc.mark_missed(call.id).await.is_err());
    }

    #[tokio::test]
    async fn ring_timeout_marks_unanswered_call_missed() {
        let notifier = RecordingNotifier::online(&["alice", "bob"]);
        let svc = service(notifier.clone()).with_ring_timeout(Duration::from_millis(20));
        let (call, _) = svc.start_call(user("alice"), user("bob")).await.unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(svc.calls().get_by_id(call.id).await.unwrap().status, CallStatus::Missed);
    }

    #[tokio::test]
    async fn ring_timeout_leaves_answered_call_alone() {
        let notifier = RecordingNotifier::online(&["alice", "bob"]);
        let svc = service(notifier.clone()).with_ring_timeout(Duration::from_millis(30));
        let (call, _) = svc.start_call(user("alice"), user("bob")).await.unwrap();
        svc.accept_call(&user("bob"), call.id).await.unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(svc.calls().get_by_id(call.id).await.unwrap().status, CallStatus::Active);
    }

    #[tokio::test]
    async fn relay_tags_sender_and_reports_offline_target() {
        let notifier = RecordingNotifier::online(&["bob"]);
        let svc = service(notifier.clone());

        let delivered = svc
            .relay_signal(&user("alice"), RelayKind::Offer, &user("bob"), serde_json::json!({"sdp": "v=0"}))
            .await
            .unwrap();
        assert_eq!(delivered, 1);
        let frame = notifier.last("bob");
        assert_eq!(frame["event"], "webrtc_offer");
        assert_eq!(frame["data"]["senderId"], "alice");
        assert_eq!(frame["data"]["payload"]["sdp"], "v=0");

        let err = svc
            .relay_signal(&user("bob"), RelayKind::IceCandidate, &user("carol"), Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, SignalingError::Delivery(DeliveryError::NotConnected(_))));
    }
}
