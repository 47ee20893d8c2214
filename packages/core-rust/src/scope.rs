//! Flow-scoped context propagation.
//!
//! A context value is bound to the current logical flow (the async task
//! polling the scoped future) for the dynamic extent of a callback, and is
//! visible to any code the callback awaits, however deeply nested, without
//! being passed as a parameter.
//!
//! # Storage
//!
//! A single `tokio::task_local!` slot holds an immutable binding table keyed
//! by context type. Entering a scope copies the current table, inserts the
//! new binding and runs the callback under [`tokio::task::LocalKey::scope`].
//! Tokio installs the table only while the scoped future is being polled and
//! puts the previous one back when each poll returns, so:
//!
//! - bindings follow the flow across suspension points and worker threads,
//! - a different flow resumed on the same worker never sees them,
//! - leaving the scope restores the outer table on every exit path:
//!   normal return, error, panic unwinding or the future being dropped.
//!
//! Tasks started with `tokio::spawn` are new flows and start with no bindings.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::context::ContextId;

tokio::task_local! {
    static BINDINGS: Bindings;
}

/// A context type that can be bound to a flow.
pub trait ScopedContext: Send + Sync + 'static {
    /// Display name used in logs and in [`ContextMissing`] errors.
    const NAME: &'static str;

    /// Identifier of this context instance.
    fn context_id(&self) -> &ContextId;
}

/// Returned by [`ContextAccessor::require_current`] when no context of the
/// requested type is bound to the calling flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("no {context} is bound to the current flow")]
pub struct ContextMissing {
    /// Name of the missing context type.
    pub context: &'static str,
}

// ---------------------------------------------------------------------------
// Bindings
// ---------------------------------------------------------------------------

type Slot = Arc<dyn Any + Send + Sync>;

/// Immutable per-flow binding table. Cloning shares the underlying map.
#[derive(Clone, Default)]
struct Bindings {
    slots: Arc<HashMap<TypeId, Slot>>,
}

impl Bindings {
    /// Table bound to the calling flow, or an empty one outside any scope.
    fn current() -> Self {
        BINDINGS.try_with(Clone::clone).unwrap_or_default()
    }

    /// Copy of this table with `value` bound for `T`, shadowing any outer binding.
    fn with<T: ScopedContext>(&self, value: Arc<T>) -> Self {
        let mut slots = (*self.slots).clone();
        slots.insert(TypeId::of::<T>(), value);
        Self {
            slots: Arc::new(slots),
        }
    }

    fn get<T: ScopedContext>(&self) -> Option<Arc<T>> {
        self.slots
            .get(&TypeId::of::<T>())
            .and_then(|slot| Arc::clone(slot).downcast::<T>().ok())
    }
}

/// Emits the scope-closed trace event when the scoped future finishes or is
/// dropped.
struct ScopeTrace {
    context: &'static str,
    id: ContextId,
}

impl Drop for ScopeTrace {
    fn drop(&mut self) {
        tracing::trace!(context = self.context, id = %self.id, "context scope closed");
    }
}

// ---------------------------------------------------------------------------
// ContextManager
// ---------------------------------------------------------------------------

/// Binds values of type `T` to the current flow for the duration of a callback.
///
/// Zero-sized; hold one per context type wherever scopes are opened.
pub struct ContextManager<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T: ScopedContext> ContextManager<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }

    /// Runs `callback` with `value` bound as the current `T` and returns its
    /// output.
    ///
    /// The callback is invoked inside the scope, so both its synchronous
    /// prologue and the future it returns observe the binding. Nested calls
    /// for other context types compose; a nested call for the same `T`
    /// shadows this binding until it returns. When this future completes or
    /// is dropped, the flow's previous bindings are in effect again.
    pub async fn execute_in_scope<F, Fut>(&self, value: Arc<T>, callback: F) -> Fut::Output
    where
        F: FnOnce() -> Fut,
        Fut: Future,
    {
        let bindings = Bindings::current().with(Arc::clone(&value));
        let _trace = ScopeTrace {
            context: T::NAME,
            id: value.context_id().clone(),
        };
        tracing::trace!(context = T::NAME, id = %value.context_id(), "context scope opened");
        drop(value);

        BINDINGS
            .scope(bindings, async move { callback().await })
            .await
    }
}

impl<T: ScopedContext> Default for ContextManager<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for ContextManager<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ContextManager<T> {}

impl<T: ScopedContext> fmt::Debug for ContextManager<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextManager")
            .field("context", &T::NAME)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// ContextAccessor
// ---------------------------------------------------------------------------

/// Read access to the `T` bound to the calling flow.
///
/// Zero-sized and `Copy`; strategies keep one per context type they need.
pub struct ContextAccessor<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T: ScopedContext> ContextAccessor<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }

    /// The bound `T`, or `None` outside any scope for `T`.
    #[must_use]
    pub fn current(&self) -> Option<Arc<T>> {
        BINDINGS.try_with(Bindings::get::<T>).ok().flatten()
    }

    /// The bound `T`.
    ///
    /// # Errors
    ///
    /// Returns [`ContextMissing`] naming `T` when no scope for `T` is open in
    /// the calling flow.
    pub fn require_current(&self) -> Result<Arc<T>, ContextMissing> {
        self.current().ok_or(ContextMissing { context: T::NAME })
    }

    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.current().is_some()
    }
}

impl<T: ScopedContext> Default for ContextAccessor<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for ContextAccessor<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ContextAccessor<T> {}

impl<T: ScopedContext> fmt::Debug for ContextAccessor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextAccessor")
            .field("context", &T::NAME)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::panic::{self, AssertUnwindSafe};
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use std::time::Duration;

    use proptest::prelude::*;
    use uuid::Uuid;

    use super::*;
    use crate::context::{RequestContext, WalletContext};

    const REQUESTS: ContextManager<RequestContext> = ContextManager::new();
    const WALLETS: ContextManager<WalletContext> = ContextManager::new();
    const CURRENT_REQUEST: ContextAccessor<RequestContext> = ContextAccessor::new();
    const CURRENT_WALLET: ContextAccessor<WalletContext> = ContextAccessor::new();

    fn request(correlation_id: &str) -> Arc<RequestContext> {
        Arc::new(RequestContext::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            correlation_id,
        ))
    }

    fn wallet() -> Arc<WalletContext> {
        Arc::new(WalletContext::new(Uuid::new_v4(), "k-1"))
    }

    #[tokio::test]
    async fn nothing_is_bound_outside_a_scope() {
        assert!(CURRENT_REQUEST.current().is_none());
        assert!(!CURRENT_WALLET.is_bound());
        let err = CURRENT_REQUEST.require_current().unwrap_err();
        assert_eq!(err.context, "RequestContext");
        assert_eq!(err.to_string(), "no RequestContext is bound to the current flow");
    }

    #[tokio::test]
    async fn binding_visible_across_suspension_points() {
        let ctx = request("c-1");
        let expected = ctx.id().clone();

        let seen = REQUESTS
            .execute_in_scope(ctx, || async {
                tokio::task::yield_now().await;
                tokio::time::sleep(Duration::from_millis(5)).await;
                nested_lookup().await
            })
            .await;

        assert_eq!(seen, Some(expected));
        assert!(CURRENT_REQUEST.current().is_none());
    }

    async fn nested_lookup() -> Option<ContextId> {
        tokio::task::yield_now().await;
        CURRENT_REQUEST.current().map(|ctx| ctx.id().clone())
    }

    #[tokio::test]
    async fn callback_prologue_runs_inside_the_scope() {
        let seen = REQUESTS
            .execute_in_scope(request("c-1"), || {
                let bound = CURRENT_REQUEST.is_bound();
                async move { bound }
            })
            .await;
        assert!(seen);
    }

    #[tokio::test]
    async fn wallet_only_resolvable_inside_both_scopes() {
        let before_wallet = REQUESTS
            .execute_in_scope(request("c-1"), || async {
                let before = CURRENT_WALLET.is_bound();
                let inside = WALLETS
                    .execute_in_scope(wallet(), || async {
                        CURRENT_REQUEST.is_bound() && CURRENT_WALLET.is_bound()
                    })
                    .await;
                let after = CURRENT_WALLET.is_bound();
                let request_still_bound = CURRENT_REQUEST.is_bound();
                (before, inside, after, request_still_bound)
            })
            .await;

        assert_eq!(before_wallet, (false, true, false, true));
        assert!(!CURRENT_WALLET.is_bound());
    }

    #[tokio::test]
    async fn same_type_shadows_then_reverts() {
        let outer = request("outer");
        let inner = request("inner");

        let observed = REQUESTS
            .execute_in_scope(outer, || async {
                let first = CURRENT_REQUEST.require_current().unwrap();
                let shadowed = REQUESTS
                    .execute_in_scope(inner, || async {
                        CURRENT_REQUEST.require_current().unwrap()
                    })
                    .await;
                let reverted = CURRENT_REQUEST.require_current().unwrap();
                (
                    first.correlation_id().to_string(),
                    shadowed.correlation_id().to_string(),
                    reverted.correlation_id().to_string(),
                )
            })
            .await;

        assert_eq!(
            observed,
            ("outer".to_string(), "inner".to_string(), "outer".to_string())
        );
    }

    #[tokio::test]
    async fn failing_callback_still_restores_prior_binding() {
        let outer = request("outer");
        let outer_id = outer.id().clone();

        let after = REQUESTS
            .execute_in_scope(outer, || async {
                let result: Result<(), &str> = REQUESTS
                    .execute_in_scope(request("inner"), || async { Err("boom") })
                    .await;
                assert_eq!(result, Err("boom"));
                CURRENT_REQUEST.current().map(|ctx| ctx.id().clone())
            })
            .await;

        assert_eq!(after, Some(outer_id));
        assert!(CURRENT_REQUEST.current().is_none());
    }

    #[tokio::test]
    async fn cancelled_scope_restores_prior_binding() {
        let outer = request("outer");
        let outer_id = outer.id().clone();

        let after = REQUESTS
            .execute_in_scope(outer, || async {
                let timed_out = tokio::time::timeout(
                    Duration::from_millis(10),
                    REQUESTS.execute_in_scope(request("inner"), || async {
                        std::future::pending::<()>().await;
                    }),
                )
                .await;
                assert!(timed_out.is_err());
                CURRENT_REQUEST.current().map(|ctx| ctx.id().clone())
            })
            .await;

        assert_eq!(after, Some(outer_id));
    }

    /// Resolves to `Err` with the payload if polling `F` panics.
    struct CatchUnwind<F>(Pin<Box<F>>);

    impl<F: Future> Future for CatchUnwind<F> {
        type Output = std::thread::Result<F::Output>;

        fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
            let inner = self.0.as_mut();
            match panic::catch_unwind(AssertUnwindSafe(|| inner.poll(cx))) {
                Ok(Poll::Pending) => Poll::Pending,
                Ok(Poll::Ready(output)) => Poll::Ready(Ok(output)),
                Err(payload) => Poll::Ready(Err(payload)),
            }
        }
    }

    #[tokio::test]
    async fn panicking_scope_restores_prior_binding() {
        let after = REQUESTS
            .execute_in_scope(request("outer"), || async {
                let caught = CatchUnwind(Box::pin(REQUESTS.execute_in_scope(
                    request("inner"),
                    || async {
                        tokio::task::yield_now().await;
                        assert_eq!(current_correlation().as_deref(), Some("inner"));
                        panic!("provider blew up");
                    },
                )))
                .await;
                assert!(caught.is_err());
                current_correlation()
            })
            .await;

        assert_eq!(after.as_deref(), Some("outer"));
        assert!(CURRENT_REQUEST.current().is_none());
    }

    #[tokio::test]
    async fn aborted_task_releases_its_binding() {
        let ctx = request("aborted");
        let (entered_tx, entered_rx) = tokio::sync::oneshot::channel();

        let task = tokio::spawn({
            let ctx = Arc::clone(&ctx);
            async move {
                REQUESTS
                    .execute_in_scope(ctx, || async move {
                        let _ = entered_tx.send(current_correlation());
                        std::future::pending::<()>().await;
                    })
                    .await;
            }
        });

        assert_eq!(entered_rx.await.unwrap().as_deref(), Some("aborted"));
        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());

        assert_eq!(Arc::strong_count(&ctx), 1);
        assert!(CURRENT_REQUEST.current().is_none());
    }

    #[tokio::test]
    async fn spawned_tasks_do_not_inherit_bindings() {
        let inherited = REQUESTS
            .execute_in_scope(request("c-1"), || async {
                tokio::spawn(async { CURRENT_REQUEST.is_bound() })
                    .await
                    .unwrap()
            })
            .await;
        assert!(!inherited);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_flows_never_observe_each_other() {
        let mut handles = Vec::new();
        for i in 0..64 {
            handles.push(tokio::spawn(async move {
                let ctx = request(&format!("c-{i}"));
                let own_id = ctx.id().clone();
                REQUESTS
                    .execute_in_scope(ctx, || async move {
                        for step in 0..20u64 {
                            tokio::time::sleep(Duration::from_micros((i + step) % 7)).await;
                            let seen = CURRENT_REQUEST.require_current().unwrap();
                            assert_eq!(seen.id(), &own_id);
                            assert_eq!(seen.correlation_id(), format!("c-{i}"));
                        }
                    })
                    .await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn mutations_are_visible_to_the_owner_after_the_scope() {
        let ctx = wallet();
        WALLETS
            .execute_in_scope(Arc::clone(&ctx), || async {
                let bound = CURRENT_WALLET.require_current().unwrap();
                bound.set_last_top_up(
                    rust_decimal::Decimal::from(250),
                    crate::types::PaymentProvider::Stripe,
                );
            })
            .await;
        assert_eq!(ctx.last_top_up_amount(), Some(rust_decimal::Decimal::from(250)));
    }

    fn current_correlation() -> Option<String> {
        CURRENT_REQUEST
            .current()
            .map(|r| r.correlation_id().to_string())
    }

    /// Opens one request scope per id, innermost last, checking the visible
    /// binding on the way in and out of every level.
    fn nest(ids: &[String]) -> Pin<Box<dyn Future<Output = ()> + '_>> {
        Box::pin(async move {
            let Some((first, rest)) = ids.split_first() else {
                return;
            };
            let outer = current_correlation();
            REQUESTS
                .execute_in_scope(request(first), || async {
                    assert_eq!(current_correlation().as_deref(), Some(first.as_str()));
                    nest(rest).await;
                    assert_eq!(current_correlation().as_deref(), Some(first.as_str()));
                })
                .await;
            assert_eq!(current_correlation(), outer);
        })
    }

    proptest! {
        #[test]
        fn nested_scopes_unwind_in_reverse_order(
            ids in prop::collection::vec("[a-z0-9-]{1,12}", 0..10),
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .build()
                .unwrap();
            runtime.block_on(nest(&ids));
            prop_assert!(!CURRENT_REQUEST.is_bound());
        }
    }
}
