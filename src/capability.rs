//! Capability index: per-handler-type operation sets and memoized match
//! results.
//!
//! The index is an explicit collaborator, constructed once and shared by
//! `Arc`, never process-global state, so tests can build isolated
//! instances without cross-test leakage. Both maps are concurrent: duplicate
//! computation of a match set under racing first queries is acceptable,
//! duplicate storage is not (the DashMap entry API guarantees one stored
//! value per key).

use crate::handler::{Operation, Operations, ScatterHandler};
use crate::matcher::{accepts, replies_with, TypeToken};
use crate::recipient::CollisionPolicy;
use dashmap::DashMap;
use std::any::TypeId;
use std::sync::Arc;
use tracing::debug;

/// Ambiguous capability match on one handler, reported when the recipient's
/// policy is [`CollisionPolicy::IgnoreRecipient`].
#[derive(Clone, Debug)]
pub struct CollisionNotice {
    pub handler_type: &'static str,
    pub request_type: &'static str,
    pub response_type: Option<&'static str>,
    pub matching_operations: usize,
}

/// Outcome of a capability query against one handler type.
#[derive(Clone, Debug)]
pub enum CapabilityQuery {
    /// Zero matching operations. Not an error.
    None,
    /// The operations to invoke: exactly one, or the full matching set under
    /// [`CollisionPolicy::UseAllMatchingOperations`].
    Match(Vec<Operation>),
    /// Multiple matches under [`CollisionPolicy::IgnoreRecipient`]; the
    /// caller is expected to drop the recipient from the current resolution
    /// and continue with the rest.
    Collision(CollisionNotice),
}

type QueryKey = (TypeId, TypeId, Option<TypeId>);

/// Shared cache of discovered operations and match results.
#[derive(Default)]
pub struct CapabilityIndex {
    types: DashMap<TypeId, Arc<Vec<Operation>>>,
    queries: DashMap<QueryKey, Arc<Vec<Operation>>>,
}

impl CapabilityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enumerate and memoize the operation set declared by `H`. Idempotent;
    /// the set is computed once per handler type for the life of the index.
    pub fn register_type<H: ScatterHandler>(&self) -> Arc<Vec<Operation>> {
        self.types
            .entry(TypeId::of::<H>())
            .or_insert_with(|| {
                let mut ops = Operations::<H>::new();
                H::operations(&mut ops);
                let ops = ops.into_vec();
                debug!(
                    handler_type = std::any::type_name::<H>(),
                    operations = ops.len(),
                    "handler operations enumerated"
                );
                Arc::new(ops)
            })
            .clone()
    }

    /// Operations on `handler` accepting `request`, classified by `policy`.
    pub fn find_accepting(
        &self,
        handler: TypeId,
        handler_name: &'static str,
        request: &TypeToken,
        policy: CollisionPolicy,
    ) -> CapabilityQuery {
        let matched = self.matching(handler, request, None);
        Self::classify(matched, handler_name, request, None, policy)
    }

    /// Operations on `handler` accepting `request` and replying with
    /// `response`, classified by `policy`.
    pub fn find_replying(
        &self,
        handler: TypeId,
        handler_name: &'static str,
        request: &TypeToken,
        response: &TypeToken,
        policy: CollisionPolicy,
    ) -> CapabilityQuery {
        let matched = self.matching(handler, request, Some(response));
        Self::classify(matched, handler_name, request, Some(response), policy)
    }

    pub(crate) fn query(
        &self,
        handler: TypeId,
        handler_name: &'static str,
        request: &TypeToken,
        response: Option<&TypeToken>,
        policy: CollisionPolicy,
    ) -> CapabilityQuery {
        let matched = self.matching(handler, request, response);
        Self::classify(matched, handler_name, request, response, policy)
    }

    /// Memoized match set for one (handler, request[, response]) key.
    fn matching(
        &self,
        handler: TypeId,
        request: &TypeToken,
        response: Option<&TypeToken>,
    ) -> Arc<Vec<Operation>> {
        let key = (handler, request.id(), response.map(|t| t.id()));
        if let Some(hit) = self.queries.get(&key) {
            return hit.clone();
        }
        let ops = match self.types.get(&handler) {
            Some(ops) => ops.clone(),
            // Unregistered handler type: no capability.
            None => return Arc::new(Vec::new()),
        };
        let matched: Vec<Operation> = ops
            .iter()
            .filter(|op| {
                accepts(op.request(), request)
                    && response.map_or(true, |wanted| replies_with(op.response(), wanted))
            })
            .cloned()
            .collect();
        self.queries
            .entry(key)
            .or_insert_with(|| Arc::new(matched))
            .clone()
    }

    fn classify(
        matched: Arc<Vec<Operation>>,
        handler_name: &'static str,
        request: &TypeToken,
        response: Option<&TypeToken>,
        policy: CollisionPolicy,
    ) -> CapabilityQuery {
        match matched.len() {
            0 => CapabilityQuery::None,
            1 => CapabilityQuery::Match(matched.as_ref().clone()),
            n => match policy {
                CollisionPolicy::UseAllMatchingOperations => {
                    CapabilityQuery::Match(matched.as_ref().clone())
                }
                CollisionPolicy::IgnoreRecipient => {
                    CapabilityQuery::Collision(CollisionNotice {
                        handler_type: handler_name,
                        request_type: request.name(),
                        response_type: response.map(|t| t.name()),
                        matching_operations: n,
                    })
                }
            },
        }
    }
}
