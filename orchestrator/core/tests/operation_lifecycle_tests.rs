// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Integration tests for the operation dispatcher.
//!
//! Drives the dispatcher against in-memory repositories and a pending
//! completion queue, with small inline actions standing in for real ones:
//!
//! - spawn / block / resume / terminate round trip
//! - idempotent termination and failure
//! - cascading vs simple termination
//! - stale resumes, unknown operation types, resolution failures
//! - completion provider outages and version conflicts in the node store

use arbor_core::application::{
    ActionRegistration, ActionRegistry, DispatchError, DispatchSettings, OperationDispatcher, ResolveError,
    SwarmDriver,
};
use arbor_core::domain::action::{Action, ActionContext, ActionError, Continuation, SubtreeConcluded};
use arbor_core::domain::completion::{CompletionError, CompletionProvider, CompletionRequest};
use arbor_core::domain::events::NodeEvent;
use arbor_core::domain::node::{BlockingType, Node, NodeEmbryo, NodeId, NodeStatus, TerminationPolicy};
use arbor_core::domain::operation::{
    ActionOperation, BlockingOperation, FailureOperation, OperationOutput, SpawnOperation, SwarmOperation,
    TerminationOperation, UserCommunicationOperation,
};
use arbor_core::domain::repository::{NodeRepository, RepositoryError};
use arbor_core::domain::swarm::SwarmId;
use arbor_core::infrastructure::event_bus::EventBus;
use arbor_core::infrastructure::repositories::InMemoryNodeRepository;
use arbor_core::infrastructure::PendingCompletionQueue;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Blocks on entry, terminates itself once resumed.
struct BlockThenConclude {
    resumed_with: Arc<Mutex<Vec<Value>>>,
}

#[async_trait]
impl Action for BlockThenConclude {
    async fn entry(&self, ctx: &ActionContext) -> Result<OperationOutput, ActionError> {
        Ok(BlockingOperation::new(ctx.node_id, BlockingType::Completion, "handle_result")
            .with_args(json!({ "prompt": ctx.message }))
            .with_context(json!({ "attempt": 1 }))
            .into())
    }

    async fn call(
        &self,
        function: &str,
        ctx: &ActionContext,
        continuation: Continuation,
    ) -> Result<OperationOutput, ActionError> {
        match function {
            "handle_result" => {
                self.resumed_with.lock().unwrap().push(continuation.merged());
                Ok(TerminationOperation::of_self(ctx.node_id)
                    .with_report(format!("answer: {}", continuation.result))
                    .into())
            }
            other => Err(ActionError::UnknownFunction {
                function: other.to_string(),
            }),
        }
    }
}

/// Spawns two idle children and records subtree conclusions.
struct Spawner {
    concluded: Arc<Mutex<Vec<SubtreeConcluded>>>,
}

#[async_trait]
impl Action for Spawner {
    async fn entry(&self, _ctx: &ActionContext) -> Result<OperationOutput, ActionError> {
        Ok(vec![
            SwarmOperation::from(SpawnOperation::root(NodeEmbryo::new("test/idle", "first"))),
            SwarmOperation::from(SpawnOperation::root(NodeEmbryo::new("test/idle", "second"))),
        ]
        .into())
    }

    async fn on_subtree_concluded(
        &self,
        _ctx: &ActionContext,
        concluded: SubtreeConcluded,
    ) -> Result<OperationOutput, ActionError> {
        self.concluded.lock().unwrap().push(concluded);
        Ok(OperationOutput::None)
    }
}

struct Idle;

#[async_trait]
impl Action for Idle {
    async fn entry(&self, _ctx: &ActionContext) -> Result<OperationOutput, ActionError> {
        Ok(OperationOutput::None)
    }
}

struct Broken;

#[async_trait]
impl Action for Broken {
    async fn entry(&self, _ctx: &ActionContext) -> Result<OperationOutput, ActionError> {
        Err(ActionError::Failed("model unreachable".to_string()))
    }
}

/// Completion provider that is never reachable.
struct OfflineProvider;

#[async_trait]
impl CompletionProvider for OfflineProvider {
    async fn submit(&self, _request: CompletionRequest) -> Result<(), CompletionError> {
        Err(CompletionError::Unavailable("offline".to_string()))
    }
}

/// Node store that can be told to lose the next few version races.
struct ContendedNodes {
    inner: Arc<InMemoryNodeRepository>,
    conflicts: AtomicUsize,
    updates: AtomicUsize,
}

impl ContendedNodes {
    fn new(inner: Arc<InMemoryNodeRepository>) -> Self {
        Self {
            inner,
            conflicts: AtomicUsize::new(0),
            updates: AtomicUsize::new(0),
        }
    }

    /// Fail the next `n` updates with a version conflict.
    fn contend(&self, n: usize) {
        self.conflicts.store(n, Ordering::SeqCst);
    }

    fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NodeRepository for ContendedNodes {
    async fn insert(&self, node: &Node) -> Result<(), RepositoryError> {
        self.inner.insert(node).await
    }

    async fn update(&self, node: &Node) -> Result<Node, RepositoryError> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        let lost = self
            .conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if lost {
            return Err(RepositoryError::Conflict {
                id: node.id.to_string(),
                expected: node.version,
                actual: node.version + 1,
            });
        }
        self.inner.update(node).await
    }

    async fn find_by_id(&self, id: NodeId) -> Result<Option<Node>, RepositoryError> {
        self.inner.find_by_id(id).await
    }

    async fn list_all(&self) -> Result<Vec<Node>, RepositoryError> {
        self.inner.list_all().await
    }
}

struct Harness {
    dispatcher: Arc<OperationDispatcher>,
    nodes: Arc<InMemoryNodeRepository>,
    queue: PendingCompletionQueue,
    event_bus: Arc<EventBus>,
    resumed_with: Arc<Mutex<Vec<Value>>>,
    concluded: Arc<Mutex<Vec<SubtreeConcluded>>>,
}

impl Harness {
    fn new() -> Self {
        let nodes = Arc::new(InMemoryNodeRepository::new());
        let queue = PendingCompletionQueue::new();
        Self::build(nodes.clone(), nodes, Arc::new(queue.clone()), queue)
    }

    /// Harness whose dispatcher submits to `provider` instead of the queue.
    fn with_provider(provider: Arc<dyn CompletionProvider>) -> Self {
        let nodes = Arc::new(InMemoryNodeRepository::new());
        Self::build(nodes.clone(), nodes, provider, PendingCompletionQueue::new())
    }

    /// Harness whose dispatcher writes through `store`; `nodes` is the
    /// backing store the assertions read.
    fn with_store(nodes: Arc<InMemoryNodeRepository>, store: Arc<dyn NodeRepository>) -> Self {
        let queue = PendingCompletionQueue::new();
        Self::build(nodes, store, Arc::new(queue.clone()), queue)
    }

    fn build(
        nodes: Arc<InMemoryNodeRepository>,
        store: Arc<dyn NodeRepository>,
        provider: Arc<dyn CompletionProvider>,
        queue: PendingCompletionQueue,
    ) -> Self {
        let resumed_with = Arc::new(Mutex::new(Vec::new()));
        let concluded = Arc::new(Mutex::new(Vec::new()));

        let mut registry = ActionRegistry::new();
        registry
            .register(ActionRegistration::new(
                "test/x",
                Arc::new(BlockThenConclude {
                    resumed_with: resumed_with.clone(),
                }),
            ))
            .register(ActionRegistration::new(
                "test/spawner",
                Arc::new(Spawner {
                    concluded: concluded.clone(),
                }),
            ))
            .register(ActionRegistration::new("test/idle", Arc::new(Idle)))
            .register(ActionRegistration::new("test/broken", Arc::new(Broken)))
            .register(ActionRegistration::new("test/needs_key", Arc::new(Idle)).requires(["API_KEY"]));

        let event_bus = Arc::new(EventBus::new(256));
        let dispatcher = Arc::new(OperationDispatcher::new(
            store,
            Arc::new(registry),
            provider,
            event_bus.clone(),
            DispatchSettings::new(SwarmId::new()),
        ));

        Self {
            dispatcher,
            nodes,
            queue,
            event_bus,
            resumed_with,
            concluded,
        }
    }

    async fn node(&self, id: NodeId) -> Node {
        self.nodes.find_by_id(id).await.unwrap().expect("node exists")
    }

    /// Spawn a node and return its id along with what its entry produced.
    async fn spawn(
        &self,
        action_id: &str,
        parent: Option<NodeId>,
        policy: TerminationPolicy,
    ) -> (NodeId, Vec<SwarmOperation>) {
        let id = NodeId::new();
        let embryo = NodeEmbryo::new(action_id, "go");
        let op = match parent {
            Some(parent) => SpawnOperation::child(parent, embryo),
            None => SpawnOperation::root(embryo),
        }
        .with_child_node_id(id)
        .with_termination_policy(policy);

        let produced = self.dispatcher.dispatch(op.into()).await.unwrap();
        (id, produced)
    }

    /// Root spawner with its two idle children, plus one grandchild under the
    /// first child.
    async fn family(&self, policy: TerminationPolicy) -> (NodeId, Vec<NodeId>, NodeId) {
        let (root, produced) = self.spawn("test/spawner", None, policy).await;
        let mut children = Vec::new();
        for op in produced {
            let SwarmOperation::Spawn(spawn) = op else {
                panic!("spawner only produces spawns");
            };
            assert_eq!(spawn.node_id, Some(root));
            let id = NodeId::new();
            self.dispatcher
                .dispatch(spawn.with_child_node_id(id).into())
                .await
                .unwrap();
            children.push(id);
        }
        let (grandchild, _) = self.spawn("test/idle", Some(children[0]), TerminationPolicy::Simple).await;
        (root, children, grandchild)
    }

    async fn assert_no_dead_node_is_blocked(&self) {
        for node in self.nodes.list_all().await.unwrap() {
            if !node.is_alive() {
                assert!(node.blocking_context().is_none(), "dead node {} still blocked", node.id);
            }
        }
    }
}

#[tokio::test]
async fn test_spawn_block_resume_terminate_scenario() {
    let h = Harness::new();

    let (a, produced) = h.spawn("test/x", None, TerminationPolicy::Simple).await;
    assert_eq!(produced.len(), 1);
    let SwarmOperation::Blocking(blocking) = produced[0].clone() else {
        panic!("expected blocking operation, got {:?}", produced[0]);
    };
    assert_eq!(blocking.node_id, a);
    assert_eq!(h.node(a).await.status(), NodeStatus::Running);

    let produced = h.dispatcher.dispatch(blocking.into()).await.unwrap();
    assert!(produced.is_empty());
    let node = h.node(a).await;
    assert_eq!(node.status(), NodeStatus::Blocked);
    assert_eq!(
        node.blocking_context().unwrap().next_function_to_call,
        "handle_result"
    );

    let request = h.queue.take(a).await.expect("completion requested");
    assert_eq!(request.blocking_type, BlockingType::Completion);
    assert_eq!(request.args, json!({ "prompt": "go" }));

    let produced = h.dispatcher.resume(a, json!(42)).await.unwrap();
    assert_eq!(
        h.resumed_with.lock().unwrap().as_slice(),
        &[json!({ "attempt": 1, "result": 42 })]
    );
    assert!(h.node(a).await.blocking_context().is_none());
    assert_eq!(produced.len(), 1);
    assert!(matches!(&produced[0], SwarmOperation::Terminate(t) if t.target_node_id == a));

    let follow_up = h.dispatcher.dispatch(produced[0].clone()).await.unwrap();
    assert!(follow_up.is_empty(), "root has nobody to notify");
    let node = h.node(a).await;
    assert!(!node.is_alive());
    assert!(!node.is_failed());
    assert_eq!(node.report(), Some("answer: 42"));

    let again = h
        .dispatcher
        .dispatch(TerminationOperation::of_self(a).into())
        .await
        .unwrap();
    assert!(again.is_empty());
    assert_eq!(h.node(a).await, node, "second terminate changes nothing");

    h.assert_no_dead_node_is_blocked().await;
}

#[tokio::test]
async fn test_resume_without_blocking_context_is_stale() {
    let h = Harness::new();
    let (a, _) = h.spawn("test/idle", None, TerminationPolicy::Simple).await;
    let before = h.node(a).await;

    let err = h.dispatcher.resume(a, json!("late")).await.unwrap_err();
    assert!(matches!(err, DispatchError::StaleResume(id) if id == a));
    assert_eq!(h.node(a).await, before);

    let err = h.dispatcher.resume(NodeId::new(), json!(1)).await.unwrap_err();
    assert!(matches!(err, DispatchError::NodeNotFound(_)));
}

#[tokio::test]
async fn test_resume_is_claimed_once() {
    let h = Harness::new();
    let (a, produced) = h.spawn("test/x", None, TerminationPolicy::Simple).await;
    h.dispatcher.dispatch(produced[0].clone()).await.unwrap();

    h.dispatcher.resume(a, json!("first")).await.unwrap();
    let claimed = h.node(a).await;

    let err = h.dispatcher.resume(a, json!("second")).await.unwrap_err();
    assert!(matches!(err, DispatchError::StaleResume(_)));
    assert_eq!(h.node(a).await, claimed);
    assert_eq!(h.resumed_with.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_terminate_wins_over_late_resume() {
    let h = Harness::new();
    let (a, produced) = h.spawn("test/x", None, TerminationPolicy::Simple).await;
    h.dispatcher.dispatch(produced[0].clone()).await.unwrap();

    h.dispatcher
        .dispatch(TerminationOperation::of_self(a).into())
        .await
        .unwrap();
    let terminated = h.node(a).await;
    assert!(terminated.blocking_context().is_none());

    let err = h.dispatcher.resume(a, json!(42)).await.unwrap_err();
    assert!(matches!(err, DispatchError::StaleResume(_)));
    assert_eq!(h.node(a).await, terminated);
    assert!(h.resumed_with.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_second_blocking_operation_is_rejected() {
    let h = Harness::new();
    let (a, produced) = h.spawn("test/x", None, TerminationPolicy::Simple).await;
    h.dispatcher.dispatch(produced[0].clone()).await.unwrap();

    let err = h
        .dispatcher
        .dispatch(BlockingOperation::new(a, BlockingType::UserInput, "other").into())
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::AlreadyBlocked(id) if id == a));
    assert_eq!(
        h.node(a).await.blocking_context().unwrap().next_function_to_call,
        "handle_result"
    );
}

#[tokio::test]
async fn test_user_communication_suspends_for_user_input() {
    let h = Harness::new();
    let (a, _) = h.spawn("test/idle", None, TerminationPolicy::Simple).await;

    let produced = h
        .dispatcher
        .dispatch(
            UserCommunicationOperation::new(a, "Which browser engine?", "handle_reply")
                .with_context(json!({ "step": "clarify" }))
                .into(),
        )
        .await
        .unwrap();
    assert!(produced.is_empty());

    let context = h.node(a).await.blocking_context().cloned().unwrap();
    assert_eq!(context.blocking_type, BlockingType::UserInput);
    assert_eq!(context.args, json!({ "message": "Which browser engine?" }));
    assert_eq!(context.context, json!({ "step": "clarify" }));

    let request = h.queue.pop_next().await.unwrap();
    assert_eq!(request.node_id, a);
    assert_eq!(request.blocking_type, BlockingType::UserInput);
}

#[tokio::test]
async fn test_cascading_termination_kills_every_descendant() {
    let h = Harness::new();
    let (root, children, grandchild) = h.family(TerminationPolicy::Cascading).await;
    assert_eq!(h.node(root).await.children_ids(), children.as_slice());

    h.dispatcher
        .dispatch(TerminationOperation::of_self(root).into())
        .await
        .unwrap();

    assert!(!h.node(root).await.is_alive());
    for id in children.iter().chain([&grandchild]) {
        let node = h.node(*id).await;
        assert!(!node.is_alive(), "descendant {} survived", id);
        assert!(!node.is_failed());
    }
    h.assert_no_dead_node_is_blocked().await;
}

#[tokio::test]
async fn test_cascade_descends_through_already_dead_nodes() {
    let h = Harness::new();
    let (root, children, grandchild) = h.family(TerminationPolicy::Cascading).await;

    // Kill the middle node first; its own policy is simple.
    h.dispatcher
        .dispatch(FailureOperation::new(children[0]).with_reason("gave up").into())
        .await
        .unwrap();
    assert!(h.node(grandchild).await.is_alive());

    h.dispatcher
        .dispatch(TerminationOperation::of_self(root).into())
        .await
        .unwrap();
    assert!(!h.node(grandchild).await.is_alive());
    assert!(h.node(children[0]).await.is_failed(), "failure flag is kept");
}

#[tokio::test]
async fn test_simple_termination_leaves_children_alive() {
    let h = Harness::new();
    let (root, children, grandchild) = h.family(TerminationPolicy::Simple).await;

    h.dispatcher
        .dispatch(TerminationOperation::of_self(root).into())
        .await
        .unwrap();

    assert!(!h.node(root).await.is_alive());
    for id in children.iter().chain([&grandchild]) {
        assert!(h.node(*id).await.is_alive());
    }
}

#[tokio::test]
async fn test_terminator_is_notified_of_concluded_subtree() {
    let h = Harness::new();
    let (root, children, _) = h.family(TerminationPolicy::Simple).await;

    let produced = h
        .dispatcher
        .dispatch(
            TerminationOperation::new(root, children[1])
                .with_context(json!({ "why": "enough" }))
                .into(),
        )
        .await
        .unwrap();

    assert_eq!(produced.len(), 1);
    let SwarmOperation::Action(action) = produced[0].clone() else {
        panic!("expected action operation, got {:?}", produced[0]);
    };
    assert_eq!(action.node_id, root);
    assert_eq!(action.function_to_call, "on_subtree_concluded");

    let follow_up = h.dispatcher.dispatch(action.into()).await.unwrap();
    assert!(follow_up.is_empty());

    let concluded = h.concluded.lock().unwrap().clone();
    assert_eq!(concluded.len(), 1);
    assert_eq!(concluded[0].concluded_node_id, children[1]);
    assert_eq!(concluded[0].context, Some(json!({ "why": "enough" })));
    assert!(!concluded[0].failed);
}

#[tokio::test]
async fn test_self_termination_notifies_live_parent() {
    let h = Harness::new();
    let (root, children, _) = h.family(TerminationPolicy::Simple).await;

    let produced = h
        .dispatcher
        .dispatch(TerminationOperation::of_self(children[1]).with_report("done").into())
        .await
        .unwrap();
    assert_eq!(produced.len(), 1);
    assert!(matches!(&produced[0], SwarmOperation::Action(a) if a.node_id == root));

    h.dispatcher
        .dispatch(TerminationOperation::of_self(root).into())
        .await
        .unwrap();
    let produced = h
        .dispatcher
        .dispatch(TerminationOperation::of_self(children[0]).into())
        .await
        .unwrap();
    assert!(produced.is_empty(), "dead parents are not notified");
}

#[tokio::test]
async fn test_action_operation_on_dead_node_is_noop() {
    let h = Harness::new();
    let (root, _, _) = h.family(TerminationPolicy::Simple).await;
    h.dispatcher
        .dispatch(TerminationOperation::of_self(root).into())
        .await
        .unwrap();

    let produced = h
        .dispatcher
        .dispatch(ActionOperation::new(root, "on_subtree_concluded").into())
        .await
        .unwrap();
    assert!(produced.is_empty());
    assert!(h.concluded.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_failure_is_idempotent_and_does_not_cascade() {
    let h = Harness::new();
    let (root, children, grandchild) = h.family(TerminationPolicy::Cascading).await;
    let mut events = h.event_bus.subscribe();

    for _ in 0..2 {
        let produced = h
            .dispatcher
            .dispatch(FailureOperation::new(root).with_reason("out of budget").into())
            .await
            .unwrap();
        assert!(produced.is_empty());
    }

    let node = h.node(root).await;
    assert!(!node.is_alive());
    assert!(node.is_failed());
    assert_eq!(node.failure_reason(), Some("out of budget"));
    for id in children.iter().chain([&grandchild]) {
        assert!(h.node(*id).await.is_alive());
    }

    let failed_events = events
        .drain()
        .into_iter()
        .filter(|e| matches!(e, NodeEvent::NodeFailed { .. }))
        .count();
    assert_eq!(failed_events, 1);
}

#[tokio::test]
async fn test_unknown_operation_type_is_rejected() {
    let h = Harness::new();
    let err = h
        .dispatcher
        .dispatch_value(json!({ "operation_type": "teleport", "node_id": NodeId::new() }))
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::UnknownOperationType(ref t) if t == "teleport"));
    assert!(h.nodes.list_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_dispatch_value_accepts_wire_operations() {
    let h = Harness::new();
    let produced = h
        .dispatcher
        .dispatch_value(json!({
            "operation_type": "spawn",
            "node_embryo": { "action_id": "test/spawner", "message": "plan" },
            "termination_policy": "cascading"
        }))
        .await
        .unwrap();
    assert_eq!(produced.len(), 2);

    let roots: Vec<Node> = h.nodes.list_all().await.unwrap();
    assert_eq!(roots.len(), 1);
    assert_eq!(roots[0].termination_policy, TerminationPolicy::Cascading);
}

#[tokio::test]
async fn test_missing_config_fails_spawned_node_and_names_key() {
    let h = Harness::new();
    let id = NodeId::new();

    let err = h
        .dispatcher
        .dispatch(
            SpawnOperation::root(NodeEmbryo::new("test/needs_key", "go"))
                .with_child_node_id(id)
                .into(),
        )
        .await
        .unwrap_err();

    match err {
        DispatchError::Resolve(ResolveError::MissingConfig { key, .. }) => assert_eq!(key, "API_KEY"),
        other => panic!("expected missing config, got {:?}", other),
    }

    let node = h.node(id).await;
    assert!(!node.is_alive());
    assert!(node.is_failed());
}

#[tokio::test]
async fn test_unregistered_action_fails_spawned_node() {
    let h = Harness::new();
    let id = NodeId::new();

    let err = h
        .dispatcher
        .dispatch(
            SpawnOperation::root(NodeEmbryo::new("swarm/missing", "go"))
                .with_child_node_id(id)
                .into(),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DispatchError::Resolve(ResolveError::NotRegistered { ref action_id }) if action_id == "swarm/missing"
    ));
    assert_eq!(h.node(id).await.status(), NodeStatus::Failed);
}

#[tokio::test]
async fn test_action_error_fails_node() {
    let h = Harness::new();
    let id = NodeId::new();

    let err = h
        .dispatcher
        .dispatch(
            SpawnOperation::root(NodeEmbryo::new("test/broken", "go"))
                .with_child_node_id(id)
                .into(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::Action { node_id, .. } if node_id == id));
    assert_eq!(h.node(id).await.failure_reason(), Some("action failed: model unreachable"));
}

#[tokio::test]
async fn test_spawn_under_dead_or_missing_parent() {
    let h = Harness::new();
    let (parent, _) = h.spawn("test/idle", None, TerminationPolicy::Simple).await;
    h.dispatcher
        .dispatch(TerminationOperation::of_self(parent).into())
        .await
        .unwrap();

    let err = h
        .dispatcher
        .dispatch(SpawnOperation::child(parent, NodeEmbryo::new("test/idle", "late")).into())
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::ParentNotAlive(id) if id == parent));
    assert!(h.node(parent).await.children_ids().is_empty());

    let ghost = NodeId::new();
    let err = h
        .dispatcher
        .dispatch(SpawnOperation::child(ghost, NodeEmbryo::new("test/idle", "orphan")).into())
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::MissingParent(id) if id == ghost));
    assert_eq!(err.to_string(), format!("parent node {} not found", ghost));
    assert_eq!(h.nodes.list_all().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_driver_drains_queue_and_reports_spawns() {
    let h = Harness::new();
    let driver = SwarmDriver::new(h.dispatcher.clone());

    let summary = driver
        .run([SwarmOperation::from(SpawnOperation::root(NodeEmbryo::new("test/spawner", "plan")))])
        .await
        .unwrap();

    assert_eq!(summary.dispatched, 3);
    assert_eq!(summary.spawned.len(), 3);
    assert!(summary.is_clean());

    let root = h.node(summary.spawned[0]).await;
    assert_eq!(root.children_ids(), &summary.spawned[1..]);
}

#[tokio::test]
async fn test_driver_resume_continues_until_quiet() {
    let h = Harness::new();
    let driver = SwarmDriver::new(h.dispatcher.clone());

    let summary = driver
        .run([SwarmOperation::from(SpawnOperation::root(NodeEmbryo::new("test/x", "question")))])
        .await
        .unwrap();
    assert_eq!(summary.dispatched, 2, "spawn then blocking");

    let request = h.queue.pop_next().await.unwrap();
    let summary = driver.resume(request.node_id, json!("yes")).await.unwrap();
    assert_eq!(summary.dispatched, 1, "self termination");
    assert!(!h.node(request.node_id).await.is_alive());
}

#[tokio::test]
async fn test_driver_records_failures_and_keeps_going() {
    let h = Harness::new();
    let driver = SwarmDriver::new(h.dispatcher.clone());

    let summary = driver
        .run([
            SwarmOperation::from(SpawnOperation::root(NodeEmbryo::new("test/broken", "a"))),
            SwarmOperation::from(SpawnOperation::root(NodeEmbryo::new("test/idle", "b"))),
        ])
        .await
        .unwrap();

    assert_eq!(summary.dispatched, 2);
    assert_eq!(summary.spawned.len(), 2);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(h.node(summary.spawned[0]).await.status(), NodeStatus::Failed);
    assert_eq!(h.node(summary.spawned[1]).await.status(), NodeStatus::Running);
}

#[tokio::test]
async fn test_unavailable_provider_leaves_node_unblocked() {
    let h = Harness::with_provider(Arc::new(OfflineProvider));
    let (a, _) = h.spawn("test/idle", None, TerminationPolicy::Simple).await;

    let err = h
        .dispatcher
        .dispatch(BlockingOperation::new(a, BlockingType::Completion, "handle_result").into())
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::Completion(CompletionError::Unavailable(_))));

    let node = h.node(a).await;
    assert!(node.is_alive());
    assert_eq!(node.status(), NodeStatus::Running);
    assert!(node.blocking_context().is_none());

    // Nothing is left to resume, and the node can block again.
    let err = h.dispatcher.resume(a, json!("late")).await.unwrap_err();
    assert!(matches!(err, DispatchError::StaleResume(_)));
    let err = h
        .dispatcher
        .dispatch(UserCommunicationOperation::new(a, "still there?", "handle_reply").into())
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::Completion(_)), "not AlreadyBlocked");
}

#[tokio::test]
async fn test_direct_resume_then_reblock_queues_one_request() {
    let h = Harness::new();
    let (a, produced) = h.spawn("test/x", None, TerminationPolicy::Simple).await;
    h.dispatcher.dispatch(produced[0].clone()).await.unwrap();

    // Answered without popping the queued request; the produced termination
    // is not dispatched, so the node stays alive.
    h.dispatcher.resume(a, json!("answer")).await.unwrap();
    assert!(h.node(a).await.is_alive());

    h.dispatcher
        .dispatch(
            BlockingOperation::new(a, BlockingType::UserInput, "handle_result")
                .with_args(json!({ "message": "again" }))
                .into(),
        )
        .await
        .unwrap();

    let pending = h.queue.list_pending().await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].node_id, a);
    assert_eq!(pending[0].blocking_type, BlockingType::UserInput);
    assert_eq!(pending[0].args, json!({ "message": "again" }));
}

#[tokio::test]
async fn test_version_conflict_is_retried() {
    let nodes = Arc::new(InMemoryNodeRepository::new());
    let contended = Arc::new(ContendedNodes::new(nodes.clone()));
    let h = Harness::with_store(nodes, contended.clone());
    let (a, _) = h.spawn("test/idle", None, TerminationPolicy::Simple).await;
    let before = h.node(a).await;
    let updates = contended.updates();

    contended.contend(1);
    h.dispatcher
        .dispatch(TerminationOperation::of_self(a).with_report("done").into())
        .await
        .unwrap();

    assert_eq!(contended.updates() - updates, 2, "one lost race, one write");
    let node = h.node(a).await;
    assert!(!node.is_alive());
    assert_eq!(node.report(), Some("done"));
    assert_eq!(node.version, before.version + 1);
}

#[tokio::test]
async fn test_persistent_version_conflict_gives_up() {
    let nodes = Arc::new(InMemoryNodeRepository::new());
    let contended = Arc::new(ContendedNodes::new(nodes.clone()));
    let h = Harness::with_store(nodes, contended.clone());
    let (a, _) = h.spawn("test/idle", None, TerminationPolicy::Simple).await;
    let before = h.node(a).await;
    let updates = contended.updates();

    contended.contend(usize::MAX);
    let err = h
        .dispatcher
        .dispatch(FailureOperation::new(a).with_reason("crashed").into())
        .await
        .unwrap_err();

    assert!(matches!(err, DispatchError::Repository(RepositoryError::Conflict { .. })));
    assert_eq!(contended.updates() - updates, 3, "default update attempts");
    assert_eq!(h.node(a).await, before);
}

#[tokio::test]
async fn test_driver_records_stale_resume() {
    let h = Harness::new();
    let driver = SwarmDriver::new(h.dispatcher.clone());

    driver
        .run([SwarmOperation::from(SpawnOperation::root(NodeEmbryo::new("test/x", "question")))])
        .await
        .unwrap();
    let request = h.queue.pop_next().await.unwrap();
    driver
        .run([SwarmOperation::from(TerminationOperation::of_self(request.node_id))])
        .await
        .unwrap();

    let summary = driver.resume(request.node_id, json!("too late")).await.unwrap();
    assert_eq!(summary.dispatched, 0);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].node_id, Some(request.node_id));
    assert!(summary.failures[0].error.contains("stale"));
    assert!(h.resumed_with.lock().unwrap().is_empty());
}
