//! End-to-end workflow scenarios against the public API.

use std::process::Command;
use std::sync::{Arc, Mutex};

use serde_json::{json, Map, Value};
use tempfile::tempdir;

use procflow::execution::{Engine, ExecutionStatus, RunRequest, WorkflowExecution};
use procflow::handlers::HandlerServices;
use procflow::notify::{Notification, Notifier, NotifyError};
use procflow::policy::{InMemoryPolicyStore, Policy};
use procflow::store::{
    FileExecutionStore, FileWorkflowStore, InMemoryExecutionStore, InMemoryWorkflowStore,
};
use procflow::workflow::{parse_workflow, WorkflowDefinition};
use procflow::EngineError;

const REVIEW_WORKFLOW: &str = r#"
id: product-review
name: Product review
steps:
  - step_id: check_owner
    type: validation
    config:
      rule: "owner != null"
    on_pass: approve
    on_fail: reject_missing_owner
  - step_id: approve
    type: approval
    config:
      approvers: domain_owners
    on_pass: mark_certified
    on_fail: notify_rejected
  - step_id: mark_certified
    type: assign_tag
    config:
      key: certified_by
      value_source: current_user
    on_pass: done
  - step_id: done
    type: pass
  - step_id: notify_rejected
    type: notification
    config:
      recipients: requester
      template: product_rejected
    on_pass: rejected
  - step_id: rejected
    type: fail
    config:
      message: Product was rejected
  - step_id: reject_missing_owner
    type: fail
    config:
      message: Every data product needs an owner
"#;

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

fn review_workflow() -> WorkflowDefinition {
    parse_workflow(REVIEW_WORKFLOW).unwrap()
}

fn object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
}

fn request(entity: Value) -> RunRequest {
    RunRequest::new("data_product", "dp-42", object(entity))
        .with_entity_name("Customer 360")
        .with_actor("requester@x.com")
}

fn memory_engine(workflows: &[&WorkflowDefinition]) -> Engine {
    let store = InMemoryWorkflowStore::new();
    for workflow in workflows {
        store.insert((*workflow).clone()).unwrap();
    }
    Engine::new(Arc::new(InMemoryExecutionStore::new()), Arc::new(store))
}

fn assert_tallies_match(execution: &WorkflowExecution) {
    let records = execution.step_executions.len() as u32;
    assert_eq!(execution.success_count + execution.failure_count, records);
    let passed = execution.step_executions.iter().filter(|r| r.passed).count() as u32;
    assert_eq!(execution.success_count, passed);
}

#[test]
fn validation_failure_routes_to_fail_step() {
    let workflow = review_workflow();
    let engine = memory_engine(&[&workflow]);

    let execution = engine.run(&workflow, request(json!({"size": 3}))).unwrap();

    assert_eq!(execution.status, ExecutionStatus::Failed);
    assert_eq!(
        execution.error_message.as_deref(),
        Some("Every data product needs an owner")
    );
    let visited: Vec<&str> = execution
        .step_executions
        .iter()
        .map(|r| r.step_id.as_str())
        .collect();
    assert_eq!(visited, ["check_owner", "reject_missing_owner"]);
    assert_eq!(execution.failure_count, 2);
    assert!(execution.finished_at.is_some());
    assert_tallies_match(&execution);
}

#[test]
fn approval_pauses_then_rejection_notifies_and_fails() {
    let workflow = review_workflow();
    let notifier = Arc::new(RecordingNotifier::default());
    let mut engine = memory_engine(&[&workflow]);
    engine.set_services(HandlerServices::default().with_notifier(notifier.clone()));

    let paused = engine
        .run(
            &workflow,
            request(json!({"owner": "o@x.com", "domain_owners": ["d1@x.com", "d2@x.com"]})),
        )
        .unwrap();

    assert_eq!(paused.status, ExecutionStatus::Paused);
    assert_eq!(paused.current_step_id.as_deref(), Some("approve"));
    assert_eq!(paused.step_executions.len(), 2);
    assert!(paused.finished_at.is_none());

    let approval = paused.last_record_for("approve").unwrap();
    assert!(approval.blocking);
    assert_eq!(
        approval.result_data.as_ref().unwrap()["approvers"],
        json!(["d1@x.com", "d2@x.com"])
    );

    let done = engine
        .resume(&paused.id, false, Some(object(json!({"comment": "not yet"}))))
        .unwrap();

    assert_eq!(done.status, ExecutionStatus::Failed);
    assert_eq!(done.error_message.as_deref(), Some("Product was rejected"));
    assert_eq!(done.current_step_id, None);
    // Two from the first call, two after resume; none for the decision itself.
    assert_eq!(done.step_executions.len(), 4);
    assert_eq!(done.step_executions[..2], paused.step_executions[..]);
    assert_tallies_match(&done);

    let sent = notifier.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipients, vec!["requester@x.com".to_string()]);
    assert_eq!(sent[0].message, "Data product 'Customer 360' has been rejected");
    assert_eq!(sent[0].execution_id, done.id);
}

#[test]
fn approval_then_approve_tags_entity() {
    let workflow = review_workflow();
    let engine = memory_engine(&[&workflow]);

    let paused = engine
        .run(&workflow, request(json!({"owner": "o@x.com"})))
        .unwrap();
    let done = engine.resume(&paused.id, true, None).unwrap();

    assert_eq!(done.status, ExecutionStatus::Succeeded);
    assert_eq!(done.entity["tags"]["certified_by"], "requester@x.com");
    assert_eq!(done.step_executions.len(), 4);
    assert_eq!(done.success_count, 4);
    assert_eq!(done.failure_count, 0);
}

#[test]
fn rejection_without_fail_branch_names_the_step() {
    let workflow = parse_workflow(
        r#"
id: gate
name: Gate
steps:
  - step_id: sign_off
    type: approval
    config:
      approvers: lead@x.com
    on_pass: done
  - step_id: done
    type: pass
"#,
    )
    .unwrap();
    let engine = memory_engine(&[&workflow]);

    let paused = engine.run(&workflow, request(json!({}))).unwrap();
    let done = engine.resume(&paused.id, false, None).unwrap();

    assert_eq!(done.status, ExecutionStatus::Failed);
    assert_eq!(done.error_message.as_deref(), Some("Rejected at step sign_off"));
    assert_eq!(done.step_executions.len(), 1);
}

#[test]
fn false_condition_without_fail_branch_ends_failed() {
    let workflow = parse_workflow(
        r#"
id: tiering
name: Tiering
steps:
  - step_id: is_gold
    type: conditional
    config:
      condition: "tier IN [1, 2]"
    on_pass: tag_gold
  - step_id: tag_gold
    type: assign_tag
    config:
      key: tier
      value: gold
"#,
    )
    .unwrap();
    let engine = memory_engine(&[&workflow]);

    let execution = engine.run(&workflow, request(json!({"tier": 3}))).unwrap();

    assert_eq!(execution.status, ExecutionStatus::Failed);
    assert_eq!(
        execution.error_message.as_deref(),
        Some("Condition evaluated to: false")
    );
    assert_eq!(execution.step_executions.len(), 1);
    assert!(execution.step_executions[0].error_message.is_none());
    assert!(!execution.entity.contains_key("tags"));
}

#[test]
fn repeated_tag_steps_are_idempotent() {
    let workflow = parse_workflow(
        r#"
id: tagging
name: Tagging
steps:
  - {step_id: first, type: assign_tag, config: {key: domain, value: finance}, on_pass: second}
  - {step_id: second, type: assign_tag, config: {key: domain, value: finance}, on_pass: drop}
  - {step_id: drop, type: remove_tag, config: {key: legacy}, on_pass: drop_again}
  - {step_id: drop_again, type: remove_tag, config: {key: legacy}}
"#,
    )
    .unwrap();
    let engine = memory_engine(&[&workflow]);

    let execution = engine
        .run(&workflow, request(json!({"tags": {"legacy": "yes", "pii": "no"}})))
        .unwrap();

    assert_eq!(execution.status, ExecutionStatus::Succeeded);
    assert_eq!(
        Value::Object(execution.entity.clone())["tags"],
        json!({"domain": "finance", "pii": "no"})
    );
    assert_tallies_match(&execution);
}

#[test]
fn caller_entity_is_not_mutated() {
    let workflow = parse_workflow(
        r#"
id: tag-only
steps:
  - {step_id: tag, type: assign_tag, config: {key: reviewed, value: "yes"}}
"#,
    )
    .unwrap();
    let engine = memory_engine(&[&workflow]);
    let entity = object(json!({"name": "x"}));

    let execution = engine
        .run(&workflow, RunRequest::new("data_product", "dp-1", entity.clone()))
        .unwrap();

    assert_eq!(execution.entity["tags"]["reviewed"], "yes");
    assert!(!entity.contains_key("tags"));
}

#[test]
fn unknown_step_kind_takes_fail_branch() {
    let workflow = parse_workflow(
        r#"
id: odd
steps:
  - {step_id: warp, type: teleport, on_fail: fallback}
  - {step_id: fallback, type: pass}
"#,
    )
    .unwrap();
    let engine = memory_engine(&[&workflow]);

    let execution = engine.run(&workflow, request(json!({}))).unwrap();

    assert_eq!(execution.status, ExecutionStatus::Succeeded);
    assert_eq!(
        execution.step_executions[0].error_message.as_deref(),
        Some("Unknown step type: teleport")
    );
    assert_eq!(execution.failure_count, 1);
    assert_eq!(execution.success_count, 1);
}

#[test]
fn dangling_reference_fails_after_recording_step() {
    let workflow = parse_workflow(
        r#"
id: dangling
steps:
  - {step_id: start, type: pass, on_pass: nowhere}
"#,
    )
    .unwrap();
    let engine = memory_engine(&[&workflow]);

    let execution = engine.run(&workflow, request(json!({}))).unwrap();

    assert_eq!(execution.status, ExecutionStatus::Failed);
    assert_eq!(execution.error_message.as_deref(), Some("Step not found: nowhere"));
    assert_eq!(execution.step_executions.len(), 1);
}

#[test]
fn policy_check_uses_configured_store() {
    let workflow = parse_workflow(
        r#"
id: compliance
steps:
  - {step_id: owner_policy, type: policy_check, config: {policy_id: owner-required}}
"#,
    )
    .unwrap();
    let policies = InMemoryPolicyStore::with_policies([Policy::new(
        "owner-required",
        "Owner required",
        "owner != null",
    )
    .with_failure_message("Assign an owner first.")]);
    let mut engine = memory_engine(&[&workflow]);
    engine.set_services(HandlerServices::default().with_policies(Arc::new(policies)));

    let passed = engine
        .run(&workflow, request(json!({"owner": "o@x.com"})))
        .unwrap();
    assert_eq!(passed.status, ExecutionStatus::Succeeded);

    let failed = engine.run(&workflow, request(json!({}))).unwrap();
    assert_eq!(failed.status, ExecutionStatus::Failed);
    assert!(failed
        .error_message
        .unwrap()
        .starts_with("Assign an owner first.\n\nTechnical: "));
}

#[test]
fn resume_errors_are_typed() {
    let workflow = review_workflow();
    // The workflow is never registered, so resume cannot find it.
    let engine = memory_engine(&[]);

    let paused = engine
        .run(&workflow, request(json!({"owner": "o@x.com"})))
        .unwrap();
    assert_eq!(paused.status, ExecutionStatus::Paused);

    assert!(matches!(
        engine.resume(&paused.id, true, None),
        Err(EngineError::WorkflowNotFound(id)) if id == "product-review"
    ));
    assert!(matches!(
        engine.resume("missing", true, None),
        Err(EngineError::ExecutionNotFound(_))
    ));

    // The failed attempt left the execution paused.
    let stored = engine.get_execution(&paused.id).unwrap().unwrap();
    assert_eq!(stored.status, ExecutionStatus::Paused);
}

#[test]
fn second_resume_is_rejected() {
    let workflow = review_workflow();
    let engine = memory_engine(&[&workflow]);

    let paused = engine
        .run(&workflow, request(json!({"owner": "o@x.com"})))
        .unwrap();
    engine.resume(&paused.id, true, None).unwrap();

    assert!(matches!(
        engine.resume(&paused.id, false, None),
        Err(EngineError::NotPaused { .. })
    ));
}

#[test]
fn resume_after_reopening_file_store() {
    let temp_dir = tempdir().unwrap();
    let workflow = review_workflow();

    let paused_id = {
        let workflows = Arc::new(FileWorkflowStore::open(temp_dir.path()).unwrap());
        workflows.save(&workflow).unwrap();
        let executions = Arc::new(FileExecutionStore::open(temp_dir.path()).unwrap());
        let engine = Engine::new(executions, workflows);

        let paused = engine
            .run(&workflow, request(json!({"owner": "o@x.com"})))
            .unwrap();
        assert_eq!(paused.status, ExecutionStatus::Paused);
        paused.id
    };

    // A fresh process: new stores over the same directory.
    let executions = Arc::new(FileExecutionStore::open(temp_dir.path()).unwrap());
    let workflows = Arc::new(FileWorkflowStore::open(temp_dir.path()).unwrap());
    let engine = Engine::new(executions, workflows);

    let stored = engine.get_execution(&paused_id).unwrap().unwrap();
    assert_eq!(stored.entity["owner"], "o@x.com");
    assert_eq!(stored.step_executions.len(), 2);

    let done = engine.resume(&paused_id, true, None).unwrap();
    assert_eq!(done.status, ExecutionStatus::Succeeded);
    assert_eq!(done.step_executions.len(), 4);
    assert_eq!(done.entity["tags"]["certified_by"], "requester@x.com");

    let listed = engine.list_executions().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].status, ExecutionStatus::Succeeded);
}

fn python_available() -> bool {
    Command::new("python3")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

#[test]
fn later_step_sees_earlier_rejection_after_second_pause() {
    if !python_available() {
        eprintln!("python3 not available, skipping");
        return;
    }
    let workflow = parse_workflow(
        r#"
id: double-sign-off
steps:
  - {step_id: legal, type: approval, config: {approvers: legal@x.com}, on_pass: finance, on_fail: finance}
  - {step_id: finance, type: approval, config: {approvers: finance@x.com}, on_pass: audit}
  - step_id: audit
    type: script
    config:
      code: |
        legal = step_results['legal']
        result = {'passed': legal['passed'], 'data': {'reason': legal['data'].get('reason')}}
"#,
    )
    .unwrap();
    let engine = memory_engine(&[&workflow]);

    let paused = engine.run(&workflow, request(json!({}))).unwrap();
    let second = engine
        .resume(&paused.id, false, Some(object(json!({"reason": "no docs"}))))
        .unwrap();
    assert_eq!(second.current_step_id.as_deref(), Some("finance"));

    let done = engine.resume(&paused.id, true, None).unwrap();

    assert_eq!(done.status, ExecutionStatus::Failed);
    let audit = done.last_record_for("audit").unwrap();
    assert!(!audit.passed);
    assert_eq!(audit.result_data.as_ref().unwrap()["reason"], "no docs");
}
