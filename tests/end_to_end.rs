//! End-to-end tests: stack file to control plane and back.

use sgw_alerts::config::{expand_stack, ConfigParser, ConfigValidator};
use sgw_alerts::model::{ResourceKind, Stack};
use sgw_alerts::provider::{ControlPlane, LocalControlPlane};
use sgw_alerts::reconciler::Reconciler;
use sgw_alerts::state::{LocalStateStore, StateStore};
use tempfile::TempDir;

const STACK: &str = r#"
project:
  name: storage-gateway-alerts
  environment: test
  region: us-east-1
  account_id: "123456789012"

topics:
  - name: storage-gateway-health-alerts

policies:
  - name: cloudwatch-publish
    topic: storage-gateway-health-alerts
    statements:
      - sid: AllowCloudWatchPublish
        principal:
          service: [cloudwatch.amazonaws.com]
        action: SNS:Publish

alarms:
  - name: sgw-health
    namespace: AWS/StorageGateway
    metric_name: HealthNotifications
    statistic: Sum
    threshold: 1
    comparison_operator: GreaterThanOrEqualToThreshold
    evaluation_periods: 1
    period_secs: 300
    dimensions:
      GatewayId: sgw-12345678
    alarm_actions: [storage-gateway-health-alerts]
    ok_actions: [storage-gateway-health-alerts]
"#;

const TOPIC_ARN: &str = "arn:aws:sns:us-east-1:123456789012:storage-gateway-health-alerts";

fn load_stack(yaml: &str) -> Stack {
    let config = ConfigParser::new().parse_yaml(yaml, None).unwrap();
    let stack = expand_stack(&config).unwrap();
    let result = ConfigValidator::new().validate(&config, &stack).unwrap();
    assert!(result.is_valid(), "unexpected errors: {:?}", result.errors);
    stack
}

#[tokio::test]
async fn test_health_alerting_stack() {
    let stack = load_stack(STACK);
    let dir = TempDir::new().unwrap();
    let store = LocalStateStore::with_base_dir(dir.path());
    let provider = LocalControlPlane::in_memory("us-east-1", Some("123456789012"));
    let reconciler = Reconciler::new(&stack, &store, &provider, "e2e");

    let result = reconciler.apply().await.unwrap();
    assert!(result.success, "apply failed: {:?}", result.errors);
    assert_eq!(result.created, 3);

    let state = store.load().await.unwrap().unwrap();
    assert_eq!(state.resources_of(ResourceKind::Topic).count(), 1);
    assert_eq!(state.resources_of(ResourceKind::Policy).count(), 1);
    assert_eq!(state.resources_of(ResourceKind::Alarm).count(), 1);

    // One policy on the topic, granting the one principal.
    let topic = provider.get_topic(TOPIC_ARN).await.unwrap().unwrap();
    let policy = topic.policy.unwrap();
    assert_eq!(policy.version, "2012-10-17");
    assert_eq!(policy.statements.len(), 1);
    assert_eq!(policy.statements[0].resource, TOPIC_ARN);
    assert_eq!(policy.statements[0].principal["Service"], "cloudwatch.amazonaws.com");
    assert_eq!(policy.statements[0].action, "SNS:Publish");

    // Both action lists hold exactly the topic.
    let alarm = provider.get_metric_alarm("sgw-health").await.unwrap().unwrap();
    assert_eq!(alarm.definition.alarm_actions, vec![TOPIC_ARN.to_string()]);
    assert_eq!(alarm.definition.ok_actions, vec![TOPIC_ARN.to_string()]);
    assert_eq!(alarm.definition.namespace, "AWS/StorageGateway");
    assert_eq!(alarm.definition.dimensions["GatewayId"], "sgw-12345678");

    assert_eq!(provider.counts().await, (1, 1));
}

#[tokio::test]
async fn test_second_plan_is_empty() {
    let stack = load_stack(STACK);
    let dir = TempDir::new().unwrap();
    let store = LocalStateStore::with_base_dir(dir.path());
    let provider = LocalControlPlane::in_memory("us-east-1", Some("123456789012"));
    let reconciler = Reconciler::new(&stack, &store, &provider, "e2e");

    assert_eq!(reconciler.plan().await.unwrap().plan.action_count(), 3);
    assert!(reconciler.apply().await.unwrap().success);

    let changes = reconciler.plan().await.unwrap();
    assert!(changes.plan.is_empty());
    assert!(!changes.diff.has_changes());
    assert!(reconciler.check_drift().await.unwrap().is_converged());
}

#[tokio::test]
async fn test_retargeting_removes_old_topic() {
    let stack = load_stack(STACK);
    let dir = TempDir::new().unwrap();
    let store = LocalStateStore::with_base_dir(dir.path());
    let provider = LocalControlPlane::in_memory("us-east-1", Some("123456789012"));
    assert!(Reconciler::new(&stack, &store, &provider, "e2e").apply().await.unwrap().success);

    // Retargeting everything at a new topic moves the referrers first, so the
    // old topic can go.
    let renamed = load_stack(&STACK.replace("storage-gateway-health-alerts", "sgw-alerts-v2"));
    let result = Reconciler::new(&renamed, &store, &provider, "e2e").apply().await.unwrap();
    assert!(result.success, "apply failed: {:?}", result.errors);
    assert_eq!(result.deleted, 2);

    assert!(provider.get_topic(TOPIC_ARN).await.unwrap().is_none());
    let alarm = provider.get_metric_alarm("sgw-health").await.unwrap().unwrap();
    assert_eq!(
        alarm.definition.alarm_actions,
        vec![String::from("arn:aws:sns:us-east-1:123456789012:sgw-alerts-v2")]
    );
}
