mod common;

use common::{Call, Failure, Harness, ScriptedRemote, SCENARIO_NOW_MS};
use posbindu_core::classify::Measurements;
use posbindu_core::{EntityType, SyncPhase};
use pretty_assertions::assert_eq;

#[tokio::test(flavor = "multi_thread")]
async fn offline_patient_syncs_when_connectivity_returns() {
    let harness = Harness::offline(ScriptedRemote::new()).await;
    harness.engine.attach(&harness.monitor);

    let patient = harness.register("Budi Santoso").await;
    assert_eq!(patient.id, SCENARIO_NOW_MS);
    assert!(patient.code.as_str().starts_with("pasien20231114"));
    assert_eq!(patient.synced_at, None);
    assert_eq!(harness.store().queue_len().await.unwrap(), 1);
    assert!(harness.remote.calls().is_empty());

    assert!(harness.monitor.update(Some(true)));
    harness.wait_idle().await;

    assert_eq!(harness.store().queue_len().await.unwrap(), 0);
    let stored = harness
        .store()
        .get_patient(&patient.code)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.synced_at, Some(SCENARIO_NOW_MS));
    assert_eq!(
        harness.remote.calls(),
        vec![
            Call::CreatePatient(patient.code.to_string()),
            Call::ListPatients
        ]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn patient_commits_before_dependent_examination() {
    let harness = Harness::offline(ScriptedRemote::new()).await;

    let patient = harness.register("Budi Santoso").await;
    let measurements = Measurements {
        height_cm: Some(165.0),
        weight_kg: Some(70.0),
        fasting_glucose: Some(131.0),
        ..Measurements::default()
    };
    harness
        .coordinator
        .record_measurements(&patient.code, None, measurements)
        .await
        .unwrap();

    let items = harness.store().pending_items().await.unwrap();
    assert_eq!(
        items.iter().map(|item| item.entity_type).collect::<Vec<_>>(),
        vec![EntityType::Patient, EntityType::Examination]
    );

    harness.monitor.update(Some(true));
    let report = harness.engine.run_pass().await.unwrap();

    assert_eq!(report.committed, 2);
    assert!(report.is_clean());
    let code = patient.code.to_string();
    assert_eq!(
        harness.remote.calls(),
        vec![
            Call::CreatePatient(code.clone()),
            Call::CreateExamination(code),
            Call::ListPatients
        ]
    );

    let examinations = harness
        .store()
        .list_examinations(&patient.code, 10)
        .await
        .unwrap();
    assert_eq!(examinations.len(), 1);
    assert!(examinations[0].is_synced());
}

#[tokio::test(flavor = "multi_thread")]
async fn examination_waits_while_its_patient_is_still_queued() {
    let remote = ScriptedRemote::new();
    remote.fail_next(Failure::Network, 1);
    let harness = Harness::offline(remote).await;

    let patient = harness.register("Budi Santoso").await;
    harness
        .coordinator
        .record_measurements(
            &patient.code,
            None,
            Measurements {
                systolic: Some(128),
                diastolic: Some(84),
                ..Measurements::default()
            },
        )
        .await
        .unwrap();

    let first = harness.engine.run_pass().await.unwrap();
    assert_eq!((first.retried, first.deferred), (1, 1));
    assert_eq!(harness.remote.create_calls(), 1);

    let items = harness.store().pending_items().await.unwrap();
    assert_eq!(items[0].retry_count, 1);
    assert_eq!(items[1].retry_count, 0);

    let second = harness.engine.run_pass().await.unwrap();
    assert_eq!(second.committed, 2);
    assert_eq!(harness.store().queue_len().await.unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn item_is_evicted_on_fourth_network_failure() {
    let remote = ScriptedRemote::new();
    remote.fail_next(Failure::Network, 2);
    remote.fail_next(Failure::Timeout, 1);
    remote.fail_next(Failure::Network, 1);
    let harness = Harness::offline(remote).await;
    let patient = harness.register("Budi Santoso").await;

    for expected_retries in 1..=3 {
        let report = harness.engine.run_pass().await.unwrap();
        assert_eq!(report.retried, 1);
        let items = harness.store().pending_items().await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].retry_count, expected_retries);
    }

    let report = harness.engine.run_pass().await.unwrap();
    assert_eq!(report.evicted, 1);
    assert_eq!(harness.store().queue_len().await.unwrap(), 0);

    let stored = harness
        .store()
        .get_patient(&patient.code)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.synced_at, None);
    assert_eq!(stored.sync_failed_at, Some(SCENARIO_NOW_MS));
    assert!(stored.sync_error.is_some());

    // No further automatic attempts
    let calls_before = harness.remote.create_calls();
    harness.engine.run_pass().await.unwrap();
    assert_eq!(harness.remote.create_calls(), calls_before);
    assert_eq!(calls_before, 4);
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_queue_makes_no_create_calls() {
    let harness = Harness::offline(ScriptedRemote::new()).await;

    let first = harness.engine.run_pass().await.unwrap();
    let second = harness.engine.run_pass().await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.committed, 0);
    assert_eq!(harness.remote.create_calls(), 0);
    assert_eq!(
        harness.remote.calls(),
        vec![Call::ListPatients, Call::ListPatients]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn second_trigger_during_a_pass_is_a_no_op() {
    let (remote, gate) = ScriptedRemote::gated();
    let harness = Harness::offline(remote).await;
    harness.register("Budi Santoso").await;

    let running = harness.engine.trigger().unwrap();
    assert!(harness.engine.trigger().is_none());
    assert!(harness.engine.run_pass().await.is_none());
    assert_ne!(harness.engine.phase(), SyncPhase::Idle);

    gate.add_permits(1);
    let report = running.await.unwrap();

    assert_eq!(report.committed, 1);
    assert_eq!(harness.remote.create_calls(), 1);
    assert_eq!(harness.engine.phase(), SyncPhase::Idle);
}

#[tokio::test(flavor = "multi_thread")]
async fn pull_failure_keeps_drained_results() {
    let remote = ScriptedRemote::new();
    remote.fail_pull(Failure::Network);
    let harness = Harness::offline(remote).await;
    let patient = harness.register("Budi Santoso").await;

    let report = harness.engine.run_pass().await.unwrap();

    assert_eq!(report.committed, 1);
    assert_eq!(report.pulled, None);
    assert!(report.pull_error.is_some());
    let stored = harness
        .store()
        .get_patient(&patient.code)
        .await
        .unwrap()
        .unwrap();
    assert!(stored.is_synced());
    assert_eq!(harness.store().sync_meta().await.unwrap().last_pull_at, None);
}

#[tokio::test(flavor = "multi_thread")]
async fn pull_merges_remote_only_patients() {
    let remote = ScriptedRemote::new();
    let harness = Harness::offline(remote).await;

    let mut other = harness.register("Ani Lestari").await;
    other.id = 99;
    other.code = posbindu_core::PatientCode::parse("pasien20231101AB").unwrap();
    harness.remote.seed_patient(other.clone());

    let report = harness.engine.run_pass().await.unwrap();
    assert_eq!(report.pulled, Some(2));

    let merged = harness
        .store()
        .get_patient(&other.code)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(merged.id, 99);
    assert_eq!(merged.synced_at, Some(SCENARIO_NOW_MS));
}

#[tokio::test(flavor = "multi_thread")]
async fn authentication_failure_aborts_pass_without_spending_retries() {
    let remote = ScriptedRemote::new();
    remote.fail_next(Failure::Authentication, 1);
    let harness = Harness::offline(remote).await;
    harness.register("Budi Santoso").await;
    harness.register("Ani Lestari").await;

    let report = harness.engine.run_pass().await.unwrap();

    assert!(report.aborted.is_some());
    assert_eq!(report.committed, 0);
    assert_eq!(harness.remote.create_calls(), 1);
    assert!(!harness.remote.calls().contains(&Call::ListPatients));

    let items = harness.store().pending_items().await.unwrap();
    assert_eq!(items.len(), 2);
    assert!(items.iter().all(|item| item.retry_count == 0));
    assert_eq!(harness.engine.phase(), SyncPhase::Idle);
}

#[tokio::test(flavor = "multi_thread")]
async fn validation_failure_is_evicted_without_blocking_the_queue() {
    let remote = ScriptedRemote::new();
    remote.fail_next(Failure::Validation, 1);
    let harness = Harness::offline(remote).await;
    let rejected = harness.register("Budi Santoso").await;
    let accepted = harness.register("Ani Lestari").await;

    let report = harness.engine.run_pass().await.unwrap();
    assert_eq!((report.evicted, report.committed), (1, 1));

    let rejected = harness
        .store()
        .get_patient(&rejected.code)
        .await
        .unwrap()
        .unwrap();
    assert!(!rejected.is_synced());
    assert!(rejected.sync_error.unwrap().contains("rejected"));

    let accepted = harness
        .store()
        .get_patient(&accepted.code)
        .await
        .unwrap()
        .unwrap();
    assert!(accepted.is_synced());
}
