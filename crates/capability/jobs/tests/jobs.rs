use domain::{JobErrorEntry, JobFailure, JobStatus, now_epoch_ms};
use fleet_jobs::{JobError, JobManager, JobStore, spawn_job};
use fleet_storage::InMemoryKvStore;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn manager() -> Arc<JobManager> {
    let kv = Arc::new(InMemoryKvStore::new());
    Arc::new(JobManager::new(JobStore::new(
        kv,
        Some(Duration::from_secs(3600)),
    )))
}

fn unit_error(unit: &str) -> JobErrorEntry {
    JobErrorEntry {
        error: format!("{unit} failed"),
        suggestion: Some("retry later".to_string()),
        unit: Some(unit.to_string()),
        timestamp_ms: now_epoch_ms(),
    }
}

#[tokio::test]
async fn job_runs_to_completion() {
    let jobs = manager();
    let job = jobs
        .create_job("health_check", 3, json!({}))
        .await
        .expect("create");
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.progress.total, 3);
    assert_eq!(job.progress.percentage, 0);

    let running = jobs.update_progress(&job.job_id, 1, 0).await.expect("1");
    assert_eq!(running.status, JobStatus::Running);
    assert_eq!(running.progress.percentage, 33);
    jobs.update_progress(&job.job_id, 2, 0).await.expect("2");
    jobs.update_progress(&job.job_id, 3, 0).await.expect("3");
    let done = jobs.complete_job(&job.job_id).await.expect("complete");

    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.progress.percentage, 100);
    assert!(done.completed_at_ms.is_some());
    assert_eq!(jobs.get_job(&job.job_id).await.expect("get"), done);
}

#[tokio::test]
async fn progress_cannot_exceed_total() {
    let jobs = manager();
    let job = jobs.create_job("health_check", 3, json!({})).await.expect("create");

    let err = jobs
        .update_progress(&job.job_id, 3, 1)
        .await
        .expect_err("overflow");
    assert!(matches!(err, JobError::Validation(_)));

    let stored = jobs.get_job(&job.job_id).await.expect("get");
    assert_eq!(stored.status, JobStatus::Pending);
    assert_eq!(stored.progress.processed(), 0);
}

#[tokio::test]
async fn terminal_jobs_reject_mutation() {
    let jobs = manager();
    let job = jobs.create_job("health_check", 2, json!({})).await.expect("create");
    jobs.update_progress(&job.job_id, 1, 1).await.expect("progress");
    jobs.complete_job(&job.job_id).await.expect("complete");

    let err = jobs
        .update_progress(&job.job_id, 2, 0)
        .await
        .expect_err("terminal");
    assert!(matches!(
        err,
        JobError::Terminal {
            status: JobStatus::Completed,
            ..
        }
    ));
    assert!(jobs.add_error(&job.job_id, unit_error("a")).await.is_err());
    assert!(
        jobs.fail_job(&job.job_id, JobFailure::new("late", "none"))
            .await
            .is_err()
    );
    assert!(jobs.complete_job(&job.job_id).await.is_err());

    let stored = jobs.get_job(&job.job_id).await.expect("get");
    assert_eq!(stored.status, JobStatus::Completed);
    assert!(stored.failure.is_none());
    assert!(stored.errors.is_empty());
}

#[tokio::test]
async fn errors_and_results_keep_status() {
    let jobs = manager();
    let job = jobs.create_job("batch_reboot", 2, json!({})).await.expect("create");

    let with_error = jobs
        .add_error(&job.job_id, unit_error("rig-1"))
        .await
        .expect("add error");
    assert_eq!(with_error.status, JobStatus::Pending);
    assert_eq!(with_error.errors.len(), 1);

    let with_results = jobs
        .set_results(&job.job_id, json!({ "successful": 1 }))
        .await
        .expect("results");
    assert_eq!(with_results.status, JobStatus::Pending);
    assert_eq!(with_results.results, Some(json!({ "successful": 1 })));
}

#[tokio::test]
async fn failed_job_carries_reason_and_suggestion() {
    let jobs = manager();
    let job = jobs.create_job("power_sweep", 4, json!({})).await.expect("create");
    let failed = jobs
        .fail_job(
            &job.job_id,
            JobFailure::new("device disappeared", "re-register the device"),
        )
        .await
        .expect("fail");
    assert_eq!(failed.status, JobStatus::Failed);
    assert!(failed.completed_at_ms.is_some());
    let failure = failed.failure.expect("failure");
    assert_eq!(failure.message, "device disappeared");
    assert_eq!(failure.suggestion.as_deref(), Some("re-register the device"));
}

#[tokio::test]
async fn pending_job_settles_through_running() {
    let jobs = manager();
    let job = jobs.create_job("health_check", 1, json!({})).await.expect("create");
    assert!(!job.status.can_transition_to(JobStatus::Completed));

    let started = jobs.start_job(&job.job_id).await.expect("start");
    assert_eq!(started.status, JobStatus::Running);
    let again = jobs.start_job(&job.job_id).await.expect("start twice");
    assert_eq!(again.status, JobStatus::Running);

    let other = jobs.create_job("health_check", 1, json!({})).await.expect("create");
    let done = jobs.complete_job(&other.job_id).await.expect("complete");
    assert_eq!(done.status, JobStatus::Completed);

    jobs.complete_job(&job.job_id).await.expect("complete");
    assert!(matches!(
        jobs.start_job(&job.job_id).await,
        Err(JobError::Terminal { .. })
    ));
}

#[tokio::test]
async fn unknown_job_is_not_found() {
    let jobs = manager();
    assert!(matches!(
        jobs.get_job("nope").await,
        Err(JobError::NotFound(_))
    ));
    assert!(matches!(
        jobs.update_progress("nope", 1, 0).await,
        Err(JobError::NotFound(_))
    ));
}

#[tokio::test]
async fn concurrent_writes_are_not_lost() {
    let jobs = manager();
    let job = jobs.create_job("batch_reboot", 20, json!({})).await.expect("create");

    let mut handles = Vec::new();
    for i in 0..20 {
        let jobs = jobs.clone();
        let job_id = job.job_id.clone();
        handles.push(tokio::spawn(async move {
            jobs.add_error(&job_id, unit_error(&format!("rig-{i}"))).await
        }));
    }
    for handle in handles {
        handle.await.expect("join").expect("add error");
    }
    let stored = jobs.get_job(&job.job_id).await.expect("get");
    assert_eq!(stored.errors.len(), 20);
}

#[tokio::test(start_paused = true)]
async fn job_records_expire_after_retention() {
    let kv = Arc::new(InMemoryKvStore::new());
    let jobs = JobManager::new(JobStore::new(kv, Some(Duration::from_secs(60))));
    let job = jobs.create_job("health_check", 1, json!({})).await.expect("create");

    tokio::time::advance(Duration::from_secs(59)).await;
    assert!(jobs.get_job(&job.job_id).await.is_ok());
    tokio::time::advance(Duration::from_secs(1)).await;
    assert!(matches!(
        jobs.get_job(&job.job_id).await,
        Err(JobError::NotFound(_))
    ));
}

#[tokio::test]
async fn supervised_success_completes_job() {
    let jobs = manager();
    let job = jobs.create_job("health_check", 2, json!({})).await.expect("create");
    let worker = jobs.clone();
    let job_id = job.job_id.clone();
    spawn_job(jobs.clone(), job.job_id.clone(), async move {
        worker.update_progress(&job_id, 1, 0).await?;
        worker.update_progress(&job_id, 2, 0).await?;
        Ok(())
    })
    .await
    .expect("supervisor");

    let stored = jobs.get_job(&job.job_id).await.expect("get");
    assert_eq!(stored.status, JobStatus::Completed);
    assert_eq!(stored.progress.percentage, 100);
}

#[tokio::test]
async fn supervised_error_fails_job() {
    let jobs = manager();
    let job = jobs.create_job("health_check", 2, json!({})).await.expect("create");
    spawn_job(jobs.clone(), job.job_id.clone(), async {
        Err(JobFailure::new("device registry unavailable", "retry later"))
    })
    .await
    .expect("supervisor");

    let stored = jobs.get_job(&job.job_id).await.expect("get");
    assert_eq!(stored.status, JobStatus::Failed);
    assert_eq!(
        stored.failure.map(|f| f.message),
        Some("device registry unavailable".to_string())
    );
}

#[tokio::test]
async fn supervised_panic_fails_job() {
    let jobs = manager();
    let job = jobs.create_job("health_check", 1, json!({})).await.expect("create");
    spawn_job(jobs.clone(), job.job_id.clone(), async {
        let corrupted = true;
        if corrupted {
            panic!("sensor table corrupted");
        }
        Ok(())
    })
    .await
    .expect("supervisor");

    let stored = jobs.get_job(&job.job_id).await.expect("get");
    assert_eq!(stored.status, JobStatus::Failed);
    let failure = stored.failure.expect("failure");
    assert!(failure.message.contains("sensor table corrupted"));
    assert!(failure.suggestion.is_some());
}

#[tokio::test]
async fn body_that_settles_itself_is_left_alone() {
    let jobs = manager();
    let job = jobs.create_job("health_check", 1, json!({})).await.expect("create");
    let worker = jobs.clone();
    let job_id = job.job_id.clone();
    spawn_job(jobs.clone(), job.job_id.clone(), async move {
        worker
            .fail_job(&job_id, JobFailure::new("aborted by logic", "fix input"))
            .await?;
        Ok(())
    })
    .await
    .expect("supervisor");

    let stored = jobs.get_job(&job.job_id).await.expect("get");
    assert_eq!(stored.status, JobStatus::Failed);
    assert_eq!(
        stored.failure.map(|f| f.message),
        Some("aborted by logic".to_string())
    );
}
