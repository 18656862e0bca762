use serde_json::json;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use ace_config::Postgres;
use ace_storage::{db::Db, rebuild_outbox};
use ace_testkit::TestDatabase;

async fn setup(test_name: &str) -> Option<(TestDatabase, Db)> {
	let Some(base_dsn) = ace_testkit::env_dsn() else {
		eprintln!("Skipping {test_name}; set ACE_PG_DSN to run this test.");

		return None;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let cfg = Postgres { dsn: test_db.dsn().to_string(), pool_max_conns: 2 };
	let db = Db::connect(&cfg).await.expect("Failed to connect to Postgres.");

	db.ensure_schema().await.expect("Failed to ensure schema.");

	Some((test_db, db))
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set ACE_PG_DSN to run."]
async fn reenqueue_coalesces_into_one_row_with_latest_payload() {
	let Some((test_db, db)) = setup("reenqueue_coalesces_into_one_row_with_latest_payload").await
	else {
		return;
	};
	let alert_id = Uuid::new_v4();
	let now = OffsetDateTime::now_utc();
	let first = rebuild_outbox::enqueue_rebuild(&db.pool, alert_id, &json!({ "v": 1 }), now)
		.await
		.expect("Failed to enqueue.");
	let second = rebuild_outbox::enqueue_rebuild(&db.pool, alert_id, &json!({ "v": 2 }), now)
		.await
		.expect("Failed to re-enqueue.");
	let job = rebuild_outbox::get_rebuild_job(&db.pool, alert_id)
		.await
		.expect("Failed to read job.")
		.expect("Expected outbox row.");

	assert_eq!((first, second), (1, 2));
	assert_eq!(job.payload, json!({ "v": 2 }));
	assert_eq!(job.status, "PENDING");

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set ACE_PG_DSN to run."]
async fn claimed_job_is_hidden_until_its_lease_expires() {
	let Some((test_db, db)) = setup("claimed_job_is_hidden_until_its_lease_expires").await else {
		return;
	};
	let alert_id = Uuid::new_v4();
	let now = OffsetDateTime::now_utc();

	rebuild_outbox::enqueue_rebuild(&db.pool, alert_id, &json!({}), now)
		.await
		.expect("Failed to enqueue.");

	let claimed = rebuild_outbox::claim_next_rebuild_job(&db, now, 30)
		.await
		.expect("Failed to claim.")
		.expect("Expected a job.");

	assert_eq!(claimed.alert_id, alert_id);
	assert_eq!(claimed.status, "CLAIMED");
	assert!(
		rebuild_outbox::claim_next_rebuild_job(&db, now, 30)
			.await
			.expect("Failed to claim.")
			.is_none()
	);

	let reclaimed = rebuild_outbox::claim_next_rebuild_job(&db, now + Duration::seconds(31), 30)
		.await
		.expect("Failed to claim.")
		.expect("Expired lease must be reclaimable.");

	assert_eq!(reclaimed.revision, claimed.revision);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set ACE_PG_DSN to run."]
async fn newer_revision_survives_completion_of_older_one() {
	let Some((test_db, db)) = setup("newer_revision_survives_completion_of_older_one").await else {
		return;
	};
	let alert_id = Uuid::new_v4();
	let now = OffsetDateTime::now_utc();

	rebuild_outbox::enqueue_rebuild(&db.pool, alert_id, &json!({ "v": 1 }), now)
		.await
		.expect("Failed to enqueue.");

	let claimed = rebuild_outbox::claim_next_rebuild_job(&db, now, 30)
		.await
		.expect("Failed to claim.")
		.expect("Expected a job.");

	rebuild_outbox::enqueue_rebuild(&db.pool, alert_id, &json!({ "v": 2 }), now)
		.await
		.expect("Failed to re-enqueue.");

	let settled = rebuild_outbox::mark_rebuild_done(&db, alert_id, claimed.revision, now)
		.await
		.expect("Failed to mark done.");
	let next = rebuild_outbox::claim_next_rebuild_job(&db, now, 30)
		.await
		.expect("Failed to claim.")
		.expect("Newer revision must stay claimable.");

	assert!(!settled);
	assert_eq!(next.revision, 2);
	assert_eq!(next.payload, json!({ "v": 2 }));
	assert!(rebuild_outbox::mark_rebuild_done(&db, alert_id, next.revision, now).await.expect("done"));

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set ACE_PG_DSN to run."]
async fn failed_job_waits_for_backoff_and_rejected_job_is_parked() {
	let Some((test_db, db)) =
		setup("failed_job_waits_for_backoff_and_rejected_job_is_parked").await
	else {
		return;
	};
	let retried = Uuid::new_v4();
	let parked = Uuid::new_v4();
	let now = OffsetDateTime::now_utc();

	for alert_id in [retried, parked] {
		rebuild_outbox::enqueue_rebuild(&db.pool, alert_id, &json!({}), now)
			.await
			.expect("Failed to enqueue.");
	}

	for _ in 0..2 {
		let job = rebuild_outbox::claim_next_rebuild_job(&db, now, 30)
			.await
			.expect("Failed to claim.")
			.expect("Expected a job.");

		if job.alert_id == retried {
			rebuild_outbox::mark_rebuild_failed(
				&db,
				job.alert_id,
				job.revision,
				1,
				"deadlock detected",
				now + Duration::seconds(5),
				now,
			)
			.await
			.expect("Failed to mark failed.");
		} else {
			rebuild_outbox::mark_rebuild_rejected(&db, job.alert_id, job.revision, 1, "bad input", now)
				.await
				.expect("Failed to mark rejected.");
		}
	}

	assert!(
		rebuild_outbox::claim_next_rebuild_job(&db, now + Duration::seconds(1), 30)
			.await
			.expect("Failed to claim.")
			.is_none()
	);

	let later = now + Duration::seconds(60);
	let job = rebuild_outbox::claim_next_rebuild_job(&db, later, 30)
		.await
		.expect("Failed to claim.")
		.expect("Failed job must come back after its backoff.");

	assert_eq!(job.alert_id, retried);
	assert_eq!(job.attempts, 1);
	assert_eq!(job.last_error.as_deref(), Some("deadlock detected"));
	assert!(
		rebuild_outbox::claim_next_rebuild_job(&db, later, 30)
			.await
			.expect("Failed to claim.")
			.is_none()
	);

	let parked_job = rebuild_outbox::get_rebuild_job(&db.pool, parked)
		.await
		.expect("Failed to read job.")
		.expect("Expected outbox row.");

	assert_eq!(parked_job.status, "REJECTED");

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set ACE_PG_DSN to run."]
async fn purge_removes_only_old_done_jobs() {
	let Some((test_db, db)) = setup("purge_removes_only_old_done_jobs").await else {
		return;
	};
	let done = Uuid::new_v4();
	let pending = Uuid::new_v4();
	let now = OffsetDateTime::now_utc();

	for alert_id in [done, pending] {
		rebuild_outbox::enqueue_rebuild(&db.pool, alert_id, &json!({}), now)
			.await
			.expect("Failed to enqueue.");
	}

	assert!(rebuild_outbox::mark_rebuild_done(&db, done, 1, now).await.expect("done"));

	let purged = rebuild_outbox::purge_done_rebuild_jobs(&db, now + Duration::hours(1))
		.await
		.expect("Failed to purge.");

	assert_eq!(purged, 1);
	assert!(rebuild_outbox::get_rebuild_job(&db.pool, done).await.expect("read").is_none());
	assert!(rebuild_outbox::get_rebuild_job(&db.pool, pending).await.expect("read").is_some());

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}
