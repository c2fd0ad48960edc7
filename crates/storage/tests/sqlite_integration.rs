use chrono::Duration;
use course_core::model::{
    CourseId, CourseProgress, Enrollment, EventKind, EventPayload, ItemProgress, ItemStatus,
    LearnerId, Prerequisite, Unit, UnitId, UnitKind,
};
use course_core::time::fixed_now;
use storage::repository::{
    CatalogRepository, CourseProgressRepository, EnrollmentRepository, ItemProgressRepository,
    StorageError,
};
use storage::sqlite::SqliteRepository;

fn build_unit(id: u64, course: u64, position: u32, kind: UnitKind) -> Unit {
    Unit::new(
        UnitId::new(id),
        CourseId::new(course),
        format!("Unit {id}"),
        position,
        kind,
        Vec::new(),
        None,
    )
    .unwrap()
}

#[tokio::test]
async fn sqlite_roundtrip_persists_units_and_prerequisites() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_catalog?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");

    let quiz = Unit::new(
        UnitId::new(1),
        CourseId::new(1),
        "Checkpoint Quiz",
        10,
        UnitKind::Quiz,
        Vec::new(),
        None,
    )
    .unwrap();
    let gated = Unit::new(
        UnitId::new(2),
        CourseId::new(1),
        "Advanced Topic",
        20,
        UnitKind::Video,
        vec![Prerequisite::with_min_score(UnitId::new(1), 70.0)],
        Some(Duration::hours(48)),
    )
    .unwrap();
    repo.upsert_unit(&quiz).await.unwrap();
    repo.upsert_unit(&gated).await.unwrap();

    let fetched = repo.get_unit(UnitId::new(2)).await.unwrap();
    assert_eq!(fetched.title(), "Advanced Topic");
    assert_eq!(fetched.release_delay(), Some(Duration::hours(48)));
    assert_eq!(
        fetched.prerequisites(),
        &[Prerequisite::with_min_score(UnitId::new(1), 70.0)]
    );

    let units = repo.units_for_course(CourseId::new(1)).await.unwrap();
    assert_eq!(units.len(), 2);
    assert_eq!(units[0].id(), UnitId::new(1));
    assert_eq!(units[1].id(), UnitId::new(2));
}

#[tokio::test]
async fn sqlite_item_progress_compare_and_swap() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_items?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");

    let learner = LearnerId::new(1);
    let course = CourseId::new(1);
    repo.upsert_enrollment(&Enrollment::new(learner, course, fixed_now()))
        .await
        .unwrap();
    repo.upsert_unit(&build_unit(10, 1, 10, UnitKind::Quiz))
        .await
        .unwrap();

    let mut item = ItemProgress::fresh(learner, UnitId::new(10), course, fixed_now());
    item.apply_event(
        EventKind::Start,
        &EventPayload::default(),
        UnitKind::Quiz,
        fixed_now(),
    )
    .unwrap();
    repo.insert_item(&item).await.unwrap();

    let err = repo.insert_item(&item).await.unwrap_err();
    assert!(matches!(err, StorageError::Conflict));

    let stale_revision = item.revision();
    item.apply_event(
        EventKind::Passed,
        &EventPayload::score(88.0),
        UnitKind::Quiz,
        fixed_now(),
    )
    .unwrap();
    repo.update_item(&item, stale_revision).await.unwrap();

    let err = repo.update_item(&item, stale_revision).await.unwrap_err();
    assert!(matches!(err, StorageError::Conflict));

    let fetched = repo
        .find_item(learner, UnitId::new(10))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fetched.status(), ItemStatus::Passed);
    assert_eq!(fetched.score(), Some(88.0));
    assert_eq!(fetched.revision(), item.revision());
}

#[tokio::test]
async fn sqlite_summary_write_syncs_enrollment_cache() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_summary?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");

    let learner = LearnerId::new(1);
    let course = CourseId::new(1);
    repo.upsert_enrollment(&Enrollment::new(learner, course, fixed_now()))
        .await
        .unwrap();

    let summary = CourseProgress::compute(learner, course, 1, 2, Some(fixed_now())).unwrap();
    repo.store_summary(&summary).await.unwrap();

    let fetched = repo.find_summary(learner, course).await.unwrap().unwrap();
    assert_eq!(fetched, summary);
    let enrollment = repo.get_enrollment(learner, course).await.unwrap();
    assert_eq!(enrollment.progress_percent(), 50.0);

    // Without an enrollment nothing is written.
    let orphan = CourseProgress::compute(LearnerId::new(9), course, 0, 2, None).unwrap();
    let err = repo.store_summary(&orphan).await.unwrap_err();
    assert!(matches!(err, StorageError::NotFound));
}

#[tokio::test]
async fn sqlite_unenrollment_cascades() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_cascade?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");

    let learner = LearnerId::new(1);
    let course = CourseId::new(1);
    repo.upsert_enrollment(&Enrollment::new(learner, course, fixed_now()))
        .await
        .unwrap();
    repo.upsert_unit(&build_unit(10, 1, 10, UnitKind::Video))
        .await
        .unwrap();

    let mut item = ItemProgress::fresh(learner, UnitId::new(10), course, fixed_now());
    item.apply_event(
        EventKind::Complete,
        &EventPayload::default(),
        UnitKind::Video,
        fixed_now(),
    )
    .unwrap();
    repo.insert_item(&item).await.unwrap();
    let summary = CourseProgress::compute(learner, course, 1, 1, Some(fixed_now())).unwrap();
    repo.store_summary(&summary).await.unwrap();

    repo.delete_enrollment(learner, course).await.unwrap();

    assert!(matches!(
        repo.get_enrollment(learner, course).await.unwrap_err(),
        StorageError::NotFound
    ));
    assert!(
        repo.find_item(learner, UnitId::new(10))
            .await
            .unwrap()
            .is_none()
    );
    assert!(repo.find_summary(learner, course).await.unwrap().is_none());

    let err = repo.delete_enrollment(learner, course).await.unwrap_err();
    assert!(matches!(err, StorageError::NotFound));
}
