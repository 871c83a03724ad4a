use rowkeep_core::db::open_db_in_memory;
use rowkeep_core::{
    AuditContext, CrudRepository, DataConfig, FixedAuditor, FixedClock, FlushMode, Member,
    MemberRepository, RepoError, Session, TransactionMode,
};
use rusqlite::Connection;
use std::sync::Arc;

fn fixed_audit(clock: &Arc<FixedClock>) -> AuditContext {
    AuditContext::new(clock.clone(), Arc::new(FixedAuditor("admin".into())))
}

fn stored_member(conn: &Connection, id: i64) -> Option<(String, i64)> {
    conn.query_row(
        "SELECT username, age FROM member WHERE member_id = ?1;",
        [id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )
    .ok()
}

#[test]
fn persist_assigns_sequential_identities() {
    let conn = open_db_in_memory().unwrap();
    let mut session = Session::new(&conn, &DataConfig::default()).unwrap();

    let first = session.persist(Member::new("AAA")).unwrap();
    let second = session.persist(Member::new("BBB")).unwrap();

    assert_eq!(first.borrow().id, Some(1));
    assert_eq!(second.borrow().id, Some(2));
    assert_eq!(session.attached_count(), 2);
}

#[test]
fn find_returns_the_same_handle_within_a_session() {
    let conn = open_db_in_memory().unwrap();
    let mut session = Session::new(&conn, &DataConfig::default()).unwrap();
    let id = session
        .persist(Member::with_age("AAA", 10))
        .unwrap()
        .borrow()
        .id
        .unwrap();
    session.flush().unwrap();
    session.clear();

    let first = session.find::<Member>(&id).unwrap().unwrap();
    let second = session.find::<Member>(&id).unwrap().unwrap();
    assert!(first.ptr_eq(&second));

    session.clear();
    let third = session.find::<Member>(&id).unwrap().unwrap();
    assert!(!first.ptr_eq(&third));
    assert_eq!(first.cloned(), third.cloned());
}

#[test]
fn flush_writes_only_changed_columns() {
    let conn = open_db_in_memory().unwrap();
    let mut session = Session::new(&conn, &DataConfig::default()).unwrap();
    let member = session.persist(Member::with_age("AAA", 10)).unwrap();
    let id = member.borrow().id.unwrap();
    assert_eq!(session.flush().unwrap().inserts, 1);

    // Out-of-band write the session does not know about.
    conn.execute(
        "UPDATE member SET username = 'raw' WHERE member_id = ?1;",
        [id],
    )
    .unwrap();

    member.borrow_mut().age = 11;
    let report = session.flush().unwrap();
    assert_eq!(report.updates, 1);
    assert_eq!(stored_member(&conn, id), Some(("raw".to_string(), 11)));
}

#[test]
fn unchanged_entities_are_not_written() {
    let conn = open_db_in_memory().unwrap();
    let mut session = Session::new(&conn, &DataConfig::default()).unwrap();
    session.persist(Member::with_age("AAA", 10)).unwrap();
    session.flush().unwrap();

    let report = session.flush().unwrap();
    assert!(report.is_empty());
}

#[test]
fn remove_schedules_delete_and_hides_entity() {
    let conn = open_db_in_memory().unwrap();
    let mut session = Session::new(&conn, &DataConfig::default()).unwrap();
    let member = session.persist(Member::new("AAA")).unwrap();
    let id = member.borrow().id.unwrap();
    session.flush().unwrap();

    session.remove(&member).unwrap();
    assert!(session.find::<Member>(&id).unwrap().is_none());
    assert!(stored_member(&conn, id).is_some());

    let report = session.flush().unwrap();
    assert_eq!(report.deletes, 1);
    assert!(stored_member(&conn, id).is_none());
    assert!(!session.contains(&member));
}

#[test]
fn removing_a_new_entity_cancels_its_insert() {
    let conn = open_db_in_memory().unwrap();
    let mut session = Session::new(&conn, &DataConfig::default()).unwrap();
    let member = session.persist(Member::new("AAA")).unwrap();

    session.remove(&member).unwrap();
    let report = session.flush().unwrap();
    assert!(report.is_empty());
    assert_eq!(session.attached_count(), 0);
}

#[test]
fn detached_changes_are_not_flushed() {
    let conn = open_db_in_memory().unwrap();
    let mut session = Session::new(&conn, &DataConfig::default()).unwrap();
    let member = session.persist(Member::with_age("AAA", 10)).unwrap();
    let id = member.borrow().id.unwrap();
    session.flush().unwrap();

    session.detach(&member).unwrap();
    member.borrow_mut().age = 99;
    assert!(session.flush().unwrap().is_empty());
    assert_eq!(stored_member(&conn, id), Some(("AAA".to_string(), 10)));

    let err = session.remove(&member).unwrap_err();
    assert!(matches!(err, RepoError::NotAttached("Member")));
}

#[test]
fn merge_copies_detached_state_and_keeps_creation_audit() {
    let conn = open_db_in_memory().unwrap();
    let clock = Arc::new(FixedClock::new(1_000));
    let mut session =
        Session::with_audit(&conn, &DataConfig::default(), fixed_audit(&clock)).unwrap();
    let id = session
        .persist(Member::with_age("AAA", 10))
        .unwrap()
        .borrow()
        .id
        .unwrap();
    session.flush().unwrap();
    session.clear();

    let mut detached = Member::with_age("AAA", 30);
    detached.id = Some(id);
    clock.set(2_000);
    let merged = session.merge(detached).unwrap();
    session.flush().unwrap();

    let merged = merged.cloned();
    assert_eq!(merged.age, 30);
    assert_eq!(merged.audit.created_at, Some(1_000));
    assert_eq!(merged.audit.updated_at, Some(2_000));
    assert_eq!(stored_member(&conn, id), Some(("AAA".to_string(), 30)));
}

#[test]
fn merge_without_stored_row_persists() {
    let conn = open_db_in_memory().unwrap();
    let mut session = Session::new(&conn, &DataConfig::default()).unwrap();

    let mut detached = Member::with_age("ghost", 5);
    detached.id = Some(77);
    session.merge(detached).unwrap();
    assert_eq!(session.flush().unwrap().inserts, 1);
    assert_eq!(stored_member(&conn, 77), Some(("ghost".to_string(), 5)));
}

#[test]
fn generated_identities_skip_past_merged_ids() {
    let conn = open_db_in_memory().unwrap();
    let mut session = Session::new(&conn, &DataConfig::default()).unwrap();
    let repo = MemberRepository::try_new().unwrap();

    let mut detached = Member::with_age("ghost", 5);
    detached.id = Some(2);
    repo.save(&mut session, detached).unwrap();
    session.flush().unwrap();

    let ids: Vec<i64> = ["A", "B", "C"]
        .into_iter()
        .map(|name| repo.save(&mut session, Member::new(name)).unwrap().borrow().id.unwrap())
        .collect();
    assert_eq!(ids, vec![3, 4, 5]);
    assert_eq!(session.flush().unwrap().inserts, 3);

    // A lower explicit id never moves the sequence backwards.
    let mut low = Member::new("low");
    low.id = Some(1);
    session.persist(low).unwrap();
    let next = session.persist(Member::new("D")).unwrap();
    assert_eq!(next.borrow().id, Some(6));
    assert_eq!(session.flush().unwrap().inserts, 2);
    assert_eq!(repo.count(&mut session).unwrap(), 6);
}

#[test]
fn mutating_identity_of_attached_entity_fails_flush() {
    let conn = open_db_in_memory().unwrap();
    let mut session = Session::new(&conn, &DataConfig::default()).unwrap();
    let member = session.persist(Member::new("AAA")).unwrap();
    session.flush().unwrap();

    member.borrow_mut().id = Some(999);
    let err = session.flush().unwrap_err();
    assert!(matches!(err, RepoError::IdentityMutated { entity: "Member", .. }));
}

#[test]
fn load_many_follows_requested_order_and_skips_missing() {
    let conn = open_db_in_memory().unwrap();
    let mut session = Session::new(&conn, &DataConfig::default()).unwrap();
    for name in ["AAA", "BBB", "CCC"] {
        session.persist(Member::new(name)).unwrap();
    }
    session.flush().unwrap();
    session.clear();

    let loaded = session.load_many::<Member>(&[3, 42, 1]).unwrap();
    let names: Vec<String> = loaded.iter().map(|m| m.borrow().username.clone()).collect();
    assert_eq!(names, vec!["CCC", "AAA"]);
}

#[test]
fn rollback_discards_flushed_writes_and_tracked_state() {
    let conn = open_db_in_memory().unwrap();
    let mut session = Session::new(&conn, &DataConfig::default()).unwrap();

    session.begin(TransactionMode::Deferred).unwrap();
    let id = session
        .persist(Member::new("AAA"))
        .unwrap()
        .borrow()
        .id
        .unwrap();
    session.flush().unwrap();
    assert!(stored_member(&conn, id).is_some());

    session.rollback().unwrap();
    assert!(!session.in_transaction());
    assert_eq!(session.attached_count(), 0);
    assert!(stored_member(&conn, id).is_none());
}

#[test]
fn commit_flushes_pending_changes() {
    let conn = open_db_in_memory().unwrap();
    let mut session = Session::new(&conn, &DataConfig::default()).unwrap();

    session.begin(TransactionMode::Immediate).unwrap();
    session.persist(Member::new("AAA")).unwrap();
    let report = session.commit().unwrap();

    assert_eq!(report.inserts, 1);
    assert!(!session.in_transaction());
    assert!(matches!(
        session.commit().unwrap_err(),
        RepoError::InvalidState(_)
    ));
}

#[test]
fn begin_twice_is_invalid_state() {
    let conn = open_db_in_memory().unwrap();
    let mut session = Session::new(&conn, &DataConfig::default()).unwrap();
    session.begin(TransactionMode::Deferred).unwrap();
    assert!(matches!(
        session.begin(TransactionMode::Deferred).unwrap_err(),
        RepoError::InvalidState(_)
    ));
}

#[test]
fn auto_flush_mode_writes_before_queries() {
    let conn = open_db_in_memory().unwrap();
    let repo = MemberRepository::try_new().unwrap();

    let mut auto = Session::new(&conn, &DataConfig::default()).unwrap();
    repo.save(&mut auto, Member::new("AAA")).unwrap();
    assert_eq!(repo.count(&mut auto).unwrap(), 1);

    let config = DataConfig::default().with_flush_mode(FlushMode::Commit);
    let mut manual = Session::new(&conn, &config).unwrap();
    repo.save(&mut manual, Member::new("BBB")).unwrap();
    assert_eq!(repo.count(&mut manual).unwrap(), 1);
    manual.flush().unwrap();
    assert_eq!(repo.count(&mut manual).unwrap(), 2);
}

#[test]
fn read_only_loads_are_never_dirty_checked() {
    let conn = open_db_in_memory().unwrap();
    let repo = MemberRepository::try_new().unwrap();
    let mut session = Session::new(&conn, &DataConfig::default()).unwrap();
    repo.save(&mut session, Member::with_age("AAA", 10)).unwrap();
    session.flush().unwrap();
    session.clear();

    let member = repo
        .find_read_only_by_username(&mut session, "AAA")
        .unwrap()
        .unwrap();
    member.borrow_mut().username = "changed".into();
    assert!(session.flush().unwrap().is_empty());

    let id = member.borrow().id.unwrap();
    assert_eq!(stored_member(&conn, id), Some(("AAA".to_string(), 10)));
}
