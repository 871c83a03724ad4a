use rowkeep_core::db::open_db_in_memory;
use rowkeep_core::{
    CrudRepository, DataConfig, Item, ItemRepository, Member, MemberRepository, RepoError,
    Repository, Session, Sort, Team,
};

#[test]
fn save_then_find_by_id_roundtrip() {
    let conn = open_db_in_memory().unwrap();
    let mut session = Session::new(&conn, &DataConfig::default()).unwrap();
    let repo = MemberRepository::try_new().unwrap();

    let saved = repo
        .save_and_flush(&mut session, Member::with_age("memberA", 10))
        .unwrap()
        .cloned();
    session.clear();

    let found = repo
        .find_by_id(&mut session, &saved.id.unwrap())
        .unwrap()
        .unwrap()
        .cloned();
    assert_eq!(found, saved);
}

#[test]
fn basic_crud() {
    let conn = open_db_in_memory().unwrap();
    let mut session = Session::new(&conn, &DataConfig::default()).unwrap();
    let repo = MemberRepository::try_new().unwrap();

    let member1 = repo.save(&mut session, Member::new("member1")).unwrap();
    let member2 = repo.save(&mut session, Member::new("member2")).unwrap();
    let id1 = member1.borrow().id.unwrap();

    assert!(repo.exists_by_id(&mut session, &id1).unwrap());
    assert_eq!(repo.find_all(&mut session).unwrap().len(), 2);
    assert_eq!(repo.count(&mut session).unwrap(), 2);

    repo.delete(&mut session, &member1).unwrap();
    repo.delete(&mut session, &member2).unwrap();
    assert!(!repo.exists_by_id(&mut session, &id1).unwrap());
    assert_eq!(repo.count(&mut session).unwrap(), 0);
}

#[test]
fn find_all_sorted_and_by_ids() {
    let conn = open_db_in_memory().unwrap();
    let mut session = Session::new(&conn, &DataConfig::default()).unwrap();
    let repo = MemberRepository::try_new().unwrap();
    let saved = repo
        .save_all(
            &mut session,
            [
                Member::with_age("BBB", 20),
                Member::with_age("AAA", 30),
                Member::with_age("CCC", 10),
            ],
        )
        .unwrap();
    session.flush().unwrap();

    let sorted = repo
        .find_all_sorted(&mut session, &Sort::asc("username"))
        .unwrap();
    let names: Vec<String> = sorted.iter().map(|m| m.borrow().username.clone()).collect();
    assert_eq!(names, vec!["AAA", "BBB", "CCC"]);

    let ids: Vec<i64> = saved.iter().rev().map(|m| m.borrow().id.unwrap()).collect();
    let by_id = repo.find_all_by_id(&mut session, &ids).unwrap();
    let names: Vec<String> = by_id.iter().map(|m| m.borrow().username.clone()).collect();
    assert_eq!(names, vec!["CCC", "AAA", "BBB"]);
}

#[test]
fn delete_by_missing_id_is_not_found() {
    let conn = open_db_in_memory().unwrap();
    let mut session = Session::new(&conn, &DataConfig::default()).unwrap();
    let repo = MemberRepository::try_new().unwrap();

    let err = repo.delete_by_id(&mut session, &404).unwrap_err();
    assert!(matches!(err, RepoError::NotFound { entity: "Member", .. }));
}

#[test]
fn delete_all_removes_every_row_on_flush() {
    let conn = open_db_in_memory().unwrap();
    let mut session = Session::new(&conn, &DataConfig::default()).unwrap();
    let repo = MemberRepository::try_new().unwrap();
    repo.save(&mut session, Member::new("AAA")).unwrap();
    repo.save(&mut session, Member::new("BBB")).unwrap();
    session.flush().unwrap();

    assert_eq!(repo.delete_all(&mut session).unwrap(), 2);
    let report = repo.flush(&mut session).unwrap();
    assert_eq!(report.deletes, 2);
    assert_eq!(repo.count(&mut session).unwrap(), 0);
}

#[test]
fn saving_a_detached_entity_merges() {
    let conn = open_db_in_memory().unwrap();
    let mut session = Session::new(&conn, &DataConfig::default()).unwrap();
    let repo = MemberRepository::try_new().unwrap();
    let mut detached = repo
        .save_and_flush(&mut session, Member::with_age("AAA", 10))
        .unwrap()
        .cloned();
    session.clear();

    detached.age = 50;
    let merged = repo.save(&mut session, detached.clone()).unwrap();
    let report = session.flush().unwrap();
    assert_eq!(report.inserts, 0);
    assert_eq!(report.updates, 1);
    assert_eq!(merged.borrow().age, 50);
}

#[test]
fn client_assigned_identity_uses_is_new() {
    let conn = open_db_in_memory().unwrap();
    let mut session = Session::new(&conn, &DataConfig::default()).unwrap();
    let repo = ItemRepository::new();

    repo.save(&mut session, Item::new("A")).unwrap();
    assert_eq!(session.flush().unwrap().inserts, 1);

    let mut other = Session::new(&conn, &DataConfig::default()).unwrap();
    repo.save(&mut other, Item::new("A")).unwrap();
    let err = other.flush().unwrap_err();
    assert!(matches!(err, RepoError::ConstraintViolation(_)));
}

#[test]
fn generic_repository_covers_any_entity() {
    let conn = open_db_in_memory().unwrap();
    let mut session = Session::new(&conn, &DataConfig::default()).unwrap();
    let repo: Repository<Team> = Repository::new();

    let team = repo.save(&mut session, Team::new("teamA")).unwrap();
    let id = team.borrow().id.unwrap();
    session.flush().unwrap();
    session.clear();

    let found = repo.find_by_id(&mut session, &id).unwrap().unwrap();
    assert_eq!(found.borrow().name, "teamA");
    assert_eq!(format!("{repo:?}"), "Repository<Team>");
}

#[test]
fn dangling_team_reference_is_constraint_violation() {
    let conn = open_db_in_memory().unwrap();
    let mut session = Session::new(&conn, &DataConfig::default()).unwrap();
    let repo = MemberRepository::try_new().unwrap();

    let mut member = Member::new("AAA");
    member.team_id = Some(404);
    repo.save(&mut session, member).unwrap();
    assert!(matches!(
        session.flush().unwrap_err(),
        RepoError::ConstraintViolation(_)
    ));
}

#[test]
fn rejected_insert_stops_the_batch_and_is_retried() {
    let conn = open_db_in_memory().unwrap();
    let mut session = Session::new(&conn, &DataConfig::default()).unwrap();
    let repo = MemberRepository::try_new().unwrap();

    let first = repo.save(&mut session, Member::new("AAA")).unwrap();
    let mut dangling = Member::new("BBB");
    dangling.team_id = Some(404);
    let second = repo.save(&mut session, dangling).unwrap();
    let third = repo.save(&mut session, Member::new("CCC")).unwrap();

    let err = session.flush().unwrap_err();
    assert!(matches!(err, RepoError::ConstraintViolation(_)));

    let stored = |id: i64| -> bool {
        conn.query_row(
            "SELECT COUNT(*) FROM member WHERE member_id = ?1;",
            [id],
            |row| row.get::<_, i64>(0),
        )
        .unwrap()
            == 1
    };
    assert!(stored(first.borrow().id.unwrap()));
    assert!(!stored(second.borrow().id.unwrap()));
    assert!(!stored(third.borrow().id.unwrap()));

    // The failed insert stays pending and runs again on the next flush.
    assert!(matches!(
        session.flush().unwrap_err(),
        RepoError::ConstraintViolation(_)
    ));
    second.borrow_mut().team_id = None;
    let report = session.flush().unwrap();
    assert_eq!(report.inserts, 2);
    assert!(stored(second.borrow().id.unwrap()));
    assert!(stored(third.borrow().id.unwrap()));
}
