use rowkeep_core::db::open_db_in_memory;
use rowkeep_core::query::Operator;
use rowkeep_core::{
    Criteria, CrudRepository, DataConfig, FieldChange, Managed, Member, MemberRepository,
    ModifyingQuery, Params, RepoError, Session,
};

fn seed_ages(session: &mut Session<'_>, repo: &MemberRepository) -> Vec<Managed<Member>> {
    let rows = [
        ("member1", 10),
        ("member2", 19),
        ("member3", 20),
        ("member4", 21),
        ("member5", 40),
    ];
    let mut members = Vec::new();
    for (username, age) in rows {
        members.push(repo.save(session, Member::with_age(username, age)).unwrap());
    }
    session.flush().unwrap();
    members
}

#[test]
fn update_where_counts_rows_and_leaves_attached_entities_stale() {
    let conn = open_db_in_memory().unwrap();
    let mut session = Session::new(&conn, &DataConfig::default()).unwrap();
    let repo = MemberRepository::try_new().unwrap();
    let members = seed_ages(&mut session, &repo);
    let id = members[4].borrow().id.unwrap();

    let criteria = Criteria::new().and("age", Operator::GreaterThanEqual, 20);
    let updated = repo
        .update_where(&mut session, &criteria, &[FieldChange::increment("age", 1)])
        .unwrap();
    assert_eq!(updated, 3);

    let attached = repo.find_by_id(&mut session, &id).unwrap().unwrap();
    assert_eq!(attached.borrow().age, 40);

    session.clear();
    let fresh = repo.find_by_id(&mut session, &id).unwrap().unwrap();
    assert_eq!(fresh.borrow().age, 41);
}

#[test]
fn update_where_and_clear_refreshes_later_reads() {
    let conn = open_db_in_memory().unwrap();
    let mut session = Session::new(&conn, &DataConfig::default()).unwrap();
    let repo = MemberRepository::try_new().unwrap();
    let members = seed_ages(&mut session, &repo);
    let id = members[0].borrow().id.unwrap();

    let criteria = Criteria::new().and("username", Operator::Equals, "member1");
    repo.update_where_and_clear(
        &mut session,
        &criteria,
        &[FieldChange::set("username", "renamed")],
    )
    .unwrap();

    assert_eq!(session.attached_count(), 0);
    let fresh = repo.find_by_id(&mut session, &id).unwrap().unwrap();
    assert_eq!(fresh.borrow().username, "renamed");
}

#[test]
fn bulk_age_plus_clears_the_session() {
    let conn = open_db_in_memory().unwrap();
    let mut session = Session::new(&conn, &DataConfig::default()).unwrap();
    let repo = MemberRepository::try_new().unwrap();
    let members = seed_ages(&mut session, &repo);
    let id = members[2].borrow().id.unwrap();

    let updated = repo.bulk_age_plus(&mut session, 20).unwrap();
    assert_eq!(updated, 3);
    assert!(!session.contains(&members[2]));

    let fresh = repo.find_by_id(&mut session, &id).unwrap().unwrap();
    assert_eq!(fresh.borrow().age, 21);
}

#[test]
fn pending_changes_are_flushed_before_bulk_statement() {
    let conn = open_db_in_memory().unwrap();
    let mut session = Session::new(&conn, &DataConfig::default()).unwrap();
    let repo = MemberRepository::try_new().unwrap();
    let members = seed_ages(&mut session, &repo);

    members[0].borrow_mut().age = 30;
    let updated = repo.bulk_age_plus(&mut session, 20).unwrap();
    assert_eq!(updated, 4);
}

#[test]
fn modifying_query_without_clear_keeps_tracked_state() {
    let conn = open_db_in_memory().unwrap();
    let mut session = Session::new(&conn, &DataConfig::default()).unwrap();
    let repo = MemberRepository::try_new().unwrap();
    let members = seed_ages(&mut session, &repo);

    let reset =
        ModifyingQuery::new("resetAge", "UPDATE member SET age = 0 WHERE age < :age").unwrap();
    let updated = reset
        .execute(&mut session, &Params::new().set("age", 20))
        .unwrap();
    assert_eq!(updated, 2);
    assert!(session.contains(&members[0]));
    assert_eq!(members[0].borrow().age, 10);
}

#[test]
fn empty_change_list_is_invalid_argument() {
    let conn = open_db_in_memory().unwrap();
    let mut session = Session::new(&conn, &DataConfig::default()).unwrap();
    let repo = MemberRepository::try_new().unwrap();

    let err = repo
        .update_where(&mut session, &Criteria::new(), &[])
        .unwrap_err();
    assert!(matches!(err, RepoError::InvalidArgument(_)));

    let err = repo
        .update_where(&mut session, &Criteria::new(), &[FieldChange::set("id", 7)])
        .unwrap_err();
    assert!(matches!(err, RepoError::InvalidArgument(_)));
}
