use rowkeep_core::db::open_db_in_memory;
use rowkeep_core::{
    Criteria, CrudRepository, DataConfig, Example, Managed, Member, MemberRepository, Operator,
    RepoError, Session, StringMatch, Team,
};

fn seed_two_teams(session: &mut Session<'_>, repo: &MemberRepository) {
    let team_a = session.persist(Team::new("teamA")).unwrap().cloned();
    let team_b = session.persist(Team::new("teamB")).unwrap().cloned();
    repo.save(session, Member::with_team("m1", 0, &team_a)).unwrap();
    repo.save(session, Member::with_team("m2", 0, &team_a)).unwrap();
    repo.save(session, Member::with_team("m1", 30, &team_b)).unwrap();
    repo.save(session, Member::with_age("m1", 0)).unwrap();
    session.flush().unwrap();
    session.clear();
}

fn usernames_and_ages(members: &[Managed<Member>]) -> Vec<(String, i64)> {
    members
        .iter()
        .map(|member| {
            let member = member.borrow();
            (member.username.clone(), member.age)
        })
        .collect()
}

#[test]
fn criteria_reach_the_team_through_the_foreign_key() {
    let conn = open_db_in_memory().unwrap();
    let mut session = Session::new(&conn, &DataConfig::default()).unwrap();
    let repo = MemberRepository::try_new().unwrap();
    seed_two_teams(&mut session, &repo);

    let criteria = Criteria::new()
        .and("username", Operator::Equals, "m1")
        .and("team.name", Operator::Equals, "teamA");
    let found = repo.find_matching(&mut session, &criteria).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(usernames_and_ages(&found), vec![("m1".to_string(), 0)]);

    let in_any_team = Criteria::new().and_is("team.name", Operator::IsNotNull);
    assert_eq!(repo.count_matching(&mut session, &in_any_team).unwrap(), 3);
}

#[test]
fn derived_query_follows_nested_property() {
    let conn = open_db_in_memory().unwrap();
    let mut session = Session::new(&conn, &DataConfig::default()).unwrap();
    let repo = MemberRepository::try_new().unwrap();
    seed_two_teams(&mut session, &repo);

    let found = repo.find_by_team_name(&mut session, "teamA").unwrap();
    assert_eq!(
        usernames_and_ages(&found),
        vec![("m1".to_string(), 0), ("m2".to_string(), 0)]
    );
    assert!(repo.find_by_team_name(&mut session, "teamC").unwrap().is_empty());
}

#[test]
fn find_by_example_ignores_paths_and_nulls() {
    let conn = open_db_in_memory().unwrap();
    let mut session = Session::new(&conn, &DataConfig::default()).unwrap();
    let repo = MemberRepository::try_new().unwrap();
    seed_two_teams(&mut session, &repo);

    let example = Example::of(Member::new("m1"))
        .ignoring(&["age"])
        .with_path("team.name", "teamA");
    let found = repo.find_by_example(&mut session, &example).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].borrow().username, "m1");
    assert!(found[0].borrow().team_id.is_some());

    // Without ignoring `age`, the sample's zero age is a condition too.
    let by_age = Example::of(Member::new("m1"));
    assert_eq!(repo.count_by_example(&mut session, &by_age).unwrap(), 2);
    let any_age = Example::of(Member::new("m1")).ignoring(&["age"]);
    assert_eq!(repo.count_by_example(&mut session, &any_age).unwrap(), 3);
}

#[test]
fn example_string_matching_and_unknown_paths() {
    let conn = open_db_in_memory().unwrap();
    let mut session = Session::new(&conn, &DataConfig::default()).unwrap();
    let repo = MemberRepository::try_new().unwrap();
    seed_two_teams(&mut session, &repo);

    let example = Example::of(Member::new("m"))
        .ignoring(&["age"])
        .with_string_match(StringMatch::StartingWith);
    assert_eq!(repo.count_by_example(&mut session, &example).unwrap(), 4);

    let example = Example::of(Member::new("m1")).with_path("team.nickname", "x");
    let err = repo.find_by_example(&mut session, &example).unwrap_err();
    assert!(matches!(err, RepoError::Derivation(_)));
}
