use rowkeep_core::db::open_db_in_memory;
use rowkeep_core::{
    CrudRepository, DataConfig, Entities, ExplicitQuery, Member, MemberDto, MemberRepository,
    Params, PageRequest, QueryDerivationError, RepoError, Scalar, Session, Sort, Team,
    TeamRepository,
};

fn seed_with_teams(session: &mut Session<'_>) {
    let teams = TeamRepository::try_new().unwrap();
    let members = MemberRepository::try_new().unwrap();
    let team_a = teams.save(session, Team::new("teamA")).unwrap().cloned();
    let team_b = teams.save(session, Team::new("teamB")).unwrap().cloned();
    members
        .save(session, Member::with_team("AAA", 10, &team_a))
        .unwrap();
    members
        .save(session, Member::with_team("BBB", 20, &team_b))
        .unwrap();
    members.save(session, Member::with_age("CCC", 30)).unwrap();
    session.flush().unwrap();
    session.clear();
}

#[test]
fn named_parameters_bind_by_name() {
    let conn = open_db_in_memory().unwrap();
    let mut session = Session::new(&conn, &DataConfig::default()).unwrap();
    seed_with_teams(&mut session);
    let repo = MemberRepository::try_new().unwrap();

    let found = repo.find_member(&mut session, "AAA", 10).unwrap();
    assert_eq!(found.len(), 1);
    assert!(repo.find_member(&mut session, "AAA", 11).unwrap().is_empty());

    let named = repo.find_by_username(&mut session, "BBB").unwrap();
    assert_eq!(named[0].borrow().age, 20);
}

#[test]
fn explicit_results_share_the_identity_map() {
    let conn = open_db_in_memory().unwrap();
    let mut session = Session::new(&conn, &DataConfig::default()).unwrap();
    seed_with_teams(&mut session);
    let repo = MemberRepository::try_new().unwrap();

    let by_statement = repo.find_by_username(&mut session, "AAA").unwrap();
    let by_name = repo
        .find_by_username_and_age_greater_than(&mut session, "AAA", 0)
        .unwrap();
    assert!(by_statement[0].ptr_eq(&by_name[0]));
}

#[test]
fn missing_parameter_fails_before_execution() {
    let conn = open_db_in_memory().unwrap();
    let mut session = Session::new(&conn, &DataConfig::default()).unwrap();
    let query = ExplicitQuery::<Entities<Member>>::new(
        "byUsernameAndAge",
        "SELECT * FROM member WHERE username = :username AND age = :age",
    )
    .unwrap();
    assert_eq!(query.placeholders(), vec!["username", "age"]);

    let err = query
        .fetch(&mut session, &Params::new().set("username", "AAA"))
        .unwrap_err();
    assert!(matches!(err, RepoError::MissingParameter(name) if name == "age"));
}

#[test]
fn mixed_placeholders_are_rejected() {
    let err = ExplicitQuery::<Entities<Member>>::new(
        "mixed",
        "SELECT * FROM member WHERE username = :username AND age = ?1",
    )
    .unwrap_err();
    assert!(matches!(err, QueryDerivationError::MixedPlaceholders(_)));
}

#[test]
fn list_parameter_expands() {
    let conn = open_db_in_memory().unwrap();
    let mut session = Session::new(&conn, &DataConfig::default()).unwrap();
    seed_with_teams(&mut session);
    let repo = MemberRepository::try_new().unwrap();

    let found = repo
        .find_by_names(&mut session, &["AAA", "CCC", "ZZZ"])
        .unwrap();
    let mut names: Vec<String> = found.iter().map(|m| m.borrow().username.clone()).collect();
    names.sort();
    assert_eq!(names, vec!["AAA", "CCC"]);
}

#[test]
fn scalar_and_dto_shapes() {
    let conn = open_db_in_memory().unwrap();
    let mut session = Session::new(&conn, &DataConfig::default()).unwrap();
    seed_with_teams(&mut session);
    let repo = MemberRepository::try_new().unwrap();

    let mut names = repo.find_username_list(&mut session).unwrap();
    names.sort();
    assert_eq!(names, vec!["AAA", "BBB", "CCC"]);

    let mut dtos = repo.find_member_dto(&mut session).unwrap();
    dtos.sort_by(|a, b| a.username.cmp(&b.username));
    assert_eq!(dtos.len(), 2);
    assert_eq!(dtos[0].username, "AAA");
    assert_eq!(dtos[0].team_name.as_deref(), Some("teamA"));
    assert_eq!(dtos[1].team_name.as_deref(), Some("teamB"));
    assert_eq!(session.attached_count(), 0);

    let ages = ExplicitQuery::<Scalar<i64>>::new("ages", "SELECT age FROM member WHERE age >= ?")
        .unwrap()
        .fetch(&mut session, &Params::new().push(20))
        .unwrap();
    assert_eq!(ages.len(), 2);
}

#[test]
fn positional_native_query() {
    let conn = open_db_in_memory().unwrap();
    let mut session = Session::new(&conn, &DataConfig::default()).unwrap();
    seed_with_teams(&mut session);
    let repo = MemberRepository::try_new().unwrap();

    let member = repo
        .find_by_native_query(&mut session, "BBB")
        .unwrap()
        .unwrap();
    assert_eq!(member.borrow().age, 20);
    assert!(repo
        .find_by_native_query(&mut session, "ZZZ")
        .unwrap()
        .is_none());
}

#[test]
fn native_projection_page_includes_members_without_team() {
    let conn = open_db_in_memory().unwrap();
    let mut session = Session::new(&conn, &DataConfig::default()).unwrap();
    seed_with_teams(&mut session);
    let repo = MemberRepository::try_new().unwrap();

    let request = PageRequest::of(0, 2).with_sort(Sort::asc("username"));
    let page = repo.find_by_native_projection(&mut session, &request).unwrap();
    assert_eq!(page.total_elements(), 3);
    assert_eq!(page.total_pages(), 2);
    assert_eq!(
        page.content(),
        &[
            MemberDto::new(1, "AAA", Some("teamA".into())),
            MemberDto::new(2, "BBB", Some("teamB".into())),
        ]
    );

    let last = repo
        .find_by_native_projection(&mut session, &request.next())
        .unwrap();
    assert_eq!(last.content()[0].team_name, None);
    assert!(last.is_last());
}

#[test]
fn fetch_plan_resolves_teams_in_one_batch() {
    let conn = open_db_in_memory().unwrap();
    let mut session = Session::new(&conn, &DataConfig::default()).unwrap();
    seed_with_teams(&mut session);
    let repo = MemberRepository::try_new().unwrap();

    let mut rows = repo.find_all_with_team(&mut session).unwrap();
    rows.sort_by(|a, b| a.0.borrow().username.cmp(&b.0.borrow().username));
    let team_names: Vec<Option<String>> = rows
        .iter()
        .map(|(_, team)| team.as_ref().map(|team| team.borrow().name.clone()))
        .collect();
    assert_eq!(
        team_names,
        vec![Some("teamA".to_string()), Some("teamB".to_string()), None]
    );

    let graph = repo
        .find_entity_graph_by_username(&mut session, "AAA")
        .unwrap();
    let team = graph[0].1.as_ref().unwrap();
    assert!(team.ptr_eq(rows[0].1.as_ref().unwrap()));
}

#[test]
fn custom_query_lists_every_member() {
    let conn = open_db_in_memory().unwrap();
    let mut session = Session::new(&conn, &DataConfig::default()).unwrap();
    seed_with_teams(&mut session);
    let repo = MemberRepository::try_new().unwrap();

    assert_eq!(repo.find_member_custom(&mut session).unwrap().len(), 3);
}
