//! Team repository.

use crate::model::team::Team;
use crate::query::{Arg, DerivedQuery, Entities};
use crate::repo::error::RepoResult;
use crate::repo::repository::CrudRepository;
use crate::session::{Managed, Session};

#[derive(Debug)]
pub struct TeamRepository {
    by_name: DerivedQuery<Entities<Team>>,
}

impl TeamRepository {
    pub fn try_new() -> RepoResult<Self> {
        Ok(Self {
            by_name: DerivedQuery::parse("findByName")?,
        })
    }

    pub fn find_by_name(
        &self,
        session: &mut Session<'_>,
        name: &str,
    ) -> RepoResult<Option<Managed<Team>>> {
        self.by_name.fetch_optional(session, &[Arg::from(name)])
    }
}

impl CrudRepository for TeamRepository {
    type Entity = Team;
}
