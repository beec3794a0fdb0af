use crate::{
    api::{ProjectId, UserId},
    Error,
};

/// Who is acting, and on which project
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Session {
    pub project: ProjectId,
    pub user: Option<UserId>,
}

impl Session {
    pub fn new(project: ProjectId, user: Option<UserId>) -> Result<Session, Error> {
        if project.is_empty() {
            return Err(Error::MissingProject);
        }
        Ok(Session { project, user })
    }

    pub fn anonymous(project: ProjectId) -> Result<Session, Error> {
        Session::new(project, None)
    }

    pub fn require_user(&self) -> Result<UserId, Error> {
        self.user.ok_or(Error::LoginRequired)
    }
}
