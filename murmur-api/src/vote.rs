use std::collections::BTreeSet;

use crate::UserId;

#[derive(Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Votes {
    #[serde(default)]
    pub up: BTreeSet<UserId>,

    #[serde(default)]
    pub down: BTreeSet<UserId>,
}

impl Votes {
    pub fn score(&self) -> i64 {
        self.up.len() as i64 - self.down.len() as i64
    }

    pub fn has_upvoted(&self, user: &UserId) -> bool {
        self.up.contains(user)
    }

    pub fn has_downvoted(&self, user: &UserId) -> bool {
        self.down.contains(user)
    }

    /// Returns the votes as they would be after `user` performed `action`
    pub fn applied(&self, action: VoteAction, user: UserId) -> Votes {
        let mut res = self.clone();
        action.apply(&mut res, user);
        res
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum VoteAction {
    Upvote,
    Downvote,
    RemoveUpvote,
    RemoveDownvote,
}

impl VoteAction {
    pub fn path_segment(&self) -> &'static str {
        match self {
            VoteAction::Upvote => "upvote",
            VoteAction::Downvote => "downvote",
            VoteAction::RemoveUpvote => "remove-upvote",
            VoteAction::RemoveDownvote => "remove-downvote",
        }
    }

    pub fn from_path_segment(s: &str) -> Option<VoteAction> {
        match s {
            "upvote" => Some(VoteAction::Upvote),
            "downvote" => Some(VoteAction::Downvote),
            "remove-upvote" => Some(VoteAction::RemoveUpvote),
            "remove-downvote" => Some(VoteAction::RemoveDownvote),
            _ => None,
        }
    }

    /// Up and down sets stay disjoint: voting one way retracts the other
    pub fn apply(&self, votes: &mut Votes, user: UserId) {
        match self {
            VoteAction::Upvote => {
                votes.down.remove(&user);
                votes.up.insert(user);
            }
            VoteAction::Downvote => {
                votes.up.remove(&user);
                votes.down.insert(user);
            }
            VoteAction::RemoveUpvote => {
                votes.up.remove(&user);
            }
            VoteAction::RemoveDownvote => {
                votes.down.remove(&user);
            }
        }
    }
}
