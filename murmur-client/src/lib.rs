mod client;
pub use client::Client;

pub mod comment;
pub use comment::{CommentTree, InsertReport, Partitioned, TreeNode};

mod config;
pub use config::ClientConfig;

mod debounce;
pub use debounce::Debouncer;

mod error;
pub use error::Error;

pub mod feed;
pub use feed::{ListFeed, UpdateOptions};

pub mod list;
pub use list::{InsertPosition, ListAction, ListCache, ListState};

pub mod optimistic;
pub use optimistic::{Coordinator, Optimistic, OptimisticCommand, Outcome};

mod profile;
pub use profile::Profiles;

mod remote;
pub use remote::{Remote, UserAction};

mod session;
pub use session::Session;

pub mod state;
pub use state::{Action, ClientState};

mod store;
pub use store::{Reducer, Store, SubscriptionId};

mod threads;
pub use threads::CommentThreads;

pub mod api {
    pub use murmur_api::*;
}

pub mod prelude {
    pub use crate::{
        feed::{Creatable, FeedKind, Removable},
        Reducer,
    };
}
