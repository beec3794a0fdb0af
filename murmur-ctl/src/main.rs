use anyhow::Context;
use async_trait::async_trait;
use murmur_client::{
    api::{
        ApiError, Backend, CommentId, EntityId, FilterPatch, ListId, Method, NewComment,
        ProjectId, SortBy, TimeFrame, UserId, Uuid, VoteAction,
    },
    Client, ClientConfig, CommentTree, Session, UpdateOptions,
};
use serde_json::Value;

#[derive(structopt::StructOpt)]
struct Opt {
    #[structopt(short, long)]
    host: String,

    #[structopt(short, long)]
    project: String,

    /// Act as this user, with the token from the MURMUR_TOKEN environment variable
    #[structopt(short, long)]
    user: Option<Uuid>,

    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(structopt::StructOpt)]
enum Command {
    /// Print the comment threads of an entity
    Comments {
        entity: Uuid,

        #[structopt(long, default_value = "top", parse(try_from_str = parse_sort))]
        sort: SortBy,

        /// Also fetch the replies of the root comments
        #[structopt(long)]
        replies: bool,
    },

    /// Post a comment
    Comment {
        entity: Uuid,
        content: String,

        #[structopt(long)]
        parent: Option<Uuid>,
    },

    /// Print the entity feed
    Feed {
        #[structopt(long, parse(try_from_str = parse_sort))]
        sort: Option<SortBy>,

        #[structopt(long, parse(try_from_str = parse_time_frame))]
        time_frame: Option<TimeFrame>,

        #[structopt(long)]
        keyword: Vec<String>,

        /// Only entities from followed users
        #[structopt(long)]
        followed: bool,

        /// Number of pages to load
        #[structopt(long, default_value = "1")]
        pages: u32,
    },

    /// Print notifications
    Notifications {
        #[structopt(long)]
        mark_all_read: bool,
    },

    /// Vote on an entity from the first page of the feed
    Vote {
        entity: Uuid,

        #[structopt(parse(try_from_str = parse_vote))]
        action: VoteAction,
    },

    /// Vote on a comment
    VoteComment {
        comment: Uuid,

        #[structopt(parse(try_from_str = parse_vote))]
        action: VoteAction,
    },
}

fn parse_sort(s: &str) -> anyhow::Result<SortBy> {
    SortBy::parse(s).with_context(|| format!("unknown sort {s:?}"))
}

fn parse_time_frame(s: &str) -> anyhow::Result<TimeFrame> {
    TimeFrame::parse(s).with_context(|| format!("unknown time frame {s:?}"))
}

fn parse_vote(s: &str) -> anyhow::Result<VoteAction> {
    VoteAction::from_path_segment(s).with_context(|| format!("unknown vote action {s:?}"))
}

fn token() -> anyhow::Result<Option<String>> {
    match std::env::var("MURMUR_TOKEN") {
        Ok(tok) => Ok(Some(tok)),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(e).context("retrieving MURMUR_TOKEN environment variable"),
    }
}

struct HttpBackend {
    client: reqwest::Client,
    host: String,
    token: Option<String>,
}

fn transport(e: reqwest::Error) -> ApiError {
    ApiError::transport(e.to_string())
}

#[async_trait]
impl Backend for HttpBackend {
    async fn request(
        &self,
        method: Method,
        path: &str,
        params: &[(String, String)],
        body: Option<Value>,
    ) -> Result<Value, ApiError> {
        let method = match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        };
        let mut req = self
            .client
            .request(method, format!("{}{}", self.host, path))
            .query(params);
        if let Some(tok) = &self.token {
            req = req.bearer_auth(tok);
        }
        if let Some(body) = body {
            req = req.json(&body);
        }
        let resp = req.send().await.map_err(transport)?;
        let status = resp.status();
        let bytes = resp.bytes().await.map_err(transport)?;
        if !status.is_success() {
            return Err(ApiError::parse(status.as_u16(), &bytes).unwrap_or_else(|_| {
                ApiError::new(
                    status.as_u16(),
                    status.canonical_reason().unwrap_or("Request failed"),
                )
            }));
        }
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&bytes)
            .map_err(|e| ApiError::transport(format!("parsing response: {e}")))
    }
}

fn print_thread(tree: &CommentTree, id: &CommentId, depth: usize) {
    let node = match tree.get(id) {
        Some(n) => n,
        None => return,
    };
    let c = &node.comment;
    println!(
        "{:indent$}[{:+}] {} ({} replies)",
        "",
        c.votes.score(),
        c.content,
        c.replies_count,
        indent = depth * 2
    );
    let replies = tree.replies_of(id);
    for r in replies.new.iter().chain(replies.confirmed.iter()) {
        print_thread(tree, &r.id, depth + 1);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let opt = <Opt as structopt::StructOpt>::from_args();

    let backend = HttpBackend {
        client: reqwest::Client::new(),
        host: opt.host.trim_end_matches('/').to_string(),
        token: token()?,
    };
    let session = Session::new(ProjectId::new(opt.project), opt.user.map(UserId))?;
    let config = ClientConfig::from_env().context("reading configuration")?;
    let client = Client::new(backend, session, config)?;

    match opt.cmd {
        Command::Comments {
            entity,
            sort,
            replies,
        } => {
            let report = client
                .comments
                .fetch_for_entity(EntityId(entity), sort, 1)
                .await?;
            tracing::debug!(inserted = report.inserted, "fetched comments");
            if replies {
                let roots = client
                    .comments
                    .tree()
                    .roots()
                    .confirmed
                    .iter()
                    .map(|c| c.id)
                    .collect::<Vec<_>>();
                for id in roots {
                    client.comments.fetch_replies(id, sort, 1).await?;
                }
            }
            let tree = client.comments.tree();
            for root in tree.roots().confirmed {
                print_thread(&tree, &root.id, 0);
            }
        }
        Command::Comment {
            entity,
            content,
            parent,
        } => {
            let c = client
                .comments
                .create(NewComment {
                    entity_id: EntityId(entity),
                    parent_id: parent.map(CommentId),
                    content,
                    gif: None,
                    mentions: Vec::new(),
                })
                .await?;
            println!("{}", c.id.0);
        }
        Command::Feed {
            sort,
            time_frame,
            keyword,
            followed,
            pages,
        } => {
            let feed = ListId::new("home");
            let mut patch = FilterPatch::default().followed_only(followed);
            patch.sort_by = sort;
            patch.time_frame = time_frame;
            if !keyword.is_empty() {
                patch = patch.keywords(keyword);
            }
            client
                .entities
                .update_filters(&feed, patch, UpdateOptions::immediate())
                .await?;
            for _ in 1..pages {
                if !client.entities.load_more(&feed).await? {
                    break;
                }
            }
            if let Some(state) = client.entities.state(&feed) {
                for e in state.entities.iter() {
                    println!("{}\t[{:+}]\t{}", e.id.0, e.votes.score(), e.title);
                }
                if state.has_more {
                    println!("...");
                }
            }
        }
        Command::Notifications { mark_all_read } => {
            let feed = ListId::new("notifications");
            client.notifications.initialize(&feed).await?;
            if mark_all_read {
                client.notifications.mark_all_read().await?;
            }
            if let Some(state) = client.notifications.state(&feed) {
                for n in state.entities.iter() {
                    let mark = if n.read { ' ' } else { '*' };
                    println!("{mark} {}\t{}", n.created_at, n.message);
                }
            }
        }
        Command::Vote { entity, action } => {
            // votes apply to cached entities, so the feed holding it must be loaded first
            client.entities.initialize(&ListId::new("home")).await?;
            let voted = client
                .entities
                .vote(EntityId(entity), action)
                .await
                .context("entity is not on the first page of the feed")?;
            if let Some(e) = voted.committed() {
                println!("{:+}", e.votes.score());
            }
        }
        Command::VoteComment { comment, action } => {
            let id = CommentId(comment);
            client.comments.fetch_highlight(id).await?;
            let voted = client.comments.vote(id, action).await?;
            if let Some(c) = voted.committed() {
                println!("{:+}", c.votes.score());
            }
        }
    }

    Ok(())
}
