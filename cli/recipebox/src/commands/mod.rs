mod auth;
mod browse;
mod general;
mod likes;

use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use bpaf::Bpaf;
use indoc::indoc;
use recipebox_sdk::models::catalog::CatalogController;
use recipebox_sdk::models::likes::LikeStore;
use recipebox_sdk::models::session::{SessionManager, SessionStatus, UserProfile};
use recipebox_sdk::providers::catalog::Client;
use recipebox_sdk::storage::{FileStore, SharedStore};
use serde::Serialize;
use tracing::debug;

use crate::config::Config;
use crate::utils::init::init_catalog_client;
use crate::utils::message;

static RECIPEBOX_DESCRIPTION: &'_ str = indoc! {"
    Browse, search and like recipes from the recipe catalog."
};

fn vec_len<T>(x: Vec<T>) -> usize {
    Vec::len(&x)
}

#[derive(Bpaf, Clone, Copy, Debug)]
pub enum Verbosity {
    Verbose(
        /// Increase logging verbosity
        ///
        /// Invoke multiple times for increasing detail.
        #[bpaf(short('v'), long("verbose"), req_flag(()), many, map(vec_len))]
        usize,
    ),

    /// Silence logs except for errors
    #[bpaf(short, long)]
    Quiet,
}

impl Default for Verbosity {
    fn default() -> Self {
        Verbosity::Verbose(0)
    }
}

#[derive(Bpaf)]
#[bpaf(options, descr(RECIPEBOX_DESCRIPTION))]
pub struct RecipeboxCli(#[bpaf(external(recipebox_args))] pub RecipeboxArgs);

/// Main recipebox args parser
#[derive(Debug, Bpaf)]
#[bpaf(ignore_rustdoc)]
pub struct RecipeboxArgs {
    /// Verbose mode
    ///
    /// Invoke multiple times for increasing detail.
    #[bpaf(external, fallback(Default::default()))]
    pub verbosity: Verbosity,

    /// Print results as JSON
    #[bpaf(long)]
    pub json: bool,

    #[bpaf(external(commands))]
    command: Commands,
}

impl RecipeboxArgs {
    pub async fn handle(self, config: Config) -> Result<()> {
        let output = Output { json: self.json };
        match self.command {
            Commands::Register(args) => args.handle(config, output).await,
            Commands::Login(args) => args.handle(config, output).await,
            Commands::Logout(args) => args.handle(config).await,
            Commands::Whoami(args) => args.handle(config, output).await,
            Commands::Refresh(args) => args.handle(config).await,
            Commands::List(args) => args.handle(config, output).await,
            Commands::Search(args) => args.handle(config, output).await,
            Commands::Tags(args) => args.handle(config, output).await,
            Commands::Show(args) => args.handle(config, output).await,
            Commands::Add(args) => args.handle(config, output).await,
            Commands::Like(args) => args.handle(config, output).await,
            Commands::Liked(args) => args.handle(config, output).await,
            Commands::Config(args) => args.handle(config, output),
        }
    }
}

#[derive(Bpaf, Clone)]
enum Commands {
    /// Create a local account
    #[bpaf(command)]
    Register(#[bpaf(external(auth::register))] auth::Register),

    /// Log in and start a session
    #[bpaf(command)]
    Login(#[bpaf(external(auth::login))] auth::Login),

    /// End the current session
    #[bpaf(command)]
    Logout(#[bpaf(external(auth::logout))] auth::Logout),

    /// Show the signed-in user
    #[bpaf(command)]
    Whoami(#[bpaf(external(auth::whoami))] auth::Whoami),

    /// Renew the session credential
    #[bpaf(command)]
    Refresh(#[bpaf(external(auth::refresh))] auth::Refresh),

    /// List recipes page by page
    #[bpaf(command, long("ls"))]
    List(#[bpaf(external(browse::list))] browse::List),

    /// Search recipes
    #[bpaf(command)]
    Search(#[bpaf(external(browse::search))] browse::Search),

    /// List recipe categories
    #[bpaf(command)]
    Tags(#[bpaf(external(browse::tags))] browse::Tags),

    /// Show a single recipe
    #[bpaf(command)]
    Show(#[bpaf(external(browse::show))] browse::Show),

    /// Submit a new recipe
    #[bpaf(command)]
    Add(#[bpaf(external(browse::add))] browse::Add),

    /// Like a recipe, or unlike it if it is already liked
    #[bpaf(command)]
    Like(#[bpaf(external(likes::like))] likes::Like),

    /// Show liked recipes
    #[bpaf(command)]
    Liked(#[bpaf(external(likes::liked))] likes::Liked),

    /// Show the current configuration
    #[bpaf(command)]
    Config(#[bpaf(external(general::config_args))] general::ConfigArgs),
}

impl fmt::Debug for Commands {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Command")
    }
}

/// How results are printed
#[derive(Debug, Clone, Copy)]
pub struct Output {
    pub json: bool,
}

impl Output {
    /// Print `value` as JSON, or `plain` when JSON wasn't asked for.
    pub fn print<T: Serialize>(self, value: &T, plain: impl FnOnce() -> String) -> Result<()> {
        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(value).context("Could not serialize output")?
            );
        } else {
            println!("{}", plain());
        }
        Ok(())
    }
}

/// Everything a command needs, wired together from the config
pub struct App {
    pub config: Config,
    pub store: SharedStore,
    pub session: Arc<SessionManager>,
}

impl App {
    pub fn new(config: Config) -> Result<Self> {
        let store: SharedStore = Arc::new(
            FileStore::open(&config.data_dir).context("Could not open the data directory")?,
        );
        let session = SessionManager::new(store.clone());
        debug!(status = %session.status(), "opened session");
        Ok(Self {
            config,
            store,
            session,
        })
    }

    /// The signed-in user, or an error telling the user to log in.
    pub fn require_user(&self) -> Result<UserProfile> {
        match self.session.current_user() {
            Some(user) => Ok(user),
            None if self.session.credential().is_some() => {
                bail!("Your session has expired. Run 'recipebox refresh' or 'recipebox login'.")
            },
            None => bail!("You are not logged in. Run 'recipebox login' first."),
        }
    }

    /// The likes of the signed-in user.
    pub fn likes(&self, user: &UserProfile) -> LikeStore {
        LikeStore::load(self.store.clone(), Some(&user.username))
    }

    pub fn controller(&self) -> Result<CatalogController<Client>> {
        let client = init_catalog_client(&self.config, self.session.clone())?;
        Ok(CatalogController::new(client)
            .with_limit(self.config.page_size)
            .with_debounce(self.config.search_debounce())
            .with_tag_lookup(self.config.tag_lookup))
    }

    /// Tell the user if the catalog ended their session.
    pub fn report_session(&self) {
        if self.session.status() == SessionStatus::Expired {
            message::warning("The catalog rejected your session. Please log in again.");
        }
    }
}
