use anyhow::{Result, bail};
use bpaf::Bpaf;
use recipebox_sdk::models::session::{Registration, SessionError, UserProfile};
use tracing::instrument;

use super::{App, Output};
use crate::config::Config;
use crate::utils::message;

fn display_name(user: &UserProfile) -> &str {
    if user.name.is_empty() {
        &user.username
    } else {
        &user.name
    }
}

fn describe(user: &UserProfile) -> String {
    let mut lines = vec![format!("{} ({})", display_name(user), user.username)];
    for (label, value) in [
        ("email", &user.email),
        ("age", &user.age),
        ("gender", &user.gender),
    ] {
        if !value.is_empty() {
            lines.push(format!("  {label}: {value}"));
        }
    }
    lines.join("\n")
}

fn validation_to_message(err: SessionError) -> anyhow::Error {
    match err {
        SessionError::Validation(message) => anyhow::anyhow!(message),
        err => err.into(),
    }
}

#[derive(Debug, Bpaf, Clone)]
pub struct Register {
    /// Password for the new account
    #[bpaf(long, short, argument("password"))]
    password: String,

    #[bpaf(long, argument("email"), fallback(String::new()))]
    email: String,

    /// Display name
    #[bpaf(long, argument("name"), fallback(String::new()))]
    name: String,

    #[bpaf(long, argument("age"), fallback(String::new()))]
    age: String,

    #[bpaf(long, argument("gender"), fallback(String::new()))]
    gender: String,

    #[bpaf(positional("username"))]
    username: String,
}

impl Register {
    #[instrument(name = "register", skip_all)]
    pub async fn handle(self, config: Config, output: Output) -> Result<()> {
        let app = App::new(config)?;
        let registration = Registration {
            username: self.username,
            password: self.password,
            email: self.email,
            name: self.name,
            age: self.age,
            gender: self.gender,
        };
        let profile = app
            .session
            .register(&registration)
            .map_err(validation_to_message)?;

        if !output.json {
            message::created(format!(
                "Registered '{}'. Run 'recipebox login {}' to start a session.",
                profile.username, profile.username
            ));
            return Ok(());
        }
        output.print(&profile, String::new)
    }
}

#[derive(Debug, Bpaf, Clone)]
pub struct Login {
    #[bpaf(long, short, argument("password"))]
    password: String,

    #[bpaf(positional("username"))]
    username: String,
}

impl Login {
    #[instrument(name = "login", skip_all)]
    pub async fn handle(self, config: Config, output: Output) -> Result<()> {
        let app = App::new(config)?;
        let response = app
            .session
            .login(&self.username, &self.password)
            .map_err(validation_to_message)?;

        if !output.json {
            message::updated(format!(
                "Welcome back, {}!",
                display_name(&response.user)
            ));
            return Ok(());
        }
        output.print(&response.user, String::new)
    }
}

#[derive(Debug, Bpaf, Clone)]
pub struct Logout {}

impl Logout {
    #[instrument(name = "logout", skip_all)]
    pub async fn handle(self, config: Config) -> Result<()> {
        let app = App::new(config)?;
        let was_logged_in = app.session.credential().is_some();
        app.session.logout()?;

        if was_logged_in {
            message::deleted("Logged out");
        } else {
            message::plain("You are not logged in");
        }
        Ok(())
    }
}

#[derive(Debug, Bpaf, Clone)]
pub struct Whoami {}

impl Whoami {
    #[instrument(name = "whoami", skip_all)]
    pub async fn handle(self, config: Config, output: Output) -> Result<()> {
        let app = App::new(config)?;
        let user = app.require_user()?;
        output.print(&user, || describe(&user))
    }
}

#[derive(Debug, Bpaf, Clone)]
pub struct Refresh {}

impl Refresh {
    #[instrument(name = "refresh", skip_all)]
    pub async fn handle(self, config: Config) -> Result<()> {
        let app = App::new(config)?;
        if !app.session.refresh() {
            bail!("Could not refresh the session. Run 'recipebox login' to start a new one.");
        }
        message::updated("Session refreshed");
        Ok(())
    }
}
