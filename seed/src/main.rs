//! Phonebook seed
//!
//! Usage: phonebook-seed <PASSWORD> [<NAME> <NUMBER>]
//!
//! With only a password every stored person is printed. With a name and a
//! number a new person is added.

use std::io::{self, Write};

use anyhow::Context;
use clap::Parser;
use phonebook_api::{
    domains::NewPerson,
    repositories::{sql::SqlPeopleRepository, PeopleRepository},
};
use tracing_subscriber::EnvFilter;
use url::Url;

const DEFAULT_DATABASE_URL: &str = "postgres://phonebook@localhost:5432/phonebook";

#[derive(Debug, Parser)]
#[command(name = "phonebook-seed")]
#[command(about = "List or add phonebook entries directly in the database", long_about = None)]
struct Cli {
    /// Database password
    password: String,

    /// Name of the person to add
    #[arg(requires = "number")]
    name: Option<String>,

    /// Phone number of the person to add
    number: Option<String>,

    /// Connection string the password is written into
    #[arg(long, env = "PHONEBOOK_DATABASE_URL", default_value = DEFAULT_DATABASE_URL)]
    database_url: Url,
}

#[derive(Debug, PartialEq, Eq)]
enum Mode {
    List,
    Insert { name: String, number: String },
}

impl Cli {
    fn mode(&self) -> Mode {
        match (&self.name, &self.number) {
            (Some(name), Some(number)) => Mode::Insert {
                name: name.clone(),
                number: number.clone(),
            },
            _ => Mode::List,
        }
    }

    fn connection_url(&self) -> anyhow::Result<String> {
        let mut url = self.database_url.clone();
        url.set_password(Some(self.password.as_str()))
            .map_err(|_| anyhow::anyhow!("connection string {url} cannot carry a password"))?;

        Ok(url.into())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let url = cli.connection_url()?;

    let mode = cli.mode();
    tracing::debug!(?mode, host = ?cli.database_url.host_str(), "connecting");

    let repository = SqlPeopleRepository::connect(&url)
        .await
        .context("failed to connect to the database")?;

    let result = run(mode, &repository, &mut io::stdout().lock()).await;
    repository.close().await;
    tracing::debug!(ok = result.is_ok(), "connection closed");

    result
}

async fn run(
    mode: Mode,
    repository: &(dyn PeopleRepository + Send + Sync),
    out: &mut impl Write,
) -> anyhow::Result<()> {
    match mode {
        Mode::List => {
            let people = repository
                .list_all()
                .await
                .context("failed to list people")?;

            writeln!(out, "phonebook:")?;
            for person in people {
                writeln!(out, "{person}")?;
            }
        }
        Mode::Insert { name, number } => {
            let person = repository
                .insert(NewPerson::new(name, number))
                .await
                .context("failed to add person")?;

            writeln!(
                out,
                "added {} number {} to phonebook",
                person.name, person.number
            )?;
        }
    }

    Ok(())
}
