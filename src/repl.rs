//! Line commands for the interactive `run` mode.

use std::fmt;

use thiserror::Error;

use crate::container::{Container, ContainerError};
use crate::service::{Draft, Entity, Record};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    List(Entity),
    Add(Entity, String),
    Remove(Entity, String),
    Filter(String),
    Status,
    Show,
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReplError {
    #[error("Unknown command '{0}', type 'help' for a list")]
    UnknownCommand(String),

    #[error("'{command}' needs {what}")]
    MissingArgument { command: String, what: &'static str },
}

pub const HELP: &[&str] = &[
    "items                 fetch and list items",
    "users                 fetch and list users",
    "add <name>            add an item",
    "add-user <name>       add a user",
    "rm <id>               remove an item",
    "rm-user <id>          remove a user",
    "filter [query]        set the items filter (empty clears it)",
    "status                microfrontend status",
    "show                  render every fragment",
    "help                  this list",
    "quit                  tear down and exit",
];

impl ReplCommand {
    /// Parse one input line. Blank lines yield `None`.
    pub fn parse(line: &str) -> Option<Result<Self, ReplError>> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        let needs = |what: &'static str| -> Result<String, ReplError> {
            if rest.is_empty() {
                Err(ReplError::MissingArgument {
                    command: word.to_string(),
                    what,
                })
            } else {
                Ok(rest.to_string())
            }
        };

        let command = match word {
            "items" => Ok(ReplCommand::List(Entity::Items)),
            "users" => Ok(ReplCommand::List(Entity::Users)),
            "add" => needs("a name").map(|n| ReplCommand::Add(Entity::Items, n)),
            "add-user" => needs("a name").map(|n| ReplCommand::Add(Entity::Users, n)),
            "rm" => needs("an id").map(|id| ReplCommand::Remove(Entity::Items, id)),
            "rm-user" => needs("an id").map(|id| ReplCommand::Remove(Entity::Users, id)),
            "filter" => Ok(ReplCommand::Filter(rest.to_string())),
            "status" => Ok(ReplCommand::Status),
            "show" => Ok(ReplCommand::Show),
            "help" | "?" => Ok(ReplCommand::Help),
            "quit" | "exit" => Ok(ReplCommand::Quit),
            other => Err(ReplError::UnknownCommand(other.to_string())),
        };
        Some(command)
    }
}

impl fmt::Display for ReplCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplCommand::List(entity) => write!(f, "list {}", entity),
            ReplCommand::Add(entity, name) => write!(f, "add {} '{}'", entity.singular(), name),
            ReplCommand::Remove(entity, id) => write!(f, "remove {} {}", entity.singular(), id),
            ReplCommand::Filter(q) => write!(f, "filter '{}'", q),
            ReplCommand::Status => f.write_str("status"),
            ReplCommand::Show => f.write_str("show"),
            ReplCommand::Help => f.write_str("help"),
            ReplCommand::Quit => f.write_str("quit"),
        }
    }
}

fn record_line(record: &Record) -> String {
    format!("{:>6}  {}", record.id.to_string(), record.name)
}

/// Run `command` against `container` and return the lines to print.
pub async fn execute(container: &Container, command: &ReplCommand) -> Result<Vec<String>, ContainerError> {
    let lines = match command {
        ReplCommand::List(entity) => {
            let api = container.service().await?;
            let records = api.fetch(*entity).await?;
            if records.is_empty() {
                vec![format!("no {}", entity)]
            } else {
                records.iter().map(record_line).collect()
            }
        }
        ReplCommand::Add(entity, name) => {
            let api = container.service().await?;
            let record = api.add(*entity, Draft::new(name.as_str())).await?;
            vec![format!("added {} {}", entity.singular(), record_line(&record).trim_start())]
        }
        ReplCommand::Remove(entity, id) => {
            let api = container.service().await?;
            api.remove(*entity, id.as_str()).await?;
            vec![format!("removed {} {}", entity.singular(), id)]
        }
        ReplCommand::Filter(query) => {
            container.set_filter(query).await?;
            if query.is_empty() {
                vec!["filter cleared".to_string()]
            } else {
                vec![format!("filter set to '{}'", query)]
            }
        }
        ReplCommand::Status => container
            .status()
            .iter()
            .map(|e| format!("{:<14} {:<8} {}", e.label, e.status.to_string(), e.module))
            .collect(),
        ReplCommand::Show => container.render(),
        ReplCommand::Help => HELP.iter().map(|s| s.to_string()).collect(),
        ReplCommand::Quit => Vec::new(),
    };
    Ok(lines)
}
