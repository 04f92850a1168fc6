//! Agents command for managing the agent directory.

use std::io::Write;

use anyhow::{Context, Result};
use serde::Serialize;
use wu_db::{Database, NewAgent};

/// JSON shape of one agent.
#[derive(Debug, Serialize)]
struct AgentOutput {
    id: i64,
    number: String,
    firstname: String,
    lastname: String,
    context: String,
}

/// Adds an agent and prints its identifier.
pub fn add<W: Write>(writer: &mut W, db: &mut Database, agent: &NewAgent) -> Result<()> {
    if agent.number.trim().is_empty() {
        anyhow::bail!("agent number cannot be empty");
    }
    let id = db
        .add_agent(agent)
        .with_context(|| format!("failed to add agent {}", agent.number))?;
    writeln!(writer, "Added agent {} with id {id}", agent.number)?;
    Ok(())
}

/// Lists configured agents.
pub fn list<W: Write>(writer: &mut W, db: &Database, json: bool) -> Result<()> {
    let agents = db.list_agents()?;

    if json {
        let output: Vec<_> = agents
            .into_iter()
            .map(|agent| AgentOutput {
                id: agent.id.value(),
                number: agent.number,
                firstname: agent.firstname,
                lastname: agent.lastname,
                context: agent.context,
            })
            .collect();
        serde_json::to_writer_pretty(&mut *writer, &output)?;
        writeln!(writer)?;
        return Ok(());
    }

    if agents.is_empty() {
        writeln!(writer, "No agents configured.")?;
        return Ok(());
    }

    for agent in agents {
        let name = format!("{} {}", agent.firstname, agent.lastname);
        let name = name.trim();
        if name.is_empty() {
            writeln!(writer, "{:>4}  {}  ({})", agent.id, agent.number, agent.context)?;
        } else {
            writeln!(
                writer,
                "{:>4}  {}  {name}  ({})",
                agent.id,
                agent.number,
                agent.context
            )?;
        }
    }
    Ok(())
}
