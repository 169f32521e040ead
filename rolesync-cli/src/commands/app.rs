//! `rolesync app list`, `rolesync app add <alias> <object-id>` and
//! `rolesync app remove <alias>`

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use tabled::{settings::Style, Table, Tabled};

use rolesync_core::{config, ApplicationId};

/// Manage application aliases in the config file.
#[derive(Subcommand, Debug)]
pub enum AppCommand {
    /// List configured aliases.
    List,

    /// Name a service principal so commands can refer to it by alias.
    Add(AddArgs),

    /// Forget an alias.
    Remove(RemoveArgs),
}

#[derive(Args, Debug)]
pub struct AddArgs {
    /// Alias (e.g. "portal", "legacy-crm").
    pub alias: String,

    /// Object id of the application's service principal.
    pub object_id: String,
}

#[derive(Args, Debug)]
pub struct RemoveArgs {
    pub alias: String,
}

#[derive(Tabled)]
struct AliasRow {
    #[tabled(rename = "alias")]
    alias: String,
    #[tabled(rename = "object id")]
    object_id: String,
}

pub fn run(cmd: AppCommand) -> Result<()> {
    match cmd {
        AppCommand::List => list(),
        AppCommand::Add(args) => add(args),
        AppCommand::Remove(args) => remove(args),
    }
}

fn list() -> Result<()> {
    let settings = config::load().context("failed to load config")?;

    if settings.apps.is_empty() {
        println!("No application aliases configured.");
        println!("Run: rolesync app add <alias> <object-id>");
        return Ok(());
    }

    let rows: Vec<AliasRow> = settings
        .apps
        .iter()
        .map(|(alias, id)| AliasRow {
            alias: alias.clone(),
            object_id: id.to_string(),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
    Ok(())
}

fn add(args: AddArgs) -> Result<()> {
    let alias = args.alias.trim();
    let object_id = args.object_id.trim();
    if alias.is_empty() || object_id.is_empty() {
        bail!("alias and object id must not be empty");
    }

    let mut settings = config::load().context("failed to load config")?;
    let previous = settings
        .apps
        .insert(alias.to_string(), ApplicationId::from(object_id));
    config::save(&settings).context("failed to write config")?;

    match previous {
        Some(old) if old.as_str() != object_id => {
            println!("✓ Updated '{alias}' ({old} → {object_id})")
        }
        _ => println!("✓ Added '{alias}' → {object_id}"),
    }
    Ok(())
}

fn remove(args: RemoveArgs) -> Result<()> {
    let mut settings = config::load().context("failed to load config")?;
    if settings.apps.remove(&args.alias).is_none() {
        bail!("no alias named '{}'", args.alias);
    }
    config::save(&settings).context("failed to write config")?;
    println!("✓ Removed '{}'", args.alias);
    Ok(())
}
