use std::io::{self, Write};

use anyhow::{Context, Result};
use parley::{
    domain, infra,
    messaging::{self, directory::Directory},
    usecases::{
        self, bootstrap, context::ChatContext, list_contacts::ListContactsQuery,
        load_history::HistoryQuery,
    },
};

use crate::cli::{Cli, Command, ConversationArgs, HistoryArgs, SendArgs};

pub fn run(cli: Cli) -> Result<()> {
    let context = bootstrap::bootstrap(cli.config.as_deref())?;
    tracing::debug!(
        domain = domain::module_name(),
        messaging = messaging::module_name(),
        usecases = usecases::module_name(),
        infra = infra::module_name(),
        "module boundaries loaded"
    );

    let stdout = io::stdout();
    execute(&context, cli.command_or_default(), &mut stdout.lock())
}

fn execute(context: &ChatContext, command: Command, out: &mut impl Write) -> Result<()> {
    match command {
        Command::Users { as_id } => list_users(context, as_id.as_deref(), out),
        Command::Send(args) => send(context, &args, out),
        Command::History(args) => history(context, &args, out),
        Command::Delete(args) => delete(context, &args, out),
    }
}

fn list_users(context: &ChatContext, as_id: Option<&str>, out: &mut impl Write) -> Result<()> {
    let users = match as_id {
        Some(id) => {
            let session = context.connect(id)?;
            session
                .service()
                .list_contacts(ListContactsQuery::default())
                .context("failed to list contacts")?
        }
        None => context
            .directory
            .list_users(ListContactsQuery::default().limit)
            .context("failed to list directory")?,
    };

    for user in users {
        writeln!(out, "{}\t{}", user.id, user.label())?;
    }
    Ok(())
}

fn send(context: &ChatContext, args: &SendArgs, out: &mut impl Write) -> Result<()> {
    let session = context.connect(&args.as_id)?;
    let service = session.service();
    let key = service
        .conversation_with(&args.to)
        .with_context(|| format!("cannot open a conversation with '{}'", args.to))?;
    let message = service
        .send(&key, &args.text)
        .context("failed to send message")?;

    writeln!(
        out,
        "{}\t{}",
        message.id,
        message.delivery_state.as_label()
    )?;
    Ok(())
}

fn history(context: &ChatContext, args: &HistoryArgs, out: &mut impl Write) -> Result<()> {
    let session = context.connect(&args.conversation.as_id)?;
    let service = session.service();
    let key = service.conversation_with(&args.conversation.with)?;
    let page = service
        .load_history(&key, HistoryQuery::latest(args.limit))
        .context("failed to load history")?;

    for message in &page {
        writeln!(
            out,
            "{}\t{}\t{}\t{}",
            message.sent_at.to_rfc3339(),
            message.sender_id,
            message.delivery_state.as_label(),
            message.text
        )?;
    }
    Ok(())
}

fn delete(context: &ChatContext, args: &ConversationArgs, out: &mut impl Write) -> Result<()> {
    let session = context.connect(&args.as_id)?;
    let service = session.service();
    let key = service.conversation_with(&args.with)?;
    let removed = service
        .delete_conversation(&key)
        .context("failed to delete conversation")?;

    writeln!(out, "deleted {removed} message(s)")?;
    Ok(())
}
