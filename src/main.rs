#![deny(dead_code)]
use anyhow::{anyhow, Result};
use clap::Parser;
use log::{error, info, warn, LevelFilter};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

mod utils;

use chatdeck::{
    backend::{Directory, MemoryApi},
    ChatApi, ChatKind, ChatSelection, ClientConfig, GroupChatSummaryAggregator,
    IncrementalSearchController, RelationshipState, SearchView, SummarySlot, SummaryView,
};

/// Command line arguments for chatdeck
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "chatdeck: conversation list and friend search for a chat backend.",
    long_about = "chatdeck drives the conversation list and the friend search dialog against an \
    in-memory chat backend.\n\n\
    Type `help` at the prompt for the available commands."
)]
struct Args {
    /// Id of the user to sign in as
    #[arg(long, value_name = "USER_ID", default_value = "ann")]
    user: String,

    /// JSON fixture with users, group chats and messages (a demo data set is used otherwise)
    #[arg(long, value_name = "PATH")]
    data: Option<PathBuf>,

    /// Config file (defaults to <config dir>/chatdeck/config.json)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Write logs to this file instead of stderr
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    #[arg(long, value_name = "LEVEL", default_value = "info")]
    log_level: LevelFilter,
}

const HELP: &str = "\
commands:
  open                 open the search dialog
  type <text>          change the search text (empty clears it)
  close                close the search dialog
  add <user>           send a friend request
  cancel <user>        cancel a sent friend request
  accept <user>        accept a received friend request
  unfriend <user>      remove a friend
  select <user>        open the direct chat with a search result
  say <text>           post to the open chat
  chats                print the conversation list
  quit";

async fn demo_backend() -> Result<MemoryApi> {
    let api = MemoryApi::from_directory(Directory::default());
    api.add_user("ann", "Ann", "Lee", "ann.png").await;
    api.add_user("bo", "Bo", "Ng", "bo.png").await;
    api.add_user("cy", "Cy", "Park", "cy.png").await;
    api.add_user("dee", "Dee", "Lopez", "dee.png").await;

    api.create_group_chat("ann-bo", None, &["ann", "bo"]).await?;
    api.create_group_chat("trip", Some("Trip Planning"), &["ann", "bo", "cy"]).await?;
    api.send_message("ann-bo", "bo", "Lunch tomorrow?").await?;
    api.send_message("trip", "cy", "Tickets are booked").await?;
    api.send_friend_request("dee", "ann").await?;
    Ok(api)
}

fn print_summaries(view: &SummaryView) {
    if let Some(reason) = &view.error {
        println!("(conversations unavailable: {})", reason);
        return;
    }
    if view.loading {
        println!("(loading conversations...)");
        return;
    }
    if view.slots.is_empty() {
        println!("(no conversations)");
        return;
    }
    for slot in &view.slots {
        match slot {
            SummarySlot::Ready(summary) => {
                let preview = match (&summary.kind, &summary.last_sender_name) {
                    (ChatKind::Group, Some(sender)) => format!("{}: {}", sender, summary.content),
                    _ => summary.content.clone(),
                };
                println!("  [{}] {} - {}", summary.id, summary.display_name, preview);
            }
            SummarySlot::Failed { chat_id, reason } => {
                println!("  [{}] unavailable ({})", chat_id, reason);
            }
        }
    }
}

fn print_search(view: &SearchView) {
    if !view.open {
        return;
    }
    if view.loading {
        println!("(searching...)");
    } else if let Some(reason) = &view.error {
        println!("Search failed: {}", reason);
    } else if view.not_found {
        println!("No results found. Try different keywords.");
    } else {
        for result in &view.results {
            let option = match result.relationship {
                RelationshipState::SelfUser => "you",
                RelationshipState::Add => "add friend",
                RelationshipState::Cancel => "cancel request",
                RelationshipState::Accept => "accept request",
                RelationshipState::Friend => "friends",
            };
            println!("  {} {} ({}) - {}", result.user_id, result.full_name(), result.picture, option);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_file = args.log_file.as_ref().and_then(|p| p.to_str());
    utils::setup_logging(log_file, args.log_level)?;

    let config = ClientConfig::load(args.config.as_deref())?;
    info!("Using config {:?}", config);

    let backend = match &args.data {
        Some(path) => MemoryApi::from_fixture(path)?,
        None => demo_backend().await?,
    };
    let api: Arc<dyn ChatApi> = Arc::new(backend.clone());

    // Make sure the user exists before wiring anything up
    let me = api
        .get_user_info(&args.user)
        .await
        .map_err(|e| anyhow!("Cannot sign in as {}: {}", args.user, e))?;
    println!("Signed in as {} ({})", me.full_name(), args.user);

    let (aggregator, mut summary_rx) =
        GroupChatSummaryAggregator::new(api.clone(), &args.user, config.lookup_policy());
    let summaries = aggregator.view();
    tokio::spawn(async move {
        if let Err(e) = aggregator.run().await {
            error!("Conversation list stopped: {}", e);
        }
    });

    let (search, mut notices) = IncrementalSearchController::new(api.clone(), &args.user, &config);

    let printer_summary = tokio::spawn(async move {
        while summary_rx.changed().await.is_ok() {
            let view = summary_rx.borrow_and_update().clone();
            println!("Conversations:");
            print_summaries(&view);
        }
    });

    let mut search_rx = search.view();
    let printer_search = tokio::spawn(async move {
        while search_rx.changed().await.is_ok() {
            let view = search_rx.borrow_and_update().clone();
            print_search(&view);
        }
    });

    let printer_notices = tokio::spawn(async move {
        while let Some(notice) = notices.recv().await {
            println!("! Could not {} {}: {}", notice.action, notice.user_id, notice.reason);
        }
    });

    println!("{}", HELP);
    let mut selection: Option<ChatSelection> = None;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim_end();
        let (command, rest) = match line.split_once(' ') {
            Some((command, rest)) => (command, rest),
            None => (line, ""),
        };

        match command {
            "" => continue,
            "help" => println!("{}", HELP),
            "open" => search.on_open(),
            "close" => search.on_close(),
            "type" => search.on_query_change(rest),
            "add" => {
                search.add_friend(rest.trim());
            }
            "cancel" => {
                search.cancel_request(rest.trim());
            }
            "accept" => {
                search.accept_request(rest.trim());
            }
            "unfriend" => {
                search.unfriend(rest.trim());
            }
            "select" => {
                let hit = search
                    .view()
                    .borrow()
                    .results
                    .iter()
                    .find(|r| r.user_id == rest.trim())
                    .cloned();
                match hit {
                    Some(user) => {
                        let chosen = search.select_user(&user);
                        println!("Chatting with {} in {}", chosen.name, chosen.chat_id);
                        selection = Some(chosen);
                    }
                    None => println!("{} is not in the current search results", rest.trim()),
                }
            }
            "say" => match &selection {
                Some(chat) => {
                    if let Err(e) = backend.send_message(&chat.chat_id, &args.user, rest).await {
                        warn!("Failed to post to {}: {}", chat.chat_id, e);
                        println!("Could not send: {}", e);
                    }
                }
                None => println!("No chat selected"),
            },
            "chats" => print_summaries(&summaries.borrow().clone()),
            "quit" | "exit" => break,
            other => println!("Unknown command '{}', type `help`", other),
        }
    }

    info!("Shutting down");
    search.on_close();
    printer_search.abort();
    printer_notices.abort();
    printer_summary.abort();
    Ok(())
}
