//! Scripted two-user chat session over the in-memory backend.
//!
//! Drives the whole core (presence, roster auto-open, typing, optimistic
//! send with a failure/retry, reactions, search) on a manual clock, then
//! dumps a JSON transcript of the final window.
//!
//! Run with `cargo run -p ranktrack-chat --bin simulate`.

use std::sync::Arc;

use anyhow::Context;
use chrono::Duration;
use serde_json::json;

use ranktrack_chat::{ChatConfig, ChatSession, RenderItem};
use ranktrack_shared::time::{Clock, ManualClock};
use ranktrack_store::{Backend, User, WriteFault};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    ranktrack_chat::init_tracing();

    let clock = ManualClock::start_now();
    let config = ChatConfig::from_env();
    let backend = Backend::with_retention(Arc::new(clock.clone()), config.retention);

    let alice = User::new("Alice", "alice@ranktrack.example", clock.now());
    let bob = User::new("Bob", "bob@ranktrack.example", clock.now());

    let mut alice_session = ChatSession::sign_in(
        backend.clone(),
        Arc::new(clock.clone()),
        &config,
        alice.clone(),
    )
    .await
    .context("alice sign-in")?;
    let mut bob_session = ChatSession::sign_in(
        backend.clone(),
        Arc::new(clock.clone()),
        &config,
        bob.clone(),
    )
    .await
    .context("bob sign-in")?;

    // Bob opens a chat with Alice from the people list and types a message.
    let conversation = bob_session.roster.open_conversation(&alice).await?;
    let bob_head = bob_session
        .roster
        .head_mut(conversation)
        .context("bob head")?;

    bob_head.set_draft("Hey Alice, rankings moved overnight!").await;
    clock.advance(Duration::milliseconds(600));
    bob_session.tick().await; // typing flag goes out
    let bob_head = bob_session
        .roster
        .head_mut(conversation)
        .context("bob head")?;
    let _ = bob_head.send_draft().await;

    // Alice's roster reacts to the inbound unread with a collapsed head.
    let snapshot = backend.conversations_for(alice.id).await;
    alice_session
        .roster
        .apply_conversations(1, &snapshot)
        .await;
    let alice_head = alice_session
        .roster
        .head_mut(conversation)
        .context("alice head auto-open")?;
    tracing::info!(unread = alice_head.unread(), "alice head auto-opened");

    // She expands it (marking the thread read) and replies; the first
    // attempt hits an outage and is retried with the same correlation id.
    alice_head.expand().await;
    alice_head.set_draft("Seeing it too, three spots up.").await;
    backend.set_write_fault(Some(WriteFault::Unavailable));
    let correlation = alice_head.send_draft().await.context("queued send")?;
    backend.set_write_fault(None);
    alice_head.retry_send(correlation).await;

    // Bob reacts to Alice's reply and searches the window.
    clock.advance(Duration::seconds(1));
    bob_session.tick().await;
    let bob_head = bob_session
        .roster
        .head_mut(conversation)
        .context("bob head")?;
    let reply_id = bob_head.render_items().iter().rev().find_map(|item| match item {
        RenderItem::Confirmed(message) if message.sender == alice.id => Some(message.id),
        _ => None,
    });
    if let Some(reply_id) = reply_id {
        bob_head.toggle_reaction(reply_id, "🎉").await?;
    }
    bob_head.search("rank");
    if let Some(search) = bob_head.search_state() {
        tracing::info!(matches = search.match_count(), "search over the window");
    }

    // Idle Alice out, then bring her back with a pointer move.
    clock.advance(Duration::minutes(6));
    alice_session.tick().await;
    alice_session.activity().await;

    let transcript: Vec<serde_json::Value> = bob_session
        .roster
        .head(conversation)
        .context("bob head")?
        .render_items()
        .iter()
        .map(|item| match item {
            RenderItem::Confirmed(message) => json!({
                "kind": "confirmed",
                "sender": message.sender.short(),
                "text": message.text,
                "reactions": message.reactions,
                "edited": message.edited,
            }),
            RenderItem::Pending(pending) => json!({
                "kind": "pending",
                "sender": pending.sender.short(),
                "text": pending.text,
                "status": pending.status,
            }),
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&transcript)?);

    bob_session.sign_out().await;
    alice_session.sign_out().await;
    Ok(())
}
