use anyhow::{anyhow, Context, Result};
use toshi_core::{ChatMessageKind, ChatStore};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let usage = || anyhow!("usage: chat_dump <data_dir> <thread_id> [--json]");
    let data_dir = args.next().ok_or_else(usage)?;
    let thread_id = args.next().ok_or_else(usage)?;
    let mut json = false;
    for a in args {
        if a == "--json" {
            json = true;
            continue;
        }
        return Err(anyhow!("unknown arg: {a}"));
    }

    let store = ChatStore::open(data_dir.clone()).with_context(|| format!("open {data_dir}"))?;
    let messages = store
        .visible_messages(thread_id.clone())
        .context("read thread")?;
    tracing::info!(thread_id = %thread_id, count = messages.len(), "visible messages");

    for m in messages {
        if json {
            let line = serde_json::json!({
                "id": m.id,
                "author": m.author,
                "mine": m.is_mine,
                "kind": format!("{:?}", m.kind),
                "text": m.text,
                "timestamp": m.timestamp,
                "delivery": format!("{:?}", m.delivery),
                "fiat": m.fiat_value,
                "eth": m.ether_value,
            });
            println!("{line}");
            continue;
        }
        let value = match m.kind {
            ChatMessageKind::PaymentRequest | ChatMessageKind::Payment => format!(
                " [{} / {}]",
                m.ether_value.as_deref().unwrap_or("?"),
                m.fiat_value.as_deref().unwrap_or("?")
            ),
            _ => String::new(),
        };
        let who = if m.is_mine { "me" } else { m.author.as_str() };
        println!(
            "{:>8} {:<12} {}{}{}",
            m.display_timestamp,
            who,
            m.text,
            value,
            if m.has_attachment { " (attachment)" } else { "" }
        );
    }
    Ok(())
}
