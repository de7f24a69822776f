use std::{env, time::Duration};

use inbox_http::{DEFAULT_BASE_URL, InboxApi};
use url::Url;

#[tokio::main]
async fn main() {
    let base = env::var("INBOX_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_owned());
    let base = match Url::parse(&base) {
        Ok(url) => url,
        Err(err) => {
            eprintln!("Invalid INBOX_BASE_URL '{base}': {err}");
            std::process::exit(2);
        }
    };

    let api = match InboxApi::new(base, Duration::from_secs(10)) {
        Ok(api) => api,
        Err(err) => {
            eprintln!("Failed to build HTTP client: {err}");
            std::process::exit(1);
        }
    };

    match api.list_conversations().await {
        Ok(conversations) => {
            let unread: u64 = conversations.iter().map(|c| c.unread_count).sum();
            println!(
                "Backend at {} reachable: {} conversations, {} unread.",
                api.base_url(),
                conversations.len(),
                unread
            );
            match api.bot_info().await {
                Ok(info) => println!("Bot identity: {}", info.title()),
                Err(err) => println!("Bot identity unavailable: {err}"),
            }
        }
        Err(err) => {
            eprintln!("Directory fetch failed: {err}");
            std::process::exit(1);
        }
    }
}
