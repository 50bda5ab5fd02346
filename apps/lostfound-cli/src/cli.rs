use clap::{Args as ClapArgs, Parser, Subcommand};
use lostfound_chat::ChatConfig;
use std::path::PathBuf;
use std::time::Duration;

/// Lostfound chat - talk about lost and found items from the terminal
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// SQLite database file
    #[arg(long, default_value = "lostfound.db")]
    pub db: PathBuf,

    /// Directory attachments are written to
    #[arg(long, default_value = "uploads")]
    pub uploads: PathBuf,

    /// Public URL the uploads directory is served from
    #[arg(long, default_value = "http://localhost:8080/chat-attachments/")]
    pub base_url: String,

    /// How long a typing heartbeat stays valid
    #[arg(long, value_parser = humantime::parse_duration, default_value = "5s")]
    pub typing_ttl: Duration,

    /// Idle time before a composer reports it stopped typing
    #[arg(long, value_parser = humantime::parse_duration, default_value = "2s")]
    pub typing_debounce: Duration,

    /// Largest accepted attachment in bytes
    #[arg(long, default_value_t = lostfound_chat::DEFAULT_MAX_FILE_SIZE)]
    pub max_file_size: u64,

    #[command(subcommand)]
    pub command: Command,
}

impl Args {
    pub fn chat_config(&self) -> ChatConfig {
        ChatConfig {
            typing_ttl: self.typing_ttl,
            typing_debounce: self.typing_debounce,
            max_file_size: self.max_file_size,
            ..Default::default()
        }
    }
}

#[derive(ClapArgs, Debug)]
pub struct ConversationRef {
    /// Conversation id
    #[arg(short, long)]
    pub conversation: String,

    /// Acting user id
    #[arg(short, long)]
    pub user: String,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Open (or create) the conversation between two users about a post
    Open {
        #[arg(long)]
        post: String,
        #[arg(short, long)]
        user: String,
        #[arg(long)]
        peer: String,
    },
    /// List a user's conversations, most recent first
    Conversations {
        #[arg(short, long)]
        user: String,
    },
    /// Send a text message
    Send {
        #[command(flatten)]
        target: ConversationRef,
        text: String,
        /// Message being replied to
        #[arg(long)]
        reply_to: Option<String>,
        /// Idempotency key; resending with the same key is a no-op
        #[arg(long)]
        client_id: Option<String>,
    },
    /// Upload a file or image and send it
    SendFile {
        #[command(flatten)]
        target: ConversationRef,
        path: PathBuf,
        /// Send as an image message
        #[arg(long)]
        image: bool,
        /// Caption for image messages
        #[arg(long, default_value = "")]
        caption: String,
    },
    /// Print messages oldest first
    History {
        #[command(flatten)]
        target: ConversationRef,
        #[arg(long)]
        limit: Option<u64>,
        #[arg(long, default_value_t = 0)]
        offset: u64,
    },
    /// Edit one of your text messages
    Edit {
        #[arg(short, long)]
        user: String,
        message: String,
        text: String,
    },
    /// Delete one of your messages
    Delete {
        #[arg(short, long)]
        user: String,
        message: String,
    },
    /// Mark everything you received in a conversation as read
    Read {
        #[command(flatten)]
        target: ConversationRef,
    },
    /// Search message content
    Search {
        #[command(flatten)]
        target: ConversationRef,
        query: String,
    },
    /// Create a group chat
    GroupCreate {
        #[arg(short, long)]
        user: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        description: Option<String>,
        /// Initial members besides the creator
        #[arg(long, value_delimiter = ',')]
        members: Vec<String>,
    },
    /// Print change events of a conversation as JSON lines
    Watch {
        #[command(flatten)]
        target: ConversationRef,
        /// Stop after this long instead of waiting for Ctrl+C
        #[arg(long = "for", value_parser = humantime::parse_duration)]
        duration: Option<Duration>,
    },
    /// Run a scripted two-user conversation against the configured store
    Demo,
}
